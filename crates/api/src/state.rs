//! Shared application state and the wiring that produces it.

use std::sync::Arc;
use std::time::Duration;

use responders::{
    AuthEndpoints, AuthResponder, AuthUser, EntityStore, InMemoryEntityStore, JwtService,
    LearnerCourse, LearnerEndpoints, LearnerResponder, LearnerUser, Order, OrderCourse,
    OrderEndpoints, OrderResponder, OrderUser, PostgresEntityStore, Sha256Hasher,
};
use saga::{BusAuthService, BusLearnerService, BusOrderService, Reconciler, SagaCoordinator};
use saga_store::{InMemorySagaRepository, PostgresSagaRepository, SagaRepository};
use sqlx::PgPool;
use transport::EndpointHandle;

use crate::config::Config;

/// Coordinator talking to the responders over the transport.
pub type Coordinator<R> = SagaCoordinator<R, BusAuthService, BusLearnerService, BusOrderService>;

/// Shared application state accessible from all handlers.
pub struct AppState<R> {
    pub coordinator: Coordinator<R>,
    pub auth: AuthEndpoints,
    pub learner: LearnerEndpoints,
    pub order: OrderEndpoints,
    /// Bound on every call a handler makes.
    pub request_timeout: Duration,
}

/// Everything a running process owns besides the HTTP server.
pub struct Runtime<R> {
    pub state: Arc<AppState<R>>,
    pub reconciler: Reconciler<R, BusAuthService, BusLearnerService, BusOrderService>,
    pub handles: Vec<EndpointHandle>,
}

/// The three responders mounted on the transport.
struct Responders {
    auth: AuthEndpoints,
    learner: LearnerEndpoints,
    order: OrderEndpoints,
    handles: Vec<EndpointHandle>,
}

impl Responders {
    fn mount<AU, LU, LC, OU, OC, OO>(
        auth: AuthResponder<AU, Sha256Hasher, JwtService>,
        learner: LearnerResponder<LU, LC>,
        order: OrderResponder<OU, OC, OO, JwtService>,
    ) -> Self
    where
        AU: EntityStore<AuthUser> + 'static,
        LU: EntityStore<LearnerUser> + 'static,
        LC: EntityStore<LearnerCourse> + 'static,
        OU: EntityStore<OrderUser> + 'static,
        OC: EntityStore<OrderCourse> + 'static,
        OO: EntityStore<Order> + 'static,
    {
        let (auth, mut handles) = Arc::new(auth).serve();
        let (learner, learner_handles) = Arc::new(learner).serve();
        let (order, order_handles) = Arc::new(order).serve();
        handles.extend(learner_handles);
        handles.extend(order_handles);

        Self {
            auth,
            learner,
            order,
            handles,
        }
    }
}

fn jwt(config: &Config) -> JwtService {
    JwtService::new(&config.jwt_secret, config.jwt_issuer.clone())
}

fn assemble<R: SagaRepository + 'static>(
    repository: R,
    responders: Responders,
    config: &Config,
) -> Runtime<R> {
    let coordinator = SagaCoordinator::new(
        repository,
        BusAuthService::new(responders.auth.create_user.clone()),
        BusLearnerService::new(
            responders.learner.create_user.clone(),
            responders.learner.create_course.clone(),
        ),
        BusOrderService::new(
            responders.order.create_user.clone(),
            responders.order.create_course.clone(),
        ),
        config.saga.clone(),
    );
    let reconciler = Reconciler::new(coordinator.clone());

    let state = Arc::new(AppState {
        coordinator,
        auth: responders.auth,
        learner: responders.learner,
        order: responders.order,
        request_timeout: config.request_timeout,
    });

    Runtime {
        state,
        reconciler,
        handles: responders.handles,
    }
}

/// Wires every service against in-memory stores.
pub fn create_default_state(config: &Config) -> Runtime<InMemorySagaRepository> {
    let responders = Responders::mount(
        AuthResponder::new(
            InMemoryEntityStore::new(),
            Sha256Hasher::default(),
            jwt(config),
        ),
        LearnerResponder::new(InMemoryEntityStore::new(), InMemoryEntityStore::new()),
        OrderResponder::new(
            InMemoryEntityStore::new(),
            InMemoryEntityStore::new(),
            InMemoryEntityStore::new(),
            jwt(config),
        ),
    );
    assemble(InMemorySagaRepository::new(), responders, config)
}

/// Wires every service against one PostgreSQL database, migrating it first.
pub async fn create_postgres_state(
    config: &Config,
    pool: PgPool,
) -> Result<Runtime<PostgresSagaRepository>, sqlx::migrate::MigrateError> {
    let repository = PostgresSagaRepository::new(pool.clone());
    repository.run_migrations().await?;

    let responders = Responders::mount(
        AuthResponder::new(
            PostgresEntityStore::new(pool.clone()),
            Sha256Hasher::default(),
            jwt(config),
        ),
        LearnerResponder::new(
            PostgresEntityStore::new(pool.clone()),
            PostgresEntityStore::new(pool.clone()),
        ),
        OrderResponder::new(
            PostgresEntityStore::new(pool.clone()),
            PostgresEntityStore::new(pool.clone()),
            PostgresEntityStore::new(pool),
            jwt(config),
        ),
    );
    Ok(assemble(repository, responders, config))
}
