//! Sagas driven end to end against the real responders over the transport.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::messages::{CreateCourse, CreateUser};
use common::{AggregateId, CorrelationId};
use responders::{
    AuthResponder, AuthUser, EntityStore, InMemoryEntityStore, JwtService, LearnerCourse,
    LearnerResponder, LearnerUser, Order, OrderCourse, OrderResponder, OrderUser, Sha256Hasher,
};
use saga::{
    Behaviour, BusAuthService, BusLearnerService, BusOrderService, Reconciler, SagaConfig,
    SagaCoordinator, SagaError, ScriptedServices,
};
use saga_store::{ChildKind, InMemorySagaRepository, SagaRepository, SagaState};
use transport::EndpointHandle;

type Auth = AuthResponder<InMemoryEntityStore<AuthUser>, Sha256Hasher, JwtService>;
type Learner =
    LearnerResponder<InMemoryEntityStore<LearnerUser>, InMemoryEntityStore<LearnerCourse>>;
type OrderSvc = OrderResponder<
    InMemoryEntityStore<OrderUser>,
    InMemoryEntityStore<OrderCourse>,
    InMemoryEntityStore<Order>,
    JwtService,
>;
type BusCoordinator =
    SagaCoordinator<InMemorySagaRepository, BusAuthService, BusLearnerService, BusOrderService>;

fn config() -> SagaConfig {
    SagaConfig {
        call_timeout: Duration::from_millis(500),
        stale_after: Duration::from_secs(10),
        max_attempts: 3,
        ..SagaConfig::default()
    }
}

struct TestHarness {
    coordinator: BusCoordinator,
    reconciler: Reconciler<
        InMemorySagaRepository,
        BusAuthService,
        BusLearnerService,
        BusOrderService,
    >,
    repository: InMemorySagaRepository,
    auth: Arc<Auth>,
    learner: Arc<Learner>,
    order: Arc<OrderSvc>,
    _handles: Vec<EndpointHandle>,
}

impl TestHarness {
    fn new() -> Self {
        let jwt = JwtService::new("integration-secret", "saga-services");
        let auth = Arc::new(AuthResponder::new(
            InMemoryEntityStore::new(),
            Sha256Hasher::new(10),
            jwt.clone(),
        ));
        let learner = Arc::new(LearnerResponder::new(
            InMemoryEntityStore::new(),
            InMemoryEntityStore::new(),
        ));
        let order = Arc::new(OrderResponder::new(
            InMemoryEntityStore::new(),
            InMemoryEntityStore::new(),
            InMemoryEntityStore::new(),
            jwt,
        ));

        let (auth_endpoints, mut handles) = Arc::clone(&auth).serve();
        let (learner_endpoints, learner_handles) = Arc::clone(&learner).serve();
        let (order_endpoints, order_handles) = Arc::clone(&order).serve();
        handles.extend(learner_handles);
        handles.extend(order_handles);

        let repository = InMemorySagaRepository::new();
        let coordinator = SagaCoordinator::new(
            repository.clone(),
            BusAuthService::new(auth_endpoints.create_user),
            BusLearnerService::new(learner_endpoints.create_user, learner_endpoints.create_course),
            BusOrderService::new(order_endpoints.create_user, order_endpoints.create_course),
            config(),
        );
        let reconciler = Reconciler::new(coordinator.clone());

        Self {
            coordinator,
            reconciler,
            repository,
            auth,
            learner,
            order,
            _handles: handles,
        }
    }
}

fn john() -> CreateUser {
    CreateUser {
        correlation_id: CorrelationId::new(),
        first_name: "John".to_string(),
        last_name: "Test".to_string(),
        email: "me@test.com".to_string(),
        password: "p".to_string(),
    }
}

fn rust_course() -> CreateCourse {
    CreateCourse {
        aggregate_id: AggregateId::new(),
        title: "Rust".to_string(),
        description: "Ownership and borrowing".to_string(),
        price: 100,
    }
}

#[tokio::test]
async fn test_create_user_completes_across_all_services() {
    let h = TestHarness::new();
    let request = john();

    let started = h.coordinator.start_user_saga(request.clone()).await.unwrap();

    assert_eq!(started.first_name, "John");
    assert_eq!(started.last_name, "Test");
    assert_eq!(started.email, "me@test.com");
    assert_ne!(started.correlation_id, request.correlation_id);

    h.coordinator.wait_for_dispatches().await;

    let saga = h
        .coordinator
        .get_saga(started.correlation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saga.state, SagaState::Completed);
    assert_eq!(saga.confirmed_children, saga.expected_children);

    let id = started.aggregate_id;
    let auth_user = h.auth.users().find(id).await.unwrap().unwrap();
    assert_eq!(auth_user.email, "me@test.com");
    assert_ne!(auth_user.password_hash, "p");
    assert!(h.learner.users().find(id).await.unwrap().is_some());
    assert!(h.order.users().find(id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_create_course_completes_in_learner_and_order() {
    let h = TestHarness::new();

    let started = h.coordinator.start_course_saga(rust_course()).await.unwrap();
    h.coordinator.wait_for_dispatches().await;

    let saga = h
        .coordinator
        .get_saga_by_aggregate(started.aggregate_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saga.state, SagaState::Completed);

    let learner_course = h
        .learner
        .courses()
        .find(started.aggregate_id)
        .await
        .unwrap()
        .unwrap();
    let order_course = h
        .order
        .courses()
        .find(started.aggregate_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(learner_course.title, "Rust");
    assert_eq!(order_course.price, 100);
}

#[tokio::test]
async fn test_invalid_course_is_refused_before_dispatch() {
    let h = TestHarness::new();
    let mut request = rust_course();
    request.price = -5;

    let result = h.coordinator.start_course_saga(request).await;

    assert!(matches!(result, Err(SagaError::Validation(_))));
    assert_eq!(h.repository.saga_count().await, 0);
    assert_eq!(h.order.courses().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_taken_email_fails_second_saga() {
    let h = TestHarness::new();

    let first = h.coordinator.start_user_saga(john()).await.unwrap();
    h.coordinator.wait_for_dispatches().await;
    let second = h.coordinator.start_user_saga(john()).await.unwrap();
    h.coordinator.wait_for_dispatches().await;

    let first = h.coordinator.get_saga(first.correlation_id).await.unwrap().unwrap();
    let second = h.coordinator.get_saga(second.correlation_id).await.unwrap().unwrap();
    assert_eq!(first.state, SagaState::Completed);
    assert_eq!(second.state, SagaState::Failed);
    assert!(second.failure_reason.unwrap().contains("AuthUser"));
    assert!(!second.confirmed_children.contains(&ChildKind::AuthUser));
    assert_eq!(h.auth.users().count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_redelivered_children_write_once() {
    let h = TestHarness::new();
    let started = h.coordinator.start_user_saga(john()).await.unwrap();
    h.coordinator.wait_for_dispatches().await;
    let saga = h
        .coordinator
        .get_saga(started.correlation_id)
        .await
        .unwrap()
        .unwrap();

    let children: Vec<ChildKind> = saga.expected_children.iter().copied().collect();
    let report = h.coordinator.dispatch(&saga, &children).await;

    assert_eq!(report.confirmed.len(), 3);
    assert_eq!(h.auth.users().count().await.unwrap(), 1);
    assert_eq!(h.learner.users().count().await.unwrap(), 1);
    assert_eq!(h.order.users().count().await.unwrap(), 1);
    let after = h.repository.get(saga.correlation_id).await.unwrap().unwrap();
    assert_eq!(after.version, saga.version);
}

#[tokio::test]
async fn test_unanswered_child_is_recovered_by_reconciler() {
    let h = TestHarness::new();
    h.auth.users().set_unavailable(true);

    let started = h.coordinator.start_user_saga(john()).await.unwrap();
    let reports = h.coordinator.wait_for_dispatches().await;
    assert_eq!(reports[0].pending, vec![ChildKind::AuthUser]);

    h.auth.users().set_unavailable(false);
    let tick = h
        .reconciler
        .tick(Utc::now() + chrono::Duration::seconds(11))
        .await
        .unwrap();

    assert_eq!(tick.retried, 1);
    let saga = h
        .coordinator
        .get_saga(started.correlation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saga.state, SagaState::Completed);
    assert_eq!(saga.attempt_count, 2);
    assert_eq!(h.learner.users().count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_completion_for_every_reply_order() {
    let permutations = [
        [ChildKind::AuthUser, ChildKind::LearnerUser, ChildKind::OrderUser],
        [ChildKind::AuthUser, ChildKind::OrderUser, ChildKind::LearnerUser],
        [ChildKind::LearnerUser, ChildKind::AuthUser, ChildKind::OrderUser],
        [ChildKind::LearnerUser, ChildKind::OrderUser, ChildKind::AuthUser],
        [ChildKind::OrderUser, ChildKind::AuthUser, ChildKind::LearnerUser],
        [ChildKind::OrderUser, ChildKind::LearnerUser, ChildKind::AuthUser],
    ];

    for permutation in permutations {
        let repository = InMemorySagaRepository::new();
        let services = ScriptedServices::new();
        for (i, kind) in permutation.into_iter().enumerate() {
            services
                .set_delay(kind, Duration::from_millis(10 * (i as u64 + 1)))
                .await;
        }
        let coordinator = SagaCoordinator::new(
            repository.clone(),
            services.clone(),
            services.clone(),
            services,
            config(),
        );

        let started = coordinator.start_user_saga(john()).await.unwrap();
        coordinator.wait_for_dispatches().await;

        let saga = repository.get(started.correlation_id).await.unwrap().unwrap();
        assert_eq!(saga.state, SagaState::Completed, "order {permutation:?}");
    }
}

#[tokio::test]
async fn test_late_rejection_after_other_confirmations_fails_saga() {
    let repository = InMemorySagaRepository::new();
    let services = ScriptedServices::new();
    services
        .set_delay(ChildKind::OrderUser, Duration::from_millis(50))
        .await;
    services
        .set_behaviour(ChildKind::OrderUser, Behaviour::Reject)
        .await;
    let coordinator = SagaCoordinator::new(
        repository.clone(),
        services.clone(),
        services.clone(),
        services,
        config(),
    );

    let started = coordinator.start_user_saga(john()).await.unwrap();
    coordinator.wait_for_dispatches().await;

    let saga = repository.get(started.correlation_id).await.unwrap().unwrap();
    assert_eq!(saga.state, SagaState::Failed);
    assert_eq!(saga.confirmed_children.len(), 2);
}
