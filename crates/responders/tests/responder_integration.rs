//! Responders driven through the transport, the way the coordinator sees them.

use std::sync::Arc;
use std::time::Duration;

use common::messages::{
    AskForAuthServiceStatus, AskForLearnerServiceStatus, AskForOrderServiceStatus, CreateAuthUser,
    CreateLearnerCourse, CreateOrder, CreateOrderCourse, CreateOrderUser, ValidateCredentials,
};
use common::{AggregateId, CorrelationId, ServiceStatus};
use responders::{
    AuthResponder, AuthUser, EntityStore, InMemoryEntityStore, JwtService, LearnerCourse,
    LearnerResponder, LearnerUser, Order, OrderCourse, OrderResponder, OrderUser, Sha256Hasher,
};
use transport::TransportError;

const CALL_TIMEOUT: Duration = Duration::from_secs(5);

type Auth = AuthResponder<InMemoryEntityStore<AuthUser>, Sha256Hasher, JwtService>;
type Learner = LearnerResponder<InMemoryEntityStore<LearnerUser>, InMemoryEntityStore<LearnerCourse>>;
type OrderSvc = OrderResponder<
    InMemoryEntityStore<OrderUser>,
    InMemoryEntityStore<OrderCourse>,
    InMemoryEntityStore<Order>,
    JwtService,
>;

fn jwt() -> JwtService {
    JwtService::new("integration-secret", "saga-services")
}

fn auth() -> Arc<Auth> {
    Arc::new(AuthResponder::new(
        InMemoryEntityStore::new(),
        Sha256Hasher::new(10),
        jwt(),
    ))
}

fn learner() -> Arc<Learner> {
    Arc::new(LearnerResponder::new(
        InMemoryEntityStore::new(),
        InMemoryEntityStore::new(),
    ))
}

fn order() -> Arc<OrderSvc> {
    Arc::new(OrderResponder::new(
        InMemoryEntityStore::new(),
        InMemoryEntityStore::new(),
        InMemoryEntityStore::new(),
        jwt(),
    ))
}

#[tokio::test]
async fn auth_status_on_empty_store_is_running() {
    let auth = auth();
    let (endpoints, _handles) = Arc::clone(&auth).serve();
    let correlation_id = CorrelationId::new();

    let reply = endpoints
        .status
        .request_within(AskForAuthServiceStatus { correlation_id }, CALL_TIMEOUT)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(reply.correlation_id, correlation_id);
    assert_eq!(reply.status, ServiceStatus::Running);
    assert_eq!(auth.users().count().await.unwrap(), 0);
}

#[tokio::test]
async fn duplicate_create_auth_user_writes_one_row() {
    let auth = auth();
    let (endpoints, _handles) = Arc::clone(&auth).serve();
    let aggregate_id = AggregateId::new();
    let command = CreateAuthUser {
        correlation_id: CorrelationId::new(),
        email: "me@test.com".to_string(),
        password: "p".to_string(),
        aggregate_id,
    };

    let first = endpoints
        .create_user
        .request_within(command.clone(), CALL_TIMEOUT)
        .await
        .unwrap()
        .unwrap();
    let second = endpoints
        .create_user
        .request_within(command.clone(), CALL_TIMEOUT)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first.correlation_id, command.correlation_id);
    assert_eq!(second.correlation_id, command.correlation_id);
    assert_eq!(auth.users().count().await.unwrap(), 1);
    assert!(auth.users().find(aggregate_id).await.unwrap().is_some());
}

#[tokio::test]
async fn concurrent_duplicates_write_one_row() {
    let auth = auth();
    let (endpoints, _handles) = Arc::clone(&auth).serve();
    let command = CreateAuthUser {
        correlation_id: CorrelationId::new(),
        email: "me@test.com".to_string(),
        password: "p".to_string(),
        aggregate_id: AggregateId::new(),
    };

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..5 {
        let client = endpoints.create_user.clone();
        let command = command.clone();
        tasks.spawn(async move { client.request_within(command, CALL_TIMEOUT).await });
    }

    while let Some(joined) = tasks.join_next().await {
        assert!(joined.unwrap().unwrap().is_ok());
    }
    assert_eq!(auth.users().count().await.unwrap(), 1);
}

#[tokio::test]
async fn email_collision_is_rejected_over_the_wire() {
    let auth = auth();
    let (endpoints, _handles) = Arc::clone(&auth).serve();

    for expect_ok in [true, false] {
        let correlation_id = CorrelationId::new();
        let reply = endpoints
            .create_user
            .request_within(
                CreateAuthUser {
                    correlation_id,
                    email: "me@test.com".to_string(),
                    password: "p".to_string(),
                    aggregate_id: AggregateId::new(),
                },
                CALL_TIMEOUT,
            )
            .await
            .unwrap();

        if expect_ok {
            assert!(reply.is_ok());
        } else {
            let rejected = reply.unwrap_err();
            assert_eq!(rejected.correlation_id, correlation_id);
        }
    }
}

#[tokio::test]
async fn unavailable_store_leaves_request_unanswered() {
    let auth = auth();
    let (endpoints, _handles) = Arc::clone(&auth).serve();
    auth.users().set_unavailable(true);

    let result = endpoints
        .create_user
        .request_within(
            CreateAuthUser {
                correlation_id: CorrelationId::new(),
                email: "me@test.com".to_string(),
                password: "p".to_string(),
                aggregate_id: AggregateId::new(),
            },
            CALL_TIMEOUT,
        )
        .await;

    assert!(matches!(result, Err(TransportError::NoReply { .. })));

    let status = endpoints
        .status
        .request_within(
            AskForAuthServiceStatus {
                correlation_id: CorrelationId::new(),
            },
            CALL_TIMEOUT,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.status, ServiceStatus::Degraded);
}

#[tokio::test]
async fn login_then_order() {
    let auth = auth();
    let learner = learner();
    let order = order();
    let (auth_endpoints, _a) = Arc::clone(&auth).serve();
    let (learner_endpoints, _l) = Arc::clone(&learner).serve();
    let (order_endpoints, _o) = Arc::clone(&order).serve();

    let user = AggregateId::new();
    let course = AggregateId::new();

    auth_endpoints
        .create_user
        .request(CreateAuthUser {
            correlation_id: CorrelationId::new(),
            email: "me@test.com".to_string(),
            password: "p".to_string(),
            aggregate_id: user,
        })
        .await
        .unwrap()
        .unwrap();
    order_endpoints
        .create_user
        .request(CreateOrderUser {
            correlation_id: CorrelationId::new(),
            aggregate_id: user,
        })
        .await
        .unwrap()
        .unwrap();
    learner_endpoints
        .create_course
        .request(CreateLearnerCourse {
            correlation_id: CorrelationId::new(),
            aggregate_id: course,
            title: "Rust".to_string(),
            description: "Ownership".to_string(),
        })
        .await
        .unwrap()
        .unwrap();
    order_endpoints
        .create_course
        .request(CreateOrderCourse {
            correlation_id: CorrelationId::new(),
            aggregate_id: course,
            title: "Rust".to_string(),
            price: 100,
        })
        .await
        .unwrap()
        .unwrap();

    let login = auth_endpoints
        .validate_credentials
        .request(ValidateCredentials {
            correlation_id: CorrelationId::new(),
            username: "me@test.com".to_string(),
            password: "p".to_string(),
        })
        .await
        .unwrap()
        .unwrap();
    assert!(login.is_authenticated);

    let processed = order_endpoints
        .create_order
        .request(CreateOrder {
            correlation_id: CorrelationId::new(),
            aggregate_id: AggregateId::new(),
            jwt_token: login.token,
            course_ids: vec![course],
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(processed.user_id, user);
    assert_eq!(processed.course_ids, vec![course]);
}

#[tokio::test]
async fn every_status_responder_answers() {
    let (learner_endpoints, _l) = learner().serve();
    let (order_endpoints, _o) = order().serve();

    let learner_status = learner_endpoints
        .status
        .request_within(
            AskForLearnerServiceStatus {
                correlation_id: CorrelationId::new(),
            },
            CALL_TIMEOUT,
        )
        .await
        .unwrap()
        .unwrap();
    let order_status = order_endpoints
        .status
        .request_within(
            AskForOrderServiceStatus {
                correlation_id: CorrelationId::new(),
            },
            CALL_TIMEOUT,
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(learner_status.status, ServiceStatus::Running);
    assert_eq!(order_status.status, ServiceStatus::Running);
}
