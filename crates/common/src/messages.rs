//! Request/response message contracts.
//!
//! Every message carries a [`CorrelationId`]. Requests are delivered at least
//! once, so every handler of a request type must be idempotent.

use serde::{Deserialize, Serialize};

use crate::status::ServiceStatus;
use crate::types::{AggregateId, CorrelationId};

/// A message that can be paired with its reply by correlation id.
pub trait Correlated {
    fn correlation_id(&self) -> CorrelationId;
}

macro_rules! correlated {
    ($($message:ty),* $(,)?) => {
        $(
            impl Correlated for $message {
                fn correlation_id(&self) -> CorrelationId {
                    self.correlation_id
                }
            }
        )*
    };
}

// -- Status --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskForOrchestratorStatus {
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOrchestratorStatus {
    pub correlation_id: CorrelationId,
    pub status: ServiceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskForAuthServiceStatus {
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendAuthServiceStatus {
    pub correlation_id: CorrelationId,
    pub status: ServiceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskForLearnerServiceStatus {
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendLearnerServiceStatus {
    pub correlation_id: CorrelationId,
    pub status: ServiceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskForOrderServiceStatus {
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOrderServiceStatus {
    pub correlation_id: CorrelationId,
    pub status: ServiceStatus,
}

// -- Create user --

/// Top-level request opening a CreateUser saga. The correlation id identifies
/// the request itself; redelivering it never opens a second saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUser {
    pub correlation_id: CorrelationId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserSagaStarted {
    pub correlation_id: CorrelationId,
    pub aggregate_id: AggregateId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAuthUser {
    pub correlation_id: CorrelationId,
    pub email: String,
    pub password: String,
    pub aggregate_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUserCreated {
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLearnerUser {
    pub correlation_id: CorrelationId,
    pub first_name: String,
    pub last_name: String,
    pub aggregate_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerUserCreated {
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderUser {
    pub correlation_id: CorrelationId,
    pub aggregate_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUserCreated {
    pub correlation_id: CorrelationId,
}

// -- Create course --

/// Top-level request opening a CreateCourse saga.
///
/// The leading identifier is the caller's request key. The saga mints its own
/// aggregate id for the course; this one only deduplicates redelivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourse {
    pub aggregate_id: AggregateId,
    pub title: String,
    pub description: String,
    pub price: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourseSagaStarted {
    pub correlation_id: CorrelationId,
    pub aggregate_id: AggregateId,
    pub title: String,
    pub description: String,
    pub price: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLearnerCourse {
    pub correlation_id: CorrelationId,
    pub aggregate_id: AggregateId,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerCourseCreated {
    pub correlation_id: CorrelationId,
    pub aggregate_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderCourse {
    pub correlation_id: CorrelationId,
    pub aggregate_id: AggregateId,
    pub title: String,
    pub price: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCourseCreated {
    pub correlation_id: CorrelationId,
    pub aggregate_id: AggregateId,
}

// -- Orders --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrder {
    pub correlation_id: CorrelationId,
    pub aggregate_id: AggregateId,
    pub jwt_token: String,
    pub course_ids: Vec<AggregateId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderProcessed {
    pub correlation_id: CorrelationId,
    pub aggregate_id: AggregateId,
    pub user_id: AggregateId,
    pub course_ids: Vec<AggregateId>,
}

// -- Credentials --

/// Login request. `username` is the email the user registered with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCredentials {
    pub correlation_id: CorrelationId,
    pub username: String,
    pub password: String,
}

/// Login outcome. `token` is empty unless `is_authenticated` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsWereValidated {
    pub correlation_id: CorrelationId,
    pub token: String,
    pub is_authenticated: bool,
}

// -- Rejection --

/// Explicit refusal of a request, e.g. a service-level validation failure.
///
/// Unlike a missing reply this is final: the sender must not retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejected {
    pub correlation_id: CorrelationId,
    pub reason: String,
}

correlated!(
    AskForOrchestratorStatus,
    SendOrchestratorStatus,
    AskForAuthServiceStatus,
    SendAuthServiceStatus,
    AskForLearnerServiceStatus,
    SendLearnerServiceStatus,
    AskForOrderServiceStatus,
    SendOrderServiceStatus,
    CreateUser,
    CreateUserSagaStarted,
    CreateAuthUser,
    AuthUserCreated,
    CreateLearnerUser,
    LearnerUserCreated,
    CreateOrderUser,
    OrderUserCreated,
    CreateCourseSagaStarted,
    CreateLearnerCourse,
    LearnerCourseCreated,
    CreateOrderCourse,
    OrderCourseCreated,
    CreateOrder,
    OrderProcessed,
    ValidateCredentials,
    CredentialsWereValidated,
    Rejected,
);

impl Correlated for CreateCourse {
    fn correlation_id(&self) -> CorrelationId {
        CorrelationId::from_uuid(self.aggregate_id.as_uuid())
    }
}
