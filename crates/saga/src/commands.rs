//! Top-level request validation and child command construction.

use common::messages::{
    CreateAuthUser, CreateCourse, CreateCourseSagaStarted, CreateLearnerCourse, CreateLearnerUser,
    CreateOrderCourse, CreateOrderUser, CreateUser, CreateUserSagaStarted,
};
use common::{CorrelationId, validate};
use saga_store::{ChildKind, InstanceError, SagaInstance, SagaPayload, SagaType};

use crate::error::{Result, SagaError};

/// Checks a CreateUser request and turns it into a saga payload.
pub fn user_payload(request: &CreateUser) -> Result<SagaPayload> {
    validate::require_non_blank("first name", &request.first_name)
        .and_then(|_| validate::require_non_blank("last name", &request.last_name))
        .and_then(|_| validate::require_email(&request.email))
        .map_err(SagaError::Validation)?;
    if request.password.is_empty() {
        return Err(SagaError::Validation("password must not be empty".to_string()));
    }

    Ok(SagaPayload::CreateUser {
        first_name: request.first_name.trim().to_string(),
        last_name: request.last_name.trim().to_string(),
        email: request.email.trim().to_string(),
        password: request.password.clone(),
    })
}

/// Checks a CreateCourse request and turns it into a saga payload.
pub fn course_payload(request: &CreateCourse) -> Result<SagaPayload> {
    validate::require_non_blank("title", &request.title)
        .and_then(|_| validate::require_non_negative("price", request.price))
        .map_err(SagaError::Validation)?;

    Ok(SagaPayload::CreateCourse {
        title: request.title.trim().to_string(),
        description: request.description.clone(),
        price: request.price,
    })
}

/// The caller's key for a CreateCourse request.
pub fn course_request_id(request: &CreateCourse) -> CorrelationId {
    CorrelationId::from_uuid(request.aggregate_id.as_uuid())
}

/// Acknowledgment for a CreateUser saga, rebuilt from what was persisted.
pub fn user_started(saga: &SagaInstance) -> Result<CreateUserSagaStarted> {
    match &saga.payload {
        SagaPayload::CreateUser {
            first_name,
            last_name,
            email,
            ..
        } => Ok(CreateUserSagaStarted {
            correlation_id: saga.correlation_id,
            aggregate_id: saga.aggregate_id,
            first_name: first_name.clone(),
            last_name: last_name.clone(),
            email: email.clone(),
        }),
        _ => Err(request_reused(saga, SagaType::CreateUser)),
    }
}

/// Acknowledgment for a CreateCourse saga, rebuilt from what was persisted.
pub fn course_started(saga: &SagaInstance) -> Result<CreateCourseSagaStarted> {
    match &saga.payload {
        SagaPayload::CreateCourse {
            title,
            description,
            price,
        } => Ok(CreateCourseSagaStarted {
            correlation_id: saga.correlation_id,
            aggregate_id: saga.aggregate_id,
            title: title.clone(),
            description: description.clone(),
            price: *price,
        }),
        _ => Err(request_reused(saga, SagaType::CreateCourse)),
    }
}

fn request_reused(saga: &SagaInstance, wanted: SagaType) -> SagaError {
    SagaError::Validation(format!(
        "request id {} already opened a {} saga, not {}",
        saga.request_id, saga.saga_type, wanted
    ))
}

/// One child command, addressed to the service that owns the child.
///
/// Every variant carries the saga's correlation and aggregate ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildCommand {
    AuthUser(CreateAuthUser),
    LearnerUser(CreateLearnerUser),
    OrderUser(CreateOrderUser),
    LearnerCourse(CreateLearnerCourse),
    OrderCourse(CreateOrderCourse),
}

impl ChildCommand {
    /// Builds the command for `child` from the saga's stored payload.
    pub fn build(saga: &SagaInstance, child: ChildKind) -> std::result::Result<Self, InstanceError> {
        let correlation_id = saga.correlation_id;
        let aggregate_id = saga.aggregate_id;

        let command = match (&saga.payload, child) {
            (SagaPayload::CreateUser { email, password, .. }, ChildKind::AuthUser) => {
                Self::AuthUser(CreateAuthUser {
                    correlation_id,
                    email: email.clone(),
                    password: password.clone(),
                    aggregate_id,
                })
            }
            (
                SagaPayload::CreateUser {
                    first_name,
                    last_name,
                    ..
                },
                ChildKind::LearnerUser,
            ) => Self::LearnerUser(CreateLearnerUser {
                correlation_id,
                first_name: first_name.clone(),
                last_name: last_name.clone(),
                aggregate_id,
            }),
            (SagaPayload::CreateUser { .. }, ChildKind::OrderUser) => {
                Self::OrderUser(CreateOrderUser {
                    correlation_id,
                    aggregate_id,
                })
            }
            (
                SagaPayload::CreateCourse {
                    title, description, ..
                },
                ChildKind::LearnerCourse,
            ) => Self::LearnerCourse(CreateLearnerCourse {
                correlation_id,
                aggregate_id,
                title: title.clone(),
                description: description.clone(),
            }),
            (SagaPayload::CreateCourse { title, price, .. }, ChildKind::OrderCourse) => {
                Self::OrderCourse(CreateOrderCourse {
                    correlation_id,
                    aggregate_id,
                    title: title.clone(),
                    price: *price,
                })
            }
            _ => {
                return Err(InstanceError::UnexpectedChild {
                    saga_type: saga.saga_type,
                    child,
                });
            }
        };
        Ok(command)
    }

    pub fn kind(&self) -> ChildKind {
        match self {
            Self::AuthUser(_) => ChildKind::AuthUser,
            Self::LearnerUser(_) => ChildKind::LearnerUser,
            Self::OrderUser(_) => ChildKind::OrderUser,
            Self::LearnerCourse(_) => ChildKind::LearnerCourse,
            Self::OrderCourse(_) => ChildKind::OrderCourse,
        }
    }
}
