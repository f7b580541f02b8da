//! Learner service: learner profiles and course catalogue entries.

use std::sync::Arc;

use async_trait::async_trait;
use common::messages::{
    AskForLearnerServiceStatus, CreateLearnerCourse, CreateLearnerUser, LearnerCourseCreated,
    LearnerUserCreated, SendLearnerServiceStatus,
};
use common::{CorrelationId, ServiceName, validate};
use transport::{EndpointHandle, Handler, HandlerError, RequestClient, serve};

use crate::entities::{LearnerCourse, LearnerUser};
use crate::health::{check_status, record_write};
use crate::store::EntityStore;
use crate::{ResponderError, Result};

/// Clients for every request type the Learner service answers.
#[derive(Debug, Clone)]
pub struct LearnerEndpoints {
    pub create_user: RequestClient<CreateLearnerUser, LearnerUserCreated>,
    pub create_course: RequestClient<CreateLearnerCourse, LearnerCourseCreated>,
    pub status: RequestClient<AskForLearnerServiceStatus, SendLearnerServiceStatus>,
}

pub struct LearnerResponder<U, C> {
    users: U,
    courses: C,
}

impl<U, C> LearnerResponder<U, C>
where
    U: EntityStore<LearnerUser> + 'static,
    C: EntityStore<LearnerCourse> + 'static,
{
    pub fn new(users: U, courses: C) -> Self {
        Self { users, courses }
    }

    pub fn users(&self) -> &U {
        &self.users
    }

    pub fn courses(&self) -> &C {
        &self.courses
    }

    pub fn serve(self: Arc<Self>) -> (LearnerEndpoints, Vec<EndpointHandle>) {
        let (create_user, h1) =
            serve::<CreateLearnerUser, _>("learner.create_user", Arc::clone(&self));
        let (create_course, h2) =
            serve::<CreateLearnerCourse, _>("learner.create_course", Arc::clone(&self));
        let (status, h3) = serve::<AskForLearnerServiceStatus, _>("learner.status", self);

        (
            LearnerEndpoints {
                create_user,
                create_course,
                status,
            },
            vec![h1, h2, h3],
        )
    }

    #[tracing::instrument(
        skip(self, command),
        fields(correlation_id = %command.correlation_id, aggregate_id = %command.aggregate_id)
    )]
    pub async fn create_user(&self, command: CreateLearnerUser) -> Result<LearnerUserCreated> {
        validate::require_non_blank("first name", &command.first_name)
            .and_then(|_| validate::require_non_blank("last name", &command.last_name))
            .map_err(ResponderError::Rejected)?;

        let inserted = self
            .users
            .insert_if_absent(LearnerUser {
                aggregate_id: command.aggregate_id,
                first_name: command.first_name,
                last_name: command.last_name,
            })
            .await?;
        record_write(ServiceName::Learner, "LearnerUser", &inserted);

        Ok(LearnerUserCreated {
            correlation_id: command.correlation_id,
        })
    }

    #[tracing::instrument(
        skip(self, command),
        fields(correlation_id = %command.correlation_id, aggregate_id = %command.aggregate_id)
    )]
    pub async fn create_course(&self, command: CreateLearnerCourse) -> Result<LearnerCourseCreated> {
        validate::require_non_blank("title", &command.title).map_err(ResponderError::Rejected)?;

        let inserted = self
            .courses
            .insert_if_absent(LearnerCourse {
                aggregate_id: command.aggregate_id,
                title: command.title,
                description: command.description,
            })
            .await?;
        record_write(ServiceName::Learner, "LearnerCourse", &inserted);

        Ok(LearnerCourseCreated {
            correlation_id: command.correlation_id,
            aggregate_id: inserted.entity().aggregate_id,
        })
    }

    pub async fn status(&self, correlation_id: CorrelationId) -> SendLearnerServiceStatus {
        let check = async {
            self.users.ping().await?;
            self.courses.ping().await
        };

        SendLearnerServiceStatus {
            correlation_id,
            status: check_status(ServiceName::Learner, check).await,
        }
    }
}

#[async_trait]
impl<U, C> Handler<CreateLearnerUser> for LearnerResponder<U, C>
where
    U: EntityStore<LearnerUser> + 'static,
    C: EntityStore<LearnerCourse> + 'static,
{
    type Response = LearnerUserCreated;

    async fn handle(
        &self,
        message: CreateLearnerUser,
    ) -> std::result::Result<LearnerUserCreated, HandlerError> {
        Ok(self.create_user(message).await?)
    }
}

#[async_trait]
impl<U, C> Handler<CreateLearnerCourse> for LearnerResponder<U, C>
where
    U: EntityStore<LearnerUser> + 'static,
    C: EntityStore<LearnerCourse> + 'static,
{
    type Response = LearnerCourseCreated;

    async fn handle(
        &self,
        message: CreateLearnerCourse,
    ) -> std::result::Result<LearnerCourseCreated, HandlerError> {
        Ok(self.create_course(message).await?)
    }
}

#[async_trait]
impl<U, C> Handler<AskForLearnerServiceStatus> for LearnerResponder<U, C>
where
    U: EntityStore<LearnerUser> + 'static,
    C: EntityStore<LearnerCourse> + 'static,
{
    type Response = SendLearnerServiceStatus;

    async fn handle(
        &self,
        message: AskForLearnerServiceStatus,
    ) -> std::result::Result<SendLearnerServiceStatus, HandlerError> {
        Ok(self.status(message.correlation_id).await)
    }
}
