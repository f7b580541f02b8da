//! Service clients backed by transport endpoints.

use async_trait::async_trait;
use common::messages::{
    AuthUserCreated, CreateAuthUser, CreateLearnerCourse, CreateLearnerUser, CreateOrderCourse,
    CreateOrderUser, LearnerCourseCreated, LearnerUserCreated, OrderCourseCreated,
    OrderUserCreated,
};
use transport::{Reply, RequestClient, TransportError};

use super::{AuthService, LearnerService, OrderService};
use crate::error::ChildCallError;

fn settle<T>(result: Result<Reply<T>, TransportError>) -> Result<T, ChildCallError> {
    match result {
        Ok(Ok(reply)) => Ok(reply),
        Ok(Err(rejected)) => Err(ChildCallError::Rejected(rejected.reason)),
        Err(error) => Err(error.into()),
    }
}

#[derive(Debug, Clone)]
pub struct BusAuthService {
    create_user: RequestClient<CreateAuthUser, AuthUserCreated>,
}

impl BusAuthService {
    pub fn new(create_user: RequestClient<CreateAuthUser, AuthUserCreated>) -> Self {
        Self { create_user }
    }
}

#[async_trait]
impl AuthService for BusAuthService {
    async fn create_user(&self, command: CreateAuthUser) -> Result<AuthUserCreated, ChildCallError> {
        settle(self.create_user.request(command).await)
    }
}

#[derive(Debug, Clone)]
pub struct BusLearnerService {
    create_user: RequestClient<CreateLearnerUser, LearnerUserCreated>,
    create_course: RequestClient<CreateLearnerCourse, LearnerCourseCreated>,
}

impl BusLearnerService {
    pub fn new(
        create_user: RequestClient<CreateLearnerUser, LearnerUserCreated>,
        create_course: RequestClient<CreateLearnerCourse, LearnerCourseCreated>,
    ) -> Self {
        Self {
            create_user,
            create_course,
        }
    }
}

#[async_trait]
impl LearnerService for BusLearnerService {
    async fn create_user(
        &self,
        command: CreateLearnerUser,
    ) -> Result<LearnerUserCreated, ChildCallError> {
        settle(self.create_user.request(command).await)
    }

    async fn create_course(
        &self,
        command: CreateLearnerCourse,
    ) -> Result<LearnerCourseCreated, ChildCallError> {
        settle(self.create_course.request(command).await)
    }
}

#[derive(Debug, Clone)]
pub struct BusOrderService {
    create_user: RequestClient<CreateOrderUser, OrderUserCreated>,
    create_course: RequestClient<CreateOrderCourse, OrderCourseCreated>,
}

impl BusOrderService {
    pub fn new(
        create_user: RequestClient<CreateOrderUser, OrderUserCreated>,
        create_course: RequestClient<CreateOrderCourse, OrderCourseCreated>,
    ) -> Self {
        Self {
            create_user,
            create_course,
        }
    }
}

#[async_trait]
impl OrderService for BusOrderService {
    async fn create_user(
        &self,
        command: CreateOrderUser,
    ) -> Result<OrderUserCreated, ChildCallError> {
        settle(self.create_user.request(command).await)
    }

    async fn create_course(
        &self,
        command: CreateOrderCourse,
    ) -> Result<OrderCourseCreated, ChildCallError> {
        settle(self.create_course.request(command).await)
    }
}
