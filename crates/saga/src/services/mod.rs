//! Interfaces to the services that own a saga's children.
//!
//! The coordinator talks to each service only through these traits. Replies
//! are returned as-is; matching them against the saga is the coordinator's
//! job.

pub mod bus;
pub mod scripted;

use async_trait::async_trait;
use common::messages::{
    AuthUserCreated, CreateAuthUser, CreateLearnerCourse, CreateLearnerUser, CreateOrderCourse,
    CreateOrderUser, LearnerCourseCreated, LearnerUserCreated, OrderCourseCreated,
    OrderUserCreated,
};

use crate::error::ChildCallError;

pub use bus::{BusAuthService, BusLearnerService, BusOrderService};
pub use scripted::{Behaviour, ScriptedServices};

/// Auth service: credentials for new users.
#[async_trait]
pub trait AuthService: Send + Sync + 'static {
    async fn create_user(&self, command: CreateAuthUser) -> Result<AuthUserCreated, ChildCallError>;
}

/// Learner service: learner profiles and course content.
#[async_trait]
pub trait LearnerService: Send + Sync + 'static {
    async fn create_user(
        &self,
        command: CreateLearnerUser,
    ) -> Result<LearnerUserCreated, ChildCallError>;

    async fn create_course(
        &self,
        command: CreateLearnerCourse,
    ) -> Result<LearnerCourseCreated, ChildCallError>;
}

/// Order service: purchasers and priced courses.
#[async_trait]
pub trait OrderService: Send + Sync + 'static {
    async fn create_user(&self, command: CreateOrderUser)
    -> Result<OrderUserCreated, ChildCallError>;

    async fn create_course(
        &self,
        command: CreateOrderCourse,
    ) -> Result<OrderCourseCreated, ChildCallError>;
}
