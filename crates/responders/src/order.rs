//! Order service: purchasers, priced courses and placed orders.

use std::sync::Arc;

use async_trait::async_trait;
use common::messages::{
    AskForOrderServiceStatus, CreateOrder, CreateOrderCourse, CreateOrderUser, OrderCourseCreated,
    OrderProcessed, OrderUserCreated, SendOrderServiceStatus,
};
use common::{CorrelationId, ServiceName, validate};
use transport::{EndpointHandle, Handler, HandlerError, RequestClient, serve};

use crate::entities::{Order, OrderCourse, OrderUser};
use crate::health::{check_status, record_write};
use crate::store::EntityStore;
use crate::token::TokenVerifier;
use crate::{ResponderError, Result};

/// Clients for every request type the Order service answers.
#[derive(Debug, Clone)]
pub struct OrderEndpoints {
    pub create_user: RequestClient<CreateOrderUser, OrderUserCreated>,
    pub create_course: RequestClient<CreateOrderCourse, OrderCourseCreated>,
    pub create_order: RequestClient<CreateOrder, OrderProcessed>,
    pub status: RequestClient<AskForOrderServiceStatus, SendOrderServiceStatus>,
}

pub struct OrderResponder<U, C, O, V> {
    users: U,
    courses: C,
    orders: O,
    tokens: V,
}

impl<U, C, O, V> OrderResponder<U, C, O, V>
where
    U: EntityStore<OrderUser> + 'static,
    C: EntityStore<OrderCourse> + 'static,
    O: EntityStore<Order> + 'static,
    V: TokenVerifier,
{
    pub fn new(users: U, courses: C, orders: O, tokens: V) -> Self {
        Self {
            users,
            courses,
            orders,
            tokens,
        }
    }

    pub fn users(&self) -> &U {
        &self.users
    }

    pub fn courses(&self) -> &C {
        &self.courses
    }

    pub fn orders(&self) -> &O {
        &self.orders
    }

    pub fn serve(self: Arc<Self>) -> (OrderEndpoints, Vec<EndpointHandle>) {
        let (create_user, h1) = serve::<CreateOrderUser, _>("order.create_user", Arc::clone(&self));
        let (create_course, h2) =
            serve::<CreateOrderCourse, _>("order.create_course", Arc::clone(&self));
        let (create_order, h3) = serve::<CreateOrder, _>("order.create_order", Arc::clone(&self));
        let (status, h4) = serve::<AskForOrderServiceStatus, _>("order.status", self);

        (
            OrderEndpoints {
                create_user,
                create_course,
                create_order,
                status,
            },
            vec![h1, h2, h3, h4],
        )
    }

    #[tracing::instrument(
        skip(self, command),
        fields(correlation_id = %command.correlation_id, aggregate_id = %command.aggregate_id)
    )]
    pub async fn create_user(&self, command: CreateOrderUser) -> Result<OrderUserCreated> {
        let inserted = self
            .users
            .insert_if_absent(OrderUser {
                aggregate_id: command.aggregate_id,
            })
            .await?;
        record_write(ServiceName::Order, "OrderUser", &inserted);

        Ok(OrderUserCreated {
            correlation_id: command.correlation_id,
        })
    }

    #[tracing::instrument(
        skip(self, command),
        fields(correlation_id = %command.correlation_id, aggregate_id = %command.aggregate_id)
    )]
    pub async fn create_course(&self, command: CreateOrderCourse) -> Result<OrderCourseCreated> {
        validate::require_non_blank("title", &command.title)
            .and_then(|_| validate::require_non_negative("price", command.price))
            .map_err(ResponderError::Rejected)?;

        let inserted = self
            .courses
            .insert_if_absent(OrderCourse {
                aggregate_id: command.aggregate_id,
                title: command.title,
                price: command.price,
            })
            .await?;
        record_write(ServiceName::Order, "OrderCourse", &inserted);

        Ok(OrderCourseCreated {
            correlation_id: command.correlation_id,
            aggregate_id: inserted.entity().aggregate_id,
        })
    }

    /// Places an order for the token's user. Redelivery returns the stored order.
    #[tracing::instrument(
        skip(self, command),
        fields(correlation_id = %command.correlation_id, aggregate_id = %command.aggregate_id)
    )]
    pub async fn create_order(&self, command: CreateOrder) -> Result<OrderProcessed> {
        if let Some(existing) = self.orders.find(command.aggregate_id).await? {
            return Ok(processed(command.correlation_id, existing));
        }

        if command.course_ids.is_empty() {
            return Err(ResponderError::Rejected(
                "order must contain at least one course".to_string(),
            ));
        }

        let user_id = self
            .tokens
            .user_id(&command.jwt_token)
            .map_err(|e| ResponderError::Rejected(e.to_string()))?;

        if self.users.find(user_id).await?.is_none() {
            return Err(ResponderError::Rejected(format!("unknown user {user_id}")));
        }
        for course_id in &command.course_ids {
            if self.courses.find(*course_id).await?.is_none() {
                return Err(ResponderError::Rejected(format!(
                    "unknown course {course_id}"
                )));
            }
        }

        let inserted = self
            .orders
            .insert_if_absent(Order {
                aggregate_id: command.aggregate_id,
                user_id,
                course_ids: command.course_ids,
            })
            .await?;
        record_write(ServiceName::Order, "Order", &inserted);

        Ok(processed(command.correlation_id, inserted.into_inner()))
    }

    pub async fn status(&self, correlation_id: CorrelationId) -> SendOrderServiceStatus {
        let check = async {
            self.users.ping().await?;
            self.courses.ping().await?;
            self.orders.ping().await
        };

        SendOrderServiceStatus {
            correlation_id,
            status: check_status(ServiceName::Order, check).await,
        }
    }
}

fn processed(correlation_id: CorrelationId, order: Order) -> OrderProcessed {
    OrderProcessed {
        correlation_id,
        aggregate_id: order.aggregate_id,
        user_id: order.user_id,
        course_ids: order.course_ids,
    }
}

#[async_trait]
impl<U, C, O, V> Handler<CreateOrderUser> for OrderResponder<U, C, O, V>
where
    U: EntityStore<OrderUser> + 'static,
    C: EntityStore<OrderCourse> + 'static,
    O: EntityStore<Order> + 'static,
    V: TokenVerifier,
{
    type Response = OrderUserCreated;

    async fn handle(
        &self,
        message: CreateOrderUser,
    ) -> std::result::Result<OrderUserCreated, HandlerError> {
        Ok(self.create_user(message).await?)
    }
}

#[async_trait]
impl<U, C, O, V> Handler<CreateOrderCourse> for OrderResponder<U, C, O, V>
where
    U: EntityStore<OrderUser> + 'static,
    C: EntityStore<OrderCourse> + 'static,
    O: EntityStore<Order> + 'static,
    V: TokenVerifier,
{
    type Response = OrderCourseCreated;

    async fn handle(
        &self,
        message: CreateOrderCourse,
    ) -> std::result::Result<OrderCourseCreated, HandlerError> {
        Ok(self.create_course(message).await?)
    }
}

#[async_trait]
impl<U, C, O, V> Handler<CreateOrder> for OrderResponder<U, C, O, V>
where
    U: EntityStore<OrderUser> + 'static,
    C: EntityStore<OrderCourse> + 'static,
    O: EntityStore<Order> + 'static,
    V: TokenVerifier,
{
    type Response = OrderProcessed;

    async fn handle(&self, message: CreateOrder) -> std::result::Result<OrderProcessed, HandlerError> {
        Ok(self.create_order(message).await?)
    }
}

#[async_trait]
impl<U, C, O, V> Handler<AskForOrderServiceStatus> for OrderResponder<U, C, O, V>
where
    U: EntityStore<OrderUser> + 'static,
    C: EntityStore<OrderCourse> + 'static,
    O: EntityStore<Order> + 'static,
    V: TokenVerifier,
{
    type Response = SendOrderServiceStatus;

    async fn handle(
        &self,
        message: AskForOrderServiceStatus,
    ) -> std::result::Result<SendOrderServiceStatus, HandlerError> {
        Ok(self.status(message.correlation_id).await)
    }
}
