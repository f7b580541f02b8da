//! Scripted services for exercising the coordinator without responders.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::messages::{
    AuthUserCreated, CreateAuthUser, CreateLearnerCourse, CreateLearnerUser, CreateOrderCourse,
    CreateOrderUser, LearnerCourseCreated, LearnerUserCreated, OrderCourseCreated,
    OrderUserCreated,
};
use common::{AggregateId, CorrelationId};
use saga_store::ChildKind;
use tokio::sync::Mutex;

use super::{AuthService, LearnerService, OrderService};
use crate::error::ChildCallError;

/// How a scripted service answers one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behaviour {
    /// Reply with the request's ids.
    #[default]
    Confirm,
    /// Refuse the command.
    Reject,
    /// Never reply.
    Hang,
    /// Fail delivery.
    Drop,
    /// Reply with ids belonging to some other saga.
    Misreply,
}

/// A call as the service received it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildCall {
    pub kind: ChildKind,
    pub correlation_id: CorrelationId,
    pub aggregate_id: AggregateId,
}

#[derive(Debug, Default)]
struct ScriptState {
    queued: HashMap<ChildKind, VecDeque<Behaviour>>,
    fallback: HashMap<ChildKind, Behaviour>,
    delays: HashMap<ChildKind, Duration>,
    calls: Vec<ChildCall>,
}

/// One fake standing in for the Auth, Learner and Order services at once.
///
/// Each child kind answers with its queued behaviours first, then with its
/// fallback (`Confirm` unless set otherwise).
#[derive(Debug, Clone, Default)]
pub struct ScriptedServices {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how `kind` answers once its queue is empty.
    pub async fn set_behaviour(&self, kind: ChildKind, behaviour: Behaviour) {
        self.state.lock().await.fallback.insert(kind, behaviour);
    }

    /// Queues one-off answers for `kind`, used in order.
    pub async fn script(&self, kind: ChildKind, behaviours: impl IntoIterator<Item = Behaviour>) {
        self.state
            .lock()
            .await
            .queued
            .entry(kind)
            .or_default()
            .extend(behaviours);
    }

    /// Delays every answer from `kind`.
    pub async fn set_delay(&self, kind: ChildKind, delay: Duration) {
        self.state.lock().await.delays.insert(kind, delay);
    }

    /// Every call received, in arrival order.
    pub async fn calls(&self) -> Vec<ChildCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn calls_for(&self, kind: ChildKind) -> Vec<ChildCall> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| call.kind == kind)
            .copied()
            .collect()
    }

    pub async fn call_count(&self, kind: ChildKind) -> usize {
        self.calls_for(kind).await.len()
    }

    /// Returns the ids to reply with.
    async fn answer(
        &self,
        kind: ChildKind,
        correlation_id: CorrelationId,
        aggregate_id: AggregateId,
    ) -> Result<(CorrelationId, AggregateId), ChildCallError> {
        let (behaviour, delay) = {
            let mut state = self.state.lock().await;
            state.calls.push(ChildCall {
                kind,
                correlation_id,
                aggregate_id,
            });
            let queued = state.queued.get_mut(&kind).and_then(VecDeque::pop_front);
            let fallback = state.fallback.get(&kind).copied();
            (
                queued.or(fallback).unwrap_or_default(),
                state.delays.get(&kind).copied(),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match behaviour {
            Behaviour::Confirm => Ok((correlation_id, aggregate_id)),
            Behaviour::Misreply => Ok((CorrelationId::new(), AggregateId::new())),
            Behaviour::Reject => Err(ChildCallError::Rejected(format!("{kind} refused"))),
            Behaviour::Drop => Err(ChildCallError::Transport(format!("{kind} dropped"))),
            Behaviour::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl AuthService for ScriptedServices {
    async fn create_user(&self, command: CreateAuthUser) -> Result<AuthUserCreated, ChildCallError> {
        let (correlation_id, _) = self
            .answer(ChildKind::AuthUser, command.correlation_id, command.aggregate_id)
            .await?;
        Ok(AuthUserCreated { correlation_id })
    }
}

#[async_trait]
impl LearnerService for ScriptedServices {
    async fn create_user(
        &self,
        command: CreateLearnerUser,
    ) -> Result<LearnerUserCreated, ChildCallError> {
        let (correlation_id, _) = self
            .answer(
                ChildKind::LearnerUser,
                command.correlation_id,
                command.aggregate_id,
            )
            .await?;
        Ok(LearnerUserCreated { correlation_id })
    }

    async fn create_course(
        &self,
        command: CreateLearnerCourse,
    ) -> Result<LearnerCourseCreated, ChildCallError> {
        let (correlation_id, aggregate_id) = self
            .answer(
                ChildKind::LearnerCourse,
                command.correlation_id,
                command.aggregate_id,
            )
            .await?;
        Ok(LearnerCourseCreated {
            correlation_id,
            aggregate_id,
        })
    }
}

#[async_trait]
impl OrderService for ScriptedServices {
    async fn create_user(
        &self,
        command: CreateOrderUser,
    ) -> Result<OrderUserCreated, ChildCallError> {
        let (correlation_id, _) = self
            .answer(ChildKind::OrderUser, command.correlation_id, command.aggregate_id)
            .await?;
        Ok(OrderUserCreated { correlation_id })
    }

    async fn create_course(
        &self,
        command: CreateOrderCourse,
    ) -> Result<OrderCourseCreated, ChildCallError> {
        let (correlation_id, aggregate_id) = self
            .answer(
                ChildKind::OrderCourse,
                command.correlation_id,
                command.aggregate_id,
            )
            .await?;
        Ok(OrderCourseCreated {
            correlation_id,
            aggregate_id,
        })
    }
}
