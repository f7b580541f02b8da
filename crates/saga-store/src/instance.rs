//! The saga instance and its transitions.
//!
//! Transitions are pure: they mutate an in-memory copy and report what
//! changed. Persisting the result is the repository's job, guarded by the
//! row version the copy was read at.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use common::{AggregateId, CorrelationId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::{ChildKind, SagaState, SagaType};
use crate::version::Version;

/// Data needed to rebuild a saga's child commands.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SagaPayload {
    CreateUser {
        first_name: String,
        last_name: String,
        email: String,
        password: String,
    },
    CreateCourse {
        title: String,
        description: String,
        price: i64,
    },
}

impl SagaPayload {
    pub fn saga_type(&self) -> SagaType {
        match self {
            SagaPayload::CreateUser { .. } => SagaType::CreateUser,
            SagaPayload::CreateCourse { .. } => SagaType::CreateCourse,
        }
    }
}

// Keeps the password out of logs.
impl std::fmt::Debug for SagaPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SagaPayload::CreateUser {
                first_name,
                last_name,
                email,
                ..
            } => f
                .debug_struct("CreateUser")
                .field("first_name", first_name)
                .field("last_name", last_name)
                .field("email", email)
                .field("password", &"<redacted>")
                .finish(),
            SagaPayload::CreateCourse {
                title,
                description,
                price,
            } => f
                .debug_struct("CreateCourse")
                .field("title", title)
                .field("description", description)
                .field("price", price)
                .finish(),
        }
    }
}

/// Errors raised by an illegal transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstanceError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: SagaState, to: SagaState },

    #[error("{saga_type} saga does not expect child {child}")]
    UnexpectedChild {
        saga_type: SagaType,
        child: ChildKind,
    },
}

/// What applying a confirmation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The child was recorded; others are still pending.
    Recorded,
    /// The child was the last one; the saga is now Completed.
    Completed,
    /// The child had already been confirmed.
    Duplicate,
    /// The saga is terminal; the confirmation was ignored.
    Discarded,
}

impl Confirmation {
    /// Returns true if the confirmation changed the saga.
    pub fn is_change(&self) -> bool {
        matches!(self, Confirmation::Recorded | Confirmation::Completed)
    }
}

/// One saga: intent, progress and outcome of a cross-service creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaInstance {
    pub correlation_id: CorrelationId,
    /// Identifier of the top-level request that opened this saga.
    pub request_id: CorrelationId,
    pub aggregate_id: AggregateId,
    pub saga_type: SagaType,
    pub state: SagaState,
    pub payload: SagaPayload,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
    /// Earliest time the reconciler may start another round.
    pub next_attempt_at: DateTime<Utc>,
    /// Dispatch rounds made so far, the initial one included.
    pub attempt_count: u32,
    pub expected_children: BTreeSet<ChildKind>,
    pub confirmed_children: BTreeSet<ChildKind>,
    pub failure_reason: Option<String>,
    /// Version this copy was read at; [`Version::initial`] until inserted.
    pub version: Version,
}

impl SagaInstance {
    /// Opens a saga with fresh correlation and aggregate ids.
    pub fn start(request_id: CorrelationId, payload: SagaPayload, now: DateTime<Utc>) -> Self {
        let saga_type = payload.saga_type();
        Self {
            correlation_id: CorrelationId::new(),
            request_id,
            aggregate_id: AggregateId::new(),
            saga_type,
            state: SagaState::Started,
            payload,
            created_at: now,
            last_attempt_at: now,
            next_attempt_at: now,
            attempt_count: 0,
            expected_children: saga_type.expected_children(),
            confirmed_children: BTreeSet::new(),
            failure_reason: None,
            version: Version::initial(),
        }
    }

    /// Marks the first dispatch round. A retry becomes due at `retry_at`.
    pub fn begin_awaiting(
        &mut self,
        now: DateTime<Utc>,
        retry_at: DateTime<Utc>,
    ) -> Result<(), InstanceError> {
        if self.state != SagaState::Started {
            return Err(InstanceError::InvalidTransition {
                from: self.state,
                to: SagaState::AwaitingChildren,
            });
        }
        self.state = SagaState::AwaitingChildren;
        self.attempt_count = 1;
        self.last_attempt_at = now;
        self.next_attempt_at = retry_at;
        Ok(())
    }

    /// Records a confirmed child. Completes the saga when it was the last one.
    pub fn confirm(&mut self, child: ChildKind) -> Result<Confirmation, InstanceError> {
        if self.state.is_terminal() {
            return Ok(Confirmation::Discarded);
        }
        if !self.expected_children.contains(&child) {
            return Err(InstanceError::UnexpectedChild {
                saga_type: self.saga_type,
                child,
            });
        }
        if self.confirmed_children.contains(&child) {
            return Ok(Confirmation::Duplicate);
        }
        if self.state != SagaState::AwaitingChildren {
            return Err(InstanceError::InvalidTransition {
                from: self.state,
                to: SagaState::AwaitingChildren,
            });
        }

        self.confirmed_children.insert(child);
        if self.confirmed_children == self.expected_children {
            self.state = SagaState::Completed;
            Ok(Confirmation::Completed)
        } else {
            Ok(Confirmation::Recorded)
        }
    }

    /// Moves the saga to Failed. Returns false if it was already terminal.
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = SagaState::Failed;
        self.failure_reason = Some(reason.into());
        true
    }

    /// Claims another dispatch round. The one after it becomes due at `retry_at`.
    pub fn record_attempt(
        &mut self,
        now: DateTime<Utc>,
        retry_at: DateTime<Utc>,
    ) -> Result<(), InstanceError> {
        if self.state != SagaState::AwaitingChildren {
            return Err(InstanceError::InvalidTransition {
                from: self.state,
                to: SagaState::AwaitingChildren,
            });
        }
        self.attempt_count += 1;
        self.last_attempt_at = now;
        self.next_attempt_at = retry_at;
        Ok(())
    }

    /// Expected children that have not confirmed yet.
    pub fn pending_children(&self) -> Vec<ChildKind> {
        self.expected_children
            .difference(&self.confirmed_children)
            .copied()
            .collect()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether the reconciler may start another round at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == SagaState::AwaitingChildren && self.next_attempt_at <= now
    }
}
