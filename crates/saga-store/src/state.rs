//! Saga state machine and the fixed saga templates.

use std::collections::BTreeSet;

use common::ServiceName;
use serde::{Deserialize, Serialize};

/// The state of a saga in its lifecycle.
///
/// State transitions:
/// ```text
/// Started ──► AwaitingChildren ──┬──► Completed
///                                └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// Intent recorded, children not yet dispatched.
    #[default]
    Started,

    /// Children dispatched, waiting for confirmations.
    AwaitingChildren,

    /// Every expected child confirmed (terminal state).
    Completed,

    /// A child rejected or the retry ceiling was reached (terminal state).
    Failed,
}

impl SagaState {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Failed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Started => "Started",
            SagaState::AwaitingChildren => "AwaitingChildren",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SagaState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Started" => Ok(SagaState::Started),
            "AwaitingChildren" => Ok(SagaState::AwaitingChildren),
            "Completed" => Ok(SagaState::Completed),
            "Failed" => Ok(SagaState::Failed),
            other => Err(format!("unknown saga state: {other}")),
        }
    }
}

/// A unit of work owned by one dependent service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChildKind {
    AuthUser,
    LearnerUser,
    OrderUser,
    LearnerCourse,
    OrderCourse,
}

impl ChildKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChildKind::AuthUser => "AuthUser",
            ChildKind::LearnerUser => "LearnerUser",
            ChildKind::OrderUser => "OrderUser",
            ChildKind::LearnerCourse => "LearnerCourse",
            ChildKind::OrderCourse => "OrderCourse",
        }
    }

    /// The service whose store holds this child.
    pub fn owner(&self) -> ServiceName {
        match self {
            ChildKind::AuthUser => ServiceName::Auth,
            ChildKind::LearnerUser | ChildKind::LearnerCourse => ServiceName::Learner,
            ChildKind::OrderUser | ChildKind::OrderCourse => ServiceName::Order,
        }
    }
}

impl std::fmt::Display for ChildKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChildKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AuthUser" => Ok(ChildKind::AuthUser),
            "LearnerUser" => Ok(ChildKind::LearnerUser),
            "OrderUser" => Ok(ChildKind::OrderUser),
            "LearnerCourse" => Ok(ChildKind::LearnerCourse),
            "OrderCourse" => Ok(ChildKind::OrderCourse),
            other => Err(format!("unknown child kind: {other}")),
        }
    }
}

/// The fixed saga templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SagaType {
    CreateUser,
    CreateCourse,
}

impl SagaType {
    /// Children that must confirm before a saga of this type completes.
    pub fn expected_children(&self) -> BTreeSet<ChildKind> {
        match self {
            SagaType::CreateUser => BTreeSet::from([
                ChildKind::AuthUser,
                ChildKind::LearnerUser,
                ChildKind::OrderUser,
            ]),
            SagaType::CreateCourse => {
                BTreeSet::from([ChildKind::LearnerCourse, ChildKind::OrderCourse])
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaType::CreateUser => "CreateUser",
            SagaType::CreateCourse => "CreateCourse",
        }
    }
}

impl std::fmt::Display for SagaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SagaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CreateUser" => Ok(SagaType::CreateUser),
            "CreateCourse" => Ok(SagaType::CreateCourse),
            other => Err(format!("unknown saga type: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_started() {
        assert_eq!(SagaState::default(), SagaState::Started);
    }

    #[test]
    fn terminal_states() {
        assert!(!SagaState::Started.is_terminal());
        assert!(!SagaState::AwaitingChildren.is_terminal());
        assert!(SagaState::Completed.is_terminal());
        assert!(SagaState::Failed.is_terminal());
    }

    #[test]
    fn state_names_parse_back() {
        for state in [
            SagaState::Started,
            SagaState::AwaitingChildren,
            SagaState::Completed,
            SagaState::Failed,
        ] {
            assert_eq!(state.as_str().parse::<SagaState>(), Ok(state));
        }
        assert!("Running".parse::<SagaState>().is_err());
    }

    #[test]
    fn create_user_expects_three_children() {
        let expected = SagaType::CreateUser.expected_children();
        assert_eq!(expected.len(), 3);
        assert!(expected.contains(&ChildKind::AuthUser));
        assert!(expected.contains(&ChildKind::LearnerUser));
        assert!(expected.contains(&ChildKind::OrderUser));
    }

    #[test]
    fn create_course_expects_two_children() {
        let expected = SagaType::CreateCourse.expected_children();
        assert_eq!(
            expected.into_iter().collect::<Vec<_>>(),
            vec![ChildKind::LearnerCourse, ChildKind::OrderCourse]
        );
    }

    #[test]
    fn child_owners() {
        assert_eq!(ChildKind::AuthUser.owner(), ServiceName::Auth);
        assert_eq!(ChildKind::LearnerCourse.owner(), ServiceName::Learner);
        assert_eq!(ChildKind::OrderUser.owner(), ServiceName::Order);
    }
}
