//! Liveness values shared by every status responder.

use serde::{Deserialize, Serialize};

/// Liveness reported by a service, or observed by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    /// The service answered and its local store is readable.
    Running,

    /// The service answered but its local store is not usable.
    Degraded,

    /// No answer arrived within the caller's bound. Only callers produce this.
    TimedOut,
}

impl ServiceStatus {
    /// Returns the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Running => "RUNNING",
            ServiceStatus::Degraded => "DEGRADED",
            ServiceStatus::TimedOut => "TIMED_OUT",
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The services that answer status requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceName {
    Orchestrator,
    Auth,
    Learner,
    Order,
}

impl ServiceName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceName::Orchestrator => "orchestrator",
            ServiceName::Auth => "auth",
            ServiceName::Learner => "learner",
            ServiceName::Order => "order",
        }
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ServiceName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orchestrator" => Ok(ServiceName::Orchestrator),
            "auth" => Ok(ServiceName::Auth),
            "learner" => Ok(ServiceName::Learner),
            "order" => Ok(ServiceName::Order),
            other => Err(format!("unknown service: {other}")),
        }
    }
}
