//! Saga coordination for user and course creation.
//!
//! A top-level request opens a saga, which is persisted before it is
//! acknowledged. The coordinator then fans one child command out to each
//! owning service (Auth, Learner, Order) and records the confirmations. The
//! saga completes when every expected child has confirmed and fails when a
//! service rejects a child. Children that time out stay pending. The
//! [`Reconciler`] re-sends them with exponential backoff until an attempt
//! ceiling is reached.
//!
//! Confirmed children are not compensated when a saga fails. See
//! [`FailureHook`].

pub mod backoff;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod reconciler;
pub mod services;

pub use backoff::Backoff;
pub use commands::ChildCommand;
pub use config::SagaConfig;
pub use coordinator::{DispatchReport, FailureCause, FailureHook, SagaCoordinator};
pub use error::{ChildCallError, Result, SagaError};
pub use reconciler::{Reconciler, TickReport};
pub use services::{
    AuthService, Behaviour, BusAuthService, BusLearnerService, BusOrderService, LearnerService,
    OrderService, ScriptedServices,
};
