//! Saga instance model and durable saga repositories.
//!
//! A saga row records the intent of one cross-service creation and which of
//! its children have confirmed. Rows are only ever changed through
//! version-checked writes, so concurrent writers never overwrite each other.

pub mod error;
pub mod instance;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod state;
pub mod version;

pub use common::{AggregateId, CorrelationId};
pub use error::{Result, StoreError};
pub use instance::{Confirmation, InstanceError, SagaInstance, SagaPayload};
pub use memory::InMemorySagaRepository;
pub use postgres::PostgresSagaRepository;
pub use repository::{SagaRepository, SagaRepositoryExt};
pub use state::{ChildKind, SagaState, SagaType};
pub use version::Version;
