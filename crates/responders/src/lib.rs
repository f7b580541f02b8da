//! Dependent responders for the Auth, Learner and Order services.
//!
//! Each responder owns its local store and answers child commands with
//! exactly one insert-if-absent write. A redelivered command finds the row
//! its first delivery wrote and confirms again. Responders never call each
//! other or the coordinator.

pub mod auth;
pub mod credentials;
pub mod entities;
pub mod error;
pub mod learner;
pub mod order;
pub mod postgres;
pub mod health;
pub mod store;
pub mod token;

pub use auth::{AuthEndpoints, AuthResponder};
pub use credentials::{CredentialHasher, Sha256Hasher};
pub use entities::{AuthUser, LearnerCourse, LearnerUser, Order, OrderCourse, OrderUser};
pub use error::{ResponderError, Result};
pub use learner::{LearnerEndpoints, LearnerResponder};
pub use order::{OrderEndpoints, OrderResponder};
pub use postgres::PostgresEntityStore;
pub use store::{Entity, EntityStore, InMemoryEntityStore, Inserted};
pub use token::{JwtService, TokenError, TokenIssuer, TokenVerifier};
