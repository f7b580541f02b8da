//! Entities owned by the dependent services.
//!
//! Each is keyed by the aggregate id its saga minted. That id correlates rows
//! across services; it is not a foreign key.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::store::Entity;

/// Login record held by the Auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub aggregate_id: AggregateId,
    pub email: String,
    pub password_hash: String,
    pub salt: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerUser {
    pub aggregate_id: AggregateId,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerCourse {
    pub aggregate_id: AggregateId,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUser {
    pub aggregate_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCourse {
    pub aggregate_id: AggregateId,
    pub title: String,
    pub price: i64,
}

/// A placed order. Written once per aggregate id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub aggregate_id: AggregateId,
    pub user_id: AggregateId,
    pub course_ids: Vec<AggregateId>,
}

macro_rules! entity {
    ($entity:ty, $table:literal) => {
        impl Entity for $entity {
            const TABLE: &'static str = $table;

            fn aggregate_id(&self) -> AggregateId {
                self.aggregate_id
            }
        }
    };
}

impl Entity for AuthUser {
    const TABLE: &'static str = "auth_users";

    fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    fn unique_fields(&self) -> Vec<(&'static str, String)> {
        // lower-cased to match the unique index on lower(email)
        vec![("email", self.email.to_lowercase())]
    }
}

entity!(LearnerUser, "learner_users");
entity!(LearnerCourse, "learner_courses");
entity!(OrderUser, "order_users");
entity!(OrderCourse, "order_courses");
entity!(Order, "orders");
