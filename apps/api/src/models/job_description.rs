use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Raw job description text submitted by a user. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct JobDescription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}
