use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    /// IANA zone name, e.g. "Europe/Berlin". Unset or unparseable means UTC.
    pub timezone: Option<String>,
    pub created_at: DateTime<Utc>,
}
