use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Event Completion Models (one row per completed (event, day) pair)
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EventCompletion {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    pub completion_date: NaiveDate,
    pub completed: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
