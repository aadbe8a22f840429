use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::EventCompletion;
use crate::error::{AppError, AppResult};

// ============================================================================
// Event Completion Repository
// ============================================================================

/// Repository for per-day completion records (`event_completions` table).
pub struct CompletionRepository;

impl CompletionRepository {
    /// Mark `(event_id, date)` complete, creating the row if it does not
    /// exist yet or re-asserting `completed = 1` on the existing row.
    ///
    /// Uses INSERT ... ON CONFLICT(event_id, completion_date) DO UPDATE so
    /// the one-row-per-day invariant holds under concurrent calls without a
    /// separate read-then-write step.
    pub async fn upsert_for_day(
        pool: &SqlitePool,
        event_id: &str,
        user_id: &str,
        date: NaiveDate,
    ) -> AppResult<EventCompletion> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        let record = sqlx::query_as::<_, EventCompletion>(
            r#"
            INSERT INTO event_completions (
                id, event_id, user_id, completion_date, completed, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(event_id, completion_date) DO UPDATE SET
                completed = 1,
                updated_at = excluded.updated_at
            RETURNING
                id, event_id, user_id, completion_date, completed, created_at, updated_at
            "#,
        )
        .bind(&id)
        .bind(event_id)
        .bind(user_id)
        .bind(date)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(record)
    }

    /// Load every completion record for the given events whose day falls in
    /// `[start, end]` inclusive, in a single query.
    pub async fn find_in_range_for_events(
        pool: &SqlitePool,
        event_ids: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<EventCompletion>> {
        if event_ids.is_empty() {
            return Ok(Vec::new());
        }

        // sqlx has no array binds for SQLite; expand one placeholder per id.
        let placeholders = vec!["?"; event_ids.len()].join(", ");
        let sql = format!(
            r#"
            SELECT id, event_id, user_id, completion_date, completed, created_at, updated_at
            FROM event_completions
            WHERE event_id IN ({placeholders})
              AND completion_date >= ? AND completion_date <= ?
            "#
        );

        let mut query = sqlx::query_as::<_, EventCompletion>(&sql);
        for event_id in event_ids {
            query = query.bind(event_id);
        }
        let rows = query
            .bind(start)
            .bind(end)
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Find a single completion record for `(event_id, date)`.
    pub async fn find_by_event_and_date(
        pool: &SqlitePool,
        event_id: &str,
        date: NaiveDate,
    ) -> AppResult<Option<EventCompletion>> {
        let row = sqlx::query_as::<_, EventCompletion>(
            r#"
            SELECT id, event_id, user_id, completion_date, completed, created_at, updated_at
            FROM event_completions
            WHERE event_id = ? AND completion_date = ?
            "#,
        )
        .bind(event_id)
        .bind(date)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
