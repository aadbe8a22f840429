use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{CreateStudyEvent, Recurrence, StudyEvent};
use crate::error::{AppError, AppResult};

// ============================================================================
// Study Event Repository
// ============================================================================

pub struct EventRepository;

const EVENT_COLUMNS: &str = r#"
    id, user_id, title, is_recurring,
    fixed_date, recurrence_type, days_of_week,
    exam_id, subject_id, topic_id,
    created_at, updated_at
"#;

fn event_from_row(r: &SqliteRow) -> StudyEvent {
    let recurrence_type: Option<String> = r.get("recurrence_type");
    let days_of_week: Option<String> = r.get("days_of_week");
    let recurrence = Recurrence::from_stored(recurrence_type.as_deref(), days_of_week.as_deref());

    StudyEvent {
        id: r.get("id"),
        user_id: r.get("user_id"),
        title: r.get("title"),
        is_recurring: r.get("is_recurring"),
        fixed_date: r.get("fixed_date"),
        recurrence,
        exam_id: r.get("exam_id"),
        subject_id: r.get("subject_id"),
        topic_id: r.get("topic_id"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

fn stored_recurrence_parts(
    recurrence: &Option<Recurrence>,
) -> (Option<&'static str>, Option<String>) {
    match recurrence {
        None => (None, None),
        Some(rule) => {
            let days = rule
                .weekday_set()
                .map(|set| serde_json::to_string(set.days()).unwrap_or_else(|_| "[]".to_string()));
            (Some(rule.type_tag()), days)
        }
    }
}

impl EventRepository {
    pub async fn create(
        pool: &SqlitePool,
        user_id: &str,
        create: CreateStudyEvent,
    ) -> AppResult<StudyEvent> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();
        let (recurrence_type, days_of_week) = stored_recurrence_parts(&create.recurrence);

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO study_events (
                id, user_id, title, is_recurring,
                fixed_date, recurrence_type, days_of_week,
                exam_id, subject_id, topic_id,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(&id)
        .bind(user_id)
        .bind(&create.title)
        .bind(create.is_recurring)
        .bind(create.fixed_date)
        .bind(recurrence_type)
        .bind(days_of_week)
        .bind(&create.exam_id)
        .bind(&create.subject_id)
        .bind(&create.topic_id)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(event_from_row(&row))
    }

    /// Find an event by id, scoped to its owner. Returns `None` both when the
    /// id is unknown and when it belongs to a different user.
    pub async fn find_by_id_and_user(
        pool: &SqlitePool,
        event_id: &str,
        user_id: &str,
    ) -> AppResult<Option<StudyEvent>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM study_events
            WHERE id = ? AND user_id = ?
            "#
        ))
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.as_ref().map(event_from_row))
    }

    pub async fn list_by_user(pool: &SqlitePool, user_id: &str) -> AppResult<Vec<StudyEvent>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM study_events
            WHERE user_id = ?
            ORDER BY created_at ASC
            "#
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows.iter().map(event_from_row).collect())
    }

    /// Replace the mutable fields of an event owned by `user_id`.
    /// Returns `None` when the event does not exist for that owner.
    pub async fn update(
        pool: &SqlitePool,
        event_id: &str,
        user_id: &str,
        update: CreateStudyEvent,
    ) -> AppResult<Option<StudyEvent>> {
        let now = Utc::now().naive_utc();
        let (recurrence_type, days_of_week) = stored_recurrence_parts(&update.recurrence);

        let row = sqlx::query(&format!(
            r#"
            UPDATE study_events
            SET title = ?,
                is_recurring = ?,
                fixed_date = ?,
                recurrence_type = ?,
                days_of_week = ?,
                exam_id = ?,
                subject_id = ?,
                topic_id = ?,
                updated_at = ?
            WHERE id = ? AND user_id = ?
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(&update.title)
        .bind(update.is_recurring)
        .bind(update.fixed_date)
        .bind(recurrence_type)
        .bind(days_of_week)
        .bind(&update.exam_id)
        .bind(&update.subject_id)
        .bind(&update.topic_id)
        .bind(now)
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.as_ref().map(event_from_row))
    }
}
