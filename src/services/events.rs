use chrono::NaiveDate;
use sqlx::SqlitePool;

use crate::db::models::{CreateStudyEvent, EventCompletion, Recurrence, StudyEvent, WeekdaySet};
use crate::db::{CompletionRepository, EventRepository};
use crate::error::{AppError, AppResult};

// ============================================================================
// Event Service (definition validation + completion tracking)
// ============================================================================

/// Raw, unvalidated event fields as supplied by a caller. The routes build
/// this from the request body; `EventService::validate` turns it into the
/// typed write model.
#[derive(Debug, Clone, Default)]
pub struct EventInput {
    pub title: String,
    pub is_recurring: bool,
    pub fixed_date: Option<NaiveDate>,
    pub recurrence_type: Option<String>,
    pub days_of_week: Option<Vec<u8>>,
    pub exam_id: Option<String>,
    pub subject_id: Option<String>,
    pub topic_id: Option<String>,
}

pub struct EventService;

impl EventService {
    /// Validate raw input into a typed write model. All validation happens
    /// here, before any read or write.
    pub fn validate(input: EventInput) -> AppResult<CreateStudyEvent> {
        if input.title.trim().is_empty() {
            return Err(AppError::Validation("title cannot be empty".to_string()));
        }

        let recurrence = if input.is_recurring {
            if input.fixed_date.is_some() {
                return Err(AppError::Validation(
                    "a recurring event cannot have a fixed date".to_string(),
                ));
            }
            Some(Self::validate_recurrence(
                input.recurrence_type.as_deref(),
                input.days_of_week,
            )?)
        } else {
            if input.fixed_date.is_none() {
                return Err(AppError::Validation(
                    "a one-off event requires a fixed date".to_string(),
                ));
            }
            None
        };

        Ok(CreateStudyEvent {
            title: input.title.trim().to_string(),
            is_recurring: input.is_recurring,
            fixed_date: input.fixed_date,
            recurrence,
            exam_id: input.exam_id,
            subject_id: input.subject_id,
            topic_id: input.topic_id,
        })
    }

    fn validate_recurrence(
        recurrence_type: Option<&str>,
        days_of_week: Option<Vec<u8>>,
    ) -> AppResult<Recurrence> {
        match recurrence_type {
            None => Err(AppError::Validation(
                "a recurring event requires a recurrence type".to_string(),
            )),
            Some("daily") => Ok(Recurrence::Daily),
            Some(tag @ ("weekly" | "custom")) => {
                let days = days_of_week.unwrap_or_default();
                let set = WeekdaySet::new(days).map_err(AppError::Validation)?;
                Ok(if tag == "weekly" {
                    Recurrence::Weekly(set)
                } else {
                    Recurrence::Custom(set)
                })
            }
            Some(other) => Err(AppError::Validation(format!(
                "unknown recurrence type: {}",
                other
            ))),
        }
    }

    pub async fn create(
        pool: &SqlitePool,
        user_id: &str,
        input: EventInput,
    ) -> AppResult<StudyEvent> {
        let create = Self::validate(input)?;
        EventRepository::create(pool, user_id, create).await
    }

    /// Replace the mutable fields of an event owned by `user_id`.
    ///
    /// Changing the recurrence shape does not touch existing completion
    /// records; days the new rule no longer fires on simply stop surfacing.
    pub async fn update(
        pool: &SqlitePool,
        event_id: &str,
        user_id: &str,
        input: EventInput,
    ) -> AppResult<StudyEvent> {
        let update = Self::validate(input)?;
        EventRepository::update(pool, event_id, user_id, update)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event not found: {}", event_id)))
    }

    /// Mark the occurrence of `event_id` on `date` as completed.
    ///
    /// The ownership check runs before any write; completing the same day
    /// twice leaves a single record. Callers resolve a missing date to
    /// "today" before invoking this.
    pub async fn mark_complete(
        pool: &SqlitePool,
        event_id: &str,
        user_id: &str,
        date: NaiveDate,
    ) -> AppResult<EventCompletion> {
        let event = EventRepository::find_by_id_and_user(pool, event_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event not found: {}", event_id)))?;

        CompletionRepository::upsert_for_day(pool, &event.id, user_id, date).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn one_off_input(title: &str, day: NaiveDate) -> EventInput {
        EventInput {
            title: title.to_string(),
            is_recurring: false,
            fixed_date: Some(day),
            ..EventInput::default()
        }
    }

    fn weekly_input(title: &str, days: Vec<u8>) -> EventInput {
        EventInput {
            title: title.to_string(),
            is_recurring: true,
            recurrence_type: Some("weekly".to_string()),
            days_of_week: Some(days),
            ..EventInput::default()
        }
    }

    async fn test_pool() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    async fn test_user(pool: &SqlitePool, email: &str) -> String {
        crate::db::UserRepository::create(pool, email, "hash", "Test User")
            .await
            .unwrap()
            .id
    }

    #[test]
    fn validate_rejects_empty_title() {
        let result = EventService::validate(one_off_input("   ", date(2024, 3, 1)));
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn validate_requires_fixed_date_for_one_off() {
        let input = EventInput {
            title: "Quiz".to_string(),
            is_recurring: false,
            ..EventInput::default()
        };
        assert!(matches!(
            EventService::validate(input),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn validate_rejects_weekly_without_days() {
        let input = EventInput {
            title: "Drill".to_string(),
            is_recurring: true,
            recurrence_type: Some("weekly".to_string()),
            days_of_week: None,
            ..EventInput::default()
        };
        assert!(matches!(
            EventService::validate(input),
            Err(AppError::Validation(_))
        ));

        let input = weekly_input("Drill", vec![]);
        assert!(matches!(
            EventService::validate(input),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn validate_rejects_unknown_recurrence_type() {
        let input = EventInput {
            title: "Drill".to_string(),
            is_recurring: true,
            recurrence_type: Some("fortnightly".to_string()),
            ..EventInput::default()
        };
        assert!(matches!(
            EventService::validate(input),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn validate_rejects_fixed_date_on_recurring() {
        let mut input = weekly_input("Drill", vec![1]);
        input.fixed_date = Some(date(2024, 3, 1));
        assert!(matches!(
            EventService::validate(input),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn validate_accepts_daily_without_days() {
        let input = EventInput {
            title: "Flashcards".to_string(),
            is_recurring: true,
            recurrence_type: Some("daily".to_string()),
            ..EventInput::default()
        };
        let create = EventService::validate(input).unwrap();
        assert_eq!(create.recurrence, Some(Recurrence::Daily));
    }

    #[tokio::test]
    async fn mark_complete_is_idempotent() {
        let pool = test_pool().await;
        let user = test_user(&pool, "idem@example.com").await;
        let event = EventService::create(&pool, &user, weekly_input("Drill", vec![1, 3, 5]))
            .await
            .unwrap();
        let day = date(2024, 3, 4);

        let first = EventService::mark_complete(&pool, &event.id, &user, day)
            .await
            .unwrap();
        let second = EventService::mark_complete(&pool, &event.id, &user, day)
            .await
            .unwrap();

        assert!(first.completed);
        assert!(second.completed);
        assert_eq!(first.id, second.id);

        let records =
            CompletionRepository::find_in_range_for_events(&pool, &[event.id.clone()], day, day)
                .await
                .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn completing_one_day_does_not_affect_others() {
        let pool = test_pool().await;
        let user = test_user(&pool, "isolation@example.com").await;
        let event = EventService::create(&pool, &user, weekly_input("Drill", vec![1, 3, 5]))
            .await
            .unwrap();
        let other = EventService::create(&pool, &user, one_off_input("Quiz", date(2024, 3, 4)))
            .await
            .unwrap();

        EventService::mark_complete(&pool, &event.id, &user, date(2024, 3, 4))
            .await
            .unwrap();

        assert!(
            CompletionRepository::find_by_event_and_date(&pool, &event.id, date(2024, 3, 6))
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            CompletionRepository::find_by_event_and_date(&pool, &other.id, date(2024, 3, 4))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn mark_complete_rejects_unknown_event() {
        let pool = test_pool().await;
        let user = test_user(&pool, "missing@example.com").await;

        let result = EventService::mark_complete(&pool, "no-such-id", &user, date(2024, 3, 4)).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn mark_complete_rejects_foreign_owner() {
        let pool = test_pool().await;
        let owner = test_user(&pool, "owner2@example.com").await;
        let intruder = test_user(&pool, "intruder@example.com").await;
        let event = EventService::create(&pool, &owner, weekly_input("Drill", vec![1]))
            .await
            .unwrap();

        let result = EventService::mark_complete(&pool, &event.id, &intruder, date(2024, 3, 4)).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        // No record was written for the owner either.
        assert!(
            CompletionRepository::find_by_event_and_date(&pool, &event.id, date(2024, 3, 4))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn update_replaces_recurrence_and_checks_ownership() {
        let pool = test_pool().await;
        let user = test_user(&pool, "update@example.com").await;
        let other = test_user(&pool, "update-other@example.com").await;
        let event = EventService::create(&pool, &user, weekly_input("Drill", vec![1]))
            .await
            .unwrap();

        let updated = EventService::update(
            &pool,
            &event.id,
            &user,
            EventInput {
                title: "Renamed drill".to_string(),
                is_recurring: true,
                recurrence_type: Some("daily".to_string()),
                ..EventInput::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.title, "Renamed drill");
        assert_eq!(updated.recurrence, Some(Recurrence::Daily));

        let result = EventService::update(
            &pool,
            &event.id,
            &other,
            EventInput {
                title: "Hijacked".to_string(),
                is_recurring: true,
                recurrence_type: Some("daily".to_string()),
                ..EventInput::default()
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
