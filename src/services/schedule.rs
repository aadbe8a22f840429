use std::collections::{BTreeSet, HashMap};

use chrono::{Months, NaiveDate};
use sqlx::SqlitePool;

use crate::db::models::Occurrence;
use crate::db::{CompletionRepository, EventRepository};
use crate::error::{AppError, AppResult};

// ============================================================================
// Schedule Service (occurrence materialization)
// ============================================================================

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> AppResult<Self> {
        if end < start {
            return Err(AppError::Validation(format!(
                "invalid date range: {} is before {}",
                end, start
            )));
        }
        Ok(DateRange { start, end })
    }

    pub fn single_day(day: NaiveDate) -> Self {
        DateRange {
            start: day,
            end: day,
        }
    }

    /// Parse a `YYYY-MM` month token into the range covering the first
    /// through the last day of that month.
    pub fn from_month_token(token: &str) -> AppResult<Self> {
        let invalid = || {
            AppError::Validation(format!(
                "invalid month token: {} (expected YYYY-MM)",
                token
            ))
        };

        let start = NaiveDate::parse_from_str(&format!("{}-01", token), "%Y-%m-%d")
            .map_err(|_| invalid())?;
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .ok_or_else(invalid)?;

        Ok(DateRange { start, end })
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }
}

pub struct ScheduleService;

impl ScheduleService {
    /// Materialize every occurrence for `user_id` inside `range`.
    ///
    /// One-off events contribute a single occurrence when their fixed date
    /// falls inside the range; recurring events contribute one occurrence
    /// per day their rule fires on. Each occurrence is annotated with the
    /// completion flag for its (event, day) pair. The result is sorted by
    /// date ascending, then by event id for same-day occurrences.
    ///
    /// Read-only: this never creates or mutates records. The definition and
    /// completion reads are two separate snapshot reads; a completion
    /// written between them may or may not be visible.
    pub async fn occurrences_in_range(
        pool: &SqlitePool,
        user_id: &str,
        range: DateRange,
    ) -> AppResult<Vec<Occurrence>> {
        let events = EventRepository::list_by_user(pool, user_id).await?;

        let mut candidates = Vec::new();
        for event in &events {
            if event.is_recurring {
                for day in range.days() {
                    if event.fires_on(day) {
                        candidates.push((event.clone(), day));
                    }
                }
            } else if let Some(fixed) = event.fixed_date {
                if range.contains(fixed) {
                    candidates.push((event.clone(), fixed));
                }
            }
        }

        // Batch-load completion records for every candidate event in one
        // query instead of one lookup per occurrence.
        let event_ids: Vec<String> = candidates
            .iter()
            .map(|(event, _)| event.id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let completions =
            CompletionRepository::find_in_range_for_events(pool, &event_ids, range.start, range.end)
                .await?;

        let completed_by_key: HashMap<(String, NaiveDate), bool> = completions
            .into_iter()
            .map(|c| ((c.event_id, c.completion_date), c.completed))
            .collect();

        let mut occurrences: Vec<Occurrence> = candidates
            .into_iter()
            .map(|(event, date)| {
                let completed = completed_by_key
                    .get(&(event.id.clone(), date))
                    .copied()
                    .unwrap_or(false);
                Occurrence {
                    event,
                    date,
                    completed,
                }
            })
            .collect();

        occurrences.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.event.id.cmp(&b.event.id)));

        Ok(occurrences)
    }

    /// Materialize a full calendar month from a `YYYY-MM` token.
    pub async fn month_occurrences(
        pool: &SqlitePool,
        user_id: &str,
        month_token: &str,
    ) -> AppResult<Vec<Occurrence>> {
        let range = DateRange::from_month_token(month_token)?;
        Self::occurrences_in_range(pool, user_id, range).await
    }

    /// Single-day view for `today`. Produces the same occurrences as the
    /// month view filtered to that day.
    pub async fn today_occurrences(
        pool: &SqlitePool,
        user_id: &str,
        today: NaiveDate,
    ) -> AppResult<Vec<Occurrence>> {
        Self::occurrences_in_range(pool, user_id, DateRange::single_day(today)).await
    }
}
