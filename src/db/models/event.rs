use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;

// ============================================================================
// Study Event Models (one-off and recurring commitments)
// ============================================================================

/// Validated set of weekday numbers (0 = Sunday .. 6 = Saturday).
///
/// Always non-empty, deduplicated and sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekdaySet(Vec<u8>);

impl WeekdaySet {
    pub fn new(mut days: Vec<u8>) -> Result<Self, String> {
        if days.is_empty() {
            return Err("days_of_week must not be empty".to_string());
        }
        if let Some(bad) = days.iter().find(|d| **d > 6) {
            return Err(format!("invalid weekday number: {} (expected 0-6)", bad));
        }
        days.sort_unstable();
        days.dedup();
        Ok(WeekdaySet(days))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        let weekday = date.weekday().num_days_from_sunday() as u8;
        self.0.binary_search(&weekday).is_ok()
    }

    pub fn days(&self) -> &[u8] {
        &self.0
    }
}

/// Recurrence rule of a recurring study event.
///
/// `Weekly` and `Custom` behave identically (fire on the configured
/// weekdays); they are distinct tags only for how the frontend presents
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recurrence {
    Daily,
    Weekly(WeekdaySet),
    Custom(WeekdaySet),
}

impl Recurrence {
    /// Reconstruct a rule from its stored parts.
    ///
    /// Returns `None` for unknown tags or malformed day sets so that rows
    /// written by other versions of the schema never fire.
    pub fn from_stored(recurrence_type: Option<&str>, days_of_week: Option<&str>) -> Option<Self> {
        let parse_days = |raw: Option<&str>| -> Option<WeekdaySet> {
            let raw = raw?;
            let days: Vec<u8> = serde_json::from_str(raw).ok()?;
            WeekdaySet::new(days).ok()
        };

        match recurrence_type? {
            "daily" => Some(Recurrence::Daily),
            "weekly" => Some(Recurrence::Weekly(parse_days(days_of_week)?)),
            "custom" => Some(Recurrence::Custom(parse_days(days_of_week)?)),
            other => {
                tracing::warn!("Ignoring unknown recurrence type: {}", other);
                None
            }
        }
    }

    /// Whether this rule fires on the given calendar day.
    pub fn fires_on(&self, date: NaiveDate) -> bool {
        match self {
            Recurrence::Daily => true,
            Recurrence::Weekly(days) | Recurrence::Custom(days) => days.contains(date),
        }
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            Recurrence::Daily => "daily",
            Recurrence::Weekly(_) => "weekly",
            Recurrence::Custom(_) => "custom",
        }
    }

    pub fn weekday_set(&self) -> Option<&WeekdaySet> {
        match self {
            Recurrence::Daily => None,
            Recurrence::Weekly(days) | Recurrence::Custom(days) => Some(days),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StudyEvent {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub is_recurring: bool,
    pub fixed_date: Option<NaiveDate>,
    pub recurrence: Option<Recurrence>,
    pub exam_id: Option<String>,
    pub subject_id: Option<String>,
    pub topic_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl StudyEvent {
    /// Whether this event produces an occurrence on `date` through its
    /// recurrence rule. One-off events are placed by `fixed_date` directly
    /// and never fire here.
    pub fn fires_on(&self, date: NaiveDate) -> bool {
        if !self.is_recurring {
            return false;
        }
        match &self.recurrence {
            Some(rule) => rule.fires_on(date),
            None => false,
        }
    }
}

/// Validated write model for creating or replacing a study event.
/// Built by the event service after request validation.
#[derive(Debug, Clone)]
pub struct CreateStudyEvent {
    pub title: String,
    pub is_recurring: bool,
    pub fixed_date: Option<NaiveDate>,
    pub recurrence: Option<Recurrence>,
    pub exam_id: Option<String>,
    pub subject_id: Option<String>,
    pub topic_id: Option<String>,
}

/// A single calendar-day instance of a study event, materialized on demand.
/// Never persisted; identity is (event id, date).
#[derive(Debug, Clone)]
pub struct Occurrence {
    pub event: StudyEvent,
    pub date: NaiveDate,
    pub completed: bool,
}
