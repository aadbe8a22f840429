use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::db::models::{EventCompletion, Occurrence, StudyEvent};
use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::services::events::{EventInput, EventService};
use crate::services::schedule::ScheduleService;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_for_month).post(create_event))
        .route("/today", get(list_for_today))
        .route("/:id", put(update_event))
        .route("/:id/complete", post(complete_event))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub title: String,
    #[serde(default)]
    pub is_recurring: bool,
    pub fixed_date: Option<NaiveDate>,
    pub recurrence_type: Option<String>,
    pub days_of_week: Option<Vec<u8>>,
    pub exam_id: Option<String>,
    pub subject_id: Option<String>,
    pub topic_id: Option<String>,
}

impl From<EventRequest> for EventInput {
    fn from(request: EventRequest) -> Self {
        EventInput {
            title: request.title,
            is_recurring: request.is_recurring,
            fixed_date: request.fixed_date,
            recurrence_type: request.recurrence_type,
            days_of_week: request.days_of_week,
            exam_id: request.exam_id,
            subject_id: request.subject_id,
            topic_id: request.topic_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    pub month: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteRequest {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub id: String,
    pub title: String,
    pub is_recurring: bool,
    pub fixed_date: Option<NaiveDate>,
    pub recurrence_type: Option<String>,
    pub days_of_week: Option<Vec<u8>>,
    pub exam_id: Option<String>,
    pub subject_id: Option<String>,
    pub topic_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<StudyEvent> for EventResponse {
    fn from(event: StudyEvent) -> Self {
        let recurrence_type = event
            .recurrence
            .as_ref()
            .map(|rule| rule.type_tag().to_string());
        let days_of_week = event
            .recurrence
            .as_ref()
            .and_then(|rule| rule.weekday_set())
            .map(|set| set.days().to_vec());

        EventResponse {
            id: event.id,
            title: event.title,
            is_recurring: event.is_recurring,
            fixed_date: event.fixed_date,
            recurrence_type,
            days_of_week,
            exam_id: event.exam_id,
            subject_id: event.subject_id,
            topic_id: event.topic_id,
            created_at: event.created_at,
            updated_at: event.updated_at,
        }
    }
}

/// One materialized calendar-day instance of an event. `occurrence_date` is
/// the day this instance falls on, distinct from any stored `fixed_date`.
#[derive(Debug, Serialize)]
pub struct OccurrenceResponse {
    #[serde(flatten)]
    pub event: EventResponse,
    pub occurrence_date: NaiveDate,
    pub completed: bool,
}

impl From<Occurrence> for OccurrenceResponse {
    fn from(occurrence: Occurrence) -> Self {
        OccurrenceResponse {
            event: occurrence.event.into(),
            occurrence_date: occurrence.date,
            completed: occurrence.completed,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a study event (one-off or recurring)
async fn create_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<EventRequest>,
) -> AppResult<Json<EventResponse>> {
    let event = EventService::create(&state.db, &user.id, request.into()).await?;
    Ok(Json(event.into()))
}

/// Update a study event's title, date and/or recurrence rule
async fn update_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(event_id): Path<String>,
    Json(request): Json<EventRequest>,
) -> AppResult<Json<EventResponse>> {
    let event = EventService::update(&state.db, &event_id, &user.id, request.into()).await?;
    Ok(Json(event.into()))
}

/// Materialize every occurrence in the given calendar month (?month=YYYY-MM)
async fn list_for_month(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(query): Query<MonthQuery>,
) -> AppResult<Json<Vec<OccurrenceResponse>>> {
    let occurrences = ScheduleService::month_occurrences(&state.db, &user.id, &query.month).await?;
    Ok(Json(occurrences.into_iter().map(Into::into).collect()))
}

/// Materialize today's occurrences
async fn list_for_today(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<OccurrenceResponse>>> {
    let today = chrono::Local::now().date_naive();
    let occurrences = ScheduleService::today_occurrences(&state.db, &user.id, today).await?;
    Ok(Json(occurrences.into_iter().map(Into::into).collect()))
}

/// Mark one occurrence of an event complete (defaults to today)
async fn complete_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(event_id): Path<String>,
    request: Option<Json<CompleteRequest>>,
) -> AppResult<Json<EventCompletion>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let date = request
        .date
        .unwrap_or_else(|| chrono::Local::now().date_naive());

    let record = EventService::mark_complete(&state.db, &event_id, &user.id, date).await?;
    Ok(Json(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    use crate::config::Config;

    async fn test_app() -> Router {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        let state = Arc::new(AppState {
            db: pool,
            config: Config::default(),
        });

        Router::new()
            .nest("/api/auth", crate::routes::auth::router())
            .nest("/api/events", router())
            .with_state(state)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn event_routes_require_a_bearer_token() {
        let app = test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/events/today")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn register_create_and_list_flow() {
        let app = test_app().await;

        // Register and grab a token.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/register")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"email":"a@example.com","password":"hunter2hunter2","display_name":"A"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let auth = json_body(response).await;
        let token = auth["token"].as_str().unwrap().to_string();

        // Create a weekly event.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/events")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::from(
                        r#"{"title":"Vocabulary drill","is_recurring":true,"recurrence_type":"weekly","days_of_week":[1,3,5]}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let event = json_body(response).await;
        assert_eq!(event["recurrence_type"], "weekly");
        assert_eq!(event["days_of_week"], serde_json::json!([1, 3, 5]));

        // Materialize March 2024: Mon/Wed/Fri only.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/events?month=2024-03")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let occurrences = json_body(response).await;
        assert_eq!(occurrences.as_array().unwrap().len(), 13);
        assert_eq!(occurrences[0]["occurrence_date"], "2024-03-01");
        assert_eq!(occurrences[0]["completed"], false);

        // A malformed month token is rejected before touching storage.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/events?month=March")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn completing_an_occurrence_shows_up_in_the_month_view() {
        let app = test_app().await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/register")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"email":"b@example.com","password":"hunter2hunter2","display_name":"B"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        let auth = json_body(response).await;
        let token = auth["token"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/events")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::from(
                        r#"{"title":"Past paper","is_recurring":false,"fixed_date":"2024-03-15"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        let event = json_body(response).await;
        let event_id = event["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/events/{}/complete", event_id))
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::from(r#"{"date":"2024-03-15"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let completion = json_body(response).await;
        assert_eq!(completion["completed"], true);
        assert_eq!(completion["completion_date"], "2024-03-15");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/events?month=2024-03")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let occurrences = json_body(response).await;
        assert_eq!(occurrences.as_array().unwrap().len(), 1);
        assert_eq!(occurrences[0]["occurrence_date"], "2024-03-15");
        assert_eq!(occurrences[0]["completed"], true);
    }
}
