use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use axum_extra::extract::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::coordinator::CoordinatorStatus;
use crate::validation::validate_lesson_window;
use crate::views::{self, LessonView, MAX_LESSON_SLOTS};
use crate::{AppState, actions, auth::verify_token, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Sensor values derived from the latest snapshot.
#[derive(Debug, Serialize, ToSchema)]
pub struct SensorsView {
    pub remaining_credits: Option<i64>,
    pub enrolled_lessons: usize,
    #[schema(value_type = String, format = "date-time")]
    pub fetched_at: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_attempt: Option<DateTime<Utc>>,
    pub status: CoordinatorStatus,
    /// True when the snapshot predates the last failed refresh attempt.
    pub stale: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EnrollRequest {
    #[schema(value_type = String, format = "date-time")]
    pub start: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub end: DateTime<Utc>,
    pub class_type_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EnrollResponse {
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UnenrollRequest {
    pub schedule_registration_id: Uuid,
    pub class_type_id: Uuid,
}

#[utoipa::path(get, path = "/", tag = "fitblocks")]
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "FitBlocks Connect",
        "endpoints": {
            "/schedule": "Full schedule window as JSON",
            "/calendar.ical": "Enrolled lessons as an iCal file",
            "/sensors": "Credits, enrolled count and refresh status",
            "/lessons/{index}": "The Nth upcoming enrolled lesson (1-4)",
            "/enroll": "POST: enroll in a lesson",
            "/unenroll": "POST: cancel a registration"
        }
    }))
}

#[utoipa::path(get, path = "/healthz/live", tag = "fitblocks")]
pub async fn healthz_live() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

#[utoipa::path(get, path = "/healthz/ready", tag = "fitblocks")]
pub async fn healthz_ready(State(state): State<AppState>) -> impl IntoResponse {
    let info = state.coordinator.status();
    match info.status {
        CoordinatorStatus::Ok => (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))),
        status => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": status})),
        ),
    }
}

#[utoipa::path(
    get,
    path = "/schedule",
    params(
        ("token" = Option<String>, Query, description = "Authentication token (alternative to Bearer header)")
    ),
    responses(
        (status = 200, description = "All classes in the current window", body = [crate::models::ClassEvent]),
        (status = 401, description = "Invalid authentication token")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "fitblocks"
)]
pub async fn get_schedule(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<TokenQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let auth_header = auth.map(|TypedHeader(a)| a);
    verify_token(&state.settings, auth_header, query.token.as_deref())?;

    let snapshot = state.coordinator.snapshot();
    Ok(Json(snapshot.events.clone()))
}

#[utoipa::path(
    get,
    path = "/calendar.ical",
    params(
        ("token" = Option<String>, Query, description = "Authentication token (alternative to Bearer header)")
    ),
    responses(
        (status = 200, description = "iCal file with enrolled lessons", content_type = "text/calendar"),
        (status = 401, description = "Invalid authentication token"),
        (status = 404, description = "No enrolled lessons")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "fitblocks"
)]
pub async fn get_calendar(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<TokenQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let auth_header = auth.map(|TypedHeader(a)| a);
    verify_token(&state.settings, auth_header, query.token.as_deref())?;

    let snapshot = state.coordinator.snapshot();
    let body = state.exporter.generate(&snapshot);
    if body.is_empty() {
        return Err(ApiError::NotFound("No enrolled lessons found".into()));
    }

    Ok((
        StatusCode::OK,
        [
            ("content-type", "text/calendar"),
            (
                "content-disposition",
                "attachment; filename=fitblocks_lessons.ics",
            ),
        ],
        body,
    ))
}

#[utoipa::path(
    get,
    path = "/sensors",
    params(
        ("token" = Option<String>, Query, description = "Authentication token (alternative to Bearer header)")
    ),
    responses(
        (status = 200, description = "Derived sensor values", body = SensorsView),
        (status = 401, description = "Invalid authentication token")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "fitblocks"
)]
pub async fn get_sensors(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<TokenQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let auth_header = auth.map(|TypedHeader(a)| a);
    verify_token(&state.settings, auth_header, query.token.as_deref())?;

    let snapshot = state.coordinator.snapshot();
    let info = state.coordinator.status();
    Ok(Json(SensorsView {
        remaining_credits: views::remaining_credits(&snapshot),
        enrolled_lessons: views::enrolled_count(&snapshot),
        fetched_at: snapshot.fetched_at,
        last_attempt: info.last_attempt,
        status: info.status,
        stale: info.status != CoordinatorStatus::Ok,
    }))
}

#[utoipa::path(
    get,
    path = "/lessons/{index}",
    params(
        ("index" = usize, Path, description = "Lesson slot (1-4)"),
        ("token" = Option<String>, Query, description = "Authentication token (alternative to Bearer header)")
    ),
    responses(
        (status = 200, description = "The Nth upcoming enrolled lesson", body = LessonView),
        (status = 400, description = "Slot out of range"),
        (status = 401, description = "Invalid authentication token"),
        (status = 404, description = "Fewer lessons booked than the slot")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "fitblocks"
)]
pub async fn get_lesson(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Path(index): Path<usize>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<LessonView>, ApiError> {
    let auth_header = auth.map(|TypedHeader(a)| a);
    verify_token(&state.settings, auth_header, query.token.as_deref())?;

    if !(1..=MAX_LESSON_SLOTS).contains(&index) {
        return Err(ApiError::BadRequest(format!(
            "lesson index must be between 1 and {MAX_LESSON_SLOTS}"
        )));
    }

    let snapshot = state.coordinator.snapshot();
    views::lesson(&snapshot, index)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no enrolled lesson in slot {index}")))
}

#[utoipa::path(
    post,
    path = "/enroll",
    request_body = EnrollRequest,
    params(
        ("token" = Option<String>, Query, description = "Authentication token (alternative to Bearer header)")
    ),
    responses(
        (status = 200, description = "Enrolled", body = EnrollResponse),
        (status = 400, description = "Invalid time range"),
        (status = 401, description = "Invalid authentication token"),
        (status = 409, description = "Rejected by the remote service"),
        (status = 502, description = "Remote service unreachable")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "fitblocks"
)]
pub async fn post_enroll(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<TokenQuery>,
    Json(request): Json<EnrollRequest>,
) -> Result<Json<EnrollResponse>, ApiError> {
    let auth_header = auth.map(|TypedHeader(a)| a);
    verify_token(&state.settings, auth_header, query.token.as_deref())?;
    validate_lesson_window(request.start, request.end)?;

    let status = actions::enroll(
        &state.client,
        &state.coordinator,
        request.start,
        request.end,
        request.class_type_id,
    )
    .await?;
    Ok(Json(EnrollResponse { status }))
}

#[utoipa::path(
    post,
    path = "/unenroll",
    request_body = UnenrollRequest,
    params(
        ("token" = Option<String>, Query, description = "Authentication token (alternative to Bearer header)")
    ),
    responses(
        (status = 200, description = "Registration cancelled", body = EnrollResponse),
        (status = 401, description = "Invalid authentication token"),
        (status = 404, description = "Registration not found"),
        (status = 409, description = "Rejected by the remote service"),
        (status = 502, description = "Remote service unreachable")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "fitblocks"
)]
pub async fn post_unenroll(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<TokenQuery>,
    Json(request): Json<UnenrollRequest>,
) -> Result<Json<EnrollResponse>, ApiError> {
    let auth_header = auth.map(|TypedHeader(a)| a);
    verify_token(&state.settings, auth_header, query.token.as_deref())?;

    actions::unenroll(
        &state.client,
        &state.coordinator,
        request.schedule_registration_id,
        request.class_type_id,
    )
    .await?;
    Ok(Json(EnrollResponse {
        status: "success".to_string(),
    }))
}
