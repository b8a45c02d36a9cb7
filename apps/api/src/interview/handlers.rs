//! Axum route handlers for the Interview API.

use std::time::Duration;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::interview::lifecycle::{self, CreateInterviewForm};
use crate::interview::relay::{exchange, ExchangeOutcome, ExchangeRequest};
use crate::interview::stream::relay_response;
use crate::models::interview::InterviewRow;
use crate::models::turn::MessageView;
use crate::report::generator::spawn_report_generation;
use crate::response::{ApiJson, ApiResponse};
use crate::state::AppState;

const RESUME_URL_TTL: Duration = Duration::from_secs(15 * 60);

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct InterviewIdRequest {
    pub interview_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub interview_id: Uuid,
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct InterviewDetail {
    #[serde(flatten)]
    pub interview: InterviewRow,
    pub resume_signed_url: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("upload exceeds the size limit".to_string())
    } else {
        AppError::Validation(format!("invalid multipart body: {}", e.body_text()))
    }
}

async fn read_form(mut multipart: Multipart) -> Result<CreateInterviewForm, AppError> {
    let mut form = CreateInterviewForm::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                form.file_content_type = field.content_type().map(str::to_string);
                form.file = Some(field.bytes().await.map_err(multipart_error)?);
            }
            "username" => form.username = Some(field.text().await.map_err(multipart_error)?),
            "interview_type" => {
                form.interview_type = Some(field.text().await.map_err(multipart_error)?)
            }
            "date" => form.date = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }
    Ok(form)
}

/// POST /interview/create-interview
///
/// Multipart: `file` (PDF résumé), `username`, `interview_type`, `date`.
pub async fn handle_create_interview(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<InterviewRow>, AppError> {
    let multipart = multipart.map_err(|e| AppError::Validation(e.body_text()))?;
    let form = read_form(multipart).await?;
    let row = lifecycle::create_interview(
        &*state.store,
        &*state.artifacts,
        user.id,
        form,
        state.limits.max_resume_bytes,
    )
    .await?;
    info!("User {} created interview {}", user.id, row.id);
    Ok(ApiResponse::with_message(row, "Interview created"))
}

/// POST /interview/start-interview
///
/// Seeds the résumé turn on first call; later calls return the interview unchanged.
pub async fn handle_start_interview(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<InterviewIdRequest>,
) -> Result<ApiResponse<InterviewRow>, AppError> {
    let row = lifecycle::start_interview(
        &*state.store,
        &*state.artifacts,
        &state.locks,
        user.id,
        request.interview_id,
    )
    .await?;
    Ok(ApiResponse::ok(row))
}

/// POST /interview/continue-interview
///
/// Streams the model reply as chunked text. A completed interview gets the
/// JSON envelope with its current state instead.
pub async fn handle_continue_interview(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<ExchangeRequest>,
) -> Result<Response, AppError> {
    match exchange(state, user.id, request).await? {
        ExchangeOutcome::Streaming(rx) => Ok(relay_response(rx)),
        ExchangeOutcome::AlreadyCompleted(row) => {
            Ok(ApiResponse::with_message(row, "Interview already completed").into_response())
        }
    }
}

/// POST /interview/get-messages
pub async fn handle_get_messages(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<InterviewIdRequest>,
) -> Result<ApiResponse<Vec<MessageView>>, AppError> {
    let messages = lifecycle::list_messages(&*state.store, user.id, request.interview_id).await?;
    Ok(ApiResponse::ok(messages))
}

/// POST /interview/get-interviews
///
/// Newest first.
pub async fn handle_get_interviews(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<ApiResponse<Vec<InterviewRow>>, AppError> {
    let rows = state.store.list_interviews(user.id).await?;
    Ok(ApiResponse::ok(rows))
}

/// POST /interview/get-interview
pub async fn handle_get_interview(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<InterviewIdRequest>,
) -> Result<ApiResponse<InterviewDetail>, AppError> {
    let interview = lifecycle::get_owned(&*state.store, user.id, request.interview_id).await?;
    let resume_signed_url = state
        .artifacts
        .signed_url(&interview.resume_url, RESUME_URL_TTL)
        .await?;
    Ok(ApiResponse::ok(InterviewDetail {
        interview,
        resume_signed_url,
    }))
}

/// POST /interview/delete-interview
pub async fn handle_delete_interview(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<InterviewIdRequest>,
) -> Result<ApiResponse<()>, AppError> {
    lifecycle::delete_interview(
        &*state.store,
        &*state.artifacts,
        &state.locks,
        user.id,
        request.interview_id,
    )
    .await?;
    Ok(ApiResponse::<()>::message("Interview deleted"))
}

/// POST /interview/rename-interview
pub async fn handle_rename_interview(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<RenameRequest>,
) -> Result<ApiResponse<InterviewRow>, AppError> {
    let row = lifecycle::rename_interview(
        &*state.store,
        user.id,
        request.interview_id,
        &request.title,
    )
    .await?;
    Ok(ApiResponse::ok(row))
}

/// POST /interview/end-interview
///
/// Marks the interview completed and starts report generation the first time.
pub async fn handle_end_interview(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<InterviewIdRequest>,
) -> Result<ApiResponse<InterviewRow>, AppError> {
    let (row, newly_completed) =
        lifecycle::end_interview(&*state.store, &state.locks, user.id, request.interview_id)
            .await?;
    if newly_completed {
        info!("Interview {} ended by user {}", row.id, user.id);
        spawn_report_generation(state.clone(), user.id, row.id);
    }
    Ok(ApiResponse::ok(row))
}
