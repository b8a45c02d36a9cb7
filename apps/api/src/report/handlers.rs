//! Axum route handlers for the Report API.

use std::time::Duration;

use axum::extract::State;
use serde::Serialize;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::interview::handlers::InterviewIdRequest;
use crate::models::report::ReportRow;
use crate::report::generator::ensure_report;
use crate::response::{ApiJson, ApiResponse};
use crate::state::AppState;

const REPORT_URL_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    #[serde(flatten)]
    pub report: ReportRow,
    /// Short-lived link to the rendered PDF.
    pub report_signed_url: Option<String>,
}

/// POST /interview/get-report
///
/// Returns the stored report, generating it synchronously if it does not exist yet.
pub async fn handle_get_report(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(request): ApiJson<InterviewIdRequest>,
) -> Result<ApiResponse<ReportResponse>, AppError> {
    let report = ensure_report(&state, user.id, request.interview_id).await?;

    let report_signed_url = match report.report_url.as_deref() {
        Some(key) => Some(state.artifacts.signed_url(key, REPORT_URL_TTL).await?),
        None => None,
    };

    Ok(ApiResponse::ok(ReportResponse {
        report,
        report_signed_url,
    }))
}
