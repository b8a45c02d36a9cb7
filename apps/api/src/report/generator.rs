//! Report generation: one non-streaming completion over the full transcript.
//!
//! Flow: report lock → stored row (return if created) → completed check →
//!       wait out any running turn → LLM generate → render PDF → upload →
//!       flip `created`.
//!
//! The row is only written in the last step, so any earlier failure leaves it
//! untouched and a later call simply tries again.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{AppError, QUOTA_EXCEEDED_MESSAGE};
use crate::interview::lifecycle::{get_owned, PDF_MIME};
use crate::interview::relay::history_from_turns;
use crate::llm_client::{ChatMessage, CompletionRequest, CompletionService, LlmError};
use crate::models::report::ReportRow;
use crate::models::turn::TurnRow;
use crate::render::RenderError;
use crate::report::prompts::{REPORT_PARAMS, REPORT_REQUEST, REPORT_SYSTEM};
use crate::state::AppState;
use crate::storage::{report_key, StorageError};

/// Why a report could not be produced. Never stored as report text.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("completion service quota exhausted")]
    RateLimited,

    #[error("completion service returned an empty report")]
    Empty,

    #[error(transparent)]
    Llm(LlmError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

impl From<LlmError> for ReportError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::EmptyContent => ReportError::Empty,
            e if e.is_quota_exhausted() => ReportError::RateLimited,
            e => ReportError::Llm(e),
        }
    }
}

impl From<ReportError> for AppError {
    fn from(e: ReportError) -> Self {
        match e {
            ReportError::RateLimited => AppError::RateLimited(QUOTA_EXCEEDED_MESSAGE.to_string()),
            ReportError::Empty => AppError::Llm("empty report".to_string()),
            ReportError::Llm(e) => AppError::Llm(e.to_string()),
            ReportError::Render(e) => e.into(),
            ReportError::Storage(e) => e.into(),
            ReportError::Store(e) => AppError::Database(e),
        }
    }
}

/// Asks the completion service for the markdown report of a finished interview.
pub async fn generate_report(
    llm: &dyn CompletionService,
    turns: &[TurnRow],
    started_at: DateTime<Utc>,
) -> Result<String, ReportError> {
    let mut messages = history_from_turns(turns);
    messages.push(ChatMessage::user_text(REPORT_REQUEST));

    let request = CompletionRequest {
        system: format!(
            "{REPORT_SYSTEM}\n\nInterview started at: {}",
            started_at.to_rfc3339()
        ),
        messages,
        params: REPORT_PARAMS,
    };

    let markdown = llm.complete(&request).await?;
    let markdown = markdown.trim();
    if markdown.is_empty() {
        return Err(ReportError::Empty);
    }
    Ok(markdown.to_string())
}

/// Returns the interview's report, generating and storing it first if needed.
///
/// Serialized per interview: a second caller waits for the first and then
/// finds the row already created.
pub async fn ensure_report(
    state: &AppState,
    user_id: Uuid,
    interview_id: Uuid,
) -> Result<ReportRow, AppError> {
    let _permit = state
        .locks
        .acquire_report(interview_id)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("report lock closed: {e}")))?;

    let existing = state
        .store
        .get_report(user_id, interview_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Report for interview {interview_id} not found")))?;
    if existing.created {
        return Ok(existing);
    }

    let interview = get_owned(&*state.store, user_id, interview_id).await?;
    if !interview.completed {
        return Err(AppError::Validation(
            "Interview is not completed yet".to_string(),
        ));
    }

    // Completed is final, so once any running exchange has written its reply
    // no later turn can appear; the slot is only needed for the read.
    let turns = {
        let _turn = state
            .locks
            .acquire_turn(interview_id)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("turn lock closed: {e}")))?;
        state.store.list_turns(user_id, interview_id).await?
    };
    info!(
        "Generating report for interview {interview_id} from {} turns",
        turns.len()
    );

    let markdown = generate_report(&*state.llm, &turns, interview.created_at).await?;
    let pdf = state
        .renderer
        .markdown_to_pdf(&markdown)
        .await
        .map_err(ReportError::from)?;

    let key = report_key(user_id, interview_id);
    state
        .artifacts
        .upload(&key, pdf, PDF_MIME)
        .await
        .map_err(ReportError::from)?;

    let stored = state
        .store
        .complete_report(user_id, interview_id, &markdown, &key)
        .await?;
    match stored {
        Some(row) => {
            info!("Report stored for interview {interview_id}");
            Ok(row)
        }
        // Lost a race with a writer outside this process; theirs wins.
        None => state
            .store
            .get_report(user_id, interview_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Report for interview {interview_id} not found"))
            }),
    }
}

/// Generates the report in the background after an interview completes.
/// Failures are logged; `get-report` retries on demand.
pub fn spawn_report_generation(state: AppState, user_id: Uuid, interview_id: Uuid) {
    tokio::spawn(async move {
        if let Err(e) = ensure_report(&state, user_id, interview_id).await {
            warn!("Background report for interview {interview_id} failed: {e}");
        }
    });
}
