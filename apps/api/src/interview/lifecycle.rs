//! Interview lifecycle: create, seed, list, rename, end, delete.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use chrono::NaiveDate;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::locks::ConversationLocks;
use crate::interview::prompts::INTRO_TEMPLATE;
use crate::models::interview::{
    interview_title, InterviewRow, InterviewType, NewInterview, UnknownInterviewType,
};
use crate::models::turn::{ContentPart, MessageView, NewTurn, Role};
use crate::storage::{resume_key, ArtifactStore};
use crate::store::InterviewStore;

pub const PDF_MIME: &str = "application/pdf";
const MAX_TITLE_LEN: usize = 200;

/// Parsed `create-interview` multipart form.
#[derive(Debug, Clone, Default)]
pub struct CreateInterviewForm {
    pub file: Option<Bytes>,
    pub file_content_type: Option<String>,
    pub username: Option<String>,
    pub interview_type: Option<String>,
    pub date: Option<String>,
}

fn required(field: Option<String>, name: &str) -> Result<String, AppError> {
    field
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

fn looks_like_pdf(bytes: &[u8], content_type: Option<&str>) -> bool {
    bytes.starts_with(b"%PDF-") || content_type.is_some_and(|ct| ct.eq_ignore_ascii_case(PDF_MIME))
}

pub async fn get_owned(
    store: &dyn InterviewStore,
    user_id: Uuid,
    interview_id: Uuid,
) -> Result<InterviewRow, AppError> {
    store
        .get_interview(user_id, interview_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Interview {interview_id} not found")))
}

/// Validates the form, uploads the résumé and creates the interview (plus its
/// placeholder report). The upload is removed again if the insert fails.
pub async fn create_interview(
    store: &dyn InterviewStore,
    artifacts: &dyn ArtifactStore,
    user_id: Uuid,
    form: CreateInterviewForm,
    max_resume_bytes: usize,
) -> Result<InterviewRow, AppError> {
    let username = required(form.username, "username")?;
    let kind: InterviewType = required(form.interview_type, "interview_type")?
        .parse()
        .map_err(|e: UnknownInterviewType| AppError::Validation(e.to_string()))?;
    let date = required(form.date, "date")?;
    NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| AppError::Validation("date must be formatted YYYY-MM-DD".to_string()))?;

    let file = form
        .file
        .filter(|f| !f.is_empty())
        .ok_or_else(|| AppError::Validation("file is required".to_string()))?;
    if file.len() > max_resume_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "resume must be at most {max_resume_bytes} bytes"
        )));
    }
    if !looks_like_pdf(&file, form.file_content_type.as_deref()) {
        return Err(AppError::Validation("resume must be a PDF".to_string()));
    }

    let interview_id = Uuid::new_v4();
    let key = resume_key(user_id, interview_id);
    artifacts.upload(&key, file, PDF_MIME).await?;

    let new = NewInterview {
        id: interview_id,
        user_id,
        title: interview_title(kind, &date),
        candidate_name: username,
        interview_type: kind,
        resume_url: key.clone(),
    };

    match store.create_interview(new).await {
        Ok(row) => Ok(row),
        Err(e) => {
            if let Err(cleanup) = artifacts.delete(&key).await {
                warn!("Failed to remove orphaned resume {key}: {cleanup}");
            }
            Err(e.into())
        }
    }
}

/// Builds the synthesized first turn: intro text plus the résumé inline.
pub fn seed_turn(interview: &InterviewRow, resume_pdf: &[u8]) -> NewTurn {
    let kind = interview
        .interview_type
        .parse::<InterviewType>()
        .map(|k| k.as_str())
        .unwrap_or("general");
    let intro = INTRO_TEMPLATE
        .replace("{name}", &interview.candidate_name)
        .replace("{kind}", kind);

    NewTurn {
        interview_id: interview.id,
        user_id: interview.user_id,
        role: Role::User,
        message: intro.clone(),
        content: vec![
            ContentPart::Text { text: intro },
            ContentPart::InlineData {
                mime_type: PDF_MIME.to_string(),
                data: BASE64.encode(resume_pdf),
            },
        ],
        request_id: None,
    }
}

/// Seeds the first turn if the log is empty; otherwise a no-op.
pub async fn start_interview(
    store: &dyn InterviewStore,
    artifacts: &dyn ArtifactStore,
    locks: &ConversationLocks,
    user_id: Uuid,
    interview_id: Uuid,
) -> Result<InterviewRow, AppError> {
    let interview = get_owned(store, user_id, interview_id).await?;
    if !store.list_turns(user_id, interview_id).await?.is_empty() {
        return Ok(interview);
    }

    let _permit = locks
        .try_acquire_turn(interview_id)
        .map_err(|e| AppError::Conflict(e.to_string()))?;
    // Re-check under the permit: a concurrent start may have seeded already.
    if !store.list_turns(user_id, interview_id).await?.is_empty() {
        return Ok(interview);
    }

    let resume = artifacts.download(&interview.resume_url).await?;
    store.append_turn(seed_turn(&interview, &resume)).await?;
    info!("Seeded interview {interview_id}");

    Ok(interview)
}

/// Ordered user-facing history; the synthesized first turn is left out.
pub async fn list_messages(
    store: &dyn InterviewStore,
    user_id: Uuid,
    interview_id: Uuid,
) -> Result<Vec<MessageView>, AppError> {
    get_owned(store, user_id, interview_id).await?;
    let turns = store.list_turns(user_id, interview_id).await?;
    Ok(turns.iter().skip(1).map(MessageView::from).collect())
}

pub async fn rename_interview(
    store: &dyn InterviewStore,
    user_id: Uuid,
    interview_id: Uuid,
    title: &str,
) -> Result<InterviewRow, AppError> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::Validation(format!(
            "title must be 1 to {MAX_TITLE_LEN} characters"
        )));
    }
    store
        .rename_interview(user_id, interview_id, title)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Interview {interview_id} not found")))
}

/// Owner-initiated end. Returns the interview and whether this call completed it.
///
/// Rejected with a conflict while an exchange is streaming, so the reply in
/// flight is never appended after the log is locked.
pub async fn end_interview(
    store: &dyn InterviewStore,
    locks: &ConversationLocks,
    user_id: Uuid,
    interview_id: Uuid,
) -> Result<(InterviewRow, bool), AppError> {
    let interview = get_owned(store, user_id, interview_id).await?;
    if interview.completed {
        return Ok((interview, false));
    }

    let _permit = locks
        .try_acquire_turn(interview_id)
        .map_err(|e| AppError::Conflict(e.to_string()))?;
    let newly_completed = store.mark_completed(user_id, interview_id).await?;
    let interview = get_owned(store, user_id, interview_id).await?;
    Ok((interview, newly_completed))
}

/// Removes stored objects first, then the row (turns and report cascade).
/// Object deletes tolerate missing keys, so a failed delete can be retried.
///
/// Holds the report slot throughout: a generation already running finishes
/// (and its PDF is removed here), one that starts later finds no row.
pub async fn delete_interview(
    store: &dyn InterviewStore,
    artifacts: &dyn ArtifactStore,
    locks: &ConversationLocks,
    user_id: Uuid,
    interview_id: Uuid,
) -> Result<(), AppError> {
    let interview = get_owned(store, user_id, interview_id).await?;
    let _report = locks
        .acquire_report(interview_id)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("report lock closed: {e}")))?;

    artifacts.delete(&interview.resume_url).await?;
    if let Some(report_key) = store
        .get_report(user_id, interview_id)
        .await?
        .and_then(|r| r.report_url)
    {
        artifacts.delete(&report_key).await?;
    }

    if !store.delete_interview(user_id, interview_id).await? {
        return Err(AppError::NotFound(format!(
            "Interview {interview_id} not found"
        )));
    }
    info!("Deleted interview {interview_id} for user {user_id}");
    Ok(())
}
