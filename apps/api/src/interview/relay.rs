//! Turn relay: one user utterance in, one streamed model reply out.
//!
//! Flow: check state → claim turn slot → persist user turn → open completion
//! stream → spawn pump task → caller drains the channel.
//!
//! The pump owns the turn permit, the upstream stream and the accumulated
//! reply. It forwards each fragment as soon as it arrives and persists the
//! model turn once, after the upstream stream ends. If the caller goes away
//! the channel closes, the pump drops the upstream stream (aborting the
//! HTTP request) and nothing further is written.

use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::completion::{is_interview_complete, COMPLETION_SENTINEL};
use crate::interview::prompts::{INTERVIEW_PARAMS, INTERVIEW_SYSTEM};
use crate::llm_client::{ChatMessage, CompletionRequest, FragmentStream};
use crate::models::interview::InterviewRow;
use crate::models::turn::{NewTurn, Role, TurnRow};
use crate::report::generator::spawn_report_generation;
use crate::state::AppState;

/// Fragments buffered between the pump and a slow client.
const RELAY_BUFFER: usize = 32;
const MAX_REQUEST_ID_LEN: usize = 128;

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeRequest {
    pub interview_id: Uuid,
    pub message: String,
    /// Client-generated idempotency key; a retry with the same key never
    /// creates a second user turn.
    #[serde(default)]
    pub request_id: Option<String>,
}

/// What the pump sends to the transport, in order. Exactly one terminal
/// event (`Done` or `Failed`) ends a healthy channel.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Fragment(String),
    Done { interview_completed: bool },
    Failed(String),
}

#[derive(Debug)]
pub enum ExchangeOutcome {
    Streaming(mpsc::Receiver<RelayEvent>),
    /// The interview is over; nothing was appended.
    AlreadyCompleted(InterviewRow),
}

/// Maps persisted turns to the completion-service history, in log order.
pub fn history_from_turns(turns: &[TurnRow]) -> Vec<ChatMessage> {
    turns
        .iter()
        .filter_map(|turn| match turn.role() {
            Some(role) => Some(ChatMessage {
                role,
                parts: turn.content.0.clone(),
            }),
            None => {
                warn!("Skipping turn {} with unknown role '{}'", turn.id, turn.role);
                None
            }
        })
        .collect()
}

/// Interviewer directive with the sentinel filled in and the start time appended.
pub fn interview_directive(interview: &InterviewRow) -> String {
    format!(
        "{}\n\nInterview type: {}\nInterview started at: {}",
        INTERVIEW_SYSTEM.replace("{sentinel}", COMPLETION_SENTINEL),
        interview.interview_type,
        interview.created_at.to_rfc3339()
    )
}

fn validate(request: &ExchangeRequest) -> Result<(), AppError> {
    if request.message.trim().is_empty() {
        return Err(AppError::Validation("message cannot be empty".to_string()));
    }
    if let Some(id) = &request.request_id {
        if id.trim().is_empty() || id.len() > MAX_REQUEST_ID_LEN {
            return Err(AppError::Validation(format!(
                "request_id must be 1 to {MAX_REQUEST_ID_LEN} characters"
            )));
        }
    }
    Ok(())
}

async fn load_interview(
    state: &AppState,
    user_id: Uuid,
    interview_id: Uuid,
) -> Result<InterviewRow, AppError> {
    state
        .store
        .get_interview(user_id, interview_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Interview {interview_id} not found")))
}

/// A channel that already holds a stored reply, for idempotent retries.
fn replay(reply: &str, interview_completed: bool) -> mpsc::Receiver<RelayEvent> {
    let (tx, rx) = mpsc::channel(2);
    // Capacity 2 holds both events; the receiver is still alive here.
    let _ = tx.try_send(RelayEvent::Fragment(reply.to_string()));
    let _ = tx.try_send(RelayEvent::Done {
        interview_completed,
    });
    rx
}

/// Runs one message exchange. Errors returned here happen before any fragment
/// is produced; later failures arrive in-band as `RelayEvent::Failed`.
pub async fn exchange(
    state: AppState,
    user_id: Uuid,
    request: ExchangeRequest,
) -> Result<ExchangeOutcome, AppError> {
    validate(&request)?;
    let interview_id = request.interview_id;

    let interview = load_interview(&state, user_id, interview_id).await?;
    if interview.completed {
        return Ok(ExchangeOutcome::AlreadyCompleted(interview));
    }

    let permit = state
        .locks
        .try_acquire_turn(interview_id)
        .map_err(|e| AppError::Conflict(e.to_string()))?;

    // Another turn may have completed the interview while we were checking.
    let interview = load_interview(&state, user_id, interview_id).await?;
    if interview.completed {
        return Ok(ExchangeOutcome::AlreadyCompleted(interview));
    }

    let mut turns = state.store.list_turns(user_id, interview_id).await?;
    if turns.is_empty() {
        return Err(AppError::Validation(
            "Interview has not been started yet".to_string(),
        ));
    }

    let retried = request.request_id.as_deref().and_then(|rid| {
        turns
            .iter()
            .position(|t| t.request_id.as_deref() == Some(rid))
    });

    match retried {
        Some(pos) => match turns.get(pos + 1) {
            Some(next) if next.role() == Some(Role::Model) => {
                info!("Replaying stored reply for interview {interview_id}");
                return Ok(ExchangeOutcome::Streaming(replay(
                    &next.message,
                    interview.completed,
                )));
            }
            Some(_) => {
                return Err(AppError::Conflict(
                    "request was superseded by a later message".to_string(),
                ));
            }
            // The earlier attempt saved the user turn but got no reply.
            None => info!("Retrying unanswered turn for interview {interview_id}"),
        },
        None => {
            let mut turn = NewTurn::text(
                interview_id,
                user_id,
                Role::User,
                request.message.trim().to_string(),
            );
            turn.request_id = request.request_id.clone();
            // Saved before the completion call so it survives an upstream failure.
            let saved = state.store.append_turn(turn).await?;
            turns.push(saved);
        }
    }

    let completion = CompletionRequest {
        system: interview_directive(&interview),
        messages: history_from_turns(&turns),
        params: INTERVIEW_PARAMS,
    };
    let upstream = state.llm.complete_stream(&completion).await?;

    let (tx, rx) = mpsc::channel(RELAY_BUFFER);
    let idle = state.limits.stream_idle_timeout;
    tokio::spawn(pump(state, permit, user_id, interview_id, upstream, tx, idle));

    Ok(ExchangeOutcome::Streaming(rx))
}

async fn pump(
    state: AppState,
    _permit: OwnedSemaphorePermit,
    user_id: Uuid,
    interview_id: Uuid,
    mut upstream: FragmentStream,
    tx: mpsc::Sender<RelayEvent>,
    idle: Duration,
) {
    let mut reply = String::new();

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                info!("Client left interview {interview_id} mid-stream; cancelling generation");
                return;
            }
            next = tokio::time::timeout(idle, upstream.next()) => next,
        };

        match next {
            Ok(Some(Ok(fragment))) => {
                reply.push_str(&fragment);
                if tx.send(RelayEvent::Fragment(fragment)).await.is_err() {
                    info!("Client left interview {interview_id} mid-stream; cancelling generation");
                    return;
                }
            }
            Ok(Some(Err(e))) => {
                error!("Completion stream failed for interview {interview_id}: {e}");
                let _ = tx.send(RelayEvent::Failed(e.to_string())).await;
                return;
            }
            Ok(None) => break,
            Err(_) => {
                warn!("Completion stream idle for {idle:?} on interview {interview_id}");
                let _ = tx
                    .send(RelayEvent::Failed("completion stream timed out".to_string()))
                    .await;
                return;
            }
        }
    }
    drop(upstream);

    if reply.trim().is_empty() {
        warn!("Completion stream for interview {interview_id} produced no text");
        let _ = tx
            .send(RelayEvent::Failed("empty model reply".to_string()))
            .await;
        return;
    }

    match finish_turn(&state, user_id, interview_id, reply).await {
        Ok(interview_completed) => {
            let _ = tx
                .send(RelayEvent::Done {
                    interview_completed,
                })
                .await;
        }
        Err(e) => {
            error!("Failed to persist model turn for interview {interview_id}: {e}");
            let _ = tx.send(RelayEvent::Failed(e.to_string())).await;
        }
    }
}

/// Persists the assembled reply and runs completion detection.
/// Returns whether the interview is now completed.
async fn finish_turn(
    state: &AppState,
    user_id: Uuid,
    interview_id: Uuid,
    reply: String,
) -> Result<bool, AppError> {
    let completed = is_interview_complete(&reply);
    state
        .store
        .append_turn(NewTurn::text(interview_id, user_id, Role::Model, reply))
        .await?;

    if completed && state.store.mark_completed(user_id, interview_id).await? {
        info!("Interview {interview_id} completed by closing line");
        spawn_report_generation(state.clone(), user_id, interview_id);
    }
    Ok(completed)
}
