//! In-memory collaborators for unit and router tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sqlx::types::Json;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::auth::{AuthUser, IdentityError, IdentityOracle};
use crate::interview::lifecycle::{seed_turn, PDF_MIME};
use crate::interview::locks::ConversationLocks;
use crate::llm_client::{CompletionRequest, CompletionService, FragmentStream, LlmError};
use crate::models::interview::{interview_title, InterviewRow, InterviewType, NewInterview};
use crate::models::report::ReportRow;
use crate::models::turn::{NewTurn, Role, TurnRow};
use crate::render::{DocumentRenderer, RenderError};
use crate::state::{AppState, Limits};
use crate::storage::{resume_key, ArtifactStore, StorageError};
use crate::store::InterviewStore;

pub const TEST_TOKEN: &str = "test-token";

pub fn pdf_bytes() -> Bytes {
    Bytes::from_static(b"%PDF-1.4\n% test resume\n%%EOF\n")
}

// ── store ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct StoreInner {
    interviews: Vec<InterviewRow>,
    turns: Vec<TurnRow>,
    reports: Vec<ReportRow>,
    ticks: i64,
    fail_next_write: bool,
}

impl StoreInner {
    /// Strictly increasing timestamps so ordering never depends on clock resolution.
    fn now(&mut self) -> DateTime<Utc> {
        self.ticks += 1;
        DateTime::<Utc>::default() + chrono::Duration::microseconds(self.ticks)
    }

    fn check_write(&mut self) -> Result<(), sqlx::Error> {
        if std::mem::take(&mut self.fail_next_write) {
            return Err(sqlx::Error::Protocol("injected write failure".to_string()));
        }
        Ok(())
    }

    fn owned(&mut self, user_id: Uuid, interview_id: Uuid) -> Option<&mut InterviewRow> {
        self.interviews
            .iter_mut()
            .find(|i| i.id == interview_id && i.user_id == user_id)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    pub fn turns(&self, interview_id: Uuid) -> Vec<TurnRow> {
        self.inner
            .lock()
            .turns
            .iter()
            .filter(|t| t.interview_id == interview_id)
            .cloned()
            .collect()
    }

    pub fn interview(&self, interview_id: Uuid) -> Option<InterviewRow> {
        self.inner
            .lock()
            .interviews
            .iter()
            .find(|i| i.id == interview_id)
            .cloned()
    }

    pub fn report(&self, interview_id: Uuid) -> Option<ReportRow> {
        self.inner
            .lock()
            .reports
            .iter()
            .find(|r| r.interview_id == interview_id)
            .cloned()
    }

    pub fn set_completed(&self, interview_id: Uuid) {
        let mut inner = self.inner.lock();
        if let Some(row) = inner.interviews.iter_mut().find(|i| i.id == interview_id) {
            row.completed = true;
        }
    }

    pub fn remove_report(&self, interview_id: Uuid) {
        self.inner
            .lock()
            .reports
            .retain(|r| r.interview_id != interview_id);
    }

    /// The next write operation fails with a database error.
    pub fn fail_next_write(&self) {
        self.inner.lock().fail_next_write = true;
    }

    pub fn push_turn(&self, interview_id: Uuid, user_id: Uuid, role: Role, message: &str) {
        let mut inner = self.inner.lock();
        let created_at = inner.now();
        let turn = NewTurn::text(interview_id, user_id, role, message.to_string());
        inner.turns.push(TurnRow {
            id: Uuid::new_v4(),
            interview_id,
            user_id,
            role: turn.role.as_str().to_string(),
            message: turn.message,
            content: Json(turn.content),
            request_id: None,
            created_at,
        });
    }
}

#[async_trait]
impl InterviewStore for MemoryStore {
    async fn create_interview(&self, new: NewInterview) -> Result<InterviewRow, sqlx::Error> {
        let mut inner = self.inner.lock();
        inner.check_write()?;
        let created_at = inner.now();
        let row = InterviewRow {
            id: new.id,
            user_id: new.user_id,
            title: new.title,
            candidate_name: new.candidate_name,
            interview_type: new.interview_type.as_str().to_string(),
            resume_url: new.resume_url,
            completed: false,
            created_at,
        };
        inner.reports.push(ReportRow {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            interview_id: new.id,
            report: None,
            report_url: None,
            created: false,
            created_at,
        });
        inner.interviews.push(row.clone());
        Ok(row)
    }

    async fn get_interview(
        &self,
        user_id: Uuid,
        interview_id: Uuid,
    ) -> Result<Option<InterviewRow>, sqlx::Error> {
        Ok(self.inner.lock().owned(user_id, interview_id).cloned())
    }

    async fn list_interviews(&self, user_id: Uuid) -> Result<Vec<InterviewRow>, sqlx::Error> {
        let inner = self.inner.lock();
        let mut rows: Vec<InterviewRow> = inner
            .interviews
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn rename_interview(
        &self,
        user_id: Uuid,
        interview_id: Uuid,
        title: &str,
    ) -> Result<Option<InterviewRow>, sqlx::Error> {
        let mut inner = self.inner.lock();
        inner.check_write()?;
        Ok(inner.owned(user_id, interview_id).map(|row| {
            row.title = title.to_string();
            row.clone()
        }))
    }

    async fn mark_completed(&self, user_id: Uuid, interview_id: Uuid) -> Result<bool, sqlx::Error> {
        let mut inner = self.inner.lock();
        inner.check_write()?;
        Ok(match inner.owned(user_id, interview_id) {
            Some(row) if !row.completed => {
                row.completed = true;
                true
            }
            _ => false,
        })
    }

    async fn delete_interview(
        &self,
        user_id: Uuid,
        interview_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let mut inner = self.inner.lock();
        inner.check_write()?;
        if inner.owned(user_id, interview_id).is_none() {
            return Ok(false);
        }
        inner.interviews.retain(|i| i.id != interview_id);
        inner.turns.retain(|t| t.interview_id != interview_id);
        inner.reports.retain(|r| r.interview_id != interview_id);
        Ok(true)
    }

    async fn append_turn(&self, turn: NewTurn) -> Result<TurnRow, sqlx::Error> {
        let mut inner = self.inner.lock();
        inner.check_write()?;
        if inner.owned(turn.user_id, turn.interview_id).is_none() {
            return Err(sqlx::Error::RowNotFound);
        }
        let duplicate = turn.request_id.is_some()
            && inner.turns.iter().any(|t| {
                t.interview_id == turn.interview_id && t.request_id == turn.request_id
            });
        if duplicate {
            return Err(sqlx::Error::Protocol(
                "duplicate request_id for interview".to_string(),
            ));
        }
        let created_at = inner.now();
        let row = TurnRow {
            id: Uuid::new_v4(),
            interview_id: turn.interview_id,
            user_id: turn.user_id,
            role: turn.role.as_str().to_string(),
            message: turn.message,
            content: Json(turn.content),
            request_id: turn.request_id,
            created_at,
        };
        inner.turns.push(row.clone());
        Ok(row)
    }

    async fn list_turns(
        &self,
        user_id: Uuid,
        interview_id: Uuid,
    ) -> Result<Vec<TurnRow>, sqlx::Error> {
        Ok(self
            .inner
            .lock()
            .turns
            .iter()
            .filter(|t| t.interview_id == interview_id && t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_report(
        &self,
        user_id: Uuid,
        interview_id: Uuid,
    ) -> Result<Option<ReportRow>, sqlx::Error> {
        Ok(self
            .inner
            .lock()
            .reports
            .iter()
            .find(|r| r.interview_id == interview_id && r.user_id == user_id)
            .cloned())
    }

    async fn complete_report(
        &self,
        user_id: Uuid,
        interview_id: Uuid,
        report: &str,
        report_url: &str,
    ) -> Result<Option<ReportRow>, sqlx::Error> {
        let mut inner = self.inner.lock();
        inner.check_write()?;
        Ok(inner
            .reports
            .iter_mut()
            .find(|r| r.interview_id == interview_id && r.user_id == user_id && !r.created)
            .map(|r| {
                r.report = Some(report.to_string());
                r.report_url = Some(report_url.to_string());
                r.created = true;
                r.clone()
            }))
    }
}

// ── artifacts ──────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryArtifacts {
    objects: Mutex<HashMap<String, Bytes>>,
    fail_next_upload: AtomicBool,
}

impl MemoryArtifacts {
    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn fail_next_upload(&self) {
        self.fail_next_upload.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifacts {
    async fn upload(
        &self,
        key: &str,
        bytes: Bytes,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        if self.fail_next_upload.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Backend("injected upload failure".to_string()));
        }
        self.objects.lock().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Bytes, StorageError> {
        self.objects
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.lock().remove(key);
        Ok(())
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String, StorageError> {
        Ok(format!(
            "https://storage.test/{key}?expires={}",
            expires_in.as_secs()
        ))
    }
}

// ── completion service ─────────────────────────────────────────────────────

enum StreamScript {
    Fragments(Vec<String>),
    FragmentsThenError(Vec<String>),
    Gated(Vec<String>, Arc<Notify>),
    Fail { status: u16, message: String },
}

enum CompleteScript {
    Text(String),
    Fail { status: u16, message: String },
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn owned(fragments: &[&str]) -> Vec<String> {
    fragments.iter().map(|f| f.to_string()).collect()
}

/// Scripted completion service. Unscripted calls fail instead of panicking,
/// since background report tasks may call in after a test has finished.
#[derive(Default)]
pub struct FakeLlm {
    streams: Mutex<VecDeque<StreamScript>>,
    completions: Mutex<VecDeque<CompleteScript>>,
    requests: Mutex<Vec<CompletionRequest>>,
    stream_calls: AtomicUsize,
    complete_calls: AtomicUsize,
    gated_dropped: Arc<AtomicBool>,
}

impl FakeLlm {
    pub fn push_stream(&self, fragments: &[&str]) {
        self.streams
            .lock()
            .push_back(StreamScript::Fragments(owned(fragments)));
    }

    pub fn push_stream_then_error(&self, fragments: &[&str]) {
        self.streams
            .lock()
            .push_back(StreamScript::FragmentsThenError(owned(fragments)));
    }

    /// Yields the first fragment, then waits on the returned gate before the rest.
    pub fn push_gated_stream(&self, fragments: &[&str]) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.streams
            .lock()
            .push_back(StreamScript::Gated(owned(fragments), gate.clone()));
        gate
    }

    pub fn fail_next_stream(&self, status: u16, message: &str) {
        self.streams.lock().push_back(StreamScript::Fail {
            status,
            message: message.to_string(),
        });
    }

    pub fn push_completion(&self, text: &str) {
        self.completions
            .lock()
            .push_back(CompleteScript::Text(text.to_string()));
    }

    pub fn fail_next_completion(&self, status: u16, message: &str) {
        self.completions.lock().push_back(CompleteScript::Fail {
            status,
            message: message.to_string(),
        });
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().last().cloned()
    }

    pub fn gated_stream_dropped(&self) -> bool {
        self.gated_dropped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionService for FakeLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        match self.completions.lock().pop_front() {
            // Blank text is an error, as with the real client.
            Some(CompleteScript::Text(text)) if text.trim().is_empty() => Err(LlmError::EmptyContent),
            Some(CompleteScript::Text(text)) => Ok(text),
            Some(CompleteScript::Fail { status, message }) => Err(LlmError::Api { status, message }),
            None => Err(LlmError::Api {
                status: 500,
                message: "no scripted completion".to_string(),
            }),
        }
    }

    async fn complete_stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<FragmentStream, LlmError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        let script = self.streams.lock().pop_front();

        let stream: FragmentStream = match script {
            Some(StreamScript::Fragments(fragments)) => Box::pin(async_stream::stream! {
                for fragment in fragments {
                    yield Ok(fragment);
                }
            }),
            Some(StreamScript::FragmentsThenError(fragments)) => Box::pin(async_stream::stream! {
                for fragment in fragments {
                    yield Ok(fragment);
                }
                yield Err(LlmError::Api { status: 500, message: "stream reset".to_string() });
            }),
            Some(StreamScript::Gated(fragments, gate)) => {
                let flag = self.gated_dropped.clone();
                Box::pin(async_stream::stream! {
                    let _guard = DropFlag(flag);
                    let mut fragments = fragments.into_iter();
                    if let Some(first) = fragments.next() {
                        yield Ok(first);
                    }
                    gate.notified().await;
                    for fragment in fragments {
                        yield Ok(fragment);
                    }
                })
            }
            Some(StreamScript::Fail { status, message }) => {
                return Err(LlmError::Api { status, message })
            }
            None => {
                return Err(LlmError::Api {
                    status: 500,
                    message: "no scripted stream".to_string(),
                })
            }
        };
        Ok(stream)
    }
}

// ── renderer / identity ────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeRenderer {
    fail_next: AtomicBool,
    calls: AtomicUsize,
}

impl FakeRenderer {
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentRenderer for FakeRenderer {
    async fn markdown_to_pdf(&self, markdown: &str) -> Result<Bytes, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(RenderError::EmptyOutput);
        }
        Ok(Bytes::from(format!("%PDF-1.4\n{markdown}")))
    }
}

/// Accepts exactly the tokens registered with `allow`.
#[derive(Default)]
pub struct FakeIdentity {
    tokens: Mutex<HashMap<String, AuthUser>>,
    unavailable: AtomicBool,
}

impl FakeIdentity {
    pub fn allow(&self, token: &str, user_id: Uuid) {
        self.tokens.lock().insert(
            token.to_string(),
            AuthUser {
                id: user_id,
                email: Some("candidate@example.com".to_string()),
            },
        );
    }

    pub fn set_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityOracle for FakeIdentity {
    async fn verify(&self, token: &str) -> Result<AuthUser, IdentityError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IdentityError::Oracle("connection refused".to_string()));
        }
        self.tokens
            .lock()
            .get(token)
            .cloned()
            .ok_or(IdentityError::InvalidToken)
    }
}

// ── harness ────────────────────────────────────────────────────────────────

pub struct TestHarness {
    pub user_id: Uuid,
    pub store: Arc<MemoryStore>,
    pub artifacts: Arc<MemoryArtifacts>,
    pub llm: Arc<FakeLlm>,
    pub identity: Arc<FakeIdentity>,
    pub renderer: Arc<FakeRenderer>,
    pub locks: Arc<ConversationLocks>,
    pub limits: Limits,
}

impl TestHarness {
    pub fn new() -> Self {
        let user_id = Uuid::new_v4();
        let identity = Arc::new(FakeIdentity::default());
        identity.allow(TEST_TOKEN, user_id);
        Self {
            user_id,
            store: Arc::new(MemoryStore::default()),
            artifacts: Arc::new(MemoryArtifacts::default()),
            llm: Arc::new(FakeLlm::default()),
            identity,
            renderer: Arc::new(FakeRenderer::default()),
            locks: Arc::new(ConversationLocks::new()),
            limits: Limits {
                max_resume_bytes: 1024 * 1024,
                stream_idle_timeout: Duration::from_secs(5),
            },
        }
    }

    pub fn state(&self) -> AppState {
        AppState {
            store: self.store.clone(),
            artifacts: self.artifacts.clone(),
            llm: self.llm.clone(),
            identity: self.identity.clone(),
            renderer: self.renderer.clone(),
            locks: self.locks.clone(),
            limits: self.limits,
        }
    }

    /// A technical interview for "Jane" with an uploaded résumé and an empty log.
    pub async fn create_interview(&self) -> InterviewRow {
        let id = Uuid::new_v4();
        let key = resume_key(self.user_id, id);
        self.artifacts
            .upload(&key, pdf_bytes(), PDF_MIME)
            .await
            .unwrap();
        self.store
            .create_interview(NewInterview {
                id,
                user_id: self.user_id,
                title: interview_title(InterviewType::Technical, "2024-01-01"),
                candidate_name: "Jane".to_string(),
                interview_type: InterviewType::Technical,
                resume_url: key,
            })
            .await
            .unwrap()
    }
}

/// An interview whose log already holds the synthesized first turn.
pub async fn seeded_interview(h: &TestHarness) -> InterviewRow {
    let interview = h.create_interview().await;
    h.store
        .append_turn(seed_turn(&interview, &pdf_bytes()))
        .await
        .unwrap();
    interview
}
