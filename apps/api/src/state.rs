use std::sync::Arc;
use std::time::Duration;

use crate::auth::IdentityOracle;
use crate::interview::locks::ConversationLocks;
use crate::llm_client::CompletionService;
use crate::render::DocumentRenderer;
use crate::storage::ArtifactStore;
use crate::store::InterviewStore;

/// Shared application state injected into all route handlers via Axum extractors.
///
/// Every collaborator is built once in `main` and shared behind a trait object,
/// so tests swap in in-memory fakes without touching handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn InterviewStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub llm: Arc<dyn CompletionService>,
    pub identity: Arc<dyn IdentityOracle>,
    pub renderer: Arc<dyn DocumentRenderer>,
    /// Per-conversation turn and report locks. In-process only.
    pub locks: Arc<ConversationLocks>,
    pub limits: Limits,
}

/// Request-size and timing bounds taken from `Config`.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_resume_bytes: usize,
    /// Longest gap tolerated between two streamed fragments.
    pub stream_idle_timeout: Duration,
}
