pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::interview::handlers;
use crate::report::handlers::handle_get_report;
use crate::spellcheck::handle_spell_check;
use crate::state::AppState;

/// Multipart framing and the text fields on top of the résumé itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.limits.max_resume_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(health::health_handler))
        // Interview API
        .route(
            "/interview/create-interview",
            post(handlers::handle_create_interview).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/interview/start-interview",
            post(handlers::handle_start_interview),
        )
        .route(
            "/interview/continue-interview",
            post(handlers::handle_continue_interview),
        )
        .route("/interview/get-messages", post(handlers::handle_get_messages))
        .route(
            "/interview/get-interviews",
            post(handlers::handle_get_interviews),
        )
        .route("/interview/get-interview", post(handlers::handle_get_interview))
        .route(
            "/interview/delete-interview",
            post(handlers::handle_delete_interview),
        )
        .route(
            "/interview/rename-interview",
            post(handlers::handle_rename_interview),
        )
        .route("/interview/end-interview", post(handlers::handle_end_interview))
        // Report API
        .route("/interview/get-report", post(handle_get_report))
        // Spell check
        .route("/spell-check", post(handle_spell_check))
        .with_state(state)
}
