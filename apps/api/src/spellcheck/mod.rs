// Spell check: one non-streaming completion that returns the corrected text.
// Nothing is persisted.

use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::llm_client::{
    ChatMessage, CompletionRequest, CompletionService, GenerationParams, LlmError,
};
use crate::response::{ApiJson, ApiResponse};
use crate::state::AppState;

const MAX_TEXT_CHARS: usize = 10_000;

pub const SPELLCHECK_PARAMS: GenerationParams = GenerationParams {
    temperature: 0.0,
    max_output_tokens: 4096,
    thinking_budget: 0,
};

pub const SPELLCHECK_SYSTEM: &str = "\
You are a proofreader. Correct the spelling, grammar and punctuation of the text \
the user sends. Keep the original meaning, tone and wording wherever it is already \
correct. Return ONLY the corrected text: no quotes, no explanations, no markdown.";

#[derive(Debug, Deserialize)]
pub struct SpellCheckRequest {
    pub text: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct SpellCheckResponse {
    pub text: String,
}

pub async fn correct_text(llm: &dyn CompletionService, text: &str) -> Result<String, AppError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::Validation("text cannot be empty".to_string()));
    }
    if text.chars().count() > MAX_TEXT_CHARS {
        return Err(AppError::Validation(format!(
            "text must be at most {MAX_TEXT_CHARS} characters"
        )));
    }

    let request = CompletionRequest {
        system: SPELLCHECK_SYSTEM.to_string(),
        messages: vec![ChatMessage::user_text(text)],
        params: SPELLCHECK_PARAMS,
    };
    match llm.complete(&request).await {
        Ok(corrected) => Ok(corrected.trim().to_string()),
        // Nothing to correct against; hand back what the user typed.
        Err(LlmError::EmptyContent) => Ok(text.to_string()),
        Err(e) => Err(e.into()),
    }
}

/// POST /spell-check
pub async fn handle_spell_check(
    State(state): State<AppState>,
    _user: AuthUser,
    ApiJson(request): ApiJson<SpellCheckRequest>,
) -> Result<ApiResponse<SpellCheckResponse>, AppError> {
    let text = correct_text(&*state.llm, &request.text).await?;
    Ok(ApiResponse::ok(SpellCheckResponse { text }))
}
