use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Speaker of a turn. The completion service uses the same two role names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "model" => Some(Role::Model),
            _ => None,
        }
    }
}

/// One typed segment of a turn's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    /// Binary attachment carried inline, base64-encoded.
    InlineData {
        mime_type: String,
        data: String,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }
}

/// A persisted turn. Immutable once inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TurnRow {
    pub id: Uuid,
    pub interview_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub message: String,
    pub content: Json<Vec<ContentPart>>,
    pub request_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TurnRow {
    pub fn role(&self) -> Option<Role> {
        Role::parse(&self.role)
    }
}

/// A turn about to be appended. The store assigns `id` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewTurn {
    pub interview_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    pub message: String,
    pub content: Vec<ContentPart>,
    pub request_id: Option<String>,
}

impl NewTurn {
    /// A plain-text turn whose content is exactly its rendered message.
    pub fn text(interview_id: Uuid, user_id: Uuid, role: Role, message: String) -> Self {
        Self {
            interview_id,
            user_id,
            role,
            content: vec![ContentPart::text(message.clone())],
            message,
            request_id: None,
        }
    }
}

/// User-facing view of a turn: no attachments, no ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageView {
    pub role: String,
    pub message: String,
}

impl From<&TurnRow> for MessageView {
    fn from(turn: &TurnRow) -> Self {
        Self {
            role: turn.role.clone(),
            message: turn.message.clone(),
        }
    }
}
