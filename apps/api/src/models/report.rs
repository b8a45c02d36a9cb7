use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Interview report. Inserted empty alongside its interview, filled in once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ReportRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub interview_id: Uuid,
    /// Generated markdown; `None` until `created`.
    pub report: Option<String>,
    /// Object-store key of the rendered PDF.
    pub report_url: Option<String>,
    pub created: bool,
    pub created_at: DateTime<Utc>,
}
