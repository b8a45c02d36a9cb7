//! Data-access layer for interviews, turns and reports.
//!
//! Every operation takes the caller's user id and filters on it, so a caller can
//! never read or mutate another user's rows even if a handler forgets a check.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::interview::{InterviewRow, NewInterview};
use crate::models::report::ReportRow;
use crate::models::turn::{NewTurn, TurnRow};

pub mod postgres;

pub use postgres::PgInterviewStore;

#[async_trait]
pub trait InterviewStore: Send + Sync {
    /// Inserts the interview together with its empty placeholder report.
    async fn create_interview(&self, new: NewInterview) -> Result<InterviewRow, sqlx::Error>;

    async fn get_interview(
        &self,
        user_id: Uuid,
        interview_id: Uuid,
    ) -> Result<Option<InterviewRow>, sqlx::Error>;

    /// Newest first.
    async fn list_interviews(&self, user_id: Uuid) -> Result<Vec<InterviewRow>, sqlx::Error>;

    async fn rename_interview(
        &self,
        user_id: Uuid,
        interview_id: Uuid,
        title: &str,
    ) -> Result<Option<InterviewRow>, sqlx::Error>;

    /// Sets `completed`. Returns true only for the false → true transition.
    async fn mark_completed(&self, user_id: Uuid, interview_id: Uuid) -> Result<bool, sqlx::Error>;

    /// Deletes the interview; its turns and report go with it.
    /// Returns false if nothing matched.
    async fn delete_interview(&self, user_id: Uuid, interview_id: Uuid)
        -> Result<bool, sqlx::Error>;

    async fn append_turn(&self, turn: NewTurn) -> Result<TurnRow, sqlx::Error>;

    /// Full turn log in creation order.
    async fn list_turns(
        &self,
        user_id: Uuid,
        interview_id: Uuid,
    ) -> Result<Vec<TurnRow>, sqlx::Error>;

    async fn get_report(
        &self,
        user_id: Uuid,
        interview_id: Uuid,
    ) -> Result<Option<ReportRow>, sqlx::Error>;

    /// Fills in the report and flips `created`. Returns `None` if the row is
    /// missing or was already created.
    async fn complete_report(
        &self,
        user_id: Uuid,
        interview_id: Uuid,
        report: &str,
        report_url: &str,
    ) -> Result<Option<ReportRow>, sqlx::Error>;
}
