use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::interview::{InterviewRow, NewInterview};
use crate::models::report::ReportRow;
use crate::models::turn::{NewTurn, TurnRow};
use crate::store::InterviewStore;

const INTERVIEW_COLUMNS: &str =
    "id, user_id, title, candidate_name, interview_type, resume_url, completed, created_at";
const TURN_COLUMNS: &str =
    "id, interview_id, user_id, role, message, content, request_id, created_at";
const REPORT_COLUMNS: &str = "id, user_id, interview_id, report, report_url, created, created_at";

#[derive(Clone)]
pub struct PgInterviewStore {
    pool: PgPool,
}

impl PgInterviewStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InterviewStore for PgInterviewStore {
    async fn create_interview(&self, new: NewInterview) -> Result<InterviewRow, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO interviews
                (id, user_id, title, candidate_name, interview_type, resume_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {INTERVIEW_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, InterviewRow>(&sql)
            .bind(new.id)
            .bind(new.user_id)
            .bind(&new.title)
            .bind(&new.candidate_name)
            .bind(new.interview_type.as_str())
            .bind(&new.resume_url)
            .fetch_one(&mut *tx)
            .await?;

        // Placeholder report, filled in once the interview is over.
        sqlx::query("INSERT INTO reports (id, user_id, interview_id) VALUES ($1, $2, $3)")
            .bind(Uuid::new_v4())
            .bind(new.user_id)
            .bind(new.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("Created interview {} for user {}", row.id, row.user_id);
        Ok(row)
    }

    async fn get_interview(
        &self,
        user_id: Uuid,
        interview_id: Uuid,
    ) -> Result<Option<InterviewRow>, sqlx::Error> {
        let sql = format!("SELECT {INTERVIEW_COLUMNS} FROM interviews WHERE id = $1 AND user_id = $2");
        sqlx::query_as::<_, InterviewRow>(&sql)
            .bind(interview_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn list_interviews(&self, user_id: Uuid) -> Result<Vec<InterviewRow>, sqlx::Error> {
        let sql = format!(
            "SELECT {INTERVIEW_COLUMNS} FROM interviews WHERE user_id = $1 ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, InterviewRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn rename_interview(
        &self,
        user_id: Uuid,
        interview_id: Uuid,
        title: &str,
    ) -> Result<Option<InterviewRow>, sqlx::Error> {
        let sql = format!(
            "UPDATE interviews SET title = $3 WHERE id = $1 AND user_id = $2 RETURNING {INTERVIEW_COLUMNS}"
        );
        sqlx::query_as::<_, InterviewRow>(&sql)
            .bind(interview_id)
            .bind(user_id)
            .bind(title)
            .fetch_optional(&self.pool)
            .await
    }

    async fn mark_completed(&self, user_id: Uuid, interview_id: Uuid) -> Result<bool, sqlx::Error> {
        // Monotonic: the flag is only ever set, never cleared.
        let result = sqlx::query(
            "UPDATE interviews SET completed = TRUE WHERE id = $1 AND user_id = $2 AND completed = FALSE",
        )
        .bind(interview_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_interview(
        &self,
        user_id: Uuid,
        interview_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM interviews WHERE id = $1 AND user_id = $2")
            .bind(interview_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn append_turn(&self, turn: NewTurn) -> Result<TurnRow, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO messages
                (id, interview_id, user_id, role, message, content, request_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {TURN_COLUMNS}
            "#
        );
        sqlx::query_as::<_, TurnRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(turn.interview_id)
            .bind(turn.user_id)
            .bind(turn.role.as_str())
            .bind(&turn.message)
            .bind(Json(&turn.content))
            .bind(&turn.request_id)
            .fetch_one(&self.pool)
            .await
    }

    async fn list_turns(
        &self,
        user_id: Uuid,
        interview_id: Uuid,
    ) -> Result<Vec<TurnRow>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {TURN_COLUMNS}
            FROM messages
            WHERE interview_id = $1 AND user_id = $2
            ORDER BY created_at ASC, seq ASC
            "#
        );
        sqlx::query_as::<_, TurnRow>(&sql)
            .bind(interview_id)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn get_report(
        &self,
        user_id: Uuid,
        interview_id: Uuid,
    ) -> Result<Option<ReportRow>, sqlx::Error> {
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE interview_id = $1 AND user_id = $2"
        );
        sqlx::query_as::<_, ReportRow>(&sql)
            .bind(interview_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn complete_report(
        &self,
        user_id: Uuid,
        interview_id: Uuid,
        report: &str,
        report_url: &str,
    ) -> Result<Option<ReportRow>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE reports
            SET report = $3, report_url = $4, created = TRUE
            WHERE interview_id = $1 AND user_id = $2 AND created = FALSE
            RETURNING {REPORT_COLUMNS}
            "#
        );
        sqlx::query_as::<_, ReportRow>(&sql)
            .bind(interview_id)
            .bind(user_id)
            .bind(report)
            .bind(report_url)
            .fetch_optional(&self.pool)
            .await
    }
}
