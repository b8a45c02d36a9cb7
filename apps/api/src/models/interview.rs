use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One interview session: the résumé, the chosen variant and its turn log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct InterviewRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub candidate_name: String,
    pub interview_type: String,
    /// Object-store key of the uploaded résumé PDF.
    pub resume_url: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when an interview is created. The store assigns `created_at`.
#[derive(Debug, Clone)]
pub struct NewInterview {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub candidate_name: String,
    pub interview_type: InterviewType,
    pub resume_url: String,
}

/// The closed set of interview variants a user can pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterviewType {
    Technical,
    Behavioral,
    General,
}

impl InterviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewType::Technical => "technical",
            InterviewType::Behavioral => "behavioral",
            InterviewType::General => "general",
        }
    }

    /// Capitalized form used in titles and prompts.
    pub fn label(&self) -> &'static str {
        match self {
            InterviewType::Technical => "Technical",
            InterviewType::Behavioral => "Behavioral",
            InterviewType::General => "General",
        }
    }
}

impl fmt::Display for InterviewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownInterviewType(pub String);

impl fmt::Display for UnknownInterviewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown interview type '{}' (expected technical, behavioral or general)",
            self.0
        )
    }
}

impl std::error::Error for UnknownInterviewType {}

impl FromStr for InterviewType {
    type Err = UnknownInterviewType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "technical" => Ok(InterviewType::Technical),
            "behavioral" | "behavioural" => Ok(InterviewType::Behavioral),
            "general" => Ok(InterviewType::General),
            _ => Err(UnknownInterviewType(s.to_string())),
        }
    }
}

/// Display title derived at creation time, e.g. `Technical Interview - 2024-01-01`.
pub fn interview_title(kind: InterviewType, date: &str) -> String {
    format!("{} Interview - {}", kind.label(), date.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_uses_variant_label_and_date() {
        assert_eq!(
            interview_title(InterviewType::Technical, "2024-01-01"),
            "Technical Interview - 2024-01-01"
        );
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            "Behavioral".parse::<InterviewType>(),
            Ok(InterviewType::Behavioral)
        );
        assert_eq!(" general ".parse::<InterviewType>(), Ok(InterviewType::General));
    }

    #[test]
    fn test_parse_rejects_unknown_variant() {
        assert!("system-design".parse::<InterviewType>().is_err());
    }
}
