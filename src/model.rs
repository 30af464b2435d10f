use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicYear {
    pub id: String,
    pub label: String,
    pub is_current: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub classroom_ids: Vec<String>,
    pub total_xp: i64,
}

/// A grade as stored by the gradebook UI. `value` is numeric-as-text with a
/// locale-ambiguous decimal separator; see `grade::normalize_grade`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: String,
    pub student_id: String,
    pub subject: String,
    pub kind: String,
    pub value: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsenceStatus {
    Justified,
    Other,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Absence {
    pub id: String,
    pub student_id: String,
    pub date: DateTime<Utc>,
    pub status: AbsenceStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub student_id: String,
    pub assignment_id: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub classroom_id: String,
    pub kind: String,
    pub due_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classroom {
    pub id: String,
    pub subject: String,
    pub grade_level: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEvent {
    pub id: String,
    pub student_id: String,
    pub event_name: String,
    pub occurred_at: DateTime<Utc>,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only award record. Created exclusively by the engine; the UI owns
/// only the `seen_by_user` flag.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarnedBadge {
    pub id: String,
    pub badge_id: String,
    pub earned_at: DateTime<Utc>,
    pub seen_by_user: bool,
    pub source_document_id: Option<String>,
    pub details: String,
}

#[derive(Debug, Clone, Copy)]
pub struct BadgeDefinition {
    pub id: &'static str,
    pub title: &'static str,
    pub xp: i64,
}

/// Immutable per-student join of everything the rules read. Built once by the
/// aggregator; rule evaluators never touch the store.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub student: Student,
    pub grades: Vec<Grade>,
    pub absences: Vec<Absence>,
    pub submissions: Vec<Submission>,
    pub assignments: Vec<Assignment>,
    pub classrooms: Vec<Classroom>,
    pub events: Vec<UserEvent>,
    pub announcements: Vec<Announcement>,
    pub earned: Vec<EarnedBadge>,
    /// Evaluation instant, injected so time-window rules are testable.
    pub now: DateTime<Utc>,
}

/// How the idempotency guard decides whether a candidate is new.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupKey {
    /// At most one award per student, ever.
    Singleton,
    /// At most one award per student per natural key (a source document id
    /// or a derived group key).
    Keyed(String),
    /// Admitted only if every prior award of this badge predates the given
    /// instant. Used by time-gated re-armable badges.
    RearmBefore(DateTime<Utc>),
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub badge_id: &'static str,
    pub dedup: DedupKey,
    pub details: String,
}

impl Candidate {
    pub fn source_document_id(&self) -> Option<&str> {
        match &self.dedup {
            DedupKey::Keyed(k) => Some(k.as_str()),
            _ => None,
        }
    }
}

/// One accepted candidate, ready to persist.
#[derive(Debug, Clone)]
pub struct NewAward {
    pub id: String,
    pub badge_id: String,
    pub source_document_id: Option<String>,
    pub details: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentOutcome {
    pub student_id: String,
    pub new_awards: usize,
    pub total_xp: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub year_id: Option<String>,
    pub students: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub awards_granted: usize,
}
