//! Per-student evaluation pipeline: fan-out aggregation into an immutable
//! snapshot, pure rule evaluation, idempotency filtering, XP recomputation,
//! and a single atomic commit.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::catalog;
use crate::model::{Candidate, DedupKey, EarnedBadge, NewAward, Snapshot, Student, StudentOutcome};
use crate::rules;
use crate::store::{BadgeStore, StoreError, StoreResult};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("aggregation failed: {0}")]
    Aggregation(#[source] StoreError),
    #[error("commit failed: {0}")]
    Commit(#[source] StoreError),
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("student evaluation timed out")]
    Timeout,
    #[error("worker pool closed")]
    PoolClosed,
}

fn read<T, F>(f: F) -> JoinHandle<StoreResult<T>>
where
    T: Send + 'static,
    F: FnOnce() -> StoreResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
}

/// Fan-out fetch of everything one student's rules need, joined into one
/// immutable snapshot. Any sub-read failure aborts this student only.
pub async fn aggregate(
    store: Arc<dyn BadgeStore>,
    year_id: &str,
    student: Student,
    now: DateTime<Utc>,
) -> Result<Snapshot, EngineError> {
    let year = year_id.to_string();
    let sid = student.id.clone();

    let grades = read({
        let (s, y, id) = (store.clone(), year.clone(), sid.clone());
        move || s.grades_for(&y, &id)
    });
    let absences = read({
        let (s, y, id) = (store.clone(), year.clone(), sid.clone());
        move || s.absences_for(&y, &id)
    });
    let submissions = read({
        let (s, y, id) = (store.clone(), year.clone(), sid.clone());
        move || s.submissions_for(&y, &id)
    });
    // Year-wide collections: rules need cross-student context (group
    // completion, global announcements), so these are not student-filtered.
    let assignments = read({
        let (s, y) = (store.clone(), year.clone());
        move || s.assignments(&y)
    });
    let classrooms = read({
        let (s, y) = (store.clone(), year.clone());
        move || s.classrooms(&y)
    });
    let events = read({
        let (s, y, id) = (store.clone(), year.clone(), sid.clone());
        move || s.events_for(&y, &id)
    });
    let announcements = read({
        let (s, y) = (store.clone(), year.clone());
        move || s.announcements(&y)
    });
    let earned = read({
        let (s, id) = (store.clone(), sid.clone());
        move || s.earned_badges_for(&id)
    });

    let (grades, absences, submissions, assignments, classrooms, events, announcements, earned) = tokio::try_join!(
        grades,
        absences,
        submissions,
        assignments,
        classrooms,
        events,
        announcements,
        earned
    )?;

    Ok(Snapshot {
        student,
        grades: grades.map_err(EngineError::Aggregation)?,
        absences: absences.map_err(EngineError::Aggregation)?,
        submissions: submissions.map_err(EngineError::Aggregation)?,
        assignments: assignments.map_err(EngineError::Aggregation)?,
        classrooms: classrooms.map_err(EngineError::Aggregation)?,
        events: events.map_err(EngineError::Aggregation)?,
        announcements: announcements.map_err(EngineError::Aggregation)?,
        earned: earned.map_err(EngineError::Aggregation)?,
        now,
    })
}

/// Idempotency guard: pure set-membership filter over the already-fetched
/// award history, plus within-batch dedup so two rules cannot double-award
/// one key in a single run. No store access.
pub fn filter_new(earned: &[EarnedBadge], candidates: Vec<Candidate>) -> Vec<Candidate> {
    let earned_ids: HashSet<&str> = earned.iter().map(|b| b.badge_id.as_str()).collect();
    let earned_keys: HashSet<(&str, &str)> = earned
        .iter()
        .filter_map(|b| {
            b.source_document_id
                .as_deref()
                .map(|k| (b.badge_id.as_str(), k))
        })
        .collect();

    let mut batch_singletons: HashSet<&'static str> = HashSet::new();
    let mut batch_keys: HashSet<(&'static str, String)> = HashSet::new();

    candidates
        .into_iter()
        .filter(|c| match &c.dedup {
            DedupKey::Singleton => {
                !earned_ids.contains(c.badge_id) && batch_singletons.insert(c.badge_id)
            }
            DedupKey::Keyed(key) => {
                !earned_keys.contains(&(c.badge_id, key.as_str()))
                    && batch_keys.insert((c.badge_id, key.clone()))
            }
            DedupKey::RearmBefore(deadline) => {
                let prior_ok = earned
                    .iter()
                    .filter(|b| b.badge_id == c.badge_id)
                    .all(|b| b.earned_at < *deadline);
                prior_ok && batch_singletons.insert(c.badge_id)
            }
        })
        .collect()
}

/// totalXp must equal the catalog sum over the full award history after each
/// commit, so it is recomputed from scratch rather than incremented.
pub fn total_xp(earned: &[EarnedBadge], accepted: &[Candidate]) -> i64 {
    let prior: i64 = earned.iter().map(|b| catalog::xp_for(&b.badge_id)).sum();
    let fresh: i64 = accepted.iter().map(|c| catalog::xp_for(c.badge_id)).sum();
    prior + fresh
}

pub fn awards_from(accepted: &[Candidate]) -> Vec<NewAward> {
    accepted
        .iter()
        .map(|c| NewAward {
            id: Uuid::new_v4().to_string(),
            badge_id: c.badge_id.to_string(),
            source_document_id: c.source_document_id().map(str::to_string),
            details: c.details.clone(),
        })
        .collect()
}

pub async fn evaluate_student(
    store: Arc<dyn BadgeStore>,
    year_id: &str,
    student: Student,
    now: DateTime<Utc>,
) -> Result<StudentOutcome, EngineError> {
    let snapshot = aggregate(store.clone(), year_id, student, now).await?;
    let candidates = rules::evaluate_all(&snapshot);
    let accepted = filter_new(&snapshot.earned, candidates);
    let total = total_xp(&snapshot.earned, &accepted);
    let awards = awards_from(&accepted);

    let student_id = snapshot.student.id.clone();
    let commit = read({
        let (s, id) = (store, student_id.clone());
        move || s.commit_awards(&id, &awards, total, now)
    });
    commit.await?.map_err(EngineError::Commit)?;

    tracing::debug!(
        student = %student_id,
        new_awards = accepted.len(),
        total_xp = total,
        "student evaluated"
    );

    Ok(StudentOutcome {
        student_id,
        new_awards: accepted.len(),
        total_xp: total,
    })
}
