use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use meritd::model::{
    AcademicYear, Absence, Announcement, Assignment, Classroom, EarnedBadge, Grade, NewAward,
    Student, Submission, UserEvent,
};
use meritd::orchestrator::Orchestrator;
use meritd::store::{BadgeStore, SqliteStore, StoreError, StoreResult};

/// In-memory stand-in for the document store, with per-student failure and
/// latency injection.
#[derive(Default)]
struct FakeStore {
    student_ids: Vec<String>,
    grades: Vec<Grade>,
    fail_grades_for: HashSet<String>,
    fail_commit_for: HashSet<String>,
    grades_delay: Option<(String, Duration)>,
    committed: Mutex<Vec<(String, Vec<NewAward>, i64)>>,
}

impl FakeStore {
    fn broken() -> StoreError {
        StoreError::BadTimestamp("injected failure".to_string())
    }

    fn committed_for(&self, student_id: &str) -> Vec<(String, Vec<NewAward>, i64)> {
        self.committed
            .lock()
            .expect("committed lock")
            .iter()
            .filter(|(id, _, _)| id == student_id)
            .cloned()
            .collect()
    }
}

impl BadgeStore for FakeStore {
    fn current_year(&self) -> StoreResult<Option<AcademicYear>> {
        Ok(Some(AcademicYear {
            id: "y1".to_string(),
            label: "2023-2024".to_string(),
            is_current: true,
        }))
    }

    fn students(&self, _year_id: &str) -> StoreResult<Vec<Student>> {
        Ok(self
            .student_ids
            .iter()
            .map(|id| Student {
                id: id.clone(),
                classroom_ids: Vec::new(),
                total_xp: 0,
            })
            .collect())
    }

    fn grades_for(&self, _year_id: &str, student_id: &str) -> StoreResult<Vec<Grade>> {
        if let Some((slow_id, delay)) = &self.grades_delay {
            if slow_id == student_id {
                std::thread::sleep(*delay);
            }
        }
        if self.fail_grades_for.contains(student_id) {
            return Err(Self::broken());
        }
        Ok(self
            .grades
            .iter()
            .filter(|g| g.student_id == student_id)
            .cloned()
            .collect())
    }

    fn absences_for(&self, _year_id: &str, _student_id: &str) -> StoreResult<Vec<Absence>> {
        Ok(Vec::new())
    }

    fn submissions_for(&self, _year_id: &str, _student_id: &str) -> StoreResult<Vec<Submission>> {
        Ok(Vec::new())
    }

    fn assignments(&self, _year_id: &str) -> StoreResult<Vec<Assignment>> {
        Ok(Vec::new())
    }

    fn classrooms(&self, _year_id: &str) -> StoreResult<Vec<Classroom>> {
        Ok(Vec::new())
    }

    fn events_for(&self, _year_id: &str, _student_id: &str) -> StoreResult<Vec<UserEvent>> {
        Ok(Vec::new())
    }

    fn announcements(&self, _year_id: &str) -> StoreResult<Vec<Announcement>> {
        Ok(Vec::new())
    }

    fn earned_badges_for(&self, _student_id: &str) -> StoreResult<Vec<EarnedBadge>> {
        Ok(Vec::new())
    }

    fn commit_awards(
        &self,
        student_id: &str,
        awards: &[NewAward],
        total_xp: i64,
        _earned_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        if self.fail_commit_for.contains(student_id) {
            return Err(Self::broken());
        }
        self.committed
            .lock()
            .expect("committed lock")
            .push((student_id.to_string(), awards.to_vec(), total_xp));
        Ok(())
    }

    fn append_event(&self, _year_id: &str, _event: &UserEvent) -> StoreResult<()> {
        Ok(())
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("date")
}

fn high_grade(id: &str, student_id: &str) -> Grade {
    Grade {
        id: id.to_string(),
        student_id: student_id.to_string(),
        subject: "Math".to_string(),
        kind: "test".to_string(),
        value: "19".to_string(),
        date: now() - chrono::Duration::days(5),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn one_broken_student_does_not_stop_the_batch() {
    let store = Arc::new(FakeStore {
        student_ids: vec!["s1".into(), "s2".into(), "s3".into()],
        grades: vec![high_grade("g1", "s1"), high_grade("g2", "s3")],
        fail_grades_for: HashSet::from(["s2".to_string()]),
        ..FakeStore::default()
    });

    let summary = Orchestrator::new(store.clone())
        .run(now())
        .await
        .expect("batch run");

    assert_eq!(summary.students, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.awards_granted, 2);
    assert!(store.committed_for("s2").is_empty());
    assert_eq!(store.committed_for("s1").len(), 1);
    assert_eq!(store.committed_for("s3").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commit_failure_is_isolated_and_counted() {
    let store = Arc::new(FakeStore {
        student_ids: vec!["s1".into(), "s2".into()],
        grades: vec![high_grade("g1", "s1"), high_grade("g2", "s2")],
        fail_commit_for: HashSet::from(["s1".to_string()]),
        ..FakeStore::default()
    });

    let summary = Orchestrator::new(store.clone())
        .run(now())
        .await
        .expect("batch run");

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert!(store.committed_for("s1").is_empty());
    assert_eq!(store.committed_for("s2").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_student_trips_the_per_student_timeout() {
    let store = Arc::new(FakeStore {
        student_ids: vec!["s1".into(), "s2".into()],
        grades: vec![high_grade("g1", "s2")],
        grades_delay: Some(("s1".to_string(), Duration::from_millis(500))),
        ..FakeStore::default()
    });

    let summary = Orchestrator::new(store.clone())
        .with_student_timeout(Duration::from_millis(50))
        .run(now())
        .await
        .expect("batch run");

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert!(store.committed_for("s1").is_empty());
    assert_eq!(store.committed_for("s2").len(), 1);
}

/// SQLite-level atomicity: a commit that cannot update the XP row must not
/// leave award rows behind.
#[test]
fn failed_sqlite_commit_leaves_no_partial_state() {
    let store = SqliteStore::open_in_memory().expect("open store");
    store
        .insert_year(&AcademicYear {
            id: "y1".to_string(),
            label: "2023-2024".to_string(),
            is_current: true,
        })
        .expect("insert year");

    let awards = vec![NewAward {
        id: "aw1".to_string(),
        badge_id: "explorer".to_string(),
        source_document_id: None,
        details: String::new(),
    }];
    let result = store.commit_awards("ghost", &awards, 20, now());
    assert!(result.is_err());
    assert!(store.earned_badges_for("ghost").expect("read").is_empty());
}
