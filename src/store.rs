use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::db;
use crate::model::{
    AbsenceStatus, AcademicYear, Absence, Announcement, Assignment, Classroom, EarnedBadge,
    Grade, NewAward, Student, Submission, UserEvent,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("db: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("bad timestamp: {0:?}")]
    BadTimestamp(String),
    #[error("bad event details json: {0}")]
    BadJson(#[from] serde_json::Error),
    #[error("connection lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The engine's only view of persistence. One read per collection, plus the
/// two writes the engine and the activity interface perform. Injected as
/// `Arc<dyn BadgeStore>` so tests can substitute fakes.
pub trait BadgeStore: Send + Sync {
    fn current_year(&self) -> StoreResult<Option<AcademicYear>>;
    fn students(&self, year_id: &str) -> StoreResult<Vec<Student>>;
    fn grades_for(&self, year_id: &str, student_id: &str) -> StoreResult<Vec<Grade>>;
    fn absences_for(&self, year_id: &str, student_id: &str) -> StoreResult<Vec<Absence>>;
    fn submissions_for(&self, year_id: &str, student_id: &str) -> StoreResult<Vec<Submission>>;
    fn assignments(&self, year_id: &str) -> StoreResult<Vec<Assignment>>;
    fn classrooms(&self, year_id: &str) -> StoreResult<Vec<Classroom>>;
    fn events_for(&self, year_id: &str, student_id: &str) -> StoreResult<Vec<UserEvent>>;
    fn announcements(&self, year_id: &str) -> StoreResult<Vec<Announcement>>;
    fn earned_badges_for(&self, student_id: &str) -> StoreResult<Vec<EarnedBadge>>;

    /// All-or-nothing per student: every award row plus the XP update land
    /// in one transaction, or none do.
    fn commit_awards(
        &self,
        student_id: &str,
        awards: &[NewAward],
        total_xp: i64,
        earned_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    fn append_event(&self, year_id: &str, event: &UserEvent) -> StoreResult<()>;
}

fn parse_ts(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| StoreError::BadTimestamp(raw.to_string()))
}

fn status_from_text(raw: &str) -> AbsenceStatus {
    // Anything the UI did not mark justified counts as unexcused.
    if raw == "justified" {
        AbsenceStatus::Justified
    } else {
        AbsenceStatus::Other
    }
}

fn status_to_text(status: AbsenceStatus) -> &'static str {
    match status {
        AbsenceStatus::Justified => "justified",
        AbsenceStatus::Other => "other",
    }
}

/// SQLite-backed store over the `db.rs` workspace schema. The connection sits
/// behind a `Mutex` so the store can be shared across the orchestrator's
/// worker tasks.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: Mutex::new(db::open_db(workspace)?),
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Ok(Self {
            conn: Mutex::new(db::open_in_memory()?),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    // Host-side write API: the school application (out of scope here) owns
    // these collections; tests use the same calls to build fixtures.

    pub fn insert_year(&self, year: &AcademicYear) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO academic_years(id, label, is_current) VALUES (?, ?, ?)",
            params![year.id, year.label, year.is_current as i64],
        )?;
        Ok(())
    }

    pub fn insert_student(&self, year_id: &str, student_id: &str) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO students(id, year_id, total_xp) VALUES (?, ?, 0)",
            params![student_id, year_id],
        )?;
        Ok(())
    }

    pub fn insert_classroom(&self, year_id: &str, room: &Classroom) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO classrooms(id, year_id, subject, grade_level) VALUES (?, ?, ?, ?)",
            params![room.id, year_id, room.subject, room.grade_level],
        )?;
        Ok(())
    }

    pub fn enroll(&self, classroom_id: &str, student_id: &str) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO enrollments(classroom_id, student_id) VALUES (?, ?)",
            params![classroom_id, student_id],
        )?;
        Ok(())
    }

    pub fn insert_grade(&self, year_id: &str, grade: &Grade) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO grades(id, year_id, student_id, subject, kind, value, date)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                grade.id,
                year_id,
                grade.student_id,
                grade.subject,
                grade.kind,
                grade.value,
                grade.date.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_absence(&self, year_id: &str, absence: &Absence) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO absences(id, year_id, student_id, date, status) VALUES (?, ?, ?, ?, ?)",
            params![
                absence.id,
                year_id,
                absence.student_id,
                absence.date.to_rfc3339(),
                status_to_text(absence.status),
            ],
        )?;
        Ok(())
    }

    pub fn insert_assignment(&self, year_id: &str, assignment: &Assignment) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO assignments(id, year_id, classroom_id, kind, due_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                assignment.id,
                year_id,
                assignment.classroom_id,
                assignment.kind,
                assignment.due_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_submission(&self, year_id: &str, submission: &Submission) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO submissions(id, year_id, student_id, assignment_id, submitted_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                submission.id,
                year_id,
                submission.student_id,
                submission.assignment_id,
                submission.submitted_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Stored XP for one student, as the UI read surface reports it.
    pub fn student_xp(&self, student_id: &str) -> StoreResult<Option<i64>> {
        let conn = self.conn()?;
        let xp = conn
            .query_row(
                "SELECT total_xp FROM students WHERE id = ?",
                [student_id],
                |r| r.get::<_, i64>(0),
            )
            .optional()?;
        Ok(xp)
    }

    pub fn insert_announcement(&self, year_id: &str, announcement: &Announcement) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO announcements(id, year_id, created_at) VALUES (?, ?, ?)",
            params![
                announcement.id,
                year_id,
                announcement.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

impl BadgeStore for SqliteStore {
    fn current_year(&self) -> StoreResult<Option<AcademicYear>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, label FROM academic_years WHERE is_current = 1",
                [],
                |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(row.map(|(id, label)| AcademicYear {
            id,
            label,
            is_current: true,
        }))
    }

    fn students(&self, year_id: &str) -> StoreResult<Vec<Student>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, total_xp FROM students WHERE year_id = ? ORDER BY id",
        )?;
        let base = stmt
            .query_map([year_id], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut enroll_stmt =
            conn.prepare("SELECT classroom_id FROM enrollments WHERE student_id = ?")?;
        let mut students = Vec::with_capacity(base.len());
        for (id, total_xp) in base {
            let classroom_ids = enroll_stmt
                .query_map([&id], |r| r.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            students.push(Student {
                id,
                classroom_ids,
                total_xp,
            });
        }
        Ok(students)
    }

    fn grades_for(&self, year_id: &str, student_id: &str) -> StoreResult<Vec<Grade>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, student_id, subject, kind, value, date
             FROM grades WHERE year_id = ? AND student_id = ?",
        )?;
        let rows = stmt
            .query_map([year_id, student_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, student_id, subject, kind, value, date)| {
                Ok(Grade {
                    id,
                    student_id,
                    subject,
                    kind,
                    value,
                    date: parse_ts(&date)?,
                })
            })
            .collect()
    }

    fn absences_for(&self, year_id: &str, student_id: &str) -> StoreResult<Vec<Absence>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, student_id, date, status
             FROM absences WHERE year_id = ? AND student_id = ?",
        )?;
        let rows = stmt
            .query_map([year_id, student_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, student_id, date, status)| {
                Ok(Absence {
                    id,
                    student_id,
                    date: parse_ts(&date)?,
                    status: status_from_text(&status),
                })
            })
            .collect()
    }

    fn submissions_for(&self, year_id: &str, student_id: &str) -> StoreResult<Vec<Submission>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, student_id, assignment_id, submitted_at
             FROM submissions WHERE year_id = ? AND student_id = ?",
        )?;
        let rows = stmt
            .query_map([year_id, student_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, student_id, assignment_id, submitted_at)| {
                Ok(Submission {
                    id,
                    student_id,
                    assignment_id,
                    submitted_at: parse_ts(&submitted_at)?,
                })
            })
            .collect()
    }

    fn assignments(&self, year_id: &str) -> StoreResult<Vec<Assignment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, classroom_id, kind, due_at FROM assignments WHERE year_id = ?",
        )?;
        let rows = stmt
            .query_map([year_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, classroom_id, kind, due_at)| {
                Ok(Assignment {
                    id,
                    classroom_id,
                    kind,
                    due_at: parse_ts(&due_at)?,
                })
            })
            .collect()
    }

    fn classrooms(&self, year_id: &str) -> StoreResult<Vec<Classroom>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, subject, grade_level FROM classrooms WHERE year_id = ?",
        )?;
        let rows = stmt
            .query_map([year_id], |r| {
                Ok(Classroom {
                    id: r.get(0)?,
                    subject: r.get(1)?,
                    grade_level: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn events_for(&self, year_id: &str, student_id: &str) -> StoreResult<Vec<UserEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, student_id, event_name, occurred_at, details
             FROM user_events WHERE year_id = ? AND student_id = ?",
        )?;
        let rows = stmt
            .query_map([year_id, student_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, student_id, event_name, occurred_at, details)| {
                Ok(UserEvent {
                    id,
                    student_id,
                    event_name,
                    occurred_at: parse_ts(&occurred_at)?,
                    details: serde_json::from_str(&details)?,
                })
            })
            .collect()
    }

    fn announcements(&self, year_id: &str) -> StoreResult<Vec<Announcement>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, created_at FROM announcements WHERE year_id = ?")?;
        let rows = stmt
            .query_map([year_id], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, created_at)| {
                Ok(Announcement {
                    id,
                    created_at: parse_ts(&created_at)?,
                })
            })
            .collect()
    }

    fn earned_badges_for(&self, student_id: &str) -> StoreResult<Vec<EarnedBadge>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, badge_id, earned_at, seen_by_user, source_document_id, details
             FROM earned_badges WHERE student_id = ?",
        )?;
        let rows = stmt
            .query_map([student_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, i64>(3)?,
                    r.get::<_, Option<String>>(4)?,
                    r.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, badge_id, earned_at, seen, source_document_id, details)| {
                Ok(EarnedBadge {
                    id,
                    badge_id,
                    earned_at: parse_ts(&earned_at)?,
                    seen_by_user: seen != 0,
                    source_document_id,
                    details,
                })
            })
            .collect()
    }

    fn commit_awards(
        &self,
        student_id: &str,
        awards: &[NewAward],
        total_xp: i64,
        earned_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for award in awards {
            tx.execute(
                "INSERT INTO earned_badges(id, student_id, badge_id, earned_at, seen_by_user, source_document_id, details)
                 VALUES (?, ?, ?, ?, 0, ?, ?)",
                params![
                    award.id,
                    student_id,
                    award.badge_id,
                    earned_at.to_rfc3339(),
                    award.source_document_id,
                    award.details,
                ],
            )?;
        }
        let updated = tx.execute(
            "UPDATE students SET total_xp = ? WHERE id = ?",
            params![total_xp, student_id],
        )?;
        if updated != 1 {
            return Err(StoreError::Db(rusqlite::Error::QueryReturnedNoRows));
        }
        tx.commit()?;
        Ok(())
    }

    fn append_event(&self, year_id: &str, event: &UserEvent) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO user_events(id, year_id, student_id, event_name, occurred_at, details)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                event.id,
                year_id,
                event.student_id,
                event.event_name,
                event.occurred_at.to_rfc3339(),
                serde_json::to_string(&event.details)?,
            ],
        )?;
        Ok(())
    }
}
