//! Attendance streak badges. "Unexcused" means any absence the UI did not
//! mark justified. Day windows are strict: more than 30 (or 90) whole days.

use chrono::{DateTime, Utc};

use crate::model::{AbsenceStatus, Candidate, DedupKey, Snapshot};

fn last_unexcused(snapshot: &Snapshot) -> Option<DateTime<Utc>> {
    snapshot
        .absences
        .iter()
        .filter(|a| a.status != AbsenceStatus::Justified)
        .map(|a| a.date)
        .max()
}

/// Re-awardable clean-month badge. Two qualifying paths:
/// - no unexcused absence ever, and more than 30 days since the earliest
///   grade (so brand-new students don't qualify on day one); awarded once;
/// - more than 30 days since the most recent unexcused absence; re-awarded
///   only when every prior award predates that absence.
fn perfect_attendance_month(snapshot: &Snapshot, out: &mut Vec<Candidate>) {
    match last_unexcused(snapshot) {
        None => {
            let Some(first_grade) = snapshot.grades.iter().map(|g| g.date).min() else {
                return;
            };
            if (snapshot.now - first_grade).num_days() > 30 {
                out.push(Candidate {
                    badge_id: "perfect_attendance_month",
                    dedup: DedupKey::Singleton,
                    details: "Over a month with no unexcused absence".to_string(),
                });
            }
        }
        Some(last) => {
            if (snapshot.now - last).num_days() > 30 {
                out.push(Candidate {
                    badge_id: "perfect_attendance_month",
                    dedup: DedupKey::RearmBefore(last),
                    details: "Over a month since the last unexcused absence".to_string(),
                });
            }
        }
    }
}

/// Zero unexcused absences and more than 90 days since the first absence
/// record. Without any absence record there is nothing to measure from.
fn iron_will(snapshot: &Snapshot, out: &mut Vec<Candidate>) {
    if last_unexcused(snapshot).is_some() {
        return;
    }
    let Some(first) = snapshot.absences.iter().map(|a| a.date).min() else {
        return;
    };
    if (snapshot.now - first).num_days() > 90 {
        out.push(Candidate {
            badge_id: "iron_will",
            dedup: DedupKey::Singleton,
            details: "Ninety days of only justified absences".to_string(),
        });
    }
}

pub fn evaluate(snapshot: &Snapshot) -> Vec<Candidate> {
    let mut out = Vec::new();
    perfect_attendance_month(snapshot, &mut out);
    iron_will(snapshot, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::model::AbsenceStatus;
    use crate::rules::testutil::{absence, badge_ids, day, empty_snapshot, grade};

    #[test]
    fn clean_record_needs_a_grade_history_older_than_a_month() {
        let now = day(2024, 6, 1);
        let mut snap = empty_snapshot(now);
        assert!(evaluate(&snap).is_empty());

        snap.grades.push(grade("g1", "Math", "test", "12", now - Duration::days(10)));
        assert!(!badge_ids(&evaluate(&snap)).contains(&"perfect_attendance_month"));

        snap.grades.push(grade("g2", "Math", "test", "12", now - Duration::days(31)));
        let out = evaluate(&snap);
        let c = out
            .iter()
            .find(|c| c.badge_id == "perfect_attendance_month")
            .expect("clean month candidate");
        assert_eq!(c.dedup, DedupKey::Singleton);
    }

    #[test]
    fn unexcused_absence_rearms_after_thirty_days() {
        let now = day(2024, 6, 1);
        let last = now - Duration::days(31);
        let mut snap = empty_snapshot(now);
        snap.absences.push(absence("a1", AbsenceStatus::Other, last));
        let out = evaluate(&snap);
        let c = out
            .iter()
            .find(|c| c.badge_id == "perfect_attendance_month")
            .expect("rearm candidate");
        assert_eq!(c.dedup, DedupKey::RearmBefore(last));

        // Exactly 30 days is not "more than 30 days".
        let mut snap = empty_snapshot(now);
        snap.absences
            .push(absence("a1", AbsenceStatus::Other, now - Duration::days(30)));
        assert!(evaluate(&snap).is_empty());
    }

    #[test]
    fn iron_will_requires_an_old_first_absence_and_no_unexcused() {
        let now = day(2024, 6, 1);
        let mut snap = empty_snapshot(now);
        snap.absences
            .push(absence("a1", AbsenceStatus::Justified, now - Duration::days(100)));
        assert!(badge_ids(&evaluate(&snap)).contains(&"iron_will"));

        snap.absences
            .push(absence("a2", AbsenceStatus::Other, now - Duration::days(40)));
        assert!(!badge_ids(&evaluate(&snap)).contains(&"iron_will"));

        let mut snap = empty_snapshot(now);
        snap.absences
            .push(absence("a1", AbsenceStatus::Justified, now - Duration::days(90)));
        assert!(!badge_ids(&evaluate(&snap)).contains(&"iron_will"));
    }
}
