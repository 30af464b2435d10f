//! Submission timing badges and the per-group homework completion badge.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Duration;

use crate::model::{Candidate, DedupKey, Snapshot};

/// A submission at least 48h before its assignment's due instant earns a
/// badge keyed on the submission; at least 5 submissions each 24h early earn
/// the early-bird singleton.
fn timing(snapshot: &Snapshot, out: &mut Vec<Candidate>) {
    let due_by_assignment: HashMap<&str, _> = snapshot
        .assignments
        .iter()
        .map(|a| (a.id.as_str(), a.due_at))
        .collect();

    let mut day_early_count = 0usize;
    for s in &snapshot.submissions {
        let Some(due) = due_by_assignment.get(s.assignment_id.as_str()) else {
            continue;
        };
        let margin = *due - s.submitted_at;
        if margin >= Duration::hours(24) {
            day_early_count += 1;
        }
        if margin >= Duration::hours(48) {
            out.push(Candidate {
                badge_id: "on_time_submitter",
                dedup: DedupKey::Keyed(s.id.clone()),
                details: format!("Submitted {}h before the deadline", margin.num_hours()),
            });
        }
    }

    if day_early_count >= 5 {
        out.push(Candidate {
            badge_id: "early_bird",
            dedup: DedupKey::Singleton,
            details: format!("{} submissions at least a day early", day_early_count),
        });
    }
}

/// Homework completion per (subject, due month): when every homework
/// assignment of an enrolled classroom's subject due in one month has a
/// matching submission, the group key `subject-YYYY-MM` is awarded. A group
/// satisfied once stays awarded even if the group later grows.
fn homework_hero(snapshot: &Snapshot, out: &mut Vec<Candidate>) {
    let enrolled: HashSet<&str> = snapshot
        .student
        .classroom_ids
        .iter()
        .map(String::as_str)
        .collect();
    let subject_by_classroom: HashMap<&str, &str> = snapshot
        .classrooms
        .iter()
        .map(|c| (c.id.as_str(), c.subject.trim()))
        .collect();
    let submitted: HashSet<&str> = snapshot
        .submissions
        .iter()
        .map(|s| s.assignment_id.as_str())
        .collect();

    // group key -> (total homework assignments, submitted ones)
    let mut groups: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for a in &snapshot.assignments {
        if a.kind != "homework" || !enrolled.contains(a.classroom_id.as_str()) {
            continue;
        }
        let Some(subject) = subject_by_classroom.get(a.classroom_id.as_str()) else {
            continue;
        };
        let key = format!("{}-{}", subject, a.due_at.format("%Y-%m"));
        let entry = groups.entry(key).or_insert((0, 0));
        entry.0 += 1;
        if submitted.contains(a.id.as_str()) {
            entry.1 += 1;
        }
    }

    for (key, (total, done)) in groups {
        if total > 0 && done == total {
            out.push(Candidate {
                badge_id: "homework_hero",
                dedup: DedupKey::Keyed(key.clone()),
                details: format!("All {} homework assignments done for {}", total, key),
            });
        }
    }
}

pub fn evaluate(snapshot: &Snapshot) -> Vec<Candidate> {
    let mut out = Vec::new();
    timing(snapshot, &mut out);
    homework_hero(snapshot, &mut out);
    out
}
