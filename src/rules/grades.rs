//! Grade-derived badges: per-grade thresholds, per-subject aggregates and
//! sequences, and the cross-subject 30-day hat-trick. Grade scale is 0-20;
//! values that fail numeric parsing are invisible to every rule here.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::grade::normalize_grade;
use crate::model::{Candidate, DedupKey, Snapshot};

#[derive(Debug, Clone)]
struct NumGrade {
    id: String,
    subject: String,
    kind: String,
    value: f64,
    date: DateTime<Utc>,
}

/// Numeric view of the snapshot's grades. Subjects are trimmed for grouping;
/// ordering is date-ascending with the id as a deterministic tie-break.
fn numeric_grades(snapshot: &Snapshot) -> Vec<NumGrade> {
    let mut grades: Vec<NumGrade> = snapshot
        .grades
        .iter()
        .filter_map(|g| {
            normalize_grade(&g.value).map(|value| NumGrade {
                id: g.id.clone(),
                subject: g.subject.trim().to_string(),
                kind: g.kind.clone(),
                value,
                date: g.date,
            })
        })
        .collect();
    grades.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
    grades
}

fn by_subject(grades: &[NumGrade]) -> BTreeMap<&str, Vec<&NumGrade>> {
    let mut map: BTreeMap<&str, Vec<&NumGrade>> = BTreeMap::new();
    for g in grades {
        map.entry(g.subject.as_str()).or_default().push(g);
    }
    map
}

fn keyed(badge_id: &'static str, key: &str, details: String) -> Candidate {
    Candidate {
        badge_id,
        dedup: DedupKey::Keyed(key.to_string()),
        details,
    }
}

fn thresholds(grades: &[NumGrade], out: &mut Vec<Candidate>) {
    for g in grades {
        if g.value >= 19.0 {
            out.push(keyed(
                "high_flyer",
                &g.id,
                format!("Scored {} in {}", g.value, g.subject),
            ));
        }
        if (g.value - 20.0).abs() < 1e-9 {
            out.push(keyed(
                "flawless_victory",
                &g.id,
                format!("Perfect 20 in {}", g.subject),
            ));
        }
        if g.kind == "participation" && g.value > 18.0 {
            out.push(keyed(
                "active_citizen",
                &g.id,
                format!("Participation grade {} in {}", g.value, g.subject),
            ));
        }
        if g.kind == "project" && g.value > 17.0 {
            out.push(keyed(
                "team_player",
                &g.id,
                format!("Project grade {} in {}", g.value, g.subject),
            ));
        }
    }
}

/// Per subject: at least 3 numeric grades averaging above 18. Keyed on the
/// trimmed subject itself; this replaces the old substring probe over the
/// award's details text, which could collide on subjects whose names contain
/// one another.
fn subject_master(grades: &[NumGrade], out: &mut Vec<Candidate>) {
    for (subject, list) in by_subject(grades) {
        if list.len() < 3 {
            continue;
        }
        let avg = list.iter().map(|g| g.value).sum::<f64>() / list.len() as f64;
        if avg > 18.0 {
            out.push(keyed(
                "subject_master",
                subject,
                format!("Average {:.1} across {} grades in {}", avg, list.len(), subject),
            ));
        }
    }
}

/// Within a subject's date-ordered grades: a jump of at least 5 points over
/// the previous grade, keyed on the improving grade.
fn comeback_king(grades: &[NumGrade], out: &mut Vec<Candidate>) {
    for (subject, list) in by_subject(grades) {
        for pair in list.windows(2) {
            if pair[1].value >= pair[0].value + 5.0 {
                out.push(keyed(
                    "comeback_king",
                    &pair[1].id,
                    format!(
                        "Improved from {} to {} in {}",
                        pair[0].value, pair[1].value, subject
                    ),
                ));
            }
        }
    }
}

/// Three consecutive grades above 15 within one subject, keyed on the grade
/// that closes the run. Overlapping runs each award once.
fn marathon_runner(grades: &[NumGrade], out: &mut Vec<Candidate>) {
    for (subject, list) in by_subject(grades) {
        for trio in list.windows(3) {
            if trio.iter().all(|g| g.value > 15.0) {
                out.push(keyed(
                    "marathon_runner",
                    &trio[2].id,
                    format!("Three grades above 15 in a row in {}", subject),
                ));
            }
        }
    }
}

/// Grades of 18+ in at least 3 distinct subjects, all within a 30-day window
/// (inclusive). Chronological greedy scan: the first qualifying window wins
/// and the scan stops.
fn knowledge_hat_trick(grades: &[NumGrade], out: &mut Vec<Candidate>) {
    let qualifying: Vec<&NumGrade> = grades.iter().filter(|g| g.value >= 18.0).collect();
    let mut start = 0;
    for end in 0..qualifying.len() {
        while qualifying[end].date - qualifying[start].date > Duration::days(30) {
            start += 1;
        }
        let window = &qualifying[start..=end];
        let mut subjects: Vec<&str> = window.iter().map(|g| g.subject.as_str()).collect();
        subjects.sort_unstable();
        subjects.dedup();
        if subjects.len() >= 3 {
            out.push(Candidate {
                badge_id: "knowledge_hat_trick",
                dedup: DedupKey::Singleton,
                details: format!(
                    "Grades of 18+ in {} subjects within 30 days",
                    subjects.len()
                ),
            });
            return;
        }
    }
}

fn consistent_performer(grades: &[NumGrade], out: &mut Vec<Candidate>) {
    if grades.len() < 5 {
        return;
    }
    let avg = grades.iter().map(|g| g.value).sum::<f64>() / grades.len() as f64;
    if avg > 15.0 {
        out.push(Candidate {
            badge_id: "consistent_performer",
            dedup: DedupKey::Singleton,
            details: format!("Overall average {:.1} across {} grades", avg, grades.len()),
        });
    }
}

pub fn evaluate(snapshot: &Snapshot) -> Vec<Candidate> {
    let grades = numeric_grades(snapshot);
    let mut out = Vec::new();
    thresholds(&grades, &mut out);
    subject_master(&grades, &mut out);
    comeback_king(&grades, &mut out);
    marathon_runner(&grades, &mut out);
    knowledge_hat_trick(&grades, &mut out);
    consistent_performer(&grades, &mut out);
    out
}
