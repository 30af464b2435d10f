//! Activity-event badges: calendar-visit streaks, material download counts,
//! and timely reading of recent announcements.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};

use crate::model::{Candidate, DedupKey, Snapshot};

fn singleton(badge_id: &'static str, details: String) -> Candidate {
    Candidate {
        badge_id,
        dedup: DedupKey::Singleton,
        details,
    }
}

/// At least 5 distinct calendar-visit days forming a consecutive-day run.
fn planner(snapshot: &Snapshot, out: &mut Vec<Candidate>) {
    let days: BTreeSet<NaiveDate> = snapshot
        .events
        .iter()
        .filter(|e| e.event_name == "visited_calendar")
        .map(|e| e.occurred_at.date_naive())
        .collect();
    if days.len() < 5 {
        return;
    }

    let mut best_run = 1usize;
    let mut run = 1usize;
    let mut prev: Option<NaiveDate> = None;
    for day in &days {
        if let Some(p) = prev {
            if (*day - p).num_days() == 1 {
                run += 1;
            } else {
                run = 1;
            }
        }
        best_run = best_run.max(run);
        prev = Some(*day);
    }

    if best_run >= 5 {
        out.push(singleton(
            "planner",
            format!("Visited the calendar {} days in a row", best_run),
        ));
    }
}

fn downloads(snapshot: &Snapshot, out: &mut Vec<Candidate>) {
    let count = snapshot
        .events
        .iter()
        .filter(|e| e.event_name == "downloaded_material")
        .count();
    if count >= 10 {
        out.push(singleton(
            "explorer",
            format!("Downloaded {} materials", count),
        ));
    }
    if count >= 20 {
        out.push(singleton(
            "librarian",
            format!("Downloaded {} materials", count),
        ));
    }
}

/// Every announcement of the trailing 30 days read within 24h of its
/// creation. Read events name their announcement in details.announcementId.
/// An empty trailing window awards nothing.
fn fully_informed(snapshot: &Snapshot, out: &mut Vec<Candidate>) {
    let recent: Vec<_> = snapshot
        .announcements
        .iter()
        .filter(|a| {
            let age = snapshot.now - a.created_at;
            age >= Duration::zero() && age.num_days() <= 30
        })
        .collect();
    if recent.is_empty() {
        return;
    }

    let all_read_in_time = recent.iter().all(|a| {
        snapshot.events.iter().any(|e| {
            e.event_name == "read_announcement"
                && e.details.get("announcementId").and_then(|v| v.as_str()) == Some(a.id.as_str())
                && e.occurred_at >= a.created_at
                && e.occurred_at - a.created_at <= Duration::hours(24)
        })
    });
    if all_read_in_time {
        out.push(singleton(
            "fully_informed",
            format!("Read all {} recent announcements within a day", recent.len()),
        ));
    }
}

pub fn evaluate(snapshot: &Snapshot) -> Vec<Candidate> {
    let mut out = Vec::new();
    planner(snapshot, &mut out);
    downloads(snapshot, &mut out);
    fully_informed(snapshot, &mut out);
    out
}
