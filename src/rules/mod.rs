//! Badge rule evaluators. Every rule is a pure function over the aggregated
//! per-student [`Snapshot`]: it may emit candidate awards but never touches
//! the store, so rules can run in any order with identical output. The
//! idempotency guard in `engine` decides which candidates are actually new.

mod attendance;
mod engagement;
mod grades;
mod submissions;

use crate::model::{Candidate, Snapshot};

pub fn evaluate_all(snapshot: &Snapshot) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    candidates.extend(grades::evaluate(snapshot));
    candidates.extend(attendance::evaluate(snapshot));
    candidates.extend(submissions::evaluate(snapshot));
    candidates.extend(engagement::evaluate(snapshot));
    candidates
}
