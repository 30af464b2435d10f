use std::time::Duration;

use chrono::Utc;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::orchestrator::Orchestrator;

/// Runs one full badge-evaluation batch over the current academic year. The
/// host application triggers this roughly once a day; re-running early is
/// harmless because every rule is idempotent.
fn handle_run_batch(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "no workspace selected", None);
    };

    let mut orchestrator = Orchestrator::new(store.clone());
    if let Some(workers) = req.params.get("workers").and_then(|v| v.as_u64()) {
        orchestrator = orchestrator.with_workers(workers as usize);
    }
    if let Some(ms) = req.params.get("studentTimeoutMs").and_then(|v| v.as_u64()) {
        orchestrator = orchestrator.with_student_timeout(Duration::from_millis(ms));
    }

    match orchestrator.run_blocking(Utc::now()) {
        Ok(summary) => match serde_json::to_value(&summary) {
            Ok(v) => ok(&req.id, v),
            Err(e) => err(&req.id, "internal", e.to_string(), None),
        },
        Err(e) => err(&req.id, "engine_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "engine.runBatch" => Some(handle_run_batch(state, req)),
        _ => None,
    }
}
