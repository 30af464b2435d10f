use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::BadgeStore;

/// Read surface the UI polls: a student's earned badges and stored XP.
fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "no workspace selected", None);
    };
    let Some(student_id) = req.params.get("studentId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing params.studentId", None);
    };

    let total_xp = match store.student_xp(student_id) {
        Ok(Some(xp)) => xp,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let badges = match store.earned_badges_for(student_id) {
        Ok(b) => b,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match serde_json::to_value(&badges) {
        Ok(badges) => ok(&req.id, json!({ "totalXp": total_xp, "badges": badges })),
        Err(e) => err(&req.id, "internal", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "badges.list" => Some(handle_list(state, req)),
        _ => None,
    }
}
