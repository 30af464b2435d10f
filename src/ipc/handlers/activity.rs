use chrono::Utc;
use serde_json::json;

use crate::activity::{log_activity, ActivityError, LogEventRequest};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

fn error_code(e: &ActivityError) -> &'static str {
    match e {
        ActivityError::Unauthenticated => "unauthenticated",
        ActivityError::PermissionDenied => "permission_denied",
        ActivityError::InvalidArgument(_) => "invalid_argument",
        ActivityError::Internal(_) => "internal",
    }
}

/// Appends one user activity event on behalf of the authenticated student.
/// `callerId` carries the identity the host's auth layer resolved; the
/// caller may only log events as themselves.
fn handle_log_event(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "no workspace selected", None);
    };

    let caller_id = req
        .params
        .get("callerId")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let request: LogEventRequest = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "invalid_argument", e.to_string(), None),
    };

    match log_activity(store.as_ref(), caller_id.as_deref(), &request, Utc::now()) {
        Ok(event_id) => ok(&req.id, json!({ "eventId": event_id })),
        Err(e) => err(&req.id, error_code(&e), e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "activity.logEvent" => Some(handle_log_event(state, req)),
        _ => None,
    }
}
