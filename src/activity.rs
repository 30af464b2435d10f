//! Synchronous "log activity event" entry point. The badge engine consumes
//! the `user_events` collection written through here, but the calls come from
//! the client application on a student's behalf, so this surface returns
//! typed errors to its caller instead of the engine's isolate-and-continue
//! policy.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::model::UserEvent;
use crate::store::{BadgeStore, StoreError};

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("caller may only log events for themselves")]
    PermissionDenied,
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("internal: {0}")]
    Internal(#[from] StoreError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEventRequest {
    pub event_name: String,
    pub student_id: String,
    pub app_id: String,
    pub academic_year: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Validates and appends one user event. Returns the new event's id.
pub fn log_activity(
    store: &dyn BadgeStore,
    caller_id: Option<&str>,
    req: &LogEventRequest,
    now: DateTime<Utc>,
) -> Result<String, ActivityError> {
    let Some(caller) = caller_id else {
        return Err(ActivityError::Unauthenticated);
    };
    if req.student_id.trim().is_empty() {
        return Err(ActivityError::InvalidArgument("studentId must not be empty"));
    }
    if caller != req.student_id {
        return Err(ActivityError::PermissionDenied);
    }
    if req.event_name.trim().is_empty() {
        return Err(ActivityError::InvalidArgument("eventName must not be empty"));
    }
    if req.app_id.trim().is_empty() {
        return Err(ActivityError::InvalidArgument("appId must not be empty"));
    }
    if req.academic_year.trim().is_empty() {
        return Err(ActivityError::InvalidArgument(
            "academicYear must not be empty",
        ));
    }
    let details = match &req.details {
        serde_json::Value::Null => serde_json::json!({}),
        serde_json::Value::Object(_) => req.details.clone(),
        _ => return Err(ActivityError::InvalidArgument("details must be an object")),
    };

    let event = UserEvent {
        id: Uuid::new_v4().to_string(),
        student_id: req.student_id.clone(),
        event_name: req.event_name.trim().to_string(),
        occurred_at: now,
        details,
    };
    store.append_event(&req.academic_year, &event)?;
    Ok(event.id)
}
