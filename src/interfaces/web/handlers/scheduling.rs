use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::error;

use super::super::AppState;
use crate::core::error::{Error, Result};
use crate::core::store::types::{TaskStatus, parse_ts};

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub task_id: String,
    pub platform_ids: Vec<String>,
    pub scheduled_at: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostNowRequest {
    pub task_id: String,
    pub platform_ids: Vec<String>,
    pub notes: Option<String>,
}

/// Selection rules shared by schedule and post-now: non-empty, no
/// duplicates, every platform known and currently usable.
async fn validate_selection(state: &AppState, platform_ids: &[String]) -> Result<()> {
    if platform_ids.is_empty() {
        return Err(Error::validation("No platforms selected"));
    }
    let unique: HashSet<&str> = platform_ids.iter().map(String::as_str).collect();
    if unique.len() != platform_ids.len() {
        return Err(Error::validation("Duplicate platforms in selection"));
    }

    let now = Utc::now();
    for platform_id in platform_ids {
        let platform = state
            .store
            .get_platform(platform_id)
            .await?
            .ok_or_else(|| Error::validation(format!("Unknown platform '{platform_id}'")))?;
        if !platform.is_usable(now) {
            return Err(Error::validation(format!(
                "Platform '{}' ({}) is inactive or its credentials have expired",
                platform_id, platform.api_name
            )));
        }
    }
    Ok(())
}

fn spawn_delivery(state: &AppState, task_id: String) {
    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
        if let Err(e) = dispatcher.deliver(&task_id).await {
            error!("Delivery of task {} aborted: {}", task_id, e);
        }
    });
}

pub async fn schedule_task(
    State(state): State<AppState>,
    Json(payload): Json<ScheduleRequest>,
) -> Result<Json<serde_json::Value>> {
    validate_selection(&state, &payload.platform_ids).await?;

    let scheduled_at: DateTime<Utc> = parse_ts(&payload.scheduled_at)
        .ok_or_else(|| Error::validation("scheduled_at must be an RFC 3339 timestamp"))?;
    if scheduled_at <= Utc::now() {
        return Err(Error::validation("scheduled_at must be in the future"));
    }

    let task = state
        .store
        .schedule_task(
            &payload.task_id,
            &payload.platform_ids,
            scheduled_at,
            payload.notes.as_deref(),
        )
        .await?;
    Ok(Json(json!(task)))
}

/// Claim + immediate dispatch. The response returns as soon as the round is
/// initiated; delivery runs on a spawned task.
pub async fn post_now(
    State(state): State<AppState>,
    Json(payload): Json<PostNowRequest>,
) -> Result<Json<serde_json::Value>> {
    validate_selection(&state, &payload.platform_ids).await?;

    let task = state
        .store
        .get_task(&payload.task_id)
        .await?
        .ok_or_else(|| Error::not_found("Task not found"))?;
    let claimed = state
        .store
        .claim_task(
            &payload.task_id,
            &[TaskStatus::DraftApproved, TaskStatus::Scheduled],
        )
        .await?;
    if !claimed {
        return Err(Error::invalid_state(format!(
            "Task cannot be posted from status '{}'",
            task.status.as_str()
        )));
    }

    state
        .store
        .set_platform_selection(&payload.task_id, &payload.platform_ids)
        .await?;
    if let Some(notes) = payload.notes.as_deref() {
        state.store.set_task_notes(&payload.task_id, notes).await?;
    }
    spawn_delivery(&state, payload.task_id.clone());

    Ok(Json(json!({
        "status": "dispatching",
        "task_id": payload.task_id,
    })))
}

/// Post-now for a task that is already scheduled; the stored platform
/// selection is reused.
pub async fn post_now_scheduled(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let task = state
        .store
        .get_task(&task_id)
        .await?
        .ok_or_else(|| Error::not_found("Task not found"))?;
    let claimed = state
        .store
        .claim_task(&task_id, &[TaskStatus::Scheduled])
        .await?;
    if !claimed {
        return Err(Error::invalid_state(format!(
            "Task cannot be posted from status '{}'",
            task.status.as_str()
        )));
    }

    spawn_delivery(&state, task_id.clone());

    Ok(Json(json!({
        "status": "dispatching",
        "task_id": task_id,
    })))
}

pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let task = state.store.cancel_task(&task_id).await?;
    Ok(Json(json!(task)))
}
