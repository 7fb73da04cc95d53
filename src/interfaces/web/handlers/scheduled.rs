use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::json;

use super::super::AppState;
use super::PageQuery;
use crate::core::error::{Error, Result};
use crate::core::publisher::build_caption;
use crate::core::store::types::TaskStatus;

#[derive(Debug, Deserialize)]
pub struct ScheduledQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Listing behind the scheduled-tasks dashboard: every task past the draft
/// stage, newest first, optionally narrowed to one lifecycle status.
pub async fn list_scheduled(
    State(state): State<AppState>,
    Query(query): Query<ScheduledQuery>,
) -> Result<Json<serde_json::Value>> {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => {
            let parsed = TaskStatus::parse(raw)
                .filter(|s| {
                    matches!(
                        s,
                        TaskStatus::Scheduled
                            | TaskStatus::Posted
                            | TaskStatus::Failed
                            | TaskStatus::Cancelled
                    )
                })
                .ok_or_else(|| Error::validation(format!("Unknown status filter '{raw}'")))?;
            Some(parsed)
        }
    };

    let (limit, offset) = PageQuery {
        limit: query.limit,
        offset: query.offset,
    }
    .bounds();
    let (tasks, total) = state
        .store
        .list_lifecycle_tasks(status, limit, offset)
        .await?;
    Ok(Json(json!({
        "tasks": tasks,
        "total": total,
        "limit": limit,
        "offset": offset,
    })))
}

/// Task detail with the full delivery history: attempt ledger rows and the
/// error-log entries they link to.
pub async fn scheduled_task_detail(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let task = state
        .store
        .get_task(&task_id)
        .await?
        .ok_or_else(|| Error::not_found("Task not found"))?;

    let attempts = state.store.attempts_for_task(&task_id).await?;
    let errors = state.store.errors_for_task(&task_id).await?;
    let platforms = state.store.selected_platforms(&task_id).await?;
    let caption_with_hashtags = build_caption(
        task.caption.as_deref().unwrap_or_default(),
        &task.hashtags,
    );

    let mut body = json!(task);
    body["caption_with_hashtags"] = json!(caption_with_hashtags);
    body["platform_ids"] = json!(platforms);
    body["post_attempts"] = json!(attempts);
    body["error_logs"] = json!(errors);
    Ok(Json(body))
}
