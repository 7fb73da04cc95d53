use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde_json::json;

use super::super::AppState;
use super::{PageQuery, page_links};
use crate::core::error::{Error, Result};
use crate::core::store::types::{DraftUpdate, NewTask, TaskStatus};

fn task_page(
    tasks: Vec<crate::core::store::types::TaskRecord>,
    total: i64,
    limit: i64,
    offset: i64,
) -> Json<serde_json::Value> {
    let (next_offset, prev_offset) = page_links(total, limit, offset);
    Json(json!({
        "tasks": tasks,
        "total_count": total,
        "limit": limit,
        "offset": offset,
        "next_offset": next_offset,
        "prev_offset": prev_offset,
    }))
}

pub async fn list_drafts(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<serde_json::Value>> {
    let (limit, offset) = page.bounds();
    let (tasks, total) = state
        .store
        .list_tasks_by_status(TaskStatus::Draft, limit, offset)
        .await?;
    Ok(task_page(tasks, total, limit, offset))
}

pub async fn create_draft(
    State(state): State<AppState>,
    Json(payload): Json<NewTask>,
) -> Result<Json<serde_json::Value>> {
    let task = state.store.create_draft(payload).await?;
    Ok(Json(json!(task)))
}

pub async fn list_approved(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<serde_json::Value>> {
    let (limit, offset) = page.bounds();
    let (tasks, total) = state
        .store
        .list_tasks_by_status(TaskStatus::DraftApproved, limit, offset)
        .await?;
    Ok(task_page(tasks, total, limit, offset))
}

pub async fn get_approved(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let task = state
        .store
        .get_task(&task_id)
        .await?
        .filter(|t| t.status == TaskStatus::DraftApproved)
        .ok_or_else(|| Error::not_found("Approved task not found"))?;
    Ok(Json(json!(task)))
}

pub async fn approve_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let task = state.store.approve_task(&task_id).await?;
    Ok(Json(json!(task)))
}

pub async fn update_draft(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(payload): Json<DraftUpdate>,
) -> Result<Json<serde_json::Value>> {
    let task = state.store.update_draft(&task_id, payload).await?;
    Ok(Json(json!(task)))
}

pub async fn delete_draft(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state.store.delete_draft(&task_id).await?;
    Ok(Json(json!({ "status": "deleted", "task_id": task_id })))
}
