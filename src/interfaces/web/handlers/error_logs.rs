use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use serde_json::json;

use super::super::AppState;
use super::{PageQuery, page_links};
use crate::core::error::{Error, Result};
use crate::core::store::ErrorLogQuery;
use crate::core::store::types::parse_ts;

#[derive(Debug, Deserialize)]
pub struct ErrorLogParams {
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_error_logs(
    State(state): State<AppState>,
    Query(params): Query<ErrorLogParams>,
) -> Result<Json<serde_json::Value>> {
    let (limit, offset) = PageQuery {
        limit: params.limit,
        offset: params.offset,
    }
    .bounds();

    let from_date = match params.from_date.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            parse_ts(raw).ok_or_else(|| Error::validation("from_date must be RFC 3339"))?,
        ),
        None => None,
    };
    let to_date = match params.to_date.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => {
            Some(parse_ts(raw).ok_or_else(|| Error::validation("to_date must be RFC 3339"))?)
        }
        None => None,
    };

    let (errors, total) = state
        .store
        .list_error_logs(ErrorLogQuery {
            from_date,
            to_date,
            search: params.search,
            limit,
            offset,
        })
        .await?;

    let (next_offset, prev_offset) = page_links(total, limit, offset);
    Ok(Json(json!({
        "error_logs": errors,
        "total_count": total,
        "limit": limit,
        "offset": offset,
        "next_offset": next_offset,
        "prev_offset": prev_offset,
    })))
}
