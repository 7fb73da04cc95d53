use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::super::AppState;
use crate::core::error::{Error, Result};
use crate::core::store::types::{PlatformRecord, fmt_ts, parse_ts};
use crate::core::store::{NewPlatform, PlatformUpdate};

/// Active, non-expired platforms offered for selection in the scheduling UI.
pub async fn active_platforms(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>> {
    let platforms = state.store.usable_platforms(Utc::now()).await?;
    let list: Vec<serde_json::Value> = platforms
        .iter()
        .map(|p| {
            json!({
                "platform_id": p.platform_id,
                "api_name": p.api_name,
                "account_name": p.account_name,
            })
        })
        .collect();
    Ok(Json(json!({ "platforms": list })))
}

fn platform_summary(p: &PlatformRecord) -> serde_json::Value {
    let expires_in_days = p
        .expires_at
        .map(|exp| (exp - Utc::now()).num_days());
    json!({
        "platform_id": p.platform_id,
        "api_name": p.api_name,
        "account_id": p.account_id,
        "account_name": p.account_name,
        "is_active": p.is_active,
        "has_credentials": !p.credentials.is_empty(),
        "expires_at": p.expires_at.map(fmt_ts),
        "expires_in_days": expires_in_days,
        "created_at": fmt_ts(p.created_at),
    })
}

/// Full registry listing for the management view. Credentials never leave
/// the registry; only their presence is reported.
pub async fn list_platforms(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let platforms = state.store.list_platforms().await?;
    let list: Vec<serde_json::Value> = platforms.iter().map(platform_summary).collect();
    Ok(Json(json!({ "platforms": list })))
}

#[derive(Debug, Deserialize)]
pub struct RegisterPlatformRequest {
    pub api_name: String,
    pub account_id: Option<String>,
    pub account_name: Option<String>,
    /// Plaintext credential document; encrypted before it touches disk.
    pub credentials: serde_json::Value,
    pub expires_at: Option<String>,
}

pub async fn register_platform(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPlatformRequest>,
) -> Result<Json<serde_json::Value>> {
    let expires_at = match payload.expires_at.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => {
            Some(parse_ts(raw).ok_or_else(|| Error::validation("expires_at must be RFC 3339"))?)
        }
        None => None,
    };

    let plaintext = payload.credentials.to_string();
    let encrypted = state
        .cipher
        .encrypt(&plaintext)
        .map_err(|e| Error::validation(format!("credentials could not be sealed: {e}")))?;

    let platform = state
        .store
        .register_platform(NewPlatform {
            api_name: payload.api_name,
            account_id: payload.account_id,
            account_name: payload.account_name,
            credentials: encrypted,
            expires_at,
        })
        .await?;
    Ok(Json(platform_summary(&platform)))
}

/// Partial update. A present-but-null `expires_at` clears the expiry; an
/// absent key leaves it untouched.
pub async fn update_platform(
    State(state): State<AppState>,
    Path(platform_id): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>> {
    let body = payload
        .as_object()
        .ok_or_else(|| Error::validation("Request body must be a JSON object"))?;

    let expires_at = match body.get("expires_at") {
        None => None,
        Some(serde_json::Value::Null) => Some(None),
        Some(serde_json::Value::String(raw)) => Some(Some(
            parse_ts(raw).ok_or_else(|| Error::validation("expires_at must be RFC 3339"))?,
        )),
        Some(_) => return Err(Error::validation("expires_at must be a string or null")),
    };

    let credentials = match body.get("credentials") {
        None | Some(serde_json::Value::Null) => None,
        Some(value) => Some(
            state
                .cipher
                .encrypt(&value.to_string())
                .map_err(|e| Error::validation(format!("credentials could not be sealed: {e}")))?,
        ),
    };

    let update = PlatformUpdate {
        is_active: body.get("is_active").and_then(|v| v.as_bool()),
        expires_at,
        account_id: body
            .get("account_id")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        account_name: body
            .get("account_name")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        credentials,
    };

    let platform = state.store.update_platform(&platform_id, update).await?;
    Ok(Json(platform_summary(&platform)))
}
