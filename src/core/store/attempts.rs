use chrono::Utc;
use rusqlite::{Row, params};
use uuid::Uuid;

use super::ContentStore;
use super::types::{AttemptStatus, PostAttemptRecord, fmt_ts, parse_ts};
use crate::core::error::Result;

fn row_to_attempt(row: &Row<'_>) -> rusqlite::Result<PostAttemptRecord> {
    let status: String = row.get(3)?;
    let response: Option<String> = row.get(4)?;
    let attempted_at: String = row.get(7)?;
    Ok(PostAttemptRecord {
        attempt_id: row.get(0)?,
        task_id: row.get(1)?,
        platform_id: row.get(2)?,
        status: AttemptStatus::parse(&status).unwrap_or(AttemptStatus::Failed),
        response: response.as_deref().and_then(|r| serde_json::from_str(r).ok()),
        latency_ms: row.get(5)?,
        error_log_id: row.get(6)?,
        attempted_at: parse_ts(&attempted_at).unwrap_or_default(),
    })
}

impl ContentStore {
    /// Append one ledger row. Attempts are never updated or deleted; a retried
    /// delivery appends a fresh round of rows.
    pub async fn record_attempt(
        &self,
        task_id: &str,
        platform_id: &str,
        status: AttemptStatus,
        response: Option<serde_json::Value>,
        latency_ms: Option<i64>,
        error_log_id: Option<&str>,
    ) -> Result<PostAttemptRecord> {
        let attempt_id = Uuid::new_v4().to_string();
        let attempted_at = fmt_ts(Utc::now());
        let response_json = response.as_ref().map(|r| r.to_string());

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO post_attempt (attempt_id, task_id, platform_id, status, response,
                                       latency_ms, error_log_id, attempted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                attempt_id,
                task_id,
                platform_id,
                status.as_str(),
                response_json,
                latency_ms,
                error_log_id,
                attempted_at
            ],
        )?;

        Ok(PostAttemptRecord {
            attempt_id,
            task_id: task_id.to_string(),
            platform_id: platform_id.to_string(),
            status,
            response,
            latency_ms,
            error_log_id: error_log_id.map(str::to_string),
            attempted_at: parse_ts(&attempted_at).unwrap_or_default(),
        })
    }

    pub async fn attempts_for_task(&self, task_id: &str) -> Result<Vec<PostAttemptRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT attempt_id, task_id, platform_id, status, response, latency_ms,
                    error_log_id, attempted_at
             FROM post_attempt WHERE task_id = ?1
             ORDER BY attempted_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![task_id], row_to_attempt)?;
        let mut attempts = Vec::new();
        for row in rows {
            attempts.push(row?);
        }
        Ok(attempts)
    }
}
