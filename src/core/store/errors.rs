use chrono::{DateTime, Utc};
use rusqlite::{Row, params};
use uuid::Uuid;

use super::ContentStore;
use super::types::{ErrorLogRecord, fmt_ts, parse_ts};
use crate::core::error::Result;

#[derive(Debug, Clone, Default)]
pub struct NewErrorLog {
    pub task_id: Option<String>,
    pub platform_id: Option<String>,
    pub attempt_id: Option<String>,
    pub error_type: Option<String>,
    pub error_code: Option<String>,
    pub message: Option<String>,
    pub details: Option<serde_json::Value>,
}

/// Filters for the error-log query surface.
#[derive(Debug, Clone, Default)]
pub struct ErrorLogQuery {
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    /// Matched against error_id, task_id, platform_id and message.
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

fn row_to_error(row: &Row<'_>) -> rusqlite::Result<ErrorLogRecord> {
    let details: Option<String> = row.get(7)?;
    let created_at: String = row.get(8)?;
    Ok(ErrorLogRecord {
        error_id: row.get(0)?,
        task_id: row.get(1)?,
        platform_id: row.get(2)?,
        attempt_id: row.get(3)?,
        error_type: row.get(4)?,
        error_code: row.get(5)?,
        message: row.get(6)?,
        details: details.as_deref().and_then(|d| serde_json::from_str(d).ok()),
        created_at: parse_ts(&created_at).unwrap_or_default(),
    })
}

impl ContentStore {
    /// Append one error-log row. Rows are never mutated afterward except for
    /// back-linking the attempt that produced them.
    pub async fn record_error(&self, new: NewErrorLog) -> Result<ErrorLogRecord> {
        let error_id = Uuid::new_v4().to_string();
        let created_at = fmt_ts(Utc::now());
        let details_json = new.details.as_ref().map(|d| d.to_string());

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO error_log (error_id, task_id, platform_id, attempt_id, error_type,
                                    error_code, message, details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                error_id,
                new.task_id,
                new.platform_id,
                new.attempt_id,
                new.error_type,
                new.error_code,
                new.message,
                details_json,
                created_at
            ],
        )?;

        Ok(ErrorLogRecord {
            error_id,
            task_id: new.task_id,
            platform_id: new.platform_id,
            attempt_id: new.attempt_id,
            error_type: new.error_type,
            error_code: new.error_code,
            message: new.message,
            details: new.details,
            created_at: parse_ts(&created_at).unwrap_or_default(),
        })
    }

    /// Back-link an error-log row to the attempt recorded after it.
    pub async fn link_error_to_attempt(&self, error_id: &str, attempt_id: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE error_log SET attempt_id = ?2 WHERE error_id = ?1",
            params![error_id, attempt_id],
        )?;
        Ok(())
    }

    pub async fn errors_for_task(&self, task_id: &str) -> Result<Vec<ErrorLogRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT error_id, task_id, platform_id, attempt_id, error_type, error_code,
                    message, details, created_at
             FROM error_log WHERE task_id = ?1
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map(params![task_id], row_to_error)?;
        let mut errors = Vec::new();
        for row in rows {
            errors.push(row?);
        }
        Ok(errors)
    }

    /// Paginated error-log listing, newest first, with optional date range
    /// and free-text search applied server-side.
    pub async fn list_error_logs(
        &self,
        query: ErrorLogQuery,
    ) -> Result<(Vec<ErrorLogRecord>, i64)> {
        let mut clauses = Vec::new();
        // Boxed params must stay Send: the vec lives across the lock await
        // and the future is polled from axum's multi-threaded runtime.
        let mut args: Vec<Box<dyn rusqlite::ToSql + Send>> = Vec::new();

        if let Some(from) = query.from_date {
            args.push(Box::new(fmt_ts(from)));
            clauses.push(format!("created_at >= ?{}", args.len()));
        }
        if let Some(to) = query.to_date {
            args.push(Box::new(fmt_ts(to)));
            clauses.push(format!("created_at <= ?{}", args.len()));
        }
        if let Some(search) = query.search.as_ref().filter(|s| !s.trim().is_empty()) {
            args.push(Box::new(format!("%{}%", search.trim())));
            let n = args.len();
            clauses.push(format!(
                "(error_id LIKE ?{n} OR task_id LIKE ?{n} OR platform_id LIKE ?{n} OR message LIKE ?{n})"
            ));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let db = self.db.lock().await;
        let total: i64 = db.query_row(
            &format!("SELECT COUNT(*) FROM error_log {where_clause}"),
            rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
            |row| row.get(0),
        )?;

        args.push(Box::new(query.limit));
        let limit_pos = args.len();
        args.push(Box::new(query.offset));
        let offset_pos = args.len();

        let mut stmt = db.prepare(&format!(
            "SELECT error_id, task_id, platform_id, attempt_id, error_type, error_code,
                    message, details, created_at
             FROM error_log {where_clause}
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?{limit_pos} OFFSET ?{offset_pos}"
        ))?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
            row_to_error,
        )?;
        let mut errors = Vec::new();
        for row in rows {
            errors.push(row?);
        }
        Ok((errors, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::test_store;

    fn entry(task: &str, message: &str) -> NewErrorLog {
        NewErrorLog {
            task_id: Some(task.to_string()),
            platform_id: Some("p1".to_string()),
            error_type: Some("PublishError".to_string()),
            error_code: Some("POSTING_ERROR".to_string()),
            message: Some(message.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn record_and_list_for_task() {
        let store = test_store();
        store.record_error(entry("t1", "first")).await.unwrap();
        store.record_error(entry("t1", "second")).await.unwrap();
        store.record_error(entry("t2", "other task")).await.unwrap();

        let errors = store.errors_for_task("t1").await.unwrap();
        assert_eq!(errors.len(), 2);
        // Newest first.
        assert_eq!(errors[0].message.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn details_survive_json_roundtrip() {
        let store = test_store();
        let details = serde_json::json!({ "traceback": "publish failed: HTTP 401" });
        let rec = store
            .record_error(NewErrorLog {
                details: Some(details.clone()),
                ..entry("t1", "auth")
            })
            .await
            .unwrap();
        assert_eq!(rec.details, Some(details.clone()));

        let stored = store.errors_for_task("t1").await.unwrap();
        assert_eq!(stored[0].details, Some(details));
    }

    #[tokio::test]
    async fn search_matches_message_and_ids() {
        let store = test_store();
        store.record_error(entry("t1", "rate limited")).await.unwrap();
        store.record_error(entry("t2", "token expired")).await.unwrap();

        let (by_msg, total) = store
            .list_error_logs(ErrorLogQuery {
                search: Some("rate".into()),
                limit: 20,
                offset: 0,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(by_msg[0].task_id.as_deref(), Some("t1"));

        let (by_task, total) = store
            .list_error_logs(ErrorLogQuery {
                search: Some("t2".into()),
                limit: 20,
                offset: 0,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(by_task[0].message.as_deref(), Some("token expired"));
    }

    #[tokio::test]
    async fn date_range_filters_apply() {
        let store = test_store();
        store.record_error(entry("t1", "recent")).await.unwrap();

        let (none, total) = store
            .list_error_logs(ErrorLogQuery {
                to_date: Some(Utc::now() - chrono::Duration::days(1)),
                limit: 20,
                offset: 0,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 0);
        assert!(none.is_empty());

        let (all, total) = store
            .list_error_logs(ErrorLogQuery {
                from_date: Some(Utc::now() - chrono::Duration::days(1)),
                limit: 20,
                offset: 0,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(all.len(), 1);
    }

    // The listing future must be Send so the handler built on it can be
    // served from the multi-threaded runtime.
    #[tokio::test]
    async fn listing_future_is_send() {
        fn require_send<F: std::future::Future + Send>(f: F) -> F {
            f
        }

        let store = test_store();
        store.record_error(entry("t1", "boxed")).await.unwrap();
        let (page, total) = require_send(store.list_error_logs(ErrorLogQuery {
            search: Some("boxed".into()),
            limit: 20,
            offset: 0,
            ..Default::default()
        }))
        .await
        .unwrap();
        assert_eq!(total, 1);
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn pagination_limits_results() {
        let store = test_store();
        for i in 0..5 {
            store
                .record_error(entry("t1", &format!("err {i}")))
                .await
                .unwrap();
        }
        let (page, total) = store
            .list_error_logs(ErrorLogQuery {
                limit: 2,
                offset: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
    }
}
