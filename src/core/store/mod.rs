mod attempts;
mod errors;
mod platforms;
mod tasks;
pub mod types;

pub use errors::{ErrorLogQuery, NewErrorLog};
pub use platforms::{NewPlatform, PlatformUpdate, SUPPORTED_PLATFORMS};

use anyhow::Result;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Owns the SQLite database holding tasks, platform connections, the
/// post-attempt ledger and the error log. All access goes through the
/// shared connection behind a tokio mutex; state transitions are expressed
/// as conditional UPDATEs so they stay atomic under that single writer.
pub struct ContentStore {
    db: Arc<Mutex<Connection>>,
    data_dir: PathBuf,
}

fn create_schema(db: &Connection) -> rusqlite::Result<()> {
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS task (
            task_id TEXT PRIMARY KEY,
            title TEXT,
            caption TEXT,
            hashtags TEXT NOT NULL DEFAULT '[]',
            image_prompt TEXT,
            media_url TEXT,
            status TEXT NOT NULL DEFAULT 'draft',
            scheduled_at TEXT,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS platform (
            platform_id TEXT PRIMARY KEY,
            api_name TEXT NOT NULL,
            account_id TEXT,
            account_name TEXT,
            credentials TEXT NOT NULL,
            expires_at TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS task_platform (
            task_id TEXT NOT NULL,
            platform_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(task_id, platform_id)
        )",
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS post_attempt (
            attempt_id TEXT PRIMARY KEY,
            task_id TEXT NOT NULL,
            platform_id TEXT NOT NULL,
            status TEXT NOT NULL,
            response TEXT,
            latency_ms INTEGER,
            error_log_id TEXT,
            attempted_at TEXT NOT NULL
        )",
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS error_log (
            error_id TEXT PRIMARY KEY,
            task_id TEXT,
            platform_id TEXT,
            attempt_id TEXT,
            error_type TEXT,
            error_code TEXT,
            message TEXT,
            details TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    db.execute(
        "CREATE INDEX IF NOT EXISTS idx_task_status_scheduled ON task(status, scheduled_at)",
        [],
    )?;
    db.execute(
        "CREATE INDEX IF NOT EXISTS idx_task_status_created ON task(status, created_at)",
        [],
    )?;
    db.execute(
        "CREATE INDEX IF NOT EXISTS idx_attempt_task ON post_attempt(task_id, attempted_at)",
        [],
    )?;
    db.execute(
        "CREATE INDEX IF NOT EXISTS idx_error_log_created ON error_log(created_at)",
        [],
    )?;
    db.execute(
        "CREATE INDEX IF NOT EXISTS idx_error_log_task ON error_log(task_id)",
        [],
    )?;

    Ok(())
}

impl ContentStore {
    pub async fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        if !data_dir.exists() {
            tokio::fs::create_dir_all(&data_dir).await?;
        }

        let db_path = data_dir.join("crosspost.db");
        let db = Connection::open(&db_path)?;
        create_schema(&db)?;
        info!("Content store opened at {}", db_path.display());

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            data_dir,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// In-memory store for tests. Avoids filesystem side-effects.
#[cfg(test)]
pub fn test_store() -> ContentStore {
    let db = Connection::open_in_memory().expect("open in-memory db");
    create_schema(&db).expect("create schema");
    ContentStore {
        db: Arc::new(Mutex::new(db)),
        data_dir: std::env::temp_dir(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::types::NewTask;

    #[tokio::test]
    async fn tasks_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let task_id = {
            let store = ContentStore::open(dir.path()).await.unwrap();
            assert_eq!(store.data_dir(), dir.path());
            store
                .create_draft(NewTask {
                    caption: Some("persisted".into()),
                    ..Default::default()
                })
                .await
                .unwrap()
                .task_id
        };

        let store = ContentStore::open(dir.path()).await.unwrap();
        let task = store.get_task(&task_id).await.unwrap().unwrap();
        assert_eq!(task.caption.as_deref(), Some("persisted"));
    }
}
