use chrono::{DateTime, Utc};
use rusqlite::{Row, params};
use uuid::Uuid;

use super::ContentStore;
use super::types::{PlatformRecord, fmt_ts, parse_ts};
use crate::core::error::{Error, Result};

/// Platform connections the dispatcher can publish through.
pub const SUPPORTED_PLATFORMS: &[&str] = &["instagram", "facebook", "threads", "x", "linkedin"];

#[derive(Debug, Clone)]
pub struct NewPlatform {
    pub api_name: String,
    pub account_id: Option<String>,
    pub account_name: Option<String>,
    /// Already-encrypted credentials blob; the registry is the only writer.
    pub credentials: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Partial update; `expires_at` uses a nested Option so "clear expiry"
/// (permanent token) is distinct from "leave unchanged".
#[derive(Debug, Clone, Default)]
pub struct PlatformUpdate {
    pub is_active: Option<bool>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub account_id: Option<String>,
    pub account_name: Option<String>,
    pub credentials: Option<String>,
}

fn row_to_platform(row: &Row<'_>) -> rusqlite::Result<PlatformRecord> {
    let expires_at: Option<String> = row.get(5)?;
    let created_at: String = row.get(7)?;
    Ok(PlatformRecord {
        platform_id: row.get(0)?,
        api_name: row.get(1)?,
        account_id: row.get(2)?,
        account_name: row.get(3)?,
        credentials: row.get(4)?,
        expires_at: expires_at.as_deref().and_then(parse_ts),
        is_active: row.get::<_, i64>(6)? != 0,
        created_at: parse_ts(&created_at).unwrap_or_default(),
    })
}

const PLATFORM_COLUMNS: &str =
    "platform_id, api_name, account_id, account_name, credentials, expires_at, is_active, created_at";

impl ContentStore {
    pub async fn register_platform(&self, new: NewPlatform) -> Result<PlatformRecord> {
        let api_name = new.api_name.to_lowercase();
        if !SUPPORTED_PLATFORMS.contains(&api_name.as_str()) {
            return Err(Error::validation(format!(
                "Unsupported platform '{}'",
                new.api_name
            )));
        }

        let platform_id = Uuid::new_v4().to_string();
        let created_at = fmt_ts(Utc::now());

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO platform (platform_id, api_name, account_id, account_name,
                                   credentials, expires_at, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
            params![
                platform_id,
                api_name,
                new.account_id,
                new.account_name,
                new.credentials,
                new.expires_at.map(fmt_ts),
                created_at
            ],
        )?;
        drop(db);

        self.get_platform(&platform_id)
            .await?
            .ok_or_else(|| Error::not_found("platform vanished after insert"))
    }

    pub async fn get_platform(&self, platform_id: &str) -> Result<Option<PlatformRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {PLATFORM_COLUMNS} FROM platform WHERE platform_id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![platform_id], row_to_platform)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub async fn list_platforms(&self) -> Result<Vec<PlatformRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {PLATFORM_COLUMNS} FROM platform ORDER BY api_name"
        ))?;
        let rows = stmt.query_map([], row_to_platform)?;
        let mut platforms = Vec::new();
        for row in rows {
            platforms.push(row?);
        }
        Ok(platforms)
    }

    /// Platforms eligible for selection in a new round: active and not past
    /// their credential expiry.
    pub async fn usable_platforms(&self, now: DateTime<Utc>) -> Result<Vec<PlatformRecord>> {
        Ok(self
            .list_platforms()
            .await?
            .into_iter()
            .filter(|p| p.is_usable(now))
            .collect())
    }

    pub async fn update_platform(
        &self,
        platform_id: &str,
        update: PlatformUpdate,
    ) -> Result<PlatformRecord> {
        let current = self
            .get_platform(platform_id)
            .await?
            .ok_or_else(|| Error::not_found("Platform not found"))?;

        let is_active = update.is_active.unwrap_or(current.is_active);
        let expires_at = match update.expires_at {
            Some(value) => value,
            None => current.expires_at,
        };

        let db = self.db.lock().await;
        db.execute(
            "UPDATE platform SET is_active = ?2, expires_at = ?3, account_id = ?4,
                                 account_name = ?5, credentials = ?6
             WHERE platform_id = ?1",
            params![
                platform_id,
                is_active as i64,
                expires_at.map(fmt_ts),
                update.account_id.or(current.account_id),
                update.account_name.or(current.account_name),
                update.credentials.unwrap_or(current.credentials),
            ],
        )?;
        drop(db);

        self.get_platform(platform_id)
            .await?
            .ok_or_else(|| Error::not_found("Platform not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::test_store;
    use chrono::Duration;

    fn facebook() -> NewPlatform {
        NewPlatform {
            api_name: "facebook".into(),
            account_id: Some("page-123".into()),
            account_name: Some("Acme Page".into()),
            credentials: "encrypted-blob".into(),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn register_and_fetch() {
        let store = test_store();
        let platform = store.register_platform(facebook()).await.unwrap();
        assert!(platform.is_active);
        assert_eq!(platform.api_name, "facebook");

        let fetched = store
            .get_platform(&platform.platform_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.account_name.as_deref(), Some("Acme Page"));
    }

    #[tokio::test]
    async fn unknown_api_name_rejected() {
        let store = test_store();
        let err = store
            .register_platform(NewPlatform {
                api_name: "myspace".into(),
                ..facebook()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn usable_excludes_expired_and_inactive() {
        let store = test_store();
        let ok = store.register_platform(facebook()).await.unwrap();
        let expired = store
            .register_platform(NewPlatform {
                api_name: "instagram".into(),
                expires_at: Some(Utc::now() - Duration::hours(1)),
                ..facebook()
            })
            .await
            .unwrap();
        let disabled = store
            .register_platform(NewPlatform {
                api_name: "threads".into(),
                ..facebook()
            })
            .await
            .unwrap();
        store
            .update_platform(
                &disabled.platform_id,
                PlatformUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let usable = store.usable_platforms(Utc::now()).await.unwrap();
        let ids: Vec<&str> = usable.iter().map(|p| p.platform_id.as_str()).collect();
        assert_eq!(ids, vec![ok.platform_id.as_str()]);
        assert!(!ids.contains(&expired.platform_id.as_str()));
    }

    #[tokio::test]
    async fn update_can_clear_expiry() {
        let store = test_store();
        let platform = store
            .register_platform(NewPlatform {
                expires_at: Some(Utc::now() + Duration::days(30)),
                ..facebook()
            })
            .await
            .unwrap();

        let updated = store
            .update_platform(
                &platform.platform_id,
                PlatformUpdate {
                    expires_at: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.expires_at.is_none());
    }

    #[tokio::test]
    async fn update_unknown_platform_is_not_found() {
        let store = test_store();
        let err = store
            .update_platform("missing", PlatformUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
