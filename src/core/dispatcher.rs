use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::core::error::{Error, Result};
use crate::core::publisher::{Credentials, PostContent, PublisherRegistry};
use crate::core::store::types::{AttemptStatus, TaskRecord, TaskStatus};
use crate::core::store::{ContentStore, NewErrorLog};
use crate::core::vault::CredentialCipher;

pub const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 30;

/// Runs one delivery round for a claimed task: fans the post out to every
/// selected platform, writes one ledger row per platform, and commits the
/// aggregate status. A platform failure never aborts the round; the
/// remaining platforms are still attempted.
pub struct DeliveryDispatcher {
    store: Arc<ContentStore>,
    registry: Arc<PublisherRegistry>,
    cipher: Arc<CredentialCipher>,
    publish_timeout: Duration,
}

impl DeliveryDispatcher {
    pub fn new(
        store: Arc<ContentStore>,
        registry: Arc<PublisherRegistry>,
        cipher: Arc<CredentialCipher>,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            cipher,
            publish_timeout,
        }
    }

    /// Deliver a task that has already been claimed (`dispatching`). Returns
    /// the task's final status.
    pub async fn deliver(&self, task_id: &str) -> Result<TaskStatus> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| Error::not_found("Task not found"))?;
        if task.status != TaskStatus::Dispatching {
            return Err(Error::invalid_state(
                "Task must be claimed before delivery",
            ));
        }

        let platform_ids = self.store.selected_platforms(task_id).await?;
        let post = PostContent {
            caption: task.caption.clone().unwrap_or_default(),
            hashtags: task.hashtags.clone(),
            media_url: task.media_url.clone(),
            notes: task.notes.clone(),
        };

        let mut successes = 0usize;
        for platform_id in &platform_ids {
            match self.publish_one(&task, &post, platform_id).await? {
                AttemptStatus::Success => successes += 1,
                AttemptStatus::Failed => {}
            }
        }

        let final_status = if successes > 0 {
            TaskStatus::Posted
        } else {
            TaskStatus::Failed
        };
        self.store.finish_task(task_id, final_status).await?;
        info!(
            "Delivery round for task {} finished: {}/{} platforms succeeded -> {}",
            task_id,
            successes,
            platform_ids.len(),
            final_status.as_str()
        );
        Ok(final_status)
    }

    /// One platform of the fan-out. Every failure path ends in an error-log
    /// row cross-linked with a failed attempt row; only storage errors
    /// propagate.
    async fn publish_one(
        &self,
        task: &TaskRecord,
        post: &PostContent,
        platform_id: &str,
    ) -> Result<AttemptStatus> {
        let started = Instant::now();
        let outcome = self.try_publish(post, platform_id).await;
        let latency_ms = started.elapsed().as_millis() as i64;

        match outcome {
            Ok(receipt) => {
                let response = json!({
                    "status": "posted",
                    "remote_post_id": receipt.remote_post_id,
                });
                self.store
                    .record_attempt(
                        &task.task_id,
                        platform_id,
                        AttemptStatus::Success,
                        Some(response),
                        Some(latency_ms),
                        None,
                    )
                    .await?;
                Ok(AttemptStatus::Success)
            }
            Err(err) => {
                warn!(
                    "Publish to platform {} failed for task {}: {}",
                    platform_id, task.task_id, err
                );
                let error = self
                    .store
                    .record_error(NewErrorLog {
                        task_id: Some(task.task_id.clone()),
                        platform_id: Some(platform_id.to_string()),
                        error_type: Some(err.error_type().to_string()),
                        error_code: Some(err.error_code().to_string()),
                        message: Some(err.to_string()),
                        details: Some(json!({
                            "traceback": err.to_string(),
                            "latency_ms": latency_ms,
                        })),
                        ..Default::default()
                    })
                    .await?;
                let attempt = self
                    .store
                    .record_attempt(
                        &task.task_id,
                        platform_id,
                        AttemptStatus::Failed,
                        None,
                        Some(latency_ms),
                        Some(&error.error_id),
                    )
                    .await?;
                self.store
                    .link_error_to_attempt(&error.error_id, &attempt.attempt_id)
                    .await?;
                Ok(AttemptStatus::Failed)
            }
        }
    }

    /// Resolve, decrypt and call out, bounded by the publish timeout. An
    /// unusable platform fails here before any network traffic.
    async fn try_publish(
        &self,
        post: &PostContent,
        platform_id: &str,
    ) -> Result<crate::core::publisher::PublishReceipt> {
        let platform = self
            .store
            .get_platform(platform_id)
            .await?
            .ok_or_else(|| Error::PlatformUnavailable(format!("platform {platform_id} not found")))?;
        if !platform.is_usable(Utc::now()) {
            return Err(Error::PlatformUnavailable(format!(
                "platform {} ({}) is inactive or its credentials have expired",
                platform_id, platform.api_name
            )));
        }

        let publisher = self.registry.get(&platform.api_name).ok_or_else(|| {
            Error::PlatformUnavailable(format!("no publisher for '{}'", platform.api_name))
        })?;

        let plaintext = self
            .cipher
            .decrypt(&platform.credentials)
            .map_err(|e| Error::Publish(format!("credentials could not be decrypted: {e}")))?;
        let creds = Credentials::from_json(&plaintext)?;

        match tokio::time::timeout(self.publish_timeout, publisher.publish(post, &creds)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.publish_timeout.as_secs())),
        }
    }
}
