use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{Credentials, PlatformPublisher, PostContent, PublishReceipt};
use crate::core::error::{Error, Result};

const THREADS_BASE: &str = "https://graph.threads.net/v1.0";

#[derive(Deserialize)]
struct ContainerResponse {
    id: String,
}

#[derive(Deserialize)]
struct PublishResponse {
    id: Option<String>,
}

/// Threads publishing follows the same container-then-publish shape as
/// Instagram, with TEXT posts allowed.
pub struct ThreadsPublisher {
    client: Client,
}

impl ThreadsPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PlatformPublisher for ThreadsPublisher {
    fn api_name(&self) -> &'static str {
        "threads"
    }

    async fn publish(&self, post: &PostContent, creds: &Credentials) -> Result<PublishReceipt> {
        let user_id = creds
            .account_id
            .as_deref()
            .or_else(|| creds.meta_str("threads_user_id"))
            .ok_or_else(|| Error::Publish("threads credentials missing user id".into()))?;

        let text = post.caption_with_hashtags();
        let mut form: Vec<(&str, String)> = vec![("text", text)];
        match &post.media_url {
            Some(media) => {
                form.push(("media_type", "IMAGE".to_string()));
                form.push(("image_url", media.clone()));
            }
            None => form.push(("media_type", "TEXT".to_string())),
        }
        form.push(("access_token", creds.access_token.clone()));

        let response = self
            .client
            .post(format!("{THREADS_BASE}/{user_id}/threads"))
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Publish(format!("threads container request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Publish(format!(
                "threads container rejected (HTTP {status}): {body}"
            )));
        }
        let container: ContainerResponse = response
            .json()
            .await
            .map_err(|e| Error::Publish(format!("threads container response unreadable: {e}")))?;

        let response = self
            .client
            .post(format!("{THREADS_BASE}/{user_id}/threads_publish"))
            .form(&[
                ("creation_id", container.id.as_str()),
                ("access_token", creds.access_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Publish(format!("threads publish request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Publish(format!(
                "threads publish rejected (HTTP {status}): {body}"
            )));
        }
        let published: PublishResponse = response
            .json()
            .await
            .map_err(|e| Error::Publish(format!("threads publish response unreadable: {e}")))?;

        Ok(PublishReceipt {
            remote_post_id: published.id,
        })
    }
}
