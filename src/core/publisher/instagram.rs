use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{Credentials, PlatformPublisher, PostContent, PublishReceipt};
use crate::core::error::{Error, Result};

const GRAPH_BASE: &str = "https://graph.facebook.com/v19.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstagramKind {
    Post,
    Reel,
    Story,
}

/// The task's free-text notes select the Instagram sub-type; a plain image
/// post is the default.
fn kind_from_notes(notes: Option<&str>) -> InstagramKind {
    let notes = notes.unwrap_or_default().to_lowercase();
    if notes.contains("reel") {
        InstagramKind::Reel
    } else if notes.contains("story") {
        InstagramKind::Story
    } else {
        InstagramKind::Post
    }
}

#[derive(Deserialize)]
struct ContainerResponse {
    id: String,
}

#[derive(Deserialize)]
struct PublishResponse {
    id: Option<String>,
}

/// Instagram Graph publishing: create a media container, then publish it.
pub struct InstagramPublisher {
    client: Client,
}

impl InstagramPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PlatformPublisher for InstagramPublisher {
    fn api_name(&self) -> &'static str {
        "instagram"
    }

    async fn publish(&self, post: &PostContent, creds: &Credentials) -> Result<PublishReceipt> {
        let ig_user = creds
            .account_id
            .as_deref()
            .or_else(|| creds.meta_str("ig_user_id"))
            .ok_or_else(|| Error::Publish("instagram credentials missing user id".into()))?;
        let media = post
            .media_url
            .as_deref()
            .ok_or_else(|| Error::Publish("instagram posts require a media url".into()))?;

        let kind = kind_from_notes(post.notes.as_deref());
        let caption = post.caption_with_hashtags();

        let mut form: Vec<(&str, String)> = vec![("caption", caption)];
        match kind {
            InstagramKind::Post => form.push(("image_url", media.to_string())),
            InstagramKind::Reel => {
                form.push(("media_type", "REELS".to_string()));
                form.push(("video_url", media.to_string()));
            }
            InstagramKind::Story => {
                form.push(("media_type", "STORIES".to_string()));
                form.push(("image_url", media.to_string()));
            }
        }
        form.push(("access_token", creds.access_token.clone()));

        let response = self
            .client
            .post(format!("{GRAPH_BASE}/{ig_user}/media"))
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Publish(format!("instagram container request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Publish(format!(
                "instagram container rejected (HTTP {status}): {body}"
            )));
        }
        let container: ContainerResponse = response
            .json()
            .await
            .map_err(|e| Error::Publish(format!("instagram container response unreadable: {e}")))?;

        let response = self
            .client
            .post(format!("{GRAPH_BASE}/{ig_user}/media_publish"))
            .form(&[
                ("creation_id", container.id.as_str()),
                ("access_token", creds.access_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Publish(format!("instagram publish request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Publish(format!(
                "instagram publish rejected (HTTP {status}): {body}"
            )));
        }
        let published: PublishResponse = response
            .json()
            .await
            .map_err(|e| Error::Publish(format!("instagram publish response unreadable: {e}")))?;

        Ok(PublishReceipt {
            remote_post_id: published.id,
        })
    }
}
