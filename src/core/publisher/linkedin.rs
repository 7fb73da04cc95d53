use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{Credentials, PlatformPublisher, PostContent, PublishReceipt};
use crate::core::error::{Error, Result};

const UGC_POSTS_URL: &str = "https://api.linkedin.com/v2/ugcPosts";

/// Publishes a UGC post for a member. `account_id` is the bare member id;
/// the URN prefix is added here.
pub struct LinkedInPublisher {
    client: Client,
}

impl LinkedInPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PlatformPublisher for LinkedInPublisher {
    fn api_name(&self) -> &'static str {
        "linkedin"
    }

    async fn publish(&self, post: &PostContent, creds: &Credentials) -> Result<PublishReceipt> {
        let member_id = creds
            .account_id
            .as_deref()
            .or_else(|| creds.meta_str("person_id"))
            .ok_or_else(|| Error::Publish("linkedin credentials missing member id".into()))?;
        let author = if member_id.starts_with("urn:") {
            member_id.to_string()
        } else {
            format!("urn:li:person:{member_id}")
        };

        let text = post.caption_with_hashtags();
        let share_content = match &post.media_url {
            Some(media) => json!({
                "shareCommentary": { "text": text },
                "shareMediaCategory": "ARTICLE",
                "media": [{ "status": "READY", "originalUrl": media }],
            }),
            None => json!({
                "shareCommentary": { "text": text },
                "shareMediaCategory": "NONE",
            }),
        };
        let body = json!({
            "author": author,
            "lifecycleState": "PUBLISHED",
            "specificContent": { "com.linkedin.ugc.ShareContent": share_content },
            "visibility": { "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC" },
        });

        let response = self
            .client
            .post(UGC_POSTS_URL)
            .bearer_auth(&creds.access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Publish(format!("linkedin request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Publish(format!(
                "linkedin rejected the post (HTTP {status}): {body}"
            )));
        }

        // The created post urn comes back in the X-RestLi-Id header.
        let remote_post_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        Ok(PublishReceipt { remote_post_id })
    }
}
