use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{Credentials, PlatformPublisher, PostContent, PublishReceipt};
use crate::core::error::{Error, Result};

const GRAPH_BASE: &str = "https://graph.facebook.com/v19.0";

#[derive(Deserialize)]
struct GraphPostResponse {
    id: Option<String>,
    post_id: Option<String>,
}

/// Publishes to a Facebook page: `/photos` when the post carries media,
/// `/feed` for text-only posts.
pub struct FacebookPublisher {
    client: Client,
}

impl FacebookPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn page_id<'a>(&self, creds: &'a Credentials) -> Result<&'a str> {
        creds
            .account_id
            .as_deref()
            .or_else(|| creds.meta_str("page_id"))
            .ok_or_else(|| Error::Publish("facebook credentials missing page id".into()))
    }
}

#[async_trait]
impl PlatformPublisher for FacebookPublisher {
    fn api_name(&self) -> &'static str {
        "facebook"
    }

    async fn publish(&self, post: &PostContent, creds: &Credentials) -> Result<PublishReceipt> {
        let page_id = self.page_id(creds)?;
        let message = post.caption_with_hashtags();

        let (url, mut form) = match &post.media_url {
            Some(media) => (
                format!("{GRAPH_BASE}/{page_id}/photos"),
                vec![("url", media.clone()), ("message", message)],
            ),
            None => (
                format!("{GRAPH_BASE}/{page_id}/feed"),
                vec![("message", message)],
            ),
        };
        form.push(("access_token", creds.access_token.clone()));

        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Publish(format!("facebook request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Publish(format!(
                "facebook rejected the post (HTTP {status}): {body}"
            )));
        }

        let parsed: GraphPostResponse = response
            .json()
            .await
            .map_err(|e| Error::Publish(format!("facebook response unreadable: {e}")))?;

        Ok(PublishReceipt {
            remote_post_id: parsed.post_id.or(parsed.id),
        })
    }
}
