use async_trait::async_trait;
use base64::Engine;
use hmac::Mac;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha1::Sha1;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{Credentials, PlatformPublisher, PostContent, PublishReceipt};
use crate::core::error::{Error, Result};

type HmacSha1 = hmac::Hmac<Sha1>;

const TWEETS_URL: &str = "https://api.twitter.com/2/tweets";

/// Percent-encode per RFC 3986 as OAuth 1.0a requires (the unreserved set
/// only; `urlencoding` already leaves `-._~` alone).
fn oauth_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Build the `Authorization: OAuth ...` header for a request with no query
/// or form parameters (the v2 tweet endpoint takes a JSON body, which is
/// excluded from the signature base string).
fn oauth1_header(
    method: &str,
    url: &str,
    consumer_key: &str,
    consumer_secret: &str,
    token: &str,
    token_secret: &str,
) -> Result<String> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::Publish(format!("system clock before epoch: {e}")))?
        .as_secs()
        .to_string();
    let nonce_bytes: [u8; 16] = rand::random();
    let nonce = hex_string(&nonce_bytes);

    let mut params: Vec<(&str, &str)> = vec![
        ("oauth_consumer_key", consumer_key),
        ("oauth_nonce", &nonce),
        ("oauth_signature_method", "HMAC-SHA1"),
        ("oauth_timestamp", &timestamp),
        ("oauth_token", token),
        ("oauth_version", "1.0"),
    ];
    params.sort_unstable();

    let param_string = params
        .iter()
        .map(|(k, v)| format!("{}={}", oauth_encode(k), oauth_encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let base_string = format!(
        "{}&{}&{}",
        method,
        oauth_encode(url),
        oauth_encode(&param_string)
    );
    let signing_key = format!(
        "{}&{}",
        oauth_encode(consumer_secret),
        oauth_encode(token_secret)
    );

    let mut mac = <HmacSha1 as Mac>::new_from_slice(signing_key.as_bytes())
        .map_err(|e| Error::Publish(format!("oauth signing key rejected: {e}")))?;
    mac.update(base_string.as_bytes());
    let signature = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    let mut header_params = params
        .iter()
        .map(|(k, v)| (*k, (*v).to_string()))
        .collect::<Vec<_>>();
    header_params.push(("oauth_signature", signature));
    header_params.sort_unstable_by(|a, b| a.0.cmp(b.0));

    let header = header_params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", oauth_encode(k), oauth_encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("OAuth {header}"))
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[derive(Deserialize)]
struct TweetResponse {
    data: Option<TweetData>,
}

#[derive(Deserialize)]
struct TweetData {
    id: String,
}

/// Posts a tweet via the v2 API with OAuth 1.0a user-context signing.
/// Media uploads are not wired in; a media url is appended to the text.
pub struct XPublisher {
    client: Client,
}

impl XPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PlatformPublisher for XPublisher {
    fn api_name(&self) -> &'static str {
        "x"
    }

    async fn publish(&self, post: &PostContent, creds: &Credentials) -> Result<PublishReceipt> {
        let consumer_key = creds.require_meta("consumer_key")?;
        let consumer_secret = creds.require_meta("consumer_secret")?;
        let token_secret = creds.require_meta("access_token_secret")?;

        let mut text = post.caption_with_hashtags();
        if let Some(media) = &post.media_url {
            text = format!("{text} {media}").trim().to_string();
        }

        let authorization = oauth1_header(
            "POST",
            TWEETS_URL,
            consumer_key,
            consumer_secret,
            &creds.access_token,
            token_secret,
        )?;

        let response = self
            .client
            .post(TWEETS_URL)
            .header("Authorization", authorization)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| Error::Publish(format!("x request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Publish(format!(
                "x rejected the tweet (HTTP {status}): {body}"
            )));
        }

        let parsed: TweetResponse = response
            .json()
            .await
            .map_err(|e| Error::Publish(format!("x response unreadable: {e}")))?;

        Ok(PublishReceipt {
            remote_post_id: parsed.data.map(|d| d.id),
        })
    }
}
