pub mod facebook;
pub mod instagram;
pub mod linkedin;
pub mod threads;
pub mod x;

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::core::error::{Error, Result};

pub use facebook::FacebookPublisher;
pub use instagram::InstagramPublisher;
pub use linkedin::LinkedInPublisher;
pub use threads::ThreadsPublisher;
pub use x::XPublisher;

/// The content of one task, as handed to a publisher.
#[derive(Debug, Clone, Default)]
pub struct PostContent {
    pub caption: String,
    pub hashtags: Vec<String>,
    pub media_url: Option<String>,
    /// Free text from the task; publishers may derive a sub-type from it
    /// (e.g. "Reel" or "Story" for Instagram).
    pub notes: Option<String>,
}

impl PostContent {
    /// Caption followed by normalized hashtags: "text #tag1 #tag2".
    pub fn caption_with_hashtags(&self) -> String {
        build_caption(&self.caption, &self.hashtags)
    }
}

pub fn build_caption(caption: &str, hashtags: &[String]) -> String {
    let tags: Vec<String> = hashtags
        .iter()
        .map(|t| t.trim().trim_start_matches('#'))
        .filter(|t| !t.is_empty())
        .map(|t| format!("#{}", t))
        .collect();
    if tags.is_empty() {
        caption.trim().to_string()
    } else {
        format!("{} {}", caption.trim(), tags.join(" "))
            .trim()
            .to_string()
    }
}

/// Decrypted platform credentials, owned by the dispatcher for one round.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub access_token: String,
    pub account_id: Option<String>,
    pub account_name: Option<String>,
    /// Platform-specific extras (consumer keys, user ids, ...).
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

impl Credentials {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Publish(format!("malformed platform credentials: {e}")))
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(|v| v.as_str())
    }

    fn require_meta(&self, key: &str) -> Result<&str> {
        self.meta_str(key)
            .ok_or_else(|| Error::Publish(format!("missing credential field '{key}'")))
    }
}

/// Outcome of a successful publish call.
#[derive(Debug, Clone, Default)]
pub struct PublishReceipt {
    pub remote_post_id: Option<String>,
}

/// One implementation per social platform, selected by `api_name` through the
/// registry. Implementations must translate every upstream failure into
/// `Error::Publish`; nothing is allowed to panic or escape untyped.
#[async_trait]
pub trait PlatformPublisher: Send + Sync {
    fn api_name(&self) -> &'static str;

    async fn publish(&self, post: &PostContent, creds: &Credentials) -> Result<PublishReceipt>;
}

/// Registry keyed by `api_name`; the dispatcher resolves publishers here
/// instead of branching on platform names.
pub struct PublisherRegistry {
    publishers: HashMap<&'static str, Arc<dyn PlatformPublisher>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self {
            publishers: HashMap::new(),
        }
    }

    pub fn register(&mut self, publisher: Arc<dyn PlatformPublisher>) {
        info!("Registered publisher: {}", publisher.api_name());
        self.publishers.insert(publisher.api_name(), publisher);
    }

    pub fn get(&self, api_name: &str) -> Option<Arc<dyn PlatformPublisher>> {
        self.publishers.get(api_name).cloned()
    }

    pub fn api_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.publishers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Registry with all built-in platform publishers sharing one HTTP client.
    pub fn with_default_publishers(client: reqwest::Client) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(InstagramPublisher::new(client.clone())));
        registry.register(Arc::new(FacebookPublisher::new(client.clone())));
        registry.register(Arc::new(ThreadsPublisher::new(client.clone())));
        registry.register(Arc::new(XPublisher::new(client.clone())));
        registry.register(Arc::new(LinkedInPublisher::new(client)));
        registry
    }
}

impl Default for PublisherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_builder_normalizes_tags() {
        assert_eq!(
            build_caption("Hello world", &["#one".into(), " two ".into(), "".into()]),
            "Hello world #one #two"
        );
        assert_eq!(build_caption("  plain  ", &[]), "plain");
    }

    #[test]
    fn credentials_parse_with_meta() {
        let creds = Credentials::from_json(
            r#"{"access_token":"tok","account_id":"acc","meta":{"page_id":"pg-9"}}"#,
        )
        .unwrap();
        assert_eq!(creds.access_token, "tok");
        assert_eq!(creds.meta_str("page_id"), Some("pg-9"));
        assert!(creds.meta_str("missing").is_none());
    }

    #[test]
    fn malformed_credentials_become_publish_errors() {
        let err = Credentials::from_json("{nope").unwrap_err();
        assert!(matches!(err, Error::Publish(_)));
    }

    #[test]
    fn default_registry_covers_all_supported_platforms() {
        let registry = PublisherRegistry::with_default_publishers(reqwest::Client::new());
        assert_eq!(
            registry.api_names(),
            vec!["facebook", "instagram", "linkedin", "threads", "x"]
        );
        assert!(registry.get("instagram").is_some());
        assert!(registry.get("myspace").is_none());
    }
}
