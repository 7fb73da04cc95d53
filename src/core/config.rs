use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::core::dispatcher::DEFAULT_PUBLISH_TIMEOUT_SECS;
use crate::core::scheduler::DEFAULT_POLL_INTERVAL_SECS;

/// Runtime configuration, read once from the environment at startup.
/// Every knob has a default; an unset environment is a valid deployment.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub data_dir: PathBuf,
    pub publish_timeout: Duration,
    pub poll_interval: Duration,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("CROSSPOST_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("crosspost")
            });

        Self {
            host: env_parse("CROSSPOST_HOST")
                .unwrap_or(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_parse("CROSSPOST_PORT").unwrap_or(8000),
            data_dir,
            publish_timeout: Duration::from_secs(
                env_parse("CROSSPOST_PUBLISH_TIMEOUT_SECS")
                    .unwrap_or(DEFAULT_PUBLISH_TIMEOUT_SECS),
            ),
            poll_interval: Duration::from_secs(
                env_parse("CROSSPOST_POLL_INTERVAL_SECS").unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            ),
        }
    }
}
