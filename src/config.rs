use crate::error::ConfigError;
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_STATE_FILE: &str = "./last-guid.txt";
pub const DEFAULT_POLL_INTERVAL_MINUTES: u64 = 15;

/// Where the supplementary release fields come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailMode {
    /// Fetch the detail page through a challenge-solving proxy.
    Solver(String),
    /// Fetch the detail page with a plain GET.
    Direct,
    /// No detail fetch; use the feed's own attributes.
    FeedAttributes,
}

/// Process-wide settings, built once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_bot_token: SecretString,
    pub telegram_chat_id: String,
    pub telegram_api_url: String,
    pub feed_url: String,
    pub detail_mode: DetailMode,
    pub state_file: PathBuf,
    pub poll_interval: Duration,
}

impl Config {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup
    /// Empty values are treated as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let telegram_bot_token = SecretString::from(require("TELEGRAM_BOT_TOKEN")?);
        let telegram_chat_id = require("TELEGRAM_CHAT_ID")?;
        let feed_url = require("RSS_FEED_URL")?;

        let telegram_api_url = get("TELEGRAM_API_URL")
            .unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let resolver = get("FLARE_RESOLVER_URL");
        let detail_mode = match get("ENRICH_MODE").as_deref().unwrap_or("auto") {
            "auto" => match resolver {
                Some(url) => DetailMode::Solver(url),
                None => DetailMode::Direct,
            },
            "solver" => DetailMode::Solver(resolver.ok_or(ConfigError::Invalid {
                key: "ENRICH_MODE",
                reason: "solver mode requires FLARE_RESOLVER_URL".to_string(),
            })?),
            "direct" => DetailMode::Direct,
            "attributes" => DetailMode::FeedAttributes,
            other => {
                return Err(ConfigError::Invalid {
                    key: "ENRICH_MODE",
                    reason: format!("unknown mode '{}'", other),
                })
            }
        };

        let state_file = expand_state_file(get("STATE_FILE"));

        let minutes = match get("POLL_INTERVAL_MINUTES") {
            Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                key: "POLL_INTERVAL_MINUTES",
                reason: e.to_string(),
            })?,
            None => DEFAULT_POLL_INTERVAL_MINUTES,
        };
        if minutes == 0 {
            return Err(ConfigError::Invalid {
                key: "POLL_INTERVAL_MINUTES",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            telegram_bot_token,
            telegram_chat_id,
            telegram_api_url,
            feed_url,
            detail_mode,
            state_file,
            poll_interval: Duration::from_secs(minutes * 60),
        })
    }

    /// Resolves only the watermark path, for commands that don't need the rest.
    pub fn state_file_from_env() -> PathBuf {
        expand_state_file(
            std::env::var("STATE_FILE")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        )
    }
}

fn expand_state_file(raw: Option<String>) -> PathBuf {
    let raw = raw.unwrap_or_else(|| DEFAULT_STATE_FILE.to_string());
    PathBuf::from(shellexpand::tilde(raw.trim()).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("TELEGRAM_BOT_TOKEN", "123:abc"),
        ("TELEGRAM_CHAT_ID", "-10042"),
        ("RSS_FEED_URL", "https://indexer.example/api?t=search"),
    ];

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.telegram_bot_token.expose_secret(), "123:abc");
        assert_eq!(config.telegram_chat_id, "-10042");
        assert_eq!(config.telegram_api_url, DEFAULT_TELEGRAM_API_URL);
        assert_eq!(config.detail_mode, DetailMode::Direct);
        assert_eq!(config.state_file, PathBuf::from(DEFAULT_STATE_FILE));
        assert_eq!(config.poll_interval, Duration::from_secs(15 * 60));
    }

    #[test]
    fn test_missing_required_key() {
        let err = Config::from_lookup(lookup(&REQUIRED[..2])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("RSS_FEED_URL")));

        let mut pairs = REQUIRED.to_vec();
        pairs[0].1 = "   ";
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("TELEGRAM_BOT_TOKEN")));
    }

    #[test]
    fn test_solver_selected_when_resolver_configured() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("FLARE_RESOLVER_URL", "http://localhost:8191/v1"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(
            config.detail_mode,
            DetailMode::Solver("http://localhost:8191/v1".to_string())
        );
    }

    #[test]
    fn test_enrich_mode_validation() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ENRICH_MODE", "solver"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(ConfigError::Invalid { key: "ENRICH_MODE", .. })
        ));

        pairs.pop();
        pairs.push(("ENRICH_MODE", "attributes"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.detail_mode, DetailMode::FeedAttributes);

        pairs.pop();
        pairs.push(("ENRICH_MODE", "telepathy"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn test_poll_interval() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("POLL_INTERVAL_MINUTES", "5"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(300));

        pairs.pop();
        pairs.push(("POLL_INTERVAL_MINUTES", "0"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());

        pairs.pop();
        pairs.push(("POLL_INTERVAL_MINUTES", "soon"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn test_token_not_in_debug_output() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();
        assert!(!format!("{:?}", config).contains("123:abc"));
    }
}
