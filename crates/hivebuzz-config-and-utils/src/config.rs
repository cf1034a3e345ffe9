//! Configuration management for the broker.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Application name shown to users and embedded in signed login messages.
pub const DEFAULT_APP_NAME: &str = "HiveBuzz";

/// Default public Hive API node.
pub const DEFAULT_HIVE_API_URL: &str = "https://api.hive.blog";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const DEFAULT_APP_URL: &str = "https://hivebuzz.onrender.com";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Upper bound for every configured lifetime (one year).
pub const MAX_LIFETIME_SECS: u64 = 365 * 24 * 60 * 60;

/// HiveSigner (redirect method) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HiveSignerConfig {
    /// OAuth client id registered with HiveSigner (usually the app account).
    pub client_id: String,
    /// Client secret for confidential token exchange. Never written to disk
    /// when it came from the environment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
    /// Endpoint returning `{ "user": ... }` for a bearer token.
    pub me_url: String,
    pub redirect_uri: String,
    pub scope: String,
}

impl Default for HiveSignerConfig {
    fn default() -> Self {
        Self {
            client_id: "hivebuzz".to_string(),
            client_secret: None,
            authorize_url: "https://hivesigner.com/oauth2/authorize".to_string(),
            token_url: "https://hivesigner.com/api/oauth2/token".to_string(),
            me_url: "https://hivesigner.com/api/me".to_string(),
            redirect_uri: format!("{}/auth/callback", DEFAULT_APP_URL),
            scope: "login".to_string(),
        }
    }
}

/// HiveAuth (mobile pairing) relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HiveAuthConfig {
    /// HTTPS API of the relay (pairing registration, tokens, status checks).
    pub api_url: String,
    /// Websocket endpoint of the relay.
    pub ws_url: String,
    /// Interval of the status-poll fallback.
    pub poll_interval_ms: u64,
    /// Consecutive poll failures before the poll path gives up.
    pub max_poll_failures: u32,
    /// How long a pairing waits for approval.
    pub timeout_secs: u64,
}

impl Default for HiveAuthConfig {
    fn default() -> Self {
        Self {
            api_url: "https://hiveauth.com/api".to_string(),
            ws_url: "wss://hive-auth.arcange.eu".to_string(),
            poll_interval_ms: 2_000,
            max_poll_failures: 5,
            timeout_secs: 120,
        }
    }
}

/// Lifetimes of ephemeral records and sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    pub challenge_secs: u64,
    pub oauth_state_secs: u64,
    pub pairing_secs: u64,
    pub session_secs: u64,
    pub sweep_interval_secs: u64,
    /// Upper bound on live records per ephemeral store.
    pub max_pending: usize,
    /// Upper bound on revoked sessions kept until their natural expiry.
    pub max_revoked: usize,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            challenge_secs: 300,
            oauth_state_secs: 600,
            pairing_secs: 300,
            session_secs: 7 * 24 * 60 * 60,
            sweep_interval_secs: 60,
            max_pending: 10_000,
            max_revoked: 1_000_000,
        }
    }
}

/// Main broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name shown on consent screens and embedded in the signed login message.
    pub app_name: String,
    pub app_description: String,
    /// Public base URL of the application (post-login redirects go here).
    pub app_url: String,
    /// Address the HTTP surface listens on.
    pub bind_addr: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Hive API node used for account key lookups.
    pub hive_api_url: String,
    pub hivesigner: HiveSignerConfig,
    pub hiveauth: HiveAuthConfig,
    pub ttl: TtlConfig,
    /// HMAC key for session tokens. Only ever supplied via environment.
    #[serde(skip)]
    pub session_secret: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            app_description: "A social front-end for the Hive blockchain".to_string(),
            app_url: DEFAULT_APP_URL.to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            hive_api_url: DEFAULT_HIVE_API_URL.to_string(),
            hivesigner: HiveSignerConfig::default(),
            hiveauth: HiveAuthConfig::default(),
            ttl: TtlConfig::default(),
            session_secret: None,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file. Secrets taken from the environment are
    /// not persisted.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let mut persisted = self.clone();
        if std::env::var("HIVEBUZZ_HIVESIGNER_CLIENT_SECRET").is_ok() {
            persisted.hivesigner.client_secret = None;
        }
        let content = serde_json::to_string_pretty(&persisted)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Some(log_level) = env_non_empty("HIVEBUZZ_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Some(app_url) = env_non_empty("HIVEBUZZ_APP_URL") {
            self.app_url = app_url.trim_end_matches('/').to_string();
        }
        if let Some(bind_addr) = env_non_empty("HIVEBUZZ_BIND_ADDR") {
            self.bind_addr = bind_addr;
        }
        if let Some(secret) = env_non_empty("HIVEBUZZ_HIVESIGNER_CLIENT_SECRET") {
            self.hivesigner.client_secret = Some(secret);
        }
        if let Some(secret) = env_non_empty("HIVEBUZZ_SESSION_SECRET") {
            self.session_secret = Some(secret);
        }
    }

    /// Check that every configured endpoint parses as a URL.
    pub fn validate(&self) -> CoreResult<()> {
        for (name, value) in [
            ("app_url", &self.app_url),
            ("hive_api_url", &self.hive_api_url),
            ("hivesigner.authorize_url", &self.hivesigner.authorize_url),
            ("hivesigner.token_url", &self.hivesigner.token_url),
            ("hivesigner.me_url", &self.hivesigner.me_url),
            ("hivesigner.redirect_uri", &self.hivesigner.redirect_uri),
            ("hiveauth.api_url", &self.hiveauth.api_url),
            ("hiveauth.ws_url", &self.hiveauth.ws_url),
        ] {
            Url::parse(value)
                .map_err(|e| CoreError::Config(format!("{} is not a valid URL: {}", name, e)))?;
        }

        if self.app_name.trim().is_empty() {
            return Err(CoreError::Config("app_name must not be empty".to_string()));
        }
        for (name, value) in [
            ("ttl.challenge_secs", self.ttl.challenge_secs),
            ("ttl.oauth_state_secs", self.ttl.oauth_state_secs),
            ("ttl.pairing_secs", self.ttl.pairing_secs),
            ("ttl.session_secs", self.ttl.session_secs),
            ("ttl.sweep_interval_secs", self.ttl.sweep_interval_secs),
            ("hiveauth.timeout_secs", self.hiveauth.timeout_secs),
        ] {
            if value == 0 || value > MAX_LIFETIME_SECS {
                return Err(CoreError::Config(format!(
                    "{} must be between 1 and {} seconds",
                    name, MAX_LIFETIME_SECS
                )));
            }
        }
        if self.hiveauth.poll_interval_ms == 0 || self.hiveauth.poll_interval_ms > 60_000 {
            return Err(CoreError::Config(
                "hiveauth.poll_interval_ms must be between 1 and 60000".to_string(),
            ));
        }
        if self.hiveauth.max_poll_failures == 0 {
            return Err(CoreError::Config(
                "hiveauth.max_poll_failures must be positive".to_string(),
            ));
        }
        if self.ttl.max_pending == 0 || self.ttl.max_revoked == 0 {
            return Err(CoreError::Config(
                "ttl.max_pending and ttl.max_revoked must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether the session cookie should carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.app_url.starts_with("https://")
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.app_name, DEFAULT_APP_NAME);
        assert_eq!(config.hive_api_url, DEFAULT_HIVE_API_URL);
        assert_eq!(config.ttl.challenge_secs, 300);
        assert_eq!(config.ttl.session_secs, 604_800);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_load_from_file_partial() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let config_json = r#"{
            "log_level": "debug",
            "hivesigner": { "client_id": "buzzapp" },
            "ttl": { "challenge_secs": 60 }
        }"#;

        std::fs::write(&config_path, config_json).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.hivesigner.client_id, "buzzapp");
        assert_eq!(config.hivesigner.scope, "login");
        assert_eq!(config.ttl.challenge_secs, 60);
        assert_eq!(config.ttl.pairing_secs, 300);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.app_name = "BuzzTest".to_string();
        config.hiveauth.timeout_secs = 30;

        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.app_name, "BuzzTest");
        assert_eq!(loaded.hiveauth.timeout_secs, 30);
    }

    #[test]
    fn test_session_secret_never_serialized() {
        let mut config = Config::default();
        config.session_secret = Some("super-secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("super-secret"));
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.hive_api_url, DEFAULT_HIVE_API_URL);
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = Config::default();
        config.hiveauth.ws_url = "not a url".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("hiveauth.ws_url"));
    }

    #[test]
    fn test_validate_rejects_zero_lifetime() {
        let mut config = Config::default();
        config.ttl.session_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let mut config = Config::default();
        config.hiveauth.poll_interval_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("hiveauth.poll_interval_ms"));
    }

    #[test]
    fn test_validate_rejects_dead_on_arrival_lifetimes() {
        for field in ["oauth_state", "pairing"] {
            let mut config = Config::default();
            match field {
                "oauth_state" => config.ttl.oauth_state_secs = 0,
                _ => config.ttl.pairing_secs = 0,
            }
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains(&format!("ttl.{}_secs", field)));
        }
    }

    #[test]
    fn test_validate_rejects_huge_session_lifetime() {
        let mut config = Config::default();
        config.ttl.session_secs = u64::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ttl.session_secs"));

        config.ttl.session_secs = MAX_LIFETIME_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_revocation_set() {
        let mut config = Config::default();
        config.ttl.max_revoked = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secure_cookies_follows_scheme() {
        let mut config = Config::default();
        assert!(config.secure_cookies());
        config.app_url = "http://localhost:8080".to_string();
        assert!(!config.secure_cookies());
    }
}
