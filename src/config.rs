use crate::errors::ConfigError;
use dotenv::dotenv;
use log::debug;
use std::env;
use std::str::FromStr;
use std::time::Duration;

// API URL constants
pub const GMAIL_API_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";
pub const GMAIL_BATCH_URL: &str = "https://www.googleapis.com/batch/gmail/v1";
pub const CALENDAR_API_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";
pub const OAUTH_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1";

pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080/oauth/callback";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4-turbo-2024-04-09";
pub const DEFAULT_SCOPES: &[&str] = &[
    "openid",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/calendar",
];

/// Gmail rejects list pages above 500 ids and batches above 100 parts.
pub const MAX_PAGE_SIZE: u32 = 500;
pub const MAX_BATCH_SIZE: usize = 100;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3 * 60 * 60);

/// How contact resolution reaches the mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStrategy {
    /// Harvest every sender and recipient once, cache them, match locally.
    Cached,
    /// Run one `to:<name> OR from:<name>` scan per candidate, concurrently, uncached.
    Targeted,
}

impl FromStr for ScanStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cached" | "full" => Ok(ScanStrategy::Cached),
            "targeted" | "query" => Ok(ScanStrategy::Targeted),
            other => Err(format!("unknown scan strategy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub strategy: ScanStrategy,
    pub page_size: u32,
    pub batch_size: usize,
    pub backoff: Duration,
    pub cache_ttl: Duration,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            strategy: ScanStrategy::Cached,
            page_size: MAX_PAGE_SIZE,
            batch_size: MAX_BATCH_SIZE,
            backoff: DEFAULT_BACKOFF,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    /// Single-tenant credentials for the local user, if already linked.
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub scan: ScanSettings,
}

impl Config {
    /// Minimal configuration with defaults for everything but the OAuth client.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            refresh_token: None,
            access_token: None,
            user_email: None,
            user_name: None,
            openai_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            scan: ScanSettings::default(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        // If DOTENV_PATH is set, use that path, otherwise use default
        if let Ok(path) = env::var("DOTENV_PATH") {
            let _ = dotenv::from_path(path);
        } else {
            let _ = dotenv();
        }

        debug!("Loading assistant configuration from environment");

        let client_id = env::var("GOOGLE_CLIENT_ID")
            .map_err(|_| ConfigError::MissingEnvVar("GOOGLE_CLIENT_ID".to_string()))?;

        let client_secret = env::var("GOOGLE_CLIENT_SECRET")
            .map_err(|_| ConfigError::MissingEnvVar("GOOGLE_CLIENT_SECRET".to_string()))?;

        let mut config = Config::new(client_id, client_secret);

        if let Ok(uri) = env::var("GOOGLE_REDIRECT_URI") {
            config.redirect_uri = uri;
        }
        if let Ok(scopes) = env::var("GOOGLE_SCOPES") {
            config.scopes = parse_scopes(&scopes);
        }

        config.refresh_token = optional_var("GMAIL_REFRESH_TOKEN");
        config.access_token = optional_var("GMAIL_ACCESS_TOKEN");
        config.user_email = optional_var("ASSISTANT_USER_EMAIL");
        config.user_name = optional_var("ASSISTANT_USER_NAME");
        config.openai_api_key = optional_var("OPENAI_API_KEY");
        if let Some(model) = optional_var("OPENAI_MODEL") {
            config.openai_model = model;
        }

        config.scan = ScanSettings {
            strategy: parse_var("CONTACT_SCAN_STRATEGY", ScanStrategy::Cached)?,
            page_size: parse_var("GMAIL_PAGE_SIZE", MAX_PAGE_SIZE)?.clamp(1, MAX_PAGE_SIZE),
            batch_size: parse_var("GMAIL_BATCH_SIZE", MAX_BATCH_SIZE)?.clamp(1, MAX_BATCH_SIZE),
            backoff: Duration::from_millis(parse_var(
                "RATE_LIMIT_BACKOFF_MS",
                DEFAULT_BACKOFF.as_millis() as u64,
            )?),
            cache_ttl: Duration::from_secs(parse_var(
                "CONTACT_CACHE_TTL_SECONDS",
                DEFAULT_CACHE_TTL.as_secs(),
            )?),
        };

        debug!(
            "Configuration loaded (scan strategy: {:?}, page size: {}, batch size: {})",
            config.scan.strategy, config.scan.page_size, config.scan.batch_size
        );

        Ok(config)
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match optional_var(name) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}

pub fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// Configuration utility functions
pub fn get_token_expiry_seconds() -> u64 {
    std::env::var("TOKEN_EXPIRY_SECONDS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(600) // Default 10 minutes if not configured
}
