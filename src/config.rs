use anyhow::{Context, Result};
use std::env;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// A configuration value that must never reach a log sink.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" => Environment::Development,
            _ => Environment::Production,
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub environment: Environment,
    pub neynar_api_url: String,
    pub neynar_api_key: Option<Secret>,
    pub hub_url: String,
    pub hub_api_key: Option<Secret>,
    pub privy_app_id: Option<String>,
    pub privy_api_url: String,
    pub database_url: Option<Secret>,
    pub optimism_rpc_url: String,
    pub imgbb_api_key: Option<Secret>,
    pub app_fid: Option<u64>,
    pub app_mnemonic: Option<Secret>,
    pub bot_signer_uuid: Option<Uuid>,
    pub curation_service_url: Option<String>,
    pub pinned_search_username: Option<String>,
    pub http_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let app_fid = match optional("APP_FID") {
            Some(raw) => Some(
                raw.parse::<u64>()
                    .ok()
                    .filter(|fid| *fid > 0)
                    .context("APP_FID must be a positive integer")?,
            ),
            None => None,
        };

        let http_timeout = match optional("HTTP_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse::<u64>()
                    .context("HTTP_TIMEOUT_SECS must be a number of seconds")?,
            ),
            None => Duration::from_secs(15),
        };

        let max_upload_bytes = match optional("MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .parse::<usize>()
                .context("MAX_UPLOAD_BYTES must be a byte count")?,
            None => 10 * 1024 * 1024,
        };

        let bot_signer_uuid = match optional("BOT_SIGNER_UUID") {
            Some(raw) => Some(
                Uuid::parse_str(&raw).context("BOT_SIGNER_UUID must be a UUID")?,
            ),
            None => None,
        };

        // An explicitly empty value turns the search pin off.
        let pinned_search_username = match env::var("PINNED_SEARCH_USERNAME") {
            Ok(value) if value.trim().is_empty() => None,
            Ok(value) => Some(value.trim().to_string()),
            Err(_) => Some("homiehouse".to_string()),
        };

        Ok(Self {
            bind_address: env::var("API_BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            environment: Environment::parse(
                &env::var("APP_ENV").unwrap_or_else(|_| "production".to_string()),
            ),
            neynar_api_url: env::var("NEYNAR_API_URL")
                .unwrap_or_else(|_| "https://api.neynar.com".to_string()),
            neynar_api_key: optional("NEYNAR_API_KEY").map(Secret::new),
            hub_url: env::var("HUB_URL")
                .unwrap_or_else(|_| "https://hub-api.neynar.com".to_string()),
            hub_api_key: optional("HUB_API_KEY").map(Secret::new),
            privy_app_id: optional("PRIVY_APP_ID"),
            privy_api_url: env::var("PRIVY_API_URL")
                .unwrap_or_else(|_| "https://auth.privy.io".to_string()),
            database_url: optional("DATABASE_URL").map(Secret::new),
            optimism_rpc_url: env::var("OPTIMISM_RPC_URL")
                .unwrap_or_else(|_| "https://mainnet.optimism.io".to_string()),
            imgbb_api_key: optional("IMGBB_API_KEY").map(Secret::new),
            app_fid,
            app_mnemonic: optional("APP_MNEMONIC").map(Secret::new),
            bot_signer_uuid,
            curation_service_url: optional("CURATION_SERVICE_URL"),
            pinned_search_username,
            http_timeout,
            max_upload_bytes,
        })
    }
}

/// Built-in defaults with every optional integration switched off.
impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            environment: Environment::Production,
            neynar_api_url: "https://api.neynar.com".to_string(),
            neynar_api_key: None,
            hub_url: "https://hub-api.neynar.com".to_string(),
            hub_api_key: None,
            privy_app_id: None,
            privy_api_url: "https://auth.privy.io".to_string(),
            database_url: None,
            optimism_rpc_url: "https://mainnet.optimism.io".to_string(),
            imgbb_api_key: None,
            app_fid: None,
            app_mnemonic: None,
            bot_signer_uuid: None,
            curation_service_url: None,
            pinned_search_username: Some("homiehouse".to_string()),
            http_timeout: Duration::from_secs(15),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
