//! Environment-driven application configuration.
//!
//! A plain struct with a constructor and no file-based config layer:
//! every input here comes from an environment variable, loaded once at
//! startup.

use std::collections::HashSet;
use std::env;

use anyhow::{bail, Context};

use crate::middleware::admin::{DEFAULT_BURST, DEFAULT_RATE_LIMIT_PER_MINUTE};

const DEFAULT_COLLECTION: &str = "apiKeys";
const DEFAULT_PORT: u16 = 8080;

/// Application configuration assembled from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Static client keys, fixed for the process lifetime.
    pub static_keys: HashSet<String>,
    /// Administrator keys for the admin surface.
    pub master_keys: HashSet<String>,
    /// Whether the persisted temporary-key path is enabled.
    pub enable_firestore_keys: bool,
    /// Firestore project ID (falls back to `GOOGLE_CLOUD_PROJECT`).
    pub firestore_project_id: Option<String>,
    /// Firestore collection name for temporary keys.
    pub firestore_collection: String,
    /// Listening port.
    pub port: u16,
    /// Admin rate limit, requests/minute per client IP.
    pub admin_rate_limit_per_minute: u32,
    /// Admin rate limit burst capacity.
    pub admin_burst: u32,
}

impl AppConfig {
    /// Loads configuration from the process environment. Fails closed: an
    /// empty or missing `API_KEYS` or `MASTER_API_KEYS` is a startup error,
    /// rather than standing up an endpoint no key can ever pass.
    pub fn from_env() -> anyhow::Result<Self> {
        let static_keys = parse_csv_set(&env::var("API_KEYS").unwrap_or_default());
        if static_keys.is_empty() {
            bail!("API_KEYS must name at least one static client key");
        }

        let master_keys = parse_csv_set(&env::var("MASTER_API_KEYS").unwrap_or_default());
        if master_keys.is_empty() {
            bail!("MASTER_API_KEYS must name at least one administrator key");
        }

        let enable_firestore_keys = env::var("ENABLE_FIRESTORE_KEYS")
            .ok()
            .map(|v| parse_bool(&v))
            .transpose()
            .context("ENABLE_FIRESTORE_KEYS must be a boolean")?
            .unwrap_or(true);

        let firestore_project_id = env::var("FIRESTORE_PROJECT_ID")
            .ok()
            .or_else(|| env::var("GOOGLE_CLOUD_PROJECT").ok())
            .filter(|v| !v.is_empty());

        let firestore_collection =
            env::var("FIRESTORE_COLLECTION").unwrap_or_else(|_| DEFAULT_COLLECTION.to_string());

        let port = env::var("PORT")
            .ok()
            .map(|v| v.parse::<u16>())
            .transpose()
            .context("PORT must be a valid u16")?
            .unwrap_or(DEFAULT_PORT);

        Ok(Self {
            static_keys,
            master_keys,
            enable_firestore_keys,
            firestore_project_id,
            firestore_collection,
            port,
            admin_rate_limit_per_minute: DEFAULT_RATE_LIMIT_PER_MINUTE,
            admin_burst: DEFAULT_BURST,
        })
    }
}

fn parse_csv_set(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}
