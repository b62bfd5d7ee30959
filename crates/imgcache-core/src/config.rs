//! Configuration for the Imgur metadata cache.
//!
//! The host build system supplies three values: the API credential, the cache
//! TTL, and (rarely) an alternate API base URL. Configuration can be built
//! programmatically or loaded from a TOML file.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::client::API_URL;
use crate::error::{Error, Result};

/// Default cache TTL: 48 hours, in seconds.
pub const DEFAULT_TTL: u64 = 172_800;

/// Required shape of an Imgur API client ID.
#[allow(clippy::expect_used)] // the pattern is a literal constant
static CLIENT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-f0-9]{5,30}$").expect("valid client-id pattern"));

/// Settings controlling cache refresh behavior.
///
/// ## Example configuration file
///
/// ```toml
/// client_id = "13d3c73555f2190"
/// ttl = 172800
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Imgur API client ID (<https://api.imgur.com/oauth2>).
    ///
    /// Must be 5-30 lowercase hexadecimal characters. Validated before any
    /// request is issued.
    pub client_id: String,

    /// Seconds before a successfully fetched entry is considered expired.
    ///
    /// `0` means entries expire as soon as more than zero seconds have
    /// elapsed; entries refreshed in the current cycle are still fresh within
    /// that cycle.
    #[serde(default = "default_ttl")]
    pub ttl: u64,

    /// Base URL of the Imgur API. Overridable for tests and proxies.
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

const fn default_ttl() -> u64 {
    DEFAULT_TTL
}

fn default_api_url() -> String {
    API_URL.to_string()
}

impl CacheConfig {
    /// Build a configuration with default TTL and API URL.
    #[must_use]
    pub fn new(client_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            ttl: DEFAULT_TTL,
            api_url: default_api_url(),
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the file cannot be read, does not
    /// parse, or fails [`validate`](Self::validate).
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can drive a refresh.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a missing or malformed `client_id`.
    pub fn validate(&self) -> Result<()> {
        validate_client_id(&self.client_id)
    }
}

/// Validate an Imgur API client ID.
///
/// An empty or malformed credential is fatal: the whole refresh stops before
/// any request is sent.
pub fn validate_client_id(client_id: &str) -> Result<()> {
    if client_id.is_empty() {
        return Err(Error::Config(
            "client_id must be set for Imgur API calls".to_string(),
        ));
    }
    if !CLIENT_ID_RE.is_match(client_id) {
        return Err(Error::Config(
            "client_id must be 5-30 lower case hexadecimal characters only".to_string(),
        ));
    }
    Ok(())
}
