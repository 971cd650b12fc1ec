//! Relay configuration
//!
//! Everything comes from the process environment and is read once at startup.

use std::fmt;

use crate::error::RelayError;

pub const ENV_BASE_URL: &str = "GENTORO_BASE_URL";
pub const ENV_BRIDGE_UID: &str = "GENTORO_BRIDGE_UID";
pub const ENV_API_KEY: &str = "GENTORO_API_KEY";

/// Path segment between the base URL and the bridge identifier
const AGENTS_PATH: &str = "/bornio/v1/agents/";

/// Relay configuration
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Root of the Gentoro API (e.g. "https://api.gentoro.com")
    pub base_url: Option<String>,
    /// Bridge identifying which agent to address
    pub bridge_uid: Option<String>,
    /// Credential sent with every outbound call
    pub api_key: Option<String>,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Missing or empty variables become `None`; this never fails.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            base_url: get(ENV_BASE_URL),
            bridge_uid: get(ENV_BRIDGE_UID),
            api_key: get(ENV_API_KEY),
        }
    }

    /// Compute the agent base address `{base_url}/bornio/v1/agents/{bridge_uid}`.
    ///
    /// Fails with `MissingConfig` naming the first absent variable.
    pub fn endpoint(&self) -> Result<String, RelayError> {
        let base_url = self
            .base_url
            .as_deref()
            .ok_or(RelayError::MissingConfig(ENV_BASE_URL))?;
        let bridge_uid = self
            .bridge_uid
            .as_deref()
            .ok_or(RelayError::MissingConfig(ENV_BRIDGE_UID))?;

        Ok(format!(
            "{}{}{}",
            base_url.trim_end_matches('/'),
            AGENTS_PATH,
            bridge_uid
        ))
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("bridge_uid", &self.bridge_uid)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
