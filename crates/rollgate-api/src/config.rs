//! Server configuration from the environment.
use rollgate_workflow::{StaleApply, WorkflowSettings};
use thiserror::Error;

pub const DEFAULT_ADDR: &str = "0.0.0.0:8787";
pub const DEFAULT_AUDIT_MAX_ENTRIES: usize = 10000;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid {var}='{value}': {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// `ROLLGATE_ADDR`
    pub addr: String,
    /// `RELAY_PROXY_URL`; no refresh is sent when unset
    pub relay_proxy_url: Option<String>,
    /// `ADMIN_API_KEY`, sent as a bearer token to the relay
    pub admin_api_key: Option<String>,
    /// `ROLLGATE_STALE_APPLY`
    pub stale_apply: StaleApply,
    /// `ROLLGATE_AUDIT_MAX_ENTRIES`
    pub audit_max_entries: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            relay_proxy_url: None,
            admin_api_key: None,
            stale_apply: StaleApply::default(),
            audit_max_entries: DEFAULT_AUDIT_MAX_ENTRIES,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let stale_apply = match get("ROLLGATE_STALE_APPLY") {
            Some(raw) => raw.parse::<StaleApply>().map_err(|reason| ConfigError {
                var: "ROLLGATE_STALE_APPLY",
                value: raw.clone(),
                reason,
            })?,
            None => defaults.stale_apply,
        };

        let audit_max_entries = match get("ROLLGATE_AUDIT_MAX_ENTRIES") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError {
                        var: "ROLLGATE_AUDIT_MAX_ENTRIES",
                        value: raw,
                        reason: "expected a positive integer".to_string(),
                    })
                }
            },
            None => defaults.audit_max_entries,
        };

        let relay_proxy_url = get("RELAY_PROXY_URL");
        if let Some(url) = &relay_proxy_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError {
                    var: "RELAY_PROXY_URL",
                    value: url.clone(),
                    reason: "expected an http(s) URL".to_string(),
                });
            }
        }

        Ok(Self {
            addr: get("ROLLGATE_ADDR").unwrap_or(defaults.addr),
            relay_proxy_url,
            admin_api_key: get("ADMIN_API_KEY"),
            stale_apply,
            audit_max_entries,
        })
    }

    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            stale_apply: self.stale_apply,
        }
    }
}
