//! Configuration for the stub server.
//!
//! Settings cover the listener and verification only; stubs are always
//! registered from test code.

use crate::error::StubError;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

/// Server-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// How long `verify` waits for late requests, in milliseconds
    #[serde(default)]
    pub timeout_ms: u64,

    /// Status used when a stub does not set one (unset or 0 falls back to 200)
    #[serde(default)]
    pub default_status: Option<u16>,

    /// Address the listener binds to (port is always random)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Log matched requests
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log unmatched requests and stubs
    #[serde(default = "default_true")]
    pub log_unmatched: bool,
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 0,
            default_status: None,
            bind_address: default_bind_address(),
            log_matches: true,
            log_unmatched: true,
        }
    }
}

impl ServerSettings {
    /// Parse settings from YAML.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let settings: Self = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), StubError> {
        if let Some(status) = self.default_status {
            if status != 0 && !(100..=999).contains(&status) {
                return Err(StubError::InvalidSettings(format!(
                    "default status {} is not a valid HTTP status",
                    status
                )));
            }
        }
        Ok(())
    }

    /// Verification grace period.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the default status; 0 clears it.
    pub fn with_default_status(mut self, status: u16) -> Self {
        self.default_status = (status != 0).then_some(status);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = ServerSettings::from_yaml("{}").unwrap();
        assert_eq!(settings, ServerSettings::default());
        assert_eq!(settings.timeout(), Duration::ZERO);
        assert!(settings.log_matches);
    }

    #[test]
    fn test_parse_settings() {
        let yaml = r#"
timeout_ms: 1500
default_status: 204
bind_address: 0.0.0.0
log_matches: false
"#;
        let settings = ServerSettings::from_yaml(yaml).unwrap();
        assert_eq!(settings.timeout(), Duration::from_millis(1500));
        assert_eq!(settings.default_status, Some(204));
        assert_eq!(settings.bind_address, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert!(!settings.log_matches);
        assert!(settings.log_unmatched);
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(ServerSettings::from_yaml("stubs: []").is_err());
    }

    #[test]
    fn test_rejects_invalid_default_status() {
        let err = ServerSettings::from_yaml("default_status: 42").unwrap_err();
        assert!(err.to_string().contains("default status 42"));

        assert!(ServerSettings::from_yaml("default_status: 1000").is_err());
    }

    #[test]
    fn test_default_status_zero_means_unset() {
        let settings = ServerSettings::default().with_default_status(0);
        assert_eq!(settings.default_status, None);
        assert!(settings.validate().is_ok());

        let settings = ServerSettings::from_yaml("default_status: 0").unwrap();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_accepts_any_representable_status() {
        let settings = ServerSettings::from_yaml("default_status: 799").unwrap();
        assert_eq!(settings.default_status, Some(799));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout_ms: 250").unwrap();

        let settings = ServerSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_builders() {
        let settings = ServerSettings::default()
            .with_timeout(Duration::from_secs(2))
            .with_default_status(404);
        assert_eq!(settings.timeout_ms, 2000);
        assert_eq!(settings.default_status, Some(404));
    }
}
