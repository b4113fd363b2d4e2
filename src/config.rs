//! Konfiguration des Dashboards
//!
//! Alle Werte kommen aus Umgebungsvariablen und haben sinnvolle Defaults,
//! damit das Dashboard lokal ohne weitere Einrichtung startet.

use std::time::Duration;
use thiserror::Error;
use url::Url;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Station-Code, mit dem Calling-Credentials angefordert werden
pub const DEFAULT_STATION_CODE: &str = "DashboardData";

/// Anzeigename des Dashboards im Meeting
pub const AGENT_DISPLAY_NAME: &str = "Dashboard";

/// Basis-URL für die Übergabe an die native App
pub const DEFAULT_HANDOFF_URL: &str = "myapp://";

/// Verzögerung zwischen Join-Start und Timer-Start
pub const TIMER_START_DELAY: Duration = Duration::from_secs(1);

const DEFAULT_API_URL: &str = "http://localhost:3000";
const DEFAULT_REALTIME_URL: &str = "http://localhost:9000";
const DEFAULT_JOIN_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL in {var}: {source}")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

// ============================================================================
// DASHBOARD CONFIG
// ============================================================================

/// Laufzeit-Konfiguration des Dashboards
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Basis-URL der Backend-API (`/acs/azureauth`, `/user`, `/stay/{id}`)
    pub api_url: Url,
    /// Basis-URL der Realtime-Datenbank
    pub realtime_url: Url,
    /// Optionaler Auth-Token für die Realtime-Datenbank
    pub realtime_auth: Option<String>,
    pub station_code: String,
    /// Ziel-URL nach Anrufende (Custom Scheme der nativen App)
    pub handoff_url: String,
    /// Wie lange der Join höchstens dauern darf, bevor abgebrochen wird
    pub join_timeout: Duration,
    /// Nach erfolgreicher User-Auflösung automatisch beitreten
    pub auto_join: bool,
}

impl DashboardConfig {
    /// Liest die Konfiguration aus den Umgebungsvariablen
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Liest die Konfiguration über eine beliebige Lookup-Funktion
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_url = match lookup("DASHBOARD_API_URL") {
            Some(value) => parse_url("DASHBOARD_API_URL", &value)?,
            None => defaults.api_url,
        };

        let realtime_url = match lookup("DASHBOARD_REALTIME_URL") {
            Some(value) => parse_url("DASHBOARD_REALTIME_URL", &value)?,
            None => defaults.realtime_url,
        };

        let join_timeout = match lookup("DASHBOARD_JOIN_TIMEOUT_SECS") {
            Some(value) => {
                let secs = value
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .ok_or(ConfigError::InvalidValue {
                        var: "DASHBOARD_JOIN_TIMEOUT_SECS",
                        value: value.clone(),
                    })?;
                Duration::from_secs(secs)
            }
            None => defaults.join_timeout,
        };

        let auto_join = match lookup("DASHBOARD_AUTO_JOIN") {
            Some(value) => parse_bool("DASHBOARD_AUTO_JOIN", &value)?,
            None => defaults.auto_join,
        };

        Ok(Self {
            api_url,
            realtime_url,
            realtime_auth: lookup("DASHBOARD_REALTIME_AUTH").filter(|v| !v.is_empty()),
            station_code: lookup("DASHBOARD_STATION_CODE")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.station_code),
            handoff_url: lookup("DASHBOARD_HANDOFF_URL")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.handoff_url),
            join_timeout,
            auto_join,
        })
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse(DEFAULT_API_URL).expect("default api url is valid"),
            realtime_url: Url::parse(DEFAULT_REALTIME_URL).expect("default realtime url is valid"),
            realtime_auth: None,
            station_code: DEFAULT_STATION_CODE.to_string(),
            handoff_url: DEFAULT_HANDOFF_URL.to_string(),
            join_timeout: Duration::from_secs(DEFAULT_JOIN_TIMEOUT_SECS),
            auto_join: true,
        }
    }
}

fn parse_url(var: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|source| ConfigError::InvalidUrl { var, source })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
        }),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = DashboardConfig::from_lookup(|_| None).unwrap();

        assert_eq!(config.station_code, "DashboardData");
        assert_eq!(config.handoff_url, "myapp://");
        assert_eq!(config.join_timeout, Duration::from_secs(30));
        assert!(config.auto_join);
        assert!(config.realtime_auth.is_none());
    }

    #[test]
    fn test_overrides_from_env() {
        let config = DashboardConfig::from_lookup(lookup_from(&[
            ("DASHBOARD_API_URL", "https://api.example.com/v1/"),
            ("DASHBOARD_STATION_CODE", "Lobby"),
            ("DASHBOARD_JOIN_TIMEOUT_SECS", "5"),
            ("DASHBOARD_AUTO_JOIN", "off"),
            ("DASHBOARD_REALTIME_AUTH", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.api_url.as_str(), "https://api.example.com/v1/");
        assert_eq!(config.station_code, "Lobby");
        assert_eq!(config.join_timeout, Duration::from_secs(5));
        assert!(!config.auto_join);
        assert_eq!(config.realtime_auth.as_deref(), Some("secret"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let result =
            DashboardConfig::from_lookup(lookup_from(&[("DASHBOARD_API_URL", "not a url")]));
        assert!(matches!(result, Err(ConfigError::InvalidUrl { .. })));

        let result =
            DashboardConfig::from_lookup(lookup_from(&[("DASHBOARD_JOIN_TIMEOUT_SECS", "0")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
