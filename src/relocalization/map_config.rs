//! Map selection for relocalization requests.
//!
//! Two input forms are accepted, both parsed once when a session starts:
//! a legacy `(label, environment)` pair, and a structured
//! `key=value;key=value` string. The label `any` leaves map selection to
//! the service.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapSelection {
    /// Let the service pick any map near the GPS fix.
    Any,
    Label(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseEnvironment {
    Production,
    Staging,
    Development,
}

impl ReleaseEnvironment {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" | "dev" => Ok(Self::Development),
            _ => Err(ConfigError::UnknownEnvironment(s.to_string())),
        }
    }
}

impl fmt::Display for ReleaseEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Development => "development",
        };
        f.write_str(name)
    }
}

/// Parsed map configuration forwarded with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapConfiguration {
    pub selection: MapSelection,
    pub environment: ReleaseEnvironment,
    /// Structured keys not interpreted here, passed through to the service.
    pub parameters: BTreeMap<String, String>,
}

impl MapConfiguration {
    /// Parse the legacy `(label, environment)` pair.
    pub fn parse_legacy(label: &str, environment: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            selection: parse_label(label)?,
            environment: ReleaseEnvironment::parse(environment)?,
            parameters: BTreeMap::new(),
        })
    }

    /// Parse `key=value;key=value`.
    ///
    /// `map` (or `map_id`) is required; `env`/`environment` defaults to
    /// production. Empty segments are ignored; repeated keys are an error.
    pub fn parse_structured(config: &str) -> Result<Self, ConfigError> {
        let mut selection = None;
        let mut environment = None;
        let mut parameters = BTreeMap::new();

        for segment in config.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let Some((key, value)) = segment.split_once('=') else {
                return Err(ConfigError::MalformedMapConfig(format!(
                    "expected key=value, got {segment:?}"
                )));
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            if key.is_empty() || value.is_empty() {
                return Err(ConfigError::MalformedMapConfig(format!(
                    "empty key or value in {segment:?}"
                )));
            }

            let duplicate = match key.as_str() {
                "map" | "map_id" => selection.replace(parse_label(value)?).is_some(),
                "env" | "environment" => environment
                    .replace(ReleaseEnvironment::parse(value)?)
                    .is_some(),
                _ => parameters.insert(key.clone(), value.to_string()).is_some(),
            };
            if duplicate {
                return Err(ConfigError::MalformedMapConfig(format!("duplicate key {key:?}")));
            }
        }

        let selection = selection
            .ok_or_else(|| ConfigError::MalformedMapConfig("missing `map` key".into()))?;
        Ok(Self {
            selection,
            environment: environment.unwrap_or(ReleaseEnvironment::Production),
            parameters,
        })
    }
}

fn parse_label(label: &str) -> Result<MapSelection, ConfigError> {
    let label = label.trim();
    if label.eq_ignore_ascii_case("any") {
        return Ok(MapSelection::Any);
    }
    let valid = !label.is_empty()
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(ConfigError::MalformedMapLabel(label.to_string()));
    }
    Ok(MapSelection::Label(label.to_string()))
}

/// Map configuration as written in the controller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapSpec {
    Legacy { label: String, environment: String },
    Structured(String),
}

impl MapSpec {
    pub fn resolve(&self) -> Result<MapConfiguration, ConfigError> {
        match self {
            Self::Legacy { label, environment } => MapConfiguration::parse_legacy(label, environment),
            Self::Structured(config) => MapConfiguration::parse_structured(config),
        }
    }
}

impl Default for MapSpec {
    fn default() -> Self {
        Self::Legacy {
            label: "any".into(),
            environment: "production".into(),
        }
    }
}
