//! Per-instance options.
//!
//! An instance is configured by an ordered list of [`ConfigNode`] values, each
//! a key followed by one or more values, in the manner of a collectd
//! `<Module>` block. [`Settings::from_nodes`] interprets that list. Unknown
//! keys are ignored and a key given more than once keeps its last value, except
//! for `Dimension` and `Dimensions` which accumulate.

use std::{fmt, num::NonZeroU32, time::Duration};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    client::{Endpoint, transport::Credentials, transport::DEFAULT_TIMEOUT},
    dimension::DimensionSet,
    emitter::Groups,
};

/// Status host used when `StatusHost` is absent.
pub const DEFAULT_STATUS_HOST: &str = "localhost";
/// Status port used when `StatusPort` is absent.
pub const DEFAULT_STATUS_PORT: u16 = 8080;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
/// Errors produced by [`Settings::from_nodes`]
pub enum Error {
    /// `APIVersion` is not a positive integer.
    #[error("APIVersion must be a positive integer, got {0}")]
    ApiVersion(String),
    /// `StatusPort` is not a valid TCP port.
    #[error("StatusPort must be an integer in 1..=65535, got {0}")]
    StatusPort(String),
    /// `Timeout` is not a positive number of seconds.
    #[error("Timeout must be a positive number of seconds, got {0}")]
    Timeout(String),
    /// A boolean option has a value other than true or false.
    #[error("Unable to cast value ({value}) of {key} to boolean")]
    Bool {
        /// Option key
        key: String,
        /// Offending value
        value: String,
    },
    /// A recognised option was given without a value.
    #[error("Option {0} requires a value")]
    MissingValue(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
/// A single option value.
pub enum OptionValue {
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            OptionValue::Bool(b) => write!(f, "{b}"),
            OptionValue::Int(i) => write!(f, "{i}"),
            OptionValue::Float(x) => write!(f, "{x}"),
            OptionValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::String(value.to_string())
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
/// One configuration key and its values.
pub struct ConfigNode {
    /// Option name, e.g. `StatusHost`
    pub key: String,
    /// Option values, usually exactly one
    #[serde(default)]
    pub values: Vec<OptionValue>,
}

impl ConfigNode {
    /// Create a new [`ConfigNode`]
    #[must_use]
    pub fn new<K, I, V>(key: K, values: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<OptionValue>,
    {
        Self {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    fn first(&self) -> Result<&OptionValue, Error> {
        self.values
            .first()
            .ok_or_else(|| Error::MissingValue(self.key.clone()))
    }

    fn flag(&self) -> Result<bool, Error> {
        let value = self.first()?;
        match value {
            OptionValue::Bool(b) => Ok(*b),
            other => {
                let text = other.to_string();
                match text.trim().to_ascii_lowercase().as_str() {
                    "true" => Ok(true),
                    "false" => Ok(false),
                    _ => Err(Error::Bool {
                        key: self.key.clone(),
                        value: text,
                    }),
                }
            }
        }
    }
}

/// Typed settings for one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Status host name or address
    pub host: String,
    /// Status port
    pub port: u16,
    /// Basic auth user name
    pub username: Option<String>,
    /// Basic auth password
    pub password: Option<String>,
    /// Fixed API version, `None` to negotiate
    pub api_version: Option<NonZeroU32>,
    /// Override of the API root path
    pub api_base_path: Option<String>,
    /// Operator supplied global dimensions
    pub dimensions: DimensionSet,
    /// Whether this instance asked for debug logging
    pub debug_log_level: bool,
    /// Per-request timeout
    pub timeout: Duration,
    /// Enabled opt-in metric groups
    pub groups: Groups,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: DEFAULT_STATUS_HOST.to_string(),
            port: DEFAULT_STATUS_PORT,
            username: None,
            password: None,
            api_version: None,
            api_base_path: None,
            dimensions: DimensionSet::new(),
            debug_log_level: false,
            timeout: DEFAULT_TIMEOUT,
            groups: Groups::default(),
        }
    }
}

impl Settings {
    /// Interpret an ordered list of option nodes.
    ///
    /// # Errors
    ///
    /// Function will error if a recognised option has a malformed value.
    pub fn from_nodes(nodes: &[ConfigNode]) -> Result<Self, Error> {
        let mut settings = Settings::default();
        for node in nodes {
            match node.key.as_str() {
                "StatusHost" => settings.host = node.first()?.to_string(),
                "StatusPort" => settings.port = parse_port(node.first()?)?,
                "Username" => settings.username = Some(node.first()?.to_string()),
                "Password" => settings.password = Some(node.first()?.to_string()),
                "APIVersion" => settings.api_version = Some(parse_api_version(node.first()?)?),
                "APIBasePath" => settings.api_base_path = Some(node.first()?.to_string()),
                "Dimension" => {
                    let [key, value] = node.values.as_slice() else {
                        warn!(
                            "Skipping Dimension with {} value(s), expected a key and a value",
                            node.values.len()
                        );
                        continue;
                    };
                    settings
                        .dimensions
                        .insert(key.to_string(), value.to_string());
                }
                "Dimensions" => {
                    let pairs = parse_dimensions(&node.first()?.to_string());
                    settings.dimensions.merge(&pairs);
                }
                "DebugLogLevel" => settings.debug_log_level = node.flag()?,
                "Timeout" => settings.timeout = parse_timeout(node.first()?)?,
                "ServerZone" => settings.groups.server_zone = node.flag()?,
                "MemoryZone" => settings.groups.memory_zone = node.flag()?,
                "Upstream" => settings.groups.upstream = node.flag()?,
                "Cache" => settings.groups.cache = node.flag()?,
                "StreamServerZone" => settings.groups.stream_server_zone = node.flag()?,
                "StreamUpstream" => settings.groups.stream_upstream = node.flag()?,
                "Processes" => settings.groups.processes = node.flag()?,
                unknown => debug!("Ignoring unknown option {unknown}"),
            }
        }
        Ok(settings)
    }

    /// The endpoint described by these settings.
    ///
    /// Credentials are sent only when a user name is configured.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
            credentials: self.username.as_ref().map(|username| Credentials {
                username: username.clone(),
                password: self.password.clone(),
            }),
            api_version: self.api_version,
            api_base_path: self.api_base_path.clone(),
        }
    }
}

fn parse_port(value: &OptionValue) -> Result<u16, Error> {
    let port = match value {
        OptionValue::Int(i) => u16::try_from(*i).ok(),
        OptionValue::String(s) => s.trim().parse::<u16>().ok(),
        OptionValue::Bool(_) | OptionValue::Float(_) => None,
    };
    match port {
        Some(port) if port != 0 => Ok(port),
        _ => Err(Error::StatusPort(value.to_string())),
    }
}

fn parse_api_version(value: &OptionValue) -> Result<NonZeroU32, Error> {
    let version = match value {
        OptionValue::Int(i) => u32::try_from(*i).ok(),
        OptionValue::String(s) => s.trim().parse::<u32>().ok(),
        OptionValue::Bool(_) | OptionValue::Float(_) => None,
    };
    version
        .and_then(NonZeroU32::new)
        .ok_or_else(|| Error::ApiVersion(value.to_string()))
}

fn parse_timeout(value: &OptionValue) -> Result<Duration, Error> {
    let seconds = match value {
        OptionValue::Int(i) => Some(*i as f64),
        OptionValue::Float(x) => Some(*x),
        OptionValue::String(s) => s.trim().parse::<f64>().ok(),
        OptionValue::Bool(_) => None,
    };
    seconds
        .filter(|s| *s > 0.0)
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .ok_or_else(|| Error::Timeout(value.to_string()))
}

/// Parse the bulk `key=value,key=value` form of global dimensions.
///
/// Pairs without `=` or with an empty key are skipped with a warning.
#[must_use]
pub fn parse_dimensions(raw: &str) -> DimensionSet {
    let mut dimensions = DimensionSet::new();
    for pair in raw.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                dimensions.insert(key.trim(), value.trim());
            }
            _ => warn!("Skipping malformed dimension {pair}"),
        }
    }
    dimensions
}
