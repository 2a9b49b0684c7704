//! This module controls configuration parsing for the `plusmon` binary. Each
//! entry of `instances` is the option block of one polled server, see
//! [`crate::options`].
use std::{env, fs, path::Path};

use serde::Deserialize;
use tracing::{debug, error};

use crate::options::{ConfigNode, Settings};

/// Environment variable whose contents, when set, replace the config file.
pub const CONFIG_ENV_VAR: &str = "PLUSMON_CONFIG";

/// Errors produced by [`Config`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error for a serde [`serde_yaml`].
    #[error("Failed to deserialize yaml: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    /// Error for IO operations when reading the config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The polling interval is zero.
    #[error("interval_seconds must be greater than zero")]
    ZeroInterval,
}

fn default_interval_seconds() -> u64 {
    10
}

/// Main configuration struct for this program
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Seconds between read cycles
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    /// One option block per polled server
    #[serde(default)]
    pub instances: Vec<Instance>,
}

/// The option block of a single polled server.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Instance {
    /// Options, in the order given
    #[serde(default)]
    pub options: Vec<ConfigNode>,
}

impl Config {
    /// Whether any instance asks for debug logging.
    ///
    /// Instances whose options do not parse are ignored here; they fail later
    /// when configured.
    #[must_use]
    pub fn debug_log_level(&self) -> bool {
        self.instances.iter().any(|instance| {
            Settings::from_nodes(&instance.options).is_ok_and(|settings| settings.debug_log_level)
        })
    }
}

/// Parse `contents` as a YAML [`Config`].
///
/// # Errors
///
/// Function will error if `contents` is not a valid configuration.
pub fn parse(contents: &str) -> Result<Config, Error> {
    let config: Config = serde_yaml::from_str(contents).map_err(|err| {
        error!("Configuration validation failed: {err}");
        Error::SerdeYaml(err)
    })?;
    if config.interval_seconds == 0 {
        return Err(Error::ZeroInterval);
    }
    Ok(config)
}

/// Load the configuration from [`CONFIG_ENV_VAR`] if set, else from
/// `config_path`.
///
/// # Errors
///
/// Function will error if the configuration cannot be read or parsed.
pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Config, Error> {
    if let Ok(contents) = env::var(CONFIG_ENV_VAR) {
        debug!("Using config from env var '{CONFIG_ENV_VAR}'");
        parse(&contents)
    } else {
        load_file(config_path)
    }
}

/// Load the configuration from the file at `config_path`.
///
/// # Errors
///
/// Function will error if the file cannot be read or parsed.
pub fn load_file<P: AsRef<Path>>(config_path: P) -> Result<Config, Error> {
    let config_path = config_path.as_ref();
    debug!(
        "Attempting to open configuration file at: {}",
        config_path.display()
    );
    let contents = fs::read_to_string(config_path).map_err(|err| {
        error!(
            "Could not read config file '{}': {err}",
            config_path.display()
        );
        err
    })?;
    parse(&contents)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::options::OptionValue;

    const CONTENTS: &str = r#"
interval_seconds: 30
instances:
  - options:
      - key: StatusHost
        values: ["demo.nginx.com"]
      - key: StatusPort
        values: [80]
      - key: Upstream
        values: ["true"]
  - options:
      - key: StatusHost
        values: ["10.0.0.2"]
      - key: DebugLogLevel
        values: [true]
"#;

    #[test]
    fn config_deserializes() {
        let config = parse(CONTENTS).expect("valid config");
        assert_eq!(config.interval_seconds, 30);
        assert_eq!(config.instances.len(), 2);
        assert_eq!(
            config.instances[0].options[1],
            ConfigNode::new("StatusPort", [OptionValue::Int(80)])
        );
        assert!(config.debug_log_level());

        let settings = Settings::from_nodes(&config.instances[0].options).expect("valid options");
        assert_eq!(settings.host, "demo.nginx.com");
        assert_eq!(settings.port, 80);
        assert!(settings.groups.upstream);
    }

    #[test]
    fn defaults_apply() {
        let config = parse("instances: [{}]").expect("valid config");
        assert_eq!(config.interval_seconds, 10);
        assert_eq!(config.instances, vec![Instance::default()]);
        assert!(!config.debug_log_level());
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(matches!(
            parse("interval_seconds: 0"),
            Err(Error::ZeroInterval)
        ));
        assert!(matches!(
            parse("interval: 10"),
            Err(Error::SerdeYaml(_))
        ));
        assert!(matches!(
            parse("instances: [{options: [{key: StatusHost, vals: [x]}]}]"),
            Err(Error::SerdeYaml(_))
        ));
    }

    #[test]
    fn config_loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(CONTENTS.as_bytes()).expect("write");
        let config = load_file(file.path()).expect("valid config");
        assert_eq!(config.instances.len(), 2);

        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            load_file(dir.path().join("missing.yaml")),
            Err(Error::Io(_))
        ));
    }
}
