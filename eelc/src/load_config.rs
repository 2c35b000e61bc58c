/// `load_config` module: reads the YAML config file into [`eelc_core::config::Config`].
///
/// This is the only place where the user's YAML is parsed. Failures are kept
/// apart so the CLI can tell the operator what to do:
/// - no file at all: [`ConfigError::Missing`], pointing at the credential setup step
/// - unreadable file: [`ConfigError::Unreadable`]
/// - YAML that does not fit the schema: [`ConfigError::Malformed`]
/// - parsed but unusable values: [`ConfigError::MissingField`] / [`ConfigError::Invalid`]
///
/// The accepted schema is documented in the README.
use eelc_core::config::Config;
use eelc_core::error::ConfigError;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{error, info};

/// Parse config YAML already read from `path`.
pub fn parse_config(content: &str, path: &Path) -> Result<Config, ConfigError> {
    let config: Config = match serde_yaml::from_str(content) {
        Ok(conf) => {
            info!(config_path = ?path, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = %e, config_path = ?path, "Failed to parse config YAML");
            return Err(ConfigError::Malformed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };
    config.validate()?;
    Ok(config)
}

/// Load and validate the config file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            error!(config_path = ?path_ref, "Config file not found");
            return Err(ConfigError::Missing {
                path: path_ref.to_path_buf(),
            });
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(ConfigError::Unreadable {
                path: path_ref.to_path_buf(),
                source: e,
            });
        }
    };

    let config = parse_config(&config_content, path_ref)?;
    config.trace_loaded();
    Ok(config)
}
