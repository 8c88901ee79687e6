//! Configuration data structures for the peer banner.
//!
//! This module contains the configuration data structures for the peer
//! banner. The configuration is loaded from a [TOML](https://toml.io/en/) file
//! `config.toml` in the working directory or from an environment variable.
//! Any value can be overridden afterwards with an environment variable.
//!
//! # Sections
//!
//! - `[logging]`: the logging threshold.
//! - `[client]`: where the qBittorrent Web UI lives and how to log in.
//! - `[core]`: the cycle timing and the thresholds for every ban rule.
//! - `[blocklist]`: client name patterns, IP ranges and the IP filter file.
//!
//! # Loading
//!
//! The configuration is built by merging, in order:
//!
//! 1. The default values.
//! 2. The TOML contents from the `PEER_BANNER_CONFIG_TOML` environment
//!    variable or, when it is not set, the TOML file whose path is in
//!    `PEER_BANNER_CONFIG_TOML_PATH` (`./config.toml` by default).
//! 3. Environment variables prefixed with `PEER_BANNER_CONFIG_OVERRIDE_`,
//!    using a double underscore to split sections. For example:
//!    `PEER_BANNER_CONFIG_OVERRIDE_CORE__BAN_POLICY__BAN_TIME=3600`.
//!
//! The result is validated on every load. An invalid configuration is fatal
//! at startup. The banner loads the configuration again before every cycle;
//! an invalid one is then ignored and the previous one is kept.
//!
//! # Sample configuration
//!
//! ```toml
//! [logging]
//! threshold = "info"
//!
//! [client]
//! url = "http://127.0.0.1:8080/"
//! username = "admin"
//! password = "adminadmin"
//!
//! [core]
//! interval = 6
//! sleep_time = 20
//! ignore_empty_peer = true
//!
//! [core.ban_policy]
//! ban_time = 86400
//! clean_interval = 3600
//!
//! [core.progress_check]
//! enabled = true
//! start_mb = 20
//! start_percent = 2.0
//! anti_error_ratio = 3.0
//!
//! [core.port_check]
//! max_ip_port_count = 20
//! interval = 60
//!
//! [blocklist]
//! clients = ["Xunlei", "^7\\."]
//! ips = ["1.2.3.0/24"]
//! ```
pub mod blocklist;
pub mod client;
pub mod logging;
pub mod policy;

use std::env;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

pub use self::blocklist::Blocklist;
pub use self::client::Client;
pub use self::logging::{Logging, Threshold};
pub use self::policy::{BanPolicy, Core, IpUploadCheck, PortCheck, ProgressCheck};

/// The whole configuration in toml format.
pub const ENV_VAR_CONFIG_TOML: &str = "PEER_BANNER_CONFIG_TOML";

/// The `config.toml` file location.
pub const ENV_VAR_CONFIG_TOML_PATH: &str = "PEER_BANNER_CONFIG_TOML_PATH";

/// Prefix for env vars that overwrite configuration options.
pub const CONFIG_OVERRIDE_PREFIX: &str = "PEER_BANNER_CONFIG_OVERRIDE_";

/// Path separator in env var names for nested values in configuration.
pub const CONFIG_OVERRIDE_SEPARATOR: &str = "__";

/// The default `config.toml` file location.
pub const DEFAULT_CONFIG_TOML_PATH: &str = "./config.toml";

/// Information required for loading config.
#[derive(Debug, Default, Clone)]
pub struct Info {
    config_toml: Option<String>,
    config_toml_path: String,
}

impl Info {
    /// Build configuration Info.
    #[must_use]
    pub fn new(default_config_toml_path: String) -> Self {
        let config_toml = env::var(ENV_VAR_CONFIG_TOML).ok();

        let config_toml_path = env::var(ENV_VAR_CONFIG_TOML_PATH).unwrap_or(default_config_toml_path);

        Self {
            config_toml,
            config_toml_path,
        }
    }

    /// It replaces the TOML file path, for example with the one given on the
    /// command line.
    #[must_use]
    pub fn with_config_toml_path(mut self, config_toml_path: String) -> Self {
        self.config_toml_path = config_toml_path;
        self
    }

    /// Path of the TOML file that will be read when no inline TOML is given.
    #[must_use]
    pub fn config_toml_path(&self) -> &str {
        &self.config_toml_path
    }
}

/// Errors that can occur when loading the configuration.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// Unable to merge or deserialize the configuration sources.
    #[error("Failed processing the configuration: {source}")]
    ConfigError { source: Box<figment::Error> },

    /// A value was read successfully but it is not acceptable.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigError { source: Box::new(err) }
    }
}

/// Core configuration for the peer banner.
#[derive(Serialize, Deserialize, PartialEq, Debug, Default, Clone)]
pub struct Configuration {
    /// Logging configuration.
    #[serde(default)]
    pub logging: Logging,

    /// Connection to the qBittorrent Web UI.
    #[serde(default)]
    pub client: Client,

    /// Cycle timing and ban rule thresholds.
    #[serde(default)]
    pub core: Core,

    /// Textual blocklist rules. They are compiled once at startup.
    #[serde(default)]
    pub blocklist: Blocklist,
}

impl Configuration {
    /// Loads the configuration from the `Info` struct.
    ///
    /// # Errors
    ///
    /// Will return an error if a mandatory configuration option is missing,
    /// the sources can't be parsed or a value does not pass validation.
    pub fn load(info: &Info) -> Result<Configuration, Error> {
        let figment = if let Some(config_toml) = &info.config_toml {
            tracing::debug!("Loading extra configuration from environment variable:\n {config_toml}");
            Figment::from(Serialized::defaults(Configuration::default()))
                .merge(Toml::string(config_toml))
                .merge(Env::prefixed(CONFIG_OVERRIDE_PREFIX).split(CONFIG_OVERRIDE_SEPARATOR))
        } else {
            tracing::debug!("Loading extra configuration from file: `{}` ...", info.config_toml_path);
            Figment::from(Serialized::defaults(Configuration::default()))
                .merge(Toml::file(&info.config_toml_path))
                .merge(Env::prefixed(CONFIG_OVERRIDE_PREFIX).split(CONFIG_OVERRIDE_SEPARATOR))
        };

        let config: Configuration = figment.extract()?;

        config.validate()?;

        Ok(config)
    }

    /// Checks every threshold the ban rules depend on.
    ///
    /// # Errors
    ///
    /// Will return `Error::InvalidValue` naming the first offending option.
    pub fn validate(&self) -> Result<(), Error> {
        self.client.validate()?;
        self.core.validate()
    }

    /// Replaces the Web UI password so that the configuration can be logged.
    pub fn mask_secrets(&mut self) {
        self.client.mask_secrets();
    }

    /// Encodes the configuration to TOML.
    ///
    /// # Panics
    ///
    /// Will panic if it can't be converted to TOML.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string(self).expect("Could not encode TOML value")
    }
}
