//! Command line arguments and configuration loading.
use std::path::PathBuf;

use clap::Parser;
use peer_banner_configuration::{Configuration, Info, DEFAULT_CONFIG_TOML_PATH};

/// Bans misbehaving peers of a qBittorrent client.
#[derive(Parser, Debug, Clone)]
#[command(name = "peer-banner", version, about, long_about = None)]
pub struct Args {
    /// Path of the TOML configuration file.
    ///
    /// It takes precedence over `PEER_BANNER_CONFIG_TOML_PATH`. Inline TOML in
    /// `PEER_BANNER_CONFIG_TOML` takes precedence over both.
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Where the configuration is read from, at startup and on every reload.
#[must_use]
pub fn configuration_info(args: &Args) -> Info {
    let info = Info::new(DEFAULT_CONFIG_TOML_PATH.to_string());

    match &args.config {
        Some(path) => info.with_config_toml_path(path.display().to_string()),
        None => info,
    }
}

/// It loads the configuration from the sources described in
/// [`peer_banner_configuration`].
///
/// # Errors
///
/// Will return an error if the configuration can't be loaded or is not valid.
pub fn initialize_configuration(info: &Info) -> Result<Configuration, peer_banner_configuration::Error> {
    Configuration::load(info)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use crate::bootstrap::config::{configuration_info, Args};

    #[test]
    fn it_should_accept_the_config_path_as_a_long_or_short_option() {
        let long = Args::try_parse_from(["peer-banner", "--config", "banner.toml"]).unwrap();
        let short = Args::try_parse_from(["peer-banner", "-c", "banner.toml"]).unwrap();

        assert_eq!(long.config, short.config);
        assert_eq!(long.config.unwrap().to_str(), Some("banner.toml"));
    }

    #[test]
    fn the_config_path_should_be_optional() {
        let args = Args::try_parse_from(["peer-banner"]).unwrap();

        assert!(args.config.is_none());
    }

    #[test]
    fn the_config_path_given_on_the_command_line_should_be_the_one_read() {
        figment::Jail::expect_with(|_jail| {
            let args = Args::try_parse_from(["peer-banner", "--config", "banner.toml"]).unwrap();

            assert_eq!(configuration_info(&args).config_toml_path(), "banner.toml");

            Ok(())
        });
    }
}
