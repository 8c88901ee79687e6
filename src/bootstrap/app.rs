use clap::Parser;
use peer_banner_configuration::{Configuration, Info};
use tracing::info;

use super::config::{configuration_info, initialize_configuration, Args};
use crate::bootstrap;
use crate::error::Error;

/// It loads the configuration and initializes logging.
///
/// It also returns where the configuration was read from, so that it can be
/// reloaded while the banner runs.
///
/// # Errors
///
/// Will return an error if the configuration can't be loaded or is not
/// valid.
pub fn setup() -> Result<(Configuration, Info), Error> {
    let args = Args::parse();
    let info = configuration_info(&args);

    let configuration = initialize_configuration(&info).map_err(|source| Error::Configuration { source })?;

    bootstrap::logging::setup(&configuration.logging);

    let mut masked = configuration.clone();
    masked.mask_secrets();
    info!("Configuration:\n{}", masked.to_toml());

    Ok((configuration, info))
}
