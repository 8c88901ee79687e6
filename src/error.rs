//! Startup errors.
//!
//! Only the startup can fail. Once the cycles are running, failures are
//! logged and the next cycle tries again.
use bittorrent_ban_core::error::BlocklistError;
use qbittorrent_api_client::v2::client;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {source}")]
    Configuration { source: peer_banner_configuration::Error },

    #[error("Invalid blocklist: {source}")]
    Blocklist { source: BlocklistError },

    #[error("Unable to use the qBittorrent Web UI: {source}")]
    WebUi { source: client::Error },
}
