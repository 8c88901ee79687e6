//! The qBittorrent Web UI as a swarm source and ban sink.
//!
//! The Web UI keeps two ban lists:
//!
//! - The `banned_IPs` preference: whole addresses. It is replaced on every
//!   submission, so submitting twice is harmless.
//! - The peer bans of `transfer/banPeers`: `ip:port` pairs. They are only
//!   used when `core.port_scoped_bans` is enabled.
//!
//! The session cookie may expire while the banner runs. A request answered
//! with `403 Forbidden` logs in again and is retried once.
use std::future::Future;
use std::time::Duration;

use bittorrent_ban_core::error::SourceError;
use bittorrent_ban_core::primitives::{PeerIp, PeerObservation, TorrentSummary};
use bittorrent_ban_core::source::{BanSink, SwarmSource};
use bittorrent_ban_core::store::banned::BanList;
use peer_banner_configuration::Client as ClientSettings;
use qbittorrent_api_client::connection_info::ConnectionInfo;
use qbittorrent_api_client::v2::client::{Client, Error};
use qbittorrent_api_client::v2::responses::{PeerInfo, TorrentInfo};
use tracing::{debug, warn};

pub struct WebUi {
    client: Client,
}

impl WebUi {
    /// # Errors
    ///
    /// Will return an error if the HTTP client can't be built.
    pub fn new(settings: &ClientSettings) -> Result<Self, Error> {
        let connection_info = match &settings.username {
            Some(username) => ConnectionInfo::authenticated(
                settings.url.clone(),
                username,
                settings.password.as_deref().unwrap_or_default(),
            ),
            None => ConnectionInfo::anonymous(settings.url.clone()),
        };

        let client = Client::new(connection_info, Duration::from_secs(settings.timeout))?;

        Ok(Self { client })
    }

    /// # Errors
    ///
    /// Will return an error if the Web UI refuses the credentials or can't be
    /// reached.
    pub async fn login(&self) -> Result<(), Error> {
        self.client.login().await
    }

    /// # Errors
    ///
    /// Will return an error if the Web UI can't be reached.
    pub async fn version(&self) -> Result<String, Error> {
        self.with_session(|| self.client.app_version()).await
    }

    async fn with_session<T, F, Fut>(&self, request: F) -> Result<T, Error>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        match request().await {
            Err(Error::Forbidden { url }) => {
                warn!(%url, "Web UI session rejected, logging in again");
                self.client.login().await?;
                request().await
            }
            result => result,
        }
    }
}

impl SwarmSource for WebUi {
    async fn torrents(&self) -> Result<Vec<TorrentSummary>, SourceError> {
        let torrents = self
            .with_session(|| self.client.torrents_info())
            .await
            .map_err(into_source_error)?;

        Ok(torrents.into_iter().map(torrent_summary).collect())
    }

    async fn torrent_peers(&self, info_hash: &str) -> Result<Vec<PeerObservation>, SourceError> {
        let peers = self
            .with_session(|| self.client.torrent_peers(info_hash))
            .await
            .map_err(into_source_error)?;

        Ok(peers.into_peers().map(peer_observation).collect())
    }
}

impl BanSink for WebUi {
    async fn submit(&self, bans: &BanList) -> Result<(), SourceError> {
        let addresses = bans.banned_addresses();
        let banned_ips = addresses.join("\n");

        self.with_session(|| self.client.set_banned_ips(&banned_ips))
            .await
            .map_err(into_source_error)?;

        let peers = bans.banned_peers();

        if !peers.is_empty() {
            self.with_session(|| self.client.ban_peers(&peers))
                .await
                .map_err(into_source_error)?;
        }

        debug!(addresses = addresses.len(), peers = peers.len(), "Ban list submitted");

        Ok(())
    }
}

fn into_source_error(err: Error) -> SourceError {
    match err {
        Error::AuthenticationRefused { url } => SourceError::Rejected {
            reason: format!("authentication refused by {url}"),
        },
        err => SourceError::Request { source: Box::new(err) },
    }
}

/// A negative leecher count is treated as no leechers.
fn torrent_summary(info: TorrentInfo) -> TorrentSummary {
    TorrentSummary {
        info_hash: info.hash,
        total_size: info.total_size,
        leechers: u32::try_from(info.num_leechs.max(0)).unwrap_or(u32::MAX),
    }
}

fn peer_observation(peer: PeerInfo) -> PeerObservation {
    PeerObservation {
        ip: PeerIp::new(&peer.ip),
        port: peer.port,
        progress: peer.progress,
        uploaded: peer.uploaded,
        client: non_empty(peer.client),
        peer_id_client: non_empty(peer.peer_id_client),
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}
