//! Response bodies of the Web UI API.
use std::collections::HashMap;

use serde::Deserialize;

/// An item of `/api/v2/torrents/info`. Only the fields the banner needs are
/// decoded.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TorrentInfo {
    #[serde(default)]
    pub hash: String,

    /// Bytes selected for download.
    #[serde(default)]
    pub total_size: i64,

    /// Leechers connected to.
    #[serde(default)]
    pub num_leechs: i64,
}

/// The body of `/api/v2/sync/torrentPeers`.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TorrentPeers {
    #[serde(default)]
    pub full_update: bool,

    /// Response id, for incremental updates.
    #[serde(default)]
    pub rid: i64,

    /// Peers keyed by `address:port`. Missing or `null` when the torrent has
    /// no peers.
    #[serde(default)]
    pub peers: Option<HashMap<String, PeerInfo>>,
}

impl TorrentPeers {
    pub fn into_peers(self) -> impl Iterator<Item = PeerInfo> {
        self.peers.unwrap_or_default().into_values()
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PeerInfo {
    #[serde(default)]
    pub ip: String,

    #[serde(default)]
    pub port: u16,

    /// From `0.0` to `1.0`.
    #[serde(default)]
    pub progress: f64,

    /// Bytes uploaded to the peer.
    #[serde(default)]
    pub uploaded: u64,

    #[serde(default)]
    pub client: String,

    #[serde(default)]
    pub peer_id_client: String,
}
