//! Primitive types shared by the rules, the store and the data sources.
//!
//! Peers and torrents are ephemeral: they are built from every new snapshot
//! and never stored as they are, except for the previous cycle peer list
//! kept by the [`store`](crate::store).
use std::fmt;
use std::net::IpAddr;

use derive_more::Display;
use serde::Serialize;

pub use peer_banner_clock::DurationSinceUnixEpoch;

/// Bytes in a mebibyte. Every "MB" threshold in the configuration is in
/// mebibytes.
pub const MIB: u64 = 1024 * 1024;

/// The address of a peer as reported by the torrent client.
///
/// It's normalized to lower case so that the same IPv6 address is always
/// the same key. The address is not required to be a valid IP: the client
/// may report anything, and the rules decide what to do with it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize)]
pub struct PeerIp(String);

impl PeerIp {
    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The address as an IP, when it is one.
    #[must_use]
    pub fn to_ip_addr(&self) -> Option<IpAddr> {
        self.0.parse().ok()
    }
}

impl AsRef<str> for PeerIp {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerIp {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<IpAddr> for PeerIp {
    fn from(ip: IpAddr) -> Self {
        Self::new(&ip.to_string())
    }
}

/// Which ports of an address a ban applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum PortScope {
    Specific(u16),
    AllPorts,
}

impl fmt::Display for PortScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortScope::Specific(port) => write!(f, "{port}"),
            PortScope::AllPorts => write!(f, "*"),
        }
    }
}

/// Identifies one connection: an address and the port it connects from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("{ip}:{port}")]
pub struct PeerKey {
    pub ip: PeerIp,
    pub port: u16,
}

/// The state of a peer in a torrent at the time of the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerObservation {
    /// The peer address.
    pub ip: PeerIp,

    /// The port the peer connects from.
    pub port: u16,

    /// Download progress reported by the peer, from `0.0` to `1.0`.
    pub progress: f64,

    /// Bytes the local client has uploaded to this peer for this torrent.
    pub uploaded: u64,

    /// The client name the peer announced in the extended handshake.
    pub client: Option<String>,

    /// The client decoded from the peer id.
    pub peer_id_client: Option<String>,
}

impl PeerObservation {
    /// Whether the peer reported any client name or peer id client.
    #[must_use]
    pub fn has_client(&self) -> bool {
        self.client_names().next().is_some()
    }

    /// The non-empty client names of the peer.
    pub fn client_names(&self) -> impl Iterator<Item = &str> {
        [self.client.as_deref(), self.peer_id_client.as_deref()]
            .into_iter()
            .flatten()
            .filter(|name| !name.is_empty())
    }

    #[must_use]
    pub fn key(&self) -> PeerKey {
        PeerKey {
            ip: self.ip.clone(),
            port: self.port,
        }
    }
}

/// The data the source returns for every torrent before its peers are
/// fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentSummary {
    /// Torrent info-hash as reported by the client. An empty hash means the
    /// client did not report a usable identity.
    pub info_hash: String,

    /// Total size in bytes. A non-positive size is valid; numeric rules never
    /// fire for it.
    pub total_size: i64,

    /// Number of peers that have not completed the download.
    pub leechers: u32,
}

/// One torrent and its connected peers at the time of the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentSnapshot {
    pub info_hash: String,
    pub total_size: i64,
    pub leechers: u32,
    pub peers: Vec<PeerObservation>,
}

impl TorrentSnapshot {
    #[must_use]
    pub fn new(summary: TorrentSummary, peers: Vec<PeerObservation>) -> Self {
        Self {
            info_hash: summary.info_hash,
            total_size: summary.total_size,
            leechers: summary.leechers,
            peers,
        }
    }
}
