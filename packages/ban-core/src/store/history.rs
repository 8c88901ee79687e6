//! Records kept between cycles for the aggregate and relative checks.
use std::collections::{HashMap, HashSet};

use crate::primitives::{DurationSinceUnixEpoch, PeerKey, PeerObservation};

/// Upload sent to one address, per torrent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpUploadRecord {
    /// Last seen cumulative uploaded bytes, keyed by torrent info-hash.
    pub torrent_uploaded: HashMap<String, u64>,
}

impl IpUploadRecord {
    pub fn update(&mut self, info_hash: &str, uploaded: u64) {
        self.torrent_uploaded.insert(info_hash.to_owned(), uploaded);
    }

    #[must_use]
    pub fn uploaded(&self, info_hash: &str) -> Option<u64> {
        self.torrent_uploaded.get(info_hash).copied()
    }

    /// The upload sent since `previous` was taken, summed over all torrents.
    ///
    /// A torrent missing from `previous` counts with its full value. A counter
    /// that went backwards (the client restarted the torrent) counts as zero.
    #[must_use]
    pub fn uploaded_since(&self, previous: &IpUploadRecord) -> u64 {
        self.torrent_uploaded
            .iter()
            .map(|(info_hash, uploaded)| match previous.uploaded(info_hash) {
                Some(last) => uploaded.saturating_sub(last),
                None => *uploaded,
            })
            .fold(0, u64::saturating_add)
    }
}

/// Activity of one address in the current port check window.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerPresenceRecord {
    pub last_seen: DurationSinceUnixEpoch,

    /// Distinct ports the address connected from.
    pub ports: HashSet<u16>,

    /// Progress and upload of the last observed connection.
    pub progress: f64,
    pub uploaded: u64,
}

impl PeerPresenceRecord {
    #[must_use]
    pub fn new(last_seen: DurationSinceUnixEpoch) -> Self {
        Self {
            last_seen,
            ports: HashSet::new(),
            progress: 0.0,
            uploaded: 0,
        }
    }

    pub fn observe(&mut self, peer: &PeerObservation, now: DurationSinceUnixEpoch) {
        self.last_seen = now;
        self.ports.insert(peer.port);
        self.progress = peer.progress;
        self.uploaded = peer.uploaded;
    }
}

/// The peers of one torrent as they were in the previous cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreviousTorrentPeers {
    pub total_size: i64,
    pub peers: HashMap<PeerKey, PeerObservation>,
}

impl PreviousTorrentPeers {
    #[must_use]
    pub fn new(total_size: i64, peers: &[PeerObservation]) -> Self {
        Self {
            total_size,
            peers: peers.iter().map(|peer| (peer.key(), peer.clone())).collect(),
        }
    }
}
