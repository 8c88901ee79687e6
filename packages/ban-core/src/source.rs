//! The boundary with the torrent client.
//!
//! The core does not talk to any client directly. It reads the swarm from a
//! [`SwarmSource`] and pushes the ban list to a [`BanSink`]. Both are usually
//! the same client. The `peer-banner` binary implements both on top of the
//! qBittorrent Web UI API.
use std::future::Future;

use crate::error::SourceError;
use crate::primitives::{PeerObservation, TorrentSummary};
use crate::store::banned::BanList;

/// Where the swarm snapshots come from.
pub trait SwarmSource: Send + Sync {
    /// All the torrents of the client.
    ///
    /// # Errors
    ///
    /// Will return a `SourceError` if the list can't be fetched. The cycle is
    /// abandoned.
    fn torrents(&self) -> impl Future<Output = Result<Vec<TorrentSummary>, SourceError>> + Send;

    /// The peers connected to one torrent.
    ///
    /// # Errors
    ///
    /// Will return a `SourceError` if the peers can't be fetched. Only the
    /// torrent is skipped.
    fn torrent_peers(&self, info_hash: &str) -> impl Future<Output = Result<Vec<PeerObservation>, SourceError>> + Send;
}

/// Where the ban list goes.
pub trait BanSink: Send + Sync {
    /// It replaces the ban list of the client with `bans`.
    ///
    /// Submitting the same list twice must leave the client as after the
    /// first submission.
    ///
    /// # Errors
    ///
    /// Will return a `SourceError` if the list was not accepted. It is
    /// submitted again at the end of the next cycle.
    fn submit(&self, bans: &BanList) -> impl Future<Output = Result<(), SourceError>> + Send;
}
