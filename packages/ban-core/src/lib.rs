//! The `bittorrent-ban-core` crate contains the logic that decides which
//! `BitTorrent` peers must be banned. It is independent of the torrent client
//! the peers are read from and of the way the ban list is pushed back.
//!
//! ```text
//!   Data source   |      Domain layer       |   Sink
//! ----------------------------------------------------------
//!   torrents  --> |                         |
//!   peers     --> | CycleOrchestrator       | --> ban list
//!                 |   BanEngine + Store     |
//! ```
//!
//! # Table of contents
//!
//! - [Introduction](#introduction)
//! - [Configuration](#configuration)
//! - [Rules](#rules)
//! - [State](#state)
//! - [Cycles](#cycles)
//!
//! # Introduction
//!
//! Some `BitTorrent` clients lie about their download progress in order to
//! get more upload than they deserve, or open connections from hundreds of
//! ports to multiply the upload slots they receive. This crate watches the
//! peers connected to a local torrent client, one snapshot at a time, and
//! keeps a list of banned addresses that the client must refuse.
//!
//! # Configuration
//!
//! The behavior is controlled with the `Core` settings of the
//! [`peer_banner_configuration`] crate:
//!
//! ```toml
//! [core]
//! interval = 6
//! sleep_time = 20
//! ignore_empty_peer = true
//! port_scoped_bans = false
//! max_tracked_entries = 1000000
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
//! [core.ip_upload_check]
//! enabled = true
//! interval = 300
//! increment_mb = 38000
//! per_torrent_ratio = 3.0
//!
//! [core.port_check]
//! max_ip_port_count = 20
//! interval = 60
//! ```
//!
//! # Rules
//!
//! Every peer goes through an ordered list of rules. The first rule with an
//! opinion decides:
//!
//! 1. Identity: peers without a usable address or client are ignored.
//! 2. Already banned: banned peers are not evaluated again, their ban is
//!    refreshed instead.
//! 3. Progress mismatch: the peer received much more than it claims to have.
//! 4. Relative progress mismatch: the same, measured since the previous cycle.
//! 5. Blocklist: bad client names and bad IP ranges.
//!
//! Two more checks run over the addresses collected during the cycle: the
//! upload received by one address across all torrents, and the number of
//! distinct ports one address connects from.
//!
//! Please refer to the [`heuristics`] documentation.
//!
//! # State
//!
//! All the state is kept in memory in a single [`store::Store`]. Nothing is
//! persisted, a restart starts with an empty ban list.
//!
//! # Cycles
//!
//! The [`cycle::CycleOrchestrator`] fetches a snapshot, runs the rules and
//! submits the ban list when it changed. Please refer to the [`cycle`]
//! documentation.
pub mod blocklist;
pub mod cycle;
pub mod engine;
pub mod error;
pub mod heuristics;
pub mod primitives;
pub mod source;
pub mod store;

pub mod test_helpers;

use peer_banner_clock::clock;

/// This code needs to be copied into each crate.
/// Working version, for production.
#[cfg(not(test))]
#[allow(dead_code)]
pub(crate) type CurrentClock = clock::Working;

/// Stopped version, for testing.
#[cfg(test)]
#[allow(dead_code)]
pub(crate) type CurrentClock = clock::Stopped;
