//! The ban engine.
//!
//! [`BanEngine`] applies the [`heuristics`](crate::heuristics) to the
//! snapshots it receives and keeps the results in its [`Store`]. It does no
//! I/O and it does not read the clock: the caller passes the current time.
//!
//! A cycle is:
//!
//! 1. [`BanEngine::begin_cycle`]: expired bans are removed and the peers of
//!    the previous cycle become the reference for the relative rule.
//! 2. [`BanEngine::check_torrent`] for every torrent of the snapshot, then
//!    [`BanEngine::evaluate_torrent`] for the torrents that are worth it.
//! 3. [`BanEngine::finish_cycle`]: aggregate checks, capacity enforcement
//!    and the cycle report.
//!
//! [`BanEngine::run`] does the three steps for snapshots that are already
//! in memory.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use peer_banner_clock::conv::format_timestamp;
use peer_banner_configuration::Core;
use serde::Serialize;
use tracing::{debug, info};

use crate::blocklist::Blocklist;
use crate::heuristics::{self, aggregate, BanReason, PeerContext, Verdict};
use crate::primitives::{DurationSinceUnixEpoch, PeerIp, PeerObservation, PortScope, TorrentSnapshot, TorrentSummary};
use crate::store::banned::BanList;
use crate::store::Store;

/// Diagnostic counters of one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Bans removed because they were not seen for the whole ban time.
    pub expired_bans: usize,

    /// Torrents skipped because they had no info-hash.
    pub empty_hash_torrents: usize,
    /// Torrents skipped because nobody was downloading them.
    pub no_leecher_torrents: usize,
    /// Torrents skipped because their peers could not be fetched.
    pub unavailable_torrents: usize,
    pub evaluated_torrents: usize,

    pub rejected_peers: usize,
    pub already_banned_peers: usize,
    pub banned_peers: usize,
    pub clean_peers: usize,

    /// Addresses banned by the aggregate upload check.
    pub ip_upload_bans: usize,
    /// Addresses banned by the aggregate port check.
    pub port_bans: usize,

    /// History entries evicted because the maps were over capacity.
    pub evicted_entries: usize,

    /// Bans in the list at the end of the cycle.
    pub total_bans: usize,

    /// Whether the ban list was submitted at the end of the cycle.
    pub submitted: bool,
}

impl CycleReport {
    /// Whether the ban list changed during the cycle.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.expired_bans > 0 || self.banned_peers > 0 || self.ip_upload_bans > 0 || self.port_bans > 0
    }
}

/// What to do with a torrent of the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrentCheck {
    /// Its peers must be evaluated.
    Ready,
    EmptyHash,
    NoLeechers,
}

pub struct BanEngine {
    /// The core configuration.
    config: Core,

    store: Store,

    /// Bad clients and addresses.
    blocklist: Arc<dyn Blocklist>,

    /// Sizes of the torrents of the current snapshot, for the aggregate
    /// upload check.
    torrent_sizes: HashMap<String, i64>,

    report: CycleReport,
}

impl BanEngine {
    #[must_use]
    pub fn new(config: &Core, blocklist: &Arc<dyn Blocklist>) -> Self {
        Self {
            config: config.clone(),
            store: Store::new(config),
            blocklist: blocklist.clone(),
            torrent_sizes: HashMap::new(),
            report: CycleReport::default(),
        }
    }

    /// It replaces the configuration and the blocklist between two cycles.
    /// The bans and the history of the checks that are still active are
    /// kept.
    pub fn reconfigure(&mut self, config: &Core, blocklist: &Arc<dyn Blocklist>) {
        self.store.reconfigure(config);
        self.config = config.clone();
        self.blocklist = blocklist.clone();
    }

    /// It starts a new cycle.
    pub fn begin_cycle(&mut self, now: DurationSinceUnixEpoch) {
        self.report = CycleReport {
            expired_bans: self.store.sweep_expired_bans(now),
            ..CycleReport::default()
        };
        self.torrent_sizes.clear();
        self.store.rotate_torrent_peers();
    }

    /// It decides whether the peers of a torrent must be fetched and
    /// evaluated.
    pub fn check_torrent(&mut self, summary: &TorrentSummary) -> TorrentCheck {
        if summary.info_hash.is_empty() {
            self.report.empty_hash_torrents += 1;
            return TorrentCheck::EmptyHash;
        }

        self.torrent_sizes.insert(summary.info_hash.clone(), summary.total_size);

        if summary.leechers == 0 {
            self.report.no_leecher_torrents += 1;
            return TorrentCheck::NoLeechers;
        }

        TorrentCheck::Ready
    }

    /// It counts a torrent whose peers could not be fetched.
    pub fn skip_unavailable_torrent(&mut self, summary: &TorrentSummary) {
        debug!(info_hash = %summary.info_hash, "torrent peers unavailable, torrent skipped");
        self.report.unavailable_torrents += 1;
    }

    /// It evaluates every peer of a torrent and keeps the peers for the
    /// relative rule of the next cycle.
    pub fn evaluate_torrent(&mut self, torrent: &TorrentSnapshot, now: DurationSinceUnixEpoch) {
        self.report.evaluated_torrents += 1;

        for peer in &torrent.peers {
            self.check_peer(&torrent.info_hash, torrent.total_size, peer, now);
        }

        self.store
            .record_torrent_peers(&torrent.info_hash, torrent.total_size, &torrent.peers);
    }

    /// It evaluates one peer and applies the verdict.
    ///
    /// - A banned peer gets its ban refreshed.
    /// - An offending peer is banned.
    /// - A clean peer is recorded for the aggregate checks.
    pub fn check_peer(
        &mut self,
        info_hash: &str,
        total_size: i64,
        peer: &PeerObservation,
        now: DurationSinceUnixEpoch,
    ) -> Verdict {
        let verdict = {
            let previous = if self.config.relative_progress_check.enabled {
                self.store.previous_peer(info_hash, &peer.key())
            } else {
                None
            };

            heuristics::evaluate_peer(&PeerContext {
                peer,
                previous,
                total_size,
                config: &self.config,
                blocklist: self.blocklist.as_ref(),
                bans: self.store.ban_list(),
            })
        };

        match verdict {
            Verdict::NoMatch => {
                self.report.clean_peers += 1;
                self.store.record_ip_upload(&peer.ip, info_hash, peer.uploaded);
                self.store.record_presence(peer, now);
            }
            Verdict::Reject(reason) => {
                self.report.rejected_peers += 1;
                debug!(ip = %peer.ip, port = peer.port, %reason, "peer ignored");
            }
            Verdict::AlreadyBanned => {
                self.report.already_banned_peers += 1;
                self.store.is_banned(&peer.ip, PortScope::Specific(peer.port), Some(now));
                debug!(ip = %peer.ip, port = peer.port, "peer already banned");
            }
            Verdict::Ban(reason) => {
                self.report.banned_peers += 1;
                let scope = reason.scope(peer.port);
                self.store.ban(&peer.ip, scope, now);
                let expires = now.saturating_add(Duration::from_secs(self.config.ban_policy.ban_time));
                info!(
                    ip = %peer.ip,
                    port = peer.port,
                    %scope,
                    client = peer.client.as_deref().unwrap_or_default(),
                    peer_id_client = peer.peer_id_client.as_deref().unwrap_or_default(),
                    progress = peer.progress,
                    uploaded = peer.uploaded,
                    info_hash,
                    %reason,
                    expires = %format_timestamp(expires),
                    "peer banned"
                );
            }
        }

        verdict
    }

    /// It runs the aggregate checks and closes the cycle.
    pub fn finish_cycle(&mut self, now: DurationSinceUnixEpoch) -> CycleReport {
        self.report.ip_upload_bans = self.sweep_ip_uploads(now);
        self.report.port_bans = self.sweep_ports(now);
        self.report.evicted_entries = self.store.enforce_capacity();
        self.report.total_bans = self.store.ban_list().len();

        self.report
    }

    /// It runs a whole cycle over snapshots that are already in memory.
    pub fn run(&mut self, torrents: &[TorrentSnapshot], now: DurationSinceUnixEpoch) -> CycleReport {
        self.begin_cycle(now);

        for torrent in torrents {
            let summary = TorrentSummary {
                info_hash: torrent.info_hash.clone(),
                total_size: torrent.total_size,
                leechers: torrent.leechers,
            };

            if self.check_torrent(&summary) == TorrentCheck::Ready {
                self.evaluate_torrent(torrent, now);
            }
        }

        self.finish_cycle(now)
    }

    #[must_use]
    pub fn ban_list(&self) -> &BanList {
        self.store.ban_list()
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The aggregate upload check. It runs once per window and only when
    /// there is a previous window to compare with.
    fn sweep_ip_uploads(&mut self, now: DurationSinceUnixEpoch) -> usize {
        if !self.store.ip_sweep_due(now) {
            return 0;
        }

        let offenders: Vec<(PeerIp, BanReason)> = {
            let uploads = self.store.ip_uploads();
            let bans = self.store.ban_list();

            uploads
                .current
                .iter()
                .filter(|(ip, _)| !bans.is_banned(ip, PortScope::AllPorts))
                .filter_map(|(ip, record)| {
                    let previous = uploads.previous.get(ip)?;
                    aggregate::ip_upload_offence(record, previous, &self.torrent_sizes, &self.config.ip_upload_check)
                        .map(|reason| (ip.clone(), reason))
                })
                .collect()
        };

        for (ip, reason) in &offenders {
            self.store.ban(ip, PortScope::AllPorts, now);
            info!(%ip, %reason, "address banned");
        }

        self.store.rotate_ip_uploads(now);

        offenders.len()
    }

    /// The aggregate port check. Addresses with any banned port are left
    /// alone.
    fn sweep_ports(&mut self, now: DurationSinceUnixEpoch) -> usize {
        if !self.store.peer_sweep_due(now) {
            return 0;
        }

        let offenders: Vec<(PeerIp, BanReason)> = {
            let bans = self.store.ban_list();

            self.store
                .presence()
                .iter()
                .filter(|(ip, record)| {
                    !record.ports.is_empty()
                        && !bans.is_banned(ip, PortScope::AllPorts)
                        && !record.ports.iter().any(|port| bans.is_banned(ip, PortScope::Specific(*port)))
                })
                .filter_map(|(ip, record)| {
                    aggregate::port_flood(record, &self.config.port_check).map(|reason| (ip.clone(), reason))
                })
                .collect()
        };

        for (ip, reason) in &offenders {
            self.store.ban(ip, PortScope::AllPorts, now);
            info!(%ip, %reason, "address banned");
        }

        self.store.clear_presence(now);

        offenders.len()
    }
}
