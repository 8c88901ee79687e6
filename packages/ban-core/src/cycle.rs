//! The cycle orchestrator.
//!
//! A cycle goes through these phases:
//!
//! ```text
//! Idle -> Fetching -> Evaluating -> Sweeping -> Submitting -> Idle
//! ```
//!
//! - **Fetching**: the torrent list is requested. If it fails the cycle is
//!   abandoned before anything changes.
//! - **Evaluating**: the peers of every torrent with leechers are fetched
//!   and evaluated. A torrent whose peers can't be fetched is skipped.
//! - **Sweeping**: aggregate checks and capacity enforcement.
//! - **Submitting**: the full ban list is submitted when it changed, or when
//!   the previous submission failed.
//!
//! Only one cycle runs at a time: [`CycleOrchestrator::run_cycle`] takes
//! `&mut self`. A shutdown request is honored between torrents.
use std::sync::Arc;
use std::time::Duration;

use derive_more::Display;
use peer_banner_clock::clock::Time;
use peer_banner_configuration::Core;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::blocklist::Blocklist;
use crate::engine::{BanEngine, CycleReport, TorrentCheck};
use crate::error::CycleError;
use crate::primitives::TorrentSnapshot;
use crate::source::{BanSink, SwarmSource};
use crate::CurrentClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CyclePhase {
    Idle,
    Fetching,
    Evaluating,
    Sweeping,
    Submitting,
}

pub struct CycleOrchestrator<S, K> {
    engine: BanEngine,

    /// Where torrents and peers are read from.
    source: Arc<S>,

    /// Where the ban list is submitted.
    sink: Arc<K>,

    /// Pause after every torrent.
    sleep_time: Duration,

    /// `true` once a shutdown was requested.
    shutdown: watch::Receiver<bool>,

    /// The last submission failed.
    pending_submission: bool,

    phase: CyclePhase,
}

impl<S, K> CycleOrchestrator<S, K>
where
    S: SwarmSource,
    K: BanSink,
{
    #[must_use]
    pub fn new(
        config: &Core,
        blocklist: &Arc<dyn Blocklist>,
        source: &Arc<S>,
        sink: &Arc<K>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            engine: BanEngine::new(config, blocklist),
            source: source.clone(),
            sink: sink.clone(),
            sleep_time: Duration::from_millis(config.sleep_time),
            shutdown,
            pending_submission: false,
            phase: CyclePhase::Idle,
        }
    }

    #[must_use]
    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    #[must_use]
    pub fn engine(&self) -> &BanEngine {
        &self.engine
    }

    /// Whether the last submission failed and the ban list must be submitted
    /// again.
    #[must_use]
    pub fn has_pending_submission(&self) -> bool {
        self.pending_submission
    }

    /// It applies a new configuration and blocklist from the next cycle on.
    pub fn reconfigure(&mut self, config: &Core, blocklist: &Arc<dyn Blocklist>) {
        self.engine.reconfigure(config, blocklist);
        self.sleep_time = Duration::from_millis(config.sleep_time);
    }

    /// It runs one cycle at the current time.
    ///
    /// # Errors
    ///
    /// Will return a `CycleError` if the torrent list can't be fetched, or if
    /// a shutdown was requested while the torrents were being evaluated.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        let now = CurrentClock::now();

        self.phase = CyclePhase::Fetching;

        let torrents = match self.source.torrents().await {
            Ok(torrents) => torrents,
            Err(source) => {
                self.phase = CyclePhase::Idle;
                return Err(CycleError::Fetch { source });
            }
        };

        self.phase = CyclePhase::Evaluating;

        self.engine.begin_cycle(now);

        for summary in torrents {
            if *self.shutdown.borrow() {
                self.phase = CyclePhase::Idle;
                return Err(CycleError::Interrupted);
            }

            if self.engine.check_torrent(&summary) == TorrentCheck::Ready {
                match self.source.torrent_peers(&summary.info_hash).await {
                    Ok(peers) => self.engine.evaluate_torrent(&TorrentSnapshot::new(summary, peers), now),
                    Err(err) => {
                        debug!(info_hash = %summary.info_hash, %err, "unable to fetch torrent peers");
                        self.engine.skip_unavailable_torrent(&summary);
                    }
                }
            }

            if !self.sleep_time.is_zero() {
                tokio::time::sleep(self.sleep_time).await;
            }
        }

        self.phase = CyclePhase::Sweeping;

        let mut report = self.engine.finish_cycle(now);

        if report.has_changes() || self.pending_submission {
            self.phase = CyclePhase::Submitting;

            match self.sink.submit(self.engine.ban_list()).await {
                Ok(()) => {
                    self.pending_submission = false;
                    report.submitted = true;
                }
                Err(err) => {
                    self.pending_submission = true;
                    error!(%err, bans = self.engine.ban_list().len(), "unable to submit the ban list");
                }
            }
        }

        self.phase = CyclePhase::Idle;

        info!(
            expired = report.expired_bans,
            banned_peers = report.banned_peers,
            ip_upload_bans = report.ip_upload_bans,
            port_bans = report.port_bans,
            total_bans = report.total_bans,
            submitted = report.submitted,
            "cycle completed"
        );
        debug!(
            empty_hash_torrents = report.empty_hash_torrents,
            no_leecher_torrents = report.no_leecher_torrents,
            unavailable_torrents = report.unavailable_torrents,
            evaluated_torrents = report.evaluated_torrents,
            rejected_peers = report.rejected_peers,
            already_banned_peers = report.already_banned_peers,
            clean_peers = report.clean_peers,
            evicted_entries = report.evicted_entries,
            "cycle details"
        );

        Ok(report)
    }
}
