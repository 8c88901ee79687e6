//! The in-memory state of the ban engine.
//!
//! All the state lives in one [`Store`] owned by the
//! [`BanEngine`](crate::engine::BanEngine):
//!
//! - [`BanList`]: the banned addresses.
//! - The upload sent to every address, per torrent ([`IpUploadRecord`]).
//!   Two generations are kept: the one being filled and the one taken at the
//!   previous aggregate IP sweep.
//! - The ports every address connected from ([`PeerPresenceRecord`]). It's
//!   cleared at every aggregate port sweep.
//! - The peers of every torrent in the previous cycle
//!   ([`PreviousTorrentPeers`]), rotated at the beginning of every cycle.
//!
//! Nothing is persisted. The store is only mutated by the cycle that owns
//! it, so it needs no locking.
pub mod banned;
pub mod history;

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use peer_banner_configuration::Core;
use tracing::{debug, warn};

use self::banned::BanList;
use self::history::{IpUploadRecord, PeerPresenceRecord, PreviousTorrentPeers};
use crate::primitives::{DurationSinceUnixEpoch, PeerIp, PeerKey, PeerObservation, PortScope};

/// Two copies of a history: the one being filled and the previous one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generations<T> {
    pub current: T,
    pub previous: T,
}

impl<T: Default> Generations<T> {
    /// The current generation becomes the previous one and a new, empty
    /// generation starts.
    pub fn rotate(&mut self) {
        self.previous = std::mem::take(&mut self.current);
    }
}

/// Number of entries in every map of the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreSize {
    pub banned: usize,
    pub ip_uploads: usize,
    pub previous_ip_uploads: usize,
    pub presence: usize,
    pub torrents: usize,
}

pub struct Store {
    /// The core configuration.
    config: Core,

    banned: BanList,
    ip_uploads: Generations<HashMap<PeerIp, IpUploadRecord>>,
    presence: HashMap<PeerIp, PeerPresenceRecord>,
    torrent_peers: Generations<HashMap<String, PreviousTorrentPeers>>,

    last_ban_sweep: DurationSinceUnixEpoch,
    last_ip_sweep: DurationSinceUnixEpoch,
    last_peer_sweep: DurationSinceUnixEpoch,
}

impl Store {
    #[must_use]
    pub fn new(config: &Core) -> Self {
        Self {
            config: config.clone(),
            banned: BanList::new(config.port_scoped_bans),
            ip_uploads: Generations::default(),
            presence: HashMap::new(),
            torrent_peers: Generations::default(),
            last_ban_sweep: DurationSinceUnixEpoch::ZERO,
            last_ip_sweep: DurationSinceUnixEpoch::ZERO,
            last_peer_sweep: DurationSinceUnixEpoch::ZERO,
        }
    }

    /// It applies a new configuration. The bans are kept. The history of a
    /// check that is no longer active is dropped.
    pub fn reconfigure(&mut self, config: &Core) {
        if !config.ip_upload_check.is_active() {
            self.ip_uploads = Generations::default();
        }

        if !config.port_check.is_active() {
            self.presence.clear();
        }

        if !config.relative_progress_check.enabled {
            self.torrent_peers = Generations::default();
        }

        if self.banned.is_port_scoped() != config.port_scoped_bans {
            debug!(port_scoped = config.port_scoped_bans, "ban scope changed");
            self.banned.set_port_scoped(config.port_scoped_bans);
        }

        self.config = config.clone();
    }

    /// It records the upload sent to a clean peer for the aggregate IP check.
    ///
    /// It does nothing when the check is disabled.
    pub fn record_ip_upload(&mut self, ip: &PeerIp, info_hash: &str, uploaded: u64) {
        if !self.config.ip_upload_check.is_active() {
            return;
        }

        self.ip_uploads
            .current
            .entry(ip.clone())
            .or_default()
            .update(info_hash, uploaded);
    }

    /// It records the port a clean peer connected from for the aggregate
    /// port check.
    ///
    /// It does nothing when the check is disabled.
    pub fn record_presence(&mut self, peer: &PeerObservation, now: DurationSinceUnixEpoch) {
        if !self.config.port_check.is_active() {
            return;
        }

        self.presence
            .entry(peer.ip.clone())
            .or_insert_with(|| PeerPresenceRecord::new(now))
            .observe(peer, now);
    }

    /// It keeps the peers of a torrent for the relative progress check of
    /// the next cycle.
    ///
    /// It does nothing when the relative check is disabled.
    pub fn record_torrent_peers(&mut self, info_hash: &str, total_size: i64, peers: &[PeerObservation]) {
        if !self.config.relative_progress_check.enabled {
            return;
        }

        self.torrent_peers
            .current
            .insert(info_hash.to_owned(), PreviousTorrentPeers::new(total_size, peers));
    }

    /// The same connection as it was in the previous cycle, if it was seen.
    #[must_use]
    pub fn previous_peer(&self, info_hash: &str, key: &PeerKey) -> Option<&PeerObservation> {
        self.torrent_peers.previous.get(info_hash)?.peers.get(key)
    }

    /// The peers recorded in the previous cycle become the reference for
    /// the relative check of the cycle that starts.
    pub fn rotate_torrent_peers(&mut self) {
        self.torrent_peers.rotate();
    }

    /// It bans an address for the given scope.
    ///
    /// # Returns
    ///
    /// Whether the ban is new.
    pub fn ban(&mut self, ip: &PeerIp, scope: PortScope, now: DurationSinceUnixEpoch) -> bool {
        self.banned.ban(ip, scope, now)
    }

    /// Whether the address is banned for the given scope. When `refresh` is
    /// given a banned entry is also marked as seen at that time.
    pub fn is_banned(&mut self, ip: &PeerIp, scope: PortScope, refresh: Option<DurationSinceUnixEpoch>) -> bool {
        match refresh {
            Some(now) => self.banned.is_banned_refreshing(ip, scope, now),
            None => self.banned.is_banned(ip, scope),
        }
    }

    /// It removes the bans that have not been seen for longer than the
    /// ban time.
    ///
    /// The sweep runs at most once per clean interval, or on every call if
    /// the interval is zero. The interval only restarts when something was
    /// removed.
    ///
    /// # Returns
    ///
    /// The number of removed bans.
    pub fn sweep_expired_bans(&mut self, now: DurationSinceUnixEpoch) -> usize {
        let policy = &self.config.ban_policy;

        let due = policy.clean_interval == 0 || self.last_ban_sweep + Duration::from_secs(policy.clean_interval) < now;
        if !due {
            return 0;
        }

        let cutoff = now.saturating_sub(Duration::from_secs(policy.ban_time));
        let removed = self.banned.remove_not_seen_since(cutoff);

        if removed > 0 {
            self.last_ban_sweep = now;
            debug!(removed, "expired bans removed");
        }

        removed
    }

    /// Whether the aggregate IP check must run at `now`.
    #[must_use]
    pub fn ip_sweep_due(&self, now: DurationSinceUnixEpoch) -> bool {
        let check = &self.config.ip_upload_check;
        check.is_active() && now > self.last_ip_sweep + Duration::from_secs(check.interval)
    }

    /// The upload histories of the current and the previous window.
    #[must_use]
    pub fn ip_uploads(&self) -> &Generations<HashMap<PeerIp, IpUploadRecord>> {
        &self.ip_uploads
    }

    /// It closes the current upload window.
    pub fn rotate_ip_uploads(&mut self, now: DurationSinceUnixEpoch) {
        self.ip_uploads.rotate();
        self.last_ip_sweep = now;
    }

    /// Whether the aggregate port check must run at `now`.
    #[must_use]
    pub fn peer_sweep_due(&self, now: DurationSinceUnixEpoch) -> bool {
        let check = &self.config.port_check;
        check.is_active() && now > self.last_peer_sweep + Duration::from_secs(check.interval)
    }

    #[must_use]
    pub fn presence(&self) -> &HashMap<PeerIp, PeerPresenceRecord> {
        &self.presence
    }

    /// It closes the current port window.
    pub fn clear_presence(&mut self, now: DurationSinceUnixEpoch) {
        self.presence.clear();
        self.last_peer_sweep = now;
    }

    /// It evicts arbitrary addresses from the history maps that grew beyond
    /// `max_tracked_entries`.
    ///
    /// # Returns
    ///
    /// The number of evicted entries.
    pub fn enforce_capacity(&mut self) -> usize {
        let cap = self.config.max_tracked_entries;

        let evicted = evict_down_to(&mut self.ip_uploads.current, cap)
            + evict_down_to(&mut self.ip_uploads.previous, cap)
            + evict_down_to(&mut self.presence, cap);

        if evicted > 0 {
            warn!(evicted, cap, "history maps over capacity, entries evicted");
        }

        evicted
    }

    #[must_use]
    pub fn ban_list(&self) -> &BanList {
        &self.banned
    }

    #[must_use]
    pub fn size(&self) -> StoreSize {
        StoreSize {
            banned: self.banned.len(),
            ip_uploads: self.ip_uploads.current.len(),
            previous_ip_uploads: self.ip_uploads.previous.len(),
            presence: self.presence.len(),
            torrents: self.torrent_peers.current.len(),
        }
    }
}

fn evict_down_to<K: Clone + Eq + Hash, V>(map: &mut HashMap<K, V>, cap: usize) -> usize {
    let excess = map.len().saturating_sub(cap);
    if excess == 0 {
        return 0;
    }

    let victims: Vec<K> = map.keys().take(excess).cloned().collect();
    for key in &victims {
        map.remove(key);
    }

    victims.len()
}

#[cfg(test)]
mod tests {

    mod the_generations {
        use crate::store::Generations;

        #[test]
        fn it_should_move_the_current_generation_to_the_previous_one_when_rotated() {
            let mut generations = Generations {
                current: vec![1, 2],
                previous: vec![0],
            };

            generations.rotate();

            assert_eq!(generations.previous, vec![1, 2]);
            assert!(generations.current.is_empty());
        }
    }

    mod banning {
        use std::time::Duration;

        use crate::primitives::{PeerIp, PortScope};
        use crate::store::Store;
        use crate::test_helpers::tests::ephemeral_configuration;

        #[test]
        fn it_should_refresh_a_banned_address_when_asked_to() {
            let mut store = Store::new(&ephemeral_configuration());
            let ip = PeerIp::new("126.0.0.1");
            store.ban(&ip, PortScope::AllPorts, Duration::from_secs(10));

            assert!(store.is_banned(&ip, PortScope::Specific(1), Some(Duration::from_secs(20))));

            assert_eq!(store.ban_list().get(&ip).unwrap().last_seen, Duration::from_secs(20));
        }

        #[test]
        fn it_should_not_refresh_a_banned_address_when_not_asked_to() {
            let mut store = Store::new(&ephemeral_configuration());
            let ip = PeerIp::new("126.0.0.1");
            store.ban(&ip, PortScope::AllPorts, Duration::from_secs(10));

            assert!(store.is_banned(&ip, PortScope::Specific(1), None));

            assert_eq!(store.ban_list().get(&ip).unwrap().last_seen, Duration::from_secs(10));
        }
    }

    mod reconfiguring {
        use std::time::Duration;

        use crate::primitives::{PeerIp, PortScope};
        use crate::store::Store;
        use crate::test_helpers::tests::{ephemeral_configuration, peer_on_port, sample_info_hash};

        #[test]
        fn it_should_keep_the_bans() {
            let mut store = Store::new(&ephemeral_configuration());
            let ip = PeerIp::new("126.0.0.1");
            store.ban(&ip, PortScope::AllPorts, Duration::ZERO);

            let mut config = ephemeral_configuration();
            config.ban_policy.ban_time = 60;
            store.reconfigure(&config);

            assert!(store.is_banned(&ip, PortScope::AllPorts, None));
        }

        #[test]
        fn it_should_drop_the_history_of_the_checks_that_were_turned_off() {
            let mut store = Store::new(&ephemeral_configuration());
            let peer = peer_on_port("126.0.0.1", 6881);
            store.record_ip_upload(&peer.ip, &sample_info_hash(), 1024);
            store.record_presence(&peer, Duration::ZERO);

            let mut config = ephemeral_configuration();
            config.ip_upload_check.enabled = false;
            config.port_check.max_ip_port_count = 0;
            store.reconfigure(&config);

            assert_eq!(store.size().ip_uploads, 0);
            assert_eq!(store.size().presence, 0);

            store.record_presence(&peer, Duration::ZERO);
            assert_eq!(store.size().presence, 0);
        }

        #[test]
        fn it_should_keep_the_history_of_the_checks_that_are_still_on() {
            let mut store = Store::new(&ephemeral_configuration());
            let peer = peer_on_port("126.0.0.1", 6881);
            store.record_presence(&peer, Duration::ZERO);

            let mut config = ephemeral_configuration();
            config.port_check.max_ip_port_count = 5;
            store.reconfigure(&config);

            assert_eq!(store.size().presence, 1);
        }

        #[test]
        fn it_should_apply_a_new_ban_scope_to_the_existing_bans() {
            let mut store = Store::new(&ephemeral_configuration());
            let ip = PeerIp::new("126.0.0.1");
            store.ban(&ip, PortScope::Specific(6881), Duration::ZERO);

            let mut config = ephemeral_configuration();
            config.port_scoped_bans = true;
            store.reconfigure(&config);

            assert!(store.ban_list().is_port_scoped());
            assert!(!store.is_banned(&ip, PortScope::Specific(6882), None));
            assert!(store.is_banned(&ip, PortScope::Specific(6881), None));
        }
    }

    mod sweeping_expired_bans {
        use std::time::Duration;

        use crate::primitives::{PeerIp, PortScope};
        use crate::store::Store;
        use crate::test_helpers::tests::ephemeral_configuration;

        #[test]
        fn it_should_keep_a_ban_until_the_ban_time_has_elapsed() {
            let mut config = ephemeral_configuration();
            config.ban_policy.ban_time = 100;
            config.ban_policy.clean_interval = 0;
            let mut store = Store::new(&config);
            let ip = PeerIp::new("126.0.0.1");
            store.ban(&ip, PortScope::AllPorts, Duration::from_secs(1_000));

            assert_eq!(store.sweep_expired_bans(Duration::from_secs(1_100)), 0);
            assert_eq!(store.sweep_expired_bans(Duration::from_secs(1_101)), 1);
            assert!(store.ban_list().is_empty());
        }

        #[test]
        fn a_ban_should_be_gone_one_clean_interval_after_it_expired() {
            let mut config = ephemeral_configuration();
            config.ban_policy.ban_time = 100;
            config.ban_policy.clean_interval = 50;
            let mut store = Store::new(&config);
            let ip = PeerIp::new("126.0.0.1");
            store.ban(&ip, PortScope::AllPorts, Duration::from_secs(1_000));

            // Another ban expires and restarts the clean interval.
            store.ban(&PeerIp::new("126.0.0.2"), PortScope::AllPorts, Duration::from_secs(900));
            assert_eq!(store.sweep_expired_bans(Duration::from_secs(1_060)), 1);

            assert_eq!(store.sweep_expired_bans(Duration::from_secs(1_101)), 0);
            assert_eq!(store.sweep_expired_bans(Duration::from_secs(1_111)), 1);
        }

        #[test]
        fn a_refreshed_ban_should_not_expire() {
            let mut config = ephemeral_configuration();
            config.ban_policy.ban_time = 100;
            config.ban_policy.clean_interval = 0;
            let mut store = Store::new(&config);
            let ip = PeerIp::new("126.0.0.1");
            store.ban(&ip, PortScope::AllPorts, Duration::from_secs(1_000));

            store.is_banned(&ip, PortScope::AllPorts, Some(Duration::from_secs(1_090)));

            assert_eq!(store.sweep_expired_bans(Duration::from_secs(1_150)), 0);
        }
    }

    mod recording_history {
        use std::time::Duration;

        use crate::primitives::PeerIp;
        use crate::store::Store;
        use crate::test_helpers::tests::{ephemeral_configuration, sample_peer};

        #[test]
        fn it_should_not_record_uploads_when_the_ip_upload_check_is_disabled() {
            let mut config = ephemeral_configuration();
            config.ip_upload_check.enabled = false;
            let mut store = Store::new(&config);

            store.record_ip_upload(&PeerIp::new("126.0.0.1"), "hash", 10);

            assert_eq!(store.size().ip_uploads, 0);
        }

        #[test]
        fn it_should_not_record_presence_when_the_port_check_is_disabled() {
            let mut config = ephemeral_configuration();
            config.port_check.max_ip_port_count = 0;
            let mut store = Store::new(&config);

            store.record_presence(&sample_peer(), Duration::ZERO);

            assert_eq!(store.size().presence, 0);
        }

        #[test]
        fn it_should_find_a_connection_of_the_previous_cycle_by_address_and_port() {
            let mut config = ephemeral_configuration();
            config.relative_progress_check.enabled = true;
            let mut store = Store::new(&config);
            let peer = sample_peer();

            store.record_torrent_peers("hash", 100, &[peer.clone()]);
            assert!(store.previous_peer("hash", &peer.key()).is_none());

            store.rotate_torrent_peers();

            assert_eq!(store.previous_peer("hash", &peer.key()), Some(&peer));

            let mut other_port = peer.key();
            other_port.port += 1;
            assert!(store.previous_peer("hash", &other_port).is_none());
        }

        #[test]
        fn the_previous_peers_should_be_forgotten_after_two_rotations() {
            let mut config = ephemeral_configuration();
            config.relative_progress_check.enabled = true;
            let mut store = Store::new(&config);
            let peer = sample_peer();

            store.record_torrent_peers("hash", 100, &[peer.clone()]);
            store.rotate_torrent_peers();
            store.rotate_torrent_peers();

            assert!(store.previous_peer("hash", &peer.key()).is_none());
        }
    }

    mod enforcing_capacity {
        use std::time::Duration;

        use crate::primitives::PeerIp;
        use crate::store::Store;
        use crate::test_helpers::tests::{ephemeral_configuration, sample_peer};

        #[test]
        fn it_should_evict_history_entries_beyond_the_configured_cap() {
            let mut config = ephemeral_configuration();
            config.max_tracked_entries = 3;
            let mut store = Store::new(&config);

            for i in 0..5 {
                let mut peer = sample_peer();
                peer.ip = PeerIp::new(&format!("126.0.0.{i}"));
                store.record_ip_upload(&peer.ip, "hash", 1);
                store.record_presence(&peer, Duration::ZERO);
            }

            let evicted = store.enforce_capacity();

            assert_eq!(evicted, 4);
            assert_eq!(store.size().ip_uploads, 3);
            assert_eq!(store.size().presence, 3);
        }

        #[test]
        fn it_should_not_evict_anything_below_the_cap() {
            let mut store = Store::new(&ephemeral_configuration());

            store.record_ip_upload(&PeerIp::new("126.0.0.1"), "hash", 1);

            assert_eq!(store.enforce_capacity(), 0);
        }
    }
}
