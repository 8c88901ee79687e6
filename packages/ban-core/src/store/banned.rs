//! The in-memory list of banned addresses.
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use serde::Serialize;

use crate::primitives::{DurationSinceUnixEpoch, PeerIp, PortScope};

/// A banned address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BannedEntry {
    /// When the address was banned or last seen while banned.
    pub last_seen: DurationSinceUnixEpoch,

    /// The banned ports. `AllPorts` bans the address on every port.
    pub ports: BTreeSet<PortScope>,
}

impl BannedEntry {
    #[must_use]
    pub fn covers_all_ports(&self) -> bool {
        self.ports.contains(&PortScope::AllPorts)
    }
}

/// Banned addresses, ordered so that the serialized list is stable.
///
/// When port scoped bans are disabled every entry bans its address on all
/// ports, whatever ports it contains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BanList {
    entries: BTreeMap<PeerIp, BannedEntry>,
    port_scoped: bool,
}

impl BanList {
    #[must_use]
    pub fn new(port_scoped: bool) -> Self {
        Self {
            entries: BTreeMap::new(),
            port_scoped,
        }
    }

    /// It inserts the ban or, if the address is already banned, adds the
    /// scope and refreshes the entry.
    ///
    /// # Returns
    ///
    /// - `true` if the scope was not banned for the address before.
    /// - `false` if it was.
    pub fn ban(&mut self, ip: &PeerIp, scope: PortScope, now: DurationSinceUnixEpoch) -> bool {
        let entry = self.entries.entry(ip.clone()).or_insert_with(|| BannedEntry {
            last_seen: now,
            ports: BTreeSet::new(),
        });
        entry.last_seen = now;
        entry.ports.insert(scope)
    }

    /// Whether the address is banned for the given scope.
    ///
    /// Asking for `AllPorts` means "is the whole address banned", which with
    /// port scoped bans only holds for address-wide entries.
    #[must_use]
    pub fn is_banned(&self, ip: &PeerIp, scope: PortScope) -> bool {
        match self.entries.get(ip) {
            None => false,
            Some(entry) => !self.port_scoped || entry.covers_all_ports() || entry.ports.contains(&scope),
        }
    }

    /// Like `is_banned`, but it also resets the eviction clock of a banned
    /// address to `now`.
    pub fn is_banned_refreshing(&mut self, ip: &PeerIp, scope: PortScope, now: DurationSinceUnixEpoch) -> bool {
        if !self.is_banned(ip, scope) {
            return false;
        }
        if let Some(entry) = self.entries.get_mut(ip) {
            entry.last_seen = now;
        }
        true
    }

    #[must_use]
    pub fn get(&self, ip: &PeerIp) -> Option<&BannedEntry> {
        self.entries.get(ip)
    }

    /// It removes the entries not seen since before the cutoff and returns
    /// how many were removed.
    pub fn remove_not_seen_since(&mut self, cutoff: DurationSinceUnixEpoch) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.last_seen >= cutoff);
        before - self.entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn is_port_scoped(&self) -> bool {
        self.port_scoped
    }

    /// It changes how port scoped entries are treated. The entries are kept:
    /// when port scoped bans are turned off they ban every port.
    pub fn set_port_scoped(&mut self, port_scoped: bool) {
        self.port_scoped = port_scoped;
    }

    /// The ban list as the torrent client expects it: one `address` or
    /// `address:port` per line, sorted.
    ///
    /// The same list always produces the same text, so submitting it again
    /// does not change anything in the client.
    #[must_use]
    pub fn to_banned_ips(&self) -> String {
        self.lines(|_| true).join("\n")
    }

    /// The addresses banned on every port.
    #[must_use]
    pub fn banned_addresses(&self) -> Vec<String> {
        self.lines(|entry| !self.port_scoped || entry.covers_all_ports())
    }

    /// The `address:port` connections banned on their port only. It's always
    /// empty when bans are not port scoped.
    #[must_use]
    pub fn banned_peers(&self) -> Vec<String> {
        self.lines(|entry| self.port_scoped && !entry.covers_all_ports())
    }

    fn lines(&self, include: impl Fn(&BannedEntry) -> bool) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.entries.len());

        for (ip, entry) in self.entries.iter().filter(|(_, entry)| include(entry)) {
            if !self.port_scoped || entry.covers_all_ports() {
                lines.push(ip.to_string());
                continue;
            }
            for scope in &entry.ports {
                if let PortScope::Specific(port) = scope {
                    lines.push(format_address_with_port(ip, *port));
                }
            }
        }

        lines
    }
}

fn format_address_with_port(ip: &PeerIp, port: u16) -> String {
    match ip.to_ip_addr() {
        Some(IpAddr::V6(_)) => format!("[{ip}]:{port}"),
        _ => format!("{ip}:{port}"),
    }
}

#[cfg(test)]
mod tests {

    mod the_ban_list {
        use std::time::Duration;

        use crate::primitives::{PeerIp, PortScope};
        use crate::store::banned::BanList;

        fn ip(raw: &str) -> PeerIp {
            PeerIp::new(raw)
        }

        #[test]
        fn it_should_ban_an_address_on_all_ports_when_port_scoped_bans_are_disabled() {
            let mut bans = BanList::new(false);

            bans.ban(&ip("126.0.0.1"), PortScope::Specific(6881), Duration::ZERO);

            assert!(bans.is_banned(&ip("126.0.0.1"), PortScope::Specific(6882)));
            assert!(bans.is_banned(&ip("126.0.0.1"), PortScope::AllPorts));
        }

        #[test]
        fn it_should_only_ban_the_given_port_when_port_scoped_bans_are_enabled() {
            let mut bans = BanList::new(true);

            bans.ban(&ip("126.0.0.1"), PortScope::Specific(6881), Duration::ZERO);

            assert!(bans.is_banned(&ip("126.0.0.1"), PortScope::Specific(6881)));
            assert!(!bans.is_banned(&ip("126.0.0.1"), PortScope::Specific(6882)));
            assert!(!bans.is_banned(&ip("126.0.0.1"), PortScope::AllPorts));
        }

        #[test]
        fn port_scoped_entries_should_ban_every_port_once_port_scoped_bans_are_turned_off() {
            let mut bans = BanList::new(true);
            bans.ban(&ip("126.0.0.1"), PortScope::Specific(6881), Duration::ZERO);

            bans.set_port_scoped(false);

            assert!(!bans.is_port_scoped());
            assert!(bans.is_banned(&ip("126.0.0.1"), PortScope::Specific(6882)));
            assert_eq!(bans.banned_addresses(), vec!["126.0.0.1".to_string()]);
            assert!(bans.banned_peers().is_empty());
        }

        #[test]
        fn an_address_wide_ban_should_cover_every_port() {
            let mut bans = BanList::new(true);

            bans.ban(&ip("126.0.0.1"), PortScope::AllPorts, Duration::ZERO);

            assert!(bans.is_banned(&ip("126.0.0.1"), PortScope::Specific(1)));
            assert!(bans.is_banned(&ip("126.0.0.1"), PortScope::AllPorts));
        }

        #[test]
        fn it_should_refresh_the_entry_when_a_banned_address_is_checked_with_refresh() {
            let mut bans = BanList::new(false);
            bans.ban(&ip("126.0.0.1"), PortScope::AllPorts, Duration::from_secs(100));

            assert!(bans.is_banned_refreshing(&ip("126.0.0.1"), PortScope::Specific(1), Duration::from_secs(200)));

            assert_eq!(bans.get(&ip("126.0.0.1")).unwrap().last_seen, Duration::from_secs(200));
        }

        #[test]
        fn it_should_not_create_an_entry_when_an_unbanned_address_is_checked_with_refresh() {
            let mut bans = BanList::new(false);

            assert!(!bans.is_banned_refreshing(&ip("126.0.0.1"), PortScope::AllPorts, Duration::from_secs(200)));
            assert!(bans.is_empty());
        }

        #[test]
        fn it_should_remove_entries_not_seen_since_a_cutoff_time() {
            let mut bans = BanList::new(false);
            bans.ban(&ip("126.0.0.1"), PortScope::AllPorts, Duration::from_secs(100));
            bans.ban(&ip("126.0.0.2"), PortScope::AllPorts, Duration::from_secs(300));

            let removed = bans.remove_not_seen_since(Duration::from_secs(200));

            assert_eq!(removed, 1);
            assert!(bans.get(&ip("126.0.0.1")).is_none());
            assert!(bans.get(&ip("126.0.0.2")).is_some());
        }

        #[test]
        fn it_should_serialize_the_list_sorted_and_with_ports_when_port_scoped() {
            let mut bans = BanList::new(true);
            bans.ban(&ip("126.0.0.2"), PortScope::Specific(6881), Duration::ZERO);
            bans.ban(&ip("126.0.0.2"), PortScope::Specific(51413), Duration::ZERO);
            bans.ban(&ip("126.0.0.1"), PortScope::AllPorts, Duration::ZERO);
            bans.ban(&ip("2001:db8::1"), PortScope::Specific(80), Duration::ZERO);

            assert_eq!(
                bans.to_banned_ips(),
                "126.0.0.1\n126.0.0.2:6881\n126.0.0.2:51413\n[2001:db8::1]:80"
            );
        }

        #[test]
        fn it_should_split_address_wide_bans_from_port_bans() {
            let mut bans = BanList::new(true);
            bans.ban(&ip("126.0.0.2"), PortScope::Specific(6881), Duration::ZERO);
            bans.ban(&ip("126.0.0.1"), PortScope::AllPorts, Duration::ZERO);

            assert_eq!(bans.banned_addresses(), vec!["126.0.0.1".to_string()]);
            assert_eq!(bans.banned_peers(), vec!["126.0.0.2:6881".to_string()]);
        }

        #[test]
        fn it_should_serialize_only_addresses_when_bans_are_not_port_scoped() {
            let mut bans = BanList::new(false);
            bans.ban(&ip("126.0.0.2"), PortScope::Specific(6881), Duration::ZERO);
            bans.ban(&ip("126.0.0.1"), PortScope::Specific(6881), Duration::ZERO);

            assert_eq!(bans.to_banned_ips(), "126.0.0.1\n126.0.0.2");
        }

        #[test]
        fn the_same_bans_should_always_serialize_to_the_same_text() {
            let mut first = BanList::new(false);
            first.ban(&ip("126.0.0.2"), PortScope::AllPorts, Duration::ZERO);
            first.ban(&ip("126.0.0.1"), PortScope::AllPorts, Duration::ZERO);

            let mut second = BanList::new(false);
            second.ban(&ip("126.0.0.1"), PortScope::AllPorts, Duration::from_secs(5));
            second.ban(&ip("126.0.0.2"), PortScope::AllPorts, Duration::from_secs(5));

            assert_eq!(first.to_banned_ips(), second.to_banned_ips());
        }
    }
}
