//! Blocklist matchers.
//!
//! The ban rules consume a [`Blocklist`]: something that knows whether a
//! client name or an IP address is bad. The production implementation is
//! [`CompiledBlocklist`], built once from the textual rules in the
//! configuration:
//!
//! - **clients**: regular expressions matched case insensitively against the
//!   client name and the peer id client.
//! - **ips**: addresses or CIDR networks.
//! - **ip filter file**: an `ipfilter.dat` style file. Every line contains an
//!   address, a network or a `start - end` range. Anything after the first
//!   comma is ignored, so eMule style lines like
//!   `001.002.003.000 - 001.002.003.255 , 000 , Some description` work too.
use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use ipnet::IpNet;
use mockall::automock;
use peer_banner_configuration::Blocklist as BlocklistSettings;
use regex::{Regex, RegexBuilder};

use crate::error::BlocklistError;

/// The list an address was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpListKind {
    /// The `ips` list of the configuration.
    BlockList,
    /// The IP filter file.
    Filter,
}

/// Read only matcher used by the blocklist rule.
#[automock]
pub trait Blocklist: Send + Sync {
    /// Whether the client name matches any bad client pattern.
    fn is_bad_client(&self, client: &str) -> bool;

    /// The first list containing the address, checking the IP list before
    /// the IP filter.
    fn match_ip(&self, ip: IpAddr) -> Option<IpListKind>;
}

/// An inclusive range of addresses of the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    start: IpAddr,
    end: IpAddr,
}

impl IpRange {
    /// Builds a range. It returns `None` when the bounds belong to
    /// different families.
    #[must_use]
    pub fn new(start: IpAddr, end: IpAddr) -> Option<Self> {
        if start.is_ipv4() != end.is_ipv4() {
            return None;
        }
        if start <= end {
            Some(Self { start, end })
        } else {
            Some(Self { start: end, end: start })
        }
    }

    #[must_use]
    pub fn contains(&self, ip: &IpAddr) -> bool {
        ip.is_ipv4() == self.start.is_ipv4() && *ip >= self.start && *ip <= self.end
    }
}

/// A set of networks and ranges.
#[derive(Debug, Clone, Default)]
pub struct IpMatcher {
    networks: Vec<IpNet>,
    ranges: Vec<IpRange>,
}

impl IpMatcher {
    #[must_use]
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.networks.iter().any(|network| network.contains(ip)) || self.ranges.iter().any(|range| range.contains(ip))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.networks.len() + self.ranges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// It adds an address, a network or a `start - end` range. It returns
    /// `false` when the entry can't be parsed.
    fn add(&mut self, entry: &str) -> bool {
        if let Some((start, end)) = entry.split_once('-') {
            return match (parse_ip(start.trim()), parse_ip(end.trim())) {
                (Some(start), Some(end)) => match IpRange::new(start, end) {
                    Some(range) => {
                        self.ranges.push(range);
                        true
                    }
                    None => false,
                },
                _ => false,
            };
        }

        if let Ok(network) = entry.parse::<IpNet>() {
            self.networks.push(network.trunc());
            return true;
        }

        match parse_ip(entry).and_then(host_network) {
            Some(network) => {
                self.networks.push(network);
                true
            }
            None => false,
        }
    }
}

/// The blocklist compiled from the configuration.
#[derive(Debug, Clone, Default)]
pub struct CompiledBlocklist {
    clients: Vec<Regex>,
    ips: IpMatcher,
    ip_filter: IpMatcher,
}

impl CompiledBlocklist {
    /// It compiles all the textual rules.
    ///
    /// # Errors
    ///
    /// Will return a `BlocklistError` for the first pattern, entry or file
    /// that can't be used.
    pub fn compile(settings: &BlocklistSettings) -> Result<Self, BlocklistError> {
        let clients = settings
            .clients
            .iter()
            .filter(|pattern| !pattern.trim().is_empty())
            .map(|pattern| compile_client_pattern(pattern))
            .collect::<Result<Vec<_>, _>>()?;

        let mut ips = IpMatcher::default();
        for entry in settings.ips.iter().map(|entry| entry.trim()).filter(|entry| !entry.is_empty()) {
            if !ips.add(entry) {
                return Err(BlocklistError::InvalidIpEntry {
                    entry: entry.to_string(),
                });
            }
        }

        let ip_filter = match &settings.ip_filter_path {
            Some(path) => load_ip_filter(path)?,
            None => IpMatcher::default(),
        };

        tracing::debug!(
            clients = clients.len(),
            ips = ips.len(),
            ip_filter = ip_filter.len(),
            "Blocklist compiled"
        );

        Ok(Self { clients, ips, ip_filter })
    }
}

impl Blocklist for CompiledBlocklist {
    fn is_bad_client(&self, client: &str) -> bool {
        self.clients.iter().any(|pattern| pattern.is_match(client))
    }

    fn match_ip(&self, ip: IpAddr) -> Option<IpListKind> {
        // `::ffff:a.b.c.d` is matched against the IPv4 entries.
        let ip = ip.to_canonical();

        if self.ips.contains(&ip) {
            return Some(IpListKind::BlockList);
        }
        if self.ip_filter.contains(&ip) {
            return Some(IpListKind::Filter);
        }
        None
    }
}

fn compile_client_pattern(pattern: &str) -> Result<Regex, BlocklistError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| BlocklistError::InvalidClientPattern {
            pattern: pattern.to_string(),
            source,
        })
}

fn load_ip_filter(path: &Path) -> Result<IpMatcher, BlocklistError> {
    let contents = fs::read_to_string(path).map_err(|source| BlocklistError::UnreadableIpFilter {
        path: path.to_path_buf(),
        source,
    })?;

    let mut matcher = IpMatcher::default();

    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }

        let entry = line.split(',').next().unwrap_or_default().trim();

        if !matcher.add(entry) {
            return Err(BlocklistError::InvalidIpFilterEntry {
                path: path.to_path_buf(),
                line: index + 1,
                entry: line.to_string(),
            });
        }
    }

    Ok(matcher)
}

fn host_network(ip: IpAddr) -> Option<IpNet> {
    let prefix_len = if ip.is_ipv4() { 32 } else { 128 };
    IpNet::new(ip, prefix_len).ok()
}

/// Parses an address, accepting the zero padded IPv4 octets used by
/// `ipfilter.dat` files (`001.002.003.004`).
fn parse_ip(raw: &str) -> Option<IpAddr> {
    if let Ok(ip) = raw.parse::<IpAddr>() {
        return Some(ip);
    }

    let octets = raw
        .split('.')
        .map(|octet| octet.parse::<u8>().ok())
        .collect::<Option<Vec<u8>>>()?;

    match octets.as_slice() {
        [a, b, c, d] => Some(IpAddr::V4(Ipv4Addr::new(*a, *b, *c, *d))),
        _ => None,
    }
}

/// Whether the address belongs to a network that never reaches the client
/// from the Internet: private, loopback, link-local or unspecified.
#[must_use]
pub fn is_local_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ip) => ip.is_private() || ip.is_loopback() || ip.is_link_local() || ip.is_unspecified(),
        IpAddr::V6(ip) => {
            if let Some(mapped) = ip.to_ipv4_mapped() {
                return is_local_ip(&IpAddr::V4(mapped));
            }
            ip.is_loopback() || ip.is_unspecified() || is_unique_local(ip) || is_unicast_link_local(ip)
        }
    }
}

fn is_unique_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xfe00) == 0xfc00
}

fn is_unicast_link_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {

    mod the_compiled_blocklist {
        use std::io::Write;
        use std::net::IpAddr;

        use peer_banner_configuration::Blocklist as BlocklistSettings;
        use rstest::rstest;

        use crate::blocklist::{Blocklist, CompiledBlocklist, IpListKind};
        use crate::error::BlocklistError;

        fn settings(clients: &[&str], ips: &[&str]) -> BlocklistSettings {
            BlocklistSettings {
                clients: clients.iter().map(ToString::to_string).collect(),
                ips: ips.iter().map(ToString::to_string).collect(),
                ip_filter_path: None,
            }
        }

        fn ip(raw: &str) -> IpAddr {
            raw.parse().unwrap()
        }

        #[test]
        fn it_should_match_client_names_case_insensitively() {
            let blocklist = CompiledBlocklist::compile(&settings(&["xunlei", r"^7\."], &[])).unwrap();

            assert!(blocklist.is_bad_client("Xunlei 0.0.1.2"));
            assert!(blocklist.is_bad_client("7.10.35.366"));
            assert!(!blocklist.is_bad_client("qBittorrent/4.6.2"));
        }

        #[test]
        fn it_should_reject_an_invalid_client_pattern() {
            let result = CompiledBlocklist::compile(&settings(&["(unclosed"], &[]));

            assert!(matches!(result, Err(BlocklistError::InvalidClientPattern { .. })));
        }

        #[test]
        fn it_should_match_addresses_and_networks_from_the_ip_list() {
            let blocklist = CompiledBlocklist::compile(&settings(&[], &["1.2.3.4", "10.20.0.0/16", "2001:db8::/32"])).unwrap();

            assert_eq!(blocklist.match_ip(ip("1.2.3.4")), Some(IpListKind::BlockList));
            assert_eq!(blocklist.match_ip(ip("10.20.200.1")), Some(IpListKind::BlockList));
            assert_eq!(blocklist.match_ip(ip("2001:db8::42")), Some(IpListKind::BlockList));
            assert_eq!(blocklist.match_ip(ip("1.2.3.5")), None);
        }

        #[rstest]
        #[case::from_the_ip_list("::ffff:1.2.3.4", Some(IpListKind::BlockList))]
        #[case::from_the_ip_filter("::ffff:5.6.7.8", Some(IpListKind::Filter))]
        #[case::outside_both_lists("::ffff:1.2.4.1", None)]
        fn ipv4_mapped_addresses_should_match_the_ipv4_entries(#[case] address: &str, #[case] expected: Option<IpListKind>) {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "5.6.7.0 - 5.6.7.255").unwrap();

            let mut settings = settings(&[], &["1.2.3.0/24"]);
            settings.ip_filter_path = Some(file.path().to_path_buf());

            let blocklist = CompiledBlocklist::compile(&settings).unwrap();

            assert_eq!(blocklist.match_ip(ip(address)), expected);
        }

        #[test]
        fn it_should_reject_an_invalid_ip_entry() {
            let result = CompiledBlocklist::compile(&settings(&[], &["1.2.3.4/99"]));

            assert!(matches!(result, Err(BlocklistError::InvalidIpEntry { .. })));
        }

        #[test]
        fn it_should_load_ranges_from_an_ip_filter_file() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "# comment").unwrap();
            writeln!(file, "001.002.003.000 - 001.002.003.255 , 000 , Some range").unwrap();
            writeln!(file).unwrap();
            writeln!(file, "5.6.7.0/24").unwrap();

            let mut settings = settings(&[], &["9.9.9.9"]);
            settings.ip_filter_path = Some(file.path().to_path_buf());

            let blocklist = CompiledBlocklist::compile(&settings).unwrap();

            assert_eq!(blocklist.match_ip(ip("1.2.3.77")), Some(IpListKind::Filter));
            assert_eq!(blocklist.match_ip(ip("5.6.7.8")), Some(IpListKind::Filter));
            assert_eq!(blocklist.match_ip(ip("9.9.9.9")), Some(IpListKind::BlockList));
            assert_eq!(blocklist.match_ip(ip("1.2.4.0")), None);
        }

        #[test]
        fn it_should_report_the_line_of_an_invalid_ip_filter_entry() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "5.6.7.0/24").unwrap();
            writeln!(file, "garbage").unwrap();

            let mut settings = settings(&[], &[]);
            settings.ip_filter_path = Some(file.path().to_path_buf());

            let result = CompiledBlocklist::compile(&settings);

            assert!(matches!(result, Err(BlocklistError::InvalidIpFilterEntry { line: 2, .. })));
        }

        #[test]
        fn it_should_fail_when_the_ip_filter_file_does_not_exist() {
            let mut settings = settings(&[], &[]);
            settings.ip_filter_path = Some("/nonexistent/ipfilter.dat".into());

            let result = CompiledBlocklist::compile(&settings);

            assert!(matches!(result, Err(BlocklistError::UnreadableIpFilter { .. })));
        }
    }

    mod local_addresses {
        use std::net::IpAddr;

        use rstest::rstest;

        use crate::blocklist::is_local_ip;

        #[rstest]
        #[case("10.0.0.1", true)]
        #[case("172.16.5.4", true)]
        #[case("192.168.1.1", true)]
        #[case("127.0.0.1", true)]
        #[case("169.254.3.3", true)]
        #[case("0.0.0.0", true)]
        #[case("::1", true)]
        #[case("fd12:3456::1", true)]
        #[case("fe80::1", true)]
        #[case("::ffff:192.168.1.1", true)]
        #[case("126.0.0.1", false)]
        #[case("8.8.8.8", false)]
        #[case("2001:db8::1", false)]
        fn it_should_classify_addresses(#[case] raw: &str, #[case] expected: bool) {
            let ip: IpAddr = raw.parse().unwrap();

            assert_eq!(is_local_ip(&ip), expected);
        }
    }
}
