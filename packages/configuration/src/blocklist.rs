use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Textual blocklist rules.
///
/// They are compiled into matchers once, when the banner starts. A rule that
/// can't be compiled is a startup error.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct Blocklist {
    /// Regular expressions matched, case insensitively, against the peer
    /// client name and the client decoded from the peer id.
    #[serde(default = "Blocklist::default_clients")]
    pub clients: Vec<String>,

    /// IP addresses or CIDR networks. A match bans the address on all ports.
    #[serde(default)]
    pub ips: Vec<String>,

    /// Optional `ipfilter.dat` style file with one address, network or
    /// `start - end` range per line.
    #[serde(default)]
    pub ip_filter_path: Option<PathBuf>,
}

impl Default for Blocklist {
    fn default() -> Self {
        Self {
            clients: Self::default_clients(),
            ips: Vec::new(),
            ip_filter_path: None,
        }
    }
}

impl Blocklist {
    fn default_clients() -> Vec<String> {
        [
            "XL0012",
            "Xunlei",
            r"^7\.",
            "Xfplay",
            "dandanplay",
            "FDM",
            r"go\.torrent",
            "Mozilla",
            "trafficConsume",
            "QQDownload",
            "offline-download",
        ]
        .iter()
        .map(ToString::to_string)
        .collect()
    }
}
