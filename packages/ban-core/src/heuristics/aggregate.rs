//! Checks over addresses, run once per window instead of once per peer.
#![allow(clippy::cast_precision_loss)]

use std::collections::HashMap;

use peer_banner_configuration::{IpUploadCheck, PortCheck};

use super::BanReason;
use crate::primitives::MIB;
use crate::store::history::{IpUploadRecord, PeerPresenceRecord};

/// Whether an address received too much upload.
///
/// - On one torrent: more than the torrent size times `per_torrent_ratio`.
///   Only torrents of the current snapshot with a positive size are checked.
/// - Over all torrents: more than `increment_mb` since the previous window.
///
/// A zero threshold disables its check.
#[must_use]
pub fn ip_upload_offence(
    current: &IpUploadRecord,
    previous: &IpUploadRecord,
    torrent_sizes: &HashMap<String, i64>,
    check: &IpUploadCheck,
) -> Option<BanReason> {
    if check.per_torrent_ratio > 0.0 {
        for (info_hash, uploaded) in &current.torrent_uploaded {
            let Some(total_size) = torrent_sizes.get(info_hash).copied().filter(|size| *size > 0) else {
                continue;
            };

            if *uploaded as f64 > total_size as f64 * check.per_torrent_ratio {
                return Some(BanReason::TooMuchUpload {
                    mebibytes: uploaded / MIB,
                });
            }
        }
    }

    if check.increment_mb > 0 {
        let mebibytes = current.uploaded_since(previous) / MIB;
        if mebibytes > check.increment_mb {
            return Some(BanReason::TooMuchUpload { mebibytes });
        }
    }

    None
}

/// Whether an address connected from more distinct ports than allowed.
#[must_use]
pub fn port_flood(record: &PeerPresenceRecord, check: &PortCheck) -> Option<BanReason> {
    let ports = record.ports.len();
    let max = usize::try_from(check.max_ip_port_count).unwrap_or(usize::MAX);

    (check.is_active() && ports > max).then_some(BanReason::TooManyPorts { ports })
}

#[cfg(test)]
mod tests {

    mod the_ip_upload_check {
        use std::collections::HashMap;

        use peer_banner_configuration::IpUploadCheck;

        use crate::heuristics::aggregate::ip_upload_offence;
        use crate::heuristics::BanReason;
        use crate::primitives::MIB;
        use crate::store::history::IpUploadRecord;

        fn check() -> IpUploadCheck {
            IpUploadCheck {
                enabled: true,
                interval: 300,
                increment_mb: 100,
                per_torrent_ratio: 3.0,
            }
        }

        fn record(entries: &[(&str, u64)]) -> IpUploadRecord {
            let mut record = IpUploadRecord::default();
            for (info_hash, uploaded) in entries {
                record.update(info_hash, *uploaded);
            }
            record
        }

        #[test]
        fn it_should_ban_an_address_that_received_too_much_across_torrents() {
            let previous = record(&[("a", 50 * MIB)]);
            let current = record(&[("a", 120 * MIB), ("b", 40 * MIB)]);

            assert_eq!(
                ip_upload_offence(&current, &previous, &HashMap::new(), &check()),
                Some(BanReason::TooMuchUpload { mebibytes: 110 })
            );
        }

        #[test]
        fn it_should_not_ban_an_address_at_the_increment_threshold() {
            let previous = record(&[("a", 50 * MIB)]);
            let current = record(&[("a", 150 * MIB)]);

            assert_eq!(ip_upload_offence(&current, &previous, &HashMap::new(), &check()), None);
        }

        #[test]
        fn it_should_ban_an_address_that_received_more_than_the_torrent_size_times_the_ratio() {
            let previous = record(&[("a", 40 * MIB)]);
            let current = record(&[("a", 40 * MIB)]);
            let sizes = HashMap::from([("a".to_string(), i64::try_from(10 * MIB).unwrap())]);

            assert_eq!(
                ip_upload_offence(&current, &previous, &sizes, &check()),
                Some(BanReason::TooMuchUpload { mebibytes: 40 })
            );
        }

        #[test]
        fn it_should_ignore_torrents_without_a_positive_size() {
            let previous = record(&[("a", 40 * MIB)]);
            let current = record(&[("a", 40 * MIB)]);
            let sizes = HashMap::from([("a".to_string(), -1)]);

            assert_eq!(ip_upload_offence(&current, &previous, &sizes, &check()), None);
        }
    }

    mod the_port_check {
        use std::time::Duration;

        use peer_banner_configuration::PortCheck;

        use crate::heuristics::aggregate::port_flood;
        use crate::heuristics::BanReason;
        use crate::store::history::PeerPresenceRecord;

        fn seen_on_ports(count: u16) -> PeerPresenceRecord {
            let mut record = PeerPresenceRecord::new(Duration::ZERO);
            record.ports.extend(1..=count);
            record
        }

        fn check() -> PortCheck {
            PortCheck {
                max_ip_port_count: 20,
                interval: 60,
            }
        }

        #[test]
        fn it_should_ban_an_address_seen_on_more_ports_than_allowed() {
            assert_eq!(
                port_flood(&seen_on_ports(21), &check()),
                Some(BanReason::TooManyPorts { ports: 21 })
            );
        }

        #[test]
        fn it_should_not_ban_an_address_seen_on_exactly_the_allowed_ports() {
            assert_eq!(port_flood(&seen_on_ports(20), &check()), None);
        }
    }
}
