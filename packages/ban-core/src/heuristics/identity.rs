//! Identity and blocklist rules.
use tracing::debug;

use super::{BanReason, RejectReason};
use crate::blocklist::{is_local_ip, Blocklist, IpListKind};
use crate::primitives::PeerObservation;

/// It rejects peers that can't be evaluated.
///
/// A peer is rejected when:
///
/// - It has no client name nor peer id client and `ignore_empty_peer` is
///   disabled.
/// - It has no address.
/// - Its address is local (private, loopback, link-local or unspecified).
///
/// An address that is not an IP is not local. It goes on to the other rules.
#[must_use]
pub fn check_identity(peer: &PeerObservation, ignore_empty_peer: bool) -> Option<RejectReason> {
    if !ignore_empty_peer && !peer.has_client() {
        return Some(RejectReason::EmptyClient);
    }

    if peer.ip.is_empty() {
        return Some(RejectReason::EmptyAddress);
    }

    if peer.ip.to_ip_addr().is_some_and(|ip| is_local_ip(&ip)) {
        return Some(RejectReason::LocalAddress);
    }

    None
}

/// It bans peers with a bad client name, or whose address is in the IP list
/// or in the IP filter.
#[must_use]
pub fn check_blocklist(peer: &PeerObservation, blocklist: &dyn Blocklist) -> Option<BanReason> {
    if peer.client_names().any(|client| blocklist.is_bad_client(client)) {
        return Some(BanReason::BadClient);
    }

    let Some(ip) = peer.ip.to_ip_addr() else {
        debug!(ip = %peer.ip, port = peer.port, "peer address is not an IP, IP lists skipped");
        return None;
    };

    blocklist.match_ip(ip).map(|kind| match kind {
        IpListKind::BlockList => BanReason::BadIpList,
        IpListKind::Filter => BanReason::BadIpFilter,
    })
}
