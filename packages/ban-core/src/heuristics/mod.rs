//! Rules that decide what to do with a peer or an address.
//!
//! Every peer of every torrent goes through [`PEER_RULES`] in order. The
//! first rule that returns something other than [`Verdict::NoMatch`] decides
//! and the remaining rules are not evaluated.
//!
//! | Order | Rule                                 | Verdict on match                   |
//! |-------|--------------------------------------|------------------------------------|
//! | 1     | [`Rule::Identity`]                   | `Reject`, the peer is ignored      |
//! | 2     | [`Rule::AlreadyBanned`]              | `AlreadyBanned`, the ban is kept   |
//! | 3     | [`Rule::ProgressMismatch`]           | `Ban`, address and port            |
//! | 4     | [`Rule::RelativeProgressMismatch`]   | `Ban`, address and port            |
//! | 5     | [`Rule::Blocklist`]                  | `Ban`, port (client) or address    |
//!
//! A peer no rule matches is clean. Clean peers feed the aggregate checks of
//! the [`aggregate`] module, which run over addresses instead of peers.
//!
//! The rules only read state. Applying a verdict is the job of the
//! [`BanEngine`](crate::engine::BanEngine).
pub mod aggregate;
pub mod identity;
pub mod progress;

use derive_more::Display;
use peer_banner_configuration::Core;
use serde::Serialize;

use crate::blocklist::Blocklist;
use crate::primitives::{PeerObservation, PortScope};
use crate::store::banned::BanList;

/// The outcome of the evaluation of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Display)]
pub enum Verdict {
    /// No rule matched: the peer is clean.
    #[display("clean")]
    NoMatch,

    /// The peer can't be evaluated. It's ignored for this cycle.
    #[display("rejected: {_0}")]
    Reject(RejectReason),

    /// The peer is already banned.
    #[display("already banned")]
    AlreadyBanned,

    /// The peer must be banned.
    #[display("ban: {_0}")]
    Ban(BanReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum RejectReason {
    #[display("no client name")]
    EmptyClient,
    #[display("no address")]
    EmptyAddress,
    #[display("local address")]
    LocalAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Display, Serialize)]
pub enum BanReason {
    #[display("progress does not match upload")]
    ProgressMismatch,

    #[display("progress does not match upload since the previous cycle ({uploaded_delta} bytes)")]
    RelativeProgressMismatch { uploaded_delta: u64 },

    #[display("bad client")]
    BadClient,

    #[display("address in the IP list")]
    BadIpList,

    #[display("address in the IP filter")]
    BadIpFilter,

    #[display("too much upload ({mebibytes} MiB)")]
    TooMuchUpload { mebibytes: u64 },

    #[display("too many ports ({ports})")]
    TooManyPorts { ports: usize },
}

impl BanReason {
    /// The ports of the address the ban applies to, when the offending
    /// connection came from `port`.
    ///
    /// Misbehaving clients are banned on the port they use. Addresses found
    /// in IP lists or by the aggregate checks are banned on all ports.
    #[must_use]
    pub fn scope(&self, port: u16) -> PortScope {
        match self {
            BanReason::ProgressMismatch | BanReason::RelativeProgressMismatch { .. } | BanReason::BadClient => {
                PortScope::Specific(port)
            }
            BanReason::BadIpList | BanReason::BadIpFilter | BanReason::TooMuchUpload { .. } | BanReason::TooManyPorts { .. } => {
                PortScope::AllPorts
            }
        }
    }
}

/// A rule applied to every peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Rule {
    Identity,
    AlreadyBanned,
    ProgressMismatch,
    RelativeProgressMismatch,
    Blocklist,
}

/// The peer rules, in evaluation order.
pub const PEER_RULES: [Rule; 5] = [
    Rule::Identity,
    Rule::AlreadyBanned,
    Rule::ProgressMismatch,
    Rule::RelativeProgressMismatch,
    Rule::Blocklist,
];

/// Everything a rule needs to know about a peer.
pub struct PeerContext<'a> {
    pub peer: &'a PeerObservation,

    /// The same connection in the previous cycle, if it was seen.
    pub previous: Option<&'a PeerObservation>,

    /// Size of the torrent in bytes.
    pub total_size: i64,

    pub config: &'a Core,
    pub blocklist: &'a dyn Blocklist,
    pub bans: &'a BanList,
}

impl Rule {
    #[must_use]
    pub fn evaluate(self, ctx: &PeerContext<'_>) -> Verdict {
        match self {
            Rule::Identity => {
                identity::check_identity(ctx.peer, ctx.config.ignore_empty_peer).map_or(Verdict::NoMatch, Verdict::Reject)
            }
            Rule::AlreadyBanned => {
                if ctx.bans.is_banned(&ctx.peer.ip, PortScope::Specific(ctx.peer.port)) {
                    Verdict::AlreadyBanned
                } else {
                    Verdict::NoMatch
                }
            }
            Rule::ProgressMismatch => {
                if progress::absolute_mismatch(ctx.peer, ctx.total_size, &ctx.config.progress_check) {
                    Verdict::Ban(BanReason::ProgressMismatch)
                } else {
                    Verdict::NoMatch
                }
            }
            Rule::RelativeProgressMismatch => ctx
                .previous
                .and_then(|previous| {
                    progress::relative_mismatch(ctx.peer, previous, ctx.total_size, &ctx.config.relative_progress_check)
                })
                .map_or(Verdict::NoMatch, |uploaded_delta| {
                    Verdict::Ban(BanReason::RelativeProgressMismatch { uploaded_delta })
                }),
            Rule::Blocklist => identity::check_blocklist(ctx.peer, ctx.blocklist).map_or(Verdict::NoMatch, Verdict::Ban),
        }
    }
}

/// It runs the peer rules in order and returns the first verdict that is
/// not [`Verdict::NoMatch`].
#[must_use]
pub fn evaluate_peer(ctx: &PeerContext<'_>) -> Verdict {
    PEER_RULES
        .iter()
        .map(|rule| rule.evaluate(ctx))
        .find(|verdict| *verdict != Verdict::NoMatch)
        .unwrap_or(Verdict::NoMatch)
}
