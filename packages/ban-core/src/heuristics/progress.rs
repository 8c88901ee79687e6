//! Progress/upload mismatch rules.
//!
//! A peer reports how much of the torrent it has. The local client knows how
//! much it has uploaded to the peer. A peer that received much more than it
//! claims to have is lying about its progress to keep receiving upload.
//!
//! Example for the absolute rule: a 100 GiB torrent, a peer that reports 1%
//! and received 6 GiB, `start_percent = 2` and `anti_error_ratio = 5`.
//!
//! - The upload is at least 2% of the torrent: 6 GiB >= 2 GiB.
//! - The peer claims 1 GiB; with the ratio that is 5 GiB < 6 GiB.
//!
//! The peer is banned.
#![allow(clippy::cast_precision_loss)]

use peer_banner_configuration::ProgressCheck;

use crate::primitives::{PeerObservation, MIB};

/// Whether the cumulative upload to the peer does not match the progress it
/// reports.
///
/// It never fires for torrents without a positive size, for a negative
/// progress or for a peer that received nothing.
#[must_use]
pub fn absolute_mismatch(peer: &PeerObservation, total_size: i64, check: &ProgressCheck) -> bool {
    if !check.enabled || total_size <= 0 || peer.progress.is_nan() || peer.progress < 0.0 || peer.uploaded == 0 {
        return false;
    }

    let total_size = total_size as f64;
    let uploaded = peer.uploaded as f64;

    let start_uploaded = total_size * (check.start_percent / 100.0);
    let reported_downloaded = total_size * peer.progress;

    peer.uploaded / MIB >= check.start_mb
        && uploaded >= start_uploaded
        && reported_downloaded * check.anti_error_ratio < uploaded
}

/// The same check over the period since the previous cycle.
///
/// It only applies when the peer did not go backwards and received something
/// since the previous cycle. All the thresholds are compared in bytes.
///
/// # Returns
///
/// The bytes uploaded since the previous cycle, when the rule fires.
#[must_use]
pub fn relative_mismatch(
    peer: &PeerObservation,
    previous: &PeerObservation,
    total_size: i64,
    check: &ProgressCheck,
) -> Option<u64> {
    if !check.enabled || total_size <= 0 {
        return None;
    }

    let progress_delta = peer.progress - previous.progress;
    if progress_delta.is_nan() || progress_delta < 0.0 {
        return None;
    }

    let uploaded_delta = peer.uploaded.checked_sub(previous.uploaded).filter(|delta| *delta > 0)?;

    let total_size = total_size as f64;
    let uploaded = uploaded_delta as f64;

    let fires = uploaded_delta > check.start_mb.saturating_mul(MIB)
        && uploaded > total_size * (check.start_percent / 100.0)
        && uploaded > total_size * progress_delta * check.anti_error_ratio;

    fires.then_some(uploaded_delta)
}
