//! Ban core errors.
//!
//! This module defines the error types used by the ban core.
//!
//! Blocklist errors happen only when the textual rules are compiled, at
//! startup. Source errors happen while talking to the torrent client; they
//! abort the current cycle or submission but never the process.
use std::path::PathBuf;

/// Errors related to blocklist compilation.
#[derive(thiserror::Error, Debug)]
pub enum BlocklistError {
    /// A client name pattern is not a valid regular expression.
    #[error("Invalid client pattern: {pattern}, {source}")]
    InvalidClientPattern { pattern: String, source: regex::Error },

    /// An IP list entry is neither an address nor a network.
    #[error("Invalid IP list entry: {entry}")]
    InvalidIpEntry { entry: String },

    /// A line of the IP filter file can't be parsed.
    #[error("Invalid IP filter entry at {path:?}, line {line}: {entry}")]
    InvalidIpFilterEntry { path: PathBuf, line: usize, entry: String },

    /// The IP filter file can't be read.
    #[error("Can't read IP filter file {path:?}: {source}")]
    UnreadableIpFilter { path: PathBuf, source: std::io::Error },
}

/// Errors returned by data sources and sinks.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    /// The request could not be completed.
    #[error("Data source request failed: {source}")]
    Request {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The source answered, but refused the request.
    #[error("Data source rejected the request: {reason}")]
    Rejected { reason: String },
}

/// Errors that stop a cycle before it completes.
#[derive(thiserror::Error, Debug)]
pub enum CycleError {
    /// The torrent list could not be fetched. Nothing was changed.
    #[error("Unable to fetch the torrent list: {source}")]
    Fetch { source: SourceError },

    /// A shutdown was requested while the cycle was running.
    #[error("The cycle was interrupted by a shutdown request")]
    Interrupted,
}
