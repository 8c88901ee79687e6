//! A client for the qBittorrent Web UI API.
//!
//! Only the `v2` API is supported, which is the one exposed by qBittorrent
//! 4.1 and later.
//!
//! ```text
//! POST /api/v2/auth/login
//! GET  /api/v2/app/version
//! POST /api/v2/app/setPreferences
//! GET  /api/v2/torrents/info
//! GET  /api/v2/sync/torrentPeers
//! POST /api/v2/transfer/banPeers
//! ```
pub mod common;
pub mod connection_info;
pub mod v2;
