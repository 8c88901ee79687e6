//! **Peer Banner** watches the swarms of a qBittorrent client and bans the
//! peers that cheat.
//!
//! # Table of contents
//!
//! - [Features](#features)
//! - [Running](#running)
//! - [Configuration](#configuration)
//! - [Components](#components)
//!
//! # Features
//!
//! - Bans peers that report much less progress than the upload they receive.
//! - Bans peers whose upload grows without progress between two cycles.
//! - Bans bad clients by name and bad addresses by IP list or IP filter file.
//! - Bans addresses that receive too much upload across all torrents.
//! - Bans addresses that connect from too many ports.
//! - Lifts bans that have not been seen for the configured ban time.
//!
//! # Running
//!
//! ```text
//! peer-banner --config ./config.toml
//! ```
//!
//! The banner logs in to the Web UI and runs one cycle every
//! `core.interval` seconds until it receives `Ctrl-C`.
//!
//! # Configuration
//!
//! Please refer to the [`peer_banner_configuration`] crate. Logging can also
//! be tuned with the `RUST_LOG` environment variable, which takes precedence
//! over `logging.threshold`:
//!
//! ```text
//! RUST_LOG=bittorrent_ban_core=debug peer-banner
//! ```
//!
//! # Components
//!
//! - [`bittorrent_ban_core`]: the rules, the state and the cycle.
//! - [`qbittorrent_api_client`]: the Web UI API client.
//! - [`qbittorrent`]: the bridge between both.
pub mod app;
pub mod bootstrap;
pub mod error;
pub mod qbittorrent;
