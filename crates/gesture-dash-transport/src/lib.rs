//! Transport layer for the gesture dashboard.
//!
//! Provides:
//! - Wire protocol (JSON commands, NDJSON event feed)
//! - HTTP `RemoteControl` client and event feed (feature: http)
//! - Reference axum service (feature: server)

pub mod protocol;

#[cfg(feature = "http")]
pub mod client;

#[cfg(feature = "server")]
pub mod server;

pub use protocol::{FeedError, decode_feed_line, encode_feed_line};

#[cfg(feature = "http")]
pub use client::{EventFeed, HttpRemoteControl};

#[cfg(feature = "server")]
pub use server::ReferenceService;
