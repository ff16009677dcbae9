//! # Marquee Core
//!
//! Trailer resolution pipeline for the Marquee background-trailer subsystem.
//!
//! ## Overview
//!
//! `marquee-core` resolves a playable trailer stream for a catalog item and
//! keeps the result warm for the UI layer:
//!
//! - **Discovery**: races a curated id-indexed backend against a free-text
//!   video-platform search and accepts the first positive match
//! - **Stream lookup**: resolves a manifest URL for a known provider video id
//!   through an ordered fallback chain
//! - **Caching**: two-tier (memory + host session store) TTL cache with
//!   monotonic record upgrades and negative caching
//! - **Prefetch**: debounced, cancellable cache warming driven by grid
//!   focus/hover
//! - **Cancellation**: request groups scope every network operation to one
//!   user-visible intent
//!
//! The playback side (player, promotion state machine) lives in
//! `marquee-player`; this crate owns everything up to a resolved stream URL.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Two-tier TTL cache of trailer records plus the debounced persistent writer
pub mod cache;

/// Typed configuration with defaults, loadable from TOML
pub mod config;

/// Error types and error handling utilities
pub mod error;

/// Trailer resolution entrypoint racing discovery backends and walking the
/// stream-lookup fallback chain
pub mod orchestrator;

/// Debounced, cancellable speculative resolution triggered by grid focus
pub mod prefetch;

/// Discovery backends, candidate filtering, and stream locators
pub mod providers;

/// Cancellation scopes for in-flight network operations
pub mod request_group;

/// Core data model: queries, records, resolved streams
pub mod types;

pub use cache::{SessionStore, TrailerCache};
pub use config::TrailerConfig;
pub use error::{Result, TrailerError};
pub use orchestrator::ProviderOrchestrator;
pub use prefetch::PrefetchCoordinator;
pub use request_group::RequestGroupRegistry;
pub use types::{ResolvedStream, SourceProvider, TrailerQuery, TrailerRecord};
