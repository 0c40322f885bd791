//! Boardmap Registry - client for the online target registry
//!
//! Wraps the authoritative HTTP registry behind the boardmap-core
//! database capability so the resolver can treat it like any other
//! source. The client keeps no cache: every lookup is a fresh,
//! idempotent round-trip, bounded by the configured timeout.

pub mod client;

pub use client::{RegistryClient, DEFAULT_TIMEOUT_SECS, REGISTRY_API};
