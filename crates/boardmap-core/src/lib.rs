//! Boardmap Core - target records, snapshot store, and resolution engine
//!
//! This crate provides the foundational pieces of the boardmap system:
//! - Target records mapping a board's product code to its build target
//! - The offline snapshot of the online target registry, packaged with
//!   the crate and regenerated by the sync tooling
//! - The database capability shared by the offline and online sources
//! - The resolution engine with offline/online/auto mode selection

pub mod database;
pub mod record;
pub mod resolver;
pub mod snapshot;

pub use database::{OfflineStore, SourceError, TargetDatabase};
pub use record::{normalize_product_code, RecordError, TargetRecord};
pub use resolver::{Mode, Resolution, ResolveError, Resolver, Source, UnsupportedMode};
pub use snapshot::{Snapshot, SnapshotError};
