//! Database capability shared by the offline and online sources
//!
//! The offline snapshot store and the online registry client both
//! answer the same question: which target record belongs to a product
//! code. The resolution engine consumes them through one trait while
//! their failure kinds stay distinct, so callers can still tell a bad
//! local package from a bad remote payload from a plain miss.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::record::TargetRecord;
use crate::snapshot::{Snapshot, SnapshotError};

/// Failure kinds a target database can report.
///
/// Kinds are preserved through resolution; callers branch on the
/// variant, not on message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The source explicitly has no record for this product code.
    #[error("no target found for product code {product_code:?}")]
    NotFound { product_code: String },
    /// Transient failure reaching the source; retryable upstream.
    #[error("target registry unavailable: {reason}")]
    Unavailable { reason: String },
    /// The source answered, but the payload failed validation.
    #[error("target registry returned malformed data: {reason}")]
    MalformedResponse { reason: String },
    /// The packaged snapshot resource is absent.
    #[error("offline snapshot missing: {reason}")]
    SnapshotMissing { reason: String },
    /// The packaged snapshot resource could not be parsed.
    #[error("offline snapshot corrupt: {reason}")]
    SnapshotCorrupt { reason: String },
}

impl From<&SnapshotError> for SourceError {
    fn from(err: &SnapshotError) -> Self {
        match err {
            SnapshotError::Missing { .. } => SourceError::SnapshotMissing {
                reason: err.to_string(),
            },
            SnapshotError::Corrupt { .. } => SourceError::SnapshotCorrupt {
                reason: err.to_string(),
            },
        }
    }
}

/// A database of target records addressable by product code.
#[async_trait]
pub trait TargetDatabase: Send + Sync {
    /// Find the record for a product code, matched case-insensitively.
    async fn find(&self, product_code: &str) -> Result<TargetRecord, SourceError>;
}

/// Offline database backed by a one-time snapshot load.
///
/// The load outcome is captured at construction: a usable snapshot
/// serves lookups directly, while a failed load is re-reported on
/// every lookup with its original kind. That per-lookup reporting is
/// what lets auto-mode resolution fall through to the registry.
/// Construction performs the only load; callers share the store
/// afterwards (it is read-only for the rest of the process lifetime).
pub struct OfflineStore {
    snapshot: Result<Snapshot, SourceError>,
}

impl OfflineStore {
    /// Wrap a snapshot load outcome.
    pub fn new(load: Result<Snapshot, SnapshotError>) -> Self {
        Self {
            snapshot: load.map_err(|e| SourceError::from(&e)),
        }
    }

    /// Load the snapshot copy packaged with the crate.
    pub fn embedded() -> Self {
        Self::new(Snapshot::embedded())
    }

    /// Load a snapshot file.
    pub fn open(path: &Path) -> Self {
        Self::new(Snapshot::load(path))
    }

    /// The loaded snapshot, or the error the load failed with.
    pub fn snapshot(&self) -> Result<&Snapshot, &SourceError> {
        self.snapshot.as_ref()
    }
}

#[async_trait]
impl TargetDatabase for OfflineStore {
    async fn find(&self, product_code: &str) -> Result<TargetRecord, SourceError> {
        match &self.snapshot {
            Ok(snapshot) => snapshot
                .lookup(product_code)
                .cloned()
                .ok_or_else(|| SourceError::NotFound {
                    product_code: product_code.trim().to_string(),
                }),
            Err(err) => Err(err.clone()),
        }
    }
}
