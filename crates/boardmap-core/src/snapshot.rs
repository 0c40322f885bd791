//! Offline snapshot of the target registry
//!
//! The snapshot is a JSON document keyed by product code, regenerated
//! from the online registry by `boardmap sync` and packaged with this
//! crate. It is a cache, not a source of truth for freshness: the
//! generation timestamp exists for diagnostics only and never drives
//! merge decisions. Once loaded the snapshot is immutable and may be
//! shared across tasks without locking.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::record::{normalize_product_code, TargetRecord};

/// Snapshot copy packaged with the crate.
const EMBEDDED_SNAPSHOT: &str = include_str!("../data/targets.json");

/// Version written by the current snapshot producer.
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot not found at {path}")]
    Missing {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot is corrupt: {reason}")]
    Corrupt { reason: String },
}

/// On-disk snapshot document.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotDoc {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    targets: BTreeMap<String, SnapshotEntry>,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

/// Record fields as stored in the document; the product code is the
/// map key. Unknown keys are ignored so a registry that grows new
/// fields never breaks an older snapshot reader.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry {
    #[serde(default)]
    build_target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    board_name: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    attributes: Map<String, Value>,
}

/// Parsed, indexed snapshot. Read-only after load.
#[derive(Debug, Clone)]
pub struct Snapshot {
    version: u32,
    generated_at: Option<DateTime<Utc>>,
    /// Records indexed by normalized product code.
    records: BTreeMap<String, TargetRecord>,
}

impl Snapshot {
    /// Parse a snapshot document from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let doc: SnapshotDoc = serde_json::from_str(json).map_err(|e| SnapshotError::Corrupt {
            reason: e.to_string(),
        })?;

        let mut records = BTreeMap::new();
        for (product_code, entry) in doc.targets {
            let record = TargetRecord::new(
                product_code.clone(),
                entry.build_target,
                entry.board_name,
                entry.attributes,
            )
            .map_err(|e| SnapshotError::Corrupt {
                reason: format!("entry {product_code:?}: {e}"),
            })?;

            let key = record.key();
            if records.insert(key.clone(), record).is_some() {
                return Err(SnapshotError::Corrupt {
                    reason: format!("duplicate product code {key}"),
                });
            }
        }

        Ok(Self {
            version: doc.version,
            generated_at: doc.generated_at,
            records,
        })
    }

    /// Load a snapshot document from a file.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                SnapshotError::Missing {
                    path: path.display().to_string(),
                    source,
                }
            } else {
                SnapshotError::Corrupt {
                    reason: format!("failed to read {}: {source}", path.display()),
                }
            }
        })?;
        Self::from_json(&content)
    }

    /// Parse the snapshot copy packaged with the crate.
    pub fn embedded() -> Result<Self, SnapshotError> {
        Self::from_json(EMBEDDED_SNAPSHOT)
    }

    /// Build a snapshot from a record listing, stamped with the current
    /// time. This is the producer side used by the sync tooling.
    pub fn from_records(
        records: impl IntoIterator<Item = TargetRecord>,
    ) -> Result<Self, SnapshotError> {
        let mut indexed = BTreeMap::new();
        for record in records {
            let key = record.key();
            if indexed.insert(key.clone(), record).is_some() {
                return Err(SnapshotError::Corrupt {
                    reason: format!("duplicate product code {key}"),
                });
            }
        }
        Ok(Self {
            version: SNAPSHOT_VERSION,
            generated_at: Some(Utc::now()),
            records: indexed,
        })
    }

    /// Serialize in the snapshot document format, keys sorted so that
    /// regenerated snapshots diff cleanly.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        let doc = SnapshotDoc {
            version: self.version,
            generated_at: self.generated_at,
            targets: self
                .records
                .values()
                .map(|record| {
                    (
                        record.product_code.clone(),
                        SnapshotEntry {
                            build_target: record.build_target.clone(),
                            board_name: record.board_name.clone(),
                            attributes: record.attributes.clone(),
                        },
                    )
                })
                .collect(),
        };
        serde_json::to_string_pretty(&doc)
    }

    /// Look up a record by product code, case-insensitively. The
    /// returned record keeps the casing it was stored with.
    pub fn lookup(&self, product_code: &str) -> Option<&TargetRecord> {
        self.records.get(&normalize_product_code(product_code))
    }

    /// All records, ordered by normalized product code.
    pub fn records(&self) -> impl Iterator<Item = &TargetRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// When the snapshot was generated. Diagnostics only.
    pub fn generated_at(&self) -> Option<DateTime<Utc>> {
        self.generated_at
    }
}
