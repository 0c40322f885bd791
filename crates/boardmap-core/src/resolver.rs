//! Resolution engine: decides which database answers a lookup
//!
//! One operation, `resolve(product_code, mode)`. Offline mode consults
//! the snapshot store only, online mode the registry only. Auto mode
//! tries the snapshot first and falls through to the registry on a
//! miss or an unusable snapshot; an offline hit always wins without a
//! network round-trip, because the snapshot is refreshed upstream on a
//! fixed cadence and accepted to be eventually consistent with the
//! registry. Consultation is strictly sequential and never retried
//! here; retry policy belongs to callers.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::database::{SourceError, TargetDatabase};
use crate::record::TargetRecord;

/// Which database(s) a resolution may consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Offline snapshot only.
    Offline,
    /// Online registry only.
    Online,
    /// Offline snapshot first, online registry on a miss.
    Auto,
}

impl Default for Mode {
    fn default() -> Self {
        Self::Auto
    }
}

#[derive(Error, Debug)]
#[error("{0:?} is not a supported database mode")]
pub struct UnsupportedMode(pub String);

impl FromStr for Mode {
    type Err = UnsupportedMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OFFLINE" => Ok(Mode::Offline),
            "ONLINE" => Ok(Mode::Online),
            "AUTO" => Ok(Mode::Auto),
            _ => Err(UnsupportedMode(s.to_string())),
        }
    }
}

/// Which database actually answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Offline,
    Online,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Offline => write!(f, "offline"),
            Source::Online => write!(f, "online"),
        }
    }
}

/// A resolved record together with its provenance. One source answers
/// fully per request; records are never merged across sources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub record: TargetRecord,
    pub source: Source,
}

#[derive(Error, Debug)]
pub enum ResolveError {
    /// A database error, passed through with its kind intact.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// Auto mode found the snapshot unusable and then could not reach
    /// the registry either. Both causes are kept so operators can tell
    /// "network down" from "network down and local snapshot broken".
    #[error("offline snapshot unusable ({offline}); online registry unreachable ({online})")]
    Unavailable {
        offline: SourceError,
        online: SourceError,
    },
}

/// Resolution engine over an offline snapshot store and an online
/// registry client.
///
/// Holds no state of its own beyond the two injected collaborators;
/// safe to call from any number of tasks once the snapshot store has
/// been constructed.
pub struct Resolver {
    offline: Arc<dyn TargetDatabase>,
    online: Arc<dyn TargetDatabase>,
}

impl Resolver {
    pub fn new(offline: Arc<dyn TargetDatabase>, online: Arc<dyn TargetDatabase>) -> Self {
        Self { offline, online }
    }

    /// Resolve a product code to a target record.
    ///
    /// Source errors surface unmodified in kind: a data-integrity
    /// failure is never downgraded to not-found, and a not-found is
    /// never upgraded to a hard failure.
    pub async fn resolve(
        &self,
        product_code: &str,
        mode: Mode,
    ) -> Result<Resolution, ResolveError> {
        let product_code = product_code.trim();
        if product_code.is_empty() {
            // No valid record carries an empty product code.
            debug!("empty product code, nothing to resolve");
            return Err(SourceError::NotFound {
                product_code: String::new(),
            }
            .into());
        }

        match mode {
            Mode::Offline => {
                info!(product_code, "using the offline snapshot to identify the target");
                let record = self.offline.find(product_code).await?;
                Ok(Resolution {
                    record,
                    source: Source::Offline,
                })
            }
            Mode::Online => {
                info!(product_code, "using the online registry to identify the target");
                let record = self.online.find(product_code).await?;
                Ok(Resolution {
                    record,
                    source: Source::Online,
                })
            }
            Mode::Auto => self.resolve_auto(product_code).await,
        }
    }

    async fn resolve_auto(&self, product_code: &str) -> Result<Resolution, ResolveError> {
        debug!(product_code, "consulting the offline snapshot first");
        let snapshot_failure = match self.offline.find(product_code).await {
            Ok(record) => {
                debug!(target_record = %record, "offline snapshot hit");
                return Ok(Resolution {
                    record,
                    source: Source::Offline,
                });
            }
            Err(SourceError::NotFound { .. }) => {
                info!(
                    product_code,
                    "not in the offline snapshot, trying the online registry"
                );
                None
            }
            Err(err) => {
                warn!(
                    product_code,
                    error = %err,
                    "offline snapshot unusable, trying the online registry"
                );
                Some(err)
            }
        };

        match (self.online.find(product_code).await, snapshot_failure) {
            (Ok(record), failure) => {
                if let Some(err) = failure {
                    warn!(
                        product_code,
                        error = %err,
                        "online registry answered despite an unusable offline snapshot"
                    );
                }
                Ok(Resolution {
                    record,
                    source: Source::Online,
                })
            }
            (Err(online @ SourceError::Unavailable { .. }), Some(offline)) => {
                Err(ResolveError::Unavailable { offline, online })
            }
            (Err(err), _) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Map;

    /// Answers from a fixed record list.
    struct StaticDb(Vec<TargetRecord>);

    #[async_trait]
    impl TargetDatabase for StaticDb {
        async fn find(&self, product_code: &str) -> Result<TargetRecord, SourceError> {
            self.0
                .iter()
                .find(|record| record.matches_product_code(product_code))
                .cloned()
                .ok_or_else(|| SourceError::NotFound {
                    product_code: product_code.to_string(),
                })
        }
    }

    /// Fails every lookup with a fixed error.
    struct FailingDb(SourceError);

    #[async_trait]
    impl TargetDatabase for FailingDb {
        async fn find(&self, _product_code: &str) -> Result<TargetRecord, SourceError> {
            Err(self.0.clone())
        }
    }

    /// Fails the test if consulted at all.
    struct UnreachableDb;

    #[async_trait]
    impl TargetDatabase for UnreachableDb {
        async fn find(&self, product_code: &str) -> Result<TargetRecord, SourceError> {
            panic!("database must not be consulted for {product_code}");
        }
    }

    fn record(product_code: &str, build_target: &str) -> TargetRecord {
        TargetRecord::new(product_code, build_target, None, Map::new()).unwrap()
    }

    fn db(records: &[(&str, &str)]) -> Arc<StaticDb> {
        Arc::new(StaticDb(
            records
                .iter()
                .map(|(code, target)| record(code, target))
                .collect(),
        ))
    }

    fn unavailable() -> SourceError {
        SourceError::Unavailable {
            reason: "connection timed out".to_string(),
        }
    }

    fn corrupt() -> SourceError {
        SourceError::SnapshotCorrupt {
            reason: "truncated document".to_string(),
        }
    }

    #[tokio::test]
    async fn test_offline_mode_hit() {
        let resolver = Resolver::new(db(&[("0240", "K64F")]), Arc::new(UnreachableDb));
        let resolution = resolver.resolve("0240", Mode::Offline).await.unwrap();
        assert_eq!(resolution.record, record("0240", "K64F"));
        assert_eq!(resolution.source, Source::Offline);
    }

    #[tokio::test]
    async fn test_offline_mode_miss() {
        let resolver = Resolver::new(db(&[]), Arc::new(UnreachableDb));
        let err = resolver.resolve("9999", Mode::Offline).await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Source(SourceError::NotFound { product_code }) if product_code == "9999"
        ));
    }

    #[tokio::test]
    async fn test_offline_mode_surfaces_snapshot_errors_unchanged() {
        let resolver = Resolver::new(Arc::new(FailingDb(corrupt())), Arc::new(UnreachableDb));
        let err = resolver.resolve("0240", Mode::Offline).await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Source(SourceError::SnapshotCorrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_online_mode_never_touches_snapshot() {
        let resolver = Resolver::new(Arc::new(UnreachableDb), db(&[("0240", "K64F")]));
        let resolution = resolver.resolve("0240", Mode::Online).await.unwrap();
        assert_eq!(resolution.source, Source::Online);
    }

    #[tokio::test]
    async fn test_online_mode_surfaces_registry_errors_unchanged() {
        let resolver = Resolver::new(Arc::new(UnreachableDb), Arc::new(FailingDb(unavailable())));
        let err = resolver.resolve("0240", Mode::Online).await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Source(SourceError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_auto_offline_hit_skips_registry() {
        let resolver = Resolver::new(db(&[("0240", "K64F")]), Arc::new(UnreachableDb));
        let resolution = resolver.resolve("0240", Mode::Auto).await.unwrap();
        assert_eq!(resolution.source, Source::Offline);
    }

    #[tokio::test]
    async fn test_auto_falls_through_on_miss() {
        let resolver = Resolver::new(db(&[]), db(&[("0455", "NUCLEO_F072RB")]));
        let resolution = resolver.resolve("0455", Mode::Auto).await.unwrap();
        assert_eq!(resolution.record.build_target, "NUCLEO_F072RB");
        assert_eq!(resolution.source, Source::Online);
    }

    #[tokio::test]
    async fn test_auto_registry_miss_is_final() {
        let resolver = Resolver::new(db(&[]), db(&[]));
        let err = resolver.resolve("9999", Mode::Auto).await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Source(SourceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_auto_registry_masks_broken_snapshot() {
        let resolver = Resolver::new(Arc::new(FailingDb(corrupt())), db(&[("0240", "K64F")]));
        let resolution = resolver.resolve("0240", Mode::Auto).await.unwrap();
        assert_eq!(resolution.source, Source::Online);
    }

    #[tokio::test]
    async fn test_auto_combines_snapshot_and_registry_failures() {
        let resolver = Resolver::new(
            Arc::new(FailingDb(corrupt())),
            Arc::new(FailingDb(unavailable())),
        );
        let err = resolver.resolve("0240", Mode::Auto).await.unwrap_err();
        match err {
            ResolveError::Unavailable { offline, online } => {
                assert_eq!(offline, corrupt());
                assert_eq!(online, unavailable());
            }
            other => panic!("expected a combined failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_auto_missing_snapshot_also_combines() {
        let missing = SourceError::SnapshotMissing {
            reason: "no such file".to_string(),
        };
        let resolver = Resolver::new(
            Arc::new(FailingDb(missing.clone())),
            Arc::new(FailingDb(unavailable())),
        );
        let err = resolver.resolve("0240", Mode::Auto).await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Unavailable { offline, .. } if offline == missing
        ));
    }

    #[tokio::test]
    async fn test_auto_miss_then_unavailable_surfaces_plain() {
        // Registry unavailability after an ordinary snapshot miss is
        // not a combined failure; the snapshot itself was fine.
        let resolver = Resolver::new(db(&[]), Arc::new(FailingDb(unavailable())));
        let err = resolver.resolve("0240", Mode::Auto).await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Source(SourceError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_auto_broken_snapshot_then_registry_miss_stays_not_found() {
        let resolver = Resolver::new(Arc::new(FailingDb(corrupt())), db(&[]));
        let err = resolver.resolve("9999", Mode::Auto).await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Source(SourceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_auto_malformed_registry_record_is_hard_error() {
        let malformed = SourceError::MalformedResponse {
            reason: "entry \"0240\": record \"0240\" has no build target".to_string(),
        };
        let resolver = Resolver::new(db(&[]), Arc::new(FailingDb(malformed)));
        let err = resolver.resolve("0240", Mode::Auto).await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Source(SourceError::MalformedResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_product_code_is_not_found() {
        let resolver = Resolver::new(Arc::new(UnreachableDb), Arc::new(UnreachableDb));
        let err = resolver.resolve("   ", Mode::Auto).await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Source(SourceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let resolver = Resolver::new(db(&[("0240", "K64F")]), Arc::new(UnreachableDb));
        let first = resolver.resolve("0240", Mode::Auto).await.unwrap();
        let second = resolver.resolve("0240", Mode::Auto).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_snapshot_backed_resolution() {
        use crate::database::OfflineStore;
        use crate::snapshot::Snapshot;

        let store = OfflineStore::new(Snapshot::from_json(
            r#"{
                "targets": {
                    "0123": { "build_target": "K64F", "attributes": { "ram_kb": 256 } }
                }
            }"#,
        ));
        let resolver = Resolver::new(Arc::new(store), Arc::new(UnreachableDb));

        let resolution = resolver.resolve("0123", Mode::Auto).await.unwrap();
        assert_eq!(resolution.source, Source::Offline);
        assert_eq!(resolution.record.product_code, "0123");
        assert_eq!(resolution.record.build_target, "K64F");
        assert_eq!(resolution.record.attributes["ram_kb"], serde_json::json!(256));

        let err = resolver.resolve("9999", Mode::Offline).await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Source(SourceError::NotFound { .. })
        ));
    }

    #[test]
    fn test_mode_parses_any_casing() {
        assert_eq!("offline".parse::<Mode>().unwrap(), Mode::Offline);
        assert_eq!("ONLINE".parse::<Mode>().unwrap(), Mode::Online);
        assert_eq!(" Auto ".parse::<Mode>().unwrap(), Mode::Auto);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!("sometimes".parse::<Mode>().is_err());
        assert_eq!(Mode::default(), Mode::Auto);
    }
}
