//! Target record types

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("record has no product code")]
    MissingProductCode,
    #[error("record {product_code:?} has no build target")]
    MissingBuildTarget { product_code: String },
}

/// A single target entry: the product code a board reports over USB
/// plus the build target name build tooling selects a configuration by.
///
/// Records are validated on construction and carry no behavior beyond
/// field access; all lookup and fallback decisions live in the
/// resolution engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetRecord {
    /// Product code, unique within a database, matched case-insensitively
    pub product_code: String,
    /// Canonical build target name (e.g., "K64F")
    pub build_target: String,
    /// Human-readable board name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_name: Option<String>,
    /// Additional registry attributes; open-ended and additive over time
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl TargetRecord {
    /// Create a validated record.
    ///
    /// Both identifying fields are trimmed; a record left with an empty
    /// product code or build target is rejected rather than produced as
    /// a valid-but-empty result.
    pub fn new(
        product_code: impl Into<String>,
        build_target: impl Into<String>,
        board_name: Option<String>,
        attributes: Map<String, Value>,
    ) -> Result<Self, RecordError> {
        let product_code = product_code.into().trim().to_string();
        if product_code.is_empty() {
            return Err(RecordError::MissingProductCode);
        }

        let build_target = build_target.into().trim().to_string();
        if build_target.is_empty() {
            return Err(RecordError::MissingBuildTarget { product_code });
        }

        let board_name = board_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        Ok(Self {
            product_code,
            build_target,
            board_name,
            attributes,
        })
    }

    /// Compare against a product code, ignoring case and surrounding
    /// whitespace. The record keeps the casing it was stored with.
    pub fn matches_product_code(&self, product_code: &str) -> bool {
        self.product_code
            .eq_ignore_ascii_case(product_code.trim())
    }

    /// Normalized form of the product code, used as an index key.
    pub fn key(&self) -> String {
        normalize_product_code(&self.product_code)
    }
}

impl std::fmt::Display for TargetRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.build_target, self.product_code)
    }
}

/// Normalize a product code for comparison and indexing.
pub fn normalize_product_code(product_code: &str) -> String {
    product_code.trim().to_ascii_uppercase()
}
