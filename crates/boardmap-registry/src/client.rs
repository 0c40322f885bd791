//! HTTP client for the online target registry
//!
//! The registry serves the full target listing as a JSON envelope:
//! `{ "data": [ { "attributes": { "product_code": ..., "board_type":
//! ..., "name": ..., ... } } ] }`. Matching against a product code
//! happens client-side over that listing. Private boards require an
//! access token, sent as a bearer Authorization header.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use boardmap_core::{RecordError, SourceError, TargetDatabase, TargetRecord};

/// Default registry endpoint.
pub const REGISTRY_API: &str = "https://os.mbed.com/api/v4/targets";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client for the online target registry.
pub struct RegistryClient {
    client: reqwest::Client,
    url: String,
    auth_token: Option<String>,
}

impl RegistryClient {
    /// Create a client for the default registry endpoint.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_url(
            REGISTRY_API,
            None,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Create a client for a specific endpoint, access token and
    /// timeout. The timeout bounds every request; timeouts surface as
    /// unavailable, never as an indefinite block.
    pub fn with_url(
        url: &str,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            auth_token,
        })
    }

    /// Fetch the full registry listing.
    ///
    /// The registry also lists entries that are not boards (no product
    /// code) and occasionally entries with incomplete target data;
    /// both are skipped with a warning rather than failing the whole
    /// listing.
    pub async fn fetch_all(&self) -> Result<Vec<TargetRecord>, SourceError> {
        let body = self.get().await?;
        let (records, skipped) = collect_records(parse_listing(&body)?);
        if skipped > 0 {
            debug!(skipped, "registry entries without usable target data");
        }
        Ok(records)
    }

    async fn get(&self) -> Result<String, SourceError> {
        debug!(url = %self.url, "querying the online target registry");

        let mut request = self.client.get(&self.url);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                format!("request to {} timed out", self.url)
            } else {
                format!("request to {} failed: {e}", self.url)
            };
            SourceError::Unavailable { reason }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            warn!(
                url = %self.url,
                "authentication failed; check the configured access token"
            );
        }
        if !status.is_success() {
            return Err(SourceError::Unavailable {
                reason: format!("registry returned HTTP {status} from {}", self.url),
            });
        }

        response.text().await.map_err(|e| SourceError::Unavailable {
            reason: format!("failed to read registry response: {e}"),
        })
    }
}

#[async_trait]
impl TargetDatabase for RegistryClient {
    async fn find(&self, product_code: &str) -> Result<TargetRecord, SourceError> {
        let body = self.get().await?;
        select_record(&body, product_code)
    }
}

/// One entry of the registry listing. Everything of interest lives
/// under `attributes`; unknown attributes ride along into the record.
#[derive(Debug, Deserialize)]
struct ApiTarget {
    #[serde(default)]
    attributes: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ApiListing {
    data: Vec<ApiTarget>,
}

impl ApiTarget {
    fn product_code(&self) -> Option<&str> {
        self.attributes
            .get("product_code")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }

    /// Convert into a record. The identifying attributes move into
    /// their dedicated fields; whatever else the registry sent stays
    /// in the open attribute map.
    fn into_record(mut self, product_code: String) -> Result<TargetRecord, RecordError> {
        self.attributes.remove("product_code");

        let build_target = match self.attributes.remove("board_type") {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };
        let board_name = match self.attributes.remove("name") {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };

        TargetRecord::new(product_code, build_target, board_name, self.attributes)
    }
}

/// Convert listing entries into records, skipping entries without a
/// product code or with incomplete target data. Returns the records
/// and the skip count.
fn collect_records(entries: Vec<ApiTarget>) -> (Vec<TargetRecord>, usize) {
    let mut records = Vec::with_capacity(entries.len());
    let mut skipped = 0usize;
    for entry in entries {
        let Some(product_code) = entry.product_code().map(str::to_string) else {
            skipped += 1;
            continue;
        };
        match entry.into_record(product_code) {
            Ok(record) => records.push(record),
            Err(err) => {
                warn!(error = %err, "skipping registry entry with incomplete target data");
                skipped += 1;
            }
        }
    }
    (records, skipped)
}

/// Parse the registry response body into its entry list.
fn parse_listing(body: &str) -> Result<Vec<ApiTarget>, SourceError> {
    let listing: ApiListing =
        serde_json::from_str(body).map_err(|e| SourceError::MalformedResponse {
            reason: format!("unexpected registry payload: {e}"),
        })?;
    Ok(listing.data)
}

/// Pick the record matching a product code out of a response body.
///
/// A matching entry that fails record validation is malformed, never a
/// miss; folding it into not-found would hide data-quality regressions
/// in the registry.
fn select_record(body: &str, product_code: &str) -> Result<TargetRecord, SourceError> {
    let wanted = product_code.trim();
    for entry in parse_listing(body)? {
        let Some(code) = entry.product_code() else {
            continue;
        };
        if !code.eq_ignore_ascii_case(wanted) {
            continue;
        }
        let code = code.to_string();
        return entry
            .into_record(code)
            .map_err(|e| SourceError::MalformedResponse {
                reason: e.to_string(),
            });
    }
    Err(SourceError::NotFound {
        product_code: wanted.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LISTING: &str = r#"{
        "data": [
            {
                "attributes": {
                    "product_code": "0240",
                    "board_type": "K64F",
                    "name": "FRDM-K64F",
                    "slug": "frdm-k64f",
                    "features": { "mbed_enabled": ["Basic"] }
                }
            },
            {
                "attributes": {
                    "board_type": "MODULE_ONLY",
                    "name": "Not a board"
                }
            },
            {
                "attributes": {
                    "product_code": "0311",
                    "board_type": "",
                    "name": "Broken entry"
                }
            }
        ]
    }"#;

    #[test]
    fn test_select_nominal_entry() {
        let record = select_record(LISTING, "0240").unwrap();
        assert_eq!(record.product_code, "0240");
        assert_eq!(record.build_target, "K64F");
        assert_eq!(record.board_name.as_deref(), Some("FRDM-K64F"));
        // Attributes the registry added ride along untouched.
        assert_eq!(record.attributes["slug"], json!("frdm-k64f"));
        assert_eq!(
            record.attributes["features"],
            json!({ "mbed_enabled": ["Basic"] })
        );
    }

    #[test]
    fn test_select_is_case_insensitive() {
        let body = r#"{
            "data": [
                { "attributes": { "product_code": "01aB", "board_type": "LPC1768" } }
            ]
        }"#;
        let record = select_record(body, "01AB").unwrap();
        assert_eq!(record.product_code, "01aB");
    }

    #[test]
    fn test_select_unknown_code_is_not_found() {
        let err = select_record(LISTING, "9999").unwrap_err();
        assert_eq!(
            err,
            SourceError::NotFound {
                product_code: "9999".to_string()
            }
        );
    }

    #[test]
    fn test_matching_entry_with_no_build_target_is_malformed() {
        let err = select_record(LISTING, "0311").unwrap_err();
        assert!(matches!(err, SourceError::MalformedResponse { .. }));
    }

    #[test]
    fn test_body_without_data_key_is_malformed() {
        let err = select_record(r#"{ "results": [] }"#, "0240").unwrap_err();
        assert!(matches!(err, SourceError::MalformedResponse { .. }));
    }

    #[test]
    fn test_body_that_is_not_json_is_malformed() {
        let err = select_record("<html>rate limited</html>", "0240").unwrap_err();
        assert!(matches!(err, SourceError::MalformedResponse { .. }));
    }

    #[test]
    fn test_full_listing_skips_unusable_entries() {
        // The module-only entry has no product code and the "0311"
        // entry has no build target; neither fails the listing.
        let (records, skipped) = collect_records(parse_listing(LISTING).unwrap());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].product_code, "0240");
        assert_eq!(skipped, 2);
    }
}
