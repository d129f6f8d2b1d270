//! Client for the external emissions-factor catalog and estimation service
//!
//! Three upstream operations: full-text/category search over the activity
//! catalog, CO2e estimation for a chosen activity id, and single-shot
//! estimation from free text (the autopilot preview endpoint). The service
//! is the source of truth for all factor data and arithmetic; nothing is
//! cached or recomputed locally.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::UtslippConfig;
use crate::measurements::Measurement;

#[derive(Debug, Error)]
pub enum ClimatiqError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("unparseable response from {endpoint}: {detail}")]
    Malformed { endpoint: String, detail: String },

    #[error("upstream rejected the request ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("invalid measurement: {0}")]
    InvalidMeasurement(String),

    #[error("no measurement available for calculation")]
    MissingMeasurement,
}

/// One catalog entry returned by search. Identifiers are externally
/// assigned and stable across calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityCandidate {
    pub activity_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sector: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub unit_type: String,
}

/// One page of catalog search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub total_results: u64,
    pub results: Vec<ActivityCandidate>,
}

/// Parameters for one catalog search call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchParams {
    pub query: Option<String>,
    pub category: Option<String>,
    /// 1-based page number.
    pub page: u32,
    /// Server-side unit-type restriction, derived from the measurement
    /// domain. `None` disables the filter.
    pub unit_type: Option<String>,
}

/// Terminal artifact of a successful calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionEstimate {
    pub co2e: f64,
    pub unit: String,
    pub activity_name: String,
    pub activity_id: String,
}

#[derive(Debug, Deserialize)]
struct EstimateResponse {
    co2e: f64,
    co2e_unit: String,
    emission_factor: EstimateFactor,
}

#[derive(Debug, Deserialize)]
struct EstimateFactor {
    name: String,
    activity_id: String,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorBody {
    error: Option<String>,
    error_code: Option<String>,
    error_message: Option<String>,
    message: Option<String>,
}

impl UpstreamErrorBody {
    fn into_rejected(self) -> ClimatiqError {
        let code = self
            .error_code
            .or(self.error)
            .unwrap_or_else(|| "unknown".to_string());
        let message = self
            .error_message
            .or(self.message)
            .unwrap_or_else(|| "upstream returned an error payload".to_string());
        ClimatiqError::Rejected { code, message }
    }
}

pub struct ClimatiqClient {
    http: reqwest::Client,
    config: UtslippConfig,
}

impl ClimatiqClient {
    pub fn new(config: UtslippConfig) -> Result<Self, ClimatiqError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &UtslippConfig {
        &self.config
    }

    /// Search the emissions-factor catalog. Page size is fixed; an empty
    /// result set is a successful response, while any non-2xx status or
    /// transport failure is an error.
    pub async fn search(&self, params: &SearchParams) -> Result<SearchPage, ClimatiqError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(q) = &params.query {
            query.push(("query", q.clone()));
        }
        if let Some(c) = &params.category {
            query.push(("category", c.clone()));
        }
        query.push(("page", params.page.max(1).to_string()));
        if let Some(unit_type) = &params.unit_type {
            query.push(("unit_type", unit_type.clone()));
        }
        query.push(("results_per_page", self.config.results_per_page.to_string()));
        query.push(("data_version", self.config.data_version.clone()));
        query.push(("region", self.config.region.clone()));

        let url = format!("{}/search", self.config.data_base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "catalog search failed");
            return Err(ClimatiqError::Http {
                status: status.as_u16(),
                body: truncate(&body, 300),
            });
        }

        let page: SearchPage = parse_json(&body, &url)?;
        tracing::debug!(
            page = params.page,
            results = page.results.len(),
            total = page.total_results,
            "catalog search ok"
        );
        Ok(page)
    }

    /// Request the externally computed CO2e figure for an activity id at the
    /// given measurement. An error payload in a 2xx body surfaces as
    /// `Rejected` carrying the upstream message.
    pub async fn estimate(
        &self,
        activity_id: &str,
        measurement: &Measurement,
    ) -> Result<EmissionEstimate, ClimatiqError> {
        let body = serde_json::json!({
            "emission_factor": {
                "activity_id": activity_id,
                "data_version": format!("^{}", self.config.data_version),
                "region": self.config.region,
            },
            "parameters": measurement,
        });

        let url = format!("{}/estimate", self.config.data_base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if let Ok(err) = serde_json::from_str::<UpstreamErrorBody>(&text) {
            if err.error.is_some() || err.error_code.is_some() {
                return Err(err.into_rejected());
            }
        }
        if !status.is_success() {
            return Err(ClimatiqError::Http {
                status: status.as_u16(),
                body: truncate(&text, 300),
            });
        }

        let parsed: EstimateResponse = parse_json(&text, &url)?;
        Ok(EmissionEstimate {
            co2e: parsed.co2e,
            unit: parsed.co2e_unit,
            activity_name: parsed.emission_factor.name,
            activity_id: parsed.emission_factor.activity_id,
        })
    }

    /// Single-shot estimation from free text against the autopilot preview
    /// endpoint. The raw payload is forwarded to the caller untouched, so an
    /// upstream error body is returned as-is rather than raised.
    pub async fn estimate_from_text(
        &self,
        text: &str,
        measurement: &Measurement,
    ) -> Result<Value, ClimatiqError> {
        let body = serde_json::json!({
            "text": text,
            "domain": "general",
            "parameters": measurement,
            "region": self.config.region,
        });

        let response = self
            .http
            .post(&self.config.autopilot_url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        match serde_json::from_str::<Value>(&text) {
            Ok(payload) => Ok(payload),
            Err(_) if !status.is_success() => Err(ClimatiqError::Http {
                status: status.as_u16(),
                body: truncate(&text, 300),
            }),
            Err(e) => Err(ClimatiqError::Malformed {
                endpoint: self.config.autopilot_url.clone(),
                detail: format!("{} ({})", truncate(&text, 200), e),
            }),
        }
    }
}

/// Parse a 2xx response body as JSON, with a readable error if the server
/// returned something else (e.g. an HTML error page).
fn parse_json<T: serde::de::DeserializeOwned>(body: &str, endpoint: &str) -> Result<T, ClimatiqError> {
    serde_json::from_str(body).map_err(|e| ClimatiqError::Malformed {
        endpoint: endpoint.to_string(),
        detail: format!("{} ({})", truncate(body, 200), e),
    })
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_page_deserializes() {
        let body = serde_json::json!({
            "total_results": 42,
            "current_page": 1,
            "results": [{
                "activity_id": "electricity-supply_grid-source_residual_mix",
                "name": "Electricity supplied from grid",
                "description": "Residual mix",
                "sector": "Energy",
                "category": "Electricity",
                "unit_type": "energy",
                "source": "AIB"
            }]
        })
        .to_string();

        let page: SearchPage = serde_json::from_str(&body).unwrap();
        assert_eq!(page.total_results, 42);
        assert_eq!(page.results.len(), 1);
        assert_eq!(
            page.results[0].activity_id,
            "electricity-supply_grid-source_residual_mix"
        );
    }

    #[test]
    fn candidate_tolerates_missing_optional_fields() {
        let body = serde_json::json!({
            "activity_id": "some-id",
            "name": "Some activity"
        })
        .to_string();
        let candidate: ActivityCandidate = serde_json::from_str(&body).unwrap();
        assert_eq!(candidate.unit_type, "");
    }

    #[test]
    fn upstream_error_body_maps_to_rejected() {
        let body = serde_json::json!({
            "error": "bad_request",
            "error_code": "unit_mismatch",
            "error_message": "The provided unit is incompatible with this emission factor"
        })
        .to_string();
        let err: UpstreamErrorBody = serde_json::from_str(&body).unwrap();
        match err.into_rejected() {
            ClimatiqError::Rejected { code, message } => {
                assert_eq!(code, "unit_mismatch");
                assert!(message.contains("incompatible"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn malformed_body_is_not_reported_as_an_http_failure() {
        let err = parse_json::<SearchPage>("<html>bad gateway</html>", "https://x/search")
            .unwrap_err();
        match err {
            ClimatiqError::Malformed { endpoint, .. } => {
                assert_eq!(endpoint, "https://x/search");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn estimate_response_deserializes() {
        let body = serde_json::json!({
            "co2e": 123.4,
            "co2e_unit": "kg",
            "co2e_calculation_method": "ar5",
            "emission_factor": {
                "name": "Electricity supplied from grid",
                "activity_id": "electricity-supply_grid-source_residual_mix"
            }
        })
        .to_string();
        let parsed: EstimateResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.co2e, 123.4);
        assert_eq!(parsed.co2e_unit, "kg");
    }
}
