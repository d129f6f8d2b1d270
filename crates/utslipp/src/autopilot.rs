//! Direct estimation path
//!
//! Single-shot alternative to the agent loop: classify the measurement,
//! send the raw activity text to the free-text estimation endpoint once,
//! and hand the payload back. No retry, no pagination, no fallback, and no
//! shared state with the agent path.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::climatiq::{ClimatiqClient, ClimatiqError};
use crate::measurements::{Measurement, RawMeasurement};

/// The one upstream call the direct path makes. Seam for testing the
/// forwarding behavior without a network.
#[async_trait]
pub trait TextEstimator: Send + Sync {
    async fn estimate_from_text(
        &self,
        text: &str,
        measurement: &Measurement,
    ) -> Result<Value, ClimatiqError>;
}

#[async_trait]
impl TextEstimator for ClimatiqClient {
    async fn estimate_from_text(
        &self,
        text: &str,
        measurement: &Measurement,
    ) -> Result<Value, ClimatiqError> {
        ClimatiqClient::estimate_from_text(self, text, measurement).await
    }
}

pub struct DirectEstimator {
    client: Arc<dyn TextEstimator>,
}

impl DirectEstimator {
    pub fn new(client: Arc<dyn TextEstimator>) -> Self {
        Self { client }
    }

    /// Validate and convert the measurement, then make one estimation call.
    /// The raw payload is returned untouched; an upstream error body is the
    /// caller's to present.
    pub async fn estimate(
        &self,
        activity: &str,
        measurement: &RawMeasurement,
    ) -> Result<Value, ClimatiqError> {
        if activity.trim().is_empty() {
            return Err(ClimatiqError::InvalidMeasurement(
                "activity description must not be empty".to_string(),
            ));
        }
        let converted = Measurement::convert(measurement)
            .map_err(|e| ClimatiqError::InvalidMeasurement(e.to_string()))?;

        tracing::debug!(activity = %activity, "direct estimation call");
        self.client.estimate_from_text(activity, &converted).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UtslippConfig;

    struct CannedEstimator {
        payload: Value,
    }

    #[async_trait]
    impl TextEstimator for CannedEstimator {
        async fn estimate_from_text(
            &self,
            _text: &str,
            _measurement: &Measurement,
        ) -> Result<Value, ClimatiqError> {
            Ok(self.payload.clone())
        }
    }

    fn estimator() -> DirectEstimator {
        let client = Arc::new(ClimatiqClient::new(UtslippConfig::new("test-key")).unwrap());
        DirectEstimator::new(client)
    }

    fn litres(amount: f64) -> RawMeasurement {
        RawMeasurement {
            amount,
            unit: "L".to_string(),
            domain: "VOLUME".to_string(),
        }
    }

    #[tokio::test]
    async fn malformed_measurement_fails_before_any_network_call() {
        let raw = RawMeasurement {
            amount: 1.0,
            unit: "kg".to_string(),
            domain: "MASS".to_string(),
        };
        let err = estimator().estimate("Diesel, 200 L", &raw).await.unwrap_err();
        assert!(matches!(err, ClimatiqError::InvalidMeasurement(_)));
    }

    #[tokio::test]
    async fn empty_activity_is_rejected() {
        let err = estimator().estimate("  ", &litres(200.0)).await.unwrap_err();
        assert!(matches!(err, ClimatiqError::InvalidMeasurement(_)));
    }

    #[tokio::test]
    async fn payload_is_forwarded_unchanged() {
        let payload = serde_json::json!({
            "co2e": 512.3,
            "co2e_unit": "kg",
            "estimate_trail": [{ "activity_id": "fuel-type_diesel", "share": 1.0 }],
        });
        let direct = DirectEstimator::new(Arc::new(CannedEstimator { payload: payload.clone() }));

        let got = direct.estimate("Diesel, 200 L", &litres(200.0)).await.unwrap();
        assert_eq!(got, payload);
    }

    #[tokio::test]
    async fn upstream_error_body_is_forwarded_not_raised() {
        let payload = serde_json::json!({
            "error": "bad_request",
            "error_message": "could not match the activity text",
        });
        let direct = DirectEstimator::new(Arc::new(CannedEstimator { payload: payload.clone() }));

        let got = direct.estimate("Mystery goo", &litres(1.0)).await.unwrap();
        assert_eq!(got, payload);
    }
}
