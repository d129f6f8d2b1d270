use serde::{Deserialize, Serialize};

/// Process-level configuration for the upstream estimation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtslippConfig {
    /// Bearer token for the catalog/estimation service.
    pub api_key: String,
    /// Region code pinned on every upstream request.
    pub region: String,
    /// Emission-factor data version pin.
    pub data_version: String,
    /// Base URL for the catalog search/estimate endpoints.
    pub data_base_url: String,
    /// URL for the free-text (autopilot) estimation endpoint.
    pub autopilot_url: String,
    /// Fixed catalog page size.
    pub results_per_page: u32,
}

impl UtslippConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            region: "NO".to_string(),
            data_version: "23".to_string(),
            data_base_url: "https://api.climatiq.io/data/v1".to_string(),
            autopilot_url: "https://preview.api.climatiq.io/autopilot/v1-preview3/estimate"
                .to_string(),
            results_per_page: 10,
        }
    }

    /// Load from process env. `CLIMATIQ_API_KEY` is required; region and
    /// data version may be overridden.
    pub fn from_env() -> Result<Self, String> {
        let api_key = std::env::var("CLIMATIQ_API_KEY")
            .map_err(|_| "CLIMATIQ_API_KEY is not set".to_string())?;
        let mut config = Self::new(api_key);
        if let Ok(region) = std::env::var("CLIMATIQ_REGION") {
            config.region = region;
        }
        if let Ok(version) = std::env::var("CLIMATIQ_DATA_VERSION") {
            config.data_version = version;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.api_key.is_empty() {
            return Err("api_key must not be empty".into());
        }
        if self.region.is_empty() {
            return Err("region must not be empty".into());
        }
        if self.data_version.is_empty() {
            return Err("data_version must not be empty".into());
        }
        if self.results_per_page == 0 {
            return Err("results_per_page must be > 0".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = UtslippConfig::new("test-key");
        assert!(config.validate().is_ok());
        assert_eq!(config.region, "NO");
        assert_eq!(config.results_per_page, 10);
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let config = UtslippConfig::new("");
        assert!(config.validate().is_err());
    }
}
