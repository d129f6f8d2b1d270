//! Measurement domains and unit conversion
//!
//! The activity form submits a raw `{amount, unit, domain}` triple; the
//! estimation API wants one of four domain-specific parameter shapes. The
//! conversion is pure and validated: an unknown domain or a unit that does
//! not belong to the domain is rejected before any upstream call is made.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeasurementError {
    #[error("unknown measurement domain: {0}")]
    UnknownDomain(String),

    #[error("unit '{unit}' is not valid for domain {domain:?}")]
    UnitMismatch { domain: Domain, unit: String },

    #[error("amount must be a finite number")]
    NonFiniteAmount,
}

/// Measurement domain, as submitted by the activity form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Domain {
    Energy,
    Volume,
    Money,
    Number,
}

impl Domain {
    pub fn parse(s: &str) -> Result<Self, MeasurementError> {
        match s.to_ascii_uppercase().as_str() {
            "ENERGY" => Ok(Self::Energy),
            "VOLUME" => Ok(Self::Volume),
            "MONEY" => Ok(Self::Money),
            "NUMBER" => Ok(Self::Number),
            other => Err(MeasurementError::UnknownDomain(other.to_string())),
        }
    }

    /// Value passed as the catalog's `unit_type` filter.
    pub fn unit_type_filter(&self) -> &'static str {
        match self {
            Self::Energy => "energy",
            Self::Volume => "volume",
            Self::Money => "money",
            Self::Number => "number",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnergyUnit {
    #[serde(rename = "kWh")]
    KWh,
    #[serde(rename = "MWh")]
    MWh,
}

impl EnergyUnit {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "kwh" => Some(Self::KWh),
            "mwh" => Some(Self::MWh),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeUnit {
    #[serde(rename = "m3")]
    CubicMetre,
    #[serde(rename = "L")]
    Litre,
}

impl VolumeUnit {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "m3" | "m³" => Some(Self::CubicMetre),
            "l" => Some(Self::Litre),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoneyUnit {
    Nok,
    Eur,
    Usd,
}

impl MoneyUnit {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nok" => Some(Self::Nok),
            "eur" => Some(Self::Eur),
            "usd" => Some(Self::Usd),
            _ => None,
        }
    }
}

/// The raw triple submitted by the activity form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMeasurement {
    pub amount: f64,
    pub unit: String,
    pub domain: String,
}

/// A validated measurement, serializing to the exact parameter shape the
/// estimation API expects for its domain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Measurement {
    Energy { energy: f64, energy_unit: EnergyUnit },
    Volume { volume: f64, volume_unit: VolumeUnit },
    Money { money: f64, money_unit: MoneyUnit },
    Number { number: f64 },
}

impl Measurement {
    /// Convert a raw form triple into a typed measurement.
    ///
    /// Pure and idempotent: the same input always yields the same output.
    /// Unknown domains are an error rather than silently treated as a
    /// dimensionless count.
    pub fn convert(raw: &RawMeasurement) -> Result<Self, MeasurementError> {
        if !raw.amount.is_finite() {
            return Err(MeasurementError::NonFiniteAmount);
        }
        let domain = Domain::parse(&raw.domain)?;
        let mismatch = || MeasurementError::UnitMismatch {
            domain,
            unit: raw.unit.clone(),
        };
        match domain {
            Domain::Energy => {
                let energy_unit = EnergyUnit::parse(&raw.unit).ok_or_else(mismatch)?;
                Ok(Self::Energy { energy: raw.amount, energy_unit })
            }
            Domain::Volume => {
                let volume_unit = VolumeUnit::parse(&raw.unit).ok_or_else(mismatch)?;
                Ok(Self::Volume { volume: raw.amount, volume_unit })
            }
            Domain::Money => {
                let money_unit = MoneyUnit::parse(&raw.unit).ok_or_else(mismatch)?;
                Ok(Self::Money { money: raw.amount, money_unit })
            }
            Domain::Number => Ok(Self::Number { number: raw.amount }),
        }
    }

    pub fn domain(&self) -> Domain {
        match self {
            Self::Energy { .. } => Domain::Energy,
            Self::Volume { .. } => Domain::Volume,
            Self::Money { .. } => Domain::Money,
            Self::Number { .. } => Domain::Number,
        }
    }

    pub fn amount(&self) -> f64 {
        match self {
            Self::Energy { energy, .. } => *energy,
            Self::Volume { volume, .. } => *volume,
            Self::Money { money, .. } => *money,
            Self::Number { number } => *number,
        }
    }
}
