use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::MileageError;
use crate::MileageResult;

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Distances in kilometres, centimetre precision or better.
pub type Km = Decimal;

/// Per-kilometre rate of a segment formula (EUR/km).
pub type Coefficient = Decimal;

/// Amount mode recorded next to each priced trip (indemnités kilométriques).
pub const AMOUNT_MODE_IK: &str = "IK";

/// Currency code
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    EUR,
    Other(String),
}

/// Fuel type of a vehicle. Informational only, never used for rate lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FuelType {
    #[default]
    Essence,
    Diesel,
    Electrique,
    Hybride,
    Gpl,
    Autre,
}

/// A vehicle as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    /// Fiscal horsepower (CV), at least 1
    pub fiscal_hp: u32,
    #[serde(default)]
    pub fuel_type: FuelType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Vehicle {
    pub fn validate(&self) -> MileageResult<()> {
        if self.fiscal_hp < 1 {
            return Err(MileageError::InvalidInput {
                field: "vehicle.fiscal_hp".into(),
                reason: format!("Vehicle {} must have at least 1 CV", self.id),
            });
        }
        Ok(())
    }
}

/// A business trip. The reimbursed amount is computed, never supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    pub vehicle_id: String,
    #[serde(default)]
    pub user_id: String,
    pub date: NaiveDate,
    /// Raw one-way distance as entered
    pub distance_km: Km,
    /// Counted twice for tracking and reimbursement when set
    #[serde(default)]
    pub round_trip: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

impl Trip {
    /// Tax year the trip is accounted in (calendar year of its date).
    pub fn tax_year(&self) -> i32 {
        self.date.year()
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}
