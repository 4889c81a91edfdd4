use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::rates::table::RateTableKey;

#[derive(Debug, Error)]
pub enum MileageError {
    #[error("No rate table for country {country}, year {year}")]
    UnknownRateTable { country: String, year: i32 },

    #[error("No band covers {fiscal_hp} CV in rate table {country}/{year}")]
    UnsupportedHorsepower {
        country: String,
        year: i32,
        fiscal_hp: u32,
    },

    #[error(
        "Segments of band {band} in rate table {} do not cover [{from_km}, {to_km}) km",
        .key.as_deref().unwrap_or("?")
    )]
    SegmentCoverageGap {
        /// Table key, attached once the caller knows which table the band came from
        key: Option<String>,
        band: String,
        from_km: Decimal,
        to_km: Decimal,
    },

    #[error("Trip {trip_id} dated {trip_date} presented after a trip dated {last_date}")]
    OutOfOrderTrip {
        trip_id: String,
        trip_date: NaiveDate,
        last_date: NaiveDate,
    },

    #[error("Negative distance {distance_km} km ({context})")]
    NegativeDistance { context: String, distance_km: Decimal },

    #[error("Invalid rate table {key}: {reason}")]
    InvalidRateTable { key: String, reason: String },

    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl MileageError {
    /// Attach the rate table key to a coverage gap raised on a bare band.
    pub fn in_table(self, table: &RateTableKey) -> Self {
        match self {
            MileageError::SegmentCoverageGap {
                key: None,
                band,
                from_km,
                to_km,
            } => MileageError::SegmentCoverageGap {
                key: Some(table.to_string()),
                band,
                from_km,
                to_km,
            },
            other => other,
        }
    }
}

impl From<serde_json::Error> for MileageError {
    fn from(e: serde_json::Error) -> Self {
        MileageError::SerializationError(e.to_string())
    }
}
