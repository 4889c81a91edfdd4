use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MileageError;
use crate::types::*;
use crate::MileageResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Running professional distance for one (vehicle, year).
///
/// This is a derived cache: replaying the ordered trip list of the pair
/// always rebuilds the same value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CumulativeState {
    pub vehicle_id: String,
    pub year: i32,
    /// Sum of effective distances of every trip folded so far
    pub distance_so_far_km: Km,
    /// Date of the latest folded trip, used to reject out-of-order input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_trip_date: Option<NaiveDate>,
    #[serde(default)]
    pub trips_counted: u32,
}

impl CumulativeState {
    pub fn new(vehicle_id: impl Into<String>, year: i32) -> Self {
        CumulativeState {
            vehicle_id: vehicle_id.into(),
            year,
            distance_so_far_km: Decimal::ZERO,
            last_trip_date: None,
            trips_counted: 0,
        }
    }
}

/// Result of folding one trip into a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advance {
    /// Cumulative distance before this trip
    pub prior_distance_km: Km,
    /// Distance this trip adds (round trips doubled)
    pub effective_distance_km: Km,
    pub state: CumulativeState,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

fn distance_overflow(trip: &Trip) -> MileageError {
    MileageError::InvalidInput {
        field: "trip.distance_km".into(),
        reason: format!(
            "Trip {} distance {} km exceeds the supported range",
            trip.id, trip.distance_km
        ),
    }
}

/// Counted distance of a trip: doubled for a round trip.
pub fn effective_distance(trip: &Trip) -> MileageResult<Km> {
    if trip.round_trip {
        trip.distance_km
            .checked_mul(Decimal::TWO)
            .ok_or_else(|| distance_overflow(trip))
    } else {
        Ok(trip.distance_km)
    }
}

/// Fold `trip` into `state`, returning the distance accumulated before it
/// and the new state. `state` itself is left untouched.
pub fn advance(state: &CumulativeState, trip: &Trip) -> MileageResult<Advance> {
    if trip.vehicle_id != state.vehicle_id {
        return Err(MileageError::InvalidInput {
            field: "trip.vehicle_id".into(),
            reason: format!(
                "Trip {} belongs to vehicle {}, state tracks vehicle {}",
                trip.id, trip.vehicle_id, state.vehicle_id
            ),
        });
    }
    if trip.tax_year() != state.year {
        return Err(MileageError::InvalidInput {
            field: "trip.date".into(),
            reason: format!(
                "Trip {} is in tax year {}, state tracks year {}",
                trip.id,
                trip.tax_year(),
                state.year
            ),
        });
    }
    if trip.distance_km < Decimal::ZERO {
        return Err(MileageError::NegativeDistance {
            context: format!("trip {}", trip.id),
            distance_km: trip.distance_km,
        });
    }
    if let Some(last_date) = state.last_trip_date {
        if trip.date < last_date {
            return Err(MileageError::OutOfOrderTrip {
                trip_id: trip.id.clone(),
                trip_date: trip.date,
                last_date,
            });
        }
    }

    let prior = state.distance_so_far_km;
    let effective = effective_distance(trip)?;

    if effective.is_zero() {
        return Ok(Advance {
            prior_distance_km: prior,
            effective_distance_km: effective,
            state: state.clone(),
        });
    }

    let next = CumulativeState {
        vehicle_id: state.vehicle_id.clone(),
        year: state.year,
        distance_so_far_km: prior
            .checked_add(effective)
            .ok_or_else(|| distance_overflow(trip))?,
        last_trip_date: Some(trip.date),
        trips_counted: state.trips_counted + 1,
    };
    debug!(
        trip = %trip.id,
        prior_km = %prior,
        added_km = %effective,
        total_km = %next.distance_so_far_km,
        "advanced cumulative distance"
    );

    Ok(Advance {
        prior_distance_km: prior,
        effective_distance_km: effective,
        state: next,
    })
}

/// Rebuild the state of (vehicle, year) from its chronologically ordered trips.
pub fn replay(vehicle_id: &str, year: i32, trips: &[Trip]) -> MileageResult<CumulativeState> {
    trips
        .iter()
        .try_fold(CumulativeState::new(vehicle_id, year), |state, trip| {
            advance(&state, trip).map(|a| a.state)
        })
}

/// Stable sort by date: same-date trips keep their insertion order.
pub fn sort_chronologically(trips: &mut [Trip]) {
    trips.sort_by_key(|t| t.date);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
