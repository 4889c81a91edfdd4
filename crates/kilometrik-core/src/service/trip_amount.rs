use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

use crate::calculator::bracket::{
    annual_allowance, split_amount, AffineConstantPolicy, SegmentPortion,
};
use crate::error::MileageError;
use crate::rates::registry::{RateTableRegistry, YearFallback};
use crate::rates::resolver::resolve_band;
use crate::rates::table::{Band, RateTable, RateTableKey};
use crate::tracker::cumulative::{advance, replay, sort_chronologically, CumulativeState};
use crate::types::*;
use crate::MileageResult;

// ---------------------------------------------------------------------------
// Options and inputs
// ---------------------------------------------------------------------------

/// Policies the caller may opt into. Defaults never guess a year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub affine_constant_policy: AffineConstantPolicy,
    pub year_fallback: YearFallback,
}

/// How the distance driven before a trip is supplied.
#[derive(Debug, Clone, Copy)]
pub enum PriorHistory<'a> {
    /// Every earlier trip of the same (vehicle, year), oldest first
    Trips(&'a [Trip]),
    /// A state already folded over exactly those trips
    State(&'a CumulativeState),
}

fn default_country() -> String {
    "FR".to_string()
}

/// Input for pricing a single trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripAmountInput {
    #[serde(default = "default_country")]
    pub country: String,
    pub vehicle: Vehicle,
    pub trip: Trip,
    /// Earlier trips of the same vehicle and year, in chronological order
    #[serde(default)]
    pub prior_trips: Vec<Trip>,
    /// Pre-folded alternative to `prior_trips`
    #[serde(default)]
    pub cumulative_state: Option<CumulativeState>,
    #[serde(default)]
    pub options: EngineOptions,
}

/// Input for pricing every trip of a vehicle's year in one pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YearReplayInput {
    #[serde(default = "default_country")]
    pub country: String,
    pub vehicle: Vehicle,
    /// Defaults to the tax year of the first trip
    #[serde(default)]
    pub year: Option<i32>,
    pub trips: Vec<Trip>,
    /// Sort trips by date (stable) before replaying
    #[serde(default)]
    pub sort: bool,
    #[serde(default)]
    pub options: EngineOptions,
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// A priced trip, ready to be persisted with its new cumulative state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripAmount {
    pub trip_id: String,
    pub tax_year: i32,
    /// Table actually used (differs from `tax_year` only under a fallback)
    pub rate_table: RateTableKey,
    pub band: String,
    /// Fiscal horsepower snapshot at pricing time
    pub vehicle_cv: u32,
    pub amount_mode: String,
    pub distance_km: Km,
    pub round_trip: bool,
    pub effective_distance_km: Km,
    pub prior_distance_km: Km,
    pub portions: Vec<SegmentPortion>,
    pub unrounded_amount: Money,
    pub amount_eur: Money,
    pub new_state: CumulativeState,
}

/// Every trip of a (vehicle, year) priced in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearReplay {
    pub vehicle_id: String,
    pub year: i32,
    pub rate_table: RateTableKey,
    pub trips: Vec<TripAmount>,
    pub final_state: CumulativeState,
    /// Sum of the rounded per-trip amounts
    pub total_amount_eur: Money,
    /// Legal formula applied once to the whole annual distance
    pub official_annual_allowance: Money,
    /// `official_annual_allowance - total_amount_eur`
    pub regularisation_eur: Money,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Entry point for the persistence layer. Holds no mutable state: callers
/// serialise trip insertion per (vehicle, year) themselves.
#[derive(Debug, Clone)]
pub struct TripAmountService<'a> {
    registry: &'a RateTableRegistry,
    country: String,
    options: EngineOptions,
}

impl<'a> TripAmountService<'a> {
    pub fn new(registry: &'a RateTableRegistry, country: impl Into<String>) -> Self {
        TripAmountService {
            registry,
            country: country.into(),
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Rate table and band for a vehicle in a given tax year.
    pub fn band_for(&self, vehicle: &Vehicle, year: i32) -> MileageResult<(&'a RateTable, &'a Band)> {
        vehicle.validate()?;
        let table = self
            .registry
            .lookup(&self.country, year, self.options.year_fallback)?;
        let band = resolve_band(table, vehicle.fiscal_hp)?;
        Ok((table, band))
    }

    /// Price `trip` given everything driven before it in the same year.
    pub fn compute_amount(
        &self,
        vehicle: &Vehicle,
        trip: &Trip,
        prior: PriorHistory<'_>,
    ) -> MileageResult<TripAmount> {
        check_vehicle(vehicle, trip)?;
        let year = trip.tax_year();
        let (table, band) = self.band_for(vehicle, year)?;

        let state = match prior {
            PriorHistory::Trips(trips) => replay(&vehicle.id, year, trips)?,
            PriorHistory::State(state) => {
                if state.vehicle_id != vehicle.id || state.year != year {
                    return Err(MileageError::InvalidInput {
                        field: "cumulative_state".into(),
                        reason: format!(
                            "State tracks {}/{}, trip {} is {}/{}",
                            state.vehicle_id, state.year, trip.id, vehicle.id, year
                        ),
                    });
                }
                state.clone()
            }
        };

        self.price(vehicle, table, band, &state, trip)
    }

    /// Price every trip of `year` in order. Replaying the same list always
    /// yields the same amounts and final state.
    pub fn replay_year(&self, vehicle: &Vehicle, year: i32, trips: &[Trip]) -> MileageResult<YearReplay> {
        let (table, band) = self.band_for(vehicle, year)?;

        let mut state = CumulativeState::new(vehicle.id.clone(), year);
        let mut priced = Vec::with_capacity(trips.len());
        for trip in trips {
            check_vehicle(vehicle, trip)?;
            let amount = self.price(vehicle, table, band, &state, trip)?;
            state = amount.new_state.clone();
            priced.push(amount);
        }

        let total_amount_eur = priced
            .iter()
            .try_fold(Decimal::ZERO, |acc, t| acc.checked_add(t.amount_eur))
            .ok_or_else(|| total_overflow(vehicle, year))?;
        let official_annual_allowance = annual_allowance(
            &band.horsepower.to_string(),
            &band.segments,
            state.distance_so_far_km,
        )
        .map_err(|e| e.in_table(table.key()))?;
        let regularisation_eur = official_annual_allowance
            .checked_sub(total_amount_eur)
            .ok_or_else(|| total_overflow(vehicle, year))?;

        Ok(YearReplay {
            vehicle_id: vehicle.id.clone(),
            year,
            rate_table: table.key().clone(),
            trips: priced,
            final_state: state,
            total_amount_eur,
            official_annual_allowance,
            regularisation_eur,
        })
    }

    fn price(
        &self,
        vehicle: &Vehicle,
        table: &RateTable,
        band: &Band,
        state: &CumulativeState,
        trip: &Trip,
    ) -> MileageResult<TripAmount> {
        let step = advance(state, trip)?;
        let band_label = band.horsepower.to_string();
        let split = split_amount(
            &band_label,
            &band.segments,
            step.prior_distance_km,
            step.effective_distance_km,
            self.options.affine_constant_policy,
        )
        .map_err(|e| e.in_table(table.key()))?;

        info!(
            trip = %trip.id,
            vehicle = %vehicle.id,
            table = %table.key(),
            band = %band_label,
            effective_km = %step.effective_distance_km,
            amount_eur = %split.amount,
            "priced trip"
        );

        Ok(TripAmount {
            trip_id: trip.id.clone(),
            tax_year: trip.tax_year(),
            rate_table: table.key().clone(),
            band: band_label,
            vehicle_cv: vehicle.fiscal_hp,
            amount_mode: AMOUNT_MODE_IK.to_string(),
            distance_km: trip.distance_km,
            round_trip: trip.round_trip,
            effective_distance_km: step.effective_distance_km,
            prior_distance_km: step.prior_distance_km,
            portions: split.portions,
            unrounded_amount: split.unrounded_amount,
            amount_eur: split.amount,
            new_state: step.state,
        })
    }
}

fn total_overflow(vehicle: &Vehicle, year: i32) -> MileageError {
    MileageError::InvalidInput {
        field: "trips".into(),
        reason: format!(
            "Total amount of vehicle {} for {year} exceeds the supported range",
            vehicle.id
        ),
    }
}

fn check_vehicle(vehicle: &Vehicle, trip: &Trip) -> MileageResult<()> {
    if trip.vehicle_id != vehicle.id {
        return Err(MileageError::InvalidInput {
            field: "trip.vehicle_id".into(),
            reason: format!(
                "Trip {} belongs to vehicle {}, not {}",
                trip.id, trip.vehicle_id, vehicle.id
            ),
        });
    }
    Ok(())
}

fn fallback_warning(requested: i32, used: &RateTableKey) -> Option<String> {
    (used.year != requested).then(|| {
        format!(
            "No rate table for tax year {requested}; nearest prior table {used} was used"
        )
    })
}

// ---------------------------------------------------------------------------
// Envelope façades
// ---------------------------------------------------------------------------

/// Price one trip and wrap the result in the standard output envelope.
pub fn compute_trip_amount(
    registry: &RateTableRegistry,
    input: &TripAmountInput,
) -> MileageResult<ComputationOutput<TripAmount>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let prior = match (&input.cumulative_state, input.prior_trips.is_empty()) {
        (Some(_), false) => {
            return Err(MileageError::InvalidInput {
                field: "cumulative_state".into(),
                reason: "Supply either prior_trips or cumulative_state, not both".into(),
            });
        }
        (Some(state), true) => PriorHistory::State(state),
        (None, _) => PriorHistory::Trips(&input.prior_trips),
    };

    let service = TripAmountService::new(registry, input.country.clone()).with_options(input.options);
    let result = service.compute_amount(&input.vehicle, &input.trip, prior)?;

    warnings.extend(fallback_warning(result.tax_year, &result.rate_table));
    if result.effective_distance_km.is_zero() {
        warnings.push(format!(
            "Trip {} has zero distance: amount is 0.00 and the cumulative distance is unchanged",
            result.trip_id
        ));
    }

    let assumptions = serde_json::json!({
        "country": input.country,
        "vehicle_cv": input.vehicle.fiscal_hp,
        "prior_trips": input.prior_trips.len(),
        "precomputed_state": input.cumulative_state.is_some(),
        "options": input.options,
    });

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Barème kilométrique bracket split on cumulative annual distance",
        &assumptions,
        warnings,
        elapsed,
        result,
    ))
}

/// Price every trip of a vehicle's year and compare with the legal annual formula.
pub fn replay_trips(
    registry: &RateTableRegistry,
    input: &YearReplayInput,
) -> MileageResult<ComputationOutput<YearReplay>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let year = match input.year.or_else(|| input.trips.first().map(Trip::tax_year)) {
        Some(y) => y,
        None => {
            return Err(MileageError::InvalidInput {
                field: "year".into(),
                reason: "A year is required when no trips are supplied".into(),
            });
        }
    };

    let mut trips = input.trips.clone();
    if input.sort {
        sort_chronologically(&mut trips);
    }

    let service = TripAmountService::new(registry, input.country.clone()).with_options(input.options);
    let result = service.replay_year(&input.vehicle, year, &trips)?;

    warnings.extend(fallback_warning(year, &result.rate_table));
    if result.regularisation_eur != Decimal::ZERO {
        warnings.push(format!(
            "Per-trip amounts total {} EUR; the annual formula gives {} EUR",
            result.total_amount_eur, result.official_annual_allowance
        ));
    }

    let assumptions = serde_json::json!({
        "country": input.country,
        "vehicle_cv": input.vehicle.fiscal_hp,
        "year": year,
        "trips": trips.len(),
        "sorted": input.sort,
        "options": input.options,
    });

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Chronological replay of a vehicle's tax year through the barème kilométrique",
        &assumptions,
        warnings,
        elapsed,
        result,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::table::{HorsepowerRange, Segment};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn registry() -> RateTableRegistry {
        let table = RateTable::new(
            RateTableKey::new("FR", 2025),
            Currency::EUR,
            vec![
                Band {
                    horsepower: HorsepowerRange { min: 1, max: Some(5) },
                    segments: vec![Segment::linear(dec!(0), None, dec!(0.5))],
                },
                Band {
                    horsepower: HorsepowerRange { min: 6, max: None },
                    segments: vec![
                        Segment::linear(dec!(0), Some(dec!(5000)), dec!(0.529)),
                        Segment::affine(dec!(5000), Some(dec!(20000)), dec!(0.316), dec!(1065)),
                        Segment::linear(dec!(20000), None, dec!(0.370)),
                    ],
                },
            ],
        )
        .unwrap();
        let mut reg = RateTableRegistry::new();
        reg.insert(table);
        reg
    }

    fn vehicle() -> Vehicle {
        Vehicle {
            id: "veh-308".into(),
            fiscal_hp: 6,
            fuel_type: FuelType::Essence,
            label: Some("Peugeot 308".into()),
        }
    }

    fn trip(id: &str, month: u32, day: u32, km: Km, round_trip: bool) -> Trip {
        Trip {
            id: id.into(),
            vehicle_id: "veh-308".into(),
            user_id: "demo".into(),
            date: NaiveDate::from_ymd_opt(2025, month, day).unwrap(),
            distance_km: km,
            round_trip,
            purpose: None,
        }
    }

    #[test]
    fn test_compute_with_prior_trips() {
        let reg = registry();
        let service = TripAmountService::new(&reg, "FR");
        let prior = vec![trip("a", 1, 10, dec!(4000), false), trip("b", 2, 1, dec!(400), true)];
        let amount = service
            .compute_amount(
                &vehicle(),
                &trip("c", 3, 1, dec!(300), true),
                PriorHistory::Trips(&prior),
            )
            .unwrap();
        assert_eq!(amount.prior_distance_km, dec!(4800));
        assert_eq!(amount.effective_distance_km, dec!(600));
        assert_eq!(amount.amount_eur, dec!(1297.20));
        assert_eq!(amount.new_state.distance_so_far_km, dec!(5400));
        assert_eq!(amount.vehicle_cv, 6);
        assert_eq!(amount.amount_mode, "IK");
        assert_eq!(amount.band, "6+ CV");
    }

    #[test]
    fn test_precomputed_state_matches_trip_history() {
        let reg = registry();
        let service = TripAmountService::new(&reg, "FR");
        let prior = vec![trip("a", 1, 10, dec!(4000), false), trip("b", 2, 1, dec!(400), true)];
        let state = replay("veh-308", 2025, &prior).unwrap();
        let next = trip("c", 3, 1, dec!(300), true);
        let from_trips = service
            .compute_amount(&vehicle(), &next, PriorHistory::Trips(&prior))
            .unwrap();
        let from_state = service
            .compute_amount(&vehicle(), &next, PriorHistory::State(&state))
            .unwrap();
        assert_eq!(from_trips, from_state);
    }

    #[test]
    fn test_state_for_other_vehicle_rejected() {
        let reg = registry();
        let service = TripAmountService::new(&reg, "FR");
        let state = CumulativeState::new("other", 2025);
        let err = service
            .compute_amount(
                &vehicle(),
                &trip("c", 3, 1, dec!(10), false),
                PriorHistory::State(&state),
            )
            .unwrap_err();
        assert!(matches!(err, MileageError::InvalidInput { .. }));
    }

    #[test]
    fn test_unknown_year() {
        let reg = registry();
        let service = TripAmountService::new(&reg, "FR");
        let mut t = trip("c", 3, 1, dec!(10), false);
        t.date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let err = service
            .compute_amount(&vehicle(), &t, PriorHistory::Trips(&[]))
            .unwrap_err();
        assert!(matches!(err, MileageError::UnknownRateTable { year: 2026, .. }));
    }

    #[test]
    fn test_nearest_prior_only_when_requested() {
        let reg = registry();
        let options = EngineOptions {
            year_fallback: YearFallback::NearestPrior,
            ..EngineOptions::default()
        };
        let service = TripAmountService::new(&reg, "FR").with_options(options);
        let mut t = trip("c", 3, 1, dec!(10), false);
        t.date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let amount = service
            .compute_amount(&vehicle(), &t, PriorHistory::Trips(&[]))
            .unwrap();
        assert_eq!(amount.tax_year, 2026);
        assert_eq!(amount.rate_table.year, 2025);
        assert_eq!(amount.new_state.year, 2026);
    }

    #[test]
    fn test_trip_of_other_vehicle_rejected() {
        let reg = registry();
        let service = TripAmountService::new(&reg, "FR");
        let mut t = trip("c", 3, 1, dec!(10), false);
        t.vehicle_id = "someone-else".into();
        let err = service
            .compute_amount(&vehicle(), &t, PriorHistory::Trips(&[]))
            .unwrap_err();
        assert!(matches!(err, MileageError::InvalidInput { .. }));
    }

    #[test]
    fn test_replay_year_totals() {
        let reg = registry();
        let service = TripAmountService::new(&reg, "FR");
        let trips = vec![
            trip("a", 1, 10, dec!(4000), false),
            trip("b", 2, 1, dec!(400), true),
            trip("c", 3, 1, dec!(300), true),
        ];
        let replayed = service.replay_year(&vehicle(), 2025, &trips).unwrap();
        // 2116.00 + 423.20 + 1297.20
        assert_eq!(replayed.total_amount_eur, dec!(3836.40));
        assert_eq!(replayed.final_state.distance_so_far_km, dec!(5400));
        assert_eq!(replayed.official_annual_allowance, dec!(2771.40));
        assert_eq!(replayed.regularisation_eur, dec!(-1065.00));
    }

    #[test]
    fn test_coverage_gap_names_the_table() {
        let table = RateTable::new(
            RateTableKey::new("FR", 2025),
            Currency::EUR,
            vec![Band {
                horsepower: HorsepowerRange { min: 1, max: None },
                segments: vec![Segment::linear(dec!(0), Some(dec!(100)), dec!(0.5))],
            }],
        )
        .unwrap();
        let mut reg = RateTableRegistry::new();
        reg.insert(table);
        let service = TripAmountService::new(&reg, "FR");
        let err = service
            .compute_amount(&vehicle(), &trip("c", 3, 1, dec!(150), false), PriorHistory::Trips(&[]))
            .unwrap_err();
        match err {
            MileageError::SegmentCoverageGap { key, band, from_km, to_km } => {
                assert_eq!(key.as_deref(), Some("FR/2025"));
                assert_eq!(band, "1+ CV");
                assert_eq!(from_km, dec!(100));
                assert_eq!(to_km, dec!(150));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_huge_round_trip_is_rejected_not_panicking() {
        let reg = registry();
        let input = TripAmountInput {
            country: "FR".into(),
            vehicle: vehicle(),
            trip: trip("huge", 3, 1, Decimal::MAX, true),
            prior_trips: vec![],
            cumulative_state: None,
            options: EngineOptions::default(),
        };
        let err = compute_trip_amount(&reg, &input).unwrap_err();
        assert!(matches!(err, MileageError::InvalidInput { ref field, .. } if field == "trip.distance_km"));
    }

    #[test]
    fn test_compute_trip_amount_envelope() {
        let reg = registry();
        let input = TripAmountInput {
            country: "FR".into(),
            vehicle: vehicle(),
            trip: trip("z", 4, 1, dec!(0), false),
            prior_trips: vec![],
            cumulative_state: None,
            options: EngineOptions::default(),
        };
        let out = compute_trip_amount(&reg, &input).unwrap();
        assert_eq!(out.result.amount_eur, dec!(0));
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.metadata.precision, "rust_decimal_128bit");
    }

    #[test]
    fn test_compute_trip_amount_rejects_both_histories() {
        let reg = registry();
        let input = TripAmountInput {
            country: "FR".into(),
            vehicle: vehicle(),
            trip: trip("c", 3, 1, dec!(10), false),
            prior_trips: vec![trip("a", 1, 10, dec!(10), false)],
            cumulative_state: Some(CumulativeState::new("veh-308", 2025)),
            options: EngineOptions::default(),
        };
        assert!(compute_trip_amount(&reg, &input).is_err());
    }

    #[test]
    fn test_replay_trips_sorts_on_request() {
        let reg = registry();
        let input = YearReplayInput {
            country: "FR".into(),
            vehicle: vehicle(),
            year: None,
            trips: vec![trip("late", 6, 1, dec!(10), false), trip("early", 1, 1, dec!(10), false)],
            sort: true,
            options: EngineOptions::default(),
        };
        let out = replay_trips(&reg, &input).unwrap();
        assert_eq!(out.result.trips[0].trip_id, "early");
        assert_eq!(out.result.year, 2025);

        let unsorted = YearReplayInput { sort: false, ..input };
        let err = replay_trips(&reg, &unsorted).unwrap_err();
        assert!(matches!(err, MileageError::OutOfOrderTrip { .. }));
    }

    #[test]
    fn test_replay_trips_requires_year_without_trips() {
        let reg = registry();
        let input = YearReplayInput {
            country: "FR".into(),
            vehicle: vehicle(),
            year: None,
            trips: vec![],
            sort: false,
            options: EngineOptions::default(),
        };
        assert!(matches!(
            replay_trips(&reg, &input),
            Err(MileageError::InvalidInput { .. })
        ));
    }
}
