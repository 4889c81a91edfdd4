use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

use crate::calculator::bracket::round_money;
use crate::error::MileageError;
use crate::tracker::cumulative::effective_distance;
use crate::types::*;
use crate::MileageResult;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// A trip together with the amount stored for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricedTrip {
    #[serde(flatten)]
    pub trip: Trip,
    pub amount_eur: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripSummaryInput {
    pub trips: Vec<PricedTrip>,
    /// Only count trips of this tax year
    #[serde(default)]
    pub year: Option<i32>,
    /// Last day of the weekly breakdown; defaults to the latest trip date
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
}

/// Number of 7-day windows in the weekly breakdown.
pub const WEEKS_SHOWN: i64 = 8;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastTrip {
    pub trip_id: String,
    pub date: NaiveDate,
    pub distance_km: Km,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthTotals {
    pub year: i32,
    pub month: u32,
    pub trip_count: usize,
    pub km: Km,
    pub amount_eur: Money,
}

/// One 7-day window, `week_start..=week_end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekTotals {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub trip_count: usize,
    pub km: Km,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleTotals {
    pub vehicle_id: String,
    pub trip_count: usize,
    pub km: Km,
    pub amount_eur: Money,
}

/// Dashboard figures for a set of priced trips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripSummary {
    pub trip_count: usize,
    /// Effective km (round trips doubled)
    pub total_km: Km,
    pub total_amount_eur: Money,
    pub last_trip: Option<LastTrip>,
    pub by_month: Vec<MonthTotals>,
    /// The last eight weeks up to `as_of`, oldest first
    pub by_week: Vec<WeekTotals>,
    pub by_vehicle: Vec<VehicleTotals>,
}

#[derive(Default)]
struct Totals {
    trip_count: usize,
    km: Km,
    amount: Money,
}

impl Totals {
    fn add(&mut self, km: Km, amount: Money) -> MileageResult<()> {
        self.km = self.km.checked_add(km).ok_or_else(totals_overflow)?;
        self.amount = self.amount.checked_add(amount).ok_or_else(totals_overflow)?;
        self.trip_count += 1;
        Ok(())
    }
}

fn totals_overflow() -> MileageError {
    MileageError::InvalidInput {
        field: "trips".into(),
        reason: "Summed distance or amount exceeds the supported range".into(),
    }
}

/// Eight consecutive 7-day windows ending on `as_of`, oldest first.
fn weekly_windows(as_of: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    (0..WEEKS_SHOWN)
        .rev()
        .map(|i| {
            let start = as_of - Duration::days(i * 7 + 6);
            (start, start + Duration::days(6))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Aggregate priced trips into totals, a monthly breakdown and per-vehicle
/// totals. Amounts are summed at full precision and rounded once.
pub fn summarize_trips(input: &TripSummaryInput) -> MileageResult<ComputationOutput<TripSummary>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let mut overall = Totals::default();
    let mut months: BTreeMap<(i32, u32), Totals> = BTreeMap::new();
    let mut vehicles: BTreeMap<String, Totals> = BTreeMap::new();
    let mut last_trip: Option<&Trip> = None;
    let mut counted: Vec<(NaiveDate, Km)> = Vec::new();

    for priced in &input.trips {
        let trip = &priced.trip;
        if input.year.is_some_and(|y| y != trip.tax_year()) {
            continue;
        }
        if trip.distance_km < Decimal::ZERO {
            return Err(MileageError::NegativeDistance {
                context: format!("trip {}", trip.id),
                distance_km: trip.distance_km,
            });
        }
        if priced.amount_eur < Decimal::ZERO {
            warnings.push(format!("Trip {} has a negative stored amount", trip.id));
        }

        let km = effective_distance(trip)?;
        overall.add(km, priced.amount_eur)?;
        months
            .entry((trip.date.year(), trip.date.month()))
            .or_default()
            .add(km, priced.amount_eur)?;
        vehicles
            .entry(trip.vehicle_id.clone())
            .or_default()
            .add(km, priced.amount_eur)?;
        counted.push((trip.date, km));

        // later entries win ties: the list is in insertion order
        if last_trip.map_or(true, |l| trip.date >= l.date) {
            last_trip = Some(trip);
        }
    }

    let as_of = input.as_of.or_else(|| last_trip.map(|t| t.date));
    let mut by_week = Vec::new();
    if let Some(as_of) = as_of {
        for (week_start, week_end) in weekly_windows(as_of) {
            let mut week = Totals::default();
            for (_, km) in counted
                .iter()
                .filter(|(date, _)| (week_start..=week_end).contains(date))
            {
                week.add(*km, Decimal::ZERO)?;
            }
            by_week.push(WeekTotals {
                week_start,
                week_end,
                trip_count: week.trip_count,
                km: week.km.round_dp(2),
            });
        }
    }

    let result = TripSummary {
        trip_count: overall.trip_count,
        total_km: overall.km.round_dp(2),
        total_amount_eur: round_money(overall.amount),
        last_trip: last_trip.map(|t| LastTrip {
            trip_id: t.id.clone(),
            date: t.date,
            distance_km: t.distance_km,
        }),
        by_month: months
            .into_iter()
            .map(|((year, month), t)| MonthTotals {
                year,
                month,
                trip_count: t.trip_count,
                km: t.km.round_dp(2),
                amount_eur: round_money(t.amount),
            })
            .collect(),
        by_week,
        by_vehicle: vehicles
            .into_iter()
            .map(|(vehicle_id, t)| VehicleTotals {
                vehicle_id,
                trip_count: t.trip_count,
                km: t.km.round_dp(2),
                amount_eur: round_money(t.amount),
            })
            .collect(),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Dashboard totals over stored trip amounts",
        &serde_json::json!({
            "trips_supplied": input.trips.len(),
            "year": input.year,
            "as_of": as_of,
        }),
        warnings,
        elapsed,
        result,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
