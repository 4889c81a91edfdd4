use chrono::NaiveDate;
use kilometrik_core::service::{
    compute_trip_amount, replay_trips, EngineOptions, PriorHistory, TripAmountInput,
    TripAmountService, YearReplayInput,
};
use kilometrik_core::calculator::AffineConstantPolicy;
use kilometrik_core::rates::{RateTableRegistry, YearFallback};
use kilometrik_core::tracker::replay;
use kilometrik_core::{FuelType, MileageError, Trip, Vehicle};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ===========================================================================
// Fixtures
// ===========================================================================

fn peugeot() -> Vehicle {
    Vehicle {
        id: "veh-ab123cd".into(),
        fiscal_hp: 6,
        fuel_type: FuelType::Essence,
        label: Some("Peugeot 308".into()),
    }
}

fn trip(id: &str, date: (i32, u32, u32), km: Decimal, round_trip: bool) -> Trip {
    Trip {
        id: id.into(),
        vehicle_id: "veh-ab123cd".into(),
        user_id: "demo".into(),
        date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
        distance_km: km,
        round_trip,
        purpose: Some("RDV client".into()),
    }
}

fn year_of_trips() -> Vec<Trip> {
    vec![
        trip("t01", (2025, 1, 15), dec!(28.4), false),
        trip("t02", (2025, 1, 20), dec!(45.2), true),
        trip("t03", (2025, 2, 3), dec!(1200), true),
        trip("t04", (2025, 3, 11), dec!(1150), true),
        trip("t05", (2025, 3, 11), dec!(600.55), false),
        trip("t06", (2025, 6, 30), dec!(0), false),
        trip("t07", (2025, 9, 1), dec!(3000), true),
    ]
}

// ===========================================================================
// Trip amount service
// ===========================================================================

#[test]
fn test_demo_trips_with_builtin_scale() {
    let reg = RateTableRegistry::builtin();
    let service = TripAmountService::new(&reg, "FR");
    let trips = year_of_trips();

    let first = service
        .compute_amount(&peugeot(), &trips[0], PriorHistory::Trips(&[]))
        .unwrap();
    assert_eq!(first.amount_eur, dec!(18.89));

    let second = service
        .compute_amount(&peugeot(), &trips[1], PriorHistory::Trips(&trips[..1]))
        .unwrap();
    assert_eq!(second.effective_distance_km, dec!(90.4));
    assert_eq!(second.prior_distance_km, dec!(28.4));
    assert_eq!(second.amount_eur, dec!(60.12));
    assert_eq!(second.new_state.distance_so_far_km, dec!(118.8));
}

#[test]
fn test_replay_is_idempotent_across_sessions() {
    let reg = RateTableRegistry::builtin();
    let trips = year_of_trips();

    let first = TripAmountService::new(&reg, "FR")
        .replay_year(&peugeot(), 2025, &trips)
        .unwrap();
    let second = TripAmountService::new(&reg, "FR")
        .replay_year(&peugeot(), 2025, &trips)
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(first.final_state, replay("veh-ab123cd", 2025, &trips).unwrap());
}

#[test]
fn test_replay_matches_trip_by_trip_ingestion() {
    let reg = RateTableRegistry::builtin();
    let service = TripAmountService::new(&reg, "FR");
    let trips = year_of_trips();
    let replayed = service.replay_year(&peugeot(), 2025, &trips).unwrap();

    let mut state = None;
    for (i, t) in trips.iter().enumerate() {
        let amount = match &state {
            None => service.compute_amount(&peugeot(), t, PriorHistory::Trips(&[])),
            Some(s) => service.compute_amount(&peugeot(), t, PriorHistory::State(s)),
        }
        .unwrap();
        assert_eq!(amount, replayed.trips[i]);
        state = Some(amount.new_state);
    }
}

#[test]
fn test_crossing_5000_km_in_year() {
    let reg = RateTableRegistry::builtin();
    let replayed = TripAmountService::new(&reg, "FR")
        .replay_year(&peugeot(), 2025, &year_of_trips())
        .unwrap();
    // 118.8 + 2400 + 2300 = 4818.8 before t05, which crosses 5000
    let t05 = &replayed.trips[4];
    assert_eq!(t05.prior_distance_km, dec!(4818.8));
    assert_eq!(t05.portions.len(), 2);
    assert_eq!(t05.portions[0].distance_km, dec!(181.2));
    assert_eq!(t05.portions[1].distance_km, dec!(419.35));
    assert_eq!(t05.portions[1].constant_applied, Some(dec!(1457)));
    // 181.2 x 0.665 + 419.35 x 0.374 + 1457 = 120.498 + 156.8369 + 1457
    assert_eq!(t05.amount_eur, dec!(1734.33));

    let zero = &replayed.trips[5];
    assert_eq!(zero.amount_eur, dec!(0));
    assert_eq!(zero.new_state, t05.new_state);
}

#[test]
fn test_threshold_policy_charges_constant_once() {
    let reg = RateTableRegistry::builtin();
    let options = EngineOptions {
        affine_constant_policy: AffineConstantPolicy::OnThresholdCrossing,
        year_fallback: YearFallback::Exact,
    };
    let per_entry = TripAmountService::new(&reg, "FR")
        .replay_year(&peugeot(), 2025, &year_of_trips())
        .unwrap();
    let threshold = TripAmountService::new(&reg, "FR")
        .with_options(options)
        .replay_year(&peugeot(), 2025, &year_of_trips())
        .unwrap();
    // t07 sits inside the affine segment: charged once more per entry
    assert_eq!(
        per_entry.total_amount_eur - threshold.total_amount_eur,
        dec!(1457)
    );
    assert_eq!(per_entry.final_state, threshold.final_state);
}

#[test]
fn test_out_of_order_history_rejected() {
    let reg = RateTableRegistry::builtin();
    let mut trips = year_of_trips();
    trips.swap(1, 2);
    let err = TripAmountService::new(&reg, "FR")
        .replay_year(&peugeot(), 2025, &trips)
        .unwrap_err();
    assert!(matches!(err, MileageError::OutOfOrderTrip { ref trip_id, .. } if trip_id == "t02"));
}

#[test]
fn test_new_trip_dated_before_state_rejected() {
    let reg = RateTableRegistry::builtin();
    let trips = year_of_trips();
    let state = replay("veh-ab123cd", 2025, &trips).unwrap();
    let backdated = trip("t08", (2025, 2, 1), dec!(10), false);
    let err = TripAmountService::new(&reg, "FR")
        .compute_amount(&peugeot(), &backdated, PriorHistory::State(&state))
        .unwrap_err();
    assert!(matches!(err, MileageError::OutOfOrderTrip { .. }));
}

// ===========================================================================
// JSON façades
// ===========================================================================

#[test]
fn test_trip_amount_from_json_input() {
    let reg = RateTableRegistry::builtin();
    let input: TripAmountInput = serde_json::from_str(
        r#"{
            "vehicle": { "id": "v1", "fiscal_hp": 6, "fuel_type": "diesel" },
            "trip": { "id": "t3", "vehicle_id": "v1", "date": "2025-05-02",
                      "distance_km": "300", "round_trip": true },
            "cumulative_state": { "vehicle_id": "v1", "year": 2025,
                                  "distance_so_far_km": "4800", "last_trip_date": "2025-05-01" }
        }"#,
    )
    .unwrap();
    assert_eq!(input.country, "FR");
    let out = compute_trip_amount(&reg, &input).unwrap();
    // 200 x 0.665 + 400 x 0.374 + 1457
    assert_eq!(out.result.amount_eur, dec!(1739.60));
    assert!(out.warnings.is_empty());
    assert_eq!(out.result.new_state.distance_so_far_km, dec!(5400));
}

#[test]
fn test_replay_with_fallback_warns() {
    let reg = RateTableRegistry::builtin();
    let input = YearReplayInput {
        country: "FR".into(),
        vehicle: peugeot(),
        year: Some(2027),
        trips: vec![trip("n1", (2027, 1, 4), dec!(100), false)],
        sort: false,
        options: EngineOptions {
            year_fallback: YearFallback::NearestPrior,
            ..EngineOptions::default()
        },
    };
    let out = replay_trips(&reg, &input).unwrap();
    assert_eq!(out.result.rate_table.year, 2025);
    assert!(out.warnings.iter().any(|w| w.contains("nearest prior")));
    assert_eq!(out.result.total_amount_eur, dec!(66.50));
}

// ===========================================================================
// Same-day insertion order
// ===========================================================================

fn clio() -> Vehicle {
    Vehicle {
        fiscal_hp: 3,
        label: Some("Clio".into()),
        ..peugeot()
    }
}

fn same_day_year(legs: [Decimal; 2]) -> Vec<Trip> {
    vec![
        trip("base", (2025, 4, 1), dec!(4900), false),
        trip("first", (2025, 4, 2), legs[0], false),
        trip("second", (2025, 4, 2), legs[1], false),
    ]
}

#[test]
fn test_default_policy_total_depends_on_same_day_order() {
    let reg = RateTableRegistry::builtin();
    let service = TripAmountService::new(&reg, "FR");

    let long_first = service
        .replay_year(&clio(), 2025, &same_day_year([dec!(200), dec!(50)]))
        .unwrap();
    let short_first = service
        .replay_year(&clio(), 2025, &same_day_year([dec!(50), dec!(200)]))
        .unwrap();

    // both orders end at 5 150 km; the second trip inside [5000, 20000)
    // is charged the constant again only when it starts inside the segment
    assert_eq!(long_first.final_state, short_first.final_state);
    assert_eq!(long_first.trips[1].amount_eur, dec!(1149.50));
    assert_eq!(long_first.trips[2].amount_eur, dec!(1080.80));
    assert_eq!(long_first.total_amount_eur, dec!(4822.40));
    assert_eq!(short_first.trips[1].amount_eur, dec!(26.45));
    assert_eq!(short_first.trips[2].amount_eur, dec!(1138.85));
    assert_eq!(short_first.total_amount_eur, dec!(3757.40));
    assert_eq!(
        long_first.total_amount_eur - short_first.total_amount_eur,
        dec!(1065)
    );
}

#[test]
fn test_threshold_policy_total_ignores_same_day_order() {
    let reg = RateTableRegistry::builtin();
    let service = TripAmountService::new(&reg, "FR").with_options(EngineOptions {
        affine_constant_policy: AffineConstantPolicy::OnThresholdCrossing,
        ..EngineOptions::default()
    });

    let long_first = service
        .replay_year(&clio(), 2025, &same_day_year([dec!(200), dec!(50)]))
        .unwrap();
    let short_first = service
        .replay_year(&clio(), 2025, &same_day_year([dec!(50), dec!(200)]))
        .unwrap();

    assert_eq!(long_first.total_amount_eur, dec!(3757.40));
    assert_eq!(short_first.total_amount_eur, dec!(3757.40));
}
