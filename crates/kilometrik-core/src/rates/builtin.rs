use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::rates::table::{Band, HorsepowerRange, RateTable, RateTableKey, Segment};
use crate::types::Currency;

/// Years for which the car barème below is published unchanged.
pub const FRANCE_YEARS: [i32; 2] = [2024, 2025];

// (cv_min, cv_max, up to 5 000 km, 5 001-20 000 km coefficient and constant, over 20 000 km)
const FRANCE_CAR_SCALE: [(u32, Option<u32>, Decimal, Decimal, Decimal, Decimal); 5] = [
    (1, Some(3), dec!(0.529), dec!(0.316), dec!(1065), dec!(0.370)),
    (4, Some(4), dec!(0.606), dec!(0.340), dec!(1330), dec!(0.407)),
    (5, Some(5), dec!(0.636), dec!(0.357), dec!(1395), dec!(0.427)),
    (6, Some(6), dec!(0.665), dec!(0.374), dec!(1457), dec!(0.447)),
    (7, None, dec!(0.697), dec!(0.394), dec!(1515), dec!(0.470)),
];

/// French barème kilométrique for cars, one table per published year.
pub fn france_tables() -> Vec<RateTable> {
    FRANCE_YEARS.iter().filter_map(|&year| france_car_table(year)).collect()
}

/// The car scale keyed to `year`. `None` only if the embedded data were
/// ever edited into an invalid shape.
pub fn france_car_table(year: i32) -> Option<RateTable> {
    let bands = FRANCE_CAR_SCALE
        .iter()
        .map(|&(min, max, low, mid, constant, high)| Band {
            horsepower: HorsepowerRange { min, max },
            segments: vec![
                Segment::linear(dec!(0), Some(dec!(5000)), low),
                Segment::affine(dec!(5000), Some(dec!(20000)), mid, constant),
                Segment::linear(dec!(20000), None, high),
            ],
        })
        .collect();
    RateTable::new(RateTableKey::new("FR", year), Currency::EUR, bands).ok()
}
