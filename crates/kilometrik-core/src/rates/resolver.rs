use crate::error::MileageError;
use crate::rates::table::{Band, RateTable, Segment};
use crate::MileageResult;

/// Select the band of `table` whose horsepower range covers `fiscal_hp`.
pub fn resolve_band(table: &RateTable, fiscal_hp: u32) -> MileageResult<&Band> {
    table
        .bands()
        .iter()
        .find(|b| b.horsepower.contains(fiscal_hp))
        .ok_or_else(|| MileageError::UnsupportedHorsepower {
            country: table.key().country.clone(),
            year: table.key().year,
            fiscal_hp,
        })
}

/// Ordered distance segments applicable to a vehicle of `fiscal_hp` CV.
///
/// A validated table covers every positive horsepower, so a failure here
/// means the vehicle record is bad (0 CV) or the table was built from
/// defective data.
pub fn resolve_segments(table: &RateTable, fiscal_hp: u32) -> MileageResult<&[Segment]> {
    resolve_band(table, fiscal_hp).map(|b| b.segments.as_slice())
}
