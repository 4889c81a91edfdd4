use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MileageError;
use crate::rates::table::Segment;
use crate::types::*;
use crate::MileageResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// When the fixed term of an affine segment is charged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffineConstantPolicy {
    /// Once per trip touching the segment, except for trips that traverse
    /// the segment from before its start to (at least) its end.
    #[default]
    PerSegmentEntry,
    /// Only by the trip whose range contains the segment start, so at most
    /// once per (vehicle, year).
    OnThresholdCrossing,
}

/// The part of a trip that falls in one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentPortion {
    /// Position of the segment in its band
    pub segment_index: usize,
    /// Segment range, e.g. `[5000, 20000)`
    pub segment: String,
    /// Cumulative km where the portion starts
    pub from_km: Km,
    /// Cumulative km where the portion ends (exclusive)
    pub to_km: Km,
    pub distance_km: Km,
    pub coefficient: Coefficient,
    /// Fixed term charged on this portion, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constant_applied: Option<Money>,
    /// Full precision, not rounded
    pub amount: Money,
}

/// Amount owed for one trip, split by segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketSplit {
    pub portions: Vec<SegmentPortion>,
    pub unrounded_amount: Money,
    /// Rounded to cents, half to even
    pub amount: Money,
}

impl BracketSplit {
    fn empty() -> Self {
        BracketSplit {
            portions: Vec::new(),
            unrounded_amount: Decimal::ZERO,
            amount: Decimal::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

fn overflow(field: &str) -> MileageError {
    MileageError::InvalidInput {
        field: field.into(),
        reason: "Distance or amount exceeds the supported decimal range".into(),
    }
}

/// Round a monetary amount to cents, half to even.
pub fn round_money(amount: Money) -> Money {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

fn affine_constant_applies(
    policy: AffineConstantPolicy,
    segment: &Segment,
    trip_start: Km,
    trip_end: Km,
) -> bool {
    match policy {
        AffineConstantPolicy::PerSegmentEntry => {
            let traverses = trip_start < segment.range_start
                && segment.range_end.is_some_and(|end| trip_end >= end);
            !traverses
        }
        AffineConstantPolicy::OnThresholdCrossing => {
            trip_start <= segment.range_start && segment.range_start < trip_end
        }
    }
}

/// Amount owed for the cumulative range `[prior_km, prior_km + trip_km)`.
///
/// Each segment the range touches contributes `coefficient × overlap`, plus
/// its affine constant when `policy` says so. Partial amounts keep full
/// precision; only the per-trip total is rounded. `segments` must be in
/// ascending order. Any uncovered sub-range aborts the whole trip with
/// `SegmentCoverageGap`. `band` only labels errors.
pub fn split_amount(
    band: &str,
    segments: &[Segment],
    prior_km: Km,
    trip_km: Km,
    policy: AffineConstantPolicy,
) -> MileageResult<BracketSplit> {
    if trip_km < Decimal::ZERO {
        return Err(MileageError::NegativeDistance {
            context: "trip distance".into(),
            distance_km: trip_km,
        });
    }
    if prior_km < Decimal::ZERO {
        return Err(MileageError::NegativeDistance {
            context: "prior cumulative distance".into(),
            distance_km: prior_km,
        });
    }
    if trip_km.is_zero() {
        return Ok(BracketSplit::empty());
    }

    let trip_end = prior_km.checked_add(trip_km).ok_or_else(|| overflow("trip_km"))?;
    let mut cursor = prior_km;
    let mut portions: Vec<SegmentPortion> = Vec::new();

    for (index, segment) in segments.iter().enumerate() {
        if cursor >= trip_end {
            break;
        }
        if segment.range_end.is_some_and(|end| end <= cursor) {
            continue;
        }
        if segment.range_start > cursor {
            return Err(MileageError::SegmentCoverageGap {
                key: None,
                band: band.to_string(),
                from_km: cursor,
                to_km: segment.range_start.min(trip_end),
            });
        }

        let portion_end = match segment.range_end {
            Some(end) => end.min(trip_end),
            None => trip_end,
        };
        let overlap = portion_end - cursor;

        let constant_applied = segment
            .formula
            .constant()
            .filter(|_| affine_constant_applies(policy, segment, prior_km, trip_end));
        let coefficient = segment.formula.coefficient();
        let amount = coefficient
            .checked_mul(overlap)
            .and_then(|a| a.checked_add(constant_applied.unwrap_or(Decimal::ZERO)))
            .ok_or_else(|| overflow("trip_km"))?;

        debug!(
            band,
            segment = %segment.label(),
            overlap_km = %overlap,
            constant = ?constant_applied,
            amount = %amount,
            "segment portion"
        );

        portions.push(SegmentPortion {
            segment_index: index,
            segment: segment.label(),
            from_km: cursor,
            to_km: portion_end,
            distance_km: overlap,
            coefficient,
            constant_applied,
            amount,
        });
        cursor = portion_end;
    }

    if cursor < trip_end {
        return Err(MileageError::SegmentCoverageGap {
            key: None,
            band: band.to_string(),
            from_km: cursor,
            to_km: trip_end,
        });
    }

    let unrounded_amount = portions
        .iter()
        .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(p.amount))
        .ok_or_else(|| overflow("trip_km"))?;
    Ok(BracketSplit {
        portions,
        unrounded_amount,
        amount: round_money(unrounded_amount),
    })
}

/// Legal whole-year allowance: the formula of the segment containing
/// `total_km`, applied to the full annual distance.
pub fn annual_allowance(band: &str, segments: &[Segment], total_km: Km) -> MileageResult<Money> {
    if total_km < Decimal::ZERO {
        return Err(MileageError::NegativeDistance {
            context: "annual distance".into(),
            distance_km: total_km,
        });
    }
    if total_km.is_zero() {
        return Ok(Decimal::ZERO);
    }
    let segment = segments
        .iter()
        .find(|s| s.contains(total_km))
        .ok_or_else(|| MileageError::SegmentCoverageGap {
            key: None,
            band: band.to_string(),
            from_km: total_km,
            to_km: total_km,
        })?;
    let amount = segment
        .formula
        .evaluate(total_km)
        .ok_or_else(|| overflow("total_km"))?;
    Ok(round_money(amount))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
