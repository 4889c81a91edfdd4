use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::MileageError;
use crate::types::*;
use crate::MileageResult;

// ---------------------------------------------------------------------------
// Keys and ranges
// ---------------------------------------------------------------------------

/// Address of a rate table: ISO country code and tax year.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RateTableKey {
    pub country: String,
    pub year: i32,
}

impl RateTableKey {
    pub fn new(country: impl Into<String>, year: i32) -> Self {
        RateTableKey {
            country: country.into().to_uppercase(),
            year,
        }
    }
}

impl fmt::Display for RateTableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.country, self.year)
    }
}

/// Closed fiscal-horsepower range. `max = None` means "and above".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HorsepowerRange {
    pub min: u32,
    pub max: Option<u32>,
}

impl HorsepowerRange {
    pub fn contains(&self, fiscal_hp: u32) -> bool {
        fiscal_hp >= self.min && self.max.map_or(true, |max| fiscal_hp <= max)
    }
}

impl fmt::Display for HorsepowerRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{} CV", self.min),
            Some(max) => write!(f, "{}-{} CV", self.min, max),
            None => write!(f, "{}+ CV", self.min),
        }
    }
}

// ---------------------------------------------------------------------------
// Formula and segments
// ---------------------------------------------------------------------------

/// Amount formula of a distance segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Formula {
    /// amount = coefficient × km
    Linear { coefficient: Coefficient },
    /// amount = coefficient × km + constant
    Affine {
        coefficient: Coefficient,
        constant: Money,
    },
}

impl Formula {
    pub fn coefficient(&self) -> Coefficient {
        match self {
            Formula::Linear { coefficient } | Formula::Affine { coefficient, .. } => *coefficient,
        }
    }

    /// The fixed term, if the formula has one.
    pub fn constant(&self) -> Option<Money> {
        match self {
            Formula::Linear { .. } => None,
            Formula::Affine { constant, .. } => Some(*constant),
        }
    }

    /// Full formula value for `km`, constant included. `None` on overflow.
    pub fn evaluate(&self, km: Km) -> Option<Money> {
        self.coefficient()
            .checked_mul(km)?
            .checked_add(self.constant().unwrap_or(Decimal::ZERO))
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Linear { coefficient } => write!(f, "d x {coefficient}"),
            Formula::Affine {
                coefficient,
                constant,
            } => write!(f, "d x {coefficient} + {constant}"),
        }
    }
}

/// Half-open distance range `[range_start, range_end)` with its formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub range_start: Km,
    /// `None` for the open-ended top segment
    pub range_end: Option<Km>,
    pub formula: Formula,
}

impl Segment {
    pub fn linear(range_start: Km, range_end: Option<Km>, coefficient: Coefficient) -> Self {
        Segment {
            range_start,
            range_end,
            formula: Formula::Linear { coefficient },
        }
    }

    pub fn affine(
        range_start: Km,
        range_end: Option<Km>,
        coefficient: Coefficient,
        constant: Money,
    ) -> Self {
        Segment {
            range_start,
            range_end,
            formula: Formula::Affine {
                coefficient,
                constant,
            },
        }
    }

    pub fn contains(&self, km: Km) -> bool {
        km >= self.range_start && self.range_end.map_or(true, |end| km < end)
    }

    pub fn label(&self) -> String {
        match self.range_end {
            Some(end) => format!("[{}, {})", self.range_start, end),
            None => format!("[{}, inf)", self.range_start),
        }
    }
}

/// Fiscal-horsepower band with its ordered distance segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    pub horsepower: HorsepowerRange,
    pub segments: Vec<Segment>,
}

// ---------------------------------------------------------------------------
// Rate table
// ---------------------------------------------------------------------------

/// Immutable barème for one (country, year). Only constructible through
/// validation, so every instance satisfies the band and segment invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RateTableConfig", into = "RateTableConfig")]
pub struct RateTable {
    key: RateTableKey,
    currency: Currency,
    bands: Vec<Band>,
}

impl RateTable {
    /// Validate and build a table. Bands and segments are sorted ascending
    /// before the contiguity checks run.
    pub fn new(key: RateTableKey, currency: Currency, mut bands: Vec<Band>) -> MileageResult<Self> {
        let invalid = |reason: String| MileageError::InvalidRateTable {
            key: key.to_string(),
            reason,
        };

        if key.country.trim().is_empty() {
            return Err(invalid("Country code must not be empty".into()));
        }
        if bands.is_empty() {
            return Err(invalid("At least one horsepower band is required".into()));
        }

        bands.sort_by_key(|b| b.horsepower.min);

        let mut expected_min = 1u32;
        let band_count = bands.len();
        for (i, band) in bands.iter_mut().enumerate() {
            let hp = band.horsepower;
            if hp.min != expected_min {
                return Err(invalid(format!(
                    "Band {hp} should start at {expected_min} CV (bands must be contiguous from 1 CV)"
                )));
            }
            match hp.max {
                Some(max) if max < hp.min => {
                    return Err(invalid(format!("Band {hp} has cv_max below cv_min")));
                }
                Some(max) if i + 1 == band_count => {
                    return Err(invalid(format!(
                        "Last band ends at {max} CV; the top band must be open-ended"
                    )));
                }
                Some(max) => {
                    expected_min = max.checked_add(1).ok_or_else(|| {
                        invalid(format!("Band {hp} ends at the largest representable CV"))
                    })?;
                }
                None if i + 1 < band_count => {
                    return Err(invalid(format!(
                        "Band {hp} is open-ended but is not the last band"
                    )));
                }
                None => {}
            }

            validate_segments(&hp, &mut band.segments).map_err(invalid)?;
        }

        Ok(RateTable {
            key,
            currency,
            bands,
        })
    }

    pub fn from_json(json: &str) -> MileageResult<Self> {
        let config: RateTableConfig = serde_json::from_str(json)?;
        RateTable::try_from(config)
    }

    pub fn key(&self) -> &RateTableKey {
        &self.key
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }
}

fn validate_segments(hp: &HorsepowerRange, segments: &mut [Segment]) -> Result<(), String> {
    if segments.is_empty() {
        return Err(format!("Band {hp} has no distance segments"));
    }

    segments.sort_by(|a, b| a.range_start.cmp(&b.range_start));

    let mut expected_start = Decimal::ZERO;
    let count = segments.len();
    for (i, seg) in segments.iter().enumerate() {
        if seg.range_start != expected_start {
            return Err(format!(
                "Band {hp}: segment {} should start at {expected_start} km",
                seg.label()
            ));
        }
        if seg.formula.coefficient() < Decimal::ZERO {
            return Err(format!(
                "Band {hp}: segment {} has a negative coefficient",
                seg.label()
            ));
        }
        match seg.range_end {
            Some(end) if end <= seg.range_start => {
                return Err(format!("Band {hp}: segment {} is empty", seg.label()));
            }
            Some(end) => expected_start = end,
            None if i + 1 < count => {
                return Err(format!(
                    "Band {hp}: open-ended segment {} must be the last one",
                    seg.label()
                ));
            }
            None => {}
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Configuration format
// ---------------------------------------------------------------------------

/// On-disk shape of a rate table (JSON or YAML).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateTableConfig {
    pub country: String,
    pub year: i32,
    #[serde(default)]
    pub currency: Currency,
    pub bands: Vec<BandConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandConfig {
    pub cv_min: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv_max: Option<u32>,
    pub segments: Vec<SegmentConfig>,
}

/// A segment is affine when `constant` is present, linear otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfig {
    pub from_km: Km,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_km: Option<Km>,
    pub coefficient: Coefficient,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<Money>,
}

impl TryFrom<RateTableConfig> for RateTable {
    type Error = MileageError;

    fn try_from(config: RateTableConfig) -> MileageResult<Self> {
        let key = RateTableKey::new(config.country, config.year);
        let bands = config
            .bands
            .into_iter()
            .map(|b| Band {
                horsepower: HorsepowerRange {
                    min: b.cv_min,
                    max: b.cv_max,
                },
                segments: b
                    .segments
                    .into_iter()
                    .map(|s| match s.constant {
                        Some(constant) => {
                            Segment::affine(s.from_km, s.to_km, s.coefficient, constant)
                        }
                        None => Segment::linear(s.from_km, s.to_km, s.coefficient),
                    })
                    .collect(),
            })
            .collect();
        RateTable::new(key, config.currency, bands)
    }
}

impl From<RateTable> for RateTableConfig {
    fn from(table: RateTable) -> Self {
        RateTableConfig {
            country: table.key.country,
            year: table.key.year,
            currency: table.currency,
            bands: table
                .bands
                .into_iter()
                .map(|b| BandConfig {
                    cv_min: b.horsepower.min,
                    cv_max: b.horsepower.max,
                    segments: b
                        .segments
                        .into_iter()
                        .map(|s| SegmentConfig {
                            from_km: s.range_start,
                            to_km: s.range_end,
                            coefficient: s.formula.coefficient(),
                            constant: s.formula.constant(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
