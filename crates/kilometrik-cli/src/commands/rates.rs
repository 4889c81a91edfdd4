use clap::Args;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use kilometrik_core::calculator::annual_allowance;
use kilometrik_core::rates::{resolve_band, RateTableRegistry, YearFallback};

/// Arguments for listing the segments of a band
#[derive(Args)]
pub struct SegmentsArgs {
    /// Fiscal horsepower (CV)
    #[arg(long)]
    pub cv: u32,

    /// Tax year
    #[arg(long)]
    pub year: i32,

    /// ISO country code
    #[arg(long, default_value = "FR")]
    pub country: String,

    /// Use the latest earlier table if none exists for the year
    #[arg(long)]
    pub nearest_prior: bool,
}

/// Arguments for the legal annual allowance
#[derive(Args)]
pub struct AllowanceArgs {
    /// Fiscal horsepower (CV)
    #[arg(long)]
    pub cv: u32,

    /// Tax year
    #[arg(long)]
    pub year: i32,

    /// Total professional distance over the year, in km
    #[arg(long)]
    pub km: Decimal,

    /// ISO country code
    #[arg(long, default_value = "FR")]
    pub country: String,

    /// Use the latest earlier table if none exists for the year
    #[arg(long)]
    pub nearest_prior: bool,
}

fn fallback(nearest_prior: bool) -> YearFallback {
    if nearest_prior {
        YearFallback::NearestPrior
    } else {
        YearFallback::Exact
    }
}

pub fn run_segments(
    registry: &RateTableRegistry,
    args: SegmentsArgs,
) -> Result<Value, Box<dyn std::error::Error>> {
    let table = registry.lookup(&args.country, args.year, fallback(args.nearest_prior))?;
    let band = resolve_band(table, args.cv)?;
    let segments: Vec<Value> = band
        .segments
        .iter()
        .map(|s| {
            json!({
                "segment": s.label(),
                "formula": s.formula.to_string(),
                "coefficient": s.formula.coefficient(),
                "constant": s.formula.constant(),
            })
        })
        .collect();
    Ok(json!({
        "rate_table": table.key().to_string(),
        "band": band.horsepower.to_string(),
        "results": segments,
    }))
}

pub fn run_allowance(
    registry: &RateTableRegistry,
    args: AllowanceArgs,
) -> Result<Value, Box<dyn std::error::Error>> {
    let table = registry.lookup(&args.country, args.year, fallback(args.nearest_prior))?;
    let band = resolve_band(table, args.cv)?;
    let band_label = band.horsepower.to_string();
    let amount = annual_allowance(&band_label, &band.segments, args.km)
        .map_err(|e| e.in_table(table.key()))?;
    Ok(json!({
        "result": {
            "rate_table": table.key().to_string(),
            "band": band_label,
            "total_km": args.km,
            "annual_allowance_eur": amount,
        }
    }))
}
