use napi::Result as NapiResult;
use napi_derive::napi;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use kilometrik_core::calculator::annual_allowance as legal_allowance;
use kilometrik_core::rates::{resolve_band, RateTable, RateTableRegistry, YearFallback};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

/// Split a request into its payload and a registry holding the builtin
/// barème plus any tables passed under `rate_tables`.
fn parse_request<T: DeserializeOwned>(input_json: &str) -> NapiResult<(T, RateTableRegistry)> {
    let mut value: Value = serde_json::from_str(input_json).map_err(to_napi_error)?;
    let extra = value
        .as_object_mut()
        .and_then(|m| m.remove("rate_tables"))
        .unwrap_or(Value::Null);

    let mut registry = RateTableRegistry::builtin();
    if !extra.is_null() {
        let tables: Vec<RateTable> = serde_json::from_value(extra).map_err(to_napi_error)?;
        for table in tables {
            registry.insert(table);
        }
    }

    let input: T = serde_json::from_value(value).map_err(to_napi_error)?;
    Ok((input, registry))
}

fn default_country() -> String {
    "FR".to_string()
}

#[derive(Deserialize)]
struct BandQuery {
    #[serde(default = "default_country")]
    country: String,
    year: i32,
    fiscal_hp: u32,
    #[serde(default)]
    year_fallback: YearFallback,
}

#[derive(Deserialize)]
struct AllowanceQuery {
    #[serde(flatten)]
    band: BandQuery,
    total_km: Decimal,
}

// ---------------------------------------------------------------------------
// Trip pricing
// ---------------------------------------------------------------------------

#[napi]
pub fn compute_trip_amount(input_json: String) -> NapiResult<String> {
    let (input, registry): (kilometrik_core::service::TripAmountInput, _) =
        parse_request(&input_json)?;
    let output =
        kilometrik_core::service::compute_trip_amount(&registry, &input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn replay_trips(input_json: String) -> NapiResult<String> {
    let (input, registry): (kilometrik_core::service::YearReplayInput, _) =
        parse_request(&input_json)?;
    let output = kilometrik_core::service::replay_trips(&registry, &input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Rate tables
// ---------------------------------------------------------------------------

#[napi]
pub fn resolve_segments(input_json: String) -> NapiResult<String> {
    let (query, registry): (BandQuery, _) = parse_request(&input_json)?;
    let table = registry
        .lookup(&query.country, query.year, query.year_fallback)
        .map_err(to_napi_error)?;
    let band = resolve_band(table, query.fiscal_hp).map_err(to_napi_error)?;
    let output = serde_json::json!({
        "rate_table": table.key().to_string(),
        "band": band.horsepower.to_string(),
        "segments": band.segments,
    });
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn annual_allowance(input_json: String) -> NapiResult<String> {
    let (query, registry): (AllowanceQuery, _) = parse_request(&input_json)?;
    let q = &query.band;
    let table = registry
        .lookup(&q.country, q.year, q.year_fallback)
        .map_err(to_napi_error)?;
    let band = resolve_band(table, q.fiscal_hp).map_err(to_napi_error)?;
    let label = band.horsepower.to_string();
    let amount = legal_allowance(&label, &band.segments, query.total_km)
        .map_err(|e| to_napi_error(e.in_table(table.key())))?;
    let output = serde_json::json!({
        "rate_table": table.key().to_string(),
        "band": label,
        "total_km": query.total_km,
        "annual_allowance_eur": amount,
    });
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

#[napi]
pub fn summarize_trips(input_json: String) -> NapiResult<String> {
    let input: kilometrik_core::summary::TripSummaryInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = kilometrik_core::summary::summarize_trips(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
