use clap::Args;
use serde_json::Value;

use kilometrik_core::rates::RateTableRegistry;
use kilometrik_core::service::{self, TripAmountInput, YearReplayInput};

use crate::input;

/// Arguments for pricing a single trip
#[derive(Args)]
pub struct TripAmountArgs {
    /// Path to JSON input file
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for replaying a vehicle's year
#[derive(Args)]
pub struct ReplayArgs {
    /// Path to JSON input file
    #[arg(long)]
    pub input: Option<String>,

    /// Sort trips by date before replaying (same-date trips keep their order)
    #[arg(long)]
    pub sort: bool,
}

pub fn run_trip_amount(
    registry: &RateTableRegistry,
    args: TripAmountArgs,
) -> Result<Value, Box<dyn std::error::Error>> {
    let trip_input: TripAmountInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        return Err("--input <file.json> or stdin required for trip amount".into());
    };
    let result = service::compute_trip_amount(registry, &trip_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_replay(
    registry: &RateTableRegistry,
    args: ReplayArgs,
) -> Result<Value, Box<dyn std::error::Error>> {
    let mut replay_input: YearReplayInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        return Err("--input <file.json> or stdin required for replay".into());
    };
    replay_input.sort |= args.sort;
    let result = service::replay_trips(registry, &replay_input)?;
    Ok(serde_json::to_value(result)?)
}
