use clap::Args;
use serde_json::Value;

use kilometrik_core::summary::{self, TripSummaryInput};

use crate::input;

/// Arguments for dashboard totals
#[derive(Args)]
pub struct SummaryArgs {
    /// Path to JSON input file
    #[arg(long)]
    pub input: Option<String>,

    /// Only count trips of this tax year
    #[arg(long)]
    pub year: Option<i32>,
}

pub fn run_summary(args: SummaryArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut summary_input: TripSummaryInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        return Err("--input <file.json> or stdin required for summary".into());
    };
    if args.year.is_some() {
        summary_input.year = args.year;
    }
    let result = summary::summarize_trips(&summary_input)?;
    Ok(serde_json::to_value(result)?)
}
