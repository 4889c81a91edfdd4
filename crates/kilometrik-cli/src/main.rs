mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::rates::{AllowanceArgs, SegmentsArgs};
use commands::summary::SummaryArgs;
use commands::trip::{ReplayArgs, TripAmountArgs};

/// Barème kilométrique reimbursement calculations
#[derive(Parser)]
#[command(
    name = "ikm",
    version,
    about = "Barème kilométrique reimbursement calculations",
    long_about = "Computes the mileage allowance (indemnités kilométriques) owed for \
                  business trips under the French barème, splitting each trip across \
                  the distance segments crossed by the vehicle's cumulative annual distance."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Extra rate tables (JSON or YAML), added on top of the builtin barème
    #[arg(long, env = "KILOMETRIK_RATES", global = true)]
    rates: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Price one trip given the vehicle's earlier trips or cumulative state
    TripAmount(TripAmountArgs),
    /// Price every trip of a vehicle's tax year in chronological order
    Replay(ReplayArgs),
    /// Dashboard totals for a list of priced trips
    Summary(SummaryArgs),
    /// Show the distance segments applicable to a fiscal horsepower
    Segments(SegmentsArgs),
    /// Legal annual allowance for a total distance
    Allowance(AllowanceArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let registry = match input::rates::load_registry(cli.rates.as_deref()) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    };

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::TripAmount(args) => commands::trip::run_trip_amount(&registry, args),
        Commands::Replay(args) => commands::trip::run_replay(&registry, args),
        Commands::Summary(args) => commands::summary::run_summary(args),
        Commands::Segments(args) => commands::rates::run_segments(&registry, args),
        Commands::Allowance(args) => commands::rates::run_allowance(&registry, args),
        Commands::Version => {
            println!("ikm {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
