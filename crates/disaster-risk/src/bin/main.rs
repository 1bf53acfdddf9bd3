//! Disaster Risk CLI
//!
//! Usage:
//!   disaster-risk assess --location Chennai --temp 42 --humidity 90 --wind 20
//!   disaster-risk --overlays lstm assess -l Chennai --temp 31 --humidity 88 --wind 6 \
//!       --recent week.json
//!   disaster-risk history "tamil nadu"
//!   disaster-risk locations
//!   disaster-risk prepare --input dataset/disasterIND.csv

use anyhow::Result;
use clap::{Parser, Subcommand};
use disaster_risk::{heuristic, prepare, RiskError, RiskService, WeatherObservation};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "disaster-risk",
    about = "Disaster risk triage and historical disaster lookup"
)]
struct Args {
    /// Directory holding the prepared dataset and overlay artifacts
    #[arg(short = 'd', long, global = true, default_value = "models")]
    data_dir: PathBuf,

    /// Overlay priority, highest first
    #[arg(long, global = true, value_delimiter = ',', default_value = "boosted,forest")]
    overlays: Vec<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify weather at a location
    Assess {
        #[arg(short, long)]
        location: String,
        /// Temperature (Celsius)
        #[arg(long, allow_negative_numbers = true)]
        temp: f64,
        /// Relative humidity (percent)
        #[arg(long)]
        humidity: f64,
        /// Wind speed (m/s)
        #[arg(long)]
        wind: f64,
        /// Pressure (hPa)
        #[arg(long)]
        pressure: Option<f64>,
        /// Rainfall (mm)
        #[arg(long)]
        rainfall: Option<f64>,
        /// JSON array of preceding daily observations, oldest first
        #[arg(long)]
        recent: Option<PathBuf>,
        /// Print the per-factor heuristic breakdown
        #[arg(long)]
        breakdown: bool,
    },
    /// Historical disasters for a location
    History { location: String },
    /// List known locations with record counts
    Locations,
    /// Build the dataset artifacts from a raw disaster CSV
    Prepare {
        #[arg(short, long, default_value = "dataset/clean_disaster_data.csv")]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Prepare { input } => {
            let summary = prepare::prepare_dataset(&input, &args.data_dir)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Assess {
            location,
            temp,
            humidity,
            wind,
            pressure,
            rainfall,
            recent,
            breakdown,
        } => {
            let service = RiskService::from_data_dir(&args.data_dir, &args.overlays);
            let weather = WeatherObservation {
                temperature: temp,
                humidity,
                wind_speed: wind,
                pressure,
                rainfall,
            };
            if breakdown {
                let b = heuristic::score_breakdown(temp, humidity, wind);
                info!(
                    "Heuristic breakdown: temp={} humidity={} wind={} total={}",
                    b.temperature,
                    b.humidity,
                    b.wind,
                    b.total()
                );
            }
            let recent: Vec<WeatherObservation> = match recent {
                Some(path) => serde_json::from_str(&std::fs::read_to_string(&path)?)?,
                None => Vec::new(),
            };
            let assessment = service.assess_risk_with_history(&location, Some(weather), &recent)?;
            println!("{}", serde_json::to_string_pretty(&assessment)?);
        }
        Command::History { location } => {
            let service = RiskService::from_data_dir(&args.data_dir, &[]);
            match service.history_for(&location) {
                Ok(records) => println!("{}", serde_json::to_string_pretty(&records)?),
                Err(RiskError::NotFound { query, hints }) => {
                    anyhow::bail!(
                        "Location not found: {} (try one of: {})",
                        query,
                        hints.join(", ")
                    )
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Locations => {
            let service = RiskService::from_data_dir(&args.data_dir, &[]);
            if let Some(reason) = service.store().unavailable_reason() {
                anyhow::bail!("Historical records unavailable: {}", reason);
            }
            for loc in service.store().locations() {
                println!("{:>4}  {:30}  {}", loc.code, loc.name, loc.record_count);
            }
        }
    }

    Ok(())
}
