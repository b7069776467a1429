// src/main.rs
//! locprobe - exercise a location provider from the command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loc_provider::{
    config::ProviderConfig,
    display::{terminal::render_banner, TerminalListener},
    geo::Coordinates,
    logging, source, LocationProvider, USE_DEFAULT,
};
use std::{
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

#[derive(Parser)]
#[command(name = "locprobe")]
#[command(about = "Watch, fetch and measure locations from gpsd or a serial NMEA receiver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.config/loc-provider/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter directive (trace, debug, info, warn, error, or a full EnvFilter)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print state changes and throttled locations until Ctrl+C
    Watch {
        /// Milliseconds between locations; 0 for state changes only, -1 for the default
        #[arg(long, default_value_t = USE_DEFAULT, allow_negative_numbers = true)]
        interval: i64,
        /// Per-poll timeout in milliseconds, -1 for the default
        #[arg(long, default_value_t = USE_DEFAULT, allow_negative_numbers = true)]
        timeout: i64,
        /// Maximum fix age in milliseconds, -1 for the default
        #[arg(long, default_value_t = USE_DEFAULT, allow_negative_numbers = true)]
        max_age: i64,
    },
    /// Fetch a single location
    Fix {
        /// Milliseconds to wait, -1 for the default
        #[arg(long, default_value_t = USE_DEFAULT, allow_negative_numbers = true)]
        timeout: i64,
        /// Print the location as JSON
        #[arg(long)]
        json: bool,
    },
    /// Great-circle distance in metres between two points
    Distance {
        #[arg(allow_negative_numbers = true)]
        lat1: f64,
        #[arg(allow_negative_numbers = true)]
        lon1: f64,
        #[arg(allow_negative_numbers = true)]
        lat2: f64,
        #[arg(allow_negative_numbers = true)]
        lon2: f64,
    },
    /// Initial bearing in degrees from the first point to the second
    Azimuth {
        #[arg(allow_negative_numbers = true)]
        lat1: f64,
        #[arg(allow_negative_numbers = true)]
        lon1: f64,
        #[arg(allow_negative_numbers = true)]
        lat2: f64,
        #[arg(allow_negative_numbers = true)]
        lon2: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ProviderConfig::load_from(path),
        None => ProviderConfig::load(),
    }
    .context("Failed to load configuration")?;

    let directive = cli.log_level.as_deref().or(config.log_level.as_deref());
    logging::init_logging(directive)?;

    match cli.command {
        Commands::Watch {
            interval,
            timeout,
            max_age,
        } => watch(&config, interval, timeout, max_age).await,
        Commands::Fix { timeout, json } => fix(&config, timeout, json).await,
        Commands::Distance {
            lat1,
            lon1,
            lat2,
            lon2,
        } => {
            let (from, to) = (point(lat1, lon1)?, point(lat2, lon2)?);
            println!("{:.1} m", from.distance(&to));
            Ok(())
        }
        Commands::Azimuth {
            lat1,
            lon1,
            lat2,
            lon2,
        } => {
            let (from, to) = (point(lat1, lon1)?, point(lat2, lon2)?);
            println!("{:.2}°", from.azimuth_to(&to));
            Ok(())
        }
    }
}

async fn start_provider(config: &ProviderConfig) -> Result<LocationProvider> {
    let source = source::from_config(&config.source);
    tracing::info!(source = source.name(), "Starting location provider");
    LocationProvider::start(source)
        .await
        .context("Failed to start location provider")
}

async fn watch(config: &ProviderConfig, interval: i64, timeout: i64, max_age: i64) -> Result<()> {
    let provider = start_provider(config).await?;

    let mut stdout = io::stdout();
    render_banner(&mut stdout, provider.name())?;
    stdout.flush()?;

    provider
        .register(Some(Arc::new(TerminalListener::stdout())), interval, timeout, max_age)
        .context("Invalid watch parameters")?;

    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                if provider.is_shut_down() {
                    tracing::info!("Acquisition source closed");
                    break;
                }
            }
        }
    }

    let faults = provider.listener_faults();
    if faults > 0 {
        tracing::warn!(faults, "Terminal listener reported faults");
    }
    provider.shutdown().await;
    println!("\nShutting down...");
    Ok(())
}

async fn fix(config: &ProviderConfig, timeout: i64, json: bool) -> Result<()> {
    let provider = start_provider(config).await?;
    let location = provider.get_location(timeout).await.context("No location fix")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&location)?);
    } else {
        println!("{}", location);
    }

    provider.shutdown().await;
    Ok(())
}

fn point(latitude: f64, longitude: f64) -> Result<Coordinates> {
    Coordinates::new(latitude, longitude, None)
        .with_context(|| format!("Bad coordinates {}, {}", latitude, longitude))
}
