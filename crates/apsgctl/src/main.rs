//! Apsg Control - CLI for the aperture/scatterguard coordinator
//!
//! Loads the calibrated positions and drives simulated axes through safe moves.

mod commands;

use anyhow::{Context, Result};
use apsg_common::SlotName;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter};

#[derive(Parser)]
#[command(name = "apsgctl")]
#[command(about = "Aperture/scatterguard safe-move control", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: /etc/apsg/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the calibrated positions
    Positions,

    /// Name the slot a set of motor positions sits at
    Match {
        /// aperture x, y, z then scatterguard x, y (mm)
        #[arg(num_args = 5, allow_negative_numbers = true, required = true)]
        coords: Vec<f64>,

        /// Per-axis tolerance in mm
        #[arg(long, default_value_t = apsg_common::positions::NAME_MATCH_TOLERANCE_MM)]
        tolerance: f64,
    },

    /// Move simulated axes safely to a slot
    Move {
        /// large, medium, small or robot_load
        slot: SlotName,

        /// Slot the simulated axes start at
        #[arg(long, default_value = "robot_load")]
        from: SlotName,

        /// Give up waiting after this many seconds
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },

    /// Show readbacks and coordinator state for simulated axes
    Status {
        /// Slot the simulated axes rest at
        #[arg(long, default_value = "robot_load")]
        from: SlotName,
    },

    /// Write a default config file
    Init {
        /// Destination path
        #[arg(long, default_value = apsg_common::config::CONFIG_PATH)]
        path: PathBuf,
    },
}

/// Config level to apply, unless `RUST_LOG` or `-v` already chose one.
fn configured_level(explicit: bool, level: &str) -> Option<&str> {
    if explicit {
        None
    } else {
        Some(level)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging comes up before the config so loader warnings are shown;
    // the configured level is applied once the config is read.
    let env_filter = EnvFilter::try_from_default_env().ok();
    let explicit = env_filter.is_some() || cli.verbose;
    let initial = env_filter.unwrap_or_else(|| {
        EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    let (filter, filter_handle) = reload::Layer::new(initial);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    if let Some(level) = configured_level(explicit, &config.logging.level) {
        filter_handle
            .reload(EnvFilter::new(level))
            .context("applying configured log level")?;
    }

    match cli.command {
        Commands::Positions => commands::positions(&config, cli.json),
        Commands::Match { coords, tolerance } => {
            commands::match_position(&config, &coords, tolerance, cli.json)
        }
        Commands::Move {
            slot,
            from,
            timeout_secs,
        } => commands::move_to(&config, slot, from, timeout_secs, cli.json).await,
        Commands::Status { from } => commands::status(&config, from, cli.json),
        Commands::Init { path } => commands::init(&path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_accepts_negative_coordinates() {
        let cli = Cli::try_parse_from([
            "apsgctl", "match", "2.43", "48.974", "15.8", "5.3375", "-3.55",
        ])
        .unwrap();
        match cli.command {
            Commands::Match { coords, tolerance } => {
                assert_eq!(coords, vec![2.43, 48.974, 15.8, 5.3375, -3.55]);
                assert_eq!(tolerance, 0.001);
            }
            _ => panic!("expected match command"),
        }
    }

    #[test]
    fn test_match_needs_five_coordinates() {
        assert!(Cli::try_parse_from(["apsgctl", "match", "1.0", "2.0"]).is_err());
    }

    #[test]
    fn test_move_defaults() {
        let cli = Cli::try_parse_from(["apsgctl", "--json", "move", "small"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Move {
                slot,
                from,
                timeout_secs,
            } => {
                assert_eq!(slot, SlotName::Small);
                assert_eq!(from, SlotName::RobotLoad);
                assert_eq!(timeout_secs, 60);
            }
            _ => panic!("expected move command"),
        }
    }

    #[test]
    fn test_configured_level_yields_to_explicit_choice() {
        assert_eq!(configured_level(false, "warn"), Some("warn"));
        assert_eq!(configured_level(true, "warn"), None);
    }

    #[test]
    fn test_unknown_slot_is_rejected() {
        assert!(Cli::try_parse_from(["apsgctl", "move", "huge"]).is_err());
    }
}
