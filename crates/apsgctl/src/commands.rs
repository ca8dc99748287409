//! Command handlers for apsgctl.

use anyhow::{Context, Result};
use apsg_common::config::Config;
use apsg_common::motor::SimulatedAxis;
use apsg_common::{
    Aperture, ApertureScatterguard, Axis, MoveOrder, MovePhase, Position, PositionName,
    PositionRegistry, Scatterguard, SlotName,
};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => Config::load(Some(p)).with_context(|| format!("loading {}", p.display())),
        None => Ok(Config::load(None)?),
    }
}

fn load_registry(config: &Config) -> Result<PositionRegistry> {
    config
        .position_registry()
        .context("loading calibrated aperture positions")
}

/// Coordinator over five simulated axes resting at `start`.
fn simulated_coordinator(
    config: &Config,
    registry: PositionRegistry,
    start: Position,
) -> ApertureScatterguard {
    let ap = config.simulation.aperture;
    let sg = config.simulation.scatterguard;
    let axis = |name: &str, value: f64, cfg| Arc::new(SimulatedAxis::new(name, value, cfg));

    let aperture = Aperture::new(
        axis("ap-x", start.aperture_x, ap),
        axis("ap-y", start.aperture_y, ap),
        axis("ap-z", start.aperture_z, ap),
    );
    let scatterguard = Scatterguard::new(
        axis("sg-x", start.scatterguard_x, sg),
        axis("sg-y", start.scatterguard_y, sg),
    );

    let mut coordinator = ApertureScatterguard::new(aperture, scatterguard);
    coordinator.load_positions(registry);
    coordinator
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_position(label: &str, p: &Position) {
    println!(
        "  {:<12} {:>9.4} {:>9.4} {:>9.4} {:>9.4} {:>9.4}",
        label, p.aperture_x, p.aperture_y, p.aperture_z, p.scatterguard_x, p.scatterguard_y
    );
}

fn print_header() {
    println!(
        "  {:<12} {:>9} {:>9} {:>9} {:>9} {:>9}",
        "", "ap x", "ap y", "ap z", "sg x", "sg y"
    );
}

/// Handle positions command
pub fn positions(config: &Config, json: bool) -> Result<()> {
    let registry = load_registry(config)?;
    if json {
        return print_json(&registry.to_table()?);
    }

    print_header();
    for (slot, position) in registry.iter() {
        print_position(slot.as_str(), position);
    }
    Ok(())
}

#[derive(Serialize)]
struct MatchReport {
    position: Position,
    tolerance: f64,
    name: PositionName,
    calibrated: bool,
}

/// Handle match command
pub fn match_position(config: &Config, coords: &[f64], tolerance: f64, json: bool) -> Result<()> {
    let values: [f64; 5] = coords
        .try_into()
        .map_err(|_| anyhow::anyhow!("expected 5 coordinates, got {}", coords.len()))?;
    let position = Position::from_array(values);
    let registry = load_registry(config)?;

    let report = MatchReport {
        position,
        tolerance,
        name: registry.match_name(&position, tolerance),
        calibrated: registry.is_member(&position),
    };

    if json {
        return print_json(&report);
    }
    println!("{} -> {}", report.position, report.name);
    if report.calibrated {
        println!("  exact calibrated position");
    }
    Ok(())
}

#[derive(Serialize)]
struct MoveReport {
    request_id: Option<String>,
    from: SlotName,
    to: SlotName,
    order: Option<MoveOrder>,
    phase: MovePhase,
    success: bool,
    error: Option<String>,
    elapsed_ms: u128,
    readback: Position,
    readback_name: PositionName,
}

/// Handle move command
pub async fn move_to(
    config: &Config,
    slot: SlotName,
    from: SlotName,
    timeout_secs: u64,
    json: bool,
) -> Result<()> {
    let registry = load_registry(config)?;
    let start = registry.require(from)?;
    let mut coordinator = simulated_coordinator(config, registry, start);

    let started = Instant::now();
    let outcome = match coordinator.request_named_move(slot).await {
        Ok(status) => status
            .wait_timeout(Duration::from_secs(timeout_secs))
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    let elapsed = started.elapsed();

    let record = coordinator.last_move();
    let report = MoveReport {
        request_id: record.map(|r| r.request_id.to_string()),
        from,
        to: slot,
        order: record.map(|r| r.order),
        phase: coordinator.phase(),
        success: outcome.is_ok(),
        error: outcome.as_ref().err().cloned(),
        elapsed_ms: elapsed.as_millis(),
        readback: coordinator.readback(),
        readback_name: coordinator.matched_readback_name(),
    };

    match &report.error {
        None => info!("Moved {} -> {} in {:?}", from, slot, elapsed),
        Some(e) => warn!("Move {} -> {} failed: {}", from, slot, e),
    }

    if json {
        print_json(&report)?;
    } else {
        println!("move {} -> {}", from, slot);
        if let Some(order) = report.order {
            println!("  order      {}", order);
        }
        println!("  phase      {}", report.phase);
        println!("  elapsed    {:.2}s", elapsed.as_secs_f64());
        println!("  readback   {} ({})", report.readback, report.readback_name);
        match &report.error {
            None => println!("[OK] {}", "move complete".green()),
            Some(e) => println!("[ERROR] {}", e.red()),
        }
    }

    if let Some(e) = report.error {
        anyhow::bail!(e);
    }
    Ok(())
}

#[derive(Serialize)]
struct AxisReport {
    name: String,
    readback: f64,
    settled: bool,
    resolution: f64,
}

/// Readbacks only; a freshly wired rig has no move history to report.
#[derive(Serialize)]
struct StatusReport {
    readback_name: PositionName,
    axes: Vec<AxisReport>,
}

/// Handle status command
pub fn status(config: &Config, from: SlotName, json: bool) -> Result<()> {
    let report = status_report(config, from)?;

    if json {
        return print_json(&report);
    }

    println!("at position {}", report.readback_name);
    for axis in &report.axes {
        let state = if axis.settled {
            "settled".green().to_string()
        } else {
            "moving".yellow().to_string()
        };
        println!(
            "  {:<6} {:>9.4}  {}  (mres {})",
            axis.name, axis.readback, state, axis.resolution
        );
    }
    Ok(())
}

fn status_report(config: &Config, from: SlotName) -> Result<StatusReport> {
    let registry = load_registry(config)?;
    let start = registry.require(from)?;
    let coordinator = simulated_coordinator(config, registry, start);

    let aperture = coordinator.aperture();
    let scatterguard = coordinator.scatterguard();
    let axes = [
        &aperture.x,
        &aperture.y,
        &aperture.z,
        &scatterguard.x,
        &scatterguard.y,
    ]
    .into_iter()
    .map(|axis| AxisReport {
        name: axis.name().to_string(),
        readback: axis.read(),
        settled: axis.is_settled(),
        resolution: axis.resolution(),
    })
    .collect();

    Ok(StatusReport {
        readback_name: coordinator.matched_readback_name(),
        axes,
    })
}

/// Handle init command
pub fn init(path: &Path) -> Result<()> {
    Config::save_default(path).with_context(|| format!("writing {}", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_report_reads_rig_at_start_slot() {
        let report = status_report(&Config::default(), SlotName::Medium).unwrap();
        assert_eq!(report.readback_name, PositionName::Medium);
        assert_eq!(report.axes.len(), 5);
        assert!(report.axes.iter().all(|a| a.settled));

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("phase").is_none());
        assert!(json.get("position_name").is_none());
        assert_eq!(json["readback_name"], "medium");
    }
}
