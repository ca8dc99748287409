//! End-to-end moves over simulated axes, with tokio time paused.

use std::sync::Arc;
use std::time::Duration;

use apsg_common::config::Config;
use apsg_common::motor::{SimAxisConfig, SimulatedAxis};
use apsg_common::{
    Aperture, ApertureScatterguard, Axis, MoveError, MoveFault, Position, PositionName,
    Scatterguard, SlotName,
};

struct SimRig {
    ap_y: Arc<SimulatedAxis>,
    sg_y: Arc<SimulatedAxis>,
    coordinator: ApertureScatterguard,
}

fn sim_rig(config: &Config, start: Position) -> SimRig {
    let ap = config.simulation.aperture;
    let sg = config.simulation.scatterguard;
    let ap_y = Arc::new(SimulatedAxis::new("ap-y", start.aperture_y, ap));
    let sg_y = Arc::new(SimulatedAxis::new("sg-y", start.scatterguard_y, sg));

    let aperture = Aperture::new(
        Arc::new(SimulatedAxis::new("ap-x", start.aperture_x, ap)),
        ap_y.clone(),
        Arc::new(SimulatedAxis::new("ap-z", start.aperture_z, ap)),
    );
    let scatterguard = Scatterguard::new(
        Arc::new(SimulatedAxis::new("sg-x", start.scatterguard_x, sg)),
        sg_y.clone(),
    );

    let mut coordinator = ApertureScatterguard::new(aperture, scatterguard);
    coordinator.load_positions(config.position_registry().unwrap());
    SimRig {
        ap_y,
        sg_y,
        coordinator,
    }
}

#[tokio::test(start_paused = true)]
async fn test_robot_load_to_small_aperture() {
    let config = Config::default();
    let registry = config.position_registry().unwrap();
    let start = registry.get(SlotName::RobotLoad).unwrap();
    let mut rig = sim_rig(&config, start);

    let status = rig
        .coordinator
        .request_named_move(SlotName::Small)
        .await
        .unwrap();

    // Scatterguard cleared first, aperture y still on its way
    assert!(rig.sg_y.is_settled());
    assert!(!rig.ap_y.is_settled());

    status.wait().await.unwrap();
    assert_eq!(rig.coordinator.matched_readback_name(), PositionName::Small);
    assert_eq!(rig.coordinator.current_position_name(), PositionName::Small);
}

#[tokio::test(start_paused = true)]
async fn test_small_back_to_large_aperture_first() {
    let config = Config::default();
    let registry = config.position_registry().unwrap();
    let start = registry.get(SlotName::Small).unwrap();
    let mut rig = sim_rig(&config, start);

    let status = rig
        .coordinator
        .request_named_move(SlotName::Large)
        .await
        .unwrap();

    assert!(rig.ap_y.is_settled());
    assert!(!rig.sg_y.is_settled());

    status
        .wait_timeout(Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(rig.coordinator.readback(), registry.get(SlotName::Large).unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_soft_limit_fails_phase_one() {
    let mut config = Config::default();
    config.simulation.scatterguard.limits = Some((0.0, 10.0));
    let registry = config.position_registry().unwrap();
    let start = registry.get(SlotName::RobotLoad).unwrap();
    let mut rig = sim_rig(&config, start);

    // SMALL parks scatterguard y at -3.55, below the soft limit
    let result = rig.coordinator.request_named_move(SlotName::Small).await;

    match result {
        Err(MoveError::AxisMoveFailed(MoveFault::OutOfRange { axis, .. })) => {
            assert_eq!(axis, "sg-y")
        }
        other => panic!("expected out of range, got {:?}", other.map(|_| ())),
    }
    assert!(rig.ap_y.is_settled());
    assert_eq!(rig.ap_y.read(), start.aperture_y);
}

#[tokio::test(start_paused = true)]
async fn test_wait_timeout_does_not_stop_the_move() {
    let mut config = Config::default();
    config.simulation.aperture = SimAxisConfig {
        velocity_mm_s: 0.5,
        ..SimAxisConfig::default()
    };
    let registry = config.position_registry().unwrap();
    let mut rig = sim_rig(&config, registry.get(SlotName::RobotLoad).unwrap());

    let status = rig
        .coordinator
        .request_named_move(SlotName::Large)
        .await
        .unwrap();
    let err = status.wait_timeout(Duration::from_secs(1)).await.unwrap_err();
    assert_eq!(err, MoveFault::TimedOut(Duration::from_secs(1)));

    status.wait().await.unwrap();
    assert_eq!(rig.coordinator.matched_readback_name(), PositionName::Large);
}
