// Control task: commands from concurrent callers are serialized onto the driver

use spiro_stage::hw::{Level, ManualClock, SimulatedBus, SimulatedPort};
use spiro_stage::messages::{StageCommand, StageReply, StageStatus};
use spiro_stage::motor::{HomingOutcome, HomingPhase};
use spiro_stage::{StageConfig, StageController, StageDriver, StageError, StageHandle};

const SENSOR: u8 = 4;

fn start() -> (StageController, StageHandle, SimulatedPort, SimulatedBus) {
    let port = SimulatedPort::new();
    let bus = SimulatedBus::new([1]);
    let config = StageConfig {
        calibration: 2,
        ..StageConfig::default()
    };
    let driver =
        StageDriver::initialize(&config, port.clone(), bus.clone(), ManualClock::new()).unwrap();
    let (controller, handle) = StageController::spawn(driver).unwrap();
    (controller, handle, port, bus)
}

#[tokio::test]
async fn test_commands_round_trip() {
    let (controller, handle, port, bus) = start();

    assert_eq!(handle.rotate(9.0).await.unwrap(), 10);
    handle.set_led(true).await.unwrap();
    handle.set_motor(true).await.unwrap();
    assert_eq!(handle.set_focus(0x10).await.unwrap(), 1);
    assert_eq!(
        handle.status().await.unwrap(),
        StageStatus {
            led: true,
            motor_on: true
        }
    );
    assert_eq!(bus.writes(), vec![(1, 0x0c, vec![0x01, 0x00])]);
    assert_eq!(port.output(17), Some(Level::High));

    drop(handle);
    tokio::task::spawn_blocking(move || controller.join())
        .await
        .unwrap();
    // Shutting down the task releases every line
    assert_eq!(port.configured_count(), 0);
}

#[tokio::test]
async fn test_invalid_angle_reported_to_caller() {
    let (_controller, handle, port, _) = start();
    port.clear_events();

    let result = handle.execute(StageCommand::Rotate { degrees: 1.0 }).await;
    assert!(matches!(result, Err(StageError::InvalidArgument { .. })));
    assert!(port.writes().is_empty());

    // The task keeps serving after a rejected command
    assert!(handle.status().await.is_ok());
}

#[tokio::test]
async fn test_homing_timeout_is_a_report() {
    let (_controller, handle, port, _) = start();
    port.set_input(SENSOR, Level::Low);

    let report = handle.find_home(None).await.unwrap();
    assert_eq!(
        report.outcome,
        HomingOutcome::TimedOut {
            phase: HomingPhase::Searching
        }
    );
    assert_eq!(report.calibration_steps, 0);
}

#[tokio::test]
async fn test_homing_applies_configured_calibration() {
    let (_controller, handle, port, _) = start();
    port.script_input(SENSOR, [Level::Low; 5]);
    port.set_input(SENSOR, Level::High);

    let reply = handle
        .execute(StageCommand::FindHome { calibration: None })
        .await
        .unwrap();
    match reply {
        StageReply::Homing(report) => {
            assert!(report.is_homed());
            assert_eq!(report.search_steps, 5);
            assert_eq!(report.calibration_steps, 2);
        }
        other => panic!("expected homing reply, got {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_callers_do_not_interleave_steps() {
    let (_controller, handle, port, _) = start();
    port.clear_events();

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move { handle.rotate(7.2).await }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 8);
    }

    // 4 rotations x 8 half-steps x 4 coil lines, each step a full pattern
    let writes = port.writes();
    assert_eq!(writes.len(), 4 * 8 * 4);
    for chunk in writes.chunks(4) {
        let pins: Vec<u8> = chunk.iter().map(|&(pin, _)| pin).collect();
        assert_eq!(pins, vec![16, 12, 20, 21]);
    }
}

#[test]
fn test_blocking_execute_outside_runtime() {
    let (_controller, handle, _, _) = start();
    let reply = handle.blocking_execute(StageCommand::SetLed { on: true }).unwrap();
    assert_eq!(reply, StageReply::Done);
}
