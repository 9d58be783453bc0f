// Sensor-based search for the home reference of the stage
//
// Steps one half-step at a time so the sensor edge is found to within one
// mechanical step. The deadline is checked between steps only; a step in
// progress always completes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::sequencer::Sequencer;
use crate::error::HwError;
use crate::hw::{Clock, DigitalPort};

/// Stage the search was in when the budget ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HomingPhase {
    /// Moving off a sensor that was already triggered at entry
    Clearing,
    /// Looking for the sensor to trigger
    Searching,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum HomingOutcome {
    /// Sensor found and calibration offset applied
    Homed,
    /// Budget expired; stage left where it stopped, no calibration applied
    TimedOut { phase: HomingPhase },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomingReport {
    #[serde(flatten)]
    pub outcome: HomingOutcome,
    /// Single half-steps taken while clearing and searching
    pub search_steps: u32,
    /// Calibration half-steps applied after the sensor triggered
    pub calibration_steps: i32,
    #[serde(with = "millis")]
    pub elapsed: Duration,
}

impl HomingReport {
    pub fn is_homed(&self) -> bool {
        self.outcome == HomingOutcome::Homed
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Everything a homing run needs besides the motor itself
pub struct HomingRequest {
    pub sensor_pin: u8,
    pub calibration: i32,
    pub timeout: Duration,
}

/// Drive the stage to the sensor, then apply the calibration offset.
///
/// A sensor already triggered at entry is first cleared, so starting on top
/// of the switch is not mistaken for having arrived.
pub fn find_home<P, C>(
    sequencer: &mut Sequencer,
    port: &mut P,
    clock: &C,
    request: &HomingRequest,
) -> Result<HomingReport, HwError>
where
    P: DigitalPort + ?Sized,
    C: Clock + ?Sized,
{
    let start = clock.now();
    // An unrepresentable deadline means the search is unbounded
    let deadline = start.checked_add(request.timeout).unwrap_or(Duration::MAX);
    let delay = sequencer.step_delay();
    let mut search_steps = 0u32;

    info!(
        "Homing: calibration {} half-steps, budget {:?}",
        request.calibration, request.timeout
    );

    let mut triggered = port.read(request.sensor_pin)?.is_high();
    let mut timed_out = None;

    if triggered {
        debug!("Sensor triggered at start, clearing switch");
        while triggered {
            if clock.now() >= deadline {
                timed_out = Some(HomingPhase::Clearing);
                break;
            }
            sequencer.step(port, clock, 1, delay)?;
            search_steps += 1;
            triggered = port.read(request.sensor_pin)?.is_high();
        }
    }

    if timed_out.is_none() {
        while !triggered {
            if clock.now() >= deadline {
                timed_out = Some(HomingPhase::Searching);
                break;
            }
            sequencer.step(port, clock, 1, delay)?;
            search_steps += 1;
            triggered = port.read(request.sensor_pin)?.is_high();
        }
    }

    // A trigger seen on the step that crossed the deadline still counts as late
    if timed_out.is_none() && clock.now() >= deadline {
        timed_out = Some(HomingPhase::Searching);
    }

    let outcome = match timed_out {
        Some(phase) => {
            warn!(
                "Timed out while finding start position ({:?} after {} steps)! Images will be misaligned.",
                phase, search_steps
            );
            HomingOutcome::TimedOut { phase }
        }
        None => {
            debug!("Sensor triggered after {} steps", search_steps);
            sequencer.step(port, clock, request.calibration, delay)?;
            HomingOutcome::Homed
        }
    };

    let report = HomingReport {
        outcome,
        search_steps,
        calibration_steps: if timed_out.is_none() { request.calibration } else { 0 },
        elapsed: clock.now() - start,
    };
    if report.is_homed() {
        info!("Homed in {} steps ({:?})", search_steps, report.elapsed);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timing;
    use crate::hw::{Direction, Level, ManualClock, Pull, SimulatedPort};

    const COILS: [u8; 4] = [16, 12, 20, 21];
    const SENSOR: u8 = 4;

    fn setup() -> (Sequencer, SimulatedPort, ManualClock) {
        let mut port = SimulatedPort::new();
        for pin in COILS {
            port.configure(pin, Direction::Output).unwrap();
        }
        port.configure(SENSOR, Direction::Input(Pull::Down)).unwrap();
        port.clear_events();
        (Sequencer::new(COILS, &Timing::default()), port, ManualClock::new())
    }

    fn request(calibration: i32) -> HomingRequest {
        HomingRequest {
            sensor_pin: SENSOR,
            calibration,
            timeout: Duration::from_secs(60),
        }
    }

    /// Sensor reads low for the first `n` samples, then high
    fn trigger_after(port: &SimulatedPort, n: usize) {
        port.script_input(SENSOR, std::iter::repeat_n(Level::Low, n));
        port.set_input(SENSOR, Level::High);
    }

    #[test]
    fn test_home_found_then_calibrated() {
        let (mut seq, mut port, clock) = setup();
        trigger_after(&port, 13);

        let report = find_home(&mut seq, &mut port, &clock, &request(5)).unwrap();

        assert!(report.is_homed());
        assert_eq!(report.search_steps, 13);
        assert_eq!(report.calibration_steps, 5);
        assert_eq!(port.writes().len(), (13 + 5) * 4);
        assert_eq!(seq.phase(), (13 + 5) % 8);
    }

    #[test]
    fn test_negative_calibration_backs_up() {
        let (mut seq, mut port, clock) = setup();
        trigger_after(&port, 6);

        let report = find_home(&mut seq, &mut port, &clock, &request(-3)).unwrap();

        assert!(report.is_homed());
        assert_eq!(seq.phase(), 3);
    }

    #[test]
    fn test_already_on_sensor_clears_before_search() {
        let (mut seq, mut port, clock) = setup();
        // on the switch for two samples, off for two, then triggered again
        port.script_input(
            SENSOR,
            [Level::High, Level::High, Level::Low, Level::Low],
        );
        port.set_input(SENSOR, Level::High);

        let report = find_home(&mut seq, &mut port, &clock, &request(0)).unwrap();

        assert!(report.is_homed());
        // two steps to clear, two more to reach the trigger again
        assert_eq!(report.search_steps, 4);
        assert_eq!(seq.phase(), 4);
    }

    #[test]
    fn test_sensor_never_triggers_times_out() {
        let (mut seq, mut port, clock) = setup();
        port.set_input(SENSOR, Level::Low);

        let report = find_home(&mut seq, &mut port, &clock, &request(7)).unwrap();

        assert_eq!(
            report.outcome,
            HomingOutcome::TimedOut {
                phase: HomingPhase::Searching
            }
        );
        assert_eq!(report.calibration_steps, 0);
        assert!(report.elapsed >= Duration::from_secs(60));
        // each single step costs settle + delay = 35 ms of virtual time
        assert_eq!(report.search_steps, 60_000u32.div_ceil(35));
        // no calibration steps beyond the search
        assert_eq!(port.writes().len(), report.search_steps as usize * 4);
        assert_eq!(seq.phase(), report.search_steps as usize % 8);
    }

    #[test]
    fn test_stuck_on_sensor_times_out_while_clearing() {
        let (mut seq, mut port, clock) = setup();
        port.set_input(SENSOR, Level::High);

        let report = find_home(
            &mut seq,
            &mut port,
            &clock,
            &HomingRequest {
                timeout: Duration::from_secs(1),
                ..request(3)
            },
        )
        .unwrap();

        assert_eq!(
            report.outcome,
            HomingOutcome::TimedOut {
                phase: HomingPhase::Clearing
            }
        );
        assert!(report.search_steps > 0);
        assert_eq!(report.calibration_steps, 0);
    }

    #[test]
    fn test_trigger_after_deadline_is_not_homed() {
        let (mut seq, mut port, clock) = setup();
        // 29 steps x 35 ms crosses the 1 s budget on the last step
        trigger_after(&port, 29);

        let report = find_home(
            &mut seq,
            &mut port,
            &clock,
            &HomingRequest {
                timeout: Duration::from_secs(1),
                ..request(5)
            },
        )
        .unwrap();

        assert_eq!(
            report.outcome,
            HomingOutcome::TimedOut {
                phase: HomingPhase::Searching
            }
        );
        assert_eq!(report.search_steps, 29);
        assert_eq!(report.calibration_steps, 0);
        assert_eq!(port.writes().len(), 29 * 4);
        assert_eq!(seq.phase(), 29 % 8);
    }

    #[test]
    fn test_unbounded_timeout_does_not_overflow() {
        let (mut seq, mut port, clock) = setup();
        clock.advance(Duration::from_secs(3600));
        trigger_after(&port, 2);

        let report = find_home(
            &mut seq,
            &mut port,
            &clock,
            &HomingRequest {
                timeout: Duration::MAX,
                ..request(1)
            },
        )
        .unwrap();

        assert!(report.is_homed());
        assert_eq!(seq.phase(), 3);
    }

    #[test]
    fn test_report_serializes_flat() {
        let report = HomingReport {
            outcome: HomingOutcome::TimedOut {
                phase: HomingPhase::Searching,
            },
            search_steps: 12,
            calibration_steps: 0,
            elapsed: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(report).unwrap();
        assert_eq!(json["status"], "timed_out");
        assert_eq!(json["phase"], "searching");
        assert_eq!(json["elapsed"], 1500);
    }
}
