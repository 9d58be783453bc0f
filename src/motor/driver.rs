// High-level driver for the rotating imaging stage
//
// Combines the pin map, half-step sequencer, homing search and the
// auxiliary outputs (LED, motor standby, lens focus) behind one owner.
// Every call blocks for its physical duration.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::homing::{self, HomingReport, HomingRequest};
use super::sequencer::{Sequencer, degrees_to_steps};
use crate::config::{StageConfig, Timing};
use crate::error::{HwError, Result};
use crate::focus::broadcast_focus;
use crate::hw::{Clock, DigitalPort, Direction, FocusBus, Level, PinMap, PinRole, Pull};

/// Driver for the stage motor, position sensor, LED and focus lens
pub struct StageDriver<P: DigitalPort, B: FocusBus, C: Clock> {
    port: P,
    bus: B,
    clock: C,
    pins: PinMap,
    sequencer: Sequencer,
    calibration: i32,
    homing_timeout: Duration,
    led: bool,
    motor_on: bool,
    released: bool,
}

impl<P: DigitalPort, B: FocusBus, C: Clock> StageDriver<P, B, C> {
    /// Claim all lines and put them in the safe default state.
    ///
    /// The pin map is validated before the port is touched. If claiming a
    /// line fails, every line claimed so far is released again.
    pub fn initialize(config: &StageConfig, mut port: P, bus: B, clock: C) -> Result<Self> {
        config.validate()?;
        let pins = PinMap::from_config(&config.pins)?;
        let timing: Timing = config.timing();

        Self::configure_lines(&mut port, &pins)?;

        let mut driver = Self {
            port,
            bus,
            clock,
            pins,
            sequencer: Sequencer::new(pins.coils(), &timing),
            calibration: config.calibration,
            homing_timeout: timing.homing_timeout,
            led: false,
            motor_on: false,
            released: false,
        };

        // Motor driver outputs must be enabled before any motion
        driver.write(PinRole::PwmA, Level::High)?;
        driver.write(PinRole::PwmB, Level::High)?;
        driver.set_led(false)?;
        driver.set_motor_standby(false)?;

        info!("Stage initialized, pins {:?}", pins);
        Ok(driver)
    }

    fn configure_lines(port: &mut P, pins: &PinMap) -> std::result::Result<(), HwError> {
        let mut claimed = Vec::with_capacity(PinRole::ALL.len());
        for (role, pin) in pins.iter() {
            let direction = match role {
                // Pull-down: a disconnected sensor reads "not triggered"
                PinRole::Sensor => Direction::Input(Pull::Down),
                _ => Direction::Output,
            };
            if let Err(e) = port.configure(pin, direction) {
                warn!("Failed to configure {} (pin {}): {}", role, pin, e);
                for pin in claimed {
                    let _ = port.release(pin);
                }
                return Err(e);
            }
            claimed.push(pin);
        }
        Ok(())
    }

    fn write(&mut self, role: PinRole, level: Level) -> Result<()> {
        self.port.write(self.pins.pin(role), level)?;
        Ok(())
    }

    /// Step `count` half-steps with `delay` between coil changes
    pub fn step(&mut self, count: i32, delay: Duration) -> Result<()> {
        self.sequencer
            .step(&mut self.port, &self.clock, count, delay)?;
        Ok(())
    }

    /// Rotate the stage by an angle that is a whole number of half-steps.
    ///
    /// Returns the number of half-steps taken (negative for reverse).
    pub fn rotate(&mut self, degrees: f64) -> Result<i32> {
        let steps = degrees_to_steps(degrees)?;
        debug!("Rotating {} degrees ({} half-steps)", degrees, steps);
        let delay = self.sequencer.step_delay();
        self.step(steps, delay)?;
        Ok(steps)
    }

    /// Find the home position, falling back to the configured calibration.
    ///
    /// A timeout is reported in the returned `HomingReport`, not as an error.
    pub fn find_home(&mut self, calibration: Option<i32>) -> Result<HomingReport> {
        let request = HomingRequest {
            sensor_pin: self.pins.pin(PinRole::Sensor),
            calibration: calibration.unwrap_or(self.calibration),
            timeout: self.homing_timeout,
        };
        let report = homing::find_home(&mut self.sequencer, &mut self.port, &self.clock, &request)?;
        Ok(report)
    }

    pub fn set_led(&mut self, on: bool) -> Result<()> {
        self.write(PinRole::Led, Level::from(on))?;
        self.led = on;
        Ok(())
    }

    /// Drive the standby line: `true` wakes the motor driver, `false` idles it.
    ///
    /// The phase cursor is kept so the next motion continues the sequence.
    pub fn set_motor_standby(&mut self, on: bool) -> Result<()> {
        self.write(PinRole::Standby, Level::from(on))?;
        self.motor_on = on;
        Ok(())
    }

    pub fn start_motor(&mut self) -> Result<()> {
        self.set_motor_standby(true)
    }

    pub fn stop_motor(&mut self) -> Result<()> {
        self.set_motor_standby(false)
    }

    /// Broadcast a focus value to the lens; returns how many bus controllers took it
    pub fn set_focus(&mut self, value: u16) -> usize {
        broadcast_focus(&mut self.bus, value)
    }

    /// Last commanded LED state
    pub fn led(&self) -> bool {
        self.led
    }

    /// Last commanded standby line state
    pub fn motor_on(&self) -> bool {
        self.motor_on
    }

    pub fn phase(&self) -> usize {
        self.sequencer.phase()
    }

    /// Release every line back to the unconfigured state
    pub fn cleanup(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        info!("Releasing stage pins");
        self.released = true;
        let mut first_error = None;
        for (_, pin) in self.pins.iter() {
            if let Err(e) = self.port.release(pin) {
                warn!("Failed to release pin {}: {}", pin, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Release the lines and consume the driver
    pub fn shutdown(mut self) -> Result<()> {
        self.cleanup()
    }
}

impl<P: DigitalPort, B: FocusBus, C: Clock> Drop for StageDriver<P, B, C> {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!("Failed to release stage pins on drop: {}", e);
        }
    }
}
