// Half-step sequencing for the bipolar stage motor
//
// The coil pattern table and its order are fixed by the wiring of the
// driver board: walking it forward turns the stage one way, backward the
// other way.

use std::time::Duration;

use tracing::debug;

use crate::config::{DEGREES_PER_STEP, Timing};
use crate::error::{HwError, StageError};
use crate::hw::{Clock, DigitalPort, Level};

/// Coil patterns for one electrical cycle in half-steps.
/// Bit 3 = M11, bit 2 = M12, bit 1 = M21, bit 0 = M22.
pub const HALF_STEP_TABLE: [u8; 8] = [
    0b1000, 0b1010, 0b0010, 0b0110, 0b0100, 0b0101, 0b0001, 0b1001,
];

pub const PHASES: usize = HALF_STEP_TABLE.len();

/// Coil line levels for a table entry, in M11, M12, M21, M22 order
pub fn coil_levels(pattern: u8) -> [Level; 4] {
    [3, 2, 1, 0].map(|bit| Level::from(pattern & (1 << bit) != 0))
}

/// Convert an angle to half-steps; only whole half-steps are accepted
pub fn degrees_to_steps(degrees: f64) -> Result<i32, StageError> {
    let steps = degrees / DEGREES_PER_STEP;
    let whole = steps.round();
    // Relative tolerance covers float representation error only (e.g. 2.7 / 0.9)
    let exact = (steps - whole).abs() <= whole.abs().max(1.0) * 1e-9;
    if !steps.is_finite() || !exact || whole.abs() > i32::MAX as f64 {
        return Err(StageError::InvalidArgument { degrees, steps });
    }
    Ok(whole as i32)
}

/// Owns the phase cursor and the four coil lines
#[derive(Debug)]
pub struct Sequencer {
    coils: [u8; 4],
    phase: usize,
    settle_delay: Duration,
    step_delay: Duration,
}

impl Sequencer {
    pub fn new(coils: [u8; 4], timing: &Timing) -> Self {
        Self {
            coils,
            phase: 0,
            settle_delay: timing.settle_delay,
            step_delay: timing.step_delay,
        }
    }

    /// Index of the next table entry to be written, in 0..8
    pub fn phase(&self) -> usize {
        self.phase
    }

    pub fn step_delay(&self) -> Duration {
        self.step_delay
    }

    /// Step `count` half-steps (negative = reverse) with `delay` between coil changes
    pub fn step<P, C>(
        &mut self,
        port: &mut P,
        clock: &C,
        count: i32,
        delay: Duration,
    ) -> Result<(), HwError>
    where
        P: DigitalPort + ?Sized,
        C: Clock + ?Sized,
    {
        if count == 0 {
            return Ok(());
        }
        debug!(
            "Stepping {} half-steps from phase {} ({:?} per step)",
            count, self.phase, delay
        );

        clock.sleep(self.settle_delay);
        for _ in 0..count.unsigned_abs() {
            if count > 0 {
                self.apply(port, self.phase)?;
                self.phase = (self.phase + 1) % PHASES;
            } else {
                // The pattern on the coils is the one before the cursor
                self.phase = (self.phase + PHASES - 1) % PHASES;
                self.apply(port, (self.phase + PHASES - 1) % PHASES)?;
            }
            clock.sleep(delay);
        }
        Ok(())
    }

    fn apply<P: DigitalPort + ?Sized>(&self, port: &mut P, index: usize) -> Result<(), HwError> {
        let levels = coil_levels(HALF_STEP_TABLE[index]);
        for (&pin, level) in self.coils.iter().zip(levels) {
            port.write(pin, level)?;
        }
        Ok(())
    }
}
