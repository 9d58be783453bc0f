// Motor control module for the rotating imaging stage
//
// Provides:
// - Half-step coil sequencing with a persistent phase cursor
// - Bounded-time homing against the position sensor
// - High-level stage driver API (motion, LED, standby, focus)

mod driver;
pub mod homing;
pub mod sequencer;

pub use driver::StageDriver;
pub use homing::{HomingOutcome, HomingPhase, HomingReport};
pub use sequencer::{HALF_STEP_TABLE, Sequencer, degrees_to_steps};
