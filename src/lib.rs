//! Driver core for a motorized rotating imaging stage: half-step stepper
//! sequencing, sensor-based homing, LED and motor standby outputs, and
//! motorized lens focus over I2C.

pub mod config;
pub mod control;
pub mod error;
pub mod focus;
pub mod hw;
pub mod messages;
pub mod motor;

pub use config::StageConfig;
pub use control::{StageController, StageHandle};
pub use error::{ConfigError, HwError, StageError};
pub use motor::StageDriver;
