// Stage geometry, timing defaults and the loadable configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Half-steps for one full turn of the stage (0.9 degrees per half-step)
pub const STEPS_PER_REVOLUTION: u32 = 400;
pub const DEGREES_PER_STEP: f64 = 360.0 / STEPS_PER_REVOLUTION as f64;

/// Time between coil changes, tuned to the coil response of the stage motor
pub const DEFAULT_STEP_DELAY: Duration = Duration::from_millis(30);

/// Wait before the first step so the driver outputs can activate
pub const SETTLE_DELAY: Duration = Duration::from_millis(5);

/// Wall-clock budget for a homing run
pub const DEFAULT_HOMING_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_HOMING_TIMEOUT_S: u64 = 24 * 60 * 60;

// Motorized focus lens (VCM driver on the camera module)
pub const FOCUS_DEVICE_ADDRESS: u16 = 0x0c;
pub const FOCUS_BUSES: [u8; 2] = [0, 1];

/// Raw pin assignment as supplied by the configuration file.
///
/// Key names follow the settings file of the imaging rig, so an existing
/// file deserializes without changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PinConfig {
    #[serde(rename = "LED")]
    pub led: Option<u8>,
    pub sensor: Option<u8>,
    #[serde(rename = "PWMa")]
    pub pwm_a: Option<u8>,
    #[serde(rename = "PWMb")]
    pub pwm_b: Option<u8>,
    #[serde(rename = "coilpin_M11")]
    pub coil_m11: Option<u8>,
    #[serde(rename = "coilpin_M12")]
    pub coil_m12: Option<u8>,
    #[serde(rename = "coilpin_M21")]
    pub coil_m21: Option<u8>,
    #[serde(rename = "coilpin_M22")]
    pub coil_m22: Option<u8>,
    #[serde(rename = "stdby")]
    pub standby: Option<u8>,
}

impl PinConfig {
    /// BCM numbering of the reference wiring
    pub fn reference() -> Self {
        Self {
            led: Some(17),
            sensor: Some(4),
            pwm_a: Some(8),
            pwm_b: Some(14),
            coil_m11: Some(16),
            coil_m12: Some(12),
            coil_m21: Some(20),
            coil_m22: Some(21),
            standby: Some(26),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    #[serde(flatten)]
    pub pins: PinConfig,
    /// Half-steps from the sensor trigger point to the true zero (signed)
    pub calibration: i32,
    pub step_delay_ms: u64,
    pub settle_delay_ms: u64,
    pub homing_timeout_s: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            pins: PinConfig::reference(),
            calibration: 0,
            step_delay_ms: DEFAULT_STEP_DELAY.as_millis() as u64,
            settle_delay_ms: SETTLE_DELAY.as_millis() as u64,
            homing_timeout_s: DEFAULT_HOMING_TIMEOUT.as_secs(),
        }
    }
}

impl StageConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.homing_timeout_s == 0 || self.homing_timeout_s > MAX_HOMING_TIMEOUT_S {
            return Err(ConfigError::InvalidValue {
                field: "homing_timeout_s",
                reason: format!("must be between 1 and {} seconds", MAX_HOMING_TIMEOUT_S),
            });
        }
        Ok(())
    }

    pub fn timing(&self) -> Timing {
        Timing {
            step_delay: Duration::from_millis(self.step_delay_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            homing_timeout: Duration::from_secs(self.homing_timeout_s),
        }
    }
}

/// Delay and timeout tuning used by the sequencer and homing controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    pub step_delay: Duration,
    pub settle_delay: Duration,
    pub homing_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            step_delay: DEFAULT_STEP_DELAY,
            settle_delay: SETTLE_DELAY,
            homing_timeout: DEFAULT_HOMING_TIMEOUT,
        }
    }
}
