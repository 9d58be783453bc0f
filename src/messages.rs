// Message types exchanged with the stage control task

use serde::{Deserialize, Serialize};

use crate::motor::HomingReport;

// Command from orchestration code -> control task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum StageCommand {
    Rotate { degrees: f64 },
    FindHome {
        #[serde(default)]
        calibration: Option<i32>,
    },
    SetLed { on: bool },
    SetMotor { on: bool },
    SetFocus { value: u16 },
    Status,
}

// Result of a command, sent back to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum StageReply {
    Done,
    Rotated { steps: i32 },
    Homing(HomingReport),
    Focus { buses: usize },
    Status(StageStatus),
}

/// Read-only mirrors of the last commanded outputs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStatus {
    pub led: bool,
    pub motor_on: bool,
}
