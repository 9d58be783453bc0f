// Logical pin roles and the validated role -> pin table

use std::fmt;

use crate::config::PinConfig;
use crate::error::ConfigError;

/// Logical function of a line on the stage board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinRole {
    Led,
    Sensor,
    PwmA,
    PwmB,
    CoilM11,
    CoilM12,
    CoilM21,
    CoilM22,
    Standby,
}

impl PinRole {
    pub const ALL: [PinRole; 9] = [
        PinRole::Led,
        PinRole::Sensor,
        PinRole::PwmA,
        PinRole::PwmB,
        PinRole::CoilM11,
        PinRole::CoilM12,
        PinRole::CoilM21,
        PinRole::CoilM22,
        PinRole::Standby,
    ];

    /// Coil lines in half-step table bit order
    pub const COILS: [PinRole; 4] = [
        PinRole::CoilM11,
        PinRole::CoilM12,
        PinRole::CoilM21,
        PinRole::CoilM22,
    ];

    /// Key used for this role in the configuration file
    pub fn name(self) -> &'static str {
        match self {
            PinRole::Led => "LED",
            PinRole::Sensor => "sensor",
            PinRole::PwmA => "PWMa",
            PinRole::PwmB => "PWMb",
            PinRole::CoilM11 => "coilpin_M11",
            PinRole::CoilM12 => "coilpin_M12",
            PinRole::CoilM21 => "coilpin_M21",
            PinRole::CoilM22 => "coilpin_M22",
            PinRole::Standby => "stdby",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    fn lookup(self, config: &PinConfig) -> Option<u8> {
        match self {
            PinRole::Led => config.led,
            PinRole::Sensor => config.sensor,
            PinRole::PwmA => config.pwm_a,
            PinRole::PwmB => config.pwm_b,
            PinRole::CoilM11 => config.coil_m11,
            PinRole::CoilM12 => config.coil_m12,
            PinRole::CoilM21 => config.coil_m21,
            PinRole::CoilM22 => config.coil_m22,
            PinRole::Standby => config.standby,
        }
    }
}

impl fmt::Display for PinRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Complete, duplicate-free mapping of every role to a physical pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinMap {
    pins: [u8; 9],
}

impl PinMap {
    pub fn from_config(config: &PinConfig) -> Result<Self, ConfigError> {
        let mut pins = [0u8; 9];
        for role in PinRole::ALL {
            let pin = role
                .lookup(config)
                .ok_or(ConfigError::MissingPin { role: role.name() })?;

            if let Some(&first) = PinRole::ALL[..role.index()]
                .iter()
                .find(|other| pins[other.index()] == pin)
            {
                return Err(ConfigError::DuplicatePin {
                    pin,
                    first: first.name(),
                    second: role.name(),
                });
            }
            pins[role.index()] = pin;
        }
        Ok(Self { pins })
    }

    pub fn pin(&self, role: PinRole) -> u8 {
        self.pins[role.index()]
    }

    pub fn coils(&self) -> [u8; 4] {
        PinRole::COILS.map(|role| self.pin(role))
    }

    /// (role, pin) pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (PinRole, u8)> + '_ {
        PinRole::ALL.iter().map(|&role| (role, self.pin(role)))
    }
}
