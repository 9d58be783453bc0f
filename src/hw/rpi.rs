// Raspberry Pi back ends built on rppal
//
// Pins are claimed lazily on `configure` and dropped on `release`; rppal
// resets a pin to its original mode when the handle is dropped.

use std::collections::HashMap;
use std::path::Path;

use rppal::gpio::{Gpio, InputPin, OutputPin};
use rppal::i2c::I2c;
use tracing::debug;

use super::port::{DigitalPort, Direction, FocusBus, Level, Pull};
use crate::error::HwError;

enum Line {
    Output(OutputPin),
    Input(InputPin),
}

/// GPIO port on the Pi header (BCM numbering)
pub struct RpiPort {
    gpio: Gpio,
    lines: HashMap<u8, Line>,
}

impl RpiPort {
    pub fn new() -> Result<Self, HwError> {
        Ok(Self {
            gpio: Gpio::new()?,
            lines: HashMap::new(),
        })
    }
}

fn to_rppal(level: Level) -> rppal::gpio::Level {
    match level {
        Level::Low => rppal::gpio::Level::Low,
        Level::High => rppal::gpio::Level::High,
    }
}

impl DigitalPort for RpiPort {
    fn configure(&mut self, pin: u8, direction: Direction) -> Result<(), HwError> {
        // Drop any previous handle first so the pin can be claimed again
        self.lines.remove(&pin);
        let raw = self.gpio.get(pin)?;
        let line = match direction {
            Direction::Output => Line::Output(raw.into_output()),
            Direction::Input(Pull::None) => Line::Input(raw.into_input()),
            Direction::Input(Pull::Down) => Line::Input(raw.into_input_pulldown()),
            Direction::Input(Pull::Up) => Line::Input(raw.into_input_pullup()),
        };
        debug!("Configured GPIO {} as {:?}", pin, direction);
        self.lines.insert(pin, line);
        Ok(())
    }

    fn write(&mut self, pin: u8, level: Level) -> Result<(), HwError> {
        match self.lines.get_mut(&pin) {
            Some(Line::Output(out)) => {
                out.write(to_rppal(level));
                Ok(())
            }
            _ => Err(HwError::PinNotConfigured { pin }),
        }
    }

    fn read(&mut self, pin: u8) -> Result<Level, HwError> {
        match self.lines.get(&pin) {
            Some(Line::Input(input)) => Ok(Level::from(input.is_high())),
            Some(Line::Output(out)) => Ok(Level::from(out.is_set_high())),
            None => Err(HwError::PinNotConfigured { pin }),
        }
    }

    fn release(&mut self, pin: u8) -> Result<(), HwError> {
        self.lines.remove(&pin);
        Ok(())
    }
}

/// Focus lens driver reached through the kernel I2C device nodes
#[derive(Debug, Default)]
pub struct RpiFocusBus {
    candidates: Vec<u8>,
}

impl RpiFocusBus {
    pub fn new(candidates: &[u8]) -> Self {
        Self {
            candidates: candidates.to_vec(),
        }
    }
}

impl FocusBus for RpiFocusBus {
    fn available_buses(&self) -> Vec<u8> {
        self.candidates
            .iter()
            .copied()
            .filter(|bus| Path::new(&format!("/dev/i2c-{}", bus)).exists())
            .collect()
    }

    fn write(&mut self, bus: u8, address: u16, bytes: &[u8]) -> Result<(), HwError> {
        let mut i2c = I2c::with_bus(bus)?;
        i2c.set_slave_address(address)?;
        i2c.write(bytes)?;
        Ok(())
    }
}
