// Digital I/O and two-wire bus traits implemented by hardware back ends

use crate::error::HwError;

/// Logic level of a digital line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

/// Input bias resistor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    None,
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Output,
    Input(Pull),
}

/// Digital I/O port addressed by physical pin number
///
/// Implementations own whatever handles the platform needs; the stage logic
/// only ever sees pin numbers and levels.
pub trait DigitalPort {
    /// Claim a pin and set its direction
    fn configure(&mut self, pin: u8, direction: Direction) -> Result<(), HwError>;

    /// Drive a configured output pin
    fn write(&mut self, pin: u8, level: Level) -> Result<(), HwError>;

    /// Sample a configured input pin
    fn read(&mut self, pin: u8) -> Result<Level, HwError>;

    /// Return a pin to its unconfigured (high-impedance) state
    fn release(&mut self, pin: u8) -> Result<(), HwError>;
}

/// Byte-oriented two-wire bus, possibly spread over several controllers
pub trait FocusBus {
    /// Controller indices present on this host
    fn available_buses(&self) -> Vec<u8>;

    /// Write raw bytes to a device on the given controller
    fn write(&mut self, bus: u8, address: u16, bytes: &[u8]) -> Result<(), HwError>;
}

impl<P: DigitalPort + ?Sized> DigitalPort for Box<P> {
    fn configure(&mut self, pin: u8, direction: Direction) -> Result<(), HwError> {
        (**self).configure(pin, direction)
    }

    fn write(&mut self, pin: u8, level: Level) -> Result<(), HwError> {
        (**self).write(pin, level)
    }

    fn read(&mut self, pin: u8) -> Result<Level, HwError> {
        (**self).read(pin)
    }

    fn release(&mut self, pin: u8) -> Result<(), HwError> {
        (**self).release(pin)
    }
}

impl<B: FocusBus + ?Sized> FocusBus for Box<B> {
    fn available_buses(&self) -> Vec<u8> {
        (**self).available_buses()
    }

    fn write(&mut self, bus: u8, address: u16, bytes: &[u8]) -> Result<(), HwError> {
        (**self).write(bus, address, bytes)
    }
}
