// In-memory port and bus for tests, dry runs and the --simulate flag
//
// Both types are cheap handles over shared state: clone one, hand the clone
// to the driver, and inspect what the driver did through the other.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

use super::port::{DigitalPort, Direction, FocusBus, Level};
use crate::error::HwError;

/// One observed port operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortEvent {
    Configure { pin: u8, direction: Direction },
    Write { pin: u8, level: Level },
    Read { pin: u8, level: Level },
    Release { pin: u8 },
}

#[derive(Debug, Default)]
struct PortState {
    configured: HashMap<u8, Direction>,
    outputs: HashMap<u8, Level>,
    inputs: HashMap<u8, Level>,
    scripts: HashMap<u8, VecDeque<Level>>,
    failing: HashSet<u8>,
    events: Vec<PortEvent>,
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedPort {
    state: Arc<Mutex<PortState>>,
}

impl SimulatedPort {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, PortState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Steady level returned once any scripted levels are used up
    pub fn set_input(&self, pin: u8, level: Level) {
        self.state().inputs.insert(pin, level);
    }

    /// Levels returned by successive reads of `pin`, before the steady level
    pub fn script_input(&self, pin: u8, levels: impl IntoIterator<Item = Level>) {
        self.state()
            .scripts
            .entry(pin)
            .or_default()
            .extend(levels);
    }

    /// Make `configure` fail for this pin
    pub fn fail_configure(&self, pin: u8) {
        self.state().failing.insert(pin);
    }

    pub fn events(&self) -> Vec<PortEvent> {
        self.state().events.clone()
    }

    pub fn clear_events(&self) {
        self.state().events.clear();
    }

    /// All writes in order as (pin, level)
    pub fn writes(&self) -> Vec<(u8, Level)> {
        self.state()
            .events
            .iter()
            .filter_map(|event| match *event {
                PortEvent::Write { pin, level } => Some((pin, level)),
                _ => None,
            })
            .collect()
    }

    /// Number of reads served for `pin`
    pub fn read_count(&self, pin: u8) -> usize {
        self.state()
            .events
            .iter()
            .filter(|event| matches!(event, PortEvent::Read { pin: p, .. } if *p == pin))
            .count()
    }

    /// Last level written to `pin`
    pub fn output(&self, pin: u8) -> Option<Level> {
        self.state().outputs.get(&pin).copied()
    }

    pub fn direction(&self, pin: u8) -> Option<Direction> {
        self.state().configured.get(&pin).copied()
    }

    pub fn configured_count(&self) -> usize {
        self.state().configured.len()
    }
}

impl DigitalPort for SimulatedPort {
    fn configure(&mut self, pin: u8, direction: Direction) -> Result<(), HwError> {
        let mut state = self.state();
        if state.failing.contains(&pin) {
            return Err(HwError::Backend(format!("pin {} is unavailable", pin)));
        }
        state.configured.insert(pin, direction);
        state.events.push(PortEvent::Configure { pin, direction });
        Ok(())
    }

    fn write(&mut self, pin: u8, level: Level) -> Result<(), HwError> {
        let mut state = self.state();
        if state.configured.get(&pin) != Some(&Direction::Output) {
            return Err(HwError::PinNotConfigured { pin });
        }
        trace!("sim write pin {} = {:?}", pin, level);
        state.outputs.insert(pin, level);
        state.events.push(PortEvent::Write { pin, level });
        Ok(())
    }

    fn read(&mut self, pin: u8) -> Result<Level, HwError> {
        let mut guard = self.state();
        let state = &mut *guard;
        let level = match state.configured.get(&pin).copied() {
            Some(Direction::Input(_)) => {
                let steady = state.inputs.get(&pin).copied().unwrap_or(Level::Low);
                state
                    .scripts
                    .get_mut(&pin)
                    .and_then(VecDeque::pop_front)
                    .unwrap_or(steady)
            }
            Some(Direction::Output) => state.outputs.get(&pin).copied().unwrap_or(Level::Low),
            None => return Err(HwError::PinNotConfigured { pin }),
        };
        state.events.push(PortEvent::Read { pin, level });
        Ok(level)
    }

    fn release(&mut self, pin: u8) -> Result<(), HwError> {
        let mut state = self.state();
        state.configured.remove(&pin);
        state.outputs.remove(&pin);
        state.events.push(PortEvent::Release { pin });
        Ok(())
    }
}

#[derive(Debug, Default)]
struct BusState {
    present: Vec<u8>,
    failing: HashSet<u8>,
    writes: Vec<(u8, u16, Vec<u8>)>,
}

/// Focus bus with a configurable set of controllers
#[derive(Debug, Clone, Default)]
pub struct SimulatedBus {
    state: Arc<Mutex<BusState>>,
}

impl SimulatedBus {
    pub fn new(present: impl IntoIterator<Item = u8>) -> Self {
        let bus = Self::default();
        bus.state().present = present.into_iter().collect();
        bus
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make writes to controller `bus` fail
    pub fn fail_bus(&self, bus: u8) {
        self.state().failing.insert(bus);
    }

    /// Successful writes as (bus, address, bytes)
    pub fn writes(&self) -> Vec<(u8, u16, Vec<u8>)> {
        self.state().writes.clone()
    }
}

impl FocusBus for SimulatedBus {
    fn available_buses(&self) -> Vec<u8> {
        self.state().present.clone()
    }

    fn write(&mut self, bus: u8, address: u16, bytes: &[u8]) -> Result<(), HwError> {
        let mut state = self.state();
        if !state.present.contains(&bus) || state.failing.contains(&bus) {
            return Err(HwError::Backend(format!("no device on bus {}", bus)));
        }
        state.writes.push((bus, address, bytes.to_vec()));
        Ok(())
    }
}
