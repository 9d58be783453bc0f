// Hardware boundary for the imaging stage
//
// Provides:
// - Digital I/O port and focus bus traits (the only hardware-specific seams)
// - Logical pin roles and the validated pin map
// - Real and virtual clocks for blocking delays
// - In-memory simulated back ends, and rppal back ends behind the `rpi` feature

mod clock;
mod pins;
mod port;
pub mod sim;

#[cfg(feature = "rpi")]
pub mod rpi;

pub use clock::{Clock, ManualClock, SystemClock};
pub use pins::{PinMap, PinRole};
pub use port::{Direction, DigitalPort, FocusBus, Level, Pull};
pub use sim::{PortEvent, SimulatedBus, SimulatedPort};
