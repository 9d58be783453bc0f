// Motorized focus lens control over I2C
//
// The lens driver takes a 10-bit position sent as two bytes:
// [D9..D4] in the first byte's low six bits, [D3..D0] in the second's
// high nibble.

use tracing::{debug, warn};

use crate::config::FOCUS_DEVICE_ADDRESS;
use crate::hw::FocusBus;

/// Two-byte command for a focus value
pub fn focus_bytes(value: u16) -> [u8; 2] {
    let shifted = ((value as u32) << 4) & 0x3ff0;
    let high = ((shifted >> 8) & 0x3f) as u8;
    let low = (shifted & 0xf0) as u8;
    [high, low]
}

/// Send the focus value to the lens on every bus controller present.
///
/// Best effort: missing controllers and failed writes are skipped. Returns
/// the number of controllers that accepted the command.
pub fn broadcast_focus<B: FocusBus + ?Sized>(bus: &mut B, value: u16) -> usize {
    let bytes = focus_bytes(value);
    let mut delivered = 0;

    for index in bus.available_buses() {
        match bus.write(index, FOCUS_DEVICE_ADDRESS, &bytes) {
            Ok(()) => {
                debug!("Focus {} -> bus {} {:02X?}", value, index, bytes);
                delivered += 1;
            }
            Err(e) => warn!("Focus write to bus {} failed: {}", index, e),
        }
    }
    if delivered == 0 {
        debug!("No focus bus controller reached");
    }
    delivered
}
