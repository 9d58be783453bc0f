// Stage test: careful, step-by-step bring-up of the imaging stage
//
// Usage: cargo run --example stage_test --features rpi -- [config.json]
// Without the `rpi` feature every step runs against the simulated port.
//
// Safety features:
// - Explicit confirmation before any motion
// - Small test rotations first
// - Motor put back in standby and pins released at the end

use std::io::{self, Write};
use std::time::Duration;

use spiro_stage::hw::{DigitalPort, FocusBus, SystemClock};
use spiro_stage::motor::sequencer::HALF_STEP_TABLE;
use spiro_stage::{StageConfig, StageDriver};

type Stage = StageDriver<Box<dyn DigitalPort>, Box<dyn FocusBus>, SystemClock>;

fn confirm(prompt: &str) -> bool {
    print!("{} [y/N]: ", prompt);
    let _ = io::stdout().flush();
    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    input.trim().eq_ignore_ascii_case("y")
}

#[cfg(feature = "rpi")]
fn open(config: &StageConfig) -> Result<Stage, Box<dyn std::error::Error>> {
    use spiro_stage::config::FOCUS_BUSES;
    use spiro_stage::hw::rpi::{RpiFocusBus, RpiPort};

    let port: Box<dyn DigitalPort> = Box::new(RpiPort::new()?);
    let bus: Box<dyn FocusBus> = Box::new(RpiFocusBus::new(&FOCUS_BUSES));
    Ok(StageDriver::initialize(config, port, bus, SystemClock::new())?)
}

#[cfg(not(feature = "rpi"))]
fn open(config: &StageConfig) -> Result<Stage, Box<dyn std::error::Error>> {
    use spiro_stage::hw::{SimulatedBus, SimulatedPort};

    println!("(built without `rpi`: using the simulated port)");
    let port: Box<dyn DigitalPort> = Box::new(SimulatedPort::new());
    let bus: Box<dyn FocusBus> = Box::new(SimulatedBus::new([0, 1]));
    Ok(StageDriver::initialize(config, port, bus, SystemClock::new())?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => StageConfig::load(path)?,
        None => StageConfig::default(),
    };

    println!("Spiro stage test (WITH MOTION)");
    println!("Make sure nothing is blocking the stage before proceeding!");
    println!();
    println!("Pins: {:?}", config.pins);
    println!("Calibration: {} half-steps", config.calibration);
    println!();

    // ========== STEP 1: Claim pins ==========
    println!("Step 1: Initializing pins (LED off, motor in standby)...");
    let mut stage = open(&config)?;
    println!("  ✓ Pins configured");
    println!();

    // ========== STEP 2: LED ==========
    if confirm("Blink the LED?") {
        for _ in 0..3 {
            stage.set_led(true)?;
            std::thread::sleep(Duration::from_millis(300));
            stage.set_led(false)?;
            std::thread::sleep(Duration::from_millis(300));
        }
        println!("  ✓ LED blinked");
    }
    println!();

    // ========== STEP 3: Small rotations ==========
    println!("Step 3: Small rotation test (9 degrees each way)");
    println!("  Coil sequence: {:04b}", HALF_STEP_TABLE[0]);
    for pattern in &HALF_STEP_TABLE[1..] {
        println!("                 {:04b}", pattern);
    }
    if !confirm("Proceed with motion test?") {
        stage.shutdown()?;
        return Ok(());
    }

    stage.start_motor()?;
    stage.rotate(9.0)?;
    println!("  ✓ Forward, phase now {}", stage.phase());
    std::thread::sleep(Duration::from_millis(500));
    stage.rotate(-9.0)?;
    println!("  ✓ Reverse, phase now {}", stage.phase());
    println!();

    // ========== STEP 4: Homing ==========
    println!("Step 4: Homing (up to {} s)", config.homing_timeout_s);
    if confirm("Find home position?") {
        let report = stage.find_home(None)?;
        if report.is_homed() {
            println!(
                "  ✓ Homed after {} steps + {} calibration steps ({:?})",
                report.search_steps, report.calibration_steps, report.elapsed
            );
        } else {
            println!("  ✗ Homing timed out: {:?}", report.outcome);
        }
    }
    println!();

    // ========== STEP 5: Focus ==========
    if confirm("Sweep the lens focus?") {
        for value in [0u16, 256, 512, 768, 1023] {
            let buses = stage.set_focus(value);
            println!("  Focus {} sent to {} bus controller(s)", value, buses);
            std::thread::sleep(Duration::from_millis(500));
        }
    }

    // ========== FINAL: Standby and cleanup ==========
    println!();
    println!("Step 6: Putting motor in standby and releasing pins...");
    stage.stop_motor()?;
    stage.shutdown()?;
    println!("  ✓ Done");

    Ok(())
}
