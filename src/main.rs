use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use spiro_stage::hw::{DigitalPort, FocusBus, SimulatedBus, SimulatedPort, SystemClock};
use spiro_stage::messages::{StageCommand, StageReply};
use spiro_stage::{StageConfig, StageController, StageDriver, StageHandle};

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type Driver = StageDriver<Box<dyn DigitalPort + Send>, Box<dyn FocusBus + Send>, SystemClock>;

#[derive(Parser)]
#[command(name = "spiro-stage", about = "Control the rotating imaging stage")]
struct Cli {
    /// JSON settings file with pin assignments and calibration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the in-memory port instead of real GPIO
    #[arg(long)]
    simulate: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rotate by an angle (multiple of 0.9 degrees, negative = reverse)
    Rotate {
        #[arg(allow_hyphen_values = true)]
        degrees: f64,
    },
    /// Find the home position
    Home {
        /// Override the configured calibration offset (half-steps)
        #[arg(long, allow_hyphen_values = true)]
        calibration: Option<i32>,
    },
    Led { state: Switch },
    /// Motor standby line (on = motor active)
    Motor { state: Switch },
    /// Set the motorized lens focus (0-1023)
    Focus { value: u16 },
    /// Read JSON commands from stdin, one per line
    Serve,
}

impl Command {
    /// Single stage command for this invocation; `None` for `serve`
    fn into_stage_command(self) -> Option<StageCommand> {
        Some(match self {
            Command::Rotate { degrees } => StageCommand::Rotate { degrees },
            Command::Home { calibration } => StageCommand::FindHome { calibration },
            Command::Led { state } => StageCommand::SetLed { on: state.into() },
            Command::Motor { state } => StageCommand::SetMotor { on: state.into() },
            Command::Focus { value } => StageCommand::SetFocus { value },
            Command::Serve => return None,
        })
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

impl From<Switch> for bool {
    fn from(switch: Switch) -> bool {
        matches!(switch, Switch::On)
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    match run(Cli::parse()).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Stage error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32, BoxError> {
    let config = match &cli.config {
        Some(path) => StageConfig::load(path)?,
        None => StageConfig::default(),
    };

    let driver = open_stage(&config, cli.simulate)?;
    let (controller, handle) = StageController::spawn(driver)?;

    let code = match cli.command.into_stage_command() {
        Some(command) => one_shot(&handle, command).await?,
        None => {
            serve(&handle).await?;
            0
        }
    };

    drop(handle);
    tokio::task::spawn_blocking(move || controller.join()).await?;
    Ok(code)
}

async fn one_shot(handle: &StageHandle, command: StageCommand) -> Result<i32, BoxError> {
    let reply = handle.execute(command).await?;
    println!("{}", serde_json::to_string(&reply)?);

    // A failed homing run is reported, not fatal, but the exit code shows it
    Ok(match reply {
        StageReply::Homing(report) if !report.is_homed() => 2,
        _ => 0,
    })
}

async fn serve(handle: &StageHandle) -> Result<(), BoxError> {
    info!("Reading stage commands from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<StageCommand>(&line) {
            Ok(command) => match handle.execute(command).await {
                Ok(reply) => serde_json::json!({ "ok": reply }),
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            },
            Err(e) => {
                warn!("Failed to parse command: {}", e);
                serde_json::json!({ "error": format!("invalid command: {}", e) })
            }
        };
        println!("{}", response);
    }
    Ok(())
}

fn open_stage(config: &StageConfig, simulate: bool) -> Result<Driver, BoxError> {
    let clock = SystemClock::new();

    #[cfg(feature = "rpi")]
    if !simulate {
        use spiro_stage::config::FOCUS_BUSES;
        use spiro_stage::hw::rpi::{RpiFocusBus, RpiPort};

        let port: Box<dyn DigitalPort + Send> = Box::new(RpiPort::new()?);
        let bus: Box<dyn FocusBus + Send> = Box::new(RpiFocusBus::new(&FOCUS_BUSES));
        return Ok(StageDriver::initialize(config, port, bus, clock)?);
    }

    #[cfg(not(feature = "rpi"))]
    if !simulate {
        warn!("Built without the `rpi` feature, running against the simulated port");
    }

    let port: Box<dyn DigitalPort + Send> = Box::new(SimulatedPort::new());
    let bus: Box<dyn FocusBus + Send> = Box::new(SimulatedBus::new([0u8; 0]));
    Ok(StageDriver::initialize(config, port, bus, clock)?)
}
