// Dedicated hardware control task
//
// The stage driver lives on one OS thread and is only reached through a
// command channel, so motion, sensor reads and output writes from any
// number of callers are serialized. Commands block the control thread for
// their physical duration; async callers just await the reply.

use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{Result, StageError};
use crate::hw::{Clock, DigitalPort, FocusBus};
use crate::messages::{StageCommand, StageReply, StageStatus};
use crate::motor::{HomingReport, StageDriver};

/// Pending commands before senders start waiting
const QUEUE_DEPTH: usize = 16;

struct Request {
    command: StageCommand,
    reply: oneshot::Sender<Result<StageReply>>,
}

/// Running control task
pub struct StageController {
    thread: JoinHandle<()>,
}

impl StageController {
    /// Move the driver onto its own thread and return a handle to it.
    ///
    /// The thread exits, releasing all pins, once every handle is dropped.
    pub fn spawn<P, B, C>(driver: StageDriver<P, B, C>) -> std::io::Result<(Self, StageHandle)>
    where
        P: DigitalPort + Send + 'static,
        B: FocusBus + Send + 'static,
        C: Clock + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let thread = thread::Builder::new()
            .name("stage-control".to_string())
            .spawn(move || control_loop(driver, rx))?;
        Ok((Self { thread }, StageHandle { tx }))
    }

    /// Wait for the control thread to finish
    pub fn join(self) {
        if self.thread.join().is_err() {
            warn!("Stage control thread panicked");
        }
    }
}

fn control_loop<P, B, C>(mut driver: StageDriver<P, B, C>, mut rx: mpsc::Receiver<Request>)
where
    P: DigitalPort,
    B: FocusBus,
    C: Clock,
{
    info!("Stage control task started");
    while let Some(Request { command, reply }) = rx.blocking_recv() {
        debug!("Executing {:?}", command);
        let result = execute(&mut driver, command);
        if let Err(e) = &result {
            warn!("Stage command failed: {}", e);
        }
        // Caller may have given up waiting; the command has run regardless
        let _ = reply.send(result);
    }

    info!("All stage handles dropped, shutting down");
    if let Err(e) = driver.shutdown() {
        warn!("Stage shutdown failed: {}", e);
    }
}

fn execute<P, B, C>(driver: &mut StageDriver<P, B, C>, command: StageCommand) -> Result<StageReply>
where
    P: DigitalPort,
    B: FocusBus,
    C: Clock,
{
    let reply = match command {
        StageCommand::Rotate { degrees } => StageReply::Rotated {
            steps: driver.rotate(degrees)?,
        },
        StageCommand::FindHome { calibration } => StageReply::Homing(driver.find_home(calibration)?),
        StageCommand::SetLed { on } => {
            driver.set_led(on)?;
            StageReply::Done
        }
        StageCommand::SetMotor { on } => {
            driver.set_motor_standby(on)?;
            StageReply::Done
        }
        StageCommand::SetFocus { value } => StageReply::Focus {
            buses: driver.set_focus(value),
        },
        StageCommand::Status => StageReply::Status(StageStatus {
            led: driver.led(),
            motor_on: driver.motor_on(),
        }),
    };
    Ok(reply)
}

/// Cloneable sender side of the control task
#[derive(Clone)]
pub struct StageHandle {
    tx: mpsc::Sender<Request>,
}

impl StageHandle {
    /// Queue a command and wait for its reply
    pub async fn execute(&self, command: StageCommand) -> Result<StageReply> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request { command, reply })
            .await
            .map_err(|_| StageError::ControllerClosed)?;
        rx.await.map_err(|_| StageError::ControllerClosed)?
    }

    /// Same as `execute`, for callers outside an async runtime
    pub fn blocking_execute(&self, command: StageCommand) -> Result<StageReply> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .blocking_send(Request { command, reply })
            .map_err(|_| StageError::ControllerClosed)?;
        rx.blocking_recv().map_err(|_| StageError::ControllerClosed)?
    }

    pub async fn rotate(&self, degrees: f64) -> Result<i32> {
        match self.execute(StageCommand::Rotate { degrees }).await? {
            StageReply::Rotated { steps } => Ok(steps),
            other => Err(unexpected(other)),
        }
    }

    pub async fn find_home(&self, calibration: Option<i32>) -> Result<HomingReport> {
        match self.execute(StageCommand::FindHome { calibration }).await? {
            StageReply::Homing(report) => Ok(report),
            other => Err(unexpected(other)),
        }
    }

    pub async fn set_led(&self, on: bool) -> Result<()> {
        self.execute(StageCommand::SetLed { on }).await.map(|_| ())
    }

    pub async fn set_motor(&self, on: bool) -> Result<()> {
        self.execute(StageCommand::SetMotor { on }).await.map(|_| ())
    }

    pub async fn set_focus(&self, value: u16) -> Result<usize> {
        match self.execute(StageCommand::SetFocus { value }).await? {
            StageReply::Focus { buses } => Ok(buses),
            other => Err(unexpected(other)),
        }
    }

    pub async fn status(&self) -> Result<StageStatus> {
        match self.execute(StageCommand::Status).await? {
            StageReply::Status(status) => Ok(status),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(reply: StageReply) -> StageError {
    StageError::UnexpectedReply(format!("{:?}", reply))
}
