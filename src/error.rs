// Error types for the stage controller

/// Errors raised by a hardware back end (GPIO port or focus bus)
#[derive(Debug, thiserror::Error)]
pub enum HwError {
    #[error("Pin {pin} has not been configured")]
    PinNotConfigured { pin: u8 },

    #[cfg(feature = "rpi")]
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),

    #[cfg(feature = "rpi")]
    #[error("I2C error: {0}")]
    I2c(#[from] rppal::i2c::Error),

    #[error("Hardware back end error: {0}")]
    Backend(String),
}

/// Errors in the pin mapping or tuning values
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No pin mapped for role {role}")]
    MissingPin { role: &'static str },

    #[error("Pin {pin} is mapped to both {first} and {second}")]
    DuplicatePin {
        pin: u8,
        first: &'static str,
        second: &'static str,
    },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("{degrees} degrees is not a whole number of half-steps ({steps} steps)")]
    InvalidArgument { degrees: f64, steps: f64 },

    #[error("Hardware error: {0}")]
    Hardware(#[from] HwError),

    #[error("Stage controller is no longer running")]
    ControllerClosed,

    #[error("Unexpected reply from stage controller: {0}")]
    UnexpectedReply(String),
}

pub type Result<T> = std::result::Result<T, StageError>;
