//! Error types for the sequence tester.
//!
//! Every public device operation returns a [`DeviceResult`]. The variants of
//! [`DeviceError`] form a closed taxonomy so tests can match on exactly what
//! went wrong:
//!
//! - **`OutOfRange`**: a bounded setting was given a value outside `[min, max]`.
//! - **`ReadOnly`**: a setting created read-only was mutated.
//! - **`AlreadyRunning`**: a sequence was started while one is active.
//! - **`Unsupported`**: the operation is not modeled by the simulated device.
//! - **`PublishError`**: the image pipeline rejected a frame (or a lifecycle
//!   callback) with a numeric code.
//! - **`EncodingError`**: the synthetic image buffer is too small for the
//!   encoded frame.
//!
//! Errors that cross the capture-thread boundary are plain values: the capture
//! loop returns a `DeviceResult<()>` which `stop_sequence_acquisition` hands
//! back to its caller.

use thiserror::Error;

/// Code carried by [`DeviceError::PublishError`] for a buffer overflow.
pub const BUFFER_OVERFLOW_CODE: i32 = 22;

/// Convenience alias for results of device operations.
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Errors returned by simulated devices and their settings.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// Value rejected by the inclusive bounds of a setting.
    ///
    /// The stored value is left unchanged and no log entry is recorded.
    #[error("Value {value} for setting '{setting}' is outside [{min}, {max}]")]
    OutOfRange {
        setting: String,
        value: String,
        min: String,
        max: String,
    },

    /// Mutation of a setting that was created read-only.
    #[error("Setting '{0}' is read-only")]
    ReadOnly(String),

    /// `start_sequence_acquisition` while the camera is not idle.
    #[error("Sequence acquisition already running on '{0}'")]
    AlreadyRunning(String),

    /// Operation not modeled by the simulated device.
    #[error("Operation '{0}' is not supported")]
    Unsupported(&'static str),

    /// Error code propagated from the image pipeline.
    #[error("Image pipeline error (code {0})")]
    PublishError(i32),

    /// Synthetic image buffer too small for the encoded frame.
    #[error("Frame encoding needs {required} bytes but the buffer holds {available}")]
    EncodingError { required: usize, available: usize },

    /// Property name not present on the device.
    #[error("Device '{device}' has no property '{property}'")]
    UnknownProperty { device: String, property: String },

    /// Property set with a value of the wrong type.
    #[error("Setting '{setting}' expects a {expected} value")]
    TypeMismatch {
        setting: String,
        expected: &'static str,
    },

    /// No factory can build a device with this name.
    #[error("Unknown device '{0}'")]
    UnknownDevice(String),

    /// The capture thread could not be spawned, or it panicked.
    #[error("Capture thread failure: {0}")]
    CaptureThread(String),
}

impl DeviceError {
    /// Build an [`DeviceError::OutOfRange`] from any displayable values.
    pub fn out_of_range(
        setting: impl Into<String>,
        value: impl std::fmt::Display,
        min: impl std::fmt::Display,
        max: impl std::fmt::Display,
    ) -> Self {
        Self::OutOfRange {
            setting: setting.into(),
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }
}

/// Errors reported by the image pipeline collaborator.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineError {
    /// The pipeline's circular buffer is full.
    #[error("image buffer overflow")]
    BufferOverflow,

    /// Any other failure, identified by the pipeline's own code.
    #[error("pipeline error code {0}")]
    Code(i32),
}

impl PipelineError {
    /// Numeric code surfaced through [`DeviceError::PublishError`].
    pub fn code(&self) -> i32 {
        match self {
            PipelineError::BufferOverflow => BUFFER_OVERFLOW_CODE,
            PipelineError::Code(code) => *code,
        }
    }
}

impl From<PipelineError> for DeviceError {
    fn from(err: PipelineError) -> Self {
        DeviceError::PublishError(err.code())
    }
}

/// Errors raised while loading or validating [`crate::config::HarnessConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration sources could not be read or deserialized.
    #[error("Configuration error: {0}")]
    Load(#[from] Box<figment::Error>),

    /// Configuration parsed but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}
