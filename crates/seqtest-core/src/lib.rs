//! `seqtest-core`
//!
//! Core types for the sequence tester: a set of simulated instrument devices
//! that an acquisition engine drives as if they were real hardware, so that
//! command ordering, concurrency and error propagation can be verified
//! without physical equipment.
//!
//! This crate holds everything the simulated devices are built from:
//!
//! - [`logger::SettingLogger`]: mutex-guarded, totally ordered log of every
//!   setting mutation, issuing guards that stamp entries with an epoch
//! - [`setting::Setting`]: typed, bounded values and one-shot triggers that
//!   only change under a guard
//! - [`property::PropertyTable`]: name-addressed access to a device's settings
//! - [`capabilities`]: the capability traits devices implement
//! - [`encoding`]: the synthetic image format that carries device identity,
//!   counters and the pending log, plus its decoder
//! - [`pipeline::ImagePipeline`]: the boundary to the framework that consumes
//!   frames
//! - [`config`] and [`logging`]: Figment configuration and tracing setup
//!
//! The concrete devices live in `seqtest-driver-tester`.

pub mod capabilities;
pub mod config;
pub mod driver;
pub mod encoding;
pub mod error;
pub mod logger;
pub mod logging;
pub mod pipeline;
pub mod property;
pub mod setting;

pub use driver::{Capability, DeviceKind};
pub use error::{DeviceError, DeviceResult, PipelineError};
pub use logger::{LogEntry, SettingGuard, SettingLogger, SettingValue};
