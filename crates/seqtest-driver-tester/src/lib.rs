//! Tester devices for sequencing tests
//!
//! Simulated instruments an acquisition engine drives as if they were real
//! hardware. Every setting change goes through one shared
//! [`SettingLogger`](seqtest_core::SettingLogger), and every camera image
//! carries the changes recorded since the previous image, so a test can
//! decode exactly what happened and in what order.
//!
//! # Available Devices
//!
//! - [`TesterCamera`] (`TCamera-*`) - snaps and background sequence acquisitions
//! - [`TesterShutter`] (`TShutter-*`) - open/close
//! - [`TesterXYStage`] (`TXYStage-*`) - XY positioning in steps
//! - [`TesterZStage`] (`TZStage-*`, `TAFStage-*`) - single-axis focus drive
//! - [`TesterAutofocus`] (`TAutofocus-*`) - continuous/full/incremental focus
//! - [`TesterHub`] (`THub`) - installs two of each of the above
//!
//! # Factory Pattern
//!
//! Each device has a [`DeviceFactory`]; [`DeviceRegistry::with_tester_devices`]
//! registers all of them:
//!
//! ```rust
//! use seqtest_driver_tester::{DeviceContext, DeviceRegistry, RecordingPipeline};
//! use seqtest_core::SettingLogger;
//! use std::sync::Arc;
//!
//! let context = DeviceContext::new(SettingLogger::shared(), Arc::new(RecordingPipeline::new()));
//! let registry = DeviceRegistry::with_tester_devices(context);
//!
//! let hub = registry.create_device("THub").unwrap();
//! let hub = hub.as_hub().unwrap();
//! hub.detect_installed_devices().unwrap();
//! assert_eq!(hub.installed_devices().len(), 12);
//! ```

pub mod autofocus;
pub mod camera;
pub mod common;
pub mod device;
pub mod hub;
pub mod registry;
pub mod sequence;
pub mod shutter;
pub mod xy_stage;
pub mod z_stage;

pub use common::{DeviceContext, PipelineEvent, PipelineFault, RecordingPipeline};

pub use autofocus::{TesterAutofocus, TesterAutofocusFactory};
pub use camera::{TesterCamera, TesterCameraFactory};
pub use device::TesterDevice;
pub use hub::{TesterHub, TesterHubFactory};
pub use registry::{DeviceFactory, DeviceRegistry, RegisteredDevice};
pub use sequence::SequenceState;
pub use shutter::{TesterShutter, TesterShutterFactory};
pub use xy_stage::{TesterXYStage, TesterXYStageFactory};
pub use z_stage::{TesterAFStageFactory, TesterZStage, TesterZStageFactory};
