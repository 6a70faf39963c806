//! Common infrastructure for tester devices.
//!
//! - **context**: Shared logger, pipeline and geometry every device is built with
//! - **lifecycle**: Initialize/shutdown bookkeeping
//! - **recording**: In-memory [`ImagePipeline`](seqtest_core::pipeline::ImagePipeline)
//!   with fault injection, for tests and the CLI

pub mod context;
pub mod lifecycle;
pub mod recording;

pub use context::DeviceContext;
pub use lifecycle::Lifecycle;
pub use recording::{PipelineEvent, PipelineFault, RecordingPipeline};
