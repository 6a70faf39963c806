//! In-memory image pipeline with fault injection.
//!
//! [`RecordingPipeline`] stands in for the acquisition framework's circular
//! buffer: it records every callback a camera makes and keeps each accepted
//! frame so a test can decode the setting log out of it. Faults are described
//! declaratively with [`PipelineFault`] and evaluated on every insert attempt.

use parking_lot::Mutex;
use seqtest_core::encoding::{decode_frame, DecodedFrame, FrameDecodeError};
use seqtest_core::error::PipelineError;
use seqtest_core::pipeline::{ImageFrame, ImagePipeline, InsertError};

/// Injected failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineFault {
    /// The `n`-th insert attempt (1-based, retries included) overflows.
    OverflowOnInsert(usize),
    /// Every insert attempt overflows.
    AlwaysOverflow,
    /// Insert attempts after the first `count` fail with `code`.
    FailAfterN { count: usize, code: i32 },
    /// `prepare_for_acquisition` fails with `code`.
    RejectPrepare { code: i32 },
    /// `acquisition_finished` fails with `code`.
    RejectFinish { code: i32 },
}

/// One recorded pipeline callback.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Prepared { camera: String },
    Inserted { camera: String, frame: ImageFrame },
    Rejected { camera: String, error: PipelineError },
    Cleared { camera: String },
    Finished { camera: String, flags: i32 },
}

#[derive(Debug, Default)]
struct RecorderState {
    events: Vec<PipelineEvent>,
    insert_attempts: usize,
}

/// Thread-safe recording pipeline.
#[derive(Debug, Default)]
pub struct RecordingPipeline {
    faults: Vec<PipelineFault>,
    state: Mutex<RecorderState>,
}

impl RecordingPipeline {
    /// Pipeline that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fault(mut self, fault: PipelineFault) -> Self {
        self.faults.push(fault);
        self
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.state.lock().events.clone()
    }

    pub fn insert_attempts(&self) -> usize {
        self.state.lock().insert_attempts
    }

    /// Frames accepted for `camera`, in publication order.
    pub fn frames(&self, camera: &str) -> Vec<ImageFrame> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                PipelineEvent::Inserted { camera: c, frame } if c == camera => Some(frame.clone()),
                _ => None,
            })
            .collect()
    }

    /// Decode every frame accepted for `camera`.
    pub fn decoded_frames(&self, camera: &str) -> Result<Vec<DecodedFrame>, FrameDecodeError> {
        self.frames(camera)
            .iter()
            .map(|frame| decode_frame(&frame.buffer))
            .collect()
    }

    /// Number of `acquisition_finished` callbacks for `camera`.
    pub fn finished_count(&self, camera: &str) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|event| matches!(event, PipelineEvent::Finished { camera: c, .. } if c == camera))
            .count()
    }

    /// Forget all events and reset the attempt counter. Faults are kept.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = RecorderState::default();
    }

    fn insert_fault(&self, attempt: usize) -> Option<PipelineError> {
        self.faults.iter().find_map(|fault| match *fault {
            PipelineFault::OverflowOnInsert(n) if n == attempt => Some(PipelineError::BufferOverflow),
            PipelineFault::AlwaysOverflow => Some(PipelineError::BufferOverflow),
            PipelineFault::FailAfterN { count, code } if attempt > count => Some(PipelineError::Code(code)),
            _ => None,
        })
    }
}

impl ImagePipeline for RecordingPipeline {
    fn prepare_for_acquisition(&self, camera: &str) -> Result<(), PipelineError> {
        let rejected = self.faults.iter().find_map(|fault| match *fault {
            PipelineFault::RejectPrepare { code } => Some(code),
            _ => None,
        });
        if let Some(code) = rejected {
            return Err(PipelineError::Code(code));
        }
        self.state.lock().events.push(PipelineEvent::Prepared {
            camera: camera.to_string(),
        });
        Ok(())
    }

    fn insert_image(&self, camera: &str, frame: ImageFrame) -> Result<(), InsertError> {
        let mut state = self.state.lock();
        state.insert_attempts += 1;
        let camera = camera.to_string();
        match self.insert_fault(state.insert_attempts) {
            Some(error) => {
                state.events.push(PipelineEvent::Rejected { camera, error });
                Err(InsertError::new(error, frame))
            }
            None => {
                state.events.push(PipelineEvent::Inserted { camera, frame });
                Ok(())
            }
        }
    }

    fn clear_image_buffer(&self, camera: &str) {
        self.state.lock().events.push(PipelineEvent::Cleared {
            camera: camera.to_string(),
        });
    }

    fn acquisition_finished(&self, camera: &str, flags: i32) -> Result<(), PipelineError> {
        self.state.lock().events.push(PipelineEvent::Finished {
            camera: camera.to_string(),
            flags,
        });
        let rejected = self.faults.iter().find_map(|fault| match *fault {
            PipelineFault::RejectFinish { code } => Some(code),
            _ => None,
        });
        match rejected {
            Some(code) => Err(PipelineError::Code(code)),
            None => Ok(()),
        }
    }
}
