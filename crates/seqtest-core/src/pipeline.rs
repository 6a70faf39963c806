//! Boundary to the image pipeline that consumes camera frames.
//!
//! The acquisition framework under test implements [`ImagePipeline`]. Cameras
//! call it from the caller's thread (`prepare_for_acquisition`,
//! `acquisition_finished`) and from their capture thread (`insert_image`,
//! `clear_image_buffer`), so implementations must be `Send + Sync`.
//!
//! A frame's buffer is owned by exactly one party at a time: `insert_image`
//! takes the [`ImageFrame`] by value, and a rejected frame is handed back in
//! [`InsertError`] so the caller can retry without keeping a second reference.

use crate::error::PipelineError;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;

/// One published image and its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
    pub buffer: Bytes,
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
    pub metadata: BTreeMap<String, String>,
}

/// `insert_image` failure, returning ownership of the rejected frame.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertError {
    pub error: PipelineError,
    pub frame: ImageFrame,
}

impl InsertError {
    pub fn new(error: PipelineError, frame: ImageFrame) -> Self {
        Self { error, frame }
    }

    pub fn into_frame(self) -> ImageFrame {
        self.frame
    }
}

impl fmt::Display for InsertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "insert_image failed: {}", self.error)
    }
}

impl std::error::Error for InsertError {}

/// Callbacks a camera makes into the hosting acquisition framework.
pub trait ImagePipeline: Send + Sync {
    /// A sequence acquisition is about to start on `camera`.
    fn prepare_for_acquisition(&self, camera: &str) -> Result<(), PipelineError>;

    /// Publish one frame. May fail with [`PipelineError::BufferOverflow`].
    fn insert_image(&self, camera: &str, frame: ImageFrame) -> Result<(), InsertError>;

    /// Drop every frame buffered for `camera`.
    fn clear_image_buffer(&self, camera: &str);

    /// The sequence acquisition on `camera` has ended.
    fn acquisition_finished(&self, camera: &str, flags: i32) -> Result<(), PipelineError>;
}
