//! Tester camera: snaps and background sequence acquisitions whose images
//! carry the setting log.
//!
//! Each image produced by a [`TesterCamera`] is an encoded frame (see
//! [`seqtest_core::encoding`]) holding the camera name, its counters, and
//! every setting change recorded since the previous image of any camera.
//!
//! # Capture loop
//!
//! ```text
//! for frame in 0..count (or forever):
//!     stop requested?                       ── yes ─▶ exit Ok
//!     encode (cumulative++, frame)          ── Err ─▶ exit EncodingError
//!     insert_image
//!       overflow && !stop_on_overflow       ─▶ clear buffer, retry once
//!       still failing: stop requested?      ── yes ─▶ exit Ok
//!                                           ── no  ─▶ exit PublishError(code)
//!     sleep(interval) unless this was the last frame
//! ```
//!
//! The loop's result is stored in the thread handle and returned by
//! `stop_sequence_acquisition`.

use crate::common::{DeviceContext, Lifecycle};
use crate::device::TesterDevice;
use crate::registry::DeviceFactory;
use crate::sequence::{join_capture, SequenceEngine, SequenceRequest, SequenceState, StopClaim};
use anyhow::{anyhow, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use seqtest_core::capabilities::{Device, Roi, Sequenceable, Settable};
use seqtest_core::driver::DeviceKind;
use seqtest_core::encoding::{FrameStamp, ImageGeometry};
use seqtest_core::error::{DeviceError, DeviceResult, PipelineError};
use seqtest_core::logger::SettingLogger;
use seqtest_core::pipeline::{ImageFrame, ImagePipeline, InsertError};
use seqtest_core::property::PropertyTable;
use seqtest_core::setting::{FloatSetting, IntegerSetting};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

// =============================================================================
// TesterCameraFactory - DeviceFactory implementation
// =============================================================================

/// Per-device overrides of the harness camera geometry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TesterCameraConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bytes_per_pixel: Option<u32>,
}

impl TesterCameraConfig {
    fn geometry(&self, base: ImageGeometry) -> ImageGeometry {
        ImageGeometry::new(
            self.width.unwrap_or(base.width),
            self.height.unwrap_or(base.height),
            self.bytes_per_pixel.unwrap_or(base.bytes_per_pixel),
        )
    }
}

/// Factory for `TCamera*` devices.
pub struct TesterCameraFactory;

impl DeviceFactory for TesterCameraFactory {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Camera
    }

    fn description(&self) -> &'static str {
        "Test camera"
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: TesterCameraConfig = config.clone().try_into()?;
        if cfg.width == Some(0) || cfg.height == Some(0) {
            return Err(anyhow!("Camera resolution must be non-zero"));
        }
        if let Some(bpp) = cfg.bytes_per_pixel {
            if ![1, 2, 4].contains(&bpp) {
                return Err(anyhow!("Invalid bytes_per_pixel {}. Must be 1, 2 or 4", bpp));
            }
        }
        Ok(())
    }

    fn build(&self, name: &str, context: &DeviceContext, config: toml::Value) -> Result<TesterDevice> {
        let cfg: TesterCameraConfig = config.try_into()?;
        let geometry = cfg.geometry(context.geometry);
        if geometry.checked_buffer_len().is_none() {
            return Err(anyhow!(
                "Camera image {}x{}x{} is too large",
                geometry.width,
                geometry.height,
                geometry.bytes_per_pixel
            ));
        }
        let context = context.clone().with_geometry(geometry);
        Ok(TesterDevice::Camera(Arc::new(TesterCamera::new(name, &context))))
    }
}

// =============================================================================
// TesterCamera
// =============================================================================

/// State shared between the camera handle and its capture thread.
struct CameraCore {
    name: String,
    logger: Arc<SettingLogger>,
    pipeline: Arc<dyn ImagePipeline>,
    geometry: ImageGeometry,
    exposure: Arc<FloatSetting>,
    binning: Arc<IntegerSetting>,
    snap_counter: AtomicU64,
    cumulative_sequence_counter: AtomicU64,
    engine: SequenceEngine,
}

/// Simulated camera.
pub struct TesterCamera {
    core: Arc<CameraCore>,
    lifecycle: Lifecycle,
    properties: PropertyTable,
    snap_image: Mutex<Option<Bytes>>,
}

impl TesterCamera {
    pub fn new(name: &str, context: &DeviceContext) -> Self {
        let logger = context.logger.clone();
        let exposure = Arc::new(
            FloatSetting::new(logger.clone(), name, "Exposure", 100.0).with_range(0.1, 1000.0),
        );
        let binning = Arc::new(IntegerSetting::new(logger.clone(), name, "Binning", 1).with_range(1, 1));
        let properties = PropertyTable::new(name, logger.clone())
            .with("Exposure", exposure.clone())
            .with("Binning", binning.clone());

        Self {
            core: Arc::new(CameraCore {
                name: name.to_string(),
                logger,
                pipeline: context.pipeline.clone(),
                geometry: context.geometry,
                exposure,
                binning,
                snap_counter: AtomicU64::new(0),
                cumulative_sequence_counter: AtomicU64::new(0),
                engine: SequenceEngine::new(),
            }),
            lifecycle: Lifecycle::new(),
            properties,
            snap_image: Mutex::new(None),
        }
    }

    pub fn sequence_state(&self) -> SequenceState {
        self.core.engine.state()
    }

    /// Whether the capture loop of the current run has returned, either
    /// because it reached its frame count or because it failed. The run still
    /// needs `stop_sequence_acquisition` to return to idle.
    pub fn capture_loop_exited(&self) -> bool {
        self.core.engine.capture_exited()
    }

    /// Number of snaps taken so far.
    pub fn snap_count(&self) -> u64 {
        self.core.snap_counter.load(Ordering::SeqCst)
    }

    /// Sequence frames generated over the camera's lifetime.
    pub fn cumulative_sequence_count(&self) -> u64 {
        self.core.cumulative_sequence_counter.load(Ordering::SeqCst)
    }

    fn start(&self, request: SequenceRequest) -> DeviceResult<()> {
        let core = &self.core;
        let run = core.engine.begin(&core.name)?;

        if let Err(e) = core.pipeline.prepare_for_acquisition(&core.name) {
            core.engine.abort(run);
            warn!(camera = %core.name, error = %e, "Pipeline refused to prepare for acquisition");
            return Err(e.into());
        }

        let capture = Arc::clone(core);
        let launched = core.engine.launch(run, format!("{}-capture", core.name), move || {
            let result = capture.capture_loop(request);
            if let Err(e) = &result {
                error!(camera = %capture.name, error = %e, "Capture loop terminated");
            }
            result
        })?;

        if launched {
            info!(camera = %core.name, ?request, "Sequence acquisition started");
        }
        Ok(())
    }
}

impl CameraCore {
    fn generate_image(&self, stamp: &FrameStamp) -> DeviceResult<Bytes> {
        let mut buffer = vec![0u8; self.geometry.buffer_len()];
        self.logger.pack_and_reset(&mut buffer, stamp)?;
        Ok(Bytes::from(buffer))
    }

    fn capture_loop(&self, request: SequenceRequest) -> DeviceResult<()> {
        let metadata = BTreeMap::from([("Camera".to_string(), self.name.clone())]);
        let mut frame: u64 = 0;

        while request.length.includes(frame) {
            if self.engine.should_stop() {
                debug!(camera = %self.name, frame, "Stop requested");
                break;
            }

            let cumulative = self.cumulative_sequence_counter.fetch_add(1, Ordering::SeqCst);
            let buffer = self.generate_image(&FrameStamp::sequence(&self.name, cumulative, frame))?;
            let image = ImageFrame {
                buffer,
                width: self.geometry.width,
                height: self.geometry.height,
                bytes_per_pixel: self.geometry.bytes_per_pixel,
                metadata: metadata.clone(),
            };

            if let Err(e) = self.publish(image, request.stop_on_overflow) {
                if self.engine.should_stop() {
                    debug!(camera = %self.name, error = %e, "Publish failed after stop request");
                    break;
                }
                return Err(DeviceError::PublishError(e.code()));
            }

            frame += 1;
            if !request.interval.is_zero() && request.length.includes(frame) {
                thread::sleep(request.interval);
            }
        }

        Ok(())
    }

    fn publish(&self, image: ImageFrame, stop_on_overflow: bool) -> Result<(), PipelineError> {
        match self.pipeline.insert_image(&self.name, image) {
            Ok(()) => Ok(()),
            Err(InsertError {
                error: PipelineError::BufferOverflow,
                frame,
            }) if !stop_on_overflow => {
                warn!(camera = %self.name, "Image buffer overflow, clearing and retrying");
                self.pipeline.clear_image_buffer(&self.name);
                self.pipeline
                    .insert_image(&self.name, frame)
                    .map_err(|e| e.error)
            }
            Err(e) => Err(e.error),
        }
    }

    fn stop(&self) -> DeviceResult<()> {
        let handle = match self.engine.request_stop() {
            StopClaim::Idle => return Ok(()),
            StopClaim::InProgress => {
                debug!(camera = %self.name, "Stop already in progress");
                return Ok(());
            }
            StopClaim::Claimed(handle) => handle,
        };

        let outcome = match handle {
            Some(handle) => join_capture(handle),
            None => Ok(()),
        };
        self.engine.finish();

        let finished = self.pipeline.acquisition_finished(&self.name, 0);
        info!(camera = %self.name, ok = outcome.is_ok(), "Sequence acquisition stopped");
        outcome?;
        finished.map_err(DeviceError::from)
    }
}

impl Settable for TesterCamera {
    fn properties(&self) -> &PropertyTable {
        &self.properties
    }
}

impl Device for TesterCamera {
    fn name(&self) -> &str {
        &self.core.name
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Camera
    }

    fn initialize(&self) -> DeviceResult<()> {
        self.lifecycle.initialize(&self.core.name);
        Ok(())
    }

    /// Stops any running sequence and returns its outcome.
    fn shutdown(&self) -> DeviceResult<()> {
        let stopped = self.core.stop();
        self.lifecycle.shutdown(&self.core.name);
        stopped
    }

    fn busy(&self) -> bool {
        self.core.logger.is_busy(&self.core.name)
    }
}

impl Sequenceable for TesterCamera {
    fn image_geometry(&self) -> ImageGeometry {
        self.core.geometry
    }

    fn snap_image(&self) -> DeviceResult<()> {
        let core = &self.core;
        let count = core.snap_counter.fetch_add(1, Ordering::SeqCst);
        let image = core.generate_image(&FrameStamp::snap(&core.name, count))?;
        *self.snap_image.lock() = Some(image);
        Ok(())
    }

    fn image_buffer(&self) -> Option<Bytes> {
        self.snap_image.lock().clone()
    }

    fn exposure(&self) -> f64 {
        self.core.exposure.get()
    }

    fn set_exposure(&self, exposure_ms: f64) -> DeviceResult<()> {
        let mut guard = self.core.logger.guard();
        guard.mark_busy(&self.core.name);
        self.core.exposure.set_guarded(&mut guard, exposure_ms)
    }

    fn binning(&self) -> i64 {
        self.core.binning.get()
    }

    fn set_binning(&self, binning: i64) -> DeviceResult<()> {
        let mut guard = self.core.logger.guard();
        guard.mark_busy(&self.core.name);
        self.core.binning.set_guarded(&mut guard, binning)
    }

    fn roi(&self) -> Roi {
        Roi {
            x: 0,
            y: 0,
            width: self.core.geometry.width,
            height: self.core.geometry.height,
        }
    }

    fn set_roi(&self, _roi: Roi) -> DeviceResult<()> {
        let mut guard = self.core.logger.guard();
        guard.mark_busy(&self.core.name);
        Err(DeviceError::Unsupported("set_roi"))
    }

    fn start_sequence_acquisition(
        &self,
        count: i64,
        interval_ms: f64,
        stop_on_overflow: bool,
    ) -> DeviceResult<()> {
        self.start(SequenceRequest::finite(count, interval_ms, stop_on_overflow))
    }

    fn start_continuous_sequence_acquisition(&self, interval_ms: f64) -> DeviceResult<()> {
        self.start(SequenceRequest::continuous(interval_ms))
    }

    fn stop_sequence_acquisition(&self) -> DeviceResult<()> {
        self.core.stop()
    }

    fn is_capturing(&self) -> bool {
        self.core.engine.is_capturing()
    }
}

impl Drop for TesterCamera {
    fn drop(&mut self) {
        if let Err(e) = self.core.stop() {
            warn!(camera = %self.core.name, error = %e, "Sequence ended with an error during drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{PipelineEvent, PipelineFault, RecordingPipeline};
    use seqtest_core::encoding::decode_frame;
    use seqtest_core::logger::SettingValue;
    use tracing_test::traced_test;

    fn camera_with(pipeline: RecordingPipeline) -> (TesterCamera, Arc<RecordingPipeline>, Arc<SettingLogger>) {
        let logger = SettingLogger::shared();
        let pipeline = Arc::new(pipeline);
        let context = DeviceContext::new(logger.clone(), pipeline.clone());
        (TesterCamera::new("TCamera-0", &context), pipeline, logger)
    }

    fn run_to_completion(camera: &TesterCamera, count: i64, stop_on_overflow: bool) -> DeviceResult<()> {
        camera.start_sequence_acquisition(count, 0.0, stop_on_overflow)?;
        while !camera.capture_loop_exited() {
            thread::yield_now();
        }
        camera.stop_sequence_acquisition()
    }

    #[test]
    fn test_default_settings() {
        let (camera, _, _) = camera_with(RecordingPipeline::new());
        assert_eq!(camera.exposure(), 100.0);
        assert_eq!(camera.binning(), 1);
        assert_eq!(camera.image_buffer_size(), 128 * 128);
        assert_eq!(camera.property_names(), vec!["Binning", "Exposure"]);
        assert_eq!(camera.roi().width, 128);
    }

    #[test]
    fn test_exposure_bounds() {
        let (camera, _, logger) = camera_with(RecordingPipeline::new());
        camera.set_exposure(0.1).unwrap();
        camera.set_exposure(1000.0).unwrap();
        assert!(matches!(camera.set_exposure(0.05), Err(DeviceError::OutOfRange { .. })));
        assert_eq!(camera.exposure(), 1000.0);
        assert_eq!(logger.len(), 2);
    }

    #[test]
    fn test_set_marks_busy_once() {
        let (camera, _, _) = camera_with(RecordingPipeline::new());
        assert!(!camera.busy());
        camera.set_exposure(50.0).unwrap();
        assert!(camera.busy());
        assert!(!camera.busy());
    }

    #[test]
    fn test_set_roi_unsupported_but_busy() {
        let (camera, _, logger) = camera_with(RecordingPipeline::new());
        let roi = Roi {
            x: 0,
            y: 0,
            width: 10,
            height: 10,
        };
        assert_eq!(camera.set_roi(roi), Err(DeviceError::Unsupported("set_roi")));
        assert!(camera.busy());
        assert!(logger.is_empty());
    }

    #[test]
    fn test_snap_carries_pending_log() {
        let (camera, _, _) = camera_with(RecordingPipeline::new());
        assert!(camera.image_buffer().is_none());

        camera.set_exposure(20.0).unwrap();
        camera.snap_image().unwrap();
        let decoded = decode_frame(&camera.image_buffer().unwrap()).unwrap();
        assert_eq!(decoded.stamp, FrameStamp::snap("TCamera-0", 0));
        assert_eq!(decoded.entries.len(), 1);
        assert_eq!(decoded.entries[0].new, SettingValue::Float(20.0));

        camera.snap_image().unwrap();
        let decoded = decode_frame(&camera.image_buffer().unwrap()).unwrap();
        assert_eq!(decoded.stamp.cumulative_count, 1);
        assert!(decoded.entries.is_empty());
    }

    #[test]
    fn test_snap_buffer_too_small() {
        let logger = SettingLogger::shared();
        let context = DeviceContext::new(logger, Arc::new(RecordingPipeline::new()))
            .with_geometry(ImageGeometry::new(2, 2, 1));
        let camera = TesterCamera::new("TCamera-0", &context);
        assert!(matches!(camera.snap_image(), Err(DeviceError::EncodingError { .. })));
        assert!(camera.image_buffer().is_none());
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let (camera, _, _) = camera_with(RecordingPipeline::new());
        camera.start_continuous_sequence_acquisition(1.0).unwrap();
        assert_eq!(
            camera.start_sequence_acquisition(3, 0.0, false),
            Err(DeviceError::AlreadyRunning("TCamera-0".to_string()))
        );
        assert!(camera.is_capturing());
        camera.stop_sequence_acquisition().unwrap();
        assert!(!camera.is_capturing());
    }

    #[test]
    fn test_huge_interval_single_frame() {
        let (camera, pipeline, _) = camera_with(RecordingPipeline::new());
        camera.start_sequence_acquisition(1, 1e300, false).unwrap();
        while !camera.capture_loop_exited() {
            thread::yield_now();
        }
        camera.stop_sequence_acquisition().unwrap();
        assert_eq!(pipeline.frames("TCamera-0").len(), 1);
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let (camera, pipeline, _) = camera_with(RecordingPipeline::new());
        assert!(camera.stop_sequence_acquisition().is_ok());
        assert!(pipeline.events().is_empty());
    }

    #[test]
    fn test_zero_count_runs_no_frames() {
        let (camera, pipeline, _) = camera_with(RecordingPipeline::new());
        camera.start_sequence_acquisition(0, 0.0, false).unwrap();
        camera.stop_sequence_acquisition().unwrap();
        assert_eq!(pipeline.insert_attempts(), 0);
        assert_eq!(pipeline.finished_count("TCamera-0"), 1);
    }

    #[test]
    fn test_prepare_failure_returns_to_idle() {
        let (camera, _, _) = camera_with(RecordingPipeline::new().with_fault(PipelineFault::RejectPrepare { code: 5 }));
        assert_eq!(camera.start_sequence_acquisition(3, 0.0, false), Err(DeviceError::PublishError(5)));
        assert_eq!(camera.sequence_state(), SequenceState::Idle);
    }

    fn image(camera: &TesterCamera) -> ImageFrame {
        let stamp = FrameStamp::sequence("TCamera-0", 0, 0);
        ImageFrame {
            buffer: camera.core.generate_image(&stamp).unwrap(),
            width: 128,
            height: 128,
            bytes_per_pixel: 1,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    #[traced_test]
    fn test_publish_logs_overflow_retry() {
        let (camera, pipeline, _) = camera_with(RecordingPipeline::new().with_fault(PipelineFault::OverflowOnInsert(1)));
        camera.core.publish(image(&camera), false).unwrap();
        assert_eq!(pipeline.insert_attempts(), 2);
        assert_eq!(pipeline.frames("TCamera-0").len(), 1);
        assert!(logs_contain("Image buffer overflow"));
    }

    #[test]
    fn test_publish_gives_up_after_one_retry() {
        let (camera, pipeline, _) = camera_with(RecordingPipeline::new().with_fault(PipelineFault::AlwaysOverflow));
        assert_eq!(camera.core.publish(image(&camera), false), Err(PipelineError::BufferOverflow));
        assert_eq!(pipeline.insert_attempts(), 2);

        pipeline.reset();
        assert_eq!(camera.core.publish(image(&camera), true), Err(PipelineError::BufferOverflow));
        assert_eq!(pipeline.insert_attempts(), 1);
    }

    #[test]
    fn test_overflow_retried_once() {
        let (camera, pipeline, _) = camera_with(RecordingPipeline::new().with_fault(PipelineFault::OverflowOnInsert(2)));
        run_to_completion(&camera, 3, false).unwrap();

        let frames = pipeline.decoded_frames("TCamera-0").unwrap();
        let locals: Vec<u64> = frames.iter().map(|f| f.stamp.local_count).collect();
        assert_eq!(locals, vec![0, 1, 2]);
        assert!(pipeline
            .events()
            .iter()
            .any(|e| matches!(e, PipelineEvent::Cleared { .. })));
    }

    #[test]
    fn test_overflow_with_stop_on_overflow_is_fatal() {
        let (camera, pipeline, _) = camera_with(RecordingPipeline::new().with_fault(PipelineFault::OverflowOnInsert(1)));
        assert_eq!(
            run_to_completion(&camera, 3, true),
            Err(DeviceError::PublishError(seqtest_core::error::BUFFER_OVERFLOW_CODE))
        );
        assert_eq!(pipeline.finished_count("TCamera-0"), 1);
    }

    #[test]
    fn test_shutdown_stops_sequence() {
        let (camera, pipeline, _) = camera_with(RecordingPipeline::new());
        camera.initialize().unwrap();
        camera.start_continuous_sequence_acquisition(1.0).unwrap();
        camera.shutdown().unwrap();
        assert!(!camera.is_capturing());
        assert_eq!(pipeline.finished_count("TCamera-0"), 1);
    }
}
