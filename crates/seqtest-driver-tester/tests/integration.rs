//! Integration tests for the tester devices
//!
//! These drive the devices through the registry and the capability
//! interfaces, the way an acquisition engine under test would.

use parking_lot::Mutex;
use seqtest_core::capabilities::{Device, Sequenceable, Settable};
use seqtest_core::error::{DeviceError, PipelineError};
use seqtest_core::pipeline::{ImageFrame, ImagePipeline, InsertError};
use seqtest_core::{DeviceKind, SettingLogger, SettingValue};
use seqtest_driver_tester::*;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn registry_with(pipeline: Arc<dyn ImagePipeline>) -> (DeviceRegistry, Arc<SettingLogger>) {
    let logger = SettingLogger::shared();
    let context = DeviceContext::new(logger.clone(), pipeline);
    (DeviceRegistry::with_tester_devices(context), logger)
}

fn wait_for(mut condition: impl FnMut() -> bool) {
    while !condition() {
        thread::sleep(Duration::from_millis(1));
    }
}

/// Scenario A: a finite sequence of five frames runs to completion.
#[test]
fn test_finite_sequence_publishes_every_frame() {
    let pipeline = Arc::new(RecordingPipeline::new());
    let (registry, _) = registry_with(pipeline.clone());
    let device = registry.create_device("TCamera-0").unwrap();
    let camera = device.as_camera().unwrap();

    camera.start_sequence_acquisition(5, 0.0, false).unwrap();
    wait_for(|| camera.capture_loop_exited());
    assert!(camera.is_capturing());
    camera.stop_sequence_acquisition().unwrap();
    assert_eq!(camera.sequence_state(), SequenceState::Idle);

    let frames = pipeline.decoded_frames("TCamera-0").unwrap();
    assert_eq!(frames.len(), 5);
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.stamp.device, "TCamera-0");
        assert!(frame.stamp.is_sequence_image);
        assert_eq!(frame.stamp.local_count, i as u64);
        assert_eq!(frame.stamp.cumulative_count, i as u64);
    }

    let raw = pipeline.frames("TCamera-0");
    assert!(raw.iter().all(|f| f.metadata.get("Camera").map(String::as_str) == Some("TCamera-0")));
    assert!(raw.iter().all(|f| f.buffer.len() == 128 * 128));

    let events = pipeline.events();
    assert!(matches!(events.first(), Some(PipelineEvent::Prepared { .. })));
    assert_eq!(
        events.last(),
        Some(&PipelineEvent::Finished {
            camera: "TCamera-0".to_string(),
            flags: 0
        })
    );
}

#[test]
fn test_cumulative_count_persists_across_runs() {
    let pipeline = Arc::new(RecordingPipeline::new());
    let (registry, _) = registry_with(pipeline.clone());
    let device = registry.create_device("TCamera-0").unwrap();
    let camera = device.as_camera().unwrap();

    for _ in 0..2 {
        camera.start_sequence_acquisition(3, 0.0, false).unwrap();
        wait_for(|| camera.capture_loop_exited());
        camera.stop_sequence_acquisition().unwrap();
    }

    let stamps: Vec<(u64, u64)> = pipeline
        .decoded_frames("TCamera-0")
        .unwrap()
        .iter()
        .map(|f| (f.stamp.cumulative_count, f.stamp.local_count))
        .collect();
    assert_eq!(stamps, vec![(0, 0), (1, 1), (2, 2), (3, 0), (4, 1), (5, 2)]);
    assert_eq!(camera.cumulative_sequence_count(), 6);
}

/// Scenario B: a setting bounded to `[1, 1]` rejects 2.
#[test]
fn test_binning_out_of_range() {
    let (registry, logger) = registry_with(Arc::new(RecordingPipeline::new()));
    let device = registry.create_device("TCamera-0").unwrap();
    let camera = device.as_sequenceable().unwrap();

    assert!(matches!(camera.set_binning(2), Err(DeviceError::OutOfRange { .. })));
    assert!(matches!(
        device.as_settable().set_property("Binning", SettingValue::Integer(2)),
        Err(DeviceError::OutOfRange { .. })
    ));
    assert_eq!(camera.binning(), 1);
    assert!(logger.is_empty());

    camera.set_binning(1).unwrap();
    assert_eq!(logger.len(), 1);
}

/// Blocks every insert until released, then fails it.
struct GatedPipeline {
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
    inner: RecordingPipeline,
}

impl ImagePipeline for GatedPipeline {
    fn prepare_for_acquisition(&self, camera: &str) -> Result<(), PipelineError> {
        self.inner.prepare_for_acquisition(camera)
    }

    fn insert_image(&self, _camera: &str, frame: ImageFrame) -> Result<(), InsertError> {
        let _ = self.entered.lock().send(());
        let _ = self.release.lock().recv();
        Err(InsertError::new(PipelineError::Code(99), frame))
    }

    fn clear_image_buffer(&self, camera: &str) {
        self.inner.clear_image_buffer(camera)
    }

    fn acquisition_finished(&self, camera: &str, flags: i32) -> Result<(), PipelineError> {
        self.inner.acquisition_finished(camera, flags)
    }
}

/// Scenario C: a stop from another thread wins over the publish error it
/// provokes.
#[test]
fn test_stop_from_other_thread_suppresses_publish_error() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let pipeline = Arc::new(GatedPipeline {
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
        inner: RecordingPipeline::new(),
    });
    let (registry, _) = registry_with(pipeline.clone());
    let device = registry.create_device("TCamera-0").unwrap();

    device
        .as_sequenceable()
        .unwrap()
        .start_continuous_sequence_acquisition(0.0)
        .unwrap();
    entered_rx.recv().unwrap();

    let stopper = {
        let device = device.clone();
        thread::spawn(move || device.as_sequenceable().unwrap().stop_sequence_acquisition())
    };
    let camera = device.as_camera().unwrap();
    wait_for(|| camera.sequence_state() == SequenceState::Stopping);

    // Starting while the previous run is still stopping is rejected before
    // the pipeline hears about it.
    assert_eq!(
        camera.start_sequence_acquisition(1, 0.0, false),
        Err(DeviceError::AlreadyRunning("TCamera-0".to_string()))
    );
    let prepared = pipeline
        .inner
        .events()
        .iter()
        .filter(|e| matches!(e, PipelineEvent::Prepared { .. }))
        .count();
    assert_eq!(prepared, 1);

    // A second stop while the first is joining returns at once.
    assert!(camera.stop_sequence_acquisition().is_ok());

    release_tx.send(()).unwrap();
    assert_eq!(stopper.join().unwrap(), Ok(()));
    assert!(!camera.is_capturing());
    assert_eq!(pipeline.inner.finished_count("TCamera-0"), 1);
}

#[test]
fn test_publish_error_surfaces_on_stop() {
    let pipeline = Arc::new(RecordingPipeline::new().with_fault(PipelineFault::FailAfterN { count: 2, code: 42 }));
    let (registry, _) = registry_with(pipeline.clone());
    let device = registry.create_device("TCamera-1").unwrap();
    let camera = device.as_camera().unwrap();

    camera.start_continuous_sequence_acquisition(0.0).unwrap();
    wait_for(|| camera.capture_loop_exited());
    assert_eq!(camera.stop_sequence_acquisition(), Err(DeviceError::PublishError(42)));
    assert_eq!(pipeline.frames("TCamera-1").len(), 2);

    // The error was consumed by the first stop.
    assert_eq!(camera.stop_sequence_acquisition(), Ok(()));
    camera.start_sequence_acquisition(0, 0.0, false).unwrap();
    camera.stop_sequence_acquisition().unwrap();
}

/// Scenario D: two threads hammering one setting.
#[test]
fn test_concurrent_sets_are_serialized() {
    let (registry, logger) = registry_with(Arc::new(RecordingPipeline::new()));
    let device = registry.create_device("TCamera-0").unwrap();

    let workers: Vec<_> = (0..2)
        .map(|t| {
            let device = device.clone();
            thread::spawn(move || {
                for i in 0..1000 {
                    let value = SettingValue::Float((i % 1000 + 1) as f64 - t as f64 * 0.5);
                    device.as_settable().set_property("Exposure", value).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let entries = logger.entries();
    assert_eq!(entries.len(), 2000);
    let mut epochs: Vec<u64> = entries.iter().map(|e| e.epoch).collect();
    assert!(epochs.windows(2).all(|w| w[0] < w[1]));
    epochs.sort_unstable();
    assert_eq!(epochs, (1..=2000).collect::<Vec<u64>>());

    // Each entry's old value is the previous entry's new value.
    assert!(entries.windows(2).all(|w| w[1].old == w[0].new));
}

#[test]
fn test_sets_across_devices_are_totally_ordered() {
    let (registry, logger) = registry_with(Arc::new(RecordingPipeline::new()));
    let hub = registry.create_device("THub").unwrap();
    let hub = hub.as_hub().unwrap();
    hub.detect_installed_devices().unwrap();

    let workers: Vec<_> = hub
        .installed_devices()
        .into_iter()
        .map(|device| {
            thread::spawn(move || {
                for _ in 0..50 {
                    match device.kind() {
                        DeviceKind::Camera => device.as_sequenceable().unwrap().set_exposure(10.0).unwrap(),
                        DeviceKind::Shutter => device.as_shutter().unwrap().set_open(true).unwrap(),
                        DeviceKind::XYStage => device.as_xy_stage().unwrap().home().unwrap(),
                        DeviceKind::ZStage | DeviceKind::AutofocusStage => {
                            device.as_z_stage().unwrap().set_position_um(1.0).unwrap()
                        }
                        DeviceKind::Autofocus => device.as_focus_capable().unwrap().full_focus().unwrap(),
                        DeviceKind::Hub => unreachable!(),
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let entries = logger.entries();
    assert_eq!(entries.len(), 12 * 50);
    assert!(entries.windows(2).all(|w| w[0].epoch < w[1].epoch));
    assert_eq!(logger.last_epoch(), 600);
}

#[test]
fn test_frames_carry_only_new_entries() {
    let pipeline = Arc::new(RecordingPipeline::new());
    let (registry, logger) = registry_with(pipeline.clone());
    let camera_device = registry.create_device("TCamera-0").unwrap();
    let shutter_device = registry.create_device("TShutter-0").unwrap();
    let camera = camera_device.as_camera().unwrap();

    shutter_device.as_shutter().unwrap().set_open(true).unwrap();
    camera.set_exposure(12.0).unwrap();
    camera.snap_image().unwrap();

    let snap = seqtest_core::encoding::decode_frame(&camera.image_buffer().unwrap()).unwrap();
    let changed: Vec<(&str, &str)> = snap
        .entries
        .iter()
        .map(|e| (e.owner.as_str(), e.setting.as_str()))
        .collect();
    assert_eq!(changed, vec![("TShutter-0", "ShutterState"), ("TCamera-0", "Exposure")]);
    assert!(!snap.stamp.is_sequence_image);
    assert!(logger.pending_entries().is_empty());

    shutter_device.as_shutter().unwrap().set_open(false).unwrap();
    camera.start_sequence_acquisition(2, 0.0, false).unwrap();
    wait_for(|| camera.capture_loop_exited());
    camera.stop_sequence_acquisition().unwrap();

    let frames = pipeline.decoded_frames("TCamera-0").unwrap();
    assert_eq!(frames[0].entries.len(), 1);
    assert_eq!(frames[0].entries[0].new, SettingValue::Bool(false));
    assert!(frames[1].entries.is_empty());
    assert_eq!(logger.len(), 3);
}

#[test]
fn test_hub_roster_lifecycle() {
    let (registry, _) = registry_with(Arc::new(RecordingPipeline::new()));
    let hub = registry.create_device("THub").unwrap();
    let hub = hub.as_hub().unwrap();
    hub.detect_installed_devices().unwrap();

    for device in hub.installed_devices() {
        let dev = device.as_device();
        dev.initialize().unwrap();
        assert!(!dev.busy());
        assert!(!device.as_settable().property_names().is_empty());
        dev.shutdown().unwrap();
    }
}

#[test]
fn test_interval_spaces_frames() {
    let pipeline = Arc::new(RecordingPipeline::new());
    let (registry, _) = registry_with(pipeline.clone());
    let device = registry.create_device("TCamera-0").unwrap();
    let camera = device.as_camera().unwrap();

    let started = std::time::Instant::now();
    camera.start_sequence_acquisition(3, 20.0, false).unwrap();
    wait_for(|| pipeline.frames("TCamera-0").len() == 3);
    assert!(started.elapsed() >= Duration::from_millis(40));
    camera.stop_sequence_acquisition().unwrap();
}
