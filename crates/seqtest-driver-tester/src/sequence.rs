//! Sequence acquisition state machine.
//!
//! ```text
//!            begin()                request_stop()              finish()
//!   Idle ─────────────▶ Running ───────────────────▶ Stopping ───────────▶ Idle
//!     ▲                    │
//!     └──── abort() ───────┘   (pipeline refused to prepare)
//! ```
//!
//! Every transition and every read of the state happens under one mutex, so
//! the capture thread's stop check and the stopping caller never race. A
//! second caller of `request_stop` while the first is still joining sees
//! `Stopping` and returns at once; a stop that lands between `begin` and
//! `launch` claims the run before any thread exists, and `launch` then spawns
//! nothing.

use parking_lot::Mutex;
use seqtest_core::error::{DeviceError, DeviceResult};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

/// Lifecycle of a camera's background acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceState {
    Idle,
    Running,
    Stopping,
}

/// How many frames a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceLength {
    Finite(u64),
    Continuous,
}

impl SequenceLength {
    /// Non-positive counts produce no frames.
    pub fn from_count(count: i64) -> Self {
        SequenceLength::Finite(u64::try_from(count).unwrap_or(0))
    }

    /// Whether frame `index` (0-based) is part of the run.
    pub fn includes(&self, index: u64) -> bool {
        match self {
            SequenceLength::Finite(count) => index < *count,
            SequenceLength::Continuous => true,
        }
    }
}

/// Parameters of one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceRequest {
    pub length: SequenceLength,
    /// Minimum delay between two frames.
    pub interval: Duration,
    pub stop_on_overflow: bool,
}

impl SequenceRequest {
    pub fn finite(count: i64, interval_ms: f64, stop_on_overflow: bool) -> Self {
        Self {
            length: SequenceLength::from_count(count),
            interval: interval_from_ms(interval_ms),
            stop_on_overflow,
        }
    }

    pub fn continuous(interval_ms: f64) -> Self {
        Self {
            length: SequenceLength::Continuous,
            interval: interval_from_ms(interval_ms),
            stop_on_overflow: false,
        }
    }
}

/// Intervals too long for a `Duration` saturate to `Duration::MAX`.
fn interval_from_ms(interval_ms: f64) -> Duration {
    if interval_ms.is_finite() && interval_ms > 0.0 {
        Duration::try_from_secs_f64(interval_ms / 1000.0).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

/// Outcome of [`SequenceEngine::request_stop`].
#[derive(Debug)]
pub enum StopClaim {
    /// Nothing was running.
    Idle,
    /// Another caller is already stopping this run.
    InProgress,
    /// This caller owns the stop; join the handle (if the thread was
    /// launched) and then call [`SequenceEngine::finish`].
    Claimed(Option<JoinHandle<DeviceResult<()>>>),
}

#[derive(Debug)]
struct EngineState {
    state: SequenceState,
    /// Incremented by every successful `begin`.
    run: u64,
    task: Option<JoinHandle<DeviceResult<()>>>,
}

/// Mutex-guarded sequence state plus the capture thread handle.
#[derive(Debug)]
pub struct SequenceEngine {
    inner: Mutex<EngineState>,
}

impl Default for SequenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceEngine {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(EngineState {
                state: SequenceState::Idle,
                run: 0,
                task: None,
            }),
        }
    }

    pub fn state(&self) -> SequenceState {
        self.inner.lock().state
    }

    /// `true` from `begin` until the run is fully stopped.
    pub fn is_capturing(&self) -> bool {
        self.state() != SequenceState::Idle
    }

    /// The capture loop polls this before every frame.
    pub fn should_stop(&self) -> bool {
        self.state() != SequenceState::Running
    }

    /// Whether the capture thread of the current run has returned; `true`
    /// when no thread is attached.
    pub fn capture_exited(&self) -> bool {
        self.inner
            .lock()
            .task
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }

    /// `Idle → Running`. Returns the id of the new run.
    pub fn begin(&self, device: &str) -> DeviceResult<u64> {
        let mut inner = self.inner.lock();
        if inner.state != SequenceState::Idle {
            return Err(DeviceError::AlreadyRunning(device.to_string()));
        }
        inner.state = SequenceState::Running;
        inner.run += 1;
        Ok(inner.run)
    }

    /// Undo `begin` for `run` when it could not be launched.
    pub fn abort(&self, run: u64) {
        let mut inner = self.inner.lock();
        if inner.run == run && inner.state == SequenceState::Running {
            inner.state = SequenceState::Idle;
        }
    }

    /// Spawn the capture thread for `run`.
    ///
    /// Returns `Ok(false)` without spawning if the run was stopped (or
    /// superseded) since `begin`. The thread is spawned while the state lock
    /// is held, so its first stop check observes the stored handle.
    pub fn launch<F>(&self, run: u64, thread_name: String, body: F) -> DeviceResult<bool>
    where
        F: FnOnce() -> DeviceResult<()> + Send + 'static,
    {
        let mut inner = self.inner.lock();
        if inner.run != run || inner.state != SequenceState::Running {
            debug!(run, "Run stopped before its capture thread was launched");
            return Ok(false);
        }
        match thread::Builder::new().name(thread_name).spawn(body) {
            Ok(handle) => {
                inner.task = Some(handle);
                Ok(true)
            }
            Err(e) => {
                inner.state = SequenceState::Idle;
                Err(DeviceError::CaptureThread(e.to_string()))
            }
        }
    }

    /// `Running → Stopping`, taking the capture thread handle.
    pub fn request_stop(&self) -> StopClaim {
        let mut inner = self.inner.lock();
        match inner.state {
            SequenceState::Idle => StopClaim::Idle,
            SequenceState::Stopping => StopClaim::InProgress,
            SequenceState::Running => {
                inner.state = SequenceState::Stopping;
                StopClaim::Claimed(inner.task.take())
            }
        }
    }

    /// `Stopping → Idle`, after the capture thread was joined.
    pub fn finish(&self) {
        let mut inner = self.inner.lock();
        inner.state = SequenceState::Idle;
        inner.task = None;
    }
}

/// Join a capture thread, mapping a panic to `CaptureThread`.
pub fn join_capture(handle: JoinHandle<DeviceResult<()>>) -> DeviceResult<()> {
    handle
        .join()
        .unwrap_or_else(|_| Err(DeviceError::CaptureThread("capture thread panicked".to_string())))
}
