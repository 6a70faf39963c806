//! SettingLogger - totally ordered audit log of setting mutations
//!
//! Every mutation of a [`Setting`](crate::setting::Setting) happens while a
//! [`SettingGuard`] is held. Acquiring a guard takes the logger's exclusive
//! lock and assigns a fresh epoch; each entry recorded through that guard
//! carries the epoch, so the log gives one global order across all devices and
//! threads sharing the logger.
//!
//! ```text
//!  thread A ── guard() ─ epoch 1 ─ record(Exposure) ─ drop ──┐
//!  thread B ─────────── (blocked) ───────────────────────────┴─ guard() ─ epoch 2 ─ ...
//! ```
//!
//! The log is append-only. [`SettingLogger::pack_and_reset`] serializes the
//! entries recorded since the previous pack into a camera image and advances
//! the tail pointer; the full history stays available through
//! [`SettingLogger::entries`].

use crate::encoding::{self, FrameStamp};
use crate::error::DeviceResult;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Value carried by a log entry or a property accessor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SettingValue {
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// Sentinel for one-shot settings, which hold no value.
    OneShot,
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Integer(v) => write!(f, "{}", v),
            SettingValue::Float(v) => write!(f, "{}", v),
            SettingValue::Bool(v) => write!(f, "{}", v),
            SettingValue::OneShot => write!(f, "<one-shot>"),
        }
    }
}

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Name of the device that owns the setting.
    pub owner: String,
    /// Setting name.
    pub setting: String,
    pub old: SettingValue,
    pub new: SettingValue,
    /// Epoch of the guard under which the mutation happened.
    pub epoch: u64,
}

#[derive(Debug, Default)]
struct LogState {
    /// Last epoch handed out.
    epoch: u64,
    entries: Vec<LogEntry>,
    /// Index of the first entry not yet packed into an image.
    packed: usize,
    busy: BTreeSet<String>,
}

/// Mutex-guarded, append-only log of setting changes.
///
/// Shared by every device of one harness through an `Arc`.
#[derive(Debug, Default)]
pub struct SettingLogger {
    state: Mutex<LogState>,
}

impl SettingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logger ready to be shared between devices.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Acquire the exclusive guard, assigning it the next epoch.
    ///
    /// The lock is released when the guard is dropped, on every exit path.
    pub fn guard(&self) -> SettingGuard<'_> {
        let mut state = self.state.lock();
        state.epoch += 1;
        let epoch = state.epoch;
        SettingGuard {
            logger: self,
            state,
            epoch,
        }
    }

    /// Snapshot of the full history.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.state.lock().entries.clone()
    }

    /// Entries recorded since the last [`pack_and_reset`](Self::pack_and_reset).
    pub fn pending_entries(&self) -> Vec<LogEntry> {
        let state = self.state.lock();
        state.entries[state.packed..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Epoch of the most recently acquired guard (0 before the first).
    pub fn last_epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Report and clear the busy mark of `device`.
    ///
    /// Returns `true` once after each guarded device mutation.
    pub fn is_busy(&self, device: &str) -> bool {
        self.state.lock().busy.remove(device)
    }

    /// Encode the pending entries and `stamp` into `buffer`, then reset the
    /// tail so the next image only carries newer entries.
    ///
    /// Fails with `EncodingError` if `buffer` is too small; the tail is not
    /// moved in that case. Returns the number of meaningful bytes written.
    pub fn pack_and_reset(&self, buffer: &mut [u8], stamp: &FrameStamp) -> DeviceResult<usize> {
        let mut state = self.state.lock();
        let written = encoding::encode_frame(buffer, stamp, &state.entries[state.packed..])?;
        state.packed = state.entries.len();
        Ok(written)
    }
}

/// Token bracketing one logically atomic mutation.
///
/// Holding a guard means holding the logger's lock: acquiring a second guard
/// on the same thread deadlocks, so device code takes one guard per operation
/// and passes it down to every setting it changes.
pub struct SettingGuard<'a> {
    logger: &'a SettingLogger,
    state: MutexGuard<'a, LogState>,
    epoch: u64,
}

impl SettingGuard<'_> {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether this guard was issued by `logger`.
    pub fn belongs_to(&self, logger: &SettingLogger) -> bool {
        std::ptr::eq(self.logger, logger)
    }

    /// Append an entry stamped with this guard's epoch.
    pub fn record(
        &mut self,
        owner: &str,
        setting: &str,
        old: SettingValue,
        new: SettingValue,
    ) {
        tracing::debug!(owner, setting, %old, %new, epoch = self.epoch, "Setting changed");
        let entry = LogEntry {
            owner: owner.to_string(),
            setting: setting.to_string(),
            old,
            new,
            epoch: self.epoch,
        };
        self.state.entries.push(entry);
    }

    /// Mark `device` busy until its next busy query.
    pub fn mark_busy(&mut self, device: &str) {
        self.state.busy.insert(device.to_string());
    }
}

impl fmt::Debug for SettingGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingGuard")
            .field("epoch", &self.epoch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_epochs_increase_per_guard() {
        let logger = SettingLogger::new();
        assert_eq!(logger.last_epoch(), 0);

        let first = logger.guard().epoch();
        let second = logger.guard().epoch();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(logger.last_epoch(), 2);
    }

    #[test]
    fn test_entries_under_one_guard_share_epoch() {
        let logger = SettingLogger::new();
        {
            let mut guard = logger.guard();
            guard.record("TXYStage-0", "XPositionSteps", SettingValue::Integer(0), SettingValue::Integer(5));
            guard.record("TXYStage-0", "YPositionSteps", SettingValue::Integer(0), SettingValue::Integer(7));
        }
        let entries = logger.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].epoch, entries[1].epoch);
    }

    #[test]
    fn test_busy_is_reported_once() {
        let logger = SettingLogger::new();
        assert!(!logger.is_busy("TShutter-0"));
        logger.guard().mark_busy("TShutter-0");
        assert!(logger.is_busy("TShutter-0"));
        assert!(!logger.is_busy("TShutter-0"));
    }

    #[test]
    fn test_pack_and_reset_moves_tail() {
        let logger = SettingLogger::new();
        logger
            .guard()
            .record("TCamera-0", "Exposure", SettingValue::Float(100.0), SettingValue::Float(10.0));
        assert_eq!(logger.pending_entries().len(), 1);

        let mut buffer = vec![0u8; 4096];
        let stamp = FrameStamp::snap("TCamera-0", 0);
        logger.pack_and_reset(&mut buffer, &stamp).unwrap();

        assert!(logger.pending_entries().is_empty());
        assert_eq!(logger.entries().len(), 1, "history is kept");
    }

    #[test]
    fn test_pack_failure_keeps_tail() {
        let logger = SettingLogger::new();
        logger
            .guard()
            .record("TCamera-0", "Binning", SettingValue::Integer(1), SettingValue::Integer(1));

        let mut buffer = vec![0u8; 8];
        let stamp = FrameStamp::snap("TCamera-0", 0);
        assert!(logger.pack_and_reset(&mut buffer, &stamp).is_err());
        assert_eq!(logger.pending_entries().len(), 1);
    }

    #[test]
    fn test_concurrent_guards_are_serialized() {
        let logger = SettingLogger::shared();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let logger = logger.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        let mut guard = logger.guard();
                        guard.record(
                            &format!("Dev-{}", t),
                            "Value",
                            SettingValue::Integer(i),
                            SettingValue::Integer(i + 1),
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let epochs: Vec<u64> = logger.entries().iter().map(|e| e.epoch).collect();
        assert_eq!(epochs.len(), 1000);
        assert_eq!(epochs, (1..=1000).collect::<Vec<u64>>());
    }
}
