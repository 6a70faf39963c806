//! Synthetic image encoding.
//!
//! Camera images produced by the tester carry no picture: their bytes encode
//! which camera produced the frame, whether it came from a sequence or a snap,
//! the frame counters, and every setting change recorded since the previous
//! image. A test decodes the buffer after the fact to recover exactly what
//! happened and in what order.
//!
//! # Layout
//!
//! All integers are little-endian; strings are a `u32` byte length followed by
//! UTF-8 bytes.
//!
//! ```text
//! ┌────────┬─────────┬───────┬────────────┬───────────┬────────┬─────────┬──────────┬─────────┐
//! │ "SQTF" │ version │ flags │ cumulative │ local     │ device │ n       │ entries  │ zeros   │
//! │ 4 B    │ u8      │ u8    │ u64        │ u64       │ string │ u32     │ n × ...  │ to end  │
//! └────────┴─────────┴───────┴────────────┴───────────┴────────┴─────────┴──────────┴─────────┘
//!
//! entry: epoch u64 │ owner string │ setting string │ old value │ new value
//! value: tag u8 (0 int, 1 float, 2 bool, 3 one-shot) │ i64 / f64 bits / u8 / nothing
//! ```
//!
//! Encoding has no hidden inputs: identical arguments always produce
//! byte-identical buffers.

use crate::error::{DeviceError, DeviceResult};
use crate::logger::{LogEntry, SettingValue};
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAGIC: &[u8; 4] = b"SQTF";
const FORMAT_VERSION: u8 = 1;
const FLAG_SEQUENCE_IMAGE: u8 = 0b0000_0001;

const TAG_INTEGER: u8 = 0;
const TAG_FLOAT: u8 = 1;
const TAG_BOOL: u8 = 2;
const TAG_ONE_SHOT: u8 = 3;

/// Fixed image dimensions of a tester camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageGeometry {
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
}

impl ImageGeometry {
    pub fn new(width: u32, height: u32, bytes_per_pixel: u32) -> Self {
        Self {
            width,
            height,
            bytes_per_pixel,
        }
    }

    /// Size in bytes of one image buffer.
    ///
    /// Only meaningful for geometries accepted by [`checked_buffer_len`](Self::checked_buffer_len).
    pub fn buffer_len(&self) -> usize {
        self.width as usize * self.height as usize * self.bytes_per_pixel as usize
    }

    /// `None` if the buffer size does not fit in `usize`.
    pub fn checked_buffer_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.bytes_per_pixel as usize)
    }
}

impl Default for ImageGeometry {
    fn default() -> Self {
        Self::new(128, 128, 1)
    }
}

/// Identity of one encoded frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameStamp {
    pub device: String,
    pub is_sequence_image: bool,
    pub cumulative_count: u64,
    pub local_count: u64,
}

impl FrameStamp {
    /// Stamp for a single snapped image.
    pub fn snap(device: impl Into<String>, snap_count: u64) -> Self {
        Self {
            device: device.into(),
            is_sequence_image: false,
            cumulative_count: snap_count,
            local_count: 0,
        }
    }

    /// Stamp for frame `local_count` of a sequence.
    pub fn sequence(device: impl Into<String>, cumulative_count: u64, local_count: u64) -> Self {
        Self {
            device: device.into(),
            is_sequence_image: true,
            cumulative_count,
            local_count,
        }
    }
}

/// Contents recovered from an encoded buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedFrame {
    pub stamp: FrameStamp,
    pub entries: Vec<LogEntry>,
}

/// Reasons a buffer cannot be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameDecodeError {
    #[error("buffer does not start with the frame magic")]
    BadMagic,
    #[error("unsupported frame format version {0}")]
    UnsupportedVersion(u8),
    #[error("buffer ends before the encoded frame does")]
    Truncated,
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
    #[error("unknown setting value tag {0}")]
    UnknownValueTag(u8),
}

fn string_len(s: &str) -> usize {
    4 + s.len()
}

fn value_len(value: &SettingValue) -> usize {
    match value {
        SettingValue::Integer(_) | SettingValue::Float(_) => 1 + 8,
        SettingValue::Bool(_) => 1 + 1,
        SettingValue::OneShot => 1,
    }
}

/// Exact number of bytes [`encode_frame`] writes for these inputs.
pub fn encoded_len(stamp: &FrameStamp, entries: &[LogEntry]) -> usize {
    let header = MAGIC.len() + 1 + 1 + 8 + 8 + string_len(&stamp.device) + 4;
    let body: usize = entries
        .iter()
        .map(|e| 8 + string_len(&e.owner) + string_len(&e.setting) + value_len(&e.old) + value_len(&e.new))
        .sum();
    header + body
}

/// Encode `stamp` and `entries` into `buffer`, zero-filling the remainder.
///
/// Returns the number of meaningful bytes. Fails with `EncodingError` and
/// leaves `buffer` untouched if it is too small.
pub fn encode_frame(buffer: &mut [u8], stamp: &FrameStamp, entries: &[LogEntry]) -> DeviceResult<usize> {
    let required = encoded_len(stamp, entries);
    if buffer.len() < required {
        return Err(DeviceError::EncodingError {
            required,
            available: buffer.len(),
        });
    }

    let mut out = &mut buffer[..];
    out.put_slice(MAGIC);
    out.put_u8(FORMAT_VERSION);
    out.put_u8(if stamp.is_sequence_image { FLAG_SEQUENCE_IMAGE } else { 0 });
    out.put_u64_le(stamp.cumulative_count);
    out.put_u64_le(stamp.local_count);
    put_string(&mut out, &stamp.device);
    // Entry counts beyond u32 cannot fit any image buffer.
    out.put_u32_le(entries.len() as u32);
    for entry in entries {
        out.put_u64_le(entry.epoch);
        put_string(&mut out, &entry.owner);
        put_string(&mut out, &entry.setting);
        put_value(&mut out, &entry.old);
        put_value(&mut out, &entry.new);
    }
    out.fill(0);

    Ok(required)
}

/// Allocate a buffer of `geometry` and encode into it.
pub fn encode_image(geometry: ImageGeometry, stamp: &FrameStamp, entries: &[LogEntry]) -> DeviceResult<Vec<u8>> {
    let mut buffer = vec![0u8; geometry.buffer_len()];
    encode_frame(&mut buffer, stamp, entries)?;
    Ok(buffer)
}

fn put_string(out: &mut &mut [u8], s: &str) {
    out.put_u32_le(s.len() as u32);
    out.put_slice(s.as_bytes());
}

fn put_value(out: &mut &mut [u8], value: &SettingValue) {
    match value {
        SettingValue::Integer(v) => {
            out.put_u8(TAG_INTEGER);
            out.put_i64_le(*v);
        }
        SettingValue::Float(v) => {
            out.put_u8(TAG_FLOAT);
            out.put_f64_le(*v);
        }
        SettingValue::Bool(v) => {
            out.put_u8(TAG_BOOL);
            out.put_u8(u8::from(*v));
        }
        SettingValue::OneShot => out.put_u8(TAG_ONE_SHOT),
    }
}

/// Recover the stamp and log entries from an encoded buffer.
pub fn decode_frame(buffer: &[u8]) -> Result<DecodedFrame, FrameDecodeError> {
    let mut input = buffer;

    if input.remaining() < MAGIC.len() + 2 || &input[..MAGIC.len()] != MAGIC {
        return Err(FrameDecodeError::BadMagic);
    }
    input.advance(MAGIC.len());
    let version = input.get_u8();
    if version != FORMAT_VERSION {
        return Err(FrameDecodeError::UnsupportedVersion(version));
    }
    let flags = input.get_u8();

    ensure(&input, 16)?;
    let cumulative_count = input.get_u64_le();
    let local_count = input.get_u64_le();
    let device = get_string(&mut input)?;

    ensure(&input, 4)?;
    let count = input.get_u32_le() as usize;
    let mut entries = Vec::with_capacity(count.min(input.remaining()));
    for _ in 0..count {
        ensure(&input, 8)?;
        let epoch = input.get_u64_le();
        let owner = get_string(&mut input)?;
        let setting = get_string(&mut input)?;
        let old = get_value(&mut input)?;
        let new = get_value(&mut input)?;
        entries.push(LogEntry {
            owner,
            setting,
            old,
            new,
            epoch,
        });
    }

    Ok(DecodedFrame {
        stamp: FrameStamp {
            device,
            is_sequence_image: flags & FLAG_SEQUENCE_IMAGE != 0,
            cumulative_count,
            local_count,
        },
        entries,
    })
}

fn ensure(input: &&[u8], n: usize) -> Result<(), FrameDecodeError> {
    if input.remaining() < n {
        Err(FrameDecodeError::Truncated)
    } else {
        Ok(())
    }
}

fn get_string(input: &mut &[u8]) -> Result<String, FrameDecodeError> {
    ensure(input, 4)?;
    let len = input.get_u32_le() as usize;
    ensure(input, len)?;
    let bytes = input[..len].to_vec();
    input.advance(len);
    String::from_utf8(bytes).map_err(|_| FrameDecodeError::InvalidUtf8)
}

fn get_value(input: &mut &[u8]) -> Result<SettingValue, FrameDecodeError> {
    ensure(input, 1)?;
    match input.get_u8() {
        TAG_INTEGER => {
            ensure(input, 8)?;
            Ok(SettingValue::Integer(input.get_i64_le()))
        }
        TAG_FLOAT => {
            ensure(input, 8)?;
            Ok(SettingValue::Float(input.get_f64_le()))
        }
        TAG_BOOL => {
            ensure(input, 1)?;
            Ok(SettingValue::Bool(input.get_u8() != 0))
        }
        TAG_ONE_SHOT => Ok(SettingValue::OneShot),
        tag => Err(FrameDecodeError::UnknownValueTag(tag)),
    }
}
