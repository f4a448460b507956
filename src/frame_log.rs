//! Append-only, ordered frame log with JSON persistence (spec §3, §4.2).

use std::fs;
use std::path::Path;

use crate::error::{RelayError, Result};
use crate::frame::{Frame, FrameDirection};

/// Ordered sequence of [`Frame`]s captured during one relay session.
///
/// Created empty at session start, appended to during the relay, and
/// flushed to disk at the end (or on cancellation, see spec §5). Loading
/// from disk is only needed by [`crate::emulated_initiator::EmulatedInitiator`].
#[derive(Debug, Default, Clone)]
pub struct FrameLog {
    frames: Vec<Frame>,
}

impl FrameLog {
    pub fn new() -> FrameLog {
        FrameLog::default()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn append(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    /// Save as a JSON array, 4-space indented for human review (spec §6).
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.frames).map_err(|source| RelayError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|source| RelayError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load a JSON array previously written by [`FrameLog::save`]. Tolerates
    /// both pretty-printed and compact form.
    pub fn load(path: &Path) -> Result<FrameLog> {
        let contents = fs::read_to_string(path).map_err(|source| RelayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let frames: Vec<Frame> = serde_json::from_str(&contents).map_err(|source| RelayError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(FrameLog { frames })
    }

    /// Find the recorded reply to `request_bytes`, fingerprinting on the
    /// first five bytes (spec §4.2, §4.4). Scans for a `FromReader` frame
    /// whose first five bytes match, then returns the `FromCard` frame
    /// logged at `index + 1`.
    pub fn find_response_for(&self, request_bytes: &[u8]) -> Option<&Frame> {
        let fingerprint = fingerprint(request_bytes);
        let (pos, request_frame) = self.frames.iter().enumerate().find(|(_, f)| {
            f.direction == FrameDirection::FromReader && fingerprint(&f.data) == fingerprint
        })?;
        let target_index = request_frame.index + 1;
        self.frames[pos + 1..]
            .iter()
            .find(|f| f.direction == FrameDirection::FromCard && f.index == target_index)
    }

    /// One line per frame: index, direction, timestamp, length, driver
    /// result, and — for raw-framing frames — a short [`crate::pcb::Pcb`]
    /// summary. Mirrors `nfc_helper.print_frame` from the original
    /// prototype, used by the CLI's `--print-log`.
    pub fn print_summary(&self) {
        for frame in &self.frames {
            let pcb_note = if !frame.easy_framing && !frame.data.is_empty() {
                format!(" pcb={:?}", crate::pcb::Pcb::decode(frame.data[0]))
            } else {
                String::new()
            };
            println!(
                "{:>4} {:?} t={:.6} len={:<3} result={:<4}{}",
                frame.index,
                frame.direction,
                frame.time,
                frame.data.len(),
                frame.result,
                pcb_note,
            );
        }
    }
}

fn fingerprint(bytes: &[u8]) -> &[u8] {
    &bytes[..bytes.len().min(5)]
}
