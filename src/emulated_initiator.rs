//! Log-replay stand-in for a live Initiator (spec §4.4).

use std::path::{Path, PathBuf};

use log::debug;

use crate::driver::{status, BoolOption, IntOption, Modulation, NfcDriver, TargetDescriptor};
use crate::error::Result;
use crate::frame_log::FrameLog;

/// Implements the [`NfcDriver`] subset the relay engine consumes by
/// replaying responses out of a [`FrameLog`] loaded from disk, instead of
/// talking to a real Initiator frontend. Used for deterministic testing
/// and for replaying a captured session without a second physical device.
pub struct EmulatedInitiator {
    log: FrameLog,
    last_error: i32,
}

impl EmulatedInitiator {
    /// Load a previously saved [`FrameLog`] to source responses from.
    pub fn load(path: &Path) -> Result<EmulatedInitiator> {
        let log = FrameLog::load(path)?;
        debug!("loaded {} frames for replay from {:?}", log.len(), path);
        Ok(EmulatedInitiator { log, last_error: status::SUCCESS })
    }

    /// Wrap an already-loaded log (used by tests that build one in memory).
    pub fn from_log(log: FrameLog) -> EmulatedInitiator {
        EmulatedInitiator { log, last_error: status::SUCCESS }
    }

    pub fn frame_count(&self) -> usize {
        self.log.len()
    }
}

impl NfcDriver for EmulatedInitiator {
    fn connstring(&self) -> &str {
        "replay:frame-log"
    }

    fn set_property_bool(&mut self, _option: BoolOption, _value: bool) -> i32 {
        status::SUCCESS
    }

    fn set_property_int(&mut self, _option: IntOption, _value: i32) -> i32 {
        status::SUCCESS
    }

    fn initiator_init(&mut self) -> i32 {
        status::SUCCESS
    }

    /// Always reports no targets; tests bypass the discovery phase when
    /// replaying (spec §4.4).
    fn initiator_list_passive_targets(
        &mut self,
        _modulation: Modulation,
        _out: &mut Vec<TargetDescriptor>,
    ) -> i32 {
        0
    }

    fn initiator_select_passive_target(
        &mut self,
        _modulation: Modulation,
        _uid: Option<&[u8]>,
    ) -> (i32, Option<TargetDescriptor>) {
        (status::ENOTIMPL, None)
    }

    /// Fingerprints `tx` against the loaded log via
    /// [`FrameLog::find_response_for`]; an unmatched request returns
    /// `(empty, 0)`, which the engine treats as a non-positive (failing)
    /// result and terminates the relay (spec §4.4). `last_error()` stays
    /// `status::SUCCESS` regardless of match outcome: there is no native
    /// driver call here to fail, so the replay stand-in never reports
    /// anything else (spec §4.4).
    fn initiator_transceive_bytes(&mut self, tx: &[u8], _timeout_ms: u32) -> (Vec<u8>, i32) {
        self.last_error = status::SUCCESS;
        match self.log.find_response_for(tx) {
            Some(frame) => (frame.data.clone(), frame.result),
            None => (Vec::new(), 0),
        }
    }

    fn target_init(&mut self, descriptor: &TargetDescriptor) -> (i32, TargetDescriptor) {
        (status::ENOTIMPL, descriptor.clone())
    }

    fn target_receive_bytes(&mut self, _timeout_ms: u32) -> (Vec<u8>, i32) {
        (Vec::new(), status::ENOTIMPL)
    }

    fn target_send_bytes(&mut self, _tx: &[u8], _timeout_ms: u32) -> i32 {
        status::ENOTIMPL
    }

    fn abort_command(&mut self) -> i32 {
        status::SUCCESS
    }

    fn last_error(&self) -> i32 {
        self.last_error
    }
}

/// Default filename suffix used when a caller wants a replay log path
/// derived from the live-capture output path.
pub fn default_replay_path(output_log: &Path) -> PathBuf {
    output_log.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, FrameDirection};

    fn sample_log() -> FrameLog {
        let mut log = FrameLog::new();
        log.append(Frame::new(
            0,
            0.0,
            hex::decode("00a404000e325041592e5359532e4444463031").unwrap(),
            20,
            FrameDirection::FromReader,
            true,
        ));
        log.append(Frame::new(
            1,
            0.001,
            hex::decode("6f23840e325041592e5359532e4444463031a5089000").unwrap(),
            23,
            FrameDirection::FromCard,
            true,
        ));
        log
    }

    #[test]
    fn replays_recorded_response_for_matching_request() {
        let mut initiator = EmulatedInitiator::from_log(sample_log());
        let request = hex::decode("00a404000e325041592e5359532e4444463031").unwrap();
        let (data, result) = initiator.initiator_transceive_bytes(&request, 1000);
        assert_eq!(result, 23);
        assert_eq!(data, hex::decode("6f23840e325041592e5359532e4444463031a5089000").unwrap());
        assert_eq!(initiator.last_error(), status::SUCCESS, "no native call here can fail");
    }

    #[test]
    fn returns_zero_result_for_unknown_request() {
        let mut initiator = EmulatedInitiator::from_log(sample_log());
        let (data, result) = initiator.initiator_transceive_bytes(&[0xde, 0xad, 0xbe, 0xef, 0x00], 1000);
        assert_eq!(result, 0);
        assert!(data.is_empty());
    }

    #[test]
    fn list_passive_targets_is_always_empty() {
        let mut initiator = EmulatedInitiator::from_log(sample_log());
        let mut out = Vec::new();
        let count = initiator.initiator_list_passive_targets(Modulation::Iso14443A, &mut out);
        assert_eq!(count, 0);
        assert!(out.is_empty());
    }
}
