//! The seam between the relay core and a physical (or replayed) NFC
//! frontend. Only this trait and the constants it references are consumed
//! by [`crate::relay_engine::RelayEngine`] — no real-driver binding is ever
//! named outside [`crate::ffi`].

use std::fmt;

/// Native driver status codes, named after libnfc's `nfc_error` (see
/// `NFC_EXPORT` constants in libnfc's `nfc.h`, reproduced in
/// `examples/original_source/libnfc_ffi/libnfc_ffi.py`).
pub mod status {
    pub const SUCCESS: i32 = 0;
    pub const EIO: i32 = -1;
    pub const EINVARG: i32 = -2;
    pub const EDEVNOTSUPP: i32 = -3;
    pub const ENOTSUCHDEV: i32 = -4;
    pub const EOVFLOW: i32 = -5;
    pub const ETIMEOUT: i32 = -7;
    pub const EOPABORTED: i32 = -10;
    pub const ENOTIMPL: i32 = -14;
    pub const ETGRELEASED: i32 = -20;
    pub const EMFCAUTHFAIL: i32 = -78;
    pub const ERFTRANS: i32 = -90;
    pub const ECHIP: i32 = -99;

    /// Human-readable message, mirroring `sErrorMessages` in
    /// `examples/original_source/nfc_wrapper.py`.
    pub fn message(code: i32) -> &'static str {
        match code {
            SUCCESS => "Success",
            EIO => "Input / Output Error",
            EINVARG => "Invalid argument(s)",
            EDEVNOTSUPP => "Not Supported by Device",
            ENOTSUCHDEV => "No Such Device",
            EOVFLOW => "Buffer Overflow",
            ETIMEOUT => "Timeout",
            EOPABORTED => "Operation Aborted",
            ENOTIMPL => "Not (yet) Implemented",
            ETGRELEASED => "Target Released",
            EMFCAUTHFAIL => "Mifare Authentication Failed",
            ERFTRANS => "RF Transmission Error",
            ECHIP => "Device's Internal Chip Error",
            _ => "Unknown driver error",
        }
    }
}

/// Boolean device properties, named after libnfc's `nfc_property`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOption {
    EasyFraming,
    AutoIso14443_4,
    ActivateField,
    AcceptInvalidFrames,
    AcceptMultipleFrames,
    InfiniteSelect,
    HandleCrc,
    HandleParity,
}

/// Integer device properties (timeouts, in milliseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntOption {
    TimeoutCommand,
    TimeoutCom,
    TimeoutAtr,
}

/// Passive target modulation, matching `nfc_modulation_type`. Only
/// ISO14443-A is exercised by the relay path; the others are surfaced so
/// discovery can report (and skip) non-Type-4 targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modulation {
    Iso14443A,
    Iso14443B,
    FeliCa,
    Jewel,
}

/// A target descriptor produced by discovery or fed into `target_init` for
/// emulation. Field names mirror `nfc_target_info.nai` in libnfc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub atqa: [u8; 2],
    pub uid: Vec<u8>,
    pub sak: u8,
    pub ats: Vec<u8>,
    pub modulation: Modulation,
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UID={} ATQA={} SAK={:02x} ATS={}",
            hex::encode(&self.uid),
            hex::encode(self.atqa),
            self.sak,
            hex::encode(&self.ats)
        )
    }
}

/// The subset of libnfc's surface the relay engine consumes (spec §6).
///
/// Both a live device binding ([`crate::ffi::libnfc::LibnfcDriver`], behind
/// the `libnfc` feature) and a log-replay stand-in
/// ([`crate::emulated_initiator::EmulatedInitiator`]) implement it.
pub trait NfcDriver {
    /// Device connection string this handle was opened with, for logging.
    fn connstring(&self) -> &str;

    fn set_property_bool(&mut self, option: BoolOption, value: bool) -> i32;
    fn set_property_int(&mut self, option: IntOption, value: i32) -> i32;

    fn initiator_init(&mut self) -> i32;

    /// Populate `out` with up to `out.len()` discovered targets, returning
    /// the count found (or a negative driver error).
    fn initiator_list_passive_targets(
        &mut self,
        modulation: Modulation,
        out: &mut Vec<TargetDescriptor>,
    ) -> i32;

    /// `uid = None` selects without a UID filter (retry path of §4.6.3).
    fn initiator_select_passive_target(
        &mut self,
        modulation: Modulation,
        uid: Option<&[u8]>,
    ) -> (i32, Option<TargetDescriptor>);

    /// Returns the response bytes (possibly empty on failure) and the
    /// driver's status code. A non-positive code is a failure per spec §3.
    fn initiator_transceive_bytes(&mut self, tx: &[u8], timeout_ms: u32) -> (Vec<u8>, i32);

    /// Initializes the Target frontend with `descriptor`. On success the
    /// driver may rewrite parts of the descriptor (negotiated parameters);
    /// the post-init descriptor is returned.
    fn target_init(&mut self, descriptor: &TargetDescriptor) -> (i32, TargetDescriptor);

    fn target_receive_bytes(&mut self, timeout_ms: u32) -> (Vec<u8>, i32);
    fn target_send_bytes(&mut self, tx: &[u8], timeout_ms: u32) -> i32;

    fn abort_command(&mut self) -> i32;

    /// Most recent native status code, for the user-visible summary in §7.
    fn last_error(&self) -> i32;
}

/// Device enumeration and open/close, kept separate from [`NfcDriver`]
/// because they operate before a per-device handle exists (spec §6:
/// `list_devices`, `open`, `close`). A context owns zero or more open
/// devices; `version()` mirrors libnfc's build-info string.
pub trait NfcContext {
    fn list_devices(&mut self) -> Vec<String>;
    fn open(&mut self, connstring: &str) -> std::result::Result<Box<dyn NfcDriver>, String>;
    fn version(&self) -> &str;
}
