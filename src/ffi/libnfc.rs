//! Hand-written `extern "C"` bindings to libnfc, declared directly against
//! the function and constant names libnfc's own `nfc.h`/`nfc-types.h`
//! expose (see `examples/original_source/libnfc_ffi/libnfc_ffi.py`, which
//! parses those same headers for a CFFI binding) rather than through
//! `bindgen` or a vendored `-sys` crate. Only [`LibnfcContext`] and
//! [`LibnfcDriver`] are public; everything else here is link-time plumbing.

use std::ffi::{c_char, c_int, CStr, CString};
use std::ptr;

use log::{debug, warn};

use crate::driver::{status, BoolOption, IntOption, Modulation, NfcContext, NfcDriver, TargetDescriptor};

/// Opaque libnfc context handle (`nfc_context*`).
#[repr(C)]
struct RawContext {
    _private: [u8; 0],
}

/// Opaque libnfc device handle (`nfc_device*`).
#[repr(C)]
struct RawDevice {
    _private: [u8; 0],
}

/// `nfc_modulation` — {modulation type, baud rate}. Baud rate is always
/// 106 kbps (`NBR_106`) on the relay path; only Type-A is exercised.
#[repr(C)]
struct RawModulation {
    nmt: c_int,
    nbr: c_int,
}

const NMT_ISO14443A: c_int = 1;
const NMT_ISO14443B: c_int = 3;
const NMT_FELICA: c_int = 2;
const NMT_JEWEL: c_int = 6;
const NBR_106: c_int = 1;

/// Mirrors `nfc_iso14443a_info` in `nfc-types.h`: the only member of the
/// `nfc_target_info` union the relay path reads or writes.
#[repr(C)]
struct RawIso14443aInfo {
    abt_atqa: [u8; 2],
    bt_sak: u8,
    sz_uid_len: usize,
    abt_uid: [u8; 10],
    sz_ats_len: usize,
    abt_ats: [u8; 254],
}

/// `nfc_target` is `{ nfc_target_info nti; nfc_modulation nm; }` in libnfc.
/// The union is represented as a fixed byte buffer sized for the largest
/// member (`nfc_iso14443a_info`) and reinterpreted through
/// [`RawIso14443aInfo`], since no header is parsed at build time here.
#[repr(C)]
struct RawTarget {
    nti: RawIso14443aInfo,
    nm: RawModulation,
}

impl RawTarget {
    fn zeroed() -> RawTarget {
        RawTarget {
            nti: RawIso14443aInfo {
                abt_atqa: [0; 2],
                bt_sak: 0,
                sz_uid_len: 0,
                abt_uid: [0; 10],
                sz_ats_len: 0,
                abt_ats: [0; 254],
            },
            nm: RawModulation { nmt: NMT_ISO14443A, nbr: NBR_106 },
        }
    }

    fn to_descriptor(&self) -> TargetDescriptor {
        TargetDescriptor {
            atqa: self.nti.abt_atqa,
            uid: self.nti.abt_uid[..self.nti.sz_uid_len.min(10)].to_vec(),
            sak: self.nti.bt_sak,
            ats: self.nti.abt_ats[..self.nti.sz_ats_len.min(254)].to_vec(),
            modulation: modulation_from_nmt(self.nm.nmt),
        }
    }

    fn from_descriptor(descriptor: &TargetDescriptor) -> RawTarget {
        let mut raw = RawTarget::zeroed();
        raw.nti.abt_atqa = descriptor.atqa;
        raw.nti.bt_sak = descriptor.sak;
        raw.nti.sz_uid_len = descriptor.uid.len().min(10);
        raw.nti.abt_uid[..raw.nti.sz_uid_len].copy_from_slice(&descriptor.uid[..raw.nti.sz_uid_len]);
        raw.nti.sz_ats_len = descriptor.ats.len().min(254);
        raw.nti.abt_ats[..raw.nti.sz_ats_len].copy_from_slice(&descriptor.ats[..raw.nti.sz_ats_len]);
        raw.nm.nmt = nmt_from_modulation(descriptor.modulation);
        raw
    }
}

fn modulation_from_nmt(nmt: c_int) -> Modulation {
    match nmt {
        NMT_ISO14443B => Modulation::Iso14443B,
        NMT_FELICA => Modulation::FeliCa,
        NMT_JEWEL => Modulation::Jewel,
        _ => Modulation::Iso14443A,
    }
}

fn nmt_from_modulation(modulation: Modulation) -> c_int {
    match modulation {
        Modulation::Iso14443A => NMT_ISO14443A,
        Modulation::Iso14443B => NMT_ISO14443B,
        Modulation::FeliCa => NMT_FELICA,
        Modulation::Jewel => NMT_JEWEL,
    }
}

// libnfc's `nfc_property` enum, in declaration order.
const NP_TIMEOUT_COMMAND: c_int = 4;
const NP_TIMEOUT_ATR: c_int = 5;
const NP_TIMEOUT_COM: c_int = 6;
const NP_HANDLE_CRC: c_int = 7;
const NP_HANDLE_PARITY: c_int = 8;
const NP_ACTIVATE_FIELD: c_int = 9;
const NP_ACCEPT_INVALID_FRAMES: c_int = 10;
const NP_ACCEPT_MULTIPLE_FRAMES: c_int = 11;
const NP_AUTO_ISO14443_4: c_int = 12;
const NP_EASY_FRAMING: c_int = 13;
#[allow(dead_code)] // part of libnfc's nfc_property enum; no BoolOption variant needs it yet
const NP_FORCE_ISO14443_A: c_int = 14;
const NP_INFINITE_SELECT: c_int = 19;

fn bool_option_property(option: BoolOption) -> c_int {
    match option {
        BoolOption::EasyFraming => NP_EASY_FRAMING,
        BoolOption::AutoIso14443_4 => NP_AUTO_ISO14443_4,
        BoolOption::ActivateField => NP_ACTIVATE_FIELD,
        BoolOption::AcceptInvalidFrames => NP_ACCEPT_INVALID_FRAMES,
        BoolOption::AcceptMultipleFrames => NP_ACCEPT_MULTIPLE_FRAMES,
        BoolOption::InfiniteSelect => NP_INFINITE_SELECT,
        BoolOption::HandleCrc => NP_HANDLE_CRC,
        BoolOption::HandleParity => NP_HANDLE_PARITY,
    }
}

fn int_option_property(option: IntOption) -> c_int {
    match option {
        IntOption::TimeoutCommand => NP_TIMEOUT_COMMAND,
        IntOption::TimeoutCom => NP_TIMEOUT_COM,
        IntOption::TimeoutAtr => NP_TIMEOUT_ATR,
    }
}

#[link(name = "nfc")]
extern "C" {
    fn nfc_init(context: *mut *mut RawContext);
    fn nfc_exit(context: *mut RawContext);
    fn nfc_version() -> *const c_char;

    fn nfc_list_devices(context: *mut RawContext, connstrings: *mut [c_char; 1024], devices_len: usize) -> usize;
    fn nfc_open(context: *mut RawContext, connstring: *const c_char) -> *mut RawDevice;
    fn nfc_close(device: *mut RawDevice);

    fn nfc_device_set_property_bool(device: *mut RawDevice, property: c_int, value: bool) -> c_int;
    fn nfc_device_set_property_int(device: *mut RawDevice, property: c_int, value: c_int) -> c_int;
    fn nfc_device_get_last_error(device: *const RawDevice) -> c_int;

    fn nfc_initiator_init(device: *mut RawDevice) -> c_int;
    fn nfc_initiator_list_passive_targets(
        device: *mut RawDevice,
        modulation: RawModulation,
        targets: *mut RawTarget,
        targets_len: usize,
    ) -> c_int;
    fn nfc_initiator_select_passive_target(
        device: *mut RawDevice,
        modulation: RawModulation,
        init_data: *const u8,
        init_data_len: usize,
        target: *mut RawTarget,
    ) -> c_int;
    fn nfc_initiator_transceive_bytes(
        device: *mut RawDevice,
        tx: *const u8,
        tx_len: usize,
        rx: *mut u8,
        rx_len: usize,
        timeout: c_int,
    ) -> c_int;

    fn nfc_target_init(
        device: *mut RawDevice,
        target: *mut RawTarget,
        rx: *mut u8,
        rx_len: usize,
        timeout: c_int,
    ) -> c_int;
    fn nfc_target_receive_bytes(device: *mut RawDevice, rx: *mut u8, rx_len: usize, timeout: c_int) -> c_int;
    fn nfc_target_send_bytes(device: *mut RawDevice, tx: *const u8, tx_len: usize, timeout: c_int) -> c_int;

    fn nfc_abort_command(device: *mut RawDevice) -> c_int;
}

/// Owns the libnfc library context (`nfc_init`/`nfc_exit`). One process
/// typically needs exactly one of these; [`NfcContext::open`] hands out a
/// [`LibnfcDriver`] per opened device.
pub struct LibnfcContext {
    context: *mut RawContext,
    version: String,
}

impl LibnfcContext {
    /// Calls `nfc_init`. Fails only if libnfc itself cannot allocate a
    /// context (extremely rare; libnfc does not report a reason).
    pub fn new() -> Result<LibnfcContext, String> {
        let mut context: *mut RawContext = ptr::null_mut();
        unsafe { nfc_init(&mut context) };
        if context.is_null() {
            return Err("nfc_init returned a null context".to_string());
        }
        let version = unsafe { CStr::from_ptr(nfc_version()) }.to_string_lossy().into_owned();
        debug!("libnfc {version} initialized");
        Ok(LibnfcContext { context, version })
    }
}

impl Drop for LibnfcContext {
    fn drop(&mut self) {
        unsafe { nfc_exit(self.context) };
    }
}

// Safety: libnfc's `nfc_context` is only ever touched from the thread that
// owns `LibnfcContext`/`LibnfcDriver`; the relay engine is single-threaded
// by design (spec §5). No native call here is made concurrently.
unsafe impl Send for LibnfcContext {}

impl NfcContext for LibnfcContext {
    fn list_devices(&mut self) -> Vec<String> {
        const MAX_DEVICES: usize = 16;
        let mut buf: Vec<[c_char; 1024]> = vec![[0; 1024]; MAX_DEVICES];
        let count = unsafe { nfc_list_devices(self.context, buf.as_mut_ptr(), MAX_DEVICES) };
        buf.into_iter()
            .take(count)
            .map(|raw| unsafe { CStr::from_ptr(raw.as_ptr()) }.to_string_lossy().into_owned())
            .collect()
    }

    fn open(&mut self, connstring: &str) -> Result<Box<dyn NfcDriver>, String> {
        let c_connstring = CString::new(connstring).map_err(|e| e.to_string())?;
        let device = unsafe { nfc_open(self.context, c_connstring.as_ptr()) };
        if device.is_null() {
            return Err(format!("nfc_open({connstring}) returned null"));
        }
        Ok(Box::new(LibnfcDriver {
            device,
            connstring: connstring.to_string(),
        }))
    }

    fn version(&self) -> &str {
        &self.version
    }
}

/// One opened libnfc device handle.
pub struct LibnfcDriver {
    device: *mut RawDevice,
    connstring: String,
}

// Safety: see `LibnfcContext`'s `Send` justification above.
unsafe impl Send for LibnfcDriver {}

impl Drop for LibnfcDriver {
    fn drop(&mut self) {
        unsafe { nfc_close(self.device) };
    }
}

impl NfcDriver for LibnfcDriver {
    fn connstring(&self) -> &str {
        &self.connstring
    }

    fn set_property_bool(&mut self, option: BoolOption, value: bool) -> c_int {
        unsafe { nfc_device_set_property_bool(self.device, bool_option_property(option), value) }
    }

    fn set_property_int(&mut self, option: IntOption, value: c_int) -> c_int {
        unsafe { nfc_device_set_property_int(self.device, int_option_property(option), value) }
    }

    fn initiator_init(&mut self) -> c_int {
        unsafe { nfc_initiator_init(self.device) }
    }

    fn initiator_list_passive_targets(&mut self, modulation: Modulation, out: &mut Vec<TargetDescriptor>) -> c_int {
        const MAX_TARGETS: usize = 8;
        let mut raw: Vec<RawTarget> = (0..MAX_TARGETS).map(|_| RawTarget::zeroed()).collect();
        let nm = RawModulation { nmt: nmt_from_modulation(modulation), nbr: NBR_106 };
        let count = unsafe {
            nfc_initiator_list_passive_targets(self.device, nm, raw.as_mut_ptr(), MAX_TARGETS)
        };
        if count > 0 {
            out.extend(raw.iter().take(count as usize).map(RawTarget::to_descriptor));
        }
        count
    }

    fn initiator_select_passive_target(
        &mut self,
        modulation: Modulation,
        uid: Option<&[u8]>,
    ) -> (c_int, Option<TargetDescriptor>) {
        let mut raw = RawTarget::zeroed();
        let nm = RawModulation { nmt: nmt_from_modulation(modulation), nbr: NBR_106 };
        let (init_ptr, init_len) = match uid {
            Some(bytes) => (bytes.as_ptr(), bytes.len()),
            None => (ptr::null(), 0),
        };
        let result = unsafe { nfc_initiator_select_passive_target(self.device, nm, init_ptr, init_len, &mut raw) };
        if result > 0 {
            (result, Some(raw.to_descriptor()))
        } else {
            (result, None)
        }
    }

    fn initiator_transceive_bytes(&mut self, tx: &[u8], timeout_ms: u32) -> (Vec<u8>, c_int) {
        let mut rx = vec![0u8; 264];
        let result = unsafe {
            nfc_initiator_transceive_bytes(
                self.device,
                tx.as_ptr(),
                tx.len(),
                rx.as_mut_ptr(),
                rx.len(),
                timeout_ms as c_int,
            )
        };
        if result > 0 {
            rx.truncate(result as usize);
            (rx, result)
        } else {
            (Vec::new(), result)
        }
    }

    fn target_init(&mut self, descriptor: &TargetDescriptor) -> (c_int, TargetDescriptor) {
        let mut raw = RawTarget::from_descriptor(descriptor);
        let mut rx = vec![0u8; 264];
        let result = unsafe { nfc_target_init(self.device, &mut raw, rx.as_mut_ptr(), rx.len(), 0) };
        if result < status::SUCCESS {
            warn!("nfc_target_init failed: {result}");
        }
        (result, raw.to_descriptor())
    }

    fn target_receive_bytes(&mut self, timeout_ms: u32) -> (Vec<u8>, c_int) {
        let mut rx = vec![0u8; 264];
        let result = unsafe { nfc_target_receive_bytes(self.device, rx.as_mut_ptr(), rx.len(), timeout_ms as c_int) };
        if result > 0 {
            rx.truncate(result as usize);
            (rx, result)
        } else {
            (Vec::new(), result)
        }
    }

    fn target_send_bytes(&mut self, tx: &[u8], timeout_ms: u32) -> c_int {
        unsafe { nfc_target_send_bytes(self.device, tx.as_ptr(), tx.len(), timeout_ms as c_int) }
    }

    fn abort_command(&mut self) -> c_int {
        unsafe { nfc_abort_command(self.device) }
    }

    fn last_error(&self) -> c_int {
        unsafe { nfc_device_get_last_error(self.device) }
    }
}
