//! Passive-target discovery and selection (spec §4.6.3).

use std::time::{Duration, Instant};

use log::{info, warn};

use crate::driver::{status, Modulation, NfcDriver, TargetDescriptor};
use crate::error::{RelayError, Result};

/// Fixed four-frame bit pattern some Apple devices expect before normal
/// anti-collision will find them (`apple_frame_sequence` in
/// `examples/original_source/NFCRelay.py`). Sent twice before each poll
/// when [`crate::config::RelayConfig::apple_transport`] is enabled.
pub const APPLE_FRAME_1: [u8; 15] = [
    0x6a, 0x02, 0xc8, 0x01, 0x00, 0x03, 0x00, 0x02, 0x79, 0x00, 0x00, 0x00, 0x00, 0xc2, 0xd8,
];
/// 7-bit short frame (`0x52`, the WUPA command) — transmitted bit-wise by
/// the real driver; represented here as its single payload byte.
pub const APPLE_FRAME_2: [u8; 1] = [0x52];
pub const APPLE_FRAME_3: [u8; 2] = [0x93, 0x20];
pub const APPLE_FRAME_4: [u8; 9] = [0x93, 0x70, 0x00, 0x00, 0x00, 0x00, 0x00, 0x9c, 0xd9];

/// Poll `driver` for passive targets until at least one appears or
/// `timeout` elapses (`Duration::ZERO` polls forever). Returns the
/// discovered candidates.
pub fn reader_get_targets(
    driver: &mut dyn NfcDriver,
    modulation: Modulation,
    timeout: Duration,
    apple_transport: bool,
) -> Vec<TargetDescriptor> {
    let start = Instant::now();
    loop {
        if apple_transport {
            for _ in 0..2 {
                let _ = driver.initiator_transceive_bytes(&APPLE_FRAME_1, 1000);
                let _ = driver.initiator_transceive_bytes(&APPLE_FRAME_2, 1000);
            }
            let _ = driver.initiator_transceive_bytes(&APPLE_FRAME_3, 1000);
            let _ = driver.initiator_transceive_bytes(&APPLE_FRAME_4, 1000);
        }

        let mut targets = Vec::new();
        let count = driver.initiator_list_passive_targets(modulation, &mut targets);
        if count > 0 {
            return targets;
        }

        if timeout != Duration::ZERO && start.elapsed() >= timeout {
            warn!("target discovery timed out after {timeout:?}");
            return Vec::new();
        }
    }
}

/// Select candidate `index` out of `candidates`, retrying once without a
/// UID filter on the first failure (spec §4.6.3). A second failure is a
/// fatal [`RelayError::Selection`].
pub fn select_target(
    driver: &mut dyn NfcDriver,
    modulation: Modulation,
    candidates: &[TargetDescriptor],
    index: usize,
) -> Result<TargetDescriptor> {
    let candidate = candidates
        .get(index)
        .ok_or_else(|| RelayError::Selection(format!("tag index {index} out of range")))?;

    let (result, selected) = driver.initiator_select_passive_target(modulation, Some(&candidate.uid));
    if result >= status::SUCCESS {
        if let Some(target) = selected {
            info!("selected target {target}");
            return Ok(target);
        }
    }
    warn!("select_passive_target failed ({result}), retrying without UID filter");

    let (result, selected) = driver.initiator_select_passive_target(modulation, None);
    if result >= status::SUCCESS {
        if let Some(target) = selected {
            info!("selected target {target} (retry)");
            return Ok(target);
        }
    }
    Err(RelayError::Selection(format!(
        "select_passive_target failed twice: {} ({})",
        result,
        status::message(result)
    )))
}
