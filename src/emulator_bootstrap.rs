//! Builds the fabricated card identity the Target frontend answers
//! anti-collision with (spec §3 EmulatedTarget, §4.5).

use log::info;

use crate::driver::{status, Modulation, NfcDriver, TargetDescriptor};
use crate::error::{RelayError, Result};

/// Default ATS: FSCI=5 (FSC=64 bytes), FWI=9, SFGI=2, DR/DS support
/// 106/212/424 kbps, CID and NAD supported (spec §3).
pub const DEFAULT_ATS: [u8; 4] = [0x75, 0x33, 0x92, 0x03];
/// ISO 14443-4 compliant (spec §3).
pub const DEFAULT_SAK: u8 = 0x20;
pub const DEFAULT_ATQA: [u8; 2] = [0x03, 0x04];

/// Build the default fabricated [`TargetDescriptor`]. `uid` must have
/// `uid[0] == 0x08` — required by the PN532 emulation firmware to accept
/// a dynamic (random) UID descriptor (spec §3, §4.5).
pub fn default_emulated_target(uid: [u8; 4]) -> TargetDescriptor {
    assert_eq!(uid[0], 0x08, "UID[0] must be 0x08 for PN532 target emulation");
    TargetDescriptor {
        atqa: DEFAULT_ATQA,
        uid: uid.to_vec(),
        sak: DEFAULT_SAK,
        ats: DEFAULT_ATS.to_vec(),
        modulation: Modulation::Iso14443A,
    }
}

/// Initializes the Target frontend with `descriptor` and reads back the
/// post-init descriptor, which may have been rewritten by the driver
/// (negotiated parameters) — that post-init value is the canonical
/// emulated identity used for logging from then on (spec §4.5).
pub fn bootstrap_emulated_target(
    driver: &mut dyn NfcDriver,
    descriptor: &TargetDescriptor,
) -> Result<TargetDescriptor> {
    let (result, post_init) = driver.target_init(descriptor);
    if result < status::SUCCESS {
        return Err(RelayError::DriverOpen {
            connstring: driver.connstring().to_string(),
            source: format!("target_init failed: {} ({})", result, status::message(result)).into(),
        });
    }
    info!("emulated target ready: {post_init}");
    Ok(post_init)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_target_matches_spec_constants() {
        let target = default_emulated_target([0x08, 0xba, 0xdf, 0x0d]);
        assert_eq!(target.ats, DEFAULT_ATS);
        assert_eq!(target.sak, DEFAULT_SAK);
        assert_eq!(target.atqa, DEFAULT_ATQA);
    }

    #[test]
    #[should_panic(expected = "UID[0] must be 0x08")]
    fn rejects_uid_without_dynamic_marker() {
        default_emulated_target([0x04, 0x11, 0x22, 0x33]);
    }
}
