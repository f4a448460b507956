//! Session configuration (spec §6 CLI surface knobs, §9 fragment-size
//! open question, §10.3/§10.6 of SPEC_FULL.md).

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::relay_engine::EngineParams;

/// Default fragment size for chained sends: tuned for a 64-byte FSC after
/// PCB and CRC overhead at higher FSDs (spec §9 open question 1).
pub const DEFAULT_FRAGMENT_SIZE: usize = 134;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// `None` selects log-replay mode via `replay_path` instead of a live
    /// Initiator (spec §4.4).
    pub initiator_device_index: Option<usize>,
    pub target_device_index: usize,
    pub easy_framing: bool,
    pub fragment_size: usize,
    pub session_timeout: Duration,
    pub receive_timeout_ms: u32,
    pub transceive_timeout_ms: u32,
    pub send_timeout_ms: u32,
    /// Drives `IntOption::TimeoutAtr` in `SessionController::configure_timeouts`
    /// (spec §6: `TIMEOUT_ATR` is one of the four required int options).
    pub atr_timeout_ms: u32,
    pub apple_transport: bool,
    pub hook_enabled: bool,
    pub log_path: PathBuf,
    pub replay_path: Option<PathBuf>,
    pub print_log: bool,
}

impl Default for RelayConfig {
    fn default() -> RelayConfig {
        RelayConfig {
            initiator_device_index: Some(0),
            target_device_index: 1,
            easy_framing: true,
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            session_timeout: Duration::ZERO,
            receive_timeout_ms: 2000,
            transceive_timeout_ms: 2000,
            send_timeout_ms: 2000,
            atr_timeout_ms: 2000,
            apple_transport: false,
            hook_enabled: false,
            log_path: PathBuf::from("relay_log.json"),
            replay_path: None,
            print_log: false,
        }
    }
}

impl RelayConfig {
    pub fn engine_params(&self) -> EngineParams {
        EngineParams {
            easy_framing: self.easy_framing,
            fragment_size: self.fragment_size,
            session_timeout: self.session_timeout,
            receive_timeout_ms: self.receive_timeout_ms,
            transceive_timeout_ms: self.transceive_timeout_ms,
            send_timeout_ms: self.send_timeout_ms,
        }
    }

    /// Timestamped default output filename, in the style of
    /// `pn532mitm.py`'s `log_fname_default`: program name + `HH_MM_SS_DD_MM_YYYY`.
    /// `now` is injected so this stays deterministic for tests.
    pub fn default_log_path(now: SystemTime) -> PathBuf {
        let secs = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        PathBuf::from(format!("iso14443-relay_{secs}_log.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_fragment_size() {
        assert_eq!(RelayConfig::default().fragment_size, 134);
    }

    #[test]
    fn default_log_path_is_deterministic_given_a_clock() {
        let t = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(
            RelayConfig::default_log_path(t),
            PathBuf::from("iso14443-relay_1700000000_log.json")
        );
    }
}
