//! Top-level session orchestration: enumerate devices, set up both radio
//! frontends, discover and select the real card, bootstrap the emulated
//! target, run the relay, persist the log (spec §2 SessionController, §5
//! cancellation, §6 CLI surface exit codes).

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use crate::discovery::{reader_get_targets, select_target};
use crate::driver::{status, BoolOption, IntOption, Modulation, NfcContext, NfcDriver};
use crate::emulated_initiator::EmulatedInitiator;
use crate::emulator_bootstrap::{bootstrap_emulated_target, default_emulated_target};
use crate::error::{RelayError, Result};
use crate::hook::{DataHook, DefaultHook};
use crate::relay_engine::{RelayEngine, StopReason};

/// Either a live Initiator handle opened through [`NfcContext`], or a
/// log-replay stand-in (spec §4.4). Boxed so both arms share one local
/// variable of a single concrete type without borrow-checker contortions.
enum InitiatorHandle {
    Live(Box<dyn NfcDriver>),
    Replay(EmulatedInitiator),
}

impl InitiatorHandle {
    fn driver(&mut self) -> &mut dyn NfcDriver {
        match self {
            InitiatorHandle::Live(driver) => driver.as_mut(),
            InitiatorHandle::Replay(initiator) => initiator,
        }
    }

    fn is_replay(&self) -> bool {
        matches!(self, InitiatorHandle::Replay(_))
    }
}

/// Everything a caller might want out of a finished session: why the relay
/// stopped, the last native error on each endpoint (spec §7's user-visible
/// summary), and where the log landed on disk.
#[derive(Debug)]
pub struct SessionOutcome {
    pub stop_reason: StopReason,
    pub target_last_error: i32,
    pub initiator_last_error: i32,
    pub log_path: std::path::PathBuf,
    pub frame_count: usize,
}

impl SessionOutcome {
    /// Process exit code per the CLI contract (spec §6): 0 for a clean
    /// stop, 130 after a SIGINT-driven cancellation, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self.stop_reason {
            StopReason::Cancelled => 130,
            StopReason::Deadline => 0,
            StopReason::DriverError { .. } | StopReason::FrontendFault => 1,
        }
    }

    /// Textual summary of the terminal state plus both endpoints' last
    /// error codes and the output path, as required by spec §7.
    pub fn summary(&self) -> String {
        format!(
            "relay stopped: {:?} | target_last_error={} ({}) | initiator_last_error={} ({}) | frames={} | log={}",
            self.stop_reason,
            self.target_last_error,
            status::message(self.target_last_error),
            self.initiator_last_error,
            status::message(self.initiator_last_error),
            self.frame_count,
            self.log_path.display(),
        )
    }
}

pub struct SessionController {
    config: crate::config::RelayConfig,
}

impl SessionController {
    pub fn new(config: crate::config::RelayConfig) -> SessionController {
        SessionController { config }
    }

    /// Print each connection string with its index, as `nfc_wrapper.py`'s
    /// `list_devices(verbose=True)` does; backs the CLI's `--list-devices`.
    pub fn list_devices(ctx: &mut dyn NfcContext) -> Vec<String> {
        let devices = ctx.list_devices();
        for (i, connstring) in devices.iter().enumerate() {
            println!("{i}: {connstring}");
        }
        devices
    }

    /// Run one full session: open both frontends (or load a replay log in
    /// lieu of a live Initiator), discover and select the real card,
    /// bootstrap the emulated target, relay until a terminal condition,
    /// then persist the frame log. A SIGINT received any time after the
    /// watchdog is armed stops the relay at the next half-turn boundary and
    /// still flushes whatever was captured (spec §5).
    pub fn run(&self, ctx: &mut dyn NfcContext, hook: Option<&mut dyn DataHook>) -> Result<SessionOutcome> {
        let devices = ctx.list_devices();

        let mut target = self.open_target(ctx, &devices)?;
        let mut initiator = self.open_initiator(ctx, &devices)?;

        self.configure_timeouts(target.as_mut())?;
        self.configure_timeouts(initiator.driver())?;

        let descriptor = if initiator.is_replay() {
            default_emulated_target([0x08, 0x00, 0x00, 0x00])
        } else {
            let _ = initiator.driver().initiator_init();
            let candidates = reader_get_targets(
                initiator.driver(),
                Modulation::Iso14443A,
                Duration::ZERO,
                self.config.apple_transport,
            );
            if candidates.is_empty() {
                return Err(RelayError::Selection("no passive targets discovered".into()));
            }
            let selected = select_target(initiator.driver(), Modulation::Iso14443A, &candidates, 0)?;
            info!("relaying real card {selected}");
            default_emulated_target(dynamic_uid(&selected.uid))
        };

        bootstrap_emulated_target(target.as_mut(), &descriptor)?;

        let cancel_flag = Arc::new(AtomicBool::new(false));
        arm_sigint_watchdog(cancel_flag.clone())?;

        // `hook_enabled` gates whether a caller-supplied hook actually runs:
        // a hook passed in while disabled is ignored in favor of the no-op
        // default, so the config knob is the single source of truth rather
        // than just mirroring the caller's own `Option` (spec §4.3).
        let mut default_hook = DefaultHook;
        let hook: &mut dyn DataHook = if self.config.hook_enabled {
            hook.unwrap_or(&mut default_hook)
        } else {
            &mut default_hook
        };

        let params = self.config.engine_params();
        let mut engine =
            RelayEngine::new(target.as_mut(), initiator.driver(), hook, params).with_cancel_flag(cancel_flag);
        let stop_reason = engine.run();

        let target_last_error = engine.target_last_error();
        let initiator_last_error = engine.initiator_last_error();
        let log = engine.into_frame_log();
        let frame_count = log.len();

        match stop_reason {
            StopReason::DriverError { code } => warn!("relay terminated with driver code {code}"),
            StopReason::Cancelled => warn!("relay cancelled by signal"),
            StopReason::Deadline => info!("relay stopped: session deadline reached"),
            StopReason::FrontendFault => error!("relay stopped: radio frontend fault"),
        }

        // Cancellation order per spec §5: initiator before target.
        let _ = initiator.driver().abort_command();
        let _ = target.abort_command();

        log.save(&self.config.log_path)?;
        if self.config.print_log {
            log.print_summary();
        }

        Ok(SessionOutcome {
            stop_reason,
            target_last_error,
            initiator_last_error,
            log_path: self.config.log_path.clone(),
            frame_count,
        })
    }

    fn open_target(&self, ctx: &mut dyn NfcContext, devices: &[String]) -> Result<Box<dyn NfcDriver>> {
        let connstring = devices.get(self.config.target_device_index).ok_or_else(|| {
            RelayError::Configuration(format!(
                "target device index {} out of range ({} devices found)",
                self.config.target_device_index,
                devices.len()
            ))
        })?;
        ctx.open(connstring).map_err(|source| RelayError::DriverOpen {
            connstring: connstring.clone(),
            source: source.into(),
        })
    }

    fn open_initiator(&self, ctx: &mut dyn NfcContext, devices: &[String]) -> Result<InitiatorHandle> {
        if let Some(replay_path) = &self.config.replay_path {
            return Ok(InitiatorHandle::Replay(EmulatedInitiator::load(replay_path)?));
        }
        let idx = self.config.initiator_device_index.ok_or_else(|| {
            RelayError::Configuration("no initiator device index and no replay path configured".into())
        })?;
        let connstring = devices
            .get(idx)
            .ok_or_else(|| RelayError::Configuration(format!("initiator device index {idx} out of range ({} devices found)", devices.len())))?;
        let driver = ctx.open(connstring).map_err(|source| RelayError::DriverOpen {
            connstring: connstring.clone(),
            source: source.into(),
        })?;
        Ok(InitiatorHandle::Live(driver))
    }

    fn configure_timeouts(&self, driver: &mut dyn NfcDriver) -> Result<()> {
        let rc = driver.set_property_bool(BoolOption::AutoIso14443_4, true);
        if rc < status::SUCCESS {
            return Err(RelayError::Configuration(format!(
                "set AutoIso14443_4 failed: {} ({})",
                rc,
                status::message(rc)
            )));
        }
        driver.set_property_int(IntOption::TimeoutCommand, self.config.transceive_timeout_ms as i32);
        driver.set_property_int(IntOption::TimeoutCom, self.config.receive_timeout_ms as i32);
        driver.set_property_int(IntOption::TimeoutAtr, self.config.atr_timeout_ms as i32);
        Ok(())
    }
}

/// UID[0]=0x08 marks a dynamic (random) UID, required by the PN532
/// emulation firmware (spec §3, §4.5); forced regardless of the real
/// card's actual first UID byte.
fn dynamic_uid(uid: &[u8]) -> [u8; 4] {
    let mut out = [0x08, 0x00, 0x00, 0x00];
    for (i, b) in uid.iter().take(3).enumerate() {
        out[i + 1] = *b;
    }
    out
}

/// Installs a `SIGINT` flag the relay loop polls between half-turns (spec
/// §5).
fn arm_sigint_watchdog(flag: Arc<AtomicBool>) -> Result<()> {
    signal_hook::flag::register(signal_hook::consts::SIGINT, flag)
        .map_err(|source| RelayError::Configuration(format!("failed to install SIGINT handler: {source}")))?;
    Ok(())
}
