use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, SystemTime};

use clap::Parser;
use log::error;

use iso14443_relay::config::RelayConfig;
use iso14443_relay::driver::NfcContext;
use iso14443_relay::hook::{DataHook, HookOutcome};
use iso14443_relay::session::SessionController;

const PROGRAM: Option<&str> = option_env!("CARGO_PKG_NAME");
const VERSION: Option<&str> = option_env!("CARGO_PKG_VERSION");

/// ISO/IEC 14443-4 contactless smartcard relay.
#[derive(Parser, Debug)]
#[command(name = "iso14443-relay", version, about)]
struct Cli {
    /// Initiator (card-facing) device index. Ignored with `--replay`.
    #[arg(long, value_name = "IDX")]
    initiator: Option<usize>,

    /// Target (reader-facing) device index.
    #[arg(long, value_name = "IDX", default_value_t = 1)]
    target: usize,

    /// Use raw 14443-4 framing instead of driver-side APDU reassembly.
    #[arg(long)]
    raw_framing: bool,

    /// Install a sample data hook that flags `ba ad`-prefixed FromReader
    /// frames for chained transmission (diagnostic use only).
    #[arg(long)]
    hook: bool,

    /// `RUST_LOG`-style level used when `RUST_LOG` itself is unset.
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// Output frame-log path. Defaults to a timestamped filename.
    #[arg(long, short = 'o', value_name = "FILE")]
    output: Option<PathBuf>,

    /// Replay a previously captured frame log instead of driving a live
    /// Initiator. Mutually exclusive with `--initiator`.
    #[arg(long, value_name = "FILE", conflicts_with = "initiator")]
    replay: Option<PathBuf>,

    /// List discovered device connection strings and exit.
    #[arg(long)]
    list_devices: bool,

    /// Print a one-line-per-frame summary of the saved log after relaying.
    #[arg(long)]
    print_log: bool,

    /// Session deadline in seconds (0 = no deadline).
    #[arg(long, value_name = "SECS", default_value_t = 0)]
    timeout: u64,
}

/// The `--hook` diagnostic hook (spec §4.3, scenario S4): forces chained
/// transmission whenever a FromReader frame starts with `ba ad`. The
/// decision is remembered across the pairing FromCard call so the ToReader
/// step still sees it — the engine re-derives `fragmented` from whichever
/// hook call ran last, so a hook that only reacts to FromReader must carry
/// its verdict forward itself.
#[derive(Default)]
struct BadgeHook {
    pending: bool,
}

impl DataHook for BadgeHook {
    fn call(
        &mut self,
        direction: iso14443_relay::frame::FrameDirection,
        data: Vec<u8>,
        _easy_framing: bool,
    ) -> HookOutcome {
        use iso14443_relay::frame::FrameDirection;
        match direction {
            FrameDirection::FromReader => {
                self.pending = data.starts_with(&[0xba, 0xad]);
                HookOutcome { fragmented: self.pending, data }
            }
            FrameDirection::FromCard => HookOutcome { fragmented: self.pending, data },
            _ => HookOutcome { fragmented: false, data },
        }
    }
}

#[cfg(feature = "libnfc")]
fn open_context() -> Result<Box<dyn NfcContext>, String> {
    iso14443_relay::ffi::LibnfcContext::new().map(|context| Box::new(context) as Box<dyn NfcContext>)
}

#[cfg(not(feature = "libnfc"))]
fn open_context() -> Result<Box<dyn NfcContext>, String> {
    Err("this build was compiled without the `libnfc` feature; no live NfcContext is available".to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if std::env::var_os("RUST_LOG").is_none() {
        env_logger::Builder::new().parse_filters(&cli.log_level).init();
    } else {
        env_logger::init();
    }

    log::info!(
        "{} {}",
        PROGRAM.unwrap_or("iso14443-relay"),
        VERSION.unwrap_or("unknown")
    );

    let mut context = match open_context() {
        Ok(context) => context,
        Err(err) => {
            error!("{err}");
            return ExitCode::from(1);
        }
    };

    if cli.list_devices {
        SessionController::list_devices(&mut context);
        return ExitCode::SUCCESS;
    }

    let output = cli
        .output
        .unwrap_or_else(|| RelayConfig::default_log_path(SystemTime::now()));

    let config = RelayConfig {
        initiator_device_index: cli.initiator,
        target_device_index: cli.target,
        easy_framing: !cli.raw_framing,
        fragment_size: iso14443_relay::config::DEFAULT_FRAGMENT_SIZE,
        session_timeout: Duration::from_secs(cli.timeout),
        log_path: output,
        replay_path: cli.replay,
        hook_enabled: cli.hook,
        print_log: cli.print_log,
        ..RelayConfig::default()
    };

    let controller = SessionController::new(config);
    let mut badge_hook = BadgeHook::default();
    let hook: Option<&mut dyn DataHook> = if cli.hook { Some(&mut badge_hook) } else { None };

    match controller.run(&mut context, hook) {
        Ok(outcome) => {
            println!("{}", outcome.summary());
            ExitCode::from(outcome.exit_code() as u8)
        }
        Err(err) => {
            error!("{err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
