//! The state machine that pumps frames between the Target (reader-facing)
//! and Initiator (card-facing) endpoints (spec §4.6).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::driver::{status, BoolOption, NfcDriver};
use crate::frame::{Frame, FrameDirection};
use crate::frame_log::FrameLog;
use crate::hook::DataHook;
use crate::pcb::Pcb;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FromReader,
    ReaderCardHook,
    TransceiveCard,
    CardReaderHook,
    ToReader,
    FromReaderFragment,
}

/// Tunables the engine needs beyond the two driver handles. Owned by
/// [`crate::config::RelayConfig`]; duplicated here as a narrow view so the
/// engine doesn't depend on the whole config surface (CLI-only fields).
#[derive(Debug, Clone, Copy)]
pub struct EngineParams {
    pub easy_framing: bool,
    pub fragment_size: usize,
    /// Zero means no deadline (spec §4.6 "Deadline = start_time +
    /// session_timeout (0 ⇒ no deadline)").
    pub session_timeout: Duration,
    pub receive_timeout_ms: u32,
    pub transceive_timeout_ms: u32,
    pub send_timeout_ms: u32,
}

impl Default for EngineParams {
    fn default() -> EngineParams {
        EngineParams {
            easy_framing: true,
            fragment_size: 134,
            session_timeout: Duration::ZERO,
            receive_timeout_ms: 2000,
            transceive_timeout_ms: 2000,
            send_timeout_ms: 2000,
        }
    }
}

/// Why the relay loop stopped. Every variant is a clean stop from the
/// caller's point of view (spec §4.6 "Terminal on any non-positive driver
/// result, on session deadline, or on an assertion-class failure"); none
/// of them propagate as an `Err` out of [`RelayEngine::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A driver call returned a non-positive status.
    DriverError { code: i32 },
    /// The session deadline elapsed.
    Deadline,
    /// A radio-frontend assertion fired (logged, not propagated).
    FrontendFault,
    /// The host process received SIGINT (spec §5 cancellation).
    Cancelled,
}

pub struct RelayEngine<'a> {
    target: &'a mut dyn NfcDriver,
    initiator: &'a mut dyn NfcDriver,
    hook: &'a mut dyn DataHook,
    params: EngineParams,
    log: FrameLog,
    start: Instant,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> RelayEngine<'a> {
    pub fn new(
        target: &'a mut dyn NfcDriver,
        initiator: &'a mut dyn NfcDriver,
        hook: &'a mut dyn DataHook,
        params: EngineParams,
    ) -> RelayEngine<'a> {
        RelayEngine {
            target,
            initiator,
            hook,
            params,
            log: FrameLog::new(),
            start: Instant::now(),
            cancel: None,
        }
    }

    /// Arm a watchdog flag checked alongside the session deadline (spec §5:
    /// "the engine's session deadline ... cannot interrupt a blocked driver
    /// call"; this flag is set from a SIGINT handler by
    /// [`crate::session::SessionController`] and is only observed between
    /// half-turns, not inside a blocked `receive`/`transceive`).
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> RelayEngine<'a> {
        self.cancel = Some(flag);
        self
    }

    pub fn frame_log(&self) -> &FrameLog {
        &self.log
    }

    pub fn into_frame_log(self) -> FrameLog {
        self.log
    }

    /// Last native status on the Target endpoint, for the spec §7 summary.
    pub fn target_last_error(&self) -> i32 {
        self.target.last_error()
    }

    /// Last native status on the Initiator endpoint, for the spec §7 summary.
    pub fn initiator_last_error(&self) -> i32 {
        self.initiator.last_error()
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    fn deadline_expired(&self) -> bool {
        self.params.session_timeout != Duration::ZERO && self.start.elapsed() >= self.params.session_timeout
    }

    fn log_frame(&mut self, index: u64, data: Vec<u8>, result: i32, direction: FrameDirection, easy_framing: bool) {
        let time = self.elapsed();
        self.log.append(Frame::new(index, time, data, result, direction, easy_framing));
    }

    /// Run the relay loop to completion (spec §4.6). `easy_framing` is
    /// re-armed on both endpoints before the first `FromReader` receive.
    pub fn run(&mut self) -> StopReason {
        self.log.clear();
        self.target
            .set_property_bool(BoolOption::EasyFraming, self.params.easy_framing);
        self.initiator
            .set_property_bool(BoolOption::EasyFraming, self.params.easy_framing);

        let mut easy_framing = self.params.easy_framing;
        let mut state = State::FromReader;
        let mut index: u64 = 0;
        let mut pending = Vec::new();
        let mut fragmented = false;

        loop {
            if self.cancelled() {
                info!("cancellation requested, stopping relay");
                return StopReason::Cancelled;
            }
            if self.deadline_expired() {
                info!("session deadline reached, stopping relay");
                return StopReason::Deadline;
            }
            debug!("relay state = {state:?}");

            match state {
                State::FromReader => {
                    let (data, result) = self.target.target_receive_bytes(self.params.receive_timeout_ms);
                    self.log_frame(index, data.clone(), result, FrameDirection::FromReader, easy_framing);
                    if result <= status::SUCCESS {
                        warn!("receive from reader failed: {} ({})", result, status::message(result));
                        return StopReason::DriverError { code: result };
                    }
                    pending = data;
                    state = State::ReaderCardHook;
                }

                State::ReaderCardHook => {
                    let outcome = self.hook.call(FrameDirection::FromReader, pending, easy_framing);
                    fragmented = outcome.fragmented;
                    pending = outcome.data;
                    state = State::TransceiveCard;
                }

                State::TransceiveCard => {
                    self.log_frame(index, pending.clone(), 1, FrameDirection::ToCard, easy_framing);
                    let (data, result) = self
                        .initiator
                        .initiator_transceive_bytes(&pending, self.params.transceive_timeout_ms);
                    index += 1;
                    self.log_frame(index, data.clone(), result, FrameDirection::FromCard, easy_framing);
                    if result <= status::SUCCESS {
                        warn!("transceive to card failed: {} ({})", result, status::message(result));
                        return StopReason::DriverError { code: result };
                    }
                    pending = data;
                    state = State::CardReaderHook;
                }

                State::CardReaderHook => {
                    let outcome = self.hook.call(FrameDirection::FromCard, pending, easy_framing);
                    fragmented = outcome.fragmented;
                    pending = outcome.data;
                    state = State::ToReader;
                }

                State::ToReader => {
                    if fragmented {
                        let result = self.send_fragmented(index, &pending);
                        index += 1;
                        easy_framing = false;
                        if result <= status::SUCCESS {
                            warn!("fragmented send to reader failed: {result}");
                            return StopReason::DriverError { code: result };
                        }
                        state = State::FromReaderFragment;
                    } else {
                        let result = self.target.target_send_bytes(&pending, self.params.send_timeout_ms);
                        self.log_frame(index, pending.clone(), result, FrameDirection::ToReader, easy_framing);
                        index += 1;
                        if result <= status::SUCCESS {
                            warn!("send to reader failed: {} ({})", result, status::message(result));
                            return StopReason::DriverError { code: result };
                        }
                        state = State::FromReader;
                    }
                }

                State::FromReaderFragment => {
                    let (data, result) = self.receive_fragmented();
                    easy_framing = self.params.easy_framing;
                    self.target.set_property_bool(BoolOption::EasyFraming, easy_framing);
                    self.log_frame(index, data.clone(), result, FrameDirection::FromReader, easy_framing);
                    if result <= status::SUCCESS {
                        warn!("reassembly receive failed: {result}");
                        return StopReason::DriverError { code: result };
                    }
                    pending = data;
                    state = State::ReaderCardHook;
                }
            }
        }
    }

    /// Chained send: split `data` into `fragment_size`-byte I-blocks,
    /// alternating block number, clearing chaining on the final chunk
    /// (spec §4.6.1, law 3/5 of spec §8).
    fn send_fragmented(&mut self, index: u64, data: &[u8]) -> i32 {
        self.target.set_property_bool(BoolOption::EasyFraming, false);

        let chunks: Vec<&[u8]> = if data.is_empty() {
            vec![&[]]
        } else {
            data.chunks(self.params.fragment_size.max(1)).collect()
        };

        let mut pcb = Pcb::initial_chaining_iblock();
        let last = chunks.len() - 1;
        for (i, chunk) in chunks.iter().enumerate() {
            pcb = pcb.toggle_block_number();
            if i == last {
                pcb = pcb.set_chaining(false);
            }
            let mut frame = Vec::with_capacity(chunk.len() + 1);
            frame.push(pcb.encode());
            frame.extend_from_slice(chunk);

            let result = self.target.target_send_bytes(&frame, self.params.send_timeout_ms);
            self.log_frame(index, frame, result, FrameDirection::ToReader, false);
            if result <= status::SUCCESS {
                return result;
            }

            if i != last {
                let (ack, result) = self.target.target_receive_bytes(self.params.receive_timeout_ms);
                self.log_frame(index, ack, result, FrameDirection::FromReader, false);
                if result <= status::SUCCESS {
                    return result;
                }
            }
        }
        chunks.len() as i32
    }

    /// Chained receive: reassemble a fragmented reader command,
    /// acknowledging every chunk but the last (spec §4.6.2, law 4 of
    /// spec §8). The individual chunks are not logged — only the
    /// reassembled buffer is, by the caller.
    fn receive_fragmented(&mut self) -> (Vec<u8>, i32) {
        self.target.set_property_bool(BoolOption::EasyFraming, false);

        let mut accumulator = Vec::new();
        let mut ack = Pcb::ack_template();

        loop {
            let (data, result) = self.target.target_receive_bytes(self.params.receive_timeout_ms);
            if result <= status::SUCCESS {
                return (Vec::new(), result);
            }
            if data.is_empty() {
                return (Vec::new(), status::EIO);
            }
            let pcb = Pcb::decode(data[0]);
            accumulator.extend_from_slice(&data[1..]);
            if !pcb.is_chaining() {
                let len = accumulator.len() as i32;
                return (accumulator, len);
            }
            let _ = self.target.target_send_bytes(&[ack.encode()], self.params.send_timeout_ms);
            ack = ack.toggle_block_number();
        }
    }
}
