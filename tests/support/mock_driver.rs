//! Scriptable [`NfcDriver`] used by `tests/relay_scenarios.rs` to stand in
//! for either radio endpoint without a physical device (spec §9 "Mock it
//! for tests (S1-S6)").

use std::collections::VecDeque;

use iso14443_relay::driver::{status, BoolOption, IntOption, Modulation, NfcDriver, TargetDescriptor};

/// One scripted response to a `receive`/`transceive` call.
#[derive(Debug, Clone)]
pub struct Scripted {
    pub data: Vec<u8>,
    pub result: i32,
}

impl Scripted {
    pub fn ok(data: impl Into<Vec<u8>>) -> Scripted {
        let data = data.into();
        Scripted { result: data.len() as i32, data }
    }

    pub fn failure(result: i32) -> Scripted {
        Scripted { data: Vec::new(), result }
    }
}

/// A driver whose `receive`/`transceive` calls pop from a scripted queue
/// and whose `send` calls append to a record the test can assert against.
/// One instance plays either the Target or the Initiator role depending on
/// which `NfcDriver` methods the scenario under test exercises.
#[derive(Default)]
pub struct MockDriver {
    pub receive_script: VecDeque<Scripted>,
    pub transceive_script: VecDeque<Scripted>,
    pub sent: Vec<Vec<u8>>,
    pub transceived: Vec<Vec<u8>>,
    pub passive_targets: Vec<TargetDescriptor>,
    pub select_result: i32,
    last_error: i32,
}

impl MockDriver {
    pub fn new() -> MockDriver {
        MockDriver {
            select_result: status::SUCCESS,
            ..Default::default()
        }
    }
}

impl NfcDriver for MockDriver {
    fn connstring(&self) -> &str {
        "mock://driver"
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

    fn initiator_list_passive_targets(&mut self, _modulation: Modulation, out: &mut Vec<TargetDescriptor>) -> i32 {
        out.extend(self.passive_targets.clone());
        out.len() as i32
    }

    fn initiator_select_passive_target(
        &mut self,
        _modulation: Modulation,
        _uid: Option<&[u8]>,
    ) -> (i32, Option<TargetDescriptor>) {
        if self.select_result > 0 {
            (self.select_result, self.passive_targets.first().cloned())
        } else {
            (self.select_result, None)
        }
    }

    fn initiator_transceive_bytes(&mut self, tx: &[u8], _timeout_ms: u32) -> (Vec<u8>, i32) {
        self.transceived.push(tx.to_vec());
        let response = self
            .transceive_script
            .pop_front()
            .unwrap_or_else(|| Scripted::failure(status::ETIMEOUT));
        self.last_error = response.result;
        (response.data, response.result)
    }

    fn target_init(&mut self, descriptor: &TargetDescriptor) -> (i32, TargetDescriptor) {
        (status::SUCCESS, descriptor.clone())
    }

    fn target_receive_bytes(&mut self, _timeout_ms: u32) -> (Vec<u8>, i32) {
        let response = self
            .receive_script
            .pop_front()
            .unwrap_or_else(|| Scripted::failure(status::ETIMEOUT));
        self.last_error = response.result;
        (response.data, response.result)
    }

    fn target_send_bytes(&mut self, tx: &[u8], _timeout_ms: u32) -> i32 {
        self.sent.push(tx.to_vec());
        tx.len() as i32
    }

    fn abort_command(&mut self) -> i32 {
        status::SUCCESS
    }

    fn last_error(&self) -> i32 {
        self.last_error
    }
}
