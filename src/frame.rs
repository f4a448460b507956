//! Frame record and direction enum (spec §3).

use serde::{Deserialize, Serialize};

/// Where a frame was observed. FromReader/ToReader face the physical
/// reader (Target endpoint); ToCard/FromCard face the physical card
/// (Initiator endpoint). The same payload usually appears twice in the
/// log — once per endpoint — so loss or mutation between the two halves
/// is visible in the saved log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameDirection {
    FromReader,
    ToCard,
    FromCard,
    ToReader,
}

/// An immutable, timestamped record of one physical transfer.
///
/// Invariants (spec §3): `data` may only be empty when `result <= 0`;
/// `easy_framing == false` implies the first byte of a non-empty `data` is
/// a PCB. `index` is non-decreasing along a [`crate::frame_log::FrameLog`]
/// but is not unique — ingress, egress-to-card, and egress-to-reader of
/// one half-turn share an index before it increments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub index: u64,
    /// Monotonic seconds since session start.
    pub time: f64,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    pub result: i32,
    pub direction: FrameDirection,
    pub easy_framing: bool,
}

impl Frame {
    pub fn new(
        index: u64,
        time: f64,
        data: Vec<u8>,
        result: i32,
        direction: FrameDirection,
        easy_framing: bool,
    ) -> Frame {
        Frame {
            index,
            time,
            data,
            result,
            direction,
            easy_framing,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.result <= 0
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
