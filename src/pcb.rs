//! Typed view of the ISO 14443-4 Protocol Control Byte (spec §3, §4.1).
//!
//! Bits 7-8 tag the block type: `00` I-block, `10` R-block, `11` S-block,
//! `01` reserved. Decoding never fails — malformed bytes round-trip as
//! [`Pcb::Reserved`] or as an I/R/S-block carrying whatever garbage bits
//! the wire handed us; callers that need the well-formed bit constants use
//! [`Pcb::encode`] and the `Iblock`/`Rblock`/`Sblock` constructors instead
//! of hand-assembling bytes.

/// Block number, alternating 0/1 across a chained transfer (spec §4.6.1,
/// law 5 in spec §8).
pub type BlockNumber = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pcb {
    IBlock {
        block_number: BlockNumber,
        has_nad: bool,
        has_cid: bool,
        chaining: bool,
    },
    RBlock {
        block_number: BlockNumber,
        has_cid: bool,
        nak: bool,
    },
    SBlock {
        has_cid: bool,
        /// 2-bit DESELECT/WTX field (bits 5-6); `0b00` = DESELECT.
        function: u8,
    },
    /// Bits 7-8 == `01`, reserved for future use. Decoded, not produced.
    Reserved(u8),
}

impl Pcb {
    /// Decode a raw PCB byte. Total, never fails (spec §4.1).
    pub fn decode(byte: u8) -> Pcb {
        match byte >> 6 {
            0b00 => Pcb::IBlock {
                block_number: byte & 0x01,
                has_nad: byte & 0x04 != 0,
                has_cid: byte & 0x08 != 0,
                chaining: byte & 0x10 != 0,
            },
            0b10 => Pcb::RBlock {
                block_number: byte & 0x01,
                has_cid: byte & 0x08 != 0,
                nak: byte & 0x10 != 0,
            },
            0b11 => Pcb::SBlock {
                has_cid: byte & 0x08 != 0,
                function: (byte >> 4) & 0x03,
            },
            _ => Pcb::Reserved(byte),
        }
    }

    /// Encode back to a raw byte. `encode(decode(b)) == b` for all `b`
    /// (spec §8 law 1); the fixed bits (I-block bit 1, R-block bits 1/2/5,
    /// S-block bit 2) are written as constants here rather than trusted
    /// from input, so a `Reserved` byte is the only way a decode can carry
    /// forward non-canonical bits.
    pub fn encode(self) -> u8 {
        match self {
            Pcb::IBlock {
                block_number,
                has_nad,
                has_cid,
                chaining,
            } => {
                let mut b = 0b0000_0010; // bit 1 constant 1, bits 7-8 = 00
                b |= block_number & 0x01;
                b |= (has_nad as u8) << 2;
                b |= (has_cid as u8) << 3;
                b |= (chaining as u8) << 4;
                b
            }
            Pcb::RBlock {
                block_number,
                has_cid,
                nak,
            } => {
                let mut b = 0b1010_0010; // bits 7-8 = 10, bit 2 = 0 (implicit), bit 1 = 1, bit 5 = 1
                b |= block_number & 0x01;
                b |= (has_cid as u8) << 3;
                b |= (nak as u8) << 4;
                b
            }
            Pcb::SBlock { has_cid, function } => {
                let mut b = 0b1100_0010; // bits 7-8 = 11, bit 2 = 1
                b |= (has_cid as u8) << 3;
                b |= (function & 0x03) << 4;
                b
            }
            Pcb::Reserved(byte) => byte,
        }
    }

    /// Flip the block-number bit in place (spec §4.1 `toggle_block_number`).
    /// No-op for S-blocks and `Reserved`, which carry no block number.
    pub fn toggle_block_number(self) -> Pcb {
        match self {
            Pcb::IBlock {
                block_number,
                has_nad,
                has_cid,
                chaining,
            } => Pcb::IBlock {
                block_number: block_number ^ 1,
                has_nad,
                has_cid,
                chaining,
            },
            Pcb::RBlock {
                block_number,
                has_cid,
                nak,
            } => Pcb::RBlock {
                block_number: block_number ^ 1,
                has_cid,
                nak,
            },
            other => other,
        }
    }

    /// Set (or clear) the chaining bit of an I-block (spec §4.1
    /// `set_chaining`). No-op on every other variant.
    pub fn set_chaining(self, chaining: bool) -> Pcb {
        match self {
            Pcb::IBlock {
                block_number,
                has_nad,
                has_cid,
                ..
            } => Pcb::IBlock {
                block_number,
                has_nad,
                has_cid,
                chaining,
            },
            other => other,
        }
    }

    pub fn is_chaining(self) -> bool {
        matches!(self, Pcb::IBlock { chaining: true, .. })
    }

    pub fn block_number(self) -> Option<BlockNumber> {
        match self {
            Pcb::IBlock { block_number, .. } | Pcb::RBlock { block_number, .. } => {
                Some(block_number)
            }
            _ => None,
        }
    }

    /// The initial I-block PCB for a chained send: chaining=1, NAD/CID
    /// unset. Block number is 1 so that the first `toggle_block_number`
    /// (spec §4.6.1 step 1) yields block number 0 on the wire — the
    /// starting parity itself is left unspecified by spec §9 open
    /// question 3, so either parity is acceptable to callers.
    pub fn initial_chaining_iblock() -> Pcb {
        Pcb::IBlock {
            block_number: 1,
            has_nad: false,
            has_cid: false,
            chaining: true,
        }
    }

    /// R(ACK) template used during both chained send (waiting for the
    /// reader's ACK) and chained receive (acknowledging each but the last
    /// chunk). Matches `ISO14443_PCB(asbyte=0xA3)` in the Python
    /// prototype.
    pub fn ack_template() -> Pcb {
        Pcb::decode(0xA3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_all_bytes() {
        for byte in 0u8..=255 {
            assert_eq!(Pcb::decode(byte).encode(), byte, "byte {byte:#04x}");
        }
    }

    #[test]
    fn chaining_bit_is_only_difference() {
        let on = Pcb::IBlock {
            block_number: 0,
            has_nad: false,
            has_cid: false,
            chaining: true,
        }
        .encode();
        let off = Pcb::IBlock {
            block_number: 0,
            has_nad: false,
            has_cid: false,
            chaining: false,
        }
        .encode();
        assert_eq!(on ^ off, 0x10);
    }

    #[test]
    fn decodes_block_types_by_tag_bits() {
        assert!(matches!(Pcb::decode(0x02), Pcb::IBlock { .. }));
        assert!(matches!(Pcb::decode(0x42), Pcb::Reserved(_)));
        assert!(matches!(Pcb::decode(0xA2), Pcb::RBlock { .. }));
        assert!(matches!(Pcb::decode(0xC2), Pcb::SBlock { .. }));
    }

    #[test]
    fn toggle_block_number_alternates() {
        let mut pcb = Pcb::initial_chaining_iblock();
        let mut seen = Vec::new();
        for _ in 0..4 {
            pcb = pcb.toggle_block_number();
            seen.push(pcb.block_number().unwrap());
        }
        assert_eq!(seen, vec![0, 1, 0, 1]);
    }

    #[test]
    fn ack_template_is_rblock() {
        assert!(matches!(Pcb::ack_template(), Pcb::RBlock { .. }));
        assert_eq!(Pcb::ack_template().encode(), 0xA3);
    }

    #[test]
    fn malformed_bytes_are_surfaced_not_rejected() {
        // Reserved space still round-trips even though it is not a real block type.
        let pcb = Pcb::decode(0b0111_1111);
        assert!(matches!(pcb, Pcb::Reserved(0b0111_1111)));
    }
}
