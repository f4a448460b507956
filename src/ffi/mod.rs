//! Feature-gated bindings to a native NFC driver library. Nothing outside
//! this module names a native type or function directly (spec §9 "Foreign
//! driver layer" — the core consumes [`crate::driver::NfcDriver`] only).

pub mod libnfc;

pub use libnfc::{LibnfcContext, LibnfcDriver};
