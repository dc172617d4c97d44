//! Core types and constants for the keyscout key-space search tools.
//!
//! This crate provides the foundational pieces used across all keyscout
//! crates: the 256-bit scalar type with group-order validation, protocol
//! constants, and address parsing/rendering for every dump format the
//! importer understands.

pub mod address;
pub mod constants;
pub mod scalar;

pub use address::{DecodedAddress, ParsedLine};
pub use scalar::Scalar;
