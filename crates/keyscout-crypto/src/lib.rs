//! secp256k1 derivation and hash-160 primitives for keyscout.

pub mod hash;
pub mod pubkey;

pub use hash::hash160;
pub use pubkey::{compress, derive_uncompressed, tag_coordinates, PublicKeyBytes};
