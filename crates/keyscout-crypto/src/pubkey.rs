//! Public-key derivation and serialization.
//!
//! All pipeline stages pass public keys around as the 65-byte tagged
//! uncompressed serialization; the compressed form is recovered from it on
//! the host by copying x and reading the parity of y, which is bit-identical
//! to deriving it from the scalar and much cheaper than a second curve
//! operation.

use keyscout_types::constants::{
    COMPRESSED_PUBKEY_SIZE, COMPRESSED_TAG_EVEN, COMPRESSED_TAG_ODD, UNCOMPRESSED_PUBKEY_SIZE,
    UNCOMPRESSED_TAG,
};
use keyscout_types::Scalar;
use secp256k1::{All, PublicKey, Secp256k1, SecretKey};

/// Tagged uncompressed serialization: 0x04 | X | Y.
pub type PublicKeyBytes = [u8; UNCOMPRESSED_PUBKEY_SIZE];

/// Derive the uncompressed public key of a scalar. The scalar must already
/// be normalized into [1, n-1]; the key sources guarantee that.
#[inline]
pub fn derive_uncompressed(secp: &Secp256k1<All>, scalar: &Scalar) -> PublicKeyBytes {
    let sk = SecretKey::from_slice(scalar.as_bytes())
        .expect("normalized scalars are valid secret keys");
    PublicKey::from_secret_key(secp, &sk).serialize_uncompressed()
}

/// Compress an uncompressed serialization: copy x, tag from the parity of
/// the last byte of y.
#[inline]
pub fn compress(uncompressed: &PublicKeyBytes) -> [u8; COMPRESSED_PUBKEY_SIZE] {
    debug_assert_eq!(uncompressed[0], UNCOMPRESSED_TAG);
    let mut out = [0u8; COMPRESSED_PUBKEY_SIZE];
    out[0] = if uncompressed[UNCOMPRESSED_PUBKEY_SIZE - 1] & 1 == 0 {
        COMPRESSED_TAG_EVEN
    } else {
        COMPRESSED_TAG_ODD
    };
    out[1..].copy_from_slice(&uncompressed[1..33]);
    out
}

/// Re-tag a raw 64-byte x||y coordinate pair into the uncompressed
/// serialization. This is the host-side read-back step for device batches.
#[inline]
pub fn tag_coordinates(xy: &[u8]) -> PublicKeyBytes {
    debug_assert_eq!(xy.len(), UNCOMPRESSED_PUBKEY_SIZE - 1);
    let mut out = [0u8; UNCOMPRESSED_PUBKEY_SIZE];
    out[0] = UNCOMPRESSED_TAG;
    out[1..].copy_from_slice(xy);
    out
}
