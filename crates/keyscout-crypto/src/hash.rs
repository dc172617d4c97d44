//! hash-160: RIPEMD-160 over SHA-256.

use keyscout_types::constants::HASH160_SIZE;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// RIPEMD-160(SHA-256(data)). This is the hot-path hash; observable results
/// are defined purely by input/output bytes.
#[inline]
pub fn hash160(data: &[u8]) -> [u8; HASH160_SIZE] {
    let sha = Sha256::digest(data);
    let ripe = Ripemd160::digest(sha);
    let mut out = [0u8; HASH160_SIZE];
    out.copy_from_slice(&ripe);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash160_known_pubkeys() {
        // Serializations of the scalar-1 public key.
        let compressed = hex::decode(
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
        )
        .unwrap();
        assert_eq!(
            hex::encode(hash160(&compressed)),
            "751e76e8199196d454941c45d1b3a323f1433bd6"
        );

        let uncompressed = hex::decode(
            "0479be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\
             483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8",
        )
        .unwrap();
        assert_eq!(
            hex::encode(hash160(&uncompressed)),
            "91b24bf9f5288532960ac687abb035127b1d28a5"
        );
    }

    #[test]
    fn test_hash160_is_sha256_then_ripemd() {
        use ripemd::Ripemd160;
        use sha2::Sha256;

        let data = b"keyscout";
        let manual = Ripemd160::digest(Sha256::digest(data));
        assert_eq!(hash160(data), manual.as_slice());
    }
}
