//! Protocol constants shared across the keyscout crates.

/// Size of a hash-160 address hash in bytes.
pub const HASH160_SIZE: usize = 20;

/// Size of a stored amount in bytes (little-endian u64).
pub const AMOUNT_SIZE: usize = 8;

/// Size of a serialized scalar / private key in bytes.
pub const SCALAR_SIZE: usize = 32;

/// Uncompressed public key serialization: 0x04 tag + X + Y.
pub const UNCOMPRESSED_PUBKEY_SIZE: usize = 65;

/// Compressed public key serialization: parity tag + X.
pub const COMPRESSED_PUBKEY_SIZE: usize = 33;

/// Tag byte of an uncompressed public key.
pub const UNCOMPRESSED_TAG: u8 = 0x04;

/// Tag bytes of a compressed public key (even / odd y).
pub const COMPRESSED_TAG_EVEN: u8 = 0x02;
pub const COMPRESSED_TAG_ODD: u8 = 0x03;

/// Bitcoin mainnet P2PKH version byte ('1…' addresses).
pub const P2PKH_VERSION: u8 = 0x00;

/// Bitcoin mainnet WIF version byte.
pub const WIF_VERSION: u8 = 0x80;

/// Human-readable part of mainnet segwit addresses.
pub const SEGWIT_HRP: &str = "bc";

/// Prefix assumed for bare cashaddr payloads ("q…" lines in dumps).
pub const CASHADDR_PREFIX: &str = "bitcoincash";

/// Leading strings that mark forms without a usable hash-160 payload
/// (multi-sig bundles, script hashes, exotic dump notations). Lines starting
/// with any of these are skipped, not treated as parse failures.
pub const UNSUPPORTED_PREFIXES: &[&str] = &["d-", "m-", "s-", "p"];

/// Bech32 human-readable parts of altcoin or non-mainnet networks whose
/// witness programs we never match against.
pub const UNSUPPORTED_BECH32_PREFIXES: &[&str] = &["ltc1", "tb1", "vtc1", "btg1", "doge1"];

/// Header line commonly found at the top of exported dumps.
pub const DUMP_HEADER_LINE: &str = "address";
