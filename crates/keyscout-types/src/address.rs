//! Address parsing for importer dumps, and base-58 rendering for hits.
//!
//! Public dumps mix several address families in one file: legacy base-58
//! (any single-byte version), ZCash two-byte versions, segwit bech32, and
//! bare cashaddr payloads. Every family funnels down to the 20-byte
//! hash-160. When the strict checksum parser rejects a base-58 line, the
//! unchecked path decodes the body anyway and extracts the hash bytes by
//! fixed offset so that corrupt lines in public dumps are still salvaged;
//! callers surface those through the `unchecked` flag.

use crate::constants::{
    CASHADDR_PREFIX, DUMP_HEADER_LINE, HASH160_SIZE, P2PKH_VERSION, SEGWIT_HRP,
    UNSUPPORTED_BECH32_PREFIXES, UNSUPPORTED_PREFIXES, WIF_VERSION,
};
use crate::scalar::Scalar;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("base58 decode error: {0}")]
    Base58(String),

    #[error("decoded base58 too short for a hash-160 payload ({0} bytes)")]
    Base58TooShort(usize),

    #[error("bech32 decode error: {0}")]
    Bech32(String),

    #[error("cashaddr decode error: {0}")]
    Cashaddr(String),

    #[error("invalid WIF payload length {0}")]
    WifLength(usize),

    #[error("invalid WIF version byte 0x{0:02x}")]
    WifVersion(u8),

    #[error("invalid amount column: {0}")]
    BadAmount(String),
}

/// A 20-byte hash-160 extracted from a dump line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedAddress {
    pub hash: [u8; HASH160_SIZE],
    /// True when the strict checksum parser rejected the line and the hash
    /// was salvaged by the unchecked fixed-offset path.
    pub unchecked: bool,
}

/// Outcome of parsing one importer line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// A usable address hash plus the amount column (0 when absent).
    Entry { address: DecodedAddress, amount: u64 },
    /// Blank line, comment, or the `address` header.
    Ignored,
    /// A recognized form that carries no hash-160 payload.
    Unsupported,
}

/// Parse a single line of an importer dump per the text-file contract:
/// optional tab- or comma-separated amount, `#` comments, blank lines and
/// the literal `address` header ignored.
pub fn parse_dump_line(line: &str) -> Result<ParsedLine, AddressError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line == DUMP_HEADER_LINE {
        return Ok(ParsedLine::Ignored);
    }

    let (address_part, amount_part) = match line.split_once(['\t', ',']) {
        Some((a, rest)) => (a.trim(), Some(rest.trim())),
        None => (line, None),
    };

    let amount = match amount_part {
        Some(a) if !a.is_empty() => a
            .parse::<u64>()
            .map_err(|_| AddressError::BadAmount(a.to_string()))?,
        _ => 0,
    };

    match decode_address(address_part)? {
        Some(address) => Ok(ParsedLine::Entry { address, amount }),
        None => Ok(ParsedLine::Unsupported),
    }
}

/// Decode one address string to its hash-160. `Ok(None)` means the form is
/// recognized but carries no 20-byte hash (skipped, not an error).
pub fn decode_address(address: &str) -> Result<Option<DecodedAddress>, AddressError> {
    for prefix in UNSUPPORTED_BECH32_PREFIXES {
        if address.starts_with(prefix) {
            return Ok(None);
        }
    }
    if address.starts_with("bc1") {
        return decode_segwit(address);
    }
    for prefix in UNSUPPORTED_PREFIXES {
        if address.starts_with(prefix) {
            return Ok(None);
        }
    }
    if address.starts_with('q') {
        return decode_cashaddr(address).map(Some);
    }
    if address.starts_with('t') {
        // ZCash transparent addresses carry a two-byte version prefix.
        return decode_base58(address, 2).map(Some);
    }
    decode_base58(address, 1).map(Some)
}

/// Render a hash-160 as a mainnet P2PKH base-58 address.
pub fn render_p2pkh(hash: &[u8; HASH160_SIZE]) -> String {
    let mut payload = [0u8; 1 + HASH160_SIZE];
    payload[0] = P2PKH_VERSION;
    payload[1..].copy_from_slice(hash);
    bs58::encode(payload).with_check().into_string()
}

/// Decode a WIF-encoded private key to its scalar.
pub fn decode_wif(wif: &str) -> Result<Scalar, AddressError> {
    let payload = bs58::decode(wif.trim())
        .with_check(None)
        .into_vec()
        .map_err(|e| AddressError::Base58(e.to_string()))?;
    // 33 bytes plain, 34 with the trailing compressed-pubkey marker.
    if payload.len() != 33 && payload.len() != 34 {
        return Err(AddressError::WifLength(payload.len()));
    }
    if payload[0] != WIF_VERSION {
        return Err(AddressError::WifVersion(payload[0]));
    }
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&payload[1..33]);
    Ok(Scalar::from_bytes(bytes))
}

fn decode_base58(
    address: &str,
    version_bytes: usize,
) -> Result<DecodedAddress, AddressError> {
    match bs58::decode(address).with_check(None).into_vec() {
        Ok(payload) if payload.len() >= version_bytes + HASH160_SIZE => {
            let mut hash = [0u8; HASH160_SIZE];
            hash.copy_from_slice(&payload[version_bytes..version_bytes + HASH160_SIZE]);
            Ok(DecodedAddress {
                hash,
                unchecked: false,
            })
        }
        // Checksum passed but the payload is too short to hold a hash;
        // fall through to the unchecked path like any other reject.
        _ => decode_base58_unchecked(address, version_bytes),
    }
}

/// The salvage path: ignore the 4-byte checksum entirely and take the hash
/// bytes at [version_bytes .. version_bytes + 20).
fn decode_base58_unchecked(
    address: &str,
    version_bytes: usize,
) -> Result<DecodedAddress, AddressError> {
    let raw = bs58::decode(address)
        .into_vec()
        .map_err(|e| AddressError::Base58(e.to_string()))?;
    if raw.len() < version_bytes + HASH160_SIZE {
        return Err(AddressError::Base58TooShort(raw.len()));
    }
    let mut hash = [0u8; HASH160_SIZE];
    hash.copy_from_slice(&raw[version_bytes..version_bytes + HASH160_SIZE]);
    Ok(DecodedAddress {
        hash,
        unchecked: true,
    })
}

fn decode_segwit(address: &str) -> Result<Option<DecodedAddress>, AddressError> {
    let (hrp, version, program) =
        bech32::segwit::decode(address).map_err(|e| AddressError::Bech32(e.to_string()))?;
    if hrp.as_str() != SEGWIT_HRP {
        return Ok(None);
    }
    // Only v0 20-byte programs are hash-160s; 32-byte witness scripts and
    // later versions have nothing for us to match.
    if version.to_u8() != 0 || program.len() != HASH160_SIZE {
        return Ok(None);
    }
    let mut hash = [0u8; HASH160_SIZE];
    hash.copy_from_slice(&program);
    Ok(Some(DecodedAddress {
        hash,
        unchecked: false,
    }))
}

// --- cashaddr ---------------------------------------------------------

const CASHADDR_CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

fn cashaddr_charset_rev(c: u8) -> Option<u8> {
    CASHADDR_CHARSET.iter().position(|&x| x == c).map(|i| i as u8)
}

fn cashaddr_polymod(values: &[u8]) -> u64 {
    let mut c: u64 = 1;
    for &d in values {
        let c0 = (c >> 35) as u8;
        c = ((c & 0x07_FFFF_FFFF) << 5) ^ d as u64;
        if c0 & 0x01 != 0 {
            c ^= 0x98_F2BC_8E61;
        }
        if c0 & 0x02 != 0 {
            c ^= 0x79_B76D_99E2;
        }
        if c0 & 0x04 != 0 {
            c ^= 0xF3_3E5F_B3C4;
        }
        if c0 & 0x08 != 0 {
            c ^= 0xAE_2EAB_E2A8;
        }
        if c0 & 0x10 != 0 {
            c ^= 0x1E_4F43_E470;
        }
    }
    c ^ 1
}

/// Decode a bare cashaddr payload ("q…", prefix stripped) to its legacy
/// hash-160. The checksum is verified against the canonical
/// `bitcoincash` prefix.
fn decode_cashaddr(payload: &str) -> Result<DecodedAddress, AddressError> {
    let mut values = Vec::with_capacity(CASHADDR_PREFIX.len() + 1 + payload.len());
    for b in CASHADDR_PREFIX.bytes() {
        values.push(b & 0x1F);
    }
    values.push(0);

    let mut data = Vec::with_capacity(payload.len());
    for b in payload.bytes() {
        let v = cashaddr_charset_rev(b.to_ascii_lowercase())
            .ok_or_else(|| AddressError::Cashaddr(format!("invalid character '{}'", b as char)))?;
        data.push(v);
    }
    if data.len() < 9 {
        return Err(AddressError::Cashaddr("payload too short".to_string()));
    }
    values.extend_from_slice(&data);

    if cashaddr_polymod(&values) != 0 {
        return Err(AddressError::Cashaddr("checksum mismatch".to_string()));
    }

    // Strip the 8-character (40-bit) checksum, regroup 5-bit to 8-bit.
    let decoded = convert_bits_5_to_8(&data[..data.len() - 8])?;
    if decoded.len() != 1 + HASH160_SIZE {
        return Err(AddressError::Cashaddr(format!(
            "unexpected payload length {}",
            decoded.len()
        )));
    }
    // Version byte: bits 6-3 are the type (0 = P2PKH), bits 2-0 the size.
    let kind = (decoded[0] >> 3) & 0x0F;
    if kind != 0 {
        return Err(AddressError::Cashaddr(format!("unsupported type {}", kind)));
    }

    let mut hash = [0u8; HASH160_SIZE];
    hash.copy_from_slice(&decoded[1..]);
    Ok(DecodedAddress {
        hash,
        unchecked: false,
    })
}

fn convert_bits_5_to_8(data: &[u8]) -> Result<Vec<u8>, AddressError> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut out = Vec::with_capacity(data.len() * 5 / 8);
    for &v in data {
        acc = (acc << 5) | v as u32;
        bits += 5;
        while bits >= 8 {
            bits -= 8;
            out.push(((acc >> bits) & 0xFF) as u8);
        }
    }
    if bits >= 5 || (acc & ((1 << bits) - 1)) != 0 {
        return Err(AddressError::Cashaddr("invalid padding".to_string()));
    }
    Ok(out)
}
