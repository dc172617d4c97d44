//! Batch derivation: a base scalar plus a grid width into 2^g public keys.
//!
//! The CPU back-end is both a production back-end and the reference that
//! every GPU back-end is checked against before it may emit real batches.

use keyscout_crypto::pubkey::{derive_uncompressed, PublicKeyBytes};
use keyscout_types::Scalar;
use log::{error, info};
use secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

/// Largest permitted grid width: 2^24 × 64-byte coordinate pairs is a 1 GiB
/// output buffer, comfortably inside 32-bit indexing on every device.
pub const MAX_GRID_BITS: u32 = 24;

#[derive(Debug, Error)]
pub enum DeriveError {
    #[error("grid width {0} exceeds the maximum of {MAX_GRID_BITS} bits")]
    GridTooWide(u32),

    #[error("self-test mismatch for base scalar {base} at work item {index}")]
    SelfTest { base: Scalar, index: usize },

    #[error("device error: {0}")]
    Device(String),
}

/// How a batch's scalars are defined.
enum BatchScalars {
    /// The dense grid base..base+2^bits.
    Grid { base: Scalar },
    /// Explicitly listed scalars (single-key producers).
    List(Vec<Scalar>),
}

/// A complete derivation result: scalars and their uncompressed public
/// keys, index-aligned. Batches are produced atomically; a failed
/// derivation yields an error, never a partial batch.
pub struct Batch {
    scalars: BatchScalars,
    points: Vec<PublicKeyBytes>,
}

impl Batch {
    pub fn grid(base: Scalar, points: Vec<PublicKeyBytes>) -> Self {
        Self {
            scalars: BatchScalars::Grid { base },
            points,
        }
    }

    pub fn list(scalars: Vec<Scalar>, points: Vec<PublicKeyBytes>) -> Self {
        debug_assert_eq!(scalars.len(), points.len());
        Self {
            scalars: BatchScalars::List(scalars),
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The (normalized) scalar behind slot `i`. For grid batches this
    /// reapplies the substitution rule, so hit records carry the same
    /// scalar the derivation used.
    pub fn scalar_at(&self, i: usize) -> Scalar {
        match &self.scalars {
            BatchScalars::Grid { base } => base
                .add_u64(i as u64)
                .map(Scalar::normalized)
                .unwrap_or(Scalar::SUBSTITUTE),
            BatchScalars::List(scalars) => scalars[i],
        }
    }

    pub fn point_at(&self, i: usize) -> &PublicKeyBytes {
        &self.points[i]
    }

    pub fn points(&self) -> &[PublicKeyBytes] {
        &self.points
    }
}

/// A derivation back-end. One instance per producer; GPU back-ends own an
/// exclusive device context, so the trait only needs `Send`.
pub trait DerivationBackend: Send {
    fn name(&self) -> &str;

    /// Derive the full grid batch for `base`. Either a complete batch or an
    /// error; partial batches are never surfaced.
    fn derive_batch(&mut self, base: Scalar, bits: u32) -> Result<Batch, DeriveError>;
}

/// Pure-CPU back-end. Walks the grid with one point addition of G per
/// step instead of a full scalar multiplication; the chain restarts after
/// any substituted slot so results stay bit-identical to independent
/// multiplications.
pub struct CpuBackend {
    secp: Secp256k1<All>,
    substitute_point: PublicKeyBytes,
}

impl CpuBackend {
    pub fn new() -> Self {
        let secp = Secp256k1::new();
        let substitute_point = derive_uncompressed(&secp, &Scalar::SUBSTITUTE);
        Self {
            secp,
            substitute_point,
        }
    }

    fn full_multiply(&self, scalar: &Scalar) -> Option<PublicKey> {
        let sk = SecretKey::from_slice(scalar.as_bytes()).ok()?;
        Some(PublicKey::from_secret_key(&self.secp, &sk))
    }

    /// Derive each listed scalar independently (single-key producers).
    pub fn derive_each(&self, scalars: Vec<Scalar>) -> Batch {
        let points = scalars
            .iter()
            .map(|scalar| match self.full_multiply(scalar) {
                Some(pk) => pk.serialize_uncompressed(),
                None => self.substitute_point,
            })
            .collect();
        Batch::list(scalars, points)
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DerivationBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn derive_batch(&mut self, base: Scalar, bits: u32) -> Result<Batch, DeriveError> {
        if bits > MAX_GRID_BITS {
            return Err(DeriveError::GridTooWide(bits));
        }
        let count = 1usize << bits;
        let mut points = Vec::with_capacity(count);

        // The running point for scalar base+i, advanced by adding G.
        let mut chain: Option<PublicKey> = None;
        for i in 0..count {
            let scalar = base.add_u64(i as u64).filter(Scalar::is_valid);
            match scalar {
                Some(s) => {
                    let pk = match chain {
                        Some(prev) => prev
                            .add_exp_tweak(&self.secp, &secp256k1::Scalar::ONE)
                            .ok()
                            .or_else(|| self.full_multiply(&s)),
                        None => self.full_multiply(&s),
                    };
                    match pk {
                        Some(pk) => {
                            points.push(pk.serialize_uncompressed());
                            chain = Some(pk);
                        }
                        None => {
                            // Unreachable for validated scalars, but a
                            // substituted slot is strictly better than a
                            // ragged batch.
                            points.push(self.substitute_point);
                            chain = None;
                        }
                    }
                }
                None => {
                    points.push(self.substitute_point);
                    chain = None;
                }
            }
        }
        Ok(Batch::grid(base, points))
    }
}

/// Base scalars exercised by the self-test. Small values, a mid-range
/// value, and a base within 8 of the group order so the device's
/// substitution path is covered too.
fn self_test_bases() -> Vec<Scalar> {
    let order_minus_8 = {
        let mut bytes = keyscout_types::scalar::CURVE_ORDER;
        bytes[31] -= 8;
        Scalar::from_bytes(bytes)
    };
    vec![
        Scalar::from_u64(1),
        Scalar::from_u64(2),
        Scalar::from_u64(0xFFFF_FFFF),
        Scalar::from_hex("c0ffee00c0ffee00c0ffee00c0ffee00c0ffee00c0ffee00c0ffee00c0ffee00")
            .expect("fixed self-test constant"),
        order_minus_8,
    ]
}

/// Grid width used for the self-test batches.
const SELF_TEST_BITS: u32 = 4;

/// Built-in self-test: derive the fixed base set on both back-ends and
/// compare every byte of every coordinate. A mismatch makes the candidate
/// back-end unusable for the process lifetime.
pub fn self_test(
    candidate: &mut dyn DerivationBackend,
    reference: &mut CpuBackend,
) -> Result<(), DeriveError> {
    for base in self_test_bases() {
        let expected = reference.derive_batch(base, SELF_TEST_BITS)?;
        let actual = candidate.derive_batch(base, SELF_TEST_BITS)?;
        if actual.len() != expected.len() {
            error!(
                "self-test: {} returned {} points, expected {}",
                candidate.name(),
                actual.len(),
                expected.len()
            );
            return Err(DeriveError::SelfTest { base, index: 0 });
        }
        for i in 0..expected.len() {
            if actual.point_at(i) != expected.point_at(i) {
                error!(
                    "self-test: {} disagrees with cpu at base {} item {}",
                    candidate.name(),
                    base,
                    i
                );
                return Err(DeriveError::SelfTest { base, index: i });
            }
        }
    }
    info!("self-test passed for back-end {}", candidate.name());
    Ok(())
}
