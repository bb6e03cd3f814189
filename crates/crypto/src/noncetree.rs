// Path: crates/crypto/src/noncetree.rs

//! Pre-committed batches of one-time signing nonces.
//!
//! A nonce tree holds `2^k` leaves, each a pair of secret nonces `(d, e)`
//! with their public commitments `(D, E)`. The tree's Merkle root is
//! committed on chain before any leaf is used; a leaf's Merkle proof later
//! accompanies the reveal. Each leaf is consumed (burned) exactly once.

use crate::error::CryptoError;
use crate::hash::{keccak, DOM_NONCE_LEAF};
use crate::merkle;
use crate::point::{encode_point, encode_scalar, generator, Scalar};
use alloy_primitives::B256;
use k256::elliptic_curve::Field;
use rand::{CryptoRng, RngCore};
use sigil_types::ids::{CompressedPoint, MerkleProof, ScalarBytes};

/// One freshly generated leaf, secrets included.
#[derive(Clone)]
pub struct GeneratedLeaf {
    /// Secret hiding nonce `d`.
    pub hiding_nonce: ScalarBytes,
    /// Public hiding commitment `D = d·G`.
    pub hiding_commitment: CompressedPoint,
    /// Secret binding nonce `e`.
    pub binding_nonce: ScalarBytes,
    /// Public binding commitment `E = e·G`.
    pub binding_commitment: CompressedPoint,
}

/// The hash of one nonce leaf: `H(tag ‖ D ‖ E)`. Only the public
/// commitments are committed to.
pub fn leaf_hash(hiding: &CompressedPoint, binding: &CompressedPoint) -> [u8; 32] {
    keccak(&[DOM_NONCE_LEAF, hiding.as_slice(), binding.as_slice()])
}

/// Samples a full tree of `size` leaves. `size` must be a power of two.
pub fn generate_leaves<R: RngCore + CryptoRng>(
    rng: &mut R,
    size: u32,
) -> Result<Vec<GeneratedLeaf>, CryptoError> {
    if size == 0 || !size.is_power_of_two() {
        return Err(CryptoError::NotPowerOfTwo(size));
    }
    Ok((0..size)
        .map(|_| {
            let d = Scalar::random(&mut *rng);
            let e = Scalar::random(&mut *rng);
            GeneratedLeaf {
                hiding_nonce: encode_scalar(&d),
                hiding_commitment: encode_point(&(generator() * d)),
                binding_nonce: encode_scalar(&e),
                binding_commitment: encode_point(&(generator() * e)),
            }
        })
        .collect())
}

/// The Merkle root over a leaf set.
pub fn tree_root(leaves: &[GeneratedLeaf]) -> B256 {
    let hashes: Vec<[u8; 32]> = leaves
        .iter()
        .map(|l| leaf_hash(&l.hiding_commitment, &l.binding_commitment))
        .collect();
    merkle::root(&hashes)
}

/// A membership proof for the leaf at `offset`, computed over the public
/// commitment hashes.
pub fn prove_leaf(
    commitments: &[(CompressedPoint, CompressedPoint)],
    offset: u32,
) -> Result<MerkleProof, CryptoError> {
    let hashes: Vec<[u8; 32]> = commitments.iter().map(|(d, e)| leaf_hash(d, e)).collect();
    merkle::prove(&hashes, offset)
}
