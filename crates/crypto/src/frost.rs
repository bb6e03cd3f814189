// Path: crates/crypto/src/frost.rs

//! The FROST signing equations.
//!
//! No centralised aggregator exists here: every signer derives the binding
//! factors and the group commitment from the broadcast commitment set, and
//! the coordinator contract sums the response scalars on chain.

use crate::error::CryptoError;
use crate::hash::{challenge, hash_to_scalar, DOM_RHO};
use crate::point::{encode_point, generator, Point, Scalar};
use k256::elliptic_curve::Field;
use std::collections::{BTreeMap, BTreeSet};
use sigil_types::ids::ParticipantId;

/// One signer's revealed nonce commitments `(D, E)`.
#[derive(Clone, Copy, Debug)]
pub struct SigningCommitment {
    /// Hiding commitment `D = d·G`.
    pub hiding: Point,
    /// Binding commitment `E = e·G`.
    pub binding: Point,
}

/// The binding factor for `index`:
/// `ρᵢ = H("rho" ‖ group_pub ‖ message ‖ commitment list ‖ i)`.
///
/// The commitment list is absorbed in signer order. A zero digest is mapped
/// to one; the protocol requires `ρᵢ ≠ 0` and the bias is immaterial.
pub fn binding_factor(
    index: ParticipantId,
    group_public: &Point,
    message: &[u8; 32],
    commitments: &BTreeMap<ParticipantId, SigningCommitment>,
) -> Scalar {
    let mut parts: Vec<Vec<u8>> = Vec::with_capacity(3 + commitments.len() * 3);
    parts.push(DOM_RHO.to_vec());
    parts.push(encode_point(group_public).as_slice().to_vec());
    parts.push(message.to_vec());
    for (id, commitment) in commitments {
        parts.push(id.to_be_bytes().to_vec());
        parts.push(encode_point(&commitment.hiding).as_slice().to_vec());
        parts.push(encode_point(&commitment.binding).as_slice().to_vec());
    }
    parts.push(index.to_be_bytes().to_vec());

    let borrowed: Vec<&[u8]> = parts.iter().map(Vec::as_slice).collect();
    let rho = hash_to_scalar(&borrowed);
    if bool::from(rho.is_zero()) {
        Scalar::ONE
    } else {
        rho
    }
}

/// Every signer's bound commitment `Rᵢ = Dᵢ + ρᵢ·Eᵢ` and their sum, the
/// group commitment `R`.
pub fn group_commitment(
    group_public: &Point,
    message: &[u8; 32],
    commitments: &BTreeMap<ParticipantId, SigningCommitment>,
) -> (BTreeMap<ParticipantId, Point>, Point) {
    let bound: BTreeMap<ParticipantId, Point> = commitments
        .iter()
        .map(|(id, c)| {
            let rho = binding_factor(*id, group_public, message, commitments);
            (*id, c.hiding + c.binding * rho)
        })
        .collect();
    let sum = bound.values().fold(Point::IDENTITY, |acc, r| acc + r);
    (bound, sum)
}

/// The Lagrange coefficient for `signer_index` over `all_signer_indices`
/// evaluated at zero.
pub fn lagrange_coefficient(
    signer_index: ParticipantId,
    all_signer_indices: &BTreeSet<ParticipantId>,
) -> Result<Scalar, CryptoError> {
    let mut num = Scalar::ONE;
    let mut den = Scalar::ONE;

    let x_i = Scalar::from(u64::from(signer_index));
    for j in all_signer_indices {
        if *j == signer_index {
            continue;
        }
        let x_j = Scalar::from(u64::from(*j));
        num *= x_j;
        den *= x_j - x_i;
    }

    let inverse = Option::<Scalar>::from(den.invert()).ok_or(CryptoError::DegenerateSignerSet)?;
    Ok(num * inverse)
}

/// Inputs to one signature share.
pub struct ShareInput<'a> {
    /// The group public key.
    pub group_public: &'a Point,
    /// The digest under signature.
    pub message: &'a [u8; 32],
    /// Every signer's revealed commitments.
    pub commitments: &'a BTreeMap<ParticipantId, SigningCommitment>,
    /// This signer's index.
    pub own_index: ParticipantId,
    /// This signer's secret nonces `(d, e)` from the burned leaf.
    pub hiding_nonce: Scalar,
    /// See `hiding_nonce`.
    pub binding_nonce: Scalar,
    /// This signer's long-lived secret signing share.
    pub signing_share: &'a Scalar,
}

/// A computed signature share and the public values needed to publish it.
pub struct ShareOutput {
    /// The response scalar `zᵢ = dᵢ + ρᵢ·eᵢ + λᵢ·c·sᵢ`.
    pub share: Scalar,
    /// This signer's bound commitment `Rᵢ`.
    pub commitment_share: Point,
    /// The group commitment `R`.
    pub group_commitment: Point,
    /// The Lagrange coefficient `λᵢ` used.
    pub lagrange: Scalar,
    /// The challenge `c` the share answers.
    pub challenge: Scalar,
}

/// Computes this signer's signature share.
pub fn create_share(input: &ShareInput<'_>) -> Result<ShareOutput, CryptoError> {
    let signer_set: BTreeSet<ParticipantId> = input.commitments.keys().copied().collect();
    let (bound, group_r) =
        group_commitment(input.group_public, input.message, input.commitments);
    let commitment_share = bound
        .get(&input.own_index)
        .copied()
        .ok_or(CryptoError::DegenerateSignerSet)?;

    let rho = binding_factor(input.own_index, input.group_public, input.message, input.commitments);
    let lambda = lagrange_coefficient(input.own_index, &signer_set)?;
    let c = challenge(&group_r, input.group_public, input.message);

    let share =
        input.hiding_nonce + rho * input.binding_nonce + lambda * c * input.signing_share;

    Ok(ShareOutput { share, commitment_share, group_commitment: group_r, lagrange: lambda, challenge: c })
}

/// The share validity equation every peer (and we ourselves, before
/// publishing) can check: `zᵢ·G == Rᵢ + λᵢ·c·Yᵢ`.
pub fn verify_share(
    share: &Scalar,
    commitment_share: &Point,
    lagrange: &Scalar,
    challenge: &Scalar,
    verification_share: &Point,
) -> bool {
    generator() * share == *commitment_share + *verification_share * (*lagrange * challenge)
}

/// Sums response scalars into the final signature scalar and checks it
/// against the group key: `z·G == R + c·Y`.
pub fn aggregate(
    shares: impl Iterator<Item = Scalar>,
    group_commitment: &Point,
    group_public: &Point,
    message: &[u8; 32],
) -> (Scalar, bool) {
    let z = shares.fold(Scalar::ZERO, |acc, s| acc + s);
    let c = challenge(group_commitment, group_public, message);
    let valid = generator() * z == *group_commitment + *group_public * c;
    (z, valid)
}
