// Path: crates/crypto/src/vss.rs

//! Verifiable secret sharing for distributed key generation.
//!
//! Each participant shares a random secret through a Shamir polynomial of
//! degree `threshold - 1`, commits to every coefficient, and proves knowledge
//! of the constant term with a Schnorr signature. Shares are checked against
//! the committed polynomial: `share·G == Σ idʲ·cⱼ`.

use crate::error::CryptoError;
use crate::hash::{hash_to_scalar, DOM_POK};
use crate::point::{decode_point, decode_scalar, encode_point, encode_scalar, generator, Point, Scalar};
use k256::elliptic_curve::Field;
use rand::{CryptoRng, RngCore};
use sigil_types::ids::{CompressedPoint, ParticipantId, SchnorrPok};

/// Evaluates `f(x) = c₀ + c₁x + … + cₜ₋₁xᵗ⁻¹` at `x = index` by Horner's
/// rule, over scalars.
pub fn eval_scalar_poly(coefficients: &[Scalar], index: ParticipantId) -> Scalar {
    let x = Scalar::from(u64::from(index));
    coefficients
        .iter()
        .rev()
        .fold(Scalar::ZERO, |acc, coefficient| acc * x + coefficient)
}

/// Evaluates the committed polynomial `F(x) = Σ xʲ·cⱼ` at `x = index`, over
/// points.
pub fn eval_point_poly(commitments: &[Point], index: ParticipantId) -> Point {
    let x = Scalar::from(u64::from(index));
    commitments
        .iter()
        .rev()
        .fold(Point::IDENTITY, |acc, commitment| acc * x + commitment)
}

/// This validator's secret key-gen material: the polynomial coefficients and
/// their public commitments. The secret never needs to outlive the ceremony.
pub struct SecretPolynomial {
    /// Coefficients, constant term first; `coefficients[0]` is the secret.
    pub coefficients: Vec<Scalar>,
    /// Commitments `cⱼ = coeffⱼ·G`.
    pub commitments: Vec<Point>,
}

/// Samples a fresh polynomial of degree `threshold - 1`.
pub fn generate_polynomial<R: RngCore + CryptoRng>(
    rng: &mut R,
    threshold: u16,
) -> SecretPolynomial {
    let coefficients: Vec<Scalar> = (0..threshold).map(|_| Scalar::random(&mut *rng)).collect();
    let commitments = coefficients.iter().map(|c| generator() * c).collect();
    SecretPolynomial { coefficients, commitments }
}

/// The challenge binding a proof of knowledge to its ceremony.
fn pok_challenge(
    index: ParticipantId,
    context: &[u8; 32],
    secret_commitment: &Point,
    nonce_commitment: &Point,
) -> Scalar {
    hash_to_scalar(&[
        DOM_POK,
        &index.to_be_bytes(),
        context,
        encode_point(secret_commitment).as_slice(),
        encode_point(nonce_commitment).as_slice(),
    ])
}

/// Proves knowledge of `secret` (the constant term) as a Schnorr signature
/// `(R, μ)` over the ceremony context.
pub fn generate_pok<R: RngCore + CryptoRng>(
    rng: &mut R,
    secret: &Scalar,
    index: ParticipantId,
    context: &[u8; 32],
) -> SchnorrPok {
    let nonce = Scalar::random(rng);
    let nonce_commitment = generator() * nonce;
    let secret_commitment = generator() * secret;

    let challenge = pok_challenge(index, context, &secret_commitment, &nonce_commitment);
    let mu = nonce + *secret * challenge;

    SchnorrPok { r: encode_point(&nonce_commitment), mu: encode_scalar(&mu) }
}

/// Verifies a peer's proof of knowledge against its constant-term
/// commitment: `μ·G == R + c·c₀`.
pub fn verify_pok(
    pok: &SchnorrPok,
    constant_commitment: &CompressedPoint,
    index: ParticipantId,
    context: &[u8; 32],
) -> Result<bool, CryptoError> {
    let r = decode_point(&pok.r)?;
    let mu = decode_scalar(&pok.mu)?;
    let c0 = decode_point(constant_commitment)?;

    let challenge = pok_challenge(index, context, &c0, &r);
    Ok(generator() * mu == r + c0 * challenge)
}

/// Computes the share this validator owes `recipient`.
pub fn share_for(poly: &SecretPolynomial, recipient: ParticipantId) -> Scalar {
    eval_scalar_poly(&poly.coefficients, recipient)
}

/// The VSS check: `share·G == Σ idʲ·cⱼ` over the sharer's commitments.
pub fn verify_share(
    share: &Scalar,
    commitments: &[CompressedPoint],
    recipient: ParticipantId,
) -> Result<bool, CryptoError> {
    let commitments = commitments
        .iter()
        .map(decode_point)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(generator() * share == eval_point_poly(&commitments, recipient))
}

/// The aggregate group public key: the sum of every constant-term
/// commitment.
pub fn aggregate_public_key(
    all_commitments: impl Iterator<Item = CompressedPoint>,
) -> Result<Point, CryptoError> {
    let mut acc = Point::IDENTITY;
    for commitment in all_commitments {
        acc += decode_point(&commitment)?;
    }
    Ok(acc)
}

/// A participant's public verification share, derivable by everyone:
/// `Yᵢ = Σⱼ Fⱼ(i)` over every sharer's committed polynomial.
pub fn derive_verification_share<'a>(
    all_commitments: impl Iterator<Item = &'a Vec<CompressedPoint>>,
    index: ParticipantId,
) -> Result<Point, CryptoError> {
    let mut acc = Point::IDENTITY;
    for commitments in all_commitments {
        let decoded = commitments
            .iter()
            .map(decode_point)
            .collect::<Result<Vec<_>, _>>()?;
        acc += eval_point_poly(&decoded, index);
    }
    Ok(acc)
}
