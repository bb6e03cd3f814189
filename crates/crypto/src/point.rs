// Path: crates/crypto/src/point.rs

//! secp256k1 point and scalar plumbing.
//!
//! Wire forms are 33-byte SEC1 compressed points and 32-byte big-endian
//! scalars; this module converts between them and the `k256` arithmetic
//! types so the rest of the crate can stay in curve space.

use crate::error::CryptoError;
use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::elliptic_curve::PrimeField;
use k256::{AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint};
use sigil_types::ids::{CompressedPoint, ScalarBytes};

/// A secp256k1 point in projective coordinates.
pub type Point = ProjectivePoint;
/// A scalar mod the secp256k1 group order.
pub type Scalar = k256::Scalar;

/// The group generator.
pub const fn generator() -> Point {
    ProjectivePoint::GENERATOR
}

/// Encodes a point to its 33-byte compressed wire form.
pub fn encode_point(point: &Point) -> CompressedPoint {
    let encoded = point.to_affine().to_encoded_point(true);
    CompressedPoint::from_slice(encoded.as_bytes())
}

/// Decodes a compressed wire point.
pub fn decode_point(bytes: &CompressedPoint) -> Result<Point, CryptoError> {
    let encoded =
        EncodedPoint::from_bytes(bytes.as_slice()).map_err(|_| CryptoError::InvalidPoint)?;
    Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
        .map(ProjectivePoint::from)
        .ok_or(CryptoError::InvalidPoint)
}

/// Encodes a scalar to its 32-byte big-endian wire form.
pub fn encode_scalar(scalar: &Scalar) -> ScalarBytes {
    ScalarBytes::from_slice(scalar.to_bytes().as_slice())
}

/// Decodes a wire scalar, rejecting values at or above the group order.
pub fn decode_scalar(bytes: &ScalarBytes) -> Result<Scalar, CryptoError> {
    let repr = FieldBytes::clone_from_slice(bytes.as_slice());
    Option::<Scalar>::from(Scalar::from_repr(repr)).ok_or(CryptoError::InvalidScalar)
}

/// The affine `(x, y)` coordinates of a point, as 32-byte words. Returns an
/// error for the identity, which has no affine form.
pub fn affine_coordinates(point: &Point) -> Result<([u8; 32], [u8; 32]), CryptoError> {
    let encoded = point.to_affine().to_encoded_point(false);
    let x = encoded.x().ok_or(CryptoError::InvalidPoint)?;
    let y = encoded.y().ok_or(CryptoError::InvalidPoint)?;
    let mut xs = [0u8; 32];
    let mut ys = [0u8; 32];
    xs.copy_from_slice(x.as_slice());
    ys.copy_from_slice(y.as_slice());
    Ok((xs, ys))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::elliptic_curve::Field;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn point_roundtrip() {
        let mut rng = StdRng::from_seed([7; 32]);
        let scalar = Scalar::random(&mut rng);
        let point = generator() * scalar;
        assert_eq!(decode_point(&encode_point(&point)).unwrap(), point);
    }

    #[test]
    fn scalar_roundtrip() {
        let mut rng = StdRng::from_seed([9; 32]);
        let scalar = Scalar::random(&mut rng);
        assert_eq!(decode_scalar(&encode_scalar(&scalar)).unwrap(), scalar);
    }

    #[test]
    fn out_of_order_scalar_rejected() {
        // The group order itself is not a canonical scalar encoding.
        let order = ScalarBytes::from_slice(
            &hex::decode("fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141")
                .unwrap(),
        );
        assert_eq!(decode_scalar(&order), Err(CryptoError::InvalidScalar));
    }
}
