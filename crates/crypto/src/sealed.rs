// Path: crates/crypto/src/sealed.rs

//! Authenticated encryption of key-gen peer shares.
//!
//! The symmetric key is derived from a Diffie-Hellman exchange over the
//! constant-term commitments: the sender computes `a₀·C₀(recipient)`, the
//! recipient `a₀·C₀(sender)`, both arriving at the same point. The group id
//! and the ordered `(sender, recipient)` pair are bound into the derivation,
//! so each key/nonce pair encrypts exactly one share ever.

use crate::error::CryptoError;
use crate::hash::{keccak, DOM_SHARE_KEY, DOM_SHARE_NONCE};
use crate::point::{Point, Scalar};
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use sigil_types::ids::{GroupId, ParticipantId};
use zeroize::Zeroize;

fn derive(
    group_id: &GroupId,
    shared: &Point,
    sender: ParticipantId,
    recipient: ParticipantId,
) -> ([u8; 32], [u8; 12]) {
    let shared_bytes = crate::point::encode_point(shared);
    let (low, high) = if sender < recipient { (sender, recipient) } else { (recipient, sender) };

    let key = keccak(&[
        DOM_SHARE_KEY,
        group_id.as_ref(),
        shared_bytes.as_slice(),
        &low.to_be_bytes(),
        &high.to_be_bytes(),
    ]);
    let nonce_full = keccak(&[
        DOM_SHARE_NONCE,
        group_id.as_ref(),
        shared_bytes.as_slice(),
        &sender.to_be_bytes(),
        &recipient.to_be_bytes(),
    ]);
    let mut nonce = [0u8; 12];
    nonce.copy_from_slice(&nonce_full[..12]);
    (key, nonce)
}

/// Encrypts `plaintext` from `sender` to `recipient` under the shared point
/// `own_a0 · C₀(recipient)`.
pub fn seal_share(
    group_id: &GroupId,
    own_a0: &Scalar,
    recipient_c0: &Point,
    sender: ParticipantId,
    recipient: ParticipantId,
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let shared = *recipient_c0 * own_a0;
    let (mut key, nonce) = derive(group_id, &shared, sender, recipient);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::DecryptionFailed)?;
    key.zeroize();
    Ok(sealed)
}

/// Decrypts a share sent from `sender` to `recipient` under the shared point
/// `own_a0 · C₀(sender)`.
pub fn open_share(
    group_id: &GroupId,
    own_a0: &Scalar,
    sender_c0: &Point,
    sender: ParticipantId,
    recipient: ParticipantId,
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let shared = *sender_c0 * own_a0;
    let (mut key, nonce) = derive(group_id, &shared, sender, recipient);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let opened = cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)?;
    key.zeroize();
    Ok(opened)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::generator;
    use k256::elliptic_curve::Field;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn seal_open_between_two_parties() {
        let mut rng = StdRng::from_seed([8; 32]);
        let group = GroupId([1; 32]);

        let a0_sender = Scalar::random(&mut rng);
        let a0_recipient = Scalar::random(&mut rng);
        let c0_sender = generator() * a0_sender;
        let c0_recipient = generator() * a0_recipient;

        let sealed =
            seal_share(&group, &a0_sender, &c0_recipient, 1, 2, b"the-share").unwrap();
        let opened = open_share(&group, &a0_recipient, &c0_sender, 1, 2, &sealed).unwrap();
        assert_eq!(opened, b"the-share");
    }

    #[test]
    fn tampering_is_detected() {
        let mut rng = StdRng::from_seed([9; 32]);
        let group = GroupId([1; 32]);

        let a0_sender = Scalar::random(&mut rng);
        let a0_recipient = Scalar::random(&mut rng);
        let c0_sender = generator() * a0_sender;
        let c0_recipient = generator() * a0_recipient;

        let mut sealed =
            seal_share(&group, &a0_sender, &c0_recipient, 1, 2, b"the-share").unwrap();
        sealed[0] ^= 1;
        assert_eq!(
            open_share(&group, &a0_recipient, &c0_sender, 1, 2, &sealed),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn wrong_recipient_cannot_open() {
        let mut rng = StdRng::from_seed([10; 32]);
        let group = GroupId([1; 32]);

        let a0_sender = Scalar::random(&mut rng);
        let a0_recipient = Scalar::random(&mut rng);
        let a0_other = Scalar::random(&mut rng);
        let c0_sender = generator() * a0_sender;
        let c0_recipient = generator() * a0_recipient;

        let sealed =
            seal_share(&group, &a0_sender, &c0_recipient, 1, 2, b"the-share").unwrap();
        assert_eq!(
            open_share(&group, &a0_other, &c0_sender, 1, 2, &sealed),
            Err(CryptoError::DecryptionFailed)
        );
    }
}
