// Path: crates/types/src/codec.rs

//! Defines the canonical, deterministic binary codec for persisted state and
//! hash preimages.
//!
//! This module provides simple wrappers around `bincode`, configured through
//! `serde` derives on the types in this crate. Centralizing the codec here in
//! the base `types` crate ensures every component uses the exact same
//! serialization for state blobs and digests, preventing divergence between
//! validators that must derive identical group ids and packet digests from
//! the same data.

use crate::error::CodecError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value into its canonical byte representation.
///
/// Use this for everything written to storage and for every structured
/// preimage that feeds a digest.
pub fn to_bytes_canonical<T: Serialize>(v: &T) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(v).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decodes a value from its canonical byte representation.
///
/// Fails fast on trailing bytes or malformed input; invalid persisted data
/// must never be silently accepted.
pub fn from_bytes_canonical<T: DeserializeOwned>(b: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(b).map_err(|e| CodecError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::BTreeSet;

    #[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
    struct TestStruct {
        id: u32,
        name: String,
        tags: Vec<u8>,
    }

    #[test]
    fn canonical_codec_roundtrip() {
        let original = TestStruct { id: 42, name: "test-data".to_string(), tags: vec![1, 2, 3] };

        let encoded = to_bytes_canonical(&original).unwrap();
        assert!(!encoded.is_empty());
        let decoded = from_bytes_canonical::<TestStruct>(&encoded).unwrap();
        assert_eq!(original, decoded);

        let mut set = BTreeSet::new();
        set.insert([1u8; 32]);
        set.insert([2u8; 32]);
        let encoded_set = to_bytes_canonical(&set).unwrap();
        let decoded_set = from_bytes_canonical::<BTreeSet<[u8; 32]>>(&encoded_set).unwrap();
        assert_eq!(set, decoded_set);
    }

    #[test]
    fn canonical_decode_failure() {
        let original = TestStruct { id: 99, name: "another".to_string(), tags: vec![10, 20] };
        let mut encoded = to_bytes_canonical(&original).unwrap();
        encoded.pop();
        encoded.pop();

        let err = from_bytes_canonical::<TestStruct>(&encoded).unwrap_err();
        assert!(err.to_string().contains("canonical decode failed"));
    }
}
