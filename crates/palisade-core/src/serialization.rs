//! Canonical binary encoding
//!
//! bincode with its default fixed configuration gives a deterministic byte
//! string for a value, which is what manifest digests and template digests are
//! computed over.

use crate::{PermissionError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Serialize a value to canonical bytes
pub fn to_canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value)
        .map_err(|e| PermissionError::serialization(format!("Failed to encode: {e}")))
}

/// Deserialize canonical bytes
pub fn from_canonical_bytes<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes)
        .map_err(|e| PermissionError::serialization(format!("Failed to decode: {e}")))
}

/// SHA-256 over the canonical bytes of a value
pub fn hash_canonical<T: Serialize + ?Sized>(value: &T) -> Result<[u8; 32]> {
    let bytes = to_canonical_bytes(value)?;
    Ok(Sha256::digest(&bytes).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Acl, Peer, Policy, Rule};

    #[test]
    fn test_policy_survives_canonical_encoding() {
        let policy = Policy::new(7, vec![Acl::new(vec![Peer::all()], vec![Rule::allow_all()])]);
        let bytes = to_canonical_bytes(&policy).unwrap();
        let decoded: Policy = from_canonical_bytes(&bytes).unwrap();
        assert_eq!(decoded, policy);
        assert_eq!(hash_canonical(&policy).unwrap(), hash_canonical(&decoded).unwrap());
    }

    #[test]
    fn test_truncated_bytes_fail() {
        let bytes = to_canonical_bytes(&vec![Rule::allow_all()]).unwrap();
        let result: Result<Vec<Rule>> = from_canonical_bytes(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(PermissionError::Serialization { .. })));
    }
}
