//! Signed manifests

use super::rules::Rule;
use crate::serialization;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Only supported manifest format version
pub const MANIFEST_VERSION: u32 = 1;

/// Algorithm object identifiers
pub mod oids {
    /// SHA-256 digest, used for thumbprints
    pub const SHA256: &str = "2.16.840.1.101.3.4.2.1";
    /// ECDSA with SHA-256, used for manifest signatures
    pub const ECDSA_SHA256: &str = "1.2.840.10045.4.3.2";
}

/// Rule set granted to one identity, bound to it by thumbprint and signed
///
/// A manifest is never edited after signing. Changing rules means building a
/// new value through [`Manifest::new`] and the `with_*` constructors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Manifest {
    version: u32,
    rules: Vec<Rule>,
    thumbprint_oid: String,
    thumbprint: Vec<u8>,
    signature_oid: String,
    signature: Vec<u8>,
}

#[derive(Serialize)]
struct DigestInput<'a> {
    version: u32,
    rules: &'a [Rule],
    thumbprint_oid: &'a str,
    thumbprint: &'a [u8],
    signature_oid: &'a str,
}

impl Manifest {
    /// Unsigned, unbound manifest over `rules`
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            rules,
            thumbprint_oid: oids::SHA256.to_string(),
            thumbprint: Vec::new(),
            signature_oid: oids::ECDSA_SHA256.to_string(),
            signature: Vec::new(),
        }
    }

    /// Manifest assembled from already-validated parts
    pub fn from_parts(
        version: u32,
        rules: Vec<Rule>,
        thumbprint_oid: impl Into<String>,
        thumbprint: Vec<u8>,
        signature_oid: impl Into<String>,
        signature: Vec<u8>,
    ) -> Self {
        Self {
            version,
            rules,
            thumbprint_oid: thumbprint_oid.into(),
            thumbprint,
            signature_oid: signature_oid.into(),
            signature,
        }
    }

    /// Same rules bound to a subject thumbprint; any signature is dropped
    pub fn with_thumbprint(self, thumbprint: Vec<u8>) -> Self {
        Self {
            thumbprint,
            signature: Vec::new(),
            ..self
        }
    }

    /// Same manifest carrying `signature`
    pub fn with_signature(self, signature: Vec<u8>) -> Self {
        Self { signature, ..self }
    }

    /// Format version
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Granted rules
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Thumbprint algorithm
    pub fn thumbprint_oid(&self) -> &str {
        &self.thumbprint_oid
    }

    /// Digest of the identity certificate this manifest is bound to
    pub fn thumbprint(&self) -> &[u8] {
        &self.thumbprint
    }

    /// Subject thumbprint, if the manifest has been bound
    pub fn subject_thumbprint(&self) -> Option<&[u8]> {
        (!self.thumbprint.is_empty()).then_some(self.thumbprint.as_slice())
    }

    /// Signature algorithm
    pub fn signature_oid(&self) -> &str {
        &self.signature_oid
    }

    /// Signature bytes
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Whether the manifest carries a signature
    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }

    /// Canonical bytes covered by the signature
    ///
    /// Covers version, rules, thumbprint algorithm and value, and the signature
    /// algorithm. The signature itself is excluded.
    pub fn digest_input(&self) -> Result<Vec<u8>> {
        serialization::to_canonical_bytes(&DigestInput {
            version: self.version,
            rules: &self.rules,
            thumbprint_oid: &self.thumbprint_oid,
            thumbprint: &self.thumbprint,
            signature_oid: &self.signature_oid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebinding_drops_signature() {
        let signed = Manifest::new(vec![Rule::allow_all()])
            .with_thumbprint(vec![1; 32])
            .with_signature(vec![2; 64]);
        assert!(signed.is_signed());
        let rebound = signed.with_thumbprint(vec![3; 32]);
        assert!(!rebound.is_signed());
        assert_eq!(rebound.subject_thumbprint(), Some(&[3u8; 32][..]));
    }

    #[test]
    fn test_digest_input_ignores_signature() {
        let bound = Manifest::new(vec![Rule::allow_all()]).with_thumbprint(vec![1; 32]);
        let signed = bound.clone().with_signature(vec![9; 64]);
        assert_eq!(bound.digest_input().unwrap(), signed.digest_input().unwrap());

        let other = Manifest::new(vec![Rule::allow_all()]).with_thumbprint(vec![2; 32]);
        assert_ne!(bound.digest_input().unwrap(), other.digest_input().unwrap());
    }
}
