//! Palisade trust
//!
//! Certificate handling for the permission engine:
//!
//! - [`certificate`]: owned X.509 certificates decoded from DER or PEM chains,
//!   with their declared usage and security group
//! - [`anchor`]: chain verification, trust-anchor matching and usage checks
//! - [`crypto`]: P-256 signer and verifier, SHA-256 hasher
//! - [`manifest_signing`]: thumbprints, manifest digests and signatures

#![forbid(unsafe_code)]

pub mod anchor;
pub mod certificate;
pub mod crypto;
pub mod manifest_signing;

#[cfg(test)]
mod test_certs;

pub use anchor::{check_usage, chain_matches_anchor, matches_trust_anchor, verify_chain};
pub use certificate::{
    chain_from_der, chain_to_pem, extract_chain, parse_group_id, Certificate, CertificateUsage,
    IDENTITY_USAGE_OID, MEMBERSHIP_USAGE_OID,
};
pub use crypto::{P256Signer, P256Verifier, Sha256Hasher};
pub use manifest_signing::{
    bind_manifest, compute_manifest_digest_xml, compute_thumbprint, manifest_digest,
    set_manifest_signature_xml, sign_manifest, sign_manifest_xml, verify_manifest,
};
