//! Binding manifests to identity certificates and signing them
//!
//! A manifest is bound to an identity by the SHA-256 thumbprint of the
//! identity certificate. The signature covers the SHA-256 digest of the
//! manifest's canonical bytes (see [`Manifest::digest_input`]), and the
//! signer hashes that digest once more as part of ECDSA-SHA256.
//!
//! The XML helpers take a manifest-template-shaped `<rules>` document and
//! rebuild the manifest from scratch on every call.

use crate::certificate::Certificate;
use palisade_core::{
    EccPublicKey, Hasher, Manifest, PermissionError, Result, Rule, Signer, Verifier,
};
use palisade_xml::{manifest_to_xml, validate_rules, xml_to_rules};

/// Thumbprint binding a manifest to `identity`
pub fn compute_thumbprint(identity: &Certificate, hasher: &dyn Hasher) -> Vec<u8> {
    identity.thumbprint(hasher)
}

/// Unsigned manifest for `rules` bound to `identity`
pub fn bind_manifest(rules: Vec<Rule>, identity: &Certificate, hasher: &dyn Hasher) -> Manifest {
    Manifest::new(rules).with_thumbprint(compute_thumbprint(identity, hasher))
}

/// Digest the signature covers
pub fn manifest_digest(manifest: &Manifest, hasher: &dyn Hasher) -> Result<Vec<u8>> {
    Ok(hasher.hash(&manifest.digest_input()?))
}

/// Sign a bound manifest, replacing any previous signature
pub fn sign_manifest(manifest: Manifest, signer: &dyn Signer, hasher: &dyn Hasher) -> Result<Manifest> {
    if manifest.thumbprint().is_empty() {
        return Err(PermissionError::invalid_data(
            "manifest must be bound to an identity before signing",
        ));
    }
    validate_rules(manifest.rules())?;
    let digest = manifest_digest(&manifest, hasher)?;
    let signature = signer.sign(&digest)?;
    Ok(manifest.with_signature(signature))
}

/// Check that `manifest` belongs to `identity` and was signed by `issuer`
pub fn verify_manifest(
    manifest: &Manifest,
    identity: &Certificate,
    issuer: &EccPublicKey,
    hasher: &dyn Hasher,
    verifier: &dyn Verifier,
) -> Result<()> {
    if manifest.thumbprint() != compute_thumbprint(identity, hasher).as_slice() {
        return Err(PermissionError::digest_mismatch(format!(
            "manifest is not bound to identity {}",
            identity.subject()
        )));
    }
    let digest = manifest_digest(manifest, hasher)?;
    if !verifier.verify(&digest, manifest.signature(), issuer) {
        return Err(PermissionError::digest_mismatch(
            "manifest signature does not verify under the issuer key",
        ));
    }
    Ok(())
}

/// Digest to sign for an unsigned rules document bound to `identity`
pub fn compute_manifest_digest_xml(
    unsigned_xml: &str,
    identity: &Certificate,
    hasher: &dyn Hasher,
) -> Result<Vec<u8>> {
    let manifest = bind_manifest(xml_to_rules(unsigned_xml)?, identity, hasher);
    manifest_digest(&manifest, hasher)
}

/// Attach a signature produced elsewhere and emit signed manifest XML
pub fn set_manifest_signature_xml(
    unsigned_xml: &str,
    identity: &Certificate,
    signature: &[u8],
    hasher: &dyn Hasher,
) -> Result<String> {
    if signature.is_empty() {
        return Err(PermissionError::invalid_data("signature is empty"));
    }
    let manifest = bind_manifest(xml_to_rules(unsigned_xml)?, identity, hasher)
        .with_signature(signature.to_vec());
    manifest_to_xml(&manifest)
}

/// Bind, sign and serialize an unsigned rules document
pub fn sign_manifest_xml(
    unsigned_xml: &str,
    identity: &Certificate,
    signer: &dyn Signer,
    hasher: &dyn Hasher,
) -> Result<String> {
    let manifest = bind_manifest(xml_to_rules(unsigned_xml)?, identity, hasher);
    manifest_to_xml(&sign_manifest(manifest, signer, hasher)?)
}
