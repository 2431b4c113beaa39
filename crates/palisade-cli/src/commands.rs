//! Subcommand implementations
//!
//! Each command returns the text to print so it can be tested without a
//! process boundary.

use crate::DocumentKind;
use anyhow::{Context, Result};
use palisade_core::SecurityConfig;
use palisade_trust::{
    check_usage, compute_manifest_digest_xml, compute_thumbprint, extract_chain,
    sign_manifest_xml, Certificate, CertificateUsage, P256Signer, Sha256Hasher,
};
use palisade_xml::{
    manifest_to_xml, policy_to_xml, rules_to_xml, validate_manifest_xml, validate_policy_xml,
    validate_rules_xml, xml_to_manifest, xml_to_policy, xml_to_rules, XmlElement,
};
use std::path::Path;

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// Leaf of the identity chain in `path`, checked for identity usage
fn identity_leaf(path: &Path, config: &SecurityConfig) -> Result<Certificate> {
    let chain = extract_chain(&read(path)?)
        .with_context(|| format!("decoding identity chain {}", path.display()))?;
    let leaf = chain.into_iter().next().context("identity chain is empty")?;
    check_usage(&leaf, CertificateUsage::Identity, config)?;
    Ok(leaf)
}

/// Schema-check a document
pub fn validate(kind: DocumentKind, path: &Path) -> Result<String> {
    let root = XmlElement::parse(&read(path)?)?;
    match kind {
        DocumentKind::Rules => validate_rules_xml(&root)?,
        DocumentKind::Manifest => validate_manifest_xml(&root)?,
        DocumentKind::Policy => validate_policy_xml(&root)?,
    }
    tracing::info!(file = %path.display(), ?kind, "document is valid");
    Ok(format!("{}: valid", path.display()))
}

/// Parse a document and re-emit it in normalized form
pub fn convert(kind: DocumentKind, path: &Path) -> Result<String> {
    let text = read(path)?;
    let xml = match kind {
        DocumentKind::Rules => rules_to_xml(&xml_to_rules(&text)?)?,
        DocumentKind::Manifest => manifest_to_xml(&xml_to_manifest(&text)?)?,
        DocumentKind::Policy => policy_to_xml(&xml_to_policy(&text)?)?,
    };
    Ok(xml)
}

/// Hex digest of an unsigned manifest bound to the identity leaf
pub fn digest(manifest: &Path, identity: &Path, config: &SecurityConfig) -> Result<String> {
    let leaf = identity_leaf(identity, config)?;
    let digest = compute_manifest_digest_xml(&read(manifest)?, &leaf, &Sha256Hasher)?;
    Ok(hex::encode(digest))
}

/// Signed manifest XML for an unsigned manifest and the identity leaf
pub fn sign(
    manifest: &Path,
    identity: &Path,
    key: &Path,
    config: &SecurityConfig,
) -> Result<String> {
    let leaf = identity_leaf(identity, config)?;
    let signer = P256Signer::from_pkcs8_pem(&read(key)?)
        .with_context(|| format!("decoding private key {}", key.display()))?;
    Ok(sign_manifest_xml(&read(manifest)?, &leaf, &signer, &Sha256Hasher)?)
}

/// Hex SHA-256 thumbprint of the first certificate in `path`
pub fn thumbprint(path: &Path) -> Result<String> {
    let chain = extract_chain(&read(path)?)?;
    let leaf = chain.first().context("no certificate found")?;
    Ok(hex::encode(compute_thumbprint(leaf, &Sha256Hasher)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_testkit::{observe_policy, AuthorityFixture, KeyTestFixture, MANIFEST_TEMPLATE};
    use palisade_trust::{chain_to_pem, verify_manifest, P256Verifier};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_validate_and_convert_rules() {
        let rules = file(MANIFEST_TEMPLATE);
        assert!(validate(DocumentKind::Rules, rules.path()).unwrap().ends_with("valid"));
        let normalized = convert(DocumentKind::Rules, rules.path()).unwrap();
        assert_eq!(xml_to_rules(&normalized).unwrap(), xml_to_rules(MANIFEST_TEMPLATE).unwrap());

        assert!(validate(DocumentKind::Manifest, rules.path()).is_err());
        assert!(validate(DocumentKind::Rules, Path::new("/nonexistent.xml")).is_err());
    }

    #[test]
    fn test_validate_policy() {
        let policy = file(&policy_to_xml(&observe_policy(4)).unwrap());
        validate(DocumentKind::Policy, policy.path()).unwrap();
        let normalized = convert(DocumentKind::Policy, policy.path()).unwrap();
        assert_eq!(xml_to_policy(&normalized).unwrap(), observe_policy(4));
    }

    #[test]
    fn test_sign_digest_and_thumbprint() {
        let authority = AuthorityFixture::new("ca");
        let chain = authority.issue_identity("device", &KeyTestFixture::generate());
        let identity = file(&chain_to_pem(&chain));
        let manifest = file(MANIFEST_TEMPLATE);
        let key = file(&authority.key().private_key_pem());
        let config = SecurityConfig::default();

        let signed = sign(manifest.path(), identity.path(), key.path(), &config).unwrap();
        let signed = xml_to_manifest(&signed).unwrap();
        verify_manifest(
            &signed,
            &chain[0],
            &authority.key_info().public_key,
            &Sha256Hasher,
            &P256Verifier,
        )
        .unwrap();

        let hex_digest = digest(manifest.path(), identity.path(), &config).unwrap();
        assert_eq!(hex_digest.len(), 64);

        let printed = thumbprint(identity.path()).unwrap();
        assert_eq!(printed, hex::encode(signed.thumbprint()));
    }
}
