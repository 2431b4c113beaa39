//! Chain verification, trust-anchor matching and usage checks

use crate::certificate::{Certificate, CertificateUsage};
use palisade_core::{PermissionError, Result, SecurityConfig, TrustAnchor, TrustAnchorKind, Verifier};

/// Whether `cert` was issued directly by `anchor`
///
/// The certificate signature must verify under the anchor key. When both the
/// certificate's authority key id and the anchor's key id are known they must
/// agree. Group authorities additionally require the certificate to carry the
/// anchor's security group.
pub fn matches_trust_anchor(
    cert: &Certificate,
    anchor: &TrustAnchor,
    verifier: &dyn Verifier,
) -> bool {
    if anchor.kind == TrustAnchorKind::SecurityGroupAuthority
        && cert.group_id() != anchor.security_group_id
    {
        return false;
    }
    let aki = cert.authority_key_id();
    if !aki.is_empty() && !anchor.key_info.key_id.is_empty() && aki != anchor.key_info.key_id {
        return false;
    }
    verifier.verify(cert.tbs(), cert.signature(), &anchor.key_info.public_key)
}

/// Verify that each certificate is signed by the next one in the chain
pub fn verify_chain(chain: &[Certificate], verifier: &dyn Verifier) -> Result<()> {
    if chain.is_empty() {
        return Err(PermissionError::invalid_data("certificate chain is empty"));
    }
    for (index, pair) in chain.windows(2).enumerate() {
        let (subject, issuer) = (&pair[0], &pair[1]);
        let (aki, ski) = (subject.authority_key_id(), issuer.subject_key_id());
        if !aki.is_empty() && !ski.is_empty() && aki != ski {
            return Err(PermissionError::invalid_certificate(format!(
                "certificate {index} names an issuer other than certificate {}",
                index + 1
            )));
        }
        if !verifier.verify(subject.tbs(), subject.signature(), issuer.subject_public_key()) {
            return Err(PermissionError::invalid_certificate(format!(
                "certificate {index} is not signed by certificate {}",
                index + 1
            )));
        }
    }
    Ok(())
}

/// Whether a leaf-first chain is rooted at `anchor`
///
/// The chain must verify internally and some certificate in it must either
/// be issued by the anchor or carry the anchor key itself. Group anchors also
/// require the leaf to belong to the anchor's group.
pub fn chain_matches_anchor(
    chain: &[Certificate],
    anchor: &TrustAnchor,
    verifier: &dyn Verifier,
) -> bool {
    let Some(leaf) = chain.first() else {
        return false;
    };
    if anchor.kind == TrustAnchorKind::SecurityGroupAuthority
        && leaf.group_id() != anchor.security_group_id
    {
        return false;
    }
    if verify_chain(chain, verifier).is_err() {
        return false;
    }
    chain.iter().any(|cert| {
        cert.subject_public_key() == &anchor.key_info.public_key
            || verifier.verify(cert.tbs(), cert.signature(), &anchor.key_info.public_key)
    })
}

/// Check a leaf's declared usage against the operation consuming it
///
/// Unrestricted certificates pass. A mismatch is logged and tolerated unless
/// `strict_certificate_usage` is set.
pub fn check_usage(
    cert: &Certificate,
    expected: CertificateUsage,
    config: &SecurityConfig,
) -> Result<()> {
    let usage = cert.usage();
    if usage == CertificateUsage::Unrestricted || usage == expected {
        return Ok(());
    }
    if config.strict_certificate_usage {
        return Err(PermissionError::invalid_certificate_usage(format!(
            "{usage} certificate presented where {expected} is required"
        )));
    }
    tracing::warn!(
        %usage,
        %expected,
        subject = cert.subject(),
        "certificate usage does not match operation"
    );
    Ok(())
}
