//! Decoded X.509 certificates
//!
//! Certificates are parsed once with x509-parser and kept as owned values so
//! they can be stored on a configurator and shipped over the bus as DER.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use palisade_core::{
    CertificateId, EccPublicKey, GroupId, Hasher, KeyInfo, PermissionError, Result,
};
use std::fmt;
use x509_parser::extensions::ParsedExtension;
use x509_parser::pem::Pem;
use x509_parser::prelude::{FromDer, X509Certificate};

/// Extended key usage marking an identity certificate
pub const IDENTITY_USAGE_OID: &str = "1.3.6.1.4.1.44924.1.1";
/// Extended key usage marking a membership certificate
pub const MEMBERSHIP_USAGE_OID: &str = "1.3.6.1.4.1.44924.1.2";

const PEM_LABEL: &str = "CERTIFICATE";
const PEM_LINE_WIDTH: usize = 64;

/// Declared purpose of a certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertificateUsage {
    /// No usage restriction (CA and intermediate certificates)
    Unrestricted,
    /// Identity certificate
    Identity,
    /// Security group membership certificate
    Membership,
}

impl fmt::Display for CertificateUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unrestricted => "unrestricted",
            Self::Identity => "identity",
            Self::Membership => "membership",
        })
    }
}

/// Owned, decoded X.509 certificate
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    serial: Vec<u8>,
    subject: String,
    subject_public_key: EccPublicKey,
    subject_key_id: Vec<u8>,
    authority_key_id: Vec<u8>,
    usage: CertificateUsage,
    group_id: Option<GroupId>,
    is_ca: bool,
    tbs: Vec<u8>,
    signature: Vec<u8>,
}

fn invalid(message: impl fmt::Display) -> PermissionError {
    PermissionError::invalid_data(format!("Invalid certificate: {message}"))
}

impl Certificate {
    /// Decode one DER certificate
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (rest, cert) = X509Certificate::from_der(der).map_err(invalid)?;
        if !rest.is_empty() {
            return Err(invalid(format!("{} trailing bytes after DER", rest.len())));
        }

        let subject_public_key = EccPublicKey::from_spki_der(cert.public_key().raw)?;

        let mut subject_key_id = Vec::new();
        let mut authority_key_id = Vec::new();
        let mut usage = CertificateUsage::Unrestricted;
        let mut is_ca = false;
        for extension in cert.extensions() {
            match extension.parsed_extension() {
                ParsedExtension::SubjectKeyIdentifier(id) => subject_key_id = id.0.to_vec(),
                ParsedExtension::AuthorityKeyIdentifier(aki) => {
                    if let Some(id) = &aki.key_identifier {
                        authority_key_id = id.0.to_vec();
                    }
                }
                ParsedExtension::ExtendedKeyUsage(eku) => {
                    for oid in &eku.other {
                        match oid.to_id_string().as_str() {
                            IDENTITY_USAGE_OID => usage = CertificateUsage::Identity,
                            MEMBERSHIP_USAGE_OID => usage = CertificateUsage::Membership,
                            _ => {}
                        }
                    }
                }
                ParsedExtension::BasicConstraints(constraints) => is_ca = constraints.ca,
                _ => {}
            }
        }

        let group_id = match cert.subject().iter_organizational_unit().next() {
            Some(unit) => {
                let text = unit.as_str().map_err(invalid)?;
                Some(GroupId::parse(text).map_err(|e| invalid(format!("bad group id: {e}")))?)
            }
            None => None,
        };

        Ok(Self {
            der: der.to_vec(),
            serial: cert.raw_serial().to_vec(),
            subject: cert.subject().to_string(),
            subject_public_key,
            subject_key_id,
            authority_key_id,
            usage,
            group_id,
            is_ca,
            tbs: cert.tbs_certificate.as_ref().to_vec(),
            signature: cert.signature_value.data.to_vec(),
        })
    }

    /// Decode a single PEM certificate
    pub fn from_pem(pem: &str) -> Result<Self> {
        let mut chain = extract_chain(pem)?;
        if chain.len() != 1 {
            return Err(invalid(format!("expected one certificate, found {}", chain.len())));
        }
        Ok(chain.remove(0))
    }

    /// DER encoding
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// PEM encoding
    pub fn to_pem(&self) -> String {
        let encoded = STANDARD.encode(&self.der);
        let mut pem = format!("-----BEGIN {PEM_LABEL}-----\n");
        for line in encoded.as_bytes().chunks(PEM_LINE_WIDTH) {
            pem.push_str(&String::from_utf8_lossy(line));
            pem.push('\n');
        }
        pem.push_str(&format!("-----END {PEM_LABEL}-----\n"));
        pem
    }

    /// Raw serial number bytes
    pub fn serial(&self) -> &[u8] {
        &self.serial
    }

    /// Subject distinguished name
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Subject public key
    pub fn subject_public_key(&self) -> &EccPublicKey {
        &self.subject_public_key
    }

    /// Subject public key with its identifier
    ///
    /// Uses the subject key identifier extension when present.
    pub fn key_info(&self) -> KeyInfo {
        if self.subject_key_id.is_empty() {
            KeyInfo::new(self.subject_public_key.clone())
        } else {
            KeyInfo::with_key_id(self.subject_public_key.clone(), self.subject_key_id.clone())
        }
    }

    /// Subject key identifier, empty when absent
    pub fn subject_key_id(&self) -> &[u8] {
        &self.subject_key_id
    }

    /// Authority key identifier, empty when absent
    pub fn authority_key_id(&self) -> &[u8] {
        &self.authority_key_id
    }

    /// Declared usage
    pub fn usage(&self) -> CertificateUsage {
        self.usage
    }

    /// Security group carried by a membership certificate
    pub fn group_id(&self) -> Option<GroupId> {
        self.group_id
    }

    /// Whether the basic constraints mark this certificate as a CA
    pub fn is_ca(&self) -> bool {
        self.is_ca
    }

    /// DER of the to-be-signed portion
    pub fn tbs(&self) -> &[u8] {
        &self.tbs
    }

    /// Issuer signature over [`Certificate::tbs`]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Identity of this certificate, given the issuer's key when known
    pub fn certificate_id(&self, issuer: Option<&EccPublicKey>) -> CertificateId {
        CertificateId {
            serial: self.serial.clone(),
            issuer_public_key: issuer.cloned(),
            issuer_key_id: self.authority_key_id.clone(),
        }
    }

    /// SHA-256 digest of the DER encoding
    pub fn thumbprint(&self, hasher: &dyn Hasher) -> Vec<u8> {
        hasher.hash(&self.der)
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("serial", &hex::encode(&self.serial))
            .field("usage", &self.usage)
            .field("group_id", &self.group_id)
            .finish_non_exhaustive()
    }
}

/// Decode a concatenated PEM chain, leaf first
///
/// Non-certificate PEM blocks are skipped. A chain with no certificate is
/// `InvalidData`.
pub fn extract_chain(pem: &str) -> Result<Vec<Certificate>> {
    let mut chain = Vec::new();
    for block in Pem::iter_from_buffer(pem.as_bytes()) {
        let block = block.map_err(|e| invalid(format!("bad PEM: {e}")))?;
        if block.label != PEM_LABEL {
            tracing::debug!(label = %block.label, "skipping PEM block");
            continue;
        }
        chain.push(Certificate::from_der(&block.contents)?);
    }
    if chain.is_empty() {
        return Err(PermissionError::invalid_data("PEM text contains no certificate"));
    }
    Ok(chain)
}

/// Decode a list of DER certificates, leaf first
pub fn chain_from_der<B: AsRef<[u8]>>(ders: &[B]) -> Result<Vec<Certificate>> {
    if ders.is_empty() {
        return Err(PermissionError::invalid_data("certificate chain is empty"));
    }
    ders.iter().map(|der| Certificate::from_der(der.as_ref())).collect()
}

/// Encode a chain as concatenated PEM
pub fn chain_to_pem(chain: &[Certificate]) -> String {
    chain.iter().map(Certificate::to_pem).collect()
}

/// Parse a security group id; only the length is checked
pub fn parse_group_id(bytes: &[u8]) -> Result<GroupId> {
    GroupId::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Sha256Hasher;
    use crate::test_certs::{issue, self_signed, Usage};
    use assert_matches::assert_matches;

    #[test]
    fn test_decodes_identity_certificate() {
        let (ca, ca_key) = self_signed("ca");
        let (leaf, _) = issue("alice", Usage::Identity, None, &ca, &ca_key);
        let cert = Certificate::from_pem(&leaf.pem()).unwrap();
        assert_eq!(cert.usage(), CertificateUsage::Identity);
        assert_eq!(cert.group_id(), None);
        assert!(!cert.is_ca());
        assert!(cert.subject().contains("alice"));

        let issuer = Certificate::from_der(ca.der()).unwrap();
        assert!(issuer.is_ca());
        assert_eq!(cert.authority_key_id(), issuer.subject_key_id());
    }

    #[test]
    fn test_membership_group_from_subject() {
        let (ca, ca_key) = self_signed("admin");
        let group = GroupId::from([0xab; 16]);
        let (leaf, _) = issue("bob", Usage::Membership, Some(group), &ca, &ca_key);
        let cert = Certificate::from_der(leaf.der()).unwrap();
        assert_eq!(cert.usage(), CertificateUsage::Membership);
        assert_eq!(cert.group_id(), Some(group));
    }

    #[test]
    fn test_extract_chain_order_and_pem() {
        let (ca, ca_key) = self_signed("ca");
        let (leaf, _) = issue("alice", Usage::Identity, None, &ca, &ca_key);
        let text = format!("{}{}", leaf.pem(), ca.pem());
        let chain = extract_chain(&text).unwrap();
        assert_eq!(chain.len(), 2);
        assert!(chain[1].is_ca());
        assert_eq!(extract_chain(&chain_to_pem(&chain)).unwrap(), chain);
    }

    #[test]
    fn test_empty_and_garbage_chains() {
        assert_matches!(extract_chain(""), Err(PermissionError::InvalidData { .. }));
        assert_matches!(
            extract_chain("-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n"),
            Err(PermissionError::InvalidData { .. })
        );
        assert_matches!(Certificate::from_der(&[0x30, 0x00]), Err(PermissionError::InvalidData { .. }));
        let none: [&[u8]; 0] = [];
        assert_matches!(chain_from_der(&none), Err(PermissionError::InvalidData { .. }));
    }

    #[test]
    fn test_group_id_length() {
        parse_group_id(&[0; 16]).unwrap();
        assert_matches!(parse_group_id(&[0; 17]), Err(PermissionError::InvalidGuid { length: 17 }));
        assert_matches!(parse_group_id(&[]), Err(PermissionError::InvalidGuid { length: 0 }));
    }

    #[test]
    fn test_thumbprint_is_der_digest() {
        let (ca, _) = self_signed("ca");
        let cert = Certificate::from_der(ca.der()).unwrap();
        let thumbprint = cert.thumbprint(&Sha256Hasher);
        assert_eq!(thumbprint.len(), 32);
        assert_eq!(thumbprint, Sha256Hasher.hash(ca.der()));
    }
}
