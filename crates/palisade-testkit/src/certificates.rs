//! rcgen-backed certificate authorities
//!
//! Subject and authority key identifiers are pinned to the key id Palisade
//! derives from the public point, so anchors built with [`KeyInfo::new`]
//! match the certificates issued here.

use crate::keys::KeyTestFixture;
use palisade_core::{EccPublicKey, GroupId, KeyInfo};
use palisade_trust::{Certificate, IDENTITY_USAGE_OID, MEMBERSHIP_USAGE_OID};
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyIdMethod,
    SerialNumber,
};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Next unique serial number
pub fn next_serial() -> Vec<u8> {
    let n = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);
    let mut serial = n.to_be_bytes().to_vec();
    // Keep the DER integer positive and minimal.
    while serial.len() > 1 && serial[0] == 0 && serial[1] & 0x80 == 0 {
        serial.remove(0);
    }
    if serial[0] & 0x80 != 0 {
        serial.insert(0, 0);
    }
    serial
}

fn oid_arcs(dotted: &str) -> Vec<u64> {
    dotted.split('.').map(|arc| arc.parse().unwrap()).collect()
}

fn params(name: &str, key: &KeyTestFixture, serial: Vec<u8>) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.distinguished_name.push(DnType::CommonName, name);
    params.serial_number = Some(SerialNumber::from(serial));
    let key_id = EccPublicKey::from_spki_der(&key.key_pair().public_key_der())
        .unwrap()
        .key_id();
    params.key_identifier_method = KeyIdMethod::PreSpecified(key_id);
    params
}

/// Certificate usage requested from an authority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuedUsage {
    /// Identity extended key usage
    Identity,
    /// Membership extended key usage
    Membership,
    /// No extended key usage
    Unrestricted,
}

/// Self-signed authority that issues identity and membership certificates
pub struct AuthorityFixture {
    key: KeyTestFixture,
    certificate: rcgen::Certificate,
    decoded: Certificate,
}

impl AuthorityFixture {
    /// New self-signed authority named `name`
    pub fn new(name: &str) -> Self {
        let key = KeyTestFixture::generate();
        let mut params = params(name, &key, next_serial());
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let certificate = params.self_signed(key.key_pair()).unwrap();
        let decoded = Certificate::from_der(certificate.der()).unwrap();
        Self {
            key,
            certificate,
            decoded,
        }
    }

    /// Authority key
    pub fn key(&self) -> &KeyTestFixture {
        &self.key
    }

    /// Authority public key with key id
    pub fn key_info(&self) -> KeyInfo {
        self.decoded.key_info()
    }

    /// Self-signed authority certificate
    pub fn certificate(&self) -> &Certificate {
        &self.decoded
    }

    /// Issue a certificate for `subject` with a chosen serial
    pub fn issue_with_serial(
        &self,
        name: &str,
        subject: &KeyTestFixture,
        usage: IssuedUsage,
        group: Option<GroupId>,
        serial: Vec<u8>,
    ) -> Certificate {
        let mut params = params(name, subject, serial);
        let oid = match usage {
            IssuedUsage::Identity => Some(IDENTITY_USAGE_OID),
            IssuedUsage::Membership => Some(MEMBERSHIP_USAGE_OID),
            IssuedUsage::Unrestricted => None,
        };
        if let Some(oid) = oid {
            params.extended_key_usages = vec![ExtendedKeyUsagePurpose::Other(oid_arcs(oid))];
        }
        if let Some(group) = group {
            params
                .distinguished_name
                .push(DnType::OrganizationalUnitName, group.to_string());
        }
        params.use_authority_key_identifier_extension = true;
        let issued = params
            .signed_by(subject.key_pair(), &self.certificate, self.key.key_pair())
            .unwrap();
        Certificate::from_der(issued.der()).unwrap()
    }

    /// Identity chain for `subject`, leaf first
    pub fn issue_identity(&self, name: &str, subject: &KeyTestFixture) -> Vec<Certificate> {
        let leaf = self.issue_with_serial(name, subject, IssuedUsage::Identity, None, next_serial());
        vec![leaf, self.decoded.clone()]
    }

    /// Membership chain for `subject` in `group`, leaf first
    pub fn issue_membership(
        &self,
        name: &str,
        subject: &KeyTestFixture,
        group: GroupId,
    ) -> Vec<Certificate> {
        let leaf = self.issue_with_serial(
            name,
            subject,
            IssuedUsage::Membership,
            Some(group),
            next_serial(),
        );
        vec![leaf, self.decoded.clone()]
    }
}

impl std::fmt::Debug for AuthorityFixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorityFixture")
            .field("subject", &self.decoded.subject())
            .finish_non_exhaustive()
    }
}
