//! rcgen certificates for unit tests
#![allow(clippy::unwrap_used)]

use palisade_core::{EccPublicKey, GroupId};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyIdMethod, KeyPair, SerialNumber,
};
use std::sync::atomic::{AtomicU8, Ordering};

static NEXT_SERIAL: AtomicU8 = AtomicU8::new(1);

pub enum Usage {
    Identity,
    Membership,
}

fn params(name: &str, key: &KeyPair) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.distinguished_name.push(DnType::CommonName, name);
    params.serial_number = Some(SerialNumber::from(vec![
        0x01,
        NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
    ]));
    let key_id = EccPublicKey::from_spki_der(&key.public_key_der()).unwrap().key_id();
    params.key_identifier_method = KeyIdMethod::PreSpecified(key_id);
    params
}

pub fn self_signed(name: &str) -> (Certificate, KeyPair) {
    let key = KeyPair::generate().unwrap();
    let mut params = params(name, &key);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    (params.self_signed(&key).unwrap(), key)
}

pub fn issue(
    name: &str,
    usage: Usage,
    group: Option<GroupId>,
    issuer: &Certificate,
    issuer_key: &KeyPair,
) -> (Certificate, KeyPair) {
    let key = KeyPair::generate().unwrap();
    let mut params = params(name, &key);
    let oid = match usage {
        Usage::Identity => vec![1, 3, 6, 1, 4, 1, 44924, 1, 1],
        Usage::Membership => vec![1, 3, 6, 1, 4, 1, 44924, 1, 2],
    };
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::Other(oid)];
    if let Some(group) = group {
        params
            .distinguished_name
            .push(DnType::OrganizationalUnitName, group.to_string());
    }
    params.use_authority_key_identifier_extension = true;
    (params.signed_by(&key, issuer, issuer_key).unwrap(), key)
}
