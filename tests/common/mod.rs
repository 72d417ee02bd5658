//! Shared test fixtures: a throwaway PKI minted at runtime.

use std::sync::atomic::{AtomicU32, Ordering};

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{BasicConstraints, SubjectAlternativeName};
use openssl::x509::{X509, X509Builder, X509NameBuilder};

static NEXT_SERIAL: AtomicU32 = AtomicU32::new(1);

pub struct TestIdentity {
    pub cert: X509,
    pub key: PKey<Private>,
}

impl TestIdentity {
    pub fn cert_pem(&self) -> Vec<u8> {
        self.cert.to_pem().unwrap()
    }

    pub fn key_pem(&self) -> Vec<u8> {
        self.key.private_key_to_pem_pkcs8().unwrap()
    }
}

fn mint(cn: &str, issuer: Option<&TestIdentity>, is_ca: bool) -> TestIdentity {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut subject = X509NameBuilder::new().unwrap();
    subject.append_entry_by_text("CN", cn).unwrap();
    subject.append_entry_by_text("O", "memtls test pki").unwrap();
    let subject = subject.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(NEXT_SERIAL.fetch_add(1, Ordering::Relaxed))
        .unwrap()
        .to_asn1_integer()
        .unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&subject).unwrap();
    match issuer {
        Some(ca) => builder.set_issuer_name(ca.cert.subject_name()).unwrap(),
        None => builder.set_issuer_name(&subject).unwrap(),
    }
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(30).unwrap())
        .unwrap();

    if is_ca {
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
    } else {
        let san = SubjectAlternativeName::new()
            .dns(cn)
            .build(&builder.x509v3_context(None, None))
            .unwrap();
        builder.append_extension(san).unwrap();
    }

    let signing_key = issuer.map(|ca| &ca.key).unwrap_or(&key);
    builder.sign(signing_key, MessageDigest::sha256()).unwrap();

    TestIdentity {
        cert: builder.build(),
        key,
    }
}

/// Self-signed end-entity certificate with a DNS SAN for `cn`.
pub fn self_signed(cn: &str) -> TestIdentity {
    mint(cn, None, false)
}

/// Self-signed certificate authority.
pub fn authority(cn: &str) -> TestIdentity {
    mint(cn, None, true)
}

/// End-entity certificate issued by `ca`.
pub fn issued(ca: &TestIdentity, cn: &str) -> TestIdentity {
    mint(cn, Some(ca), false)
}
