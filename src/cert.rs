//! Certificate identity extraction
//!
//! Helpers for pulling identity information out of X.509 certificates:
//! serial and expiry records, RFC 2253 distinguished-name strings and
//! subject-alternative-name enumeration. These operate on certificates
//! captured from a peer during verification as well as on locally
//! installed identities.

use std::collections::HashSet;
use std::net::IpAddr;

use openssl::nid::Nid;
use openssl::x509::{GeneralNameRef, X509NameRef, X509Ref};

use crate::error::Result;

/// Serial numbers longer than this are truncated to their leading bytes.
const SERIAL_MAX: usize = 160;

/// Serial number and expiry of one certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    /// Big-endian serial bytes, at most [`SERIAL_MAX`] of them.
    pub serial: Vec<u8>,
    /// Expiry as seconds since the Unix epoch, or -1 when unavailable.
    pub expiry: i64,
}

impl CertInfo {
    pub fn from_x509(cert: &X509Ref) -> Result<Self> {
        let mut serial = cert.serial_number().to_bn()?.to_vec();
        serial.truncate(SERIAL_MAX);
        Ok(CertInfo {
            serial,
            expiry: expiry_epoch(cert),
        })
    }
}

/// Subject and issuer of a peer certificate, RFC 2253 formatted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDn {
    pub subject: String,
    pub issuer: String,
}

/// Tag of a subject-alternative-name entry, used to filter enumeration.
///
/// Only tags whose value the TLS library exposes are modeled. `otherName`
/// entries carry no readable value through the library and are skipped
/// during enumeration, like any unrecognized tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectAltNameKind {
    DnsName,
    Rfc822Name,
    Uri,
    IpAddress,
    Dn,
}

/// One subject-alternative-name entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectAltName {
    DnsName(String),
    Rfc822Name(String),
    Uri(String),
    IpAddress(IpAddr),
    Dn(String),
}

impl SubjectAltName {
    pub fn kind(&self) -> SubjectAltNameKind {
        match self {
            SubjectAltName::DnsName(_) => SubjectAltNameKind::DnsName,
            SubjectAltName::Rfc822Name(_) => SubjectAltNameKind::Rfc822Name,
            SubjectAltName::Uri(_) => SubjectAltNameKind::Uri,
            SubjectAltName::IpAddress(_) => SubjectAltNameKind::IpAddress,
            SubjectAltName::Dn(_) => SubjectAltNameKind::Dn,
        }
    }
}

/// Seconds since the Unix epoch at which the certificate expires.
fn expiry_epoch(cert: &X509Ref) -> i64 {
    let Ok(epoch) = openssl::asn1::Asn1Time::from_unix(0) else {
        return -1;
    };
    match epoch.diff(cert.not_after()) {
        Ok(diff) => i64::from(diff.days) * 86_400 + i64::from(diff.secs),
        Err(_) => -1,
    }
}

/// Extract subject and issuer DN strings from a certificate.
pub(crate) fn extract_dn(cert: &X509Ref) -> SessionDn {
    SessionDn {
        subject: dn_string(cert.subject_name()),
        issuer: dn_string(cert.issuer_name()),
    }
}

/// Print an X.509 name per RFC 2253: comma-separated components in
/// certificate order, short field names, unknown or non-textual fields
/// dumped as `OID=#hex`.
pub(crate) fn dn_string(name: &X509NameRef) -> String {
    let mut parts = Vec::new();
    for entry in name.entries() {
        let obj = entry.object();
        let nid = obj.nid();
        let key = if nid == Nid::UNDEF {
            obj.to_string()
        } else {
            nid.short_name()
                .map(str::to_string)
                .unwrap_or_else(|_| obj.to_string())
        };
        let value = if nid == Nid::UNDEF {
            dump_value(entry.data().as_slice())
        } else {
            match entry.data().as_utf8() {
                Ok(text) => escape_rfc2253(&text),
                Err(_) => dump_value(entry.data().as_slice()),
            }
        };
        parts.push(format!("{key}={value}"));
    }
    parts.join(",")
}

fn dump_value(data: &[u8]) -> String {
    let mut out = String::with_capacity(1 + data.len() * 2);
    out.push('#');
    for byte in data {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn escape_rfc2253(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        let needs_escape = match c {
            '"' | '+' | ',' | ';' | '<' | '>' | '\\' => true,
            '#' => i == 0,
            ' ' => i == 0 || i == last,
            _ => false,
        };
        if needs_escape {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Enumerate the certificate's subject-alternative-name entries, keeping
/// only the kinds in `filter` (an empty filter keeps everything).
/// Entries whose tag the library does not expose are skipped.
pub(crate) fn alt_names(
    cert: &X509Ref,
    filter: &HashSet<SubjectAltNameKind>,
) -> Vec<SubjectAltName> {
    let Some(names) = cert.subject_alt_names() else {
        return Vec::new();
    };
    names
        .iter()
        .filter_map(san_from_general_name)
        .filter(|san| filter.is_empty() || filter.contains(&san.kind()))
        .collect()
}

fn san_from_general_name(name: &GeneralNameRef) -> Option<SubjectAltName> {
    if let Some(dns) = name.dnsname() {
        Some(SubjectAltName::DnsName(dns.to_string()))
    } else if let Some(email) = name.email() {
        Some(SubjectAltName::Rfc822Name(email.to_string()))
    } else if let Some(uri) = name.uri() {
        Some(SubjectAltName::Uri(uri.to_string()))
    } else if let Some(ip) = name.ipaddress() {
        match ip.len() {
            4 => {
                let octets: [u8; 4] = ip.try_into().ok()?;
                Some(SubjectAltName::IpAddress(IpAddr::from(octets)))
            }
            16 => {
                let octets: [u8; 16] = ip.try_into().ok()?;
                Some(SubjectAltName::IpAddress(IpAddr::from(octets)))
            }
            _ => None,
        }
    } else if let Some(dir) = name.directory_name() {
        Some(SubjectAltName::Dn(dn_string(dir)))
    } else {
        None
    }
}
