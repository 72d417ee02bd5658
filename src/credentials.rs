//! Certificate credentials
//!
//! [`Credentials`] owns the material a session authenticates with: a set
//! of trusted certificates and CRLs, optionally an identity (certificate
//! plus matching private key), the client-auth policy, an optional cipher
//! priority string and an optional DN-verification callback. Credentials
//! are assembled through [`CredentialsBuilder`] (pure configuration, no
//! I/O) and are immutable afterwards, so one credentials value can safely
//! back any number of concurrent sessions.

use std::sync::Arc;

use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509, X509Crl};

use crate::cert::CertInfo;
use crate::error::{Result, TlsError};
use crate::session::SessionType;

/// Encoding of certificate, key and CRL blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertFormat {
    /// PEM; containers may hold multiple entries, all are consumed.
    Pem,
    /// DER; exactly one entry.
    Der,
}

/// Server-side client certificate policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuth {
    /// Do not request a client certificate.
    None,
    /// Request a certificate but accept its absence.
    Request,
    /// Request a certificate and fail the handshake without one.
    Require,
}

/// Callback invoked after successful peer verification with the session
/// role and the peer's subject and issuer DN strings.
pub type DnCallback = Arc<dyn Fn(SessionType, &str, &str) + Send + Sync>;

/// Strength selector for default Diffie-Hellman parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhLevel {
    Legacy,
    Medium,
    High,
    Ultra,
}

/// Diffie-Hellman parameter handle. Advisory: retained with the
/// credentials but the TLS library's built-in parameters take precedence.
#[derive(Debug, Clone)]
pub struct DhParams {
    level: DhLevel,
    blob: Option<Vec<u8>>,
}

impl DhParams {
    pub fn new(level: DhLevel) -> Self {
        DhParams { level, blob: None }
    }

    pub fn from_blob(blob: &[u8], _format: CertFormat) -> Self {
        DhParams {
            level: DhLevel::Medium,
            blob: Some(blob.to_vec()),
        }
    }

    pub fn level(&self) -> DhLevel {
        self.level
    }

    pub fn is_explicit(&self) -> bool {
        self.blob.is_some()
    }
}

impl Default for DhParams {
    fn default() -> Self {
        DhParams::new(DhLevel::Medium)
    }
}

pub(crate) struct Identity {
    pub(crate) cert: X509,
    pub(crate) key: PKey<Private>,
}

pub(crate) struct CredentialsInner {
    pub(crate) trust_certs: Vec<X509>,
    pub(crate) crls: Vec<X509Crl>,
    pub(crate) identity: Option<Identity>,
    pub(crate) client_auth: ClientAuth,
    pub(crate) priority: Option<String>,
    pub(crate) dn_callback: Option<DnCallback>,
    pub(crate) load_system_trust: bool,
    #[allow(dead_code)]
    pub(crate) dh_params: DhParams,
}

/// Immutable, cheaply clonable credentials handle.
#[derive(Clone)]
pub struct Credentials {
    pub(crate) inner: Arc<CredentialsInner>,
}

impl Credentials {
    pub fn builder() -> CredentialsBuilder {
        CredentialsBuilder::new()
    }

    /// Serial and expiry of the installed identity certificate, if any.
    pub fn get_cert_info(&self) -> Option<Vec<CertInfo>> {
        let identity = self.inner.identity.as_ref()?;
        CertInfo::from_x509(&identity.cert).ok().map(|info| vec![info])
    }

    /// Serial and expiry of every certificate in the trust set.
    pub fn get_trust_list_info(&self) -> Option<Vec<CertInfo>> {
        self.inner
            .trust_certs
            .iter()
            .map(|cert| CertInfo::from_x509(cert).ok())
            .collect()
    }

    /// Whether sessions built from these credentials also load the
    /// platform's default trust paths.
    pub fn need_load_system_trust(&self) -> bool {
        self.inner.load_system_trust
    }

    pub fn client_auth(&self) -> ClientAuth {
        self.inner.client_auth
    }

    pub(crate) fn has_identity(&self) -> bool {
        self.inner.identity.is_some()
    }
}

/// Builder facade installing material into a credentials value.
pub struct CredentialsBuilder {
    inner: CredentialsInner,
}

impl Default for CredentialsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialsBuilder {
    pub fn new() -> Self {
        CredentialsBuilder {
            inner: CredentialsInner {
                trust_certs: Vec::new(),
                crls: Vec::new(),
                identity: None,
                client_auth: ClientAuth::None,
                priority: None,
                dn_callback: None,
                load_system_trust: false,
                dh_params: DhParams::default(),
            },
        }
    }

    /// Install one or more trusted certificates. PEM containers are
    /// iterated in full; DER blobs hold a single certificate.
    pub fn set_trust(mut self, blob: &[u8], format: CertFormat) -> Result<Self> {
        let certs = match format {
            CertFormat::Pem => X509::stack_from_pem(blob)
                .map_err(|e| TlsError::from_stack("failed to parse trust certificates", e))?,
            CertFormat::Der => vec![X509::from_der(blob)
                .map_err(|e| TlsError::from_stack("failed to parse trust certificate", e))?],
        };
        if certs.is_empty() {
            return Err(TlsError::Unexpected(
                "trust blob contained no certificates".to_string(),
            ));
        }
        self.inner.trust_certs.extend(certs);
        Ok(self)
    }

    /// Install one or more certificate revocation lists.
    pub fn set_crl(mut self, blob: &[u8], format: CertFormat) -> Result<Self> {
        let crls = match format {
            CertFormat::Pem => {
                let mut crls = Vec::new();
                for block in pem_blocks(blob, "X509 CRL") {
                    crls.push(
                        X509Crl::from_pem(block)
                            .map_err(|e| TlsError::from_stack("failed to parse CRL", e))?,
                    );
                }
                crls
            }
            CertFormat::Der => vec![X509Crl::from_der(blob)
                .map_err(|e| TlsError::from_stack("failed to parse CRL", e))?],
        };
        if crls.is_empty() {
            return Err(TlsError::Unexpected("blob contained no CRLs".to_string()));
        }
        self.inner.crls.extend(crls);
        Ok(self)
    }

    /// Install an identity: certificate plus matching private key. The
    /// pairing is verified here; a mismatch leaves the builder unchanged.
    pub fn set_key(mut self, cert_blob: &[u8], key_blob: &[u8], format: CertFormat) -> Result<Self> {
        let cert = match format {
            CertFormat::Pem => X509::from_pem(cert_blob),
            CertFormat::Der => X509::from_der(cert_blob),
        }
        .map_err(|e| TlsError::from_stack("failed to parse identity certificate", e))?;
        let key = match format {
            CertFormat::Pem => PKey::private_key_from_pem(key_blob),
            CertFormat::Der => PKey::private_key_from_der(key_blob),
        }
        .map_err(|e| TlsError::from_stack("failed to parse private key", e))?;
        check_pairing(&cert, &key)?;
        self.inner.identity = Some(Identity { cert, key });
        Ok(self)
    }

    /// Install an identity from a PKCS#12 archive. Chain certificates in
    /// the archive are added to the trust set. The archive encoding is
    /// always DER regardless of `format`.
    pub fn set_pkcs12(mut self, blob: &[u8], _format: CertFormat, password: &str) -> Result<Self> {
        let parsed = Pkcs12::from_der(blob)
            .map_err(|e| TlsError::from_stack("failed to parse PKCS#12 archive", e))?
            .parse2(password)
            .map_err(|e| TlsError::from_stack("failed to decrypt PKCS#12 archive", e))?;
        let (Some(cert), Some(key)) = (parsed.cert, parsed.pkey) else {
            return Err(TlsError::Unexpected(
                "PKCS#12 archive held no identity".to_string(),
            ));
        };
        check_pairing(&cert, &key)?;
        self.inner.identity = Some(Identity { cert, key });
        if let Some(chain) = parsed.ca {
            for chain_cert in chain {
                self.inner.trust_certs.push(chain_cert);
            }
        }
        Ok(self)
    }

    pub fn set_client_auth(mut self, mode: ClientAuth) -> Self {
        self.inner.client_auth = mode;
        self
    }

    /// Cipher priority string, handed verbatim to the TLS library when a
    /// session context is built. Rejection surfaces at session creation.
    pub fn set_priority(mut self, priority: impl Into<String>) -> Self {
        self.inner.priority = Some(priority.into());
        self
    }

    pub fn set_dn_verification_callback(mut self, callback: DnCallback) -> Self {
        self.inner.dn_callback = Some(callback);
        self
    }

    /// Also load the platform's default trust paths into every session
    /// context built from these credentials.
    pub fn enable_system_trust(mut self) -> Self {
        self.inner.load_system_trust = true;
        self
    }

    pub fn dh_params(mut self, dh: DhParams) -> Self {
        self.inner.dh_params = dh;
        self
    }

    pub fn build(self) -> Credentials {
        Credentials {
            inner: Arc::new(self.inner),
        }
    }
}

fn check_pairing(cert: &X509, key: &PKey<Private>) -> Result<()> {
    let cert_key = cert
        .public_key()
        .map_err(|e| TlsError::from_stack("identity certificate has no public key", e))?;
    if !cert_key.public_eq(key) {
        return Err(TlsError::Unexpected(
            "certificate does not match private key".to_string(),
        ));
    }
    Ok(())
}

/// Split a PEM container into the blocks carrying the given label.
fn pem_blocks<'a>(blob: &'a [u8], label: &str) -> Vec<&'a [u8]> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");
    let Ok(text) = std::str::from_utf8(blob) else {
        return Vec::new();
    };
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(&begin) {
        let Some(stop) = rest[start..].find(&end) else {
            break;
        };
        let stop = start + stop + end.len();
        blocks.push(rest[start..stop].as_bytes());
        rest = &rest[stop..];
    }
    blocks
}
