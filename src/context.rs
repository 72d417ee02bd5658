//! Per-session TLS context construction
//!
//! Each session gets its own context built from the shared credentials.
//! The factory pins the protocol version, installs the identity pair and
//! the trust material (trusted certificates and CRLs both land in the
//! context's verification store, through reference-counted handles, so
//! the credentials and every derived context keep them alive), maps the
//! client-auth policy onto the library's verification mode and registers
//! the observational verify callback that snapshots the peer certificate
//! into the session's cache.

use std::sync::{Arc, Mutex};

use openssl::ssl::{SslContext, SslContextBuilder, SslMethod, SslOptions, SslVerifyMode, SslVersion};
use openssl::x509::X509;

use crate::credentials::{ClientAuth, Credentials};
use crate::error::{Result, TlsError};
use crate::session::SessionType;

/// Per-session slot holding the most recently verified peer certificate.
/// Written by the verify callback, read by the owning session.
pub(crate) type PeerCertCache = Arc<Mutex<Option<X509>>>;

pub(crate) fn make_context(
    kind: SessionType,
    creds: &Credentials,
    peer_cert: &PeerCertCache,
) -> Result<SslContext> {
    let method = match kind {
        SessionType::Server => SslMethod::tls_server(),
        SessionType::Client => SslMethod::tls_client(),
    };
    let mut builder = SslContextBuilder::new(method)
        .map_err(|e| TlsError::from_stack("failed to initialize TLS context", e))?;
    builder.set_min_proto_version(Some(SslVersion::TLS1_2))?;
    builder.set_max_proto_version(Some(SslVersion::TLS1_2))?;

    let inner = &creds.inner;
    let verify_mode = match kind {
        SessionType::Server => {
            if inner.identity.is_none() {
                return Err(TlsError::Unexpected(
                    "cannot start a server session without a certificate/key pair".to_string(),
                ));
            }
            builder.set_options(SslOptions::ALL);
            match inner.client_auth {
                ClientAuth::None => SslVerifyMode::NONE,
                ClientAuth::Request => SslVerifyMode::PEER,
                ClientAuth::Require => {
                    SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT
                }
            }
        }
        // Clients always run chain verification; the session surfaces the
        // result from verify() after the handshake step succeeds.
        SessionType::Client => SslVerifyMode::NONE,
    };

    // Observational only: snapshot the chain element under verification
    // and return the library's own verdict unchanged.
    let cache = Arc::clone(peer_cert);
    builder.set_verify_callback(verify_mode, move |preverify, store_ctx| {
        if let Some(cert) = store_ctx.current_cert() {
            if let Ok(mut slot) = cache.lock() {
                *slot = Some(cert.to_owned());
            }
        }
        preverify
    });

    // Servers must supply an identity, clients may.
    if let Some(identity) = &inner.identity {
        builder.set_certificate(&identity.cert)?;
        builder.set_private_key(&identity.key)?;
        builder.check_private_key()?;
    }

    for cert in &inner.trust_certs {
        builder.cert_store_mut().add_cert(cert.clone())?;
    }
    for crl in &inner.crls {
        builder.cert_store_mut().add_crl(crl.clone())?;
    }
    if creds.need_load_system_trust() {
        builder
            .set_default_verify_paths()
            .map_err(|e| TlsError::from_stack("could not load system trust", e))?;
    }

    if let Some(priority) = &inner.priority {
        builder
            .set_cipher_list(priority)
            .map_err(|e| TlsError::from_stack("failed to set cipher priority list", e))?;
    }

    Ok(builder.build())
}
