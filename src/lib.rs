//! memtls - TLS sessions over in-memory BIOs
//!
//! This crate layers encrypted, bidirectional byte streams on top of a
//! plaintext buffer transport. The TLS protocol machine is delegated to
//! OpenSSL; the crate owns the session state machine that shuttles bytes
//! between the transport and the library through two in-memory BIOs, the
//! credentials model behind it, and peer-identity extraction.
//!
//! # Architecture
//!
//! 1. [`Credentials`] hold trust material, an optional identity pair, the
//!    client-auth policy and related knobs; built once, shared by many
//!    sessions.
//! 2. Each [`TlsSession`] derives its own TLS context from the
//!    credentials and drives the handshake, application I/O,
//!    renegotiation and shutdown over a [`transport::Source`] /
//!    [`transport::Sink`] pair it owns exclusively.
//! 3. The TLS library reads and writes ciphertext only through the
//!    session's in-memory BIOs; the session moves bytes between those
//!    BIOs and the transport, one in-flight operation per direction.
//!
//! # Example
//!
//! An encrypted loopback over the in-memory transport:
//!
//! ```no_run
//! use memtls::transport::mem;
//! use memtls::{CertFormat, Credentials, Packet, TlsOptions, TlsSession};
//!
//! # async fn run() {
//! let cert = std::fs::read("server-cert.pem").unwrap();
//! let key = std::fs::read("server-key.pem").unwrap();
//!
//! let server_creds = Credentials::builder()
//!     .set_key(&cert, &key, CertFormat::Pem).unwrap()
//!     .build();
//! let client_creds = Credentials::builder()
//!     .set_trust(&cert, CertFormat::Pem).unwrap()
//!     .build();
//!
//! let ((client_src, client_sink), (server_src, server_sink)) = mem::duplex(32);
//! let client =
//!     TlsSession::client(&client_creds, client_src, client_sink, TlsOptions::default()).unwrap();
//! let server =
//!     TlsSession::server(&server_creds, server_src, server_sink, TlsOptions::default()).unwrap();
//!
//! let (sent, received) = tokio::join!(client.put(Packet::from(&b"hello"[..])), server.get());
//! sent.unwrap();
//! assert_eq!(&received.unwrap()[..], b"hello");
//!
//! client.close();
//! server.close();
//! # }
//! ```

mod bio;
pub mod cert;
mod context;
pub mod credentials;
pub mod error;
pub mod session;
pub mod transport;

pub use cert::{CertInfo, SessionDn, SubjectAltName, SubjectAltNameKind};
pub use credentials::{
    CertFormat, ClientAuth, Credentials, CredentialsBuilder, DhLevel, DhParams, DnCallback,
};
pub use error::{codes, Result, TlsError};
pub use session::{SessionType, TlsOptions, TlsSession};
pub use transport::{Packet, Sink, Source};
