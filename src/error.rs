//! Error model for TLS sessions
//!
//! Fatal session errors are latched: the first one is captured by the
//! session and every subsequent API call reproduces it, so the error type
//! is cheaply clonable. TLS-library failures drain the library's error
//! queue and carry the packed error codes alongside the rendered message;
//! consumers can match the codes against the constants in [`codes`].

use std::sync::Arc;

use openssl::error::ErrorStack;

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;

/// TLS session errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum TlsError {
    /// Failure reported by the TLS library, with the drained error-queue
    /// codes in the order they were raised.
    #[error("{message}")]
    Tls { message: String, codes: Vec<u64> },

    /// Peer verification failed during the handshake.
    #[error("verification failed: {0}")]
    Verification(String),

    /// System error surfaced by the TLS library (`SSL_ERROR_SYSCALL`).
    #[error("{context}: {error}")]
    Syscall {
        context: &'static str,
        error: Arc<std::io::Error>,
    },

    /// Error raised by the underlying transport.
    #[error("transport error: {0}")]
    Io(Arc<std::io::Error>),

    /// Write attempted after the session was shut down.
    #[error("broken pipe")]
    BrokenPipe,

    /// Identity query attempted after the session was shut down.
    #[error("not connected")]
    NotConnected,

    /// The transport reached end-of-stream in the middle of a handshake.
    #[error("end of stream encountered during handshake")]
    UnexpectedEof,

    /// Error condition the TLS library did not classify.
    #[error("{0}")]
    Unexpected(String),
}

impl TlsError {
    /// Build a TLS error from an explicit error stack.
    pub(crate) fn from_stack(message: &str, stack: ErrorStack) -> Self {
        let codes = stack
            .errors()
            .iter()
            .map(|e| e.code() as u64)
            .collect::<Vec<_>>();
        let message = if codes.is_empty() {
            message.to_string()
        } else {
            format!("{message}: {stack}")
        };
        TlsError::Tls { message, codes }
    }

    /// Build a TLS error by draining the thread's library error queue.
    pub(crate) fn tls(message: &str) -> Self {
        Self::from_stack(message, ErrorStack::get())
    }

    pub(crate) fn syscall(context: &'static str, error: std::io::Error) -> Self {
        TlsError::Syscall {
            context,
            error: Arc::new(error),
        }
    }

    /// Packed TLS-library error codes attached to this error, if any.
    pub fn codes(&self) -> &[u64] {
        match self {
            TlsError::Tls { codes, .. } => codes,
            _ => &[],
        }
    }

    /// Whether this error came out of peer verification.
    pub fn is_verification(&self) -> bool {
        matches!(self, TlsError::Verification(_))
    }

    /// The raw OS error behind this error, when one applies.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            TlsError::Syscall { error, .. } => error.raw_os_error(),
            TlsError::Io(error) => error.raw_os_error(),
            TlsError::BrokenPipe => Some(libc::EPIPE),
            TlsError::NotConnected | TlsError::UnexpectedEof => Some(libc::ENOTCONN),
            _ => None,
        }
    }
}

impl From<ErrorStack> for TlsError {
    fn from(stack: ErrorStack) -> Self {
        TlsError::from_stack("TLS library error", stack)
    }
}

impl From<std::io::Error> for TlsError {
    fn from(error: std::io::Error) -> Self {
        TlsError::Io(Arc::new(error))
    }
}

/// Packed error codes for protocol-semantic failures.
///
/// The values use the library's packing scheme (library id in the high
/// bits, reason code in the low 23), so they compare equal to the codes
/// carried by [`TlsError::codes`] when the corresponding failure occurs.
pub mod codes {
    const fn pack(lib: u64, reason: u64) -> u64 {
        (lib << 23) | (reason & 0x7f_ffff)
    }

    const ERR_LIB_SSL: u64 = 20;
    const ERR_LIB_RSA: u64 = 4;

    // Reason codes per OpenSSL sslerr.h / rsaerr.h.
    pub const UNKNOWN_COMPRESSION_ALGORITHM: u64 = pack(ERR_LIB_SSL, 257);
    pub const UNKNOWN_CIPHER_TYPE: u64 = pack(ERR_LIB_SSL, 249);
    pub const INVALID_SESSION: u64 = pack(ERR_LIB_SSL, 999);
    pub const UNEXPECTED_HANDSHAKE_PACKET: u64 = pack(ERR_LIB_SSL, 245);
    pub const UNKNOWN_CIPHER_SUITE: u64 = pack(ERR_LIB_SSL, 258);
    pub const UNKNOWN_ALGORITHM: u64 = pack(ERR_LIB_RSA, 117);
    pub const UNSUPPORTED_SIGNATURE_ALGORITHM: u64 = pack(ERR_LIB_SSL, 360);
    pub const SAFE_RENEGOTIATION_FAILED: u64 = pack(ERR_LIB_SSL, 337);
    pub const UNSAFE_RENEGOTIATION_DENIED: u64 = pack(ERR_LIB_SSL, 338);
    pub const UNKNOWN_SRP_USERNAME: u64 = pack(ERR_LIB_SSL, 357);
    pub const PREMATURE_TERMINATION: u64 = pack(ERR_LIB_SSL, 294);
    pub const PUSH: u64 = pack(ERR_LIB_SSL, 128);
    pub const PULL: u64 = pack(ERR_LIB_SSL, 211);
    pub const UNEXPECTED_PACKET: u64 = pack(ERR_LIB_SSL, 244);
    pub const UNSUPPORTED_VERSION: u64 = pack(ERR_LIB_SSL, 259);
    pub const NO_CIPHER_SUITES: u64 = pack(ERR_LIB_SSL, 181);
    pub const DECRYPTION_FAILED: u64 = pack(ERR_LIB_SSL, 147);
    pub const MAC_VERIFY_FAILED: u64 = pack(ERR_LIB_SSL, 281);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_are_clonable() {
        let err = TlsError::Verification("no certificate presented by peer".to_string());
        let copy = err.clone();
        assert!(copy.is_verification());
        assert!(copy.to_string().contains("no certificate presented by peer"));
    }

    #[test]
    fn test_raw_os_error_mapping() {
        assert_eq!(TlsError::BrokenPipe.raw_os_error(), Some(libc::EPIPE));
        assert_eq!(TlsError::NotConnected.raw_os_error(), Some(libc::ENOTCONN));
        assert_eq!(
            TlsError::Unexpected("boom".to_string()).raw_os_error(),
            None
        );
    }

    #[test]
    fn test_code_packing_keeps_library_id() {
        // All SSL-library constants share the same high bits.
        let lib = codes::PREMATURE_TERMINATION >> 23;
        assert_eq!(codes::DECRYPTION_FAILED >> 23, lib);
        assert_ne!(codes::UNKNOWN_ALGORITHM >> 23, lib);
    }

    #[test]
    fn test_from_stack_without_codes() {
        let err = TlsError::from_stack("handshake failed", ErrorStack::get());
        assert!(err.codes().is_empty());
        assert_eq!(err.to_string(), "handshake failed");
    }
}
