//! TLS session engine
//!
//! A [`TlsSession`] layers an encrypted bidirectional byte stream over a
//! plaintext transport. The TLS library never sees the transport: it reads
//! and writes ciphertext through two in-memory BIOs, and the session
//! shuttles bytes between those BIOs and the transport's source and sink,
//! interleaving handshakes (including mid-stream renegotiation) with
//! application data.
//!
//! Concurrency model: single in-flight operation per direction. A read
//! semaphore serializes the inbound path (`do_get`, `perform_pull`,
//! `wait_for_eof`) and a write semaphore the outbound path (`do_put`,
//! `perform_push`, `do_shutdown`, `flush`); handshakes take both, read
//! first. The first fatal error is latched and reproduced by every
//! subsequent call.

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as SyncMutex};
use std::time::Duration;

use bytes::{Buf, Bytes};
use openssl::error::ErrorStack;
use openssl::ssl::{ErrorCode, ShutdownResult, Ssl, SslStream};
use openssl::x509::X509VerifyResult;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, trace};

use crate::bio::{BioPair, MemoryBio};
use crate::cert::{self, SessionDn, SubjectAltName, SubjectAltNameKind};
use crate::context::{make_context, PeerCertCache};
use crate::credentials::{ClientAuth, Credentials};
use crate::error::{Result, TlsError};
use crate::transport::{Packet, Sink, Source};

/// Session role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    Client,
    Server,
}

/// Per-session options.
#[derive(Debug, Clone)]
pub struct TlsOptions {
    /// SNI host name sent in the ClientHello (clients only).
    pub server_name: Option<String>,
    /// Whether `shutdown` waits for the peer's close notify after sending
    /// its own.
    pub wait_for_eof_on_shutdown: bool,
}

impl Default for TlsOptions {
    fn default() -> Self {
        TlsOptions {
            server_name: None,
            wait_for_eof_on_shutdown: true,
        }
    }
}

/// Packets at most this large are linearized before encryption so they
/// fit a single TLS record.
const MAX_RECORD_SIZE: usize = 16 * 1024;

/// How long `close` lets the bye handshake run before forcing the
/// transport shut.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

const ENGINE_POISONED: &str = "ssl engine lock poisoned";

struct ReadHalf<S> {
    source: S,
    /// Transport bytes received but not yet fed into the inbound BIO.
    input: Bytes,
}

struct WriteHalf<K> {
    sink: K,
    /// Staged outbound message; the slot is emptied before any new
    /// transport write is issued.
    pending: Option<Packet>,
}

/// Classified failure of one TLS library call.
enum SslFailure {
    ZeroReturn,
    WantRead,
    WantWrite,
    Syscall(Option<io::Error>),
    Protocol { reason: SslReason, error: TlsError },
    Other(String),
}

#[derive(PartialEq, Eq)]
enum SslReason {
    UnexpectedEof,
    Verification,
    Other,
}

fn classify(err: openssl::ssl::Error, context: &str) -> SslFailure {
    match err.code() {
        ErrorCode::ZERO_RETURN => SslFailure::ZeroReturn,
        ErrorCode::WANT_READ => SslFailure::WantRead,
        ErrorCode::WANT_WRITE => SslFailure::WantWrite,
        ErrorCode::SYSCALL => SslFailure::Syscall(err.into_io_error().ok()),
        ErrorCode::SSL => {
            let stack = err.ssl_error().cloned().unwrap_or_else(ErrorStack::get);
            SslFailure::Protocol {
                reason: reason_of(&stack),
                error: TlsError::from_stack(context, stack),
            }
        }
        code => SslFailure::Other(format!("unexpected TLS engine state ({code:?}): {err}")),
    }
}

fn reason_of(stack: &ErrorStack) -> SslReason {
    for error in stack.errors() {
        match error.reason() {
            Some("unexpected eof while reading") => return SslReason::UnexpectedEof,
            Some("certificate verify failed")
            | Some("peer did not return a certificate")
            | Some("no certificates returned") => return SslReason::Verification,
            _ => {}
        }
    }
    SslReason::Other
}

/// One TLS session over an owned transport.
pub struct TlsSession<S: Source, K: Sink> {
    kind: SessionType,
    options: TlsOptions,
    creds: Credentials,
    peer_cert: PeerCertCache,
    engine: SyncMutex<SslStream<MemoryBio>>,
    bios: BioPair,
    read_half: AsyncMutex<ReadHalf<S>>,
    write_half: AsyncMutex<WriteHalf<K>>,
    latch: SyncMutex<Option<TlsError>>,
    shutdown_flag: AtomicBool,
}

impl<S: Source, K: Sink> TlsSession<S, K> {
    /// Wrap the client side of a connected transport.
    pub fn client(
        creds: &Credentials,
        source: S,
        sink: K,
        options: TlsOptions,
    ) -> Result<Arc<Self>> {
        Self::new(SessionType::Client, creds, source, sink, options)
    }

    /// Wrap the server side of a connected transport.
    pub fn server(
        creds: &Credentials,
        source: S,
        sink: K,
        options: TlsOptions,
    ) -> Result<Arc<Self>> {
        Self::new(SessionType::Server, creds, source, sink, options)
    }

    fn new(
        kind: SessionType,
        creds: &Credentials,
        source: S,
        sink: K,
        options: TlsOptions,
    ) -> Result<Arc<Self>> {
        let peer_cert: PeerCertCache = Arc::new(SyncMutex::new(None));
        let ctx = make_context(kind, creds, &peer_cert)?;
        let mut ssl = Ssl::new(&ctx)
            .map_err(|e| TlsError::from_stack("failed to create TLS session", e))?;
        match kind {
            SessionType::Server => ssl.set_accept_state(),
            SessionType::Client => {
                if let Some(name) = &options.server_name {
                    ssl.set_hostname(name)
                        .map_err(|e| TlsError::from_stack("failed to set SNI host name", e))?;
                }
                ssl.set_connect_state();
            }
        }

        // The stream takes ownership of the BIO adapter; the session keeps
        // only the non-owning handles.
        let bios = BioPair::new();
        let stream = SslStream::new(ssl, bios.adapter())
            .map_err(|e| TlsError::from_stack("failed to attach session BIOs", e))?;

        trace!(role = ?kind, "session created");
        Ok(Arc::new(TlsSession {
            kind,
            options,
            creds: creds.clone(),
            peer_cert,
            engine: SyncMutex::new(stream),
            bios,
            read_half: AsyncMutex::new(ReadHalf {
                source,
                input: Bytes::new(),
            }),
            write_half: AsyncMutex::new(WriteHalf { sink, pending: None }),
            latch: SyncMutex::new(None),
            shutdown_flag: AtomicBool::new(false),
        }))
    }

    /// Whether the transport has reached end-of-stream.
    pub fn eof(&self) -> bool {
        self.bios.eof()
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::SeqCst)
    }

    fn connected(&self) -> bool {
        self.with_ssl(|stream| stream.ssl().is_init_finished())
    }

    fn ssl_pending(&self) -> usize {
        self.with_ssl(|stream| stream.ssl().pending())
    }

    fn with_ssl<T>(&self, f: impl FnOnce(&mut SslStream<MemoryBio>) -> T) -> T {
        f(&mut self.engine.lock().expect(ENGINE_POISONED))
    }

    fn latched(&self) -> Option<TlsError> {
        self.latch.lock().expect("error latch poisoned").clone()
    }

    /// Latch `err` unless an earlier error already stuck; returns the
    /// latched value so callers fail with the sticky error.
    fn latch_error(&self, err: TlsError) -> TlsError {
        let mut latch = self.latch.lock().expect("error latch poisoned");
        let sticky = latch.get_or_insert_with(|| {
            debug!(role = ?self.kind, error = %err, "session error latched");
            err
        });
        sticky.clone()
    }

    // ------------------------------------------------------------------
    // Outbound shuttle
    // ------------------------------------------------------------------

    /// Complete the staged transport write, if one exists. The slot is
    /// taken before awaiting so no second write can start in between.
    async fn wait_for_output(&self, wr: &mut WriteHalf<K>) -> Result<()> {
        let Some(msg) = wr.pending.take() else {
            return Ok(());
        };
        trace!(len = msg.len(), "wait_for_output");
        match wr.sink.put(msg).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.latch_error(TlsError::from(e))),
        }
    }

    /// Drain the outbound BIO into a scattered message and stage it as the
    /// pending transport write.
    async fn perform_push(&self, wr: &mut WriteHalf<K>) -> Result<()> {
        self.wait_for_output(wr).await?;
        let mut msg = Packet::new();
        while self.bios.outbound.pending() > 0 {
            msg.push(self.bios.outbound.drain());
        }
        trace!(len = msg.len(), "perform_push");
        if !msg.is_empty() {
            wr.pending = Some(msg);
        }
        Ok(())
    }

    /// Push pending ciphertext, if any, and wait for it to be written.
    /// Returns whether any bytes were sent.
    async fn maybe_push_with_wait(&self, wr: &mut WriteHalf<K>) -> Result<bool> {
        if self.bios.outbound.pending() == 0 {
            trace!("maybe_push: nothing to send");
            return Ok(false);
        }
        self.perform_push(wr).await?;
        self.wait_for_output(wr).await?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Inbound shuttle
    // ------------------------------------------------------------------

    /// Ensure the pending-input buffer holds data, requesting one buffer
    /// from the source when empty. An empty buffer latches EOF.
    async fn wait_for_input(&self, rd: &mut ReadHalf<S>) -> Result<()> {
        if !rd.input.is_empty() {
            return Ok(());
        }
        match rd.source.get().await {
            Ok(buf) => {
                if buf.is_empty() {
                    trace!("transport EOF");
                    self.bios.set_eof();
                }
                rd.input = buf;
                Ok(())
            }
            Err(e) => Err(self.latch_error(TlsError::from(e))),
        }
    }

    /// Feed buffered transport bytes into the inbound BIO.
    async fn perform_pull(&self, rd: &mut ReadHalf<S>) -> Result<()> {
        self.wait_for_input(rd).await?;
        trace!(buffered = rd.input.len(), "perform_pull");
        if self.eof() || rd.input.is_empty() {
            self.bios.set_eof();
            return Ok(());
        }
        while !rd.input.is_empty() {
            let n = self.bios.inbound.feed(&rd.input);
            if n == 0 {
                return Err(
                    self.latch_error(TlsError::tls("error while inserting into inbound BIO"))
                );
            }
            rd.input.advance(n);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Handshake
    // ------------------------------------------------------------------

    /// Drive the handshake (or an in-progress renegotiation) to
    /// completion, holding both direction semaphores.
    pub async fn handshake(&self) -> Result<()> {
        trace!(role = ?self.kind, "handshake");
        let mut rd = self.read_half.lock().await;
        let mut wr = self.write_half.lock().await;
        match self.do_handshake(&mut rd, &mut wr).await {
            Ok(()) => Ok(()),
            Err(err) => Err(self.latch_error(err)),
        }
    }

    async fn do_handshake(&self, rd: &mut ReadHalf<S>, wr: &mut WriteHalf<K>) -> Result<()> {
        loop {
            if self.connected() {
                return Ok(());
            }
            if self.eof() {
                return Err(TlsError::UnexpectedEof);
            }
            let step = self.with_ssl(|stream| stream.do_handshake());
            match step {
                Ok(()) => {
                    if self.kind == SessionType::Client
                        || self.creds.client_auth() != ClientAuth::None
                    {
                        self.verify()?;
                    }
                    self.maybe_push_with_wait(wr).await?;
                    debug!(role = ?self.kind, "handshake complete");
                    return Ok(());
                }
                Err(err) => match classify(err, "failed to establish TLS handshake") {
                    SslFailure::ZeroReturn => {
                        // Peer closed mid-handshake.
                        self.bios.set_eof();
                        return Ok(());
                    }
                    SslFailure::WantRead | SslFailure::WantWrite => {
                        // Flush our flight first, then wait for the peer's.
                        self.maybe_push_with_wait(wr).await?;
                        self.perform_pull(rd).await?;
                    }
                    SslFailure::Syscall(io_err) => {
                        return Err(self.latch_error(TlsError::syscall(
                            "system error encountered during handshake",
                            io_err.unwrap_or_else(|| io::Error::other("unidentified")),
                        )));
                    }
                    SslFailure::Protocol { reason, error } => match reason {
                        SslReason::UnexpectedEof => {
                            self.bios.set_eof();
                            return Ok(());
                        }
                        SslReason::Verification | SslReason::Other => {
                            if reason == SslReason::Verification {
                                // Surfaces the detailed verification error
                                // with peer DN information, when it applies.
                                self.verify()?;
                            }
                            let sticky = self.latch_error(error);
                            self.wait_for_output(wr).await?;
                            return Err(sticky);
                        }
                    },
                    SslFailure::Other(msg) => {
                        return Err(self.latch_error(TlsError::Unexpected(msg)));
                    }
                },
            }
        }
    }

    /// Inspect the library's final verification verdict, failing with DN
    /// details when available. Purely observational otherwise: on success
    /// with a peer certificate present, the DN callback fires.
    fn verify(&self) -> Result<()> {
        let (result, peer_present) = self.with_ssl(|stream| {
            (
                stream.ssl().verify_result(),
                stream.ssl().peer_certificate().is_some(),
            )
        });
        trace!(result = %result.error_string(), peer_present, "verify");
        if result != X509VerifyResult::OK {
            let status = result.error_string().trim_end();
            let err = match self.cached_peer_dn() {
                Some(dn) => TlsError::Verification(format!(
                    "{} (Issuer=[\"{}\"], Subject=[\"{}\"])",
                    status, dn.issuer, dn.subject
                )),
                None => TlsError::Verification(status.to_string()),
            };
            return Err(err);
        }
        if !peer_present {
            // A clean verdict with no certificate means none was presented.
            if self.kind == SessionType::Server && self.creds.client_auth() == ClientAuth::Require
            {
                return Err(TlsError::Verification(
                    "no certificate presented by peer".to_string(),
                ));
            }
            return Ok(());
        }
        if let Some(callback) = &self.creds.inner.dn_callback {
            if let Some(dn) = self.cached_peer_dn() {
                callback(self.kind, &dn.subject, &dn.issuer);
            }
        }
        Ok(())
    }

    fn cached_peer_dn(&self) -> Option<SessionDn> {
        let slot = self.peer_cert.lock().ok()?;
        slot.as_ref().map(|cert| cert::extract_dn(cert))
    }

    // ------------------------------------------------------------------
    // Application write
    // ------------------------------------------------------------------

    /// Encrypt and send a packet. Either the whole packet is consumed or
    /// the call fails with the latched error; bytes are never dropped or
    /// duplicated.
    pub async fn put(&self, mut packet: Packet) -> Result<()> {
        trace!(len = packet.len(), "put");
        loop {
            if let Some(err) = self.latched() {
                return Err(err);
            }
            if self.is_shutdown() {
                return Err(TlsError::BrokenPipe);
            }
            if !self.connected() {
                self.handshake().await?;
                continue;
            }
            if packet.fragment_count() > 1 && packet.len() <= MAX_RECORD_SIZE {
                packet.linearize();
            }
            let remainder = {
                let mut wr = self.write_half.lock().await;
                self.do_put(&mut wr, packet).await?
            };
            if remainder.is_empty() {
                return Ok(());
            }
            // A renegotiation interrupted the write; finish it and resume
            // with the unsent remainder.
            debug!(remaining = remainder.len(), role = ?self.kind, "write interrupted, renegotiating");
            packet = remainder;
            self.handshake().await?;
        }
    }

    /// Write fragments into the TLS stream until the packet is consumed
    /// or a renegotiation is signalled; returns the unsent remainder.
    async fn do_put(&self, wr: &mut WriteHalf<K>, mut packet: Packet) -> Result<Packet> {
        trace!(len = packet.len(), "do_put");
        if !self.connected() {
            return Ok(packet);
        }
        debug_assert!(wr.pending.is_none());
        let mut renegotiate = false;
        while !renegotiate && !packet.is_empty() && !self.eof() {
            let Some(frag) = packet.first_fragment().cloned() else {
                break;
            };
            let written = self.with_ssl(|stream| stream.ssl_write(&frag));
            match written {
                Ok(n) => {
                    packet.trim_front(n);
                    self.perform_push(wr).await?;
                    self.wait_for_output(wr).await?;
                }
                Err(err) => {
                    if !self.connected() {
                        renegotiate = true;
                        continue;
                    }
                    match classify(err, "error occurred during TLS write") {
                        SslFailure::ZeroReturn => self.bios.set_eof(),
                        SslFailure::WantRead | SslFailure::WantWrite => renegotiate = true,
                        SslFailure::Syscall(io_err) => {
                            return Err(self.latch_error(TlsError::syscall(
                                "system error encountered during TLS write",
                                io_err.unwrap_or_else(|| io::Error::other("unidentified")),
                            )));
                        }
                        SslFailure::Protocol { reason, error } => {
                            if reason == SslReason::UnexpectedEof {
                                self.bios.set_eof();
                            } else {
                                let sticky = self.latch_error(error);
                                self.wait_for_output(wr).await?;
                                return Err(sticky);
                            }
                        }
                        SslFailure::Other(msg) => {
                            return Err(self.latch_error(TlsError::Unexpected(msg)));
                        }
                    }
                }
            }
        }
        Ok(packet)
    }

    // ------------------------------------------------------------------
    // Application read
    // ------------------------------------------------------------------

    /// Receive the next decrypted buffer. An empty buffer means
    /// end-of-stream. Renegotiations are handled transparently.
    pub async fn get(&self) -> Result<Bytes> {
        trace!("get");
        loop {
            if let Some(err) = self.latched() {
                return Err(err);
            }
            if self.is_shutdown() || self.eof() {
                return Ok(Bytes::new());
            }
            if !self.connected() {
                self.handshake().await?;
                continue;
            }
            let buf = {
                let mut rd = self.read_half.lock().await;
                self.do_get(&mut rd).await?
            };
            if buf.is_empty() && !self.eof() {
                // Renegotiation hint: complete it and try again.
                self.handshake().await?;
                continue;
            }
            return Ok(buf);
        }
    }

    async fn do_get(&self, rd: &mut ReadHalf<S>) -> Result<Bytes> {
        let buffered = self.bios.inbound.pending() + self.ssl_pending();
        trace!(buffered, "do_get");
        if buffered == 0 {
            self.perform_pull(rd).await?;
        }
        if self.eof() {
            return Ok(Bytes::new());
        }
        let avail = self.bios.inbound.pending() + self.ssl_pending();
        let mut buf = vec![0u8; avail];
        let read = self.with_ssl(|stream| stream.ssl_read(&mut buf));
        match read {
            Ok(n) => {
                buf.truncate(n);
                Ok(Bytes::from(buf))
            }
            Err(err) => match classify(err, "failure during processing TLS read") {
                SslFailure::ZeroReturn => {
                    // Remote end has closed.
                    self.bios.set_eof();
                    Ok(Bytes::new())
                }
                SslFailure::WantRead | SslFailure::WantWrite => Ok(Bytes::new()),
                SslFailure::Syscall(None) => Ok(Bytes::new()),
                SslFailure::Syscall(Some(io_err)) => Err(self.latch_error(TlsError::syscall(
                    "system error encountered during TLS read",
                    io_err,
                ))),
                SslFailure::Protocol { reason, error } => {
                    if reason == SslReason::UnexpectedEof {
                        self.bios.set_eof();
                        Ok(Bytes::new())
                    } else {
                        Err(self.latch_error(error))
                    }
                }
                SslFailure::Other(msg) => Err(self.latch_error(TlsError::Unexpected(msg))),
            },
        }
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Send the bye handshake and, unless configured otherwise, wait for
    /// the peer's.
    pub async fn shutdown(&self) -> Result<()> {
        debug!(role = ?self.kind, "shutdown");
        {
            let mut wr = self.write_half.lock().await;
            self.do_shutdown(&mut wr).await?;
        }
        self.wait_for_eof().await
    }

    async fn do_shutdown(&self, wr: &mut WriteHalf<K>) -> Result<()> {
        trace!(role = ?self.kind, "do_shutdown");
        loop {
            if self.latched().is_some() || !self.connected() {
                return Ok(());
            }
            let step = self.with_ssl(|stream| stream.shutdown());
            match step {
                Ok(ShutdownResult::Received) => return Ok(()),
                Ok(ShutdownResult::Sent) => {
                    // Bidirectional shutdown still in progress.
                    tokio::task::yield_now().await;
                }
                Err(err) => match classify(err, "error occurred during TLS shutdown") {
                    SslFailure::ZeroReturn => return Ok(()),
                    SslFailure::WantRead | SslFailure::WantWrite => {
                        // Our close notify may still be sitting in the
                        // outbound BIO. Once nothing was left to send, the
                        // peer's reply is awaited by wait_for_eof instead.
                        if !self.maybe_push_with_wait(wr).await? {
                            return Ok(());
                        }
                    }
                    SslFailure::Syscall(io_err) => {
                        return Err(self.latch_error(TlsError::syscall(
                            "system error encountered during TLS shutdown",
                            io_err.unwrap_or_else(|| io::Error::other("unidentified")),
                        )));
                    }
                    SslFailure::Protocol { error, .. } => {
                        let sticky = self.latch_error(error);
                        self.wait_for_output(wr).await?;
                        return Err(sticky);
                    }
                    SslFailure::Other(msg) => {
                        return Err(self.latch_error(TlsError::Unexpected(msg)));
                    }
                },
            }
        }
    }

    async fn wait_for_eof(&self) -> Result<()> {
        if !self.options.wait_for_eof_on_shutdown {
            return Ok(());
        }
        trace!("wait_for_eof");
        let mut rd = self.read_half.lock().await;
        if self.latched().is_some() || !self.connected() {
            return Ok(());
        }
        while !self.eof() {
            let _ = self.do_get(&mut rd).await?;
        }
        Ok(())
    }

    /// Close the session: non-blocking and idempotent. The bye handshake
    /// runs in the background with a timeout, then both transport halves
    /// are closed regardless of the peer's behavior.
    pub fn close(self: &Arc<Self>) {
        if self.shutdown_flag.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(role = ?self.kind, "close");
        let session = Arc::clone(self);
        tokio::spawn(async move {
            match tokio::time::timeout(CLOSE_TIMEOUT, session.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => trace!(error = %err, "bye handshake failed"),
                Err(_) => debug!(role = ?session.kind, "shutdown timed out, forcing transport closed"),
            }
            session.bios.set_eof();
            {
                let mut rd = session.read_half.lock().await;
                if let Err(err) = rd.source.close().await {
                    trace!(error = %err, "source close failed");
                }
            }
            {
                let mut wr = session.write_half.lock().await;
                if let Err(err) = wr.sink.close().await {
                    trace!(error = %err, "sink close failed");
                }
            }
            // Reacquire both halves so completion implies quiescence.
            let _rd = session.read_half.lock().await;
            let _wr = session.write_half.lock().await;
            debug!(role = ?session.kind, "close completed");
        });
    }

    /// Flush the transport sink.
    pub async fn flush(&self) -> Result<()> {
        trace!("flush");
        if let Some(err) = self.latched() {
            return Err(err);
        }
        let mut wr = self.write_half.lock().await;
        wr.sink.flush().await.map_err(TlsError::from)
    }

    // ------------------------------------------------------------------
    // Identity queries
    // ------------------------------------------------------------------

    /// Subject and issuer of the peer certificate, handshaking first if
    /// necessary. `None` when the peer presented no certificate.
    pub async fn get_distinguished_name(&self) -> Result<Option<SessionDn>> {
        trace!("get_distinguished_name");
        loop {
            if let Some(err) = self.latched() {
                return Err(err);
            }
            if self.is_shutdown() {
                return Err(TlsError::NotConnected);
            }
            if !self.connected() {
                self.handshake().await?;
                continue;
            }
            return Ok(self.cached_peer_dn());
        }
    }

    /// Subject-alternative-name entries of the peer certificate whose kind
    /// is in `types` (an empty set keeps every known kind).
    pub async fn get_alt_name_information(
        &self,
        types: HashSet<SubjectAltNameKind>,
    ) -> Result<Vec<SubjectAltName>> {
        trace!("get_alt_name_information");
        loop {
            if let Some(err) = self.latched() {
                return Err(err);
            }
            if self.is_shutdown() {
                return Err(TlsError::NotConnected);
            }
            if !self.connected() {
                self.handshake().await?;
                continue;
            }
            let slot = self.peer_cert.lock().expect("peer cert cache poisoned");
            let Some(peer) = slot.as_ref() else {
                return Ok(Vec::new());
            };
            return Ok(cert::alt_names(peer, &types));
        }
    }
}
