//! In-memory BIOs bridging the TLS library and the transport
//!
//! The TLS library never touches the transport. It reads ciphertext from
//! an inbound buffer and writes ciphertext into an outbound buffer; the
//! session shuttles bytes between those buffers and the transport's
//! source/sink. [`MemoryBio`] is the `Read + Write` adapter handed to the
//! TLS stream (which owns it from then on); [`BioHandle`]s are the
//! non-owning ends the shuttle uses to feed and drain.
//!
//! A read on an empty inbound buffer reports would-block, which the TLS
//! library surfaces as its want-read condition. Once transport EOF has
//! been latched the adapter reports end-of-stream instead.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};

/// Shared handle onto one ciphertext buffer.
#[derive(Clone)]
pub(crate) struct BioHandle {
    buf: Arc<Mutex<BytesMut>>,
}

impl BioHandle {
    fn new() -> Self {
        BioHandle {
            buf: Arc::new(Mutex::new(BytesMut::new())),
        }
    }

    /// Bytes currently buffered.
    pub(crate) fn pending(&self) -> usize {
        self.buf.lock().expect("bio buffer lock poisoned").len()
    }

    /// Append ciphertext; returns the number of bytes accepted.
    pub(crate) fn feed(&self, data: &[u8]) -> usize {
        let mut buf = self.buf.lock().expect("bio buffer lock poisoned");
        buf.extend_from_slice(data);
        data.len()
    }

    /// Take everything currently buffered.
    pub(crate) fn drain(&self) -> Bytes {
        let mut buf = self.buf.lock().expect("bio buffer lock poisoned");
        buf.split().freeze()
    }

    fn read_into(&self, out: &mut [u8]) -> usize {
        let mut buf = self.buf.lock().expect("bio buffer lock poisoned");
        let n = out.len().min(buf.len());
        if n > 0 {
            out[..n].copy_from_slice(&buf.split_to(n));
        }
        n
    }
}

/// The two buffers of a session plus the transport-EOF latch.
pub(crate) struct BioPair {
    /// Ciphertext from the transport, read by the TLS library.
    pub(crate) inbound: BioHandle,
    /// Ciphertext produced by the TLS library, drained to the transport.
    pub(crate) outbound: BioHandle,
    eof: Arc<AtomicBool>,
}

impl BioPair {
    pub(crate) fn new() -> Self {
        BioPair {
            inbound: BioHandle::new(),
            outbound: BioHandle::new(),
            eof: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build the adapter to hand to the TLS stream. The stream owns the
    /// adapter; the pair keeps only the non-owning handles.
    pub(crate) fn adapter(&self) -> MemoryBio {
        MemoryBio {
            inbound: self.inbound.clone(),
            outbound: self.outbound.clone(),
            eof: Arc::clone(&self.eof),
        }
    }

    pub(crate) fn eof(&self) -> bool {
        self.eof.load(Ordering::SeqCst)
    }

    pub(crate) fn set_eof(&self) {
        self.eof.store(true, Ordering::SeqCst);
    }
}

/// `Read + Write` adapter installed into the TLS stream.
pub(crate) struct MemoryBio {
    inbound: BioHandle,
    outbound: BioHandle,
    eof: Arc<AtomicBool>,
}

impl Read for MemoryBio {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inbound.read_into(buf);
        if n > 0 {
            Ok(n)
        } else if self.eof.load(Ordering::SeqCst) {
            Ok(0)
        } else {
            Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "no ciphertext buffered",
            ))
        }
    }
}

impl Write for MemoryBio {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.outbound.feed(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
