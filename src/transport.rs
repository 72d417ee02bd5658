//! Transport contract consumed by TLS sessions
//!
//! A session owns exactly one connected byte transport, split into a
//! [`Source`] of inbound buffers and a [`Sink`] for outbound scattered
//! messages. The engine is the only caller: it serializes operations per
//! direction, so implementations never see overlapping calls on the same
//! half.
//!
//! Payloads travel as [`Packet`]s: cheaply clonable fragment chains that
//! support front-trimming (for partial TLS writes) and linearization
//! (small multi-fragment packets are flattened to fit one TLS record).
//!
//! The [`mem`] submodule provides a bounded in-memory duplex transport,
//! used by the tests and handy for loopback wiring.

use std::collections::VecDeque;
use std::future::Future;
use std::io;

use bytes::{Bytes, BytesMut};

/// Inbound half of a connected transport.
///
/// `get` resolves with the next buffer; an empty buffer signals
/// end-of-stream. The session stops calling `get` after that.
pub trait Source: Send + 'static {
    fn get(&mut self) -> impl Future<Output = io::Result<Bytes>> + Send;
    fn close(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

/// Outbound half of a connected transport.
///
/// `put` consumes a scattered message and resolves once the transport has
/// accepted every fragment, preserving submission order.
pub trait Sink: Send + 'static {
    fn put(&mut self, msg: Packet) -> impl Future<Output = io::Result<()>> + Send;
    fn flush(&mut self) -> impl Future<Output = io::Result<()>> + Send;
    fn close(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

/// A scattered byte sequence: an ordered chain of fragments.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    frags: VecDeque<Bytes>,
    len: usize,
}

impl Packet {
    pub fn new() -> Self {
        Packet::default()
    }

    /// Total byte length across all fragments.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn fragment_count(&self) -> usize {
        self.frags.len()
    }

    /// The first non-empty fragment, if any.
    pub fn first_fragment(&self) -> Option<&Bytes> {
        self.frags.front()
    }

    /// Append a fragment. Empty fragments are dropped.
    pub fn push(&mut self, frag: Bytes) {
        if !frag.is_empty() {
            self.len += frag.len();
            self.frags.push_back(frag);
        }
    }

    /// Drop `n` bytes from the front, crossing fragment boundaries.
    pub fn trim_front(&mut self, mut n: usize) {
        debug_assert!(n <= self.len);
        while n > 0 {
            let Some(front) = self.frags.front_mut() else {
                break;
            };
            if n < front.len() {
                let _ = front.split_to(n);
                self.len -= n;
                return;
            }
            n -= front.len();
            self.len -= front.len();
            self.frags.pop_front();
        }
    }

    /// Flatten the fragment chain into a single fragment.
    pub fn linearize(&mut self) {
        if self.frags.len() <= 1 {
            return;
        }
        let mut flat = BytesMut::with_capacity(self.len);
        for frag in &self.frags {
            flat.extend_from_slice(frag);
        }
        self.frags.clear();
        self.frags.push_back(flat.freeze());
    }

    pub fn fragments(&self) -> impl Iterator<Item = &Bytes> {
        self.frags.iter()
    }

    pub fn into_fragments(self) -> impl Iterator<Item = Bytes> {
        self.frags.into_iter()
    }

    /// Collect the packet into one contiguous buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut flat = BytesMut::with_capacity(self.len);
        for frag in &self.frags {
            flat.extend_from_slice(frag);
        }
        flat.freeze()
    }
}

impl From<Bytes> for Packet {
    fn from(frag: Bytes) -> Self {
        let mut p = Packet::new();
        p.push(frag);
        p
    }
}

impl From<Vec<u8>> for Packet {
    fn from(data: Vec<u8>) -> Self {
        Packet::from(Bytes::from(data))
    }
}

impl From<&[u8]> for Packet {
    fn from(data: &[u8]) -> Self {
        Packet::from(Bytes::copy_from_slice(data))
    }
}

impl FromIterator<Bytes> for Packet {
    fn from_iter<I: IntoIterator<Item = Bytes>>(iter: I) -> Self {
        let mut p = Packet::new();
        for frag in iter {
            p.push(frag);
        }
        p
    }
}

/// Bounded in-memory duplex transport.
pub mod mem {
    use super::{Packet, Sink, Source};
    use bytes::Bytes;
    use std::io;
    use tokio::sync::mpsc;

    /// Receiving half of one direction of a [`duplex`] pair.
    pub struct ChannelSource {
        rx: mpsc::Receiver<Bytes>,
    }

    impl Source for ChannelSource {
        async fn get(&mut self) -> io::Result<Bytes> {
            // A dropped sender reads as end-of-stream.
            Ok(self.rx.recv().await.unwrap_or_default())
        }

        async fn close(&mut self) -> io::Result<()> {
            self.rx.close();
            Ok(())
        }
    }

    /// Sending half of one direction of a [`duplex`] pair.
    pub struct ChannelSink {
        tx: Option<mpsc::Sender<Bytes>>,
    }

    impl Sink for ChannelSink {
        async fn put(&mut self, msg: Packet) -> io::Result<()> {
            let tx = self
                .tx
                .as_ref()
                .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))?;
            for frag in msg.into_fragments() {
                tx.send(frag)
                    .await
                    .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))?;
            }
            Ok(())
        }

        async fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }

        async fn close(&mut self) -> io::Result<()> {
            // Dropping the sender delivers EOF to the peer's source.
            self.tx = None;
            Ok(())
        }
    }

    /// Create a connected duplex transport: two (source, sink) peers wired
    /// back to back, each direction buffering up to `capacity` fragments.
    pub fn duplex(capacity: usize) -> ((ChannelSource, ChannelSink), (ChannelSource, ChannelSink)) {
        let (a_tx, b_rx) = mpsc::channel(capacity);
        let (b_tx, a_rx) = mpsc::channel(capacity);
        (
            (ChannelSource { rx: a_rx }, ChannelSink { tx: Some(a_tx) }),
            (ChannelSource { rx: b_rx }, ChannelSink { tx: Some(b_tx) }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::mem::duplex;
    use super::*;

    #[test]
    fn test_packet_trim_front_across_fragments() {
        let mut p: Packet = [Bytes::from_static(b"abc"), Bytes::from_static(b"defg")]
            .into_iter()
            .collect();
        assert_eq!(p.len(), 7);
        assert_eq!(p.fragment_count(), 2);

        p.trim_front(4);
        assert_eq!(p.len(), 3);
        assert_eq!(&p.to_bytes()[..], b"efg");

        p.trim_front(3);
        assert!(p.is_empty());
        assert!(p.first_fragment().is_none());
    }

    #[test]
    fn test_packet_linearize() {
        let mut p: Packet = [Bytes::from_static(b"ab"), Bytes::from_static(b"cd")]
            .into_iter()
            .collect();
        p.linearize();
        assert_eq!(p.fragment_count(), 1);
        assert_eq!(&p.to_bytes()[..], b"abcd");
    }

    #[test]
    fn test_packet_drops_empty_fragments() {
        let mut p = Packet::new();
        p.push(Bytes::new());
        p.push(Bytes::from_static(b"x"));
        assert_eq!(p.fragment_count(), 1);
        assert_eq!(p.len(), 1);
    }

    #[tokio::test]
    async fn test_duplex_roundtrip() {
        let ((mut a_src, _a_sink), (_b_src, mut b_sink)) = duplex(8);

        b_sink.put(Packet::from(&b"ping"[..])).await.unwrap();
        assert_eq!(&a_src.get().await.unwrap()[..], b"ping");
    }

    #[tokio::test]
    async fn test_duplex_close_reads_as_eof() {
        let ((mut a_src, _a_sink), (_b_src, mut b_sink)) = duplex(8);

        b_sink.close().await.unwrap();
        assert!(a_src.get().await.unwrap().is_empty());
        assert!(b_sink.put(Packet::from(&b"late"[..])).await.is_err());
    }
}
