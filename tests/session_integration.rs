//! End-to-end session tests over the in-memory duplex transport
//!
//! Each test wires a client and a server session back to back and drives
//! both sides concurrently; the handshake, shutdown and renegotiation
//! plumbing all run through the same shuttle paths as production use.

mod common;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use memtls::transport::mem;
use memtls::{
    CertFormat, ClientAuth, Credentials, Packet, SessionType, SubjectAltName, SubjectAltNameKind,
    TlsOptions, TlsSession,
};
use openssl::pkcs12::Pkcs12;
use openssl::stack::Stack;

use common::{authority, issued, self_signed, TestIdentity};

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn server_creds(identity: &TestIdentity) -> Credentials {
    Credentials::builder()
        .set_key(&identity.cert_pem(), &identity.key_pem(), CertFormat::Pem)
        .unwrap()
        .build()
}

fn client_creds_trusting(identity: &TestIdentity) -> Credentials {
    Credentials::builder()
        .set_trust(&identity.cert_pem(), CertFormat::Pem)
        .unwrap()
        .build()
}

type MemSession = Arc<TlsSession<mem::ChannelSource, mem::ChannelSink>>;

fn session_pair(client_creds: &Credentials, server_creds: &Credentials) -> (MemSession, MemSession) {
    let ((client_src, client_sink), (server_src, server_sink)) = mem::duplex(64);
    let client = TlsSession::client(client_creds, client_src, client_sink, TlsOptions::default())
        .unwrap();
    let server = TlsSession::server(server_creds, server_src, server_sink, TlsOptions::default())
        .unwrap();
    (client, server)
}

async fn eventually(what: &str, cond: impl Fn() -> bool) {
    let wait = async {
        while !cond() {
            tokio::task::yield_now().await;
        }
    };
    tokio::time::timeout(TEST_TIMEOUT, wait)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

/// Read from `session` until `total` payload bytes have arrived.
async fn collect(session: &MemSession, total: usize) -> Bytes {
    let mut out = BytesMut::with_capacity(total);
    while out.len() < total {
        let buf = session.get().await.unwrap();
        assert!(!buf.is_empty(), "stream ended early at {} bytes", out.len());
        out.extend_from_slice(&buf);
    }
    out.freeze()
}

#[tokio::test]
async fn test_handshake_payload_and_clean_shutdown() {
    let identity = self_signed("s1.example.com");
    let (client, server) = session_pair(&client_creds_trusting(&identity), &server_creds(&identity));

    // No explicit handshake: the first put/get drives it on demand.
    let (sent, received) = tokio::time::timeout(
        TEST_TIMEOUT,
        async { tokio::join!(client.put(Packet::from(&b"hello"[..])), server.get()) },
    )
    .await
    .unwrap();
    sent.unwrap();
    assert_eq!(&received.unwrap()[..], b"hello");

    // And the other direction.
    let (sent, received) = tokio::join!(server.put(Packet::from(&b"world"[..])), client.get());
    sent.unwrap();
    assert_eq!(&received.unwrap()[..], b"world");

    let (client_down, server_down) = tokio::time::timeout(
        TEST_TIMEOUT,
        async { tokio::join!(client.shutdown(), server.shutdown()) },
    )
    .await
    .unwrap();
    client_down.unwrap();
    server_down.unwrap();

    assert!(client.eof());
    assert!(server.eof());
    assert!(client.get().await.unwrap().is_empty());
    assert!(server.get().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_distinguished_name_and_alt_names() {
    let identity = self_signed("dn.example.com");
    let (client, server) = session_pair(&client_creds_trusting(&identity), &server_creds(&identity));

    let (c, s) = tokio::join!(client.handshake(), server.handshake());
    c.unwrap();
    s.unwrap();

    // The client observed the server's certificate.
    let dn = client.get_distinguished_name().await.unwrap().unwrap();
    assert!(dn.subject.contains("CN=dn.example.com"));
    assert!(dn.subject.contains("O=memtls test pki"));
    assert_eq!(dn.subject, dn.issuer);

    // The server requested no client certificate, so it saw none.
    assert!(server.get_distinguished_name().await.unwrap().is_none());

    let sans = client.get_alt_name_information(HashSet::new()).await.unwrap();
    assert!(sans.contains(&SubjectAltName::DnsName("dn.example.com".to_string())));

    // A filter excluding every present kind yields nothing.
    let filter: HashSet<_> = [SubjectAltNameKind::Dn].into_iter().collect();
    assert!(client.get_alt_name_information(filter).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_client_auth_require_with_certificate() {
    let ca = authority("memtls test root");
    let client_identity = issued(&ca, "tls-client.example.com");
    let server_identity = self_signed("s2.example.com");

    let observed: Arc<Mutex<Vec<(SessionType, String, String)>>> =
        Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);

    let server_creds = Credentials::builder()
        .set_key(
            &server_identity.cert_pem(),
            &server_identity.key_pem(),
            CertFormat::Pem,
        )
        .unwrap()
        .set_trust(&ca.cert_pem(), CertFormat::Pem)
        .unwrap()
        .set_client_auth(ClientAuth::Require)
        .set_dn_verification_callback(Arc::new(move |kind, subject, issuer| {
            sink.lock()
                .unwrap()
                .push((kind, subject.to_string(), issuer.to_string()));
        }))
        .build();
    let client_creds = Credentials::builder()
        .set_trust(&server_identity.cert_pem(), CertFormat::Pem)
        .unwrap()
        .set_key(
            &client_identity.cert_pem(),
            &client_identity.key_pem(),
            CertFormat::Pem,
        )
        .unwrap()
        .build();

    let (client, server) = session_pair(&client_creds, &server_creds);
    let (c, s) = tokio::time::timeout(
        TEST_TIMEOUT,
        async { tokio::join!(client.handshake(), server.handshake()) },
    )
    .await
    .unwrap();
    c.unwrap();
    s.unwrap();

    let calls = observed.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (kind, subject, issuer) = &calls[0];
    assert_eq!(*kind, SessionType::Server);
    assert!(subject.contains("CN=tls-client.example.com"));
    assert!(issuer.contains("CN=memtls test root"));
    drop(calls);

    let dn = server.get_distinguished_name().await.unwrap().unwrap();
    assert!(dn.subject.contains("CN=tls-client.example.com"));

    // The authenticated channel carries data both ways.
    let (sent, received) = tokio::join!(client.put(Packet::from(&b"ping"[..])), server.get());
    sent.unwrap();
    assert_eq!(&received.unwrap()[..], b"ping");
}

#[tokio::test]
async fn test_client_auth_require_without_certificate() {
    let ca = authority("memtls test root");
    let server_identity = self_signed("s3.example.com");

    let server_creds = Credentials::builder()
        .set_key(
            &server_identity.cert_pem(),
            &server_identity.key_pem(),
            CertFormat::Pem,
        )
        .unwrap()
        .set_trust(&ca.cert_pem(), CertFormat::Pem)
        .unwrap()
        .set_client_auth(ClientAuth::Require)
        .build();

    let (client, server) = session_pair(&client_creds_trusting(&server_identity), &server_creds);

    let (client_res, server_res) = tokio::time::timeout(TEST_TIMEOUT, async {
        tokio::join!(client.handshake(), async {
            let res = server.handshake().await;
            // Unblock the client, which is waiting for a server flight
            // that will never come.
            server.close();
            res
        })
    })
    .await
    .unwrap();

    let server_err = server_res.unwrap_err();
    assert!(server_err.is_verification());
    assert!(server_err
        .to_string()
        .contains("no certificate presented by peer"));
    assert!(client_res.is_err());
}

#[tokio::test]
async fn test_rejected_priority_string() {
    let identity = self_signed("s4.example.com");
    let creds = Credentials::builder()
        .set_key(&identity.cert_pem(), &identity.key_pem(), CertFormat::Pem)
        .unwrap()
        .set_priority("NOT-A-CIPHER")
        .build();

    let ((src, sink), _peer) = mem::duplex(8);
    let err = match TlsSession::server(&creds, src, sink, TlsOptions::default()) {
        Ok(_) => panic!("session creation should have been rejected"),
        Err(err) => err,
    };
    assert!(err.to_string().contains("priority"));
}

#[tokio::test]
async fn test_payload_ordering_and_large_transfer() {
    let identity = self_signed("bulk.example.com");
    let (client, server) = session_pair(&client_creds_trusting(&identity), &server_creds(&identity));

    // Phase 1: sequential small writes arrive in submission order.
    let small: Vec<Vec<u8>> = (0..8).map(|i| format!("msg-{i}|").into_bytes()).collect();
    let expected: Vec<u8> = small.concat();
    let send_small = async {
        for msg in &small {
            client.put(Packet::from(msg.as_slice())).await.unwrap();
        }
    };
    let (_, received) = tokio::time::timeout(
        TEST_TIMEOUT,
        async { tokio::join!(send_small, collect(&server, expected.len())) },
    )
    .await
    .unwrap();
    assert_eq!(&received[..], &expected[..]);

    // Phase 2: a scattered packet larger than one TLS record crosses
    // intact, no loss, no duplication, no reordering.
    let total = 150 * 1024;
    let payload: Vec<u8> = (0..total).map(|i| (i % 251) as u8).collect();
    let packet: Packet = payload
        .chunks(50 * 1024)
        .map(Bytes::copy_from_slice)
        .collect();
    assert!(packet.fragment_count() > 1);

    let (sent, received) = tokio::time::timeout(
        TEST_TIMEOUT,
        async { tokio::join!(client.put(packet), collect(&server, total)) },
    )
    .await
    .unwrap();
    sent.unwrap();
    assert_eq!(&received[..], &payload[..]);
}

#[tokio::test]
async fn test_abrupt_peer_close() {
    let identity = self_signed("s6.example.com");
    let (client, server) = session_pair(&client_creds_trusting(&identity), &server_creds(&identity));

    let (c, s) = tokio::join!(client.handshake(), server.handshake());
    c.unwrap();
    s.unwrap();

    // The peer vanishes without a bye handshake; its transport halves
    // drop and the client's source reports end-of-stream.
    drop(server);

    let buf = tokio::time::timeout(TEST_TIMEOUT, client.get()).await.unwrap().unwrap();
    assert!(buf.is_empty());
    assert!(client.eof());
    assert!(client.get().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_error_latch_is_sticky() {
    // The client trusts nobody, so its verification of the server fails.
    let identity = self_signed("latch.example.com");
    let client_creds = Credentials::builder().build();
    let (client, server) = session_pair(&client_creds, &server_creds(&identity));

    let (client_res, _server_res) = tokio::time::timeout(TEST_TIMEOUT, async {
        tokio::join!(
            async {
                let res = client.handshake().await;
                client.close();
                res
            },
            server.handshake(),
        )
    })
    .await
    .unwrap();

    let first = client_res.unwrap_err();
    assert!(first.is_verification());
    // The failure message embeds the peer's DN details.
    assert!(first.to_string().contains("Issuer=[\""));

    let rendered = first.to_string();
    assert_eq!(
        client.put(Packet::from(&b"x"[..])).await.unwrap_err().to_string(),
        rendered
    );
    assert_eq!(client.get().await.unwrap_err().to_string(), rendered);
    assert_eq!(client.flush().await.unwrap_err().to_string(), rendered);
    assert_eq!(
        client.get_distinguished_name().await.unwrap_err().to_string(),
        rendered
    );
    assert_eq!(
        client
            .get_alt_name_information(HashSet::new())
            .await
            .unwrap_err()
            .to_string(),
        rendered
    );
}

#[tokio::test]
async fn test_close_is_nonblocking_and_idempotent() {
    let identity = self_signed("close.example.com");
    let (client, server) = session_pair(&client_creds_trusting(&identity), &server_creds(&identity));

    let (c, s) = tokio::join!(client.handshake(), server.handshake());
    c.unwrap();
    s.unwrap();

    client.close();
    client.close(); // second call is a no-op

    // Writes are refused as soon as close is initiated.
    assert!(matches!(
        client.put(Packet::from(&b"late"[..])).await,
        Err(memtls::TlsError::BrokenPipe)
    ));

    // The peer observes the bye handshake as a clean end-of-stream.
    let buf = tokio::time::timeout(TEST_TIMEOUT, server.get()).await.unwrap().unwrap();
    assert!(buf.is_empty());
    assert!(server.eof());

    server.close();
    eventually("both sides to reach EOF", || client.eof() && server.eof()).await;
}

#[tokio::test]
async fn test_shutdown_without_waiting_for_peer() {
    let identity = self_signed("bye.example.com");
    let ((client_src, client_sink), (server_src, server_sink)) = mem::duplex(64);
    let options = TlsOptions {
        wait_for_eof_on_shutdown: false,
        ..TlsOptions::default()
    };
    let client = TlsSession::client(
        &client_creds_trusting(&identity),
        client_src,
        client_sink,
        options,
    )
    .unwrap();
    let server = TlsSession::server(
        &server_creds(&identity),
        server_src,
        server_sink,
        TlsOptions::default(),
    )
    .unwrap();

    let (c, s) = tokio::join!(client.handshake(), server.handshake());
    c.unwrap();
    s.unwrap();

    // With EOF waiting disabled the bye handshake completes without any
    // cooperation from the peer.
    tokio::time::timeout(TEST_TIMEOUT, client.shutdown())
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_pkcs12_server_identity_with_chain() {
    let identity = self_signed("p12.example.com");
    let chain_a = authority("chain-a");
    let chain_b = authority("chain-b");

    let mut chain = Stack::new().unwrap();
    chain.push(chain_a.cert.clone()).unwrap();
    chain.push(chain_b.cert.clone()).unwrap();
    let archive = Pkcs12::builder()
        .name("server")
        .pkey(&identity.key)
        .cert(&identity.cert)
        .ca(chain)
        .build2("hunter2")
        .unwrap()
        .to_der()
        .unwrap();

    let server_creds = Credentials::builder()
        .set_pkcs12(&archive, CertFormat::Der, "hunter2")
        .unwrap()
        .build();
    assert!(server_creds.get_trust_list_info().unwrap().len() >= 2);
    assert_eq!(server_creds.get_cert_info().unwrap().len(), 1);

    let (client, server) = session_pair(&client_creds_trusting(&identity), &server_creds);
    let (sent, received) = tokio::time::timeout(
        TEST_TIMEOUT,
        async { tokio::join!(client.put(Packet::from(&b"via pkcs12"[..])), server.get()) },
    )
    .await
    .unwrap();
    sent.unwrap();
    assert_eq!(&received.unwrap()[..], b"via pkcs12");

    // SAN query over the live session sees the identity's DNS entry.
    let sans = client.get_alt_name_information(HashSet::new()).await.unwrap();
    assert!(sans.contains(&SubjectAltName::DnsName("p12.example.com".to_string())));
}

#[tokio::test]
async fn test_concurrent_bidirectional_io() {
    let identity = self_signed("duplex.example.com");
    let (client, server) = session_pair(&client_creds_trusting(&identity), &server_creds(&identity));

    let c2s: Vec<u8> = (0..32 * 1024).map(|i| (i % 7) as u8).collect();
    let s2c: Vec<u8> = (0..24 * 1024).map(|i| (i % 11) as u8).collect();

    // Both directions run at once; neither blocks the other.
    let (up, down, got_s, got_c) = tokio::time::timeout(TEST_TIMEOUT, async {
        tokio::join!(
            client.put(Packet::from(c2s.as_slice())),
            server.put(Packet::from(s2c.as_slice())),
            collect(&server, c2s.len()),
            collect(&client, s2c.len()),
        )
    })
    .await
    .unwrap();
    up.unwrap();
    down.unwrap();
    assert_eq!(&got_s[..], &c2s[..]);
    assert_eq!(&got_c[..], &s2c[..]);
}
