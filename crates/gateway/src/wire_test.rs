//! Tests for client connection framing

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncWriteExt, duplex};

use super::*;

fn reader(bytes: &[u8]) -> FrameReader<&[u8]> {
    FrameReader::new(bytes, 1024)
}

fn batch(lines: &[&[u8]]) -> Vec<u8> {
    Message::Batch(lines.iter().map(|l| Bytes::copy_from_slice(l)).collect())
        .encode()
        .to_vec()
}

// ============================================================================
// Resource byte
// ============================================================================

#[tokio::test]
async fn test_resource_known_ids() {
    let mut r = reader(&[0, 1, 2]);
    assert_eq!(r.resource().await.unwrap(), Resource::Movies);
    assert_eq!(r.resource().await.unwrap(), Resource::Credits);
    assert_eq!(r.resource().await.unwrap(), Resource::Ratings);
}

#[tokio::test]
async fn test_resource_unknown_id() {
    let mut r = reader(&[7]);
    assert!(matches!(
        r.resource().await,
        Err(ProtocolError::UnknownResource(7))
    ));
}

#[tokio::test]
async fn test_resource_on_closed_stream() {
    let mut r = reader(&[]);
    let err = r.resource().await.unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::ConnectionClosed { field: "resource" }
    ));
    assert!(err.is_disconnect());
}

// ============================================================================
// Messages
// ============================================================================

#[tokio::test]
async fn test_recv_batch() {
    let bytes = batch(&[b"0=1;1=Matrix", b"0=2;1=Inception"]);
    let mut r = reader(&bytes);

    let msg = r.recv().await.unwrap();
    assert_eq!(
        msg,
        Message::Batch(vec![
            Bytes::from_static(b"0=1;1=Matrix"),
            Bytes::from_static(b"0=2;1=Inception"),
        ])
    );
}

#[tokio::test]
async fn test_recv_empty_batch_and_empty_line() {
    let mut bytes = batch(&[]);
    bytes.extend(batch(&[b""]));
    let mut r = reader(&bytes);

    assert_eq!(r.recv().await.unwrap(), Message::Batch(vec![]));
    assert_eq!(r.recv().await.unwrap(), Message::Batch(vec![Bytes::new()]));
}

#[tokio::test]
async fn test_recv_markers() {
    let mut r = reader(&[MSG_FIN, MSG_ERROR]);
    assert_eq!(r.recv().await.unwrap(), Message::Fin);
    assert_eq!(r.recv().await.unwrap(), Message::Error);
}

#[tokio::test]
async fn test_recv_unknown_kind() {
    let mut r = reader(&[9]);
    assert!(matches!(
        r.recv().await,
        Err(ProtocolError::UnknownMessageKind(9))
    ));
}

#[tokio::test]
async fn test_recv_short_frames() {
    let full = batch(&[b"abcdef"]);

    // Cut inside the count, the line length and the line body
    for (cut, field) in [(3, "line count"), (7, "line length"), (12, "line")] {
        let mut r = reader(&full[..cut]);
        match r.recv().await {
            Err(ProtocolError::ConnectionClosed { field: f }) => assert_eq!(f, field),
            other => panic!("cut at {cut}: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_recv_rejects_oversized_line() {
    let mut bytes = BytesMut::new();
    bytes.extend_from_slice(&[MSG_BATCH]);
    bytes.extend_from_slice(&1u32.to_be_bytes());
    bytes.extend_from_slice(&2048u32.to_be_bytes());
    let mut r = reader(&bytes);

    assert!(matches!(
        r.recv().await,
        Err(ProtocolError::LineTooLarge {
            size: 2048,
            max: 1024
        })
    ));
}

#[tokio::test]
async fn test_recv_across_partial_writes() {
    let (client, server) = duplex(8);
    let mut r = FrameReader::new(server, 1024);
    let bytes = batch(&[b"a line longer than the pipe buffer"]);

    let writer = tokio::spawn(async move {
        let mut client = client;
        client.write_all(&bytes).await.unwrap();
        client.write_all(&[MSG_FIN]).await.unwrap();
    });

    assert_eq!(r.recv().await.unwrap().line_count(), 1);
    assert_eq!(r.recv().await.unwrap(), Message::Fin);
    writer.await.unwrap();
}

#[tokio::test]
async fn test_closed_waits_for_peer() {
    let (mut client, server) = duplex(64);
    let mut r = FrameReader::new(server, 1024);

    client.write_all(b"trailing").await.unwrap();
    let waiting = tokio::spawn(async move { r.closed().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiting.is_finished());

    drop(client);
    let closed = tokio::time::timeout(Duration::from_secs(1), waiting)
        .await
        .expect("closed() did not return after the peer left")
        .unwrap();
    assert!(closed.is_ok());
}

// ============================================================================
// Writer
// ============================================================================

#[tokio::test]
async fn test_send_writes_exact_bytes() {
    let (client, mut server) = duplex(64);
    let mut w = FrameWriter::new(client);

    w.send(&[0, 0, 0, 2, 1, 3]).await.unwrap();
    w.shutdown().await.unwrap();

    let mut received = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut server, &mut received)
        .await
        .unwrap();
    assert_eq!(received, vec![0, 0, 0, 2, 1, 3]);
}

#[tokio::test]
async fn test_send_to_closed_peer_fails() {
    let (client, server) = duplex(64);
    drop(server);
    let mut w = FrameWriter::new(client);

    let err = w.send(b"lost").await.unwrap_err();
    assert!(err.is_disconnect(), "{err:?}");
}

// ============================================================================
// Listener
// ============================================================================

#[tokio::test]
async fn test_listener_accepts_and_splits() {
    let listener = Listener::bind("127.0.0.1", 0, 4).await.unwrap();
    let addr = listener.local_addr();

    let client = tokio::spawn(async move {
        let mut socket = TcpStream::connect(addr).await.unwrap();
        socket.write_all(&[2, MSG_FIN]).await.unwrap();
        socket
    });

    let (stream, _peer) = listener.accept().await.unwrap().unwrap();
    stream.configure(true, Some(Duration::from_secs(30)));
    let (mut r, _w) = stream.split(1024);

    assert_eq!(r.resource().await.unwrap(), Resource::Ratings);
    assert_eq!(r.recv().await.unwrap(), Message::Fin);
    client.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_read_unblocks_accept() {
    let listener = Listener::bind("127.0.0.1", 0, 1).await.unwrap();
    let token = listener.shutdown_token();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let accepted = tokio::time::timeout(Duration::from_secs(2), listener.accept())
        .await
        .expect("accept should be woken")
        .unwrap();
    assert!(accepted.is_none());
    assert!(listener.is_shut_down());
}

#[tokio::test]
async fn test_bind_conflict_reports_address() {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = std_listener.local_addr().unwrap().port();

    match Listener::bind("127.0.0.1", port, 1).await {
        Err(GatewayError::Bind { address, .. }) => {
            assert_eq!(address, format!("127.0.0.1:{port}"))
        }
        other => panic!("expected bind error, got {other:?}"),
    }
}
