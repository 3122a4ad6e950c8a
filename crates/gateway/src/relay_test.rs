//! Tests for the result relay loop

use std::time::Duration;

use analyzer_broker::MemoryBroker;
use analyzer_protocol::{KIND_BATCH, RESULT_LENGTH_SIZE, decode_result_frame, read_result_length};
use tokio::io::{AsyncReadExt, DuplexStream, duplex};

use super::*;

const QUEUE: &str = "gateway-results";

async fn broker() -> MemoryBroker {
    let broker = MemoryBroker::new();
    broker.declare_queue(QUEUE).await.unwrap();
    broker
}

fn relay(broker: &MemoryBroker, dictionary: FieldDictionary, queries: &[u8], eof_copies: usize) -> RelayLoop {
    RelayLoop::new(
        Arc::new(broker.clone()),
        QUEUE,
        Arc::new(dictionary),
        RelayConfig {
            queries: queries.to_vec(),
            eof_copies,
        },
        Arc::new(GatewayMetrics::new()),
    )
}

async fn publish(broker: &MemoryBroker, kind: EnvelopeKind, query: u8, payload: &str) {
    let body = ResultEnvelope::new(kind, query, payload.to_string()).encode();
    broker.publish("", QUEUE, body).await.unwrap();
}

/// Close the writer and split what the client received into frames
async fn received(mut writer: FrameWriter<DuplexStream>, mut client: DuplexStream) -> Vec<ResultEnvelope> {
    writer.shutdown().await.unwrap();
    let mut bytes = Vec::new();
    client.read_to_end(&mut bytes).await.unwrap();

    let mut frames = Vec::new();
    let mut rest = &bytes[..];
    while let Some(len) = read_result_length(rest) {
        let end = RESULT_LENGTH_SIZE + len as usize;
        frames.push(decode_result_frame(Bytes::copy_from_slice(&rest[..end])).unwrap());
        rest = &rest[end..];
    }
    assert!(rest.is_empty(), "trailing bytes: {rest:?}");
    frames
}

fn frame(kind: EnvelopeKind, query: u8, payload: &'static [u8]) -> ResultEnvelope {
    ResultEnvelope::new(kind, query, Bytes::from_static(payload))
}

// ============================================================================
// QueryProgress
// ============================================================================

#[test]
fn test_progress_single_copy() {
    let mut progress = QueryProgress::new(&[1, 2], 1);
    assert!(progress.is_open(1));
    assert!(!progress.is_open(3));

    assert!(progress.eof(1));
    assert!(!progress.is_open(1));
    assert!(!progress.eof(1));
    assert!(!progress.is_complete());

    assert!(progress.fail(2));
    assert!(!progress.fail(2));
    assert!(progress.is_complete());
}

#[test]
fn test_progress_waits_for_every_copy() {
    let mut progress = QueryProgress::new(&[4], 3);
    assert!(!progress.eof(4));
    assert!(!progress.eof(4));
    assert_eq!(progress.open_queries().collect::<Vec<_>>(), vec![4]);
    assert!(progress.eof(4));
    assert!(progress.is_complete());
}

// ============================================================================
// Relay
// ============================================================================

#[tokio::test]
async fn test_batch_then_eof_reaches_client() {
    let broker = broker().await;
    let dictionary = FieldDictionary::new(["country", "budget"]).unwrap();
    let relay = relay(&broker, dictionary, &[2], 1);

    publish(&broker, EnvelopeKind::Batch, 2, "0=Argentina;1=500").await;
    publish(&broker, EnvelopeKind::Eof, 2, "").await;

    let (server, client) = duplex(4096);
    let mut writer = FrameWriter::new(server);
    let summary = relay
        .run(&mut writer, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        received(writer, client).await,
        vec![
            frame(EnvelopeKind::Batch, 2, b"Argentina,500"),
            frame(EnvelopeKind::Eof, 2, b""),
        ]
    );
    assert_eq!(summary.frames, 2);
    assert_eq!(summary.rows, 1);
    assert_eq!(broker.queue_depth(QUEUE), Some(0));
}

#[tokio::test]
async fn test_frame_length_covers_header_and_payload() {
    let broker = broker().await;
    let relay = relay(&broker, FieldDictionary::standard(), &[3], 1);

    publish(&broker, EnvelopeKind::Batch, 3, "1=Heat;10=4.5\n1=Alien;10=4.0").await;
    publish(&broker, EnvelopeKind::Eof, 3, "").await;

    let (server, mut client) = duplex(4096);
    let mut writer = FrameWriter::new(server);
    relay
        .run(&mut writer, &CancellationToken::new())
        .await
        .unwrap();
    writer.shutdown().await.unwrap();

    let mut bytes = Vec::new();
    client.read_to_end(&mut bytes).await.unwrap();
    let payload = b"Heat,4.5\nAlien,4.0";
    assert_eq!(read_result_length(&bytes), Some(payload.len() as u32 + 2));
    assert_eq!(&bytes[4..6], &[KIND_BATCH, 3]);
    assert_eq!(&bytes[6..6 + payload.len()], payload);
}

#[tokio::test]
async fn test_genres_bracketed_and_values_trimmed() {
    let broker = broker().await;
    let relay = relay(&broker, FieldDictionary::standard(), &[1], 1);

    publish(&broker, EnvelopeKind::Batch, 1, "1= The Matrix ;6= Action|Sci-Fi ").await;
    publish(&broker, EnvelopeKind::Eof, 1, "").await;

    let (server, client) = duplex(4096);
    let mut writer = FrameWriter::new(server);
    relay
        .run(&mut writer, &CancellationToken::new())
        .await
        .unwrap();

    let frames = received(writer, client).await;
    assert_eq!(frames[0].payload.as_ref(), b"The Matrix,[Action|Sci-Fi]");
}

#[tokio::test]
async fn test_rows_missing_columns_are_skipped() {
    let broker = broker().await;
    let relay = relay(&broker, FieldDictionary::standard(), &[1], 1);

    publish(&broker, EnvelopeKind::Batch, 1, "1=Heat\n1=Alien;6=Horror").await;
    publish(&broker, EnvelopeKind::Batch, 1, "1=Only a title").await;
    publish(&broker, EnvelopeKind::Eof, 1, "").await;

    let (server, client) = duplex(4096);
    let mut writer = FrameWriter::new(server);
    let summary = relay
        .run(&mut writer, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        received(writer, client).await,
        vec![
            frame(EnvelopeKind::Batch, 1, b"Alien,[Horror]"),
            frame(EnvelopeKind::Eof, 1, b""),
        ]
    );
    assert_eq!(summary.dropped, 2);
    assert_eq!(relay.metrics.snapshot().results_dropped, 2);
}

#[tokio::test]
async fn test_eof_forwarded_after_all_copies() {
    let broker = broker().await;
    let relay = relay(&broker, FieldDictionary::standard(), &[4], 2);

    publish(&broker, EnvelopeKind::Eof, 4, "").await;
    publish(&broker, EnvelopeKind::Batch, 4, "16=Keanu Reeves;17=7").await;
    publish(&broker, EnvelopeKind::Eof, 4, "").await;

    let (server, client) = duplex(4096);
    let mut writer = FrameWriter::new(server);
    relay
        .run(&mut writer, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        received(writer, client).await,
        vec![
            frame(EnvelopeKind::Batch, 4, b"Keanu Reeves,7"),
            frame(EnvelopeKind::Eof, 4, b""),
        ]
    );
}

#[tokio::test]
async fn test_error_closes_query() {
    let broker = broker().await;
    let relay = relay(&broker, FieldDictionary::standard(), &[1, 5], 1);

    publish(&broker, EnvelopeKind::Error, 5, "").await;
    publish(&broker, EnvelopeKind::Batch, 5, "14=POSITIVE;13=2.5").await;
    publish(&broker, EnvelopeKind::Eof, 1, "").await;

    let (server, client) = duplex(4096);
    let mut writer = FrameWriter::new(server);
    let summary = relay
        .run(&mut writer, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        received(writer, client).await,
        vec![
            frame(EnvelopeKind::Error, 5, b""),
            frame(EnvelopeKind::Eof, 1, b""),
        ]
    );
    assert_eq!(summary.failed_queries, 1);
    // the late batch for the failed query was consumed and dropped
    assert_eq!(summary.dropped, 1);
}

#[tokio::test]
async fn test_bad_envelopes_are_acked_and_skipped() {
    let broker = broker().await;
    let relay = relay(&broker, FieldDictionary::standard(), &[2], 1);

    broker.publish("", QUEUE, Bytes::from_static(&[0])).await.unwrap();
    broker.publish("", QUEUE, Bytes::from_static(&[9, 2])).await.unwrap();
    publish(&broker, EnvelopeKind::Batch, 7, "15=Peru;4=1").await;
    publish(&broker, EnvelopeKind::Eof, 2, "").await;

    let (server, client) = duplex(4096);
    let mut writer = FrameWriter::new(server);
    let summary = relay
        .run(&mut writer, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(received(writer, client).await, vec![frame(EnvelopeKind::Eof, 2, b"")]);
    assert_eq!(summary.dropped, 3);
    assert_eq!(broker.queue_depth(QUEUE), Some(0));
}

#[tokio::test]
async fn test_results_arriving_later_are_relayed() {
    let broker = broker().await;
    let relay = relay(&broker, FieldDictionary::standard(), &[2], 1);

    let (server, client) = duplex(4096);
    let task = tokio::spawn(async move {
        let mut writer = FrameWriter::new(server);
        let summary = relay.run(&mut writer, &CancellationToken::new()).await;
        (writer, summary)
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    publish(&broker, EnvelopeKind::Batch, 2, "15=Peru;4=100").await;
    publish(&broker, EnvelopeKind::Eof, 2, "").await;

    let (writer, summary) = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("relay should finish")
        .unwrap();
    assert_eq!(summary.unwrap().rows, 1);
    assert_eq!(
        received(writer, client).await[0],
        frame(EnvelopeKind::Batch, 2, b"Peru,100")
    );
}

#[tokio::test]
async fn test_unsent_result_stays_queued() {
    let broker = broker().await;
    let relay = relay(&broker, FieldDictionary::standard(), &[2], 1);
    publish(&broker, EnvelopeKind::Batch, 2, "15=Peru;4=100").await;

    let (server, client) = duplex(4096);
    drop(client);
    let mut writer = FrameWriter::new(server);

    let err = relay
        .run(&mut writer, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_disconnect(), "{err:?}");
    assert_eq!(broker.queue_depth(QUEUE), Some(1));
}

#[tokio::test]
async fn test_cancel_stops_idle_relay() {
    let broker = broker().await;
    let relay = relay(&broker, FieldDictionary::standard(), &[1], 1);

    let (server, _client) = duplex(4096);
    let mut writer = FrameWriter::new(server);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = relay.run(&mut writer, &cancel).await.unwrap_err();
    assert!(matches!(err, GatewayError::Cancelled));
}

#[tokio::test]
async fn test_closed_broker_ends_relay() {
    let broker = broker().await;
    let relay = relay(&broker, FieldDictionary::standard(), &[1], 1);
    broker.close();

    let (server, _client) = duplex(4096);
    let mut writer = FrameWriter::new(server);
    let err = relay
        .run(&mut writer, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Broker(_)), "{err:?}");
}
