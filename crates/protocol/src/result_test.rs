//! Tests for client-bound result frames

use super::*;
use crate::dictionary::FieldDictionary;
use crate::record::decode_line;

fn record(pairs: &[(&str, &str)]) -> Record {
    pairs.iter().copied().collect()
}

// ============================================================================
// Projections
// ============================================================================

#[test]
fn test_query_columns() {
    assert_eq!(query_columns(1), Some(&["title", "genres"][..]));
    assert_eq!(query_columns(2), Some(&["country", "budget"][..]));
    assert_eq!(query_columns(5), Some(&["sentiment", "rate_revenue_budget"][..]));
    assert_eq!(query_columns(0), None);
    assert_eq!(query_columns(6), None);
    assert_eq!(known_queries().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_projection_columns_are_standard_fields() {
    let dict = FieldDictionary::standard();
    for query in known_queries() {
        for column in query_columns(query).unwrap() {
            assert!(dict.contains(column), "query {query} column {column}");
        }
    }
}

// ============================================================================
// Row rendering
// ============================================================================

#[test]
fn test_render_row_in_projection_order() {
    let r = record(&[("budget", "500"), ("country", "Argentina"), ("id", "9")]);
    assert_eq!(render_result_row(&r, 2).unwrap(), b"Argentina,500");
}

#[test]
fn test_render_row_wraps_genres() {
    let r = record(&[("title", "Nueve reinas"), ("genres", "Crime,Drama")]);
    assert_eq!(
        render_result_row(&r, 1).unwrap(),
        b"Nueve reinas,[Crime,Drama]"
    );
}

#[test]
fn test_render_row_trims_values() {
    let r = record(&[("actor", "  Ricardo Darín "), ("count", " 17\t")]);
    assert_eq!(render_result_row(&r, 4).unwrap(), "Ricardo Darín,17".as_bytes());

    let r = record(&[("title", " A "), ("genres", " Drama ")]);
    assert_eq!(render_result_row(&r, 1).unwrap(), b"A,[Drama]");
}

#[test]
fn test_render_row_missing_column() {
    let r = record(&[("title", "A")]);
    assert_eq!(
        render_result_row(&r, 1),
        Err(EncodeError::MissingColumn {
            query: 1,
            column: "genres"
        })
    );
}

#[test]
fn test_render_row_unknown_query() {
    assert_eq!(
        render_result_row(&Record::new(), 42),
        Err(EncodeError::UnknownQuery(42))
    );
}

// ============================================================================
// Frames
// ============================================================================

#[test]
fn test_envelope_length_covers_header_and_payload() {
    let rows = [b"Argentina,500".to_vec(), b"Spain,20".to_vec()];
    let frame = render_result_envelope(EnvelopeKind::Batch, 2, &rows);

    let payload_len = b"Argentina,500\nSpain,20".len();
    let declared = read_result_length(&frame).unwrap() as usize;
    assert_eq!(declared, payload_len + RESULT_HEADER_SIZE);
    assert_eq!(declared, frame.len() - RESULT_LENGTH_SIZE);
    assert_eq!(frame[4], EnvelopeKind::Batch.to_u8());
    assert_eq!(frame[5], 2);
    assert_eq!(&frame[6..], b"Argentina,500\nSpain,20");
}

#[test]
fn test_eof_and_error_frames() {
    assert_eq!(render_eof(3).as_ref(), &[0, 0, 0, 2, 1, 3]);
    assert_eq!(render_error(4).as_ref(), &[0, 0, 0, 2, 2, 4]);
}

#[test]
fn test_decode_result_frame() {
    let frame = render_result_envelope(EnvelopeKind::Batch, 3, &[b"Heat,4.5"]);
    let env = decode_result_frame(frame).unwrap();
    assert_eq!(env.kind, EnvelopeKind::Batch);
    assert_eq!(env.query, 3);
    assert_eq!(env.payload.as_ref(), b"Heat,4.5");
}

#[test]
fn test_decode_result_frame_length_mismatch() {
    let mut frame = BytesMut::from(render_eof(1).as_ref());
    frame.put_u8(0);
    assert_eq!(
        decode_result_frame(frame.freeze()),
        Err(DecodeError::LengthMismatch {
            declared: 2,
            actual: 3
        })
    );
    assert!(matches!(
        decode_result_frame(Bytes::from_static(&[0, 0])),
        Err(DecodeError::TooShort { .. })
    ));
}

#[test]
fn test_result_rows_skip_blank() {
    let rows: Vec<&[u8]> = result_rows(b"a,1\n\nb,2").collect();
    assert_eq!(rows, vec![&b"a,1"[..], &b"b,2"[..]]);
}

#[test]
fn test_stage_envelope_to_client_row() {
    // A terminal stage emits the query-2 projection with its own field ids
    let dict = FieldDictionary::new(["country", "budget"]).unwrap();
    let env = decode_result_envelope(Bytes::from_static(b"\x00\x020=Argentina;1=500")).unwrap();

    let rows: Vec<Vec<u8>> = result_rows(&env.payload)
        .map(|line| render_result_row(&decode_line(line, &dict), env.query).unwrap())
        .collect();
    let frame = render_result_envelope(env.kind, env.query, &rows);

    assert!(frame.ends_with(b"Argentina,500"));
    assert_eq!(frame[5], 2);
}
