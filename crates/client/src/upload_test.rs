//! Tests for resource upload

use analyzer_protocol::{MSG_BATCH, MSG_ERROR, MSG_FIN};
use tempfile::TempDir;

use super::*;

/// One resource as the gateway would read it
#[derive(Debug, PartialEq)]
struct Sent {
    resource: u8,
    batches: Vec<Vec<String>>,
    last: u8,
}

/// Parse what the uploader wrote
fn parse(mut bytes: &[u8]) -> Vec<Sent> {
    fn u32_at(bytes: &mut &[u8]) -> usize {
        let (head, rest) = bytes.split_at(4);
        *bytes = rest;
        u32::from_be_bytes([head[0], head[1], head[2], head[3]]) as usize
    }

    let mut sent = Vec::new();
    while let Some((&resource, rest)) = bytes.split_first() {
        bytes = rest;
        let mut batches = Vec::new();
        loop {
            let (&kind, rest) = bytes.split_first().unwrap();
            bytes = rest;
            if kind != MSG_BATCH {
                sent.push(Sent {
                    resource,
                    batches,
                    last: kind,
                });
                break;
            }
            let count = u32_at(&mut bytes);
            let mut lines = Vec::new();
            for _ in 0..count {
                let len = u32_at(&mut bytes);
                lines.push(String::from_utf8(bytes[..len].to_vec()).unwrap());
                bytes = &bytes[len..];
            }
            batches.push(lines);
        }
    }
    sent
}

fn uploader(batch_size: usize, format: RowFormat) -> Uploader<Vec<u8>> {
    Uploader::new(
        Vec::new(),
        Arc::new(FieldDictionary::standard()),
        batch_size,
        format,
    )
}

fn data_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, contents) in files {
        std::fs::write(dir.path().join(name), contents).unwrap();
    }
    dir
}

const MOVIES: &str = "id,title,budget,tagline\n\
603,The Matrix,63000000,Free your mind\n\
604,\"Reloaded; The\",150000000,\"Fate, it seems\"\n";

#[tokio::test]
async fn test_record_mode_maps_header_to_ids() {
    let dir = data_dir(&[("movies.csv", MOVIES)]);
    let mut up = uploader(4096, RowFormat::Record);

    let summary = up
        .upload_file(Resource::Movies, &dir.path().join("movies.csv"))
        .await
        .unwrap();

    assert_eq!(summary.rows, 2);
    assert_eq!(summary.batches, 1);
    assert_eq!(
        parse(&up.into_inner()),
        vec![Sent {
            resource: 0,
            batches: vec![vec![
                "0=603;1=The Matrix;4=63000000".to_string(),
                "0=604;1=Reloaded  The;4=150000000".to_string(),
            ]],
            last: MSG_FIN,
        }]
    );
}

#[tokio::test]
async fn test_raw_mode_sends_row_text() {
    let dir = data_dir(&[("movies.csv", MOVIES)]);
    let mut up = uploader(4096, RowFormat::Raw);

    up.upload_file(Resource::Movies, &dir.path().join("movies.csv"))
        .await
        .unwrap();

    let sent = parse(&up.into_inner());
    assert_eq!(
        sent[0].batches[0],
        vec![
            "603,The Matrix,63000000,Free your mind",
            "604,\"Reloaded; The\",150000000,\"Fate, it seems\"",
        ]
    );
}

#[tokio::test]
async fn test_rows_with_wrong_field_count_skipped() {
    let dir = data_dir(&[("ratings.csv", "userId,movieId,rating\n1,603,4.5\n2,604\n3,605,3.0\n")]);
    let mut up = uploader(4096, RowFormat::Record);

    let summary = up
        .upload_file(Resource::Ratings, &dir.path().join("ratings.csv"))
        .await
        .unwrap();

    assert_eq!(summary.rows, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(
        parse(&up.into_inner())[0].batches[0],
        vec!["9=603;10=4.5", "9=605;10=3.0"]
    );
}

#[tokio::test]
async fn test_small_budget_splits_batches() {
    let dir = data_dir(&[("movies.csv", MOVIES)]);
    // room for exactly one encoded row per batch
    let mut up = uploader(5 + 4 + 33, RowFormat::Record);

    let summary = up
        .upload_file(Resource::Movies, &dir.path().join("movies.csv"))
        .await
        .unwrap();

    assert_eq!(summary.batches, 2);
    let sent = parse(&up.into_inner());
    assert_eq!(sent[0].batches.len(), 2);
    assert_eq!(sent[0].last, MSG_FIN);
}

#[tokio::test]
async fn test_upload_dir_sends_resources_in_order() {
    let dir = data_dir(&[
        ("movies.csv", MOVIES),
        ("credits.csv", "id,cast\n603,\"[{'name': 'Keanu Reeves'}]\"\n"),
        ("ratings.csv", "userId,movieId,rating\n"),
    ]);
    let mut up = uploader(4096, RowFormat::Record);

    let total = up.upload_dir(dir.path()).await.unwrap();
    assert_eq!(total.rows, 3);

    let sent = parse(&up.into_inner());
    let order: Vec<_> = sent.iter().map(|s| (s.resource, s.last)).collect();
    assert_eq!(order, vec![(0, MSG_FIN), (1, MSG_FIN), (2, MSG_FIN)]);
    assert_eq!(sent[1].batches[0], vec!["0=603;12=[{'name': 'Keanu Reeves'}]"]);
    assert!(sent[2].batches.is_empty());
}

#[tokio::test]
async fn test_missing_file_reports_error_to_gateway() {
    let dir = data_dir(&[("movies.csv", MOVIES)]);
    let mut up = uploader(4096, RowFormat::Record);

    let err = up.upload_dir(dir.path()).await.unwrap_err();
    assert!(matches!(err, ClientError::File { .. }), "{err:?}");

    let sent = parse(&up.into_inner());
    assert_eq!(sent.len(), 2);
    assert_eq!((sent[1].resource, sent[1].last), (1, MSG_ERROR));
}

#[tokio::test]
async fn test_oversized_row_aborts_resource() {
    let dir = data_dir(&[("movies.csv", MOVIES)]);
    let mut up = uploader(20, RowFormat::Raw);

    let err = up
        .upload_file(Resource::Movies, &dir.path().join("movies.csv"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::RowTooLarge { batch_size: 20, .. }));
    assert_eq!(parse(&up.into_inner())[0].last, MSG_ERROR);
}

#[tokio::test]
async fn test_empty_file_has_no_header() {
    let dir = data_dir(&[("movies.csv", "")]);
    let mut up = uploader(4096, RowFormat::Record);

    let err = up
        .upload_file(Resource::Movies, &dir.path().join("movies.csv"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::MissingHeader { .. }));
}
