//! Combinators composed over real entry sequences

mod common;

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use iso20022_core::options::ParseOptions;

use iso20022_parsers::streaming::parse_entries;

use common::{statement_xml, StatementEntry, StatementParser};

fn byte_stream(xml: String) -> std::io::Cursor<Vec<u8>> {
    std::io::Cursor::new(xml.into_bytes())
}

fn entries(count: usize) -> iso20022_parsers::EntrySequence<StatementEntry> {
    parse_entries(
        Arc::new(StatementParser::new()),
        byte_stream(statement_xml(count)),
        ParseOptions::default(),
        CancellationToken::new(),
    )
}

#[tokio::test]
async fn test_batching_a_statement() {
    let mut batches = entries(105).batch(50).unwrap();

    let mut sizes = Vec::new();
    let mut first_refs = Vec::new();
    while let Some(batch) = batches.next().await {
        let batch = batch.unwrap();
        sizes.push(batch.len());
        first_refs.push(batch[0].reference.clone());
    }

    assert_eq!(sizes, vec![50, 50, 5]);
    assert_eq!(
        first_refs,
        vec!["ENTRY-000001", "ENTRY-000051", "ENTRY-000101"]
    );
}

#[tokio::test]
async fn test_skip_take_window_over_entries() {
    let mut window = entries(40).skip(10).take(5);

    let mut refs = Vec::new();
    while let Some(entry) = window.next().await {
        refs.push(entry.unwrap().reference);
    }

    assert_eq!(
        refs,
        vec![
            "ENTRY-000011",
            "ENTRY-000012",
            "ENTRY-000013",
            "ENTRY-000014",
            "ENTRY-000015"
        ]
    );
}

#[tokio::test]
async fn test_take_stops_reading_upstream() {
    // take(3) over a large statement must finish quickly and not drain
    // the remaining entries.
    let mut limited = entries(5000).take(3);
    let mut count = 0;
    while let Some(entry) = limited.next().await {
        entry.unwrap();
        count += 1;
    }
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_buffer_decouples_producer() {
    let mut buffered = entries(200).buffer(16).unwrap();
    let mut refs = Vec::new();
    while let Some(entry) = buffered.next().await {
        refs.push(entry.unwrap().reference);
    }
    assert_eq!(refs.len(), 200);
    assert_eq!(refs[0], "ENTRY-000001");
    assert_eq!(refs[199], "ENTRY-000200");
}

#[tokio::test]
async fn test_parallel_map_enriches_entries() {
    let mut mapped = entries(60)
        .parallel_map(
            |entry| async move { Ok((entry.reference.clone(), entry.amount)) },
            8,
        )
        .unwrap();

    let mut seen = Vec::new();
    while let Some(item) = mapped.next().await {
        seen.push(item.unwrap());
    }

    // Unordered delivery, multiset equality.
    assert_eq!(seen.len(), 60);
    seen.sort();
    assert_eq!(seen[0].0, "ENTRY-000001");
    assert_eq!(seen[59].0, "ENTRY-000060");
}

#[tokio::test]
async fn test_cancellation_passes_through_combinators() {
    let cancel = CancellationToken::new();
    let sequence = parse_entries(
        Arc::new(StatementParser::new()),
        byte_stream(statement_xml(1000)),
        ParseOptions::default(),
        cancel.clone(),
    );
    let mut batches = sequence.batch(10).unwrap();

    let first = batches.next().await.unwrap().unwrap();
    assert_eq!(first.len(), 10);

    cancel.cancel();
    let mut saw_cancellation = false;
    while let Some(item) = batches.next().await {
        if let Err(err) = item {
            assert!(err.is_cancellation(), "got {err}");
            saw_cancellation = true;
            break;
        }
    }
    assert!(saw_cancellation);
    assert!(batches.next().await.is_none());
}
