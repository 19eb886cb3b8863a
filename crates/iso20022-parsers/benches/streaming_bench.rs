//! Entry-stream throughput over a synthetic camt.053-shaped statement

use std::sync::Arc;

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use iso20022_core::error::Result;
use iso20022_core::identifier::MessageIdentifier;
use iso20022_core::options::ParseOptions;

use iso20022_parsers::cursor::{ElementStart, XmlCursor, XmlEvent};
use iso20022_parsers::streaming::{count_entries, parse_entries, StreamingParser};

struct BenchEntry {
    #[allow(dead_code)]
    reference: String,
}

struct BenchParser {
    messages: Vec<MessageIdentifier>,
}

impl BenchParser {
    fn new() -> Self {
        Self {
            messages: vec![MessageIdentifier::parse("camt.053.001.08").unwrap()],
        }
    }
}

#[async_trait]
impl StreamingParser for BenchParser {
    type Entry = BenchEntry;
    type Header = ();

    fn supported_messages(&self) -> &[MessageIdentifier] {
        &self.messages
    }

    fn entry_element_name(&self) -> &str {
        "Ntry"
    }

    async fn parse_entry(
        &self,
        cursor: &mut XmlCursor<'_>,
        _entry: &ElementStart,
        _cancel: &CancellationToken,
    ) -> Result<Self::Entry> {
        let entry_depth = cursor.depth();
        let mut reference = String::new();
        loop {
            match cursor.next().await? {
                XmlEvent::ElementStart(e) if e.name == "NtryRef" => {
                    reference = cursor.read_text().await?;
                }
                XmlEvent::ElementEnd { .. } => {
                    if cursor.depth() < entry_depth {
                        return Ok(BenchEntry { reference });
                    }
                }
                XmlEvent::Eof => return Ok(BenchEntry { reference }),
                _ => {}
            }
        }
    }

    async fn parse_header(
        &self,
        _cursor: &mut XmlCursor<'_>,
        _message_id: &MessageIdentifier,
    ) -> Result<Self::Header> {
        Ok(())
    }
}

fn statement_xml(count: usize) -> String {
    let mut xml = String::with_capacity(128 + count * 160);
    xml.push_str(
        "<Document xmlns=\"urn:iso:std:iso:20022:tech:xsd:camt.053.001.08\">\
         <BkToCstmrStmt><Stmt>",
    );
    for i in 1..=count {
        xml.push_str(&format!(
            "<Ntry><NtryRef>ENTRY-{i:06}</NtryRef>\
             <Amt Ccy=\"EUR\">{}</Amt>\
             <Sts>BOOK</Sts></Ntry>",
            100 + i
        ));
    }
    xml.push_str("</Stmt></BkToCstmrStmt></Document>");
    xml
}

fn bench_streaming(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let xml = statement_xml(10_000);

    let mut group = c.benchmark_group("streaming");
    group.throughput(Throughput::Bytes(xml.len() as u64));

    group.bench_function("parse_entries_10k", |b| {
        b.to_async(&runtime).iter(|| {
            let xml = xml.clone();
            async move {
                let mut entries = parse_entries(
                    Arc::new(BenchParser::new()),
                    std::io::Cursor::new(xml.into_bytes()),
                    ParseOptions::default(),
                    CancellationToken::new(),
                );
                let mut total = 0u64;
                while let Some(item) = entries.next().await {
                    item.unwrap();
                    total += 1;
                }
                total
            }
        });
    });

    group.bench_function("count_entries_10k", |b| {
        b.to_async(&runtime).iter(|| {
            let xml = xml.clone();
            async move {
                let parser = BenchParser::new();
                count_entries(
                    &parser,
                    std::io::Cursor::new(xml.into_bytes()),
                    &CancellationToken::new(),
                )
                .await
                .unwrap()
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_streaming);
criterion_main!(benches);
