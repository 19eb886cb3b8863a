//! Shared fixtures: a camt.053-shaped statement parser, a pain.001-shaped
//! payment parser, and XML builders for synthetic documents.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use iso20022_core::error::{Error, Result};
use iso20022_core::header::ApplicationHeader;
use iso20022_core::identifier::MessageIdentifier;
use iso20022_core::options::ParseOptions;

use iso20022_parsers::cursor::{ElementStart, XmlCursor, XmlEvent};
use iso20022_parsers::document::{Diagnostics, DocumentParser};
use iso20022_parsers::streaming::StreamingParser;

pub fn camt053() -> MessageIdentifier {
    MessageIdentifier::parse("camt.053.001.08").unwrap()
}

pub fn pain001() -> MessageIdentifier {
    MessageIdentifier::parse("pain.001.001.09").unwrap()
}

/// One statement entry, camt.053-shaped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementEntry {
    pub reference: String,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub credit_debit: String,
    pub status: String,
    pub booking_date: Option<NaiveDate>,
    pub value_date: Option<NaiveDate>,
}

/// Eager statement header
#[derive(Debug, Clone, Default)]
pub struct StatementHeader {
    pub message_id: String,
    pub declared_entry_count: Option<u64>,
}

/// Streaming parser for camt.053-shaped bank statements
pub struct StatementParser {
    messages: Vec<MessageIdentifier>,
}

impl StatementParser {
    pub fn new() -> Self {
        Self {
            messages: vec![camt053()],
        }
    }
}

#[async_trait]
impl StreamingParser for StatementParser {
    type Entry = StatementEntry;
    type Header = StatementHeader;

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
        let mut entry = StatementEntry::default();

        loop {
            match cursor.next().await? {
                XmlEvent::ElementStart(element) => match element.name.as_str() {
                    "NtryRef" => entry.reference = cursor.read_text().await?,
                    "Amt" => {
                        let (amount, currency) = cursor.read_amount(&element).await?;
                        entry.amount = amount;
                        entry.currency = currency;
                    }
                    "CdtDbtInd" => entry.credit_debit = cursor.read_text().await?,
                    "Sts" => entry.status = cursor.read_text().await?,
                    "BookgDt" => {
                        entry.booking_date = Some(cursor.read_date_choice().await?.civil_date())
                    }
                    "ValDt" => {
                        entry.value_date = Some(cursor.read_date_choice().await?.civil_date())
                    }
                    _ => cursor.skip_subtree().await?,
                },
                XmlEvent::ElementEnd { .. } => {
                    if cursor.depth() < entry_depth {
                        return Ok(entry);
                    }
                }
                XmlEvent::Text(_) => {}
                XmlEvent::Eof => {
                    return Err(Error::malformed("document ended inside an entry"))
                }
            }
        }
    }

    async fn parse_header(
        &self,
        cursor: &mut XmlCursor<'_>,
        _message_id: &MessageIdentifier,
    ) -> Result<Self::Header> {
        // Stops at the first entry; the header phase must not stream the body.
        let mut header = StatementHeader::default();
        loop {
            match cursor.next().await? {
                XmlEvent::ElementStart(element) => match element.name.as_str() {
                    "MsgId" => header.message_id = cursor.read_text().await?,
                    "NbOfNtries" => {
                        header.declared_entry_count =
                            cursor.read_text().await?.trim().parse().ok();
                    }
                    "Ntry" => break,
                    _ => {}
                },
                XmlEvent::Eof => break,
                _ => {}
            }
        }
        Ok(header)
    }

    fn expected_entry_count(&self, header: &Self::Header) -> Option<u64> {
        header.declared_entry_count
    }
}

/// Whole-document value for pain.001-shaped payment initiations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentInitiation {
    pub message_id: String,
    pub transaction_count: u64,
}

/// Document parser for pain.001-shaped payment initiations
pub struct PaymentInitiationParser {
    messages: Vec<MessageIdentifier>,
}

impl PaymentInitiationParser {
    pub fn new() -> Self {
        Self {
            messages: vec![pain001(), MessageIdentifier::parse("pain.001.001.10").unwrap()],
        }
    }
}

#[async_trait]
impl DocumentParser for PaymentInitiationParser {
    type Document = PaymentInitiation;

    fn supported_messages(&self) -> &[MessageIdentifier] {
        &self.messages
    }

    async fn parse_document_core(
        &self,
        cursor: &mut XmlCursor<'_>,
        _message_id: &MessageIdentifier,
        _application_header: Option<&ApplicationHeader>,
        _options: &ParseOptions,
        diagnostics: &mut Diagnostics,
        _cancel: &CancellationToken,
    ) -> Result<Self::Document> {
        let mut document = PaymentInitiation::default();
        let body_depth = cursor.depth();

        loop {
            match cursor.next().await? {
                XmlEvent::ElementStart(element) => match element.name.as_str() {
                    "MsgId" => document.message_id = cursor.read_text().await?,
                    "CdtTrfTxInf" => {
                        document.transaction_count += 1;
                        cursor.skip_subtree().await?;
                    }
                    "NbOfTxs" => {
                        let text = cursor.read_text().await?;
                        if text.trim().parse::<u64>().is_err() {
                            diagnostics
                                .add_error(cursor.issue(format!("NbOfTxs '{text}' is not numeric")));
                        }
                    }
                    _ => {}
                },
                XmlEvent::ElementEnd { .. } => {
                    if cursor.depth() < body_depth {
                        return Ok(document);
                    }
                }
                XmlEvent::Text(_) => {}
                XmlEvent::Eof => return Ok(document),
            }
        }
    }
}

/// Build a camt.053-shaped statement with `count` entries
///
/// Entry `i` (1-based) carries `NtryRef = ENTRY-%06d`, an EUR amount of
/// `100 + i`, alternating `DBIT`/`CRDT`, status `BOOK`, and fixed
/// booking/value dates.
pub fn statement_xml(count: usize) -> String {
    statement_xml_with(count, |_| None)
}

/// Statement builder with per-entry overrides; return `Some(xml)` from
/// `override_entry` to replace the whole `<Ntry>` element
pub fn statement_xml_with(
    count: usize,
    override_entry: impl Fn(usize) -> Option<String>,
) -> String {
    let mut xml = String::with_capacity(256 + count * 256);
    xml.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Document xmlns="urn:iso:std:iso:20022:tech:xsd:camt.053.001.08">
  <BkToCstmrStmt>
    <GrpHdr><MsgId>STMT-2024-001</MsgId></GrpHdr>
    <Stmt>
      <Id>ACCT-1</Id>
"#,
    );
    for i in 1..=count {
        match override_entry(i) {
            Some(custom) => xml.push_str(&custom),
            None => {
                let indicator = if i % 2 == 1 { "DBIT" } else { "CRDT" };
                xml.push_str(&format!(
                    "      <Ntry>\
                     <NtryRef>ENTRY-{i:06}</NtryRef>\
                     <Amt Ccy=\"EUR\">{}</Amt>\
                     <CdtDbtInd>{indicator}</CdtDbtInd>\
                     <Sts>BOOK</Sts>\
                     <BookgDt><Dt>2024-01-15</Dt></BookgDt>\
                     <ValDt><Dt>2024-01-16</Dt></ValDt>\
                     </Ntry>\n",
                    100 + i
                ));
            }
        }
    }
    xml.push_str("    </Stmt>\n  </BkToCstmrStmt>\n</Document>\n");
    xml
}

/// An entry whose amount does not parse; used for error-skip tests
pub fn broken_entry(i: usize) -> String {
    format!(
        "      <Ntry>\
         <NtryRef>ENTRY-{i:06}</NtryRef>\
         <Amt Ccy=\"EUR\">not-a-number</Amt>\
         <CdtDbtInd>DBIT</CdtDbtInd>\
         </Ntry>\n"
    )
}

/// Build a pain.001-shaped payment initiation with `count` transactions
pub fn payment_xml(count: usize) -> String {
    payment_xml_with_header(count, None)
}

/// Payment initiation wrapped in a `BizMsgEnvlp` with the given AppHdr
/// body (defaults to a complete header)
pub fn payment_xml_with_header(count: usize, app_hdr_body: Option<&str>) -> String {
    let body = {
        let mut body = String::new();
        body.push_str(
            r#"  <Document xmlns="urn:iso:std:iso:20022:tech:xsd:pain.001.001.09">
    <CstmrCdtTrfInitn>
      <GrpHdr><MsgId>PAY-2024-001</MsgId><NbOfTxs>"#,
        );
        body.push_str(&count.to_string());
        body.push_str("</NbOfTxs></GrpHdr>\n      <PmtInf>\n");
        for i in 1..=count {
            body.push_str(&format!(
                "        <CdtTrfTxInf><PmtId><EndToEndId>E2E-{i:04}</EndToEndId></PmtId></CdtTrfTxInf>\n"
            ));
        }
        body.push_str("      </PmtInf>\n    </CstmrCdtTrfInitn>\n  </Document>\n");
        body
    };

    match app_hdr_body {
        None => format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}",
            body.replace("  <Document", "<Document")
        ),
        Some(header) => format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<BizMsgEnvlp>\n  <AppHdr xmlns=\"urn:iso:std:iso:20022:tech:xsd:head.001.001.02\">\n{header}\n  </AppHdr>\n{body}</BizMsgEnvlp>\n"
        ),
    }
}

/// A complete, well-formed AppHdr body
pub fn full_app_hdr() -> &'static str {
    r#"    <Fr><FIId><FinInstnId><BICFI>AAAADEFF</BICFI><Nm>Alpha Bank</Nm></FinInstnId></FIId></Fr>
    <To><FIId><FinInstnId><BICFI>BBBBDEFF</BICFI></FinInstnId></FIId></To>
    <BizMsgIdr>MSG-0001</BizMsgIdr>
    <MsgDefIdr>pain.001.001.09</MsgDefIdr>
    <BizSvc>swift.cbprplus.02</BizSvc>
    <CreDt>2024-03-01T10:15:30+00:00</CreDt>
    <Prty>NORM</Prty>"#
}
