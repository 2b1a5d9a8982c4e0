//! Minimal `xl/sharedStrings.xml` parsing.
//!
//! Template cells only need their visible text (placeholders are plain text),
//! so rich-text runs are flattened and phonetic/ruby annotations are skipped.

use std::borrow::Cow;

use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::Reader;

use crate::XlsxError;

pub fn parse_shared_strings_xml(xml: &str) -> Result<Vec<String>, XlsxError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut items = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"si" => {
                items.push(parse_si(&mut reader)?);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

fn parse_si(reader: &mut Reader<&[u8]>) -> Result<String, XlsxError> {
    let mut buf = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => {
                text.push_str(&read_text(reader, QName(b"t"))?);
            }
            Event::Start(e) if e.local_name().as_ref() == b"r" => {
                // Rich-text run: flatten to its visible `<t>` content.
            }
            Event::Start(e) => {
                // Phonetic runs and extension subtrees contain `<t>` elements
                // that are not part of the displayed string; skip them.
                reader.read_to_end_into(e.name(), &mut Vec::new())?;
            }
            Event::End(e) if e.local_name().as_ref() == b"si" => break,
            Event::Eof => {
                return Err(XlsxError::Invalid(
                    "unexpected eof in sharedStrings <si>".to_string(),
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}

fn read_text(reader: &mut Reader<&[u8]>, end: QName<'_>) -> Result<String, XlsxError> {
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => {
                let t: Cow<'_, str> = e.unescape()?;
                text.push_str(&t);
            }
            Event::CData(e) => {
                let t = std::str::from_utf8(e.as_ref())
                    .map_err(|e| XlsxError::Invalid(format!("sharedStrings cdata not utf-8: {e}")))?;
                text.push_str(t);
            }
            Event::End(e) if e.name() == end => break,
            Event::Eof => {
                return Err(XlsxError::Invalid(
                    "unexpected eof in sharedStrings <t>".to_string(),
                ))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}
