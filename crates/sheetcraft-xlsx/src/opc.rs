//! Open Packaging Convention plumbing: relationship parsing and part-name
//! resolution.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::XlsxError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub type_uri: String,
    pub target: String,
    pub target_mode: Option<String>,
}

impl Relationship {
    pub fn is_external(&self) -> bool {
        self.target_mode
            .as_deref()
            .is_some_and(|mode| mode.trim().eq_ignore_ascii_case("External"))
    }
}

/// The `.rels` part name for a given part (e.g. `xl/worksheets/sheet1.xml`
/// -> `xl/worksheets/_rels/sheet1.xml.rels`).
pub fn rels_for_part(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file_name)) => format!("{dir}/_rels/{file_name}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target against its source part.
///
/// Targets are URIs; producers sometimes include fragments (`../media/a.png#x`)
/// which OPC part names never carry, so fragments are stripped first.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    let target = target.split('#').next().unwrap_or(target);
    if target.is_empty() {
        // A target of just `#fragment` refers to the source part itself.
        return normalize(source_part);
    }
    if let Some(target) = target.strip_prefix('/') {
        return normalize(target);
    }

    let base_dir = source_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    normalize(&format!("{base_dir}/{target}"))
}

fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out.join("/")
}

/// Parse a `.rels` payload into its relationship entries.
pub fn parse_relationships(bytes: &[u8]) -> Result<Vec<Relationship>, XlsxError> {
    let xml = std::str::from_utf8(bytes)
        .map_err(|e| XlsxError::Invalid(format!("relationships part not utf-8: {e}")))?;
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut out = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e)
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut id = None;
                let mut type_uri = None;
                let mut target = None;
                let mut target_mode = None;
                for attr in e.attributes().with_checks(false) {
                    let attr = attr.map_err(quick_xml::Error::from)?;
                    let value = attr.unescape_value()?.into_owned();
                    match attr.key.as_ref() {
                        b"Id" => id = Some(value),
                        b"Type" => type_uri = Some(value),
                        b"Target" => target = Some(value),
                        b"TargetMode" => target_mode = Some(value),
                        _ => {}
                    }
                }
                let (Some(id), Some(type_uri), Some(target)) = (id, type_uri, target) else {
                    return Err(XlsxError::Invalid(
                        "relationship missing Id/Type/Target".to_string(),
                    ));
                };
                out.push(Relationship {
                    id,
                    type_uri,
                    target,
                    target_mode,
                });
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

/// Serialize relationships back to a `.rels` payload.
pub fn write_relationships(rels: &[Relationship]) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push_str(
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for rel in rels {
        out.push_str(&format!(
            r#"<Relationship Id="{}" Type="{}" Target="{}""#,
            escape_attr(&rel.id),
            escape_attr(&rel.type_uri),
            escape_attr(&rel.target),
        ));
        if let Some(mode) = &rel.target_mode {
            out.push_str(&format!(r#" TargetMode="{}""#, escape_attr(mode)));
        }
        out.push_str("/>");
    }
    out.push_str("</Relationships>");
    out.into_bytes()
}

/// Next unused `rId<N>` among `rels`.
pub fn next_rel_id(rels: &[Relationship]) -> String {
    let max = rels
        .iter()
        .filter_map(|rel| rel.id.strip_prefix("rId"))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("rId{}", max + 1)
}

pub(crate) fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

pub(crate) fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rels_for_part_in_root() {
        assert_eq!(rels_for_part("workbook.xml"), "_rels/workbook.xml.rels");
    }

    #[test]
    fn rels_for_part_in_subdir() {
        assert_eq!(rels_for_part("xl/workbook.xml"), "xl/_rels/workbook.xml.rels");
    }

    #[test]
    fn resolve_target_relative_to_source_dir() {
        assert_eq!(
            resolve_target("xl/worksheets/sheet1.xml", "../media/image1.png"),
            "xl/media/image1.png"
        );
    }

    #[test]
    fn resolve_target_strips_fragments() {
        assert_eq!(
            resolve_target("xl/workbook.xml", "worksheets/sheet1.xml#rId1"),
            "xl/worksheets/sheet1.xml"
        );
    }

    #[test]
    fn resolve_target_absolute_paths_are_normalized() {
        assert_eq!(
            resolve_target("xl/workbook.xml", "/xl/../docProps/core.xml"),
            "docProps/core.xml"
        );
    }

    #[test]
    fn relationships_roundtrip() {
        let rels = vec![Relationship {
            id: "rId1".to_string(),
            type_uri: "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet"
                .to_string(),
            target: "worksheets/sheet1.xml".to_string(),
            target_mode: None,
        }];
        let xml = write_relationships(&rels);
        let parsed = parse_relationships(&xml).unwrap();
        assert_eq!(parsed, rels);
        assert_eq!(next_rel_id(&parsed), "rId2");
    }
}
