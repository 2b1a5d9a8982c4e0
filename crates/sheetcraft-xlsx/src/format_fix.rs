//! Post-render structural repair for packaged documents.
//!
//! Some viewers expect `xdr:`-prefixed spreadsheetDrawing anchors and reject
//! drawing parts written with the default namespace. The fixer rewrites
//! `xl/drawings/drawing*.xml` entries at the tag-grammar level (element name
//! plus attribute tail) instead of re-serializing the XML, so every byte it
//! does not need to touch passes through verbatim.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::{XlsxError, XlsxPackage};

const NS_XDR: &str = "http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing";

/// Identifier of the anchor-prefixing rule in [`FormatFixReport::rules_applied`].
pub const RULE_PREFIX_DRAWING_ANCHORS: &str = "prefix_drawing_anchors";

/// Which repair rules run. Future rules are additive and independently
/// toggled by new fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatFixConfig {
    pub prefix_drawing_anchors: bool,
}

impl Default for FormatFixConfig {
    fn default() -> Self {
        Self {
            prefix_drawing_anchors: true,
        }
    }
}

/// Outcome of one format-fix invocation. Immutable after return.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormatFixReport {
    pub rules_applied: BTreeSet<String>,
    pub changed_entries: Vec<String>,
    pub logs: Vec<String>,
}

impl FormatFixReport {
    pub fn changed_anything(&self) -> bool {
        !self.changed_entries.is_empty()
    }
}

/// Apply the configured rules to a package.
///
/// Pure with respect to the input: unmatched entries are carried into the
/// output byte-for-byte and entry order is preserved, keeping the package's
/// internal relationship indices valid.
pub fn fix_package(package: &XlsxPackage, config: &FormatFixConfig) -> (XlsxPackage, FormatFixReport) {
    let mut out = XlsxPackage::default();
    let mut report = FormatFixReport::default();

    for (name, bytes) in package.parts() {
        let mut new_bytes: Option<Vec<u8>> = None;

        if config.prefix_drawing_anchors && is_drawing_part(name) {
            match std::str::from_utf8(bytes) {
                Ok(xml) => {
                    let fixed = add_xdr_prefix(xml);
                    if fixed != xml {
                        report.rules_applied.insert(RULE_PREFIX_DRAWING_ANCHORS.to_string());
                        report.changed_entries.push(name.to_string());
                        report.logs.push(format!("[prefix] {name}: anchors prefixed"));
                        new_bytes = Some(fixed.into_bytes());
                    } else {
                        report.logs.push(format!("[skip] {name}: no change"));
                    }
                }
                Err(_) => {
                    report.logs.push(format!("[skip] {name}: not utf-8"));
                }
            }
        }

        match new_bytes {
            Some(bytes) => out.set_part(name.to_string(), bytes),
            None => out.set_part(name.to_string(), bytes.to_vec()),
        }
    }

    (out, report)
}

/// Fix a package file on disk. A non-container input is fatal for the fix
/// step; callers doing best-effort post-processing keep their unfixed output.
pub fn fix_xlsx(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &FormatFixConfig,
) -> Result<FormatFixReport, XlsxError> {
    let package = XlsxPackage::from_path(input)?;
    let (fixed, report) = fix_package(&package, config);
    fixed.save_to_path(output)?;
    Ok(report)
}

fn is_drawing_part(name: &str) -> bool {
    name.starts_with("xl/drawings/drawing") && name.ends_with(".xml")
}

fn anchor_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<\s*(twoCellAnchor|oneCellAnchor|absoluteAnchor)([^>]*)>").unwrap()
    })
}

fn anchor_close_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</\s*(twoCellAnchor|oneCellAnchor|absoluteAnchor)\s*>").unwrap())
}

fn root_wsdr_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<\s*((?:xdr:)?wsDr)([^>]*)>").unwrap())
}

/// Both rewrites are idempotent: prefixed tags no longer match the patterns,
/// and the namespace binding is only inserted when absent.
fn add_xdr_prefix(xml: &str) -> String {
    let mut out = xml.to_string();

    let root_patch = root_wsdr_open_re().captures(&out).and_then(|caps| {
        let attrs = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        if attrs.contains("xmlns:xdr") {
            return None;
        }
        let root = caps.get(1).map(|m| m.as_str()).unwrap_or("wsDr");
        let replacement = format!(r#"<{root}{} xmlns:xdr="{NS_XDR}">"#, attrs.trim_end());
        Some((caps.get(0)?.range(), replacement))
    });
    if let Some((range, replacement)) = root_patch {
        out.replace_range(range, &replacement);
    }

    let out = anchor_open_re().replace_all(&out, "<xdr:$1$2>").into_owned();
    anchor_close_re().replace_all(&out, "</xdr:$1>").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const UNPREFIXED: &str = r#"<?xml version="1.0"?><wsDr xmlns="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing"><twoCellAnchor editAs="oneCell"><from/><to/></twoCellAnchor><oneCellAnchor><from/></oneCellAnchor></wsDr>"#;

    fn package_with_drawing(xml: &str) -> XlsxPackage {
        let mut pkg = XlsxPackage::default();
        pkg.set_part("[Content_Types].xml", b"<Types></Types>".to_vec());
        pkg.set_part("xl/drawings/drawing1.xml", xml.as_bytes().to_vec());
        pkg.set_part("xl/worksheets/sheet1.xml", b"<worksheet/>".to_vec());
        pkg
    }

    #[test]
    fn prefixes_default_namespace_anchors() {
        let (fixed, report) = fix_package(&package_with_drawing(UNPREFIXED), &FormatFixConfig::default());

        let xml = fixed.part_str("xl/drawings/drawing1.xml").unwrap();
        assert!(xml.contains(r#"<xdr:twoCellAnchor editAs="oneCell">"#));
        assert!(xml.contains("</xdr:twoCellAnchor>"));
        assert!(xml.contains("<xdr:oneCellAnchor>"));
        assert!(xml.contains(r#"xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing""#));

        assert_eq!(report.changed_entries, vec!["xl/drawings/drawing1.xml".to_string()]);
        assert!(report.rules_applied.contains(RULE_PREFIX_DRAWING_ANCHORS));
    }

    #[test]
    fn already_prefixed_entries_are_untouched() {
        let prefixed = r#"<xdr:wsDr xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing"><xdr:twoCellAnchor><xdr:from/></xdr:twoCellAnchor></xdr:wsDr>"#;
        let (fixed, report) = fix_package(&package_with_drawing(prefixed), &FormatFixConfig::default());

        assert_eq!(fixed.part_str("xl/drawings/drawing1.xml").unwrap(), prefixed);
        assert!(report.changed_entries.is_empty());
        assert!(report.rules_applied.is_empty());
    }

    #[test]
    fn fix_is_idempotent() {
        let cfg = FormatFixConfig::default();
        let (once, _) = fix_package(&package_with_drawing(UNPREFIXED), &cfg);
        let (twice, report) = fix_package(&once, &cfg);

        assert_eq!(
            once.part("xl/drawings/drawing1.xml"),
            twice.part("xl/drawings/drawing1.xml")
        );
        assert!(report.changed_entries.is_empty());
    }

    #[test]
    fn unmatched_entries_pass_through_bytewise() {
        let pkg = package_with_drawing(UNPREFIXED);
        let (fixed, _) = fix_package(&pkg, &FormatFixConfig::default());
        assert_eq!(fixed.part("xl/worksheets/sheet1.xml"), pkg.part("xl/worksheets/sheet1.xml"));
        let names_in: Vec<&str> = pkg.part_names().collect();
        let names_out: Vec<&str> = fixed.part_names().collect();
        assert_eq!(names_in, names_out);
    }

    #[test]
    fn disabled_rule_changes_nothing() {
        let cfg = FormatFixConfig {
            prefix_drawing_anchors: false,
        };
        let (fixed, report) = fix_package(&package_with_drawing(UNPREFIXED), &cfg);
        assert_eq!(fixed.part_str("xl/drawings/drawing1.xml").unwrap(), UNPREFIXED);
        assert!(report.logs.is_empty());
    }
}
