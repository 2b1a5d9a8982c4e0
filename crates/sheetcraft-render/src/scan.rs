//! Placeholder recognition in cell text.
//!
//! Three grammars coexist:
//!
//! - `{{ expr }}` variable placeholders, recognized anywhere in a cell;
//! - `{% for item in seq %}` / `{% endfor %}` loop markers, recognized as
//!   structural only when they occupy the cell's entire trimmed text. A
//!   marker embedded inside larger text stays literal text; this asymmetry
//!   is deliberate and load-bearing for existing templates.
//! - image directives: a fixed sentinel prefix followed by a JSON payload.

use std::sync::OnceLock;

use regex::Regex;

use crate::images::ImageDirective;

/// Prefix marking a cell as an inline image directive; the remainder of the
/// cell text is the JSON payload.
pub const IMAGE_SENTINEL: &str = "__SHEETCRAFT_IMG__";

/// A recognized placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Placeholder {
    Variable(String),
    LoopOpen {
        sequence_expr: String,
        item_name: String,
    },
    LoopClose,
    Image(Result<ImageDirective, String>),
}

fn var_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").unwrap())
}

fn full_var_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\{\{\s*([^{}]+?)\s*\}\}$").unwrap())
}

fn loop_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\{%\s*for\s+([A-Za-z_][A-Za-z0-9_]*)\s+in\s+(.+?)\s*%\}$").unwrap()
    })
}

fn loop_close_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\{%\s*endfor\s*%\}$").unwrap())
}

/// Classify a cell's text as a structural placeholder, if it is one.
///
/// Structural recognition requires the *entire* trimmed text to match; cells
/// mixing markers with other text (or plain text) return `None` and go
/// through ordinary variable substitution instead.
pub fn classify_cell(text: &str) -> Option<Placeholder> {
    let trimmed = text.trim();

    if let Some(payload) = trimmed.strip_prefix(IMAGE_SENTINEL) {
        let parsed = serde_json::from_str::<ImageDirective>(payload.trim())
            .map_err(|e| e.to_string());
        return Some(Placeholder::Image(parsed));
    }
    if let Some(caps) = loop_open_re().captures(trimmed) {
        return Some(Placeholder::LoopOpen {
            item_name: caps[1].to_string(),
            sequence_expr: caps[2].to_string(),
        });
    }
    if loop_close_re().is_match(trimmed) {
        return Some(Placeholder::LoopClose);
    }
    if let Some(caps) = full_var_re().captures(trimmed) {
        return Some(Placeholder::Variable(caps[1].to_string()));
    }
    None
}

/// Expressions of every `{{ ... }}` occurrence in the text, in order.
pub fn scan_variables(text: &str) -> Vec<&str> {
    var_re()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Replace every `{{ expr }}` occurrence using `resolve`, leaving the rest of
/// the text untouched. `resolve` returning `None` substitutes empty.
pub fn substitute_variables(text: &str, mut resolve: impl FnMut(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in var_re().captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&text[last..whole.start()]);
        out.push_str(&resolve(&caps[1]).unwrap_or_default());
        last = whole.end();
    }
    out.push_str(&text[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn full_cell_markers_are_structural() {
        assert_eq!(
            classify_cell("{% for item in items %}"),
            Some(Placeholder::LoopOpen {
                sequence_expr: "items".to_string(),
                item_name: "item".to_string(),
            })
        );
        assert_eq!(classify_cell("  {% endfor %}  "), Some(Placeholder::LoopClose));
        assert_eq!(
            classify_cell("{{ title }}"),
            Some(Placeholder::Variable("title".to_string()))
        );
    }

    #[test]
    fn embedded_markers_are_literal_text() {
        assert_eq!(classify_cell("see {% for x in xs %} above"), None);
        assert_eq!(classify_cell("trailing {% endfor %}"), None);
        assert_eq!(classify_cell("Total: {{ total }} EUR"), None);
        assert_eq!(classify_cell("plain text"), None);
    }

    #[test]
    fn image_sentinel_carries_json_payload() {
        let text = r#"__SHEETCRAFT_IMG__{"path": "logo.png", "keep_ratio": true}"#;
        match classify_cell(text) {
            Some(Placeholder::Image(Ok(directive))) => {
                assert_eq!(directive.path, "logo.png");
                assert!(directive.keep_ratio);
                assert!(!directive.in_cell);
            }
            other => panic!("unexpected classification: {other:?}"),
        }

        match classify_cell("__SHEETCRAFT_IMG__not json") {
            Some(Placeholder::Image(Err(_))) => {}
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn substitution_replaces_all_occurrences() {
        let out = substitute_variables("{{ a }} + {{ b }} = {{ missing }}!", |expr| match expr {
            "a" => Some("1".to_string()),
            "b" => Some("2".to_string()),
            _ => None,
        });
        assert_eq!(out, "1 + 2 = !");
        assert_eq!(scan_variables("{{ a }}{{b|upper}}"), vec!["a", "b|upper"]);
    }
}
