//! Expression evaluation for placeholders.
//!
//! The language is deliberately tiny: a dotted/indexed path into the data
//! context (`items.0.name`, `item["price"]`) followed by an optional chain of
//! named unary filters (`title|upper|trim`). No arithmetic, no literals, no
//! conditionals.

use std::collections::HashMap;

use sheetcraft_model::Value;

type Filter = Box<dyn Fn(&Value) -> Value + Send + Sync>;

/// Evaluation faults, per placeholder. Both are tolerated by the renderer
/// (the placeholder substitutes empty) and recorded as warnings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("variable {0:?} is not present in the data context")]
    MissingVariable(String),
    #[error("unknown filter {0:?}")]
    UnknownFilter(String),
}

/// One lookup scope: the caller's data context, optionally shadowed by a
/// single loop-item binding. Bindings never leak across loop iterations; a
/// fresh scope is built per cloned row.
#[derive(Copy, Clone, Debug)]
pub struct Scope<'a> {
    root: &'a Value,
    binding: Option<(&'a str, &'a Value)>,
}

impl<'a> Scope<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self {
            root,
            binding: None,
        }
    }

    pub fn with_binding(root: &'a Value, name: &'a str, value: &'a Value) -> Self {
        Self {
            root,
            binding: Some((name, value)),
        }
    }

    fn lookup(&self, name: &str) -> Option<&'a Value> {
        if let Some((bound, value)) = self.binding {
            if bound == name {
                return Some(value);
            }
        }
        self.root.get(name)
    }
}

/// Path-plus-filters evaluator with a name-keyed filter registry.
///
/// Filter registration is setup-time configuration: register everything
/// before the first render and share the evaluator immutably afterwards.
pub struct Evaluator {
    filters: HashMap<String, Filter>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    /// An evaluator pre-loaded with the builtin filters `upper`, `lower`,
    /// `trim` and `length`.
    pub fn new() -> Self {
        let mut eval = Self {
            filters: HashMap::new(),
        };
        eval.register_filter("upper", |v| {
            Value::String(v.to_display_string().to_uppercase())
        });
        eval.register_filter("lower", |v| {
            Value::String(v.to_display_string().to_lowercase())
        });
        eval.register_filter("trim", |v| Value::String(v.to_display_string().trim().to_string()));
        eval.register_filter("length", |v| match v {
            Value::Sequence(items) => Value::Number(items.len() as f64),
            Value::String(s) => Value::Number(s.chars().count() as f64),
            Value::Mapping(map) => Value::Number(map.len() as f64),
            _ => Value::Number(0.0),
        });
        eval
    }

    pub fn register_filter(
        &mut self,
        name: impl Into<String>,
        filter: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) {
        self.filters.insert(name.into(), Box::new(filter));
    }

    /// Resolve a full expression (path plus filter chain) to a value.
    pub fn evaluate(&self, expr: &str, scope: &Scope<'_>) -> Result<Value, EvalError> {
        let mut parts = expr.split('|').map(str::trim);
        let path = parts.next().unwrap_or("");

        let mut value = self.resolve_path(path, scope)?.clone();
        for filter_name in parts {
            if filter_name.is_empty() {
                continue;
            }
            let filter = self
                .filters
                .get(filter_name)
                .ok_or_else(|| EvalError::UnknownFilter(filter_name.to_string()))?;
            value = filter(&value);
        }
        Ok(value)
    }

    fn resolve_path<'a>(&self, path: &str, scope: &Scope<'a>) -> Result<&'a Value, EvalError> {
        let segments = parse_path(path);
        let mut segments = segments.into_iter();

        let head = match segments.next() {
            Some(PathSegment::Key(name)) if !name.is_empty() => name,
            _ => return Err(EvalError::MissingVariable(path.to_string())),
        };
        let mut current = scope
            .lookup(&head)
            .ok_or_else(|| EvalError::MissingVariable(path.to_string()))?;

        for segment in segments {
            current = match segment {
                PathSegment::Key(key) => {
                    // Numeric segments double as sequence indices (`items.0`).
                    match key.parse::<usize>() {
                        Ok(idx) => current.index(idx).or_else(|| current.get(&key)),
                        Err(_) => current.get(&key),
                    }
                }
                PathSegment::Index(idx) => current.index(idx),
            }
            .ok_or_else(|| EvalError::MissingVariable(path.to_string()))?;
        }
        Ok(current)
    }
}

enum PathSegment {
    Key(String),
    Index(usize),
}

/// Split `items.0.name` / `item["price"]` / `rows[2].total` into segments.
fn parse_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    let mut rest = path.trim();

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('[') {
            let Some(end) = after.find(']') else {
                // Unterminated bracket: keep the raw text as a key so the
                // lookup fails with MissingVariable rather than panicking.
                segments.push(PathSegment::Key(rest.to_string()));
                break;
            };
            let inner = after[..end].trim();
            let quoted = inner
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .or_else(|| inner.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')));
            match quoted {
                Some(key) => segments.push(PathSegment::Key(key.to_string())),
                None => match inner.parse::<usize>() {
                    Ok(idx) => segments.push(PathSegment::Index(idx)),
                    Err(_) => segments.push(PathSegment::Key(inner.to_string())),
                },
            }
            rest = after[end + 1..].strip_prefix('.').unwrap_or(&after[end + 1..]);
        } else {
            let end = rest
                .find(|c| c == '.' || c == '[')
                .unwrap_or(rest.len());
            segments.push(PathSegment::Key(rest[..end].trim().to_string()));
            rest = match rest[end..].strip_prefix('.') {
                Some(after_dot) => after_dot,
                None => &rest[end..],
            };
        }
    }

    segments
}
