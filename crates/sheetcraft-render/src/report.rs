use std::fmt;

use serde::Serialize;
use sheetcraft_xlsx::FormatFixReport;

/// A non-fatal rendering fault. Each variant carries enough context to locate
/// the offending cell or marker in the template.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderWarning {
    UnresolvedVariable { expr: String, cell: String },
    UnknownFilter { name: String, cell: String },
    /// The loop sequence expression resolved to a missing or non-sequence
    /// value; the block expanded zero times.
    EmptyLoopSequence { expr: String, row: u32 },
    MalformedImageDirective { cell: String, reason: String },
    ImageLoadFailure { path: String, cell: String, reason: String },
    /// A merged range overlaps a loop marker or crosses a block boundary;
    /// the range is left unmerged.
    MergeAcrossLoopBoundary { range: String },
    /// The post-render fix step failed; the unfixed document was kept.
    FormatFixFailed { reason: String },
}

impl fmt::Display for RenderWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderWarning::UnresolvedVariable { expr, cell } => {
                write!(f, "{cell}: unresolved variable {expr:?}, substituted empty")
            }
            RenderWarning::UnknownFilter { name, cell } => {
                write!(f, "{cell}: unknown filter {name:?}, substituted empty")
            }
            RenderWarning::EmptyLoopSequence { expr, row } => {
                write!(f, "row {row}: loop sequence {expr:?} is missing or not a sequence, block expanded zero times")
            }
            RenderWarning::MalformedImageDirective { cell, reason } => {
                write!(f, "{cell}: malformed image directive ({reason}), cell cleared")
            }
            RenderWarning::ImageLoadFailure { path, cell, reason } => {
                write!(f, "{cell}: failed to load image {path:?} ({reason}), insertion skipped")
            }
            RenderWarning::MergeAcrossLoopBoundary { range } => {
                write!(f, "merged range {range} crosses a loop boundary, left unmerged")
            }
            RenderWarning::FormatFixFailed { reason } => {
                write!(f, "format fix failed ({reason}), output kept unfixed")
            }
        }
    }
}

/// Aggregated outcome of one render call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderReport {
    /// Rows emitted by loop expansion (per-item clones, not pass-through rows).
    pub rows_expanded: u32,
    /// Variable placeholders substituted (including ones that resolved empty).
    pub cells_substituted: u32,
    pub images_inserted: u32,
    pub warnings: Vec<RenderWarning>,
    /// Present when the post-render fix pass ran and the package parsed.
    pub format_fix: Option<FormatFixReport>,
}

impl RenderReport {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
