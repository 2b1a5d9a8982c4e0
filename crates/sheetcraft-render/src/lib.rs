//! Template rendering engine for spreadsheet documents.
//!
//! A template is an ordinary xlsx workbook whose cells carry placeholders:
//!
//! - `{{ expr }}` substitutes a value from the data context, with optional
//!   filters (`{{ name|upper }}`);
//! - `{% for item in items %}` / `{% endfor %}`, each occupying a full cell,
//!   mark a row range that is expanded once per sequence item;
//! - a sentinel-prefixed JSON payload ([`IMAGE_SENTINEL`]) embeds an image
//!   anchored and scaled to the carrying cell.
//!
//! [`render`] (or [`Renderer`] for custom filters) runs the whole pipeline:
//! scan, loop expansion, substitution, image anchoring, save, and the
//! post-render format fix. Non-structural faults degrade to warnings in the
//! returned [`RenderReport`]; only unbalanced loop markers abort.

mod blocks;
mod error;
mod eval;
mod expand;
mod images;
mod imagesize;
mod render;
mod report;
mod scan;

pub use blocks::{resolve_blocks, LoopBlock};
pub use error::RenderError;
pub use eval::{EvalError, Evaluator, Scope};
pub use expand::{expand_sheet, shift_formula_rows, RowPlan, SheetPlan};
pub use images::{resolve_directive, ImageDirective, ImageError};
pub use imagesize::probe_dimensions;
pub use render::{render, render_string, ImageInsert, RenderOptions, Renderer};
pub use report::{RenderReport, RenderWarning};
pub use scan::{classify_cell, scan_variables, substitute_variables, Placeholder, IMAGE_SENTINEL};
