//! Core data model for the sheetcraft template rendering pipeline.
//!
//! This crate is deliberately free of I/O. It defines:
//!
//! - [`Value`]: the closed variant tree a caller supplies as the data context
//!   for one render (scalars, sequences, string-keyed mappings).
//! - [`CellRef`]/[`Range`]: 1-based worksheet addressing with A1 parsing.
//! - [`TemplateDocument`] and friends: the in-memory representation of a
//!   template workbook (rows, cells, merged ranges, column widths).
//! - [`WorkbookSink`]: the narrow contract the rendering engine writes
//!   through. Concrete backends live elsewhere (`sheetcraft-xlsx`).

mod address;
mod cell;
mod sink;
mod template;
mod value;

pub use address::{A1ParseError, CellRef, Range, RangeParseError, col_to_name, name_to_col};
pub use cell::{CellValue, EXCEL_MAX_COLS, EXCEL_MAX_ROWS};
pub use sink::{AnchoredImage, SheetId, SinkError, WorkbookSink};
pub use template::{CellTemplate, RowTemplate, SheetTemplate, TemplateDocument};
pub use value::Value;
