//! XLSX package handling for the sheetcraft rendering pipeline.
//!
//! The crate exposes:
//!
//! - [`XlsxPackage`]: low-level Open Packaging Convention (OPC) ZIP handling
//!   that inflates the package into memory as an ordered part list
//!   (part name -> bytes). Entry order is preserved across read/modify/write
//!   so relationship indices in the container stay valid.
//! - [`read_template`]: a template importer that turns worksheet parts into a
//!   [`sheetcraft_model::TemplateDocument`] (cell text with placeholders,
//!   formulas, style indices, merged ranges, column widths, row heights).
//! - [`XlsxSink`]: the xlsx backend for the
//!   [`sheetcraft_model::WorkbookSink`] contract, either seeded from a
//!   template package (styles and untouched parts carried through verbatim)
//!   or started from a minimal new workbook.
//! - [`fix_package`]/[`fix_xlsx`]: the post-render structural repair pass that
//!   adds explicit `xdr:` prefixes to drawing anchors for strict consumers.

mod drawing;
mod format_fix;
mod opc;
mod package;
mod read;
mod shared_strings;
mod sink;

pub use drawing::{build_drawing_rels_xml, build_drawing_xml, px_to_emu, ImagePlacement};
pub use format_fix::{fix_package, fix_xlsx, FormatFixConfig, FormatFixReport, RULE_PREFIX_DRAWING_ANCHORS};
pub use opc::{parse_relationships, rels_for_part, resolve_target, Relationship};
pub use package::{XlsxError, XlsxPackage, XlsxPackageLimits, MAX_PART_BYTES, MAX_TOTAL_BYTES};
pub use read::{read_template, worksheet_parts, WorksheetPartInfo};
pub use shared_strings::parse_shared_strings_xml;
pub use sink::{column_width_to_px, row_height_pt_to_px, XlsxSink, DEFAULT_COLUMN_WIDTH_CHARS, DEFAULT_ROW_HEIGHT_PT};
