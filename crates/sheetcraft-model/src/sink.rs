use serde::{Deserialize, Serialize};

use crate::{CellValue, Range};

/// Handle to a sheet created through a [`WorkbookSink`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SheetId(pub usize);

/// A resolved image ready to be anchored to a cell.
///
/// Dimensions are final pixel dimensions; the backend converts to whatever
/// unit its anchor format uses (EMU for xlsx drawings).
#[derive(Clone, Debug, PartialEq)]
pub struct AnchoredImage {
    pub bytes: Vec<u8>,
    pub width_px: u32,
    pub height_px: u32,
    /// Lower-case file extension (`png`, `jpeg`, ...), used for media part
    /// naming and content types.
    pub extension: String,
}

/// Error surfaced by a sink backend.
///
/// Backends differ in failure detail; the rendering engine only needs to
/// distinguish "the write failed" with a human-readable reason.
#[derive(Debug, thiserror::Error)]
#[error("workbook sink error: {0}")]
pub struct SinkError(pub String);

impl SinkError {
    pub fn new(msg: impl Into<String>) -> Self {
        SinkError(msg.into())
    }
}

/// The narrow write contract the rendering engine depends on.
///
/// One implementation exists per backend, selected at construction time; the
/// rendering core never branches on backend identity. Geometry accessors are
/// in pixels so the image resolver can compute fit scales without knowing
/// about character widths or point heights.
pub trait WorkbookSink {
    /// Create (or, for template-backed sinks, open) a sheet by name.
    fn new_sheet(&mut self, name: &str) -> Result<SheetId, SinkError>;

    fn write_cell(
        &mut self,
        sheet: SheetId,
        row: u32,
        col: u32,
        value: CellValue,
        style: Option<u32>,
    ) -> Result<(), SinkError>;

    fn set_merged_range(&mut self, sheet: SheetId, range: Range) -> Result<(), SinkError>;

    fn set_row_height(&mut self, sheet: SheetId, row: u32, height: f64) -> Result<(), SinkError>;

    fn insert_anchored_image(
        &mut self,
        sheet: SheetId,
        row: u32,
        col: u32,
        image: AnchoredImage,
    ) -> Result<(), SinkError>;

    /// Effective column width in pixels (backend default when unset).
    fn column_width_px(&self, sheet: SheetId, col: u32) -> f64;

    /// Effective row height in pixels (backend default when unset).
    fn row_height_px(&self, sheet: SheetId, row: u32) -> f64;

    /// Finish all sheets and serialize the document package.
    fn save(&mut self) -> Result<Vec<u8>, SinkError>;
}
