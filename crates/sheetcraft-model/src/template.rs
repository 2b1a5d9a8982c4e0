use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{CellRef, CellValue, Range};

/// One cell of a template sheet.
///
/// The style index is opaque: it refers into the template package's
/// `styles.xml`, which the rendering pipeline carries through unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellTemplate {
    pub cell: CellRef,
    pub value: CellValue,
    pub style: Option<u32>,
}

/// One row of a template sheet. Cells are ordered by column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RowTemplate {
    /// 1-indexed worksheet row number.
    pub row: u32,
    /// Custom row height in points, when the template sets one.
    pub height: Option<f64>,
    /// Outline (grouping) level, when the template sets one.
    pub outline_level: Option<u8>,
    pub cells: Vec<CellTemplate>,
}

impl RowTemplate {
    pub fn new(row: u32) -> Self {
        Self {
            row,
            height: None,
            outline_level: None,
            cells: Vec::new(),
        }
    }
}

/// A single sheet of a template workbook. Rows are ordered by row number and
/// strictly increasing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SheetTemplate {
    pub name: String,
    pub rows: Vec<RowTemplate>,
    pub merges: Vec<Range>,
    /// Column widths in Excel character units, keyed by 1-based column.
    pub col_widths: BTreeMap<u32, f64>,
}

impl SheetTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
            merges: Vec::new(),
            col_widths: BTreeMap::new(),
        }
    }

    pub fn row(&self, row: u32) -> Option<&RowTemplate> {
        self.rows.iter().find(|r| r.row == row)
    }
}

/// An ordered sequence of sheet templates, as read from a template package.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateDocument {
    pub sheets: Vec<SheetTemplate>,
}

impl TemplateDocument {
    pub fn sheet(&self, name: &str) -> Option<&SheetTemplate> {
        self.sheets.iter().find(|s| s.name == name)
    }
}
