use serde::{Deserialize, Serialize};

/// Highest 1-based row an Excel worksheet can address.
pub const EXCEL_MAX_ROWS: u32 = 1_048_576;
/// Highest 1-based column an Excel worksheet can address (`XFD`).
pub const EXCEL_MAX_COLS: u32 = 16_384;

/// A written cell value.
///
/// Formulas are carried verbatim (without the leading `=`); the rendering
/// engine adjusts relative row references when cloning loop rows, but performs
/// no evaluation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Formula(String),
}

impl CellValue {
    /// The raw text payload placeholder scanning operates on, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, CellValue::Formula(_))
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}
