//! Pairing loop markers into row blocks.

use sheetcraft_model::SheetTemplate;

use crate::error::RenderError;
use crate::scan::{classify_cell, Placeholder};

/// A resolved loop block.
///
/// The marker rows themselves are removed from output; the per-item template
/// is the rows strictly between them.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopBlock {
    /// Row carrying the `{% for %}` marker.
    pub open_row: u32,
    /// Row carrying the `{% endfor %}` marker.
    pub close_row: u32,
    pub sequence_expr: String,
    pub item_name: String,
}

impl LoopBlock {
    /// First body row (inclusive), in template coordinates.
    pub fn body_start(&self) -> u32 {
        self.open_row + 1
    }

    /// Last body row (inclusive). `body_end < body_start` means an empty body.
    pub fn body_end(&self) -> u32 {
        self.close_row - 1
    }

    /// Number of row slots one item occupies.
    pub fn height(&self) -> u32 {
        self.close_row - self.open_row - 1
    }

    /// True if `row` is one of the two marker rows.
    pub fn is_marker_row(&self, row: u32) -> bool {
        row == self.open_row || row == self.close_row
    }

    pub fn contains_body_row(&self, row: u32) -> bool {
        row > self.open_row && row < self.close_row
    }
}

/// Scan a sheet top-to-bottom and pair loop markers into blocks.
///
/// Nesting, a close without an open, and an unterminated open are the fatal
/// template faults: row offsets are undefined under any of them.
pub fn resolve_blocks(sheet: &SheetTemplate) -> Result<Vec<LoopBlock>, RenderError> {
    let mut blocks = Vec::new();
    let mut open: Option<(u32, String, String)> = None;

    for row in &sheet.rows {
        for cell in &row.cells {
            let Some(text) = cell.value.as_text() else {
                continue;
            };
            match classify_cell(text) {
                Some(Placeholder::LoopOpen {
                    sequence_expr,
                    item_name,
                }) => {
                    if open.is_some() {
                        return Err(RenderError::NestedLoop {
                            sheet: sheet.name.clone(),
                            row: row.row,
                        });
                    }
                    open = Some((row.row, sequence_expr, item_name));
                }
                Some(Placeholder::LoopClose) => {
                    let Some((open_row, sequence_expr, item_name)) = open.take() else {
                        return Err(RenderError::UnmatchedLoopClose {
                            sheet: sheet.name.clone(),
                            row: row.row,
                        });
                    };
                    blocks.push(LoopBlock {
                        open_row,
                        close_row: row.row,
                        sequence_expr,
                        item_name,
                    });
                }
                _ => {}
            }
        }
    }

    if let Some((open_row, ..)) = open {
        return Err(RenderError::UnterminatedLoop {
            sheet: sheet.name.clone(),
            row: open_row,
        });
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sheetcraft_model::{CellRef, CellTemplate, CellValue, RowTemplate};

    fn sheet_with_rows(rows: Vec<(u32, &str)>) -> SheetTemplate {
        let mut sheet = SheetTemplate::new("S");
        for (row_num, text) in rows {
            let mut row = RowTemplate::new(row_num);
            row.cells.push(CellTemplate {
                cell: CellRef::new(row_num, 1),
                value: CellValue::Text(text.to_string()),
                style: None,
            });
            sheet.rows.push(row);
        }
        sheet
    }

    #[test]
    fn pairs_markers_and_excludes_them_from_the_body() {
        let sheet = sheet_with_rows(vec![
            (1, "header"),
            (3, "{% for item in items %}"),
            (4, "{{ item.name }}"),
            (5, "{{ item.price }}"),
            (6, "{% endfor %}"),
            (7, "footer"),
        ]);

        let blocks = resolve_blocks(&sheet).unwrap();
        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.open_row, 3);
        assert_eq!(block.close_row, 6);
        assert_eq!(block.body_start(), 4);
        assert_eq!(block.body_end(), 5);
        assert_eq!(block.height(), 2);
        assert_eq!(block.sequence_expr, "items");
        assert_eq!(block.item_name, "item");
        assert!(block.contains_body_row(4));
        assert!(!block.contains_body_row(6));
    }

    #[test]
    fn multiple_sequential_blocks_are_allowed() {
        let sheet = sheet_with_rows(vec![
            (1, "{% for a in xs %}"),
            (2, "{{ a }}"),
            (3, "{% endfor %}"),
            (5, "{% for b in ys %}"),
            (6, "{{ b }}"),
            (7, "{% endfor %}"),
        ]);
        let blocks = resolve_blocks(&sheet).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].sequence_expr, "ys");
    }

    #[test]
    fn nesting_is_fatal() {
        let sheet = sheet_with_rows(vec![
            (1, "{% for a in xs %}"),
            (2, "{% for b in ys %}"),
            (3, "{% endfor %}"),
            (4, "{% endfor %}"),
        ]);
        assert!(matches!(
            resolve_blocks(&sheet),
            Err(RenderError::NestedLoop { row: 2, .. })
        ));
    }

    #[test]
    fn unmatched_close_and_unterminated_open_are_fatal() {
        let close_only = sheet_with_rows(vec![(2, "{% endfor %}")]);
        assert!(matches!(
            resolve_blocks(&close_only),
            Err(RenderError::UnmatchedLoopClose { row: 2, .. })
        ));

        let open_only = sheet_with_rows(vec![(1, "{% for a in xs %}"), (2, "{{ a }}")]);
        assert!(matches!(
            resolve_blocks(&open_only),
            Err(RenderError::UnterminatedLoop { row: 1, .. })
        ));
    }

    #[test]
    fn embedded_markers_do_not_open_blocks() {
        let sheet = sheet_with_rows(vec![(1, "note: {% for a in xs %} is literal")]);
        assert_eq!(resolve_blocks(&sheet).unwrap(), Vec::new());
    }
}
