//! Loop-block row expansion.
//!
//! The expander turns template rows plus resolved loop blocks into a flat
//! plan of output rows. Pass-through rows keep their content with zero shift;
//! block body rows are cloned once per sequence item with the item bound as a
//! scope overlay and their coordinates shifted by the cumulative offset.

use std::sync::OnceLock;

use regex::Regex;
use sheetcraft_model::{Range, RowTemplate, SheetTemplate, Value};

use crate::blocks::LoopBlock;
use crate::eval::{Evaluator, Scope};
use crate::report::RenderWarning;

/// One output row: where it lands, which template row feeds it, and the loop
/// item bound while its placeholders evaluate.
#[derive(Debug)]
pub struct RowPlan<'a> {
    pub out_row: u32,
    pub template: &'a RowTemplate,
    /// `(item_name, item)` overlay for block body rows; `None` for
    /// pass-through rows.
    pub binding: Option<(&'a str, Value)>,
    /// `out_row - template.row`, applied to formula references into the block.
    pub shift: i64,
    /// The source block's body row bounds (inclusive), for formula-reference
    /// shifting; `None` for pass-through rows.
    pub block_body: Option<(u32, u32)>,
}

/// The fully planned sheet: output rows in order, plus renumbered merges.
#[derive(Debug)]
pub struct SheetPlan<'a> {
    pub rows: Vec<RowPlan<'a>>,
    pub merges: Vec<Range>,
    /// Rows emitted by block expansion (pass-through rows excluded).
    pub rows_expanded: u32,
    /// Row-ascending `(first_template_row, cumulative_delta)` breakpoints for
    /// renumbering row-anchored references the plan does not carry itself
    /// (drawing anchors): a template row moves by the delta of the last
    /// breakpoint at or above it, or not at all.
    pub row_shifts: Vec<(u32, i64)>,
}

/// Expand a sheet's loop blocks against the data context.
///
/// Blocks whose sequence expression resolves to a missing or non-sequence
/// value expand zero times with a warning; this function itself never fails.
pub fn expand_sheet<'a>(
    sheet: &'a SheetTemplate,
    blocks: &'a [LoopBlock],
    context: &Value,
    evaluator: &Evaluator,
    warnings: &mut Vec<RenderWarning>,
) -> SheetPlan<'a> {
    let scope = Scope::new(context);
    let items_per_block: Vec<Vec<Value>> = blocks
        .iter()
        .map(|block| {
            let resolved = evaluator
                .evaluate(&block.sequence_expr, &scope)
                .ok()
                .and_then(|v| v.as_sequence().map(<[Value]>::to_vec));
            match resolved {
                Some(items) => {
                    if items.is_empty() {
                        warnings.push(RenderWarning::EmptyLoopSequence {
                            expr: block.sequence_expr.clone(),
                            row: block.open_row,
                        });
                    }
                    items
                }
                None => {
                    warnings.push(RenderWarning::EmptyLoopSequence {
                        expr: block.sequence_expr.clone(),
                        row: block.open_row,
                    });
                    Vec::new()
                }
            }
        })
        .collect();

    let mut rows: Vec<RowPlan<'a>> = Vec::new();
    let mut rows_expanded = 0u32;
    let mut offset = 0i64;
    let mut row_shifts: Vec<(u32, i64)> = Vec::new();

    let mut row_iter = sheet.rows.iter().peekable();
    while let Some(row) = row_iter.peek().copied() {
        let in_block = blocks
            .iter()
            .position(|b| b.is_marker_row(row.row) || b.contains_body_row(row.row));

        let Some(block_idx) = in_block else {
            rows.push(RowPlan {
                out_row: apply_offset(row.row, offset),
                template: row,
                binding: None,
                shift: offset,
                block_body: None,
            });
            row_iter.next();
            continue;
        };

        // Consume the whole block (markers plus body) in one step.
        let block = &blocks[block_idx];
        let mut body: Vec<&RowTemplate> = Vec::new();
        while let Some(row) = row_iter.peek().copied() {
            if row.row > block.close_row {
                break;
            }
            if block.contains_body_row(row.row) {
                body.push(row);
            }
            row_iter.next();
        }

        let items = &items_per_block[block_idx];
        let height = block.height() as i64;
        for (i, item) in items.iter().enumerate() {
            let item_shift = offset - 1 + i as i64 * height;
            for template in &body {
                rows.push(RowPlan {
                    out_row: apply_offset(template.row, item_shift),
                    template,
                    binding: Some((block.item_name.as_str(), item.clone())),
                    shift: item_shift,
                    block_body: Some((block.body_start(), block.body_end())),
                });
                rows_expanded += 1;
            }
        }

        // Two marker rows vanish; one body occurrence is replaced by N.
        offset += (items.len() as i64 - 1) * height - 2;
        row_shifts.push((block.close_row + 1, offset));
    }

    let merges = plan_merges(sheet, blocks, &items_per_block, warnings);
    SheetPlan {
        rows,
        merges,
        rows_expanded,
        row_shifts,
    }
}

fn apply_offset(row: u32, offset: i64) -> u32 {
    (row as i64 + offset).max(1) as u32
}

fn plan_merges(
    sheet: &SheetTemplate,
    blocks: &[LoopBlock],
    items_per_block: &[Vec<Value>],
    warnings: &mut Vec<RenderWarning>,
) -> Vec<Range> {
    let mut out = Vec::new();

    'merges: for merge in &sheet.merges {
        for (block_idx, block) in blocks.iter().enumerate() {
            let overlaps = merge.start.row <= block.close_row && merge.end.row >= block.open_row;
            if !overlaps {
                continue;
            }
            let fully_inside = block.contains_body_row(merge.start.row)
                && block.contains_body_row(merge.end.row);
            if fully_inside {
                // Clone per item with the same shift its rows get.
                let offset = offset_before_block(blocks, items_per_block, block_idx);
                let height = block.height() as i64;
                for i in 0..items_per_block[block_idx].len() as i64 {
                    out.push(merge.shifted_rows(offset - 1 + i * height));
                }
            } else {
                warnings.push(RenderWarning::MergeAcrossLoopBoundary {
                    range: merge.to_string(),
                });
            }
            continue 'merges;
        }

        // Outside every block: shift by the cumulative offset of blocks above.
        let offset = blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.close_row < merge.start.row)
            .map(|(idx, b)| (items_per_block[idx].len() as i64 - 1) * b.height() as i64 - 2)
            .sum::<i64>();
        out.push(merge.shifted_rows(offset));
    }

    out
}

/// Cumulative row offset contributed by all blocks above `block_idx`.
fn offset_before_block(blocks: &[LoopBlock], items_per_block: &[Vec<Value>], block_idx: usize) -> i64 {
    blocks[..block_idx]
        .iter()
        .enumerate()
        .map(|(idx, b)| (items_per_block[idx].len() as i64 - 1) * b.height() as i64 - 2)
        .sum()
}

fn cell_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\$?)([A-Za-z]{1,3})(\$?)([0-9]+)").unwrap())
}

/// Shift relative row references pointing into a loop block's body.
///
/// Only references whose row lies in `[body_start, body_end]` move; absolute
/// rows (`A$4`), references inside string literals, sheet-qualified
/// references, and function names that happen to look like cell refs
/// (`LOG10(...)`) are left alone.
pub fn shift_formula_rows(formula: &str, body_start: u32, body_end: u32, delta: i64) -> String {
    let bytes = formula.as_bytes();
    let mut out = String::with_capacity(formula.len());
    let mut last = 0;

    // Track double-quote string state per byte index. Excel escapes a quote
    // by doubling it, which toggles the state twice and lands back correctly.
    let mut in_string = vec![false; bytes.len()];
    let mut open = false;
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'"' {
            open = !open;
        }
        in_string[i] = open;
    }

    for caps in cell_ref_re().captures_iter(formula) {
        let (Some(whole), Some(row_abs), Some(row_digits)) = (caps.get(0), caps.get(3), caps.get(4))
        else {
            continue;
        };
        if in_string[whole.start()] {
            continue;
        }
        let before = formula[..whole.start()].chars().next_back();
        if matches!(before, Some(c) if c.is_alphanumeric() || c == '_' || c == '$' || c == '!') {
            continue;
        }
        let after = formula[whole.end()..].chars().next();
        if matches!(after, Some(c) if c.is_alphanumeric() || c == '_' || c == '(') {
            continue;
        }
        if !row_abs.as_str().is_empty() {
            continue; // absolute row, never shifted
        }
        let Ok(row) = row_digits.as_str().parse::<u32>() else {
            continue;
        };
        if row < body_start || row > body_end {
            continue;
        }

        let shifted = (row as i64 + delta).max(1);
        out.push_str(&formula[last..row_digits.start()]);
        out.push_str(&shifted.to_string());
        last = whole.end();
    }
    out.push_str(&formula[last..]);
    out
}
