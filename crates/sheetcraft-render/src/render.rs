//! The render pipeline: scan, expand, substitute, anchor images, save,
//! then run the post-render format fix.

use std::collections::HashMap;
use std::path::Path;

use sheetcraft_model::{CellRef, CellValue, SheetId, Value, WorkbookSink};
use sheetcraft_xlsx::{fix_package, read_template, FormatFixConfig, XlsxPackage, XlsxSink};

use crate::blocks::resolve_blocks;
use crate::error::RenderError;
use crate::eval::{EvalError, Evaluator, Scope};
use crate::expand::{expand_sheet, shift_formula_rows, RowPlan};
use crate::images::{resolve_directive, ImageDirective};
use crate::report::{RenderReport, RenderWarning};
use crate::scan::{classify_cell, scan_variables, substitute_variables, Placeholder};

/// An explicit image insertion request, issued outside the template.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInsert {
    pub sheet: String,
    pub cell: CellRef,
    pub directive: ImageDirective,
}

/// Per-render options.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Run the post-render structural repair pass on the saved package.
    pub apply_format_fix: bool,
    pub format_fix: FormatFixConfig,
    /// Explicit image insertions, anchored verbatim at their target cells.
    pub images: Vec<ImageInsert>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            apply_format_fix: true,
            format_fix: FormatFixConfig::default(),
            images: Vec::new(),
        }
    }
}

/// Template renderer. Holds the filter registry; construct once, configure
/// filters, then render any number of templates.
#[derive(Default)]
pub struct Renderer {
    evaluator: Evaluator,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_evaluator(evaluator: Evaluator) -> Self {
        Self { evaluator }
    }

    /// Filter registration happens here, before the first render.
    pub fn evaluator_mut(&mut self) -> &mut Evaluator {
        &mut self.evaluator
    }

    /// Render a template package held in memory.
    ///
    /// On success the returned bytes are the complete output document; on a
    /// fatal template fault nothing is produced.
    pub fn render_bytes(
        &self,
        template: &[u8],
        data: &Value,
        options: &RenderOptions,
    ) -> Result<(Vec<u8>, RenderReport), RenderError> {
        let package = XlsxPackage::from_bytes(template)?;
        let document = read_template(&package)?;
        let mut sink = XlsxSink::from_template(package)?;
        let mut report = RenderReport::default();
        let mut sheet_handles: HashMap<String, SheetId> = HashMap::new();

        for sheet in &document.sheets {
            let handle = sink.new_sheet(&sheet.name)?;
            sheet_handles.insert(sheet.name.clone(), handle);

            let blocks = resolve_blocks(sheet)?;
            let plan = expand_sheet(sheet, &blocks, data, &self.evaluator, &mut report.warnings);
            report.rows_expanded += plan.rows_expanded;

            for row_plan in &plan.rows {
                self.write_row(&mut sink, handle, &sheet.name, row_plan, data, &mut report)?;
            }
            for merge in &plan.merges {
                sink.set_merged_range(handle, *merge)?;
            }
            // Drawing anchors the template already carried move with the
            // rows beneath them.
            sink.shift_template_anchors(handle, &plan.row_shifts)?;
        }

        self.insert_explicit_images(&mut sink, &sheet_handles, options, &mut report);

        let mut bytes = sink.save()?;
        if options.apply_format_fix {
            bytes = apply_format_fix(bytes, &options.format_fix, &mut report);
        }
        Ok((bytes, report))
    }

    /// Render a template file to an output file.
    ///
    /// The output is written only after the whole document has been produced;
    /// a fatal error leaves no file behind.
    pub fn render(
        &self,
        template_path: impl AsRef<Path>,
        data: &Value,
        output_path: impl AsRef<Path>,
        options: &RenderOptions,
    ) -> Result<RenderReport, RenderError> {
        let template = std::fs::read(template_path)?;
        let (bytes, report) = self.render_bytes(&template, data, options)?;
        std::fs::write(output_path, bytes)?;
        Ok(report)
    }

    fn write_row(
        &self,
        sink: &mut XlsxSink,
        handle: SheetId,
        sheet_name: &str,
        plan: &RowPlan<'_>,
        data: &Value,
        report: &mut RenderReport,
    ) -> Result<(), RenderError> {
        if let Some(height) = plan.template.height {
            sink.set_row_height(handle, plan.out_row, height)?;
        }

        let scope = match &plan.binding {
            Some((name, item)) => Scope::with_binding(data, name, item),
            None => Scope::new(data),
        };

        for cell in &plan.template.cells {
            let col = cell.cell.col;
            let location = || format!("{sheet_name}!{}", CellRef::new(plan.out_row, col).to_a1());

            let value = match &cell.value {
                CellValue::Text(text) => match classify_cell(text) {
                    Some(Placeholder::Image(parsed)) => {
                        // The directive text never reaches the output, even
                        // when resolution fails.
                        match parsed {
                            Ok(directive) => self.anchor_image(
                                sink,
                                handle,
                                plan.out_row,
                                col,
                                &directive,
                                &location(),
                                report,
                            )?,
                            Err(reason) => report.warnings.push(
                                RenderWarning::MalformedImageDirective {
                                    cell: location(),
                                    reason,
                                },
                            ),
                        }
                        CellValue::Empty
                    }
                    Some(Placeholder::Variable(expr)) => {
                        report.cells_substituted += 1;
                        match self.evaluator.evaluate(&expr, &scope) {
                            Ok(value) => value_to_cell(value),
                            Err(err) => {
                                report.warnings.push(eval_warning(err, location()));
                                CellValue::Empty
                            }
                        }
                    }
                    // Marker rows never reach the plan; any other structural
                    // classification falls through as literal text.
                    _ => {
                        if scan_variables(text).is_empty() {
                            CellValue::Text(text.clone())
                        } else {
                            let substituted = substitute_variables(text, |expr| {
                                report.cells_substituted += 1;
                                match self.evaluator.evaluate(expr, &scope) {
                                    Ok(value) => Some(value.to_display_string()),
                                    Err(err) => {
                                        report.warnings.push(eval_warning(err, location()));
                                        None
                                    }
                                }
                            });
                            CellValue::Text(substituted)
                        }
                    }
                },
                CellValue::Formula(formula) => match plan.block_body {
                    Some((body_start, body_end)) if plan.shift != 0 => CellValue::Formula(
                        shift_formula_rows(formula, body_start, body_end, plan.shift),
                    ),
                    _ => CellValue::Formula(formula.clone()),
                },
                other => other.clone(),
            };

            sink.write_cell(handle, plan.out_row, col, value, cell.style)?;
        }
        Ok(())
    }

    /// Resolve and anchor one inline directive; failures warn and skip.
    #[allow(clippy::too_many_arguments)]
    fn anchor_image(
        &self,
        sink: &mut XlsxSink,
        handle: SheetId,
        row: u32,
        col: u32,
        directive: &ImageDirective,
        location: &str,
        report: &mut RenderReport,
    ) -> Result<(), RenderError> {
        let cell_width = sink.column_width_px(handle, col);
        let cell_height = sink.row_height_px(handle, row);
        match resolve_directive(directive, cell_width, cell_height) {
            Ok(image) => {
                sink.insert_anchored_image(handle, row, col, image)?;
                report.images_inserted += 1;
            }
            Err(err) => report.warnings.push(RenderWarning::ImageLoadFailure {
                path: directive.path.clone(),
                cell: location.to_string(),
                reason: err.to_string(),
            }),
        }
        Ok(())
    }

    fn insert_explicit_images(
        &self,
        sink: &mut XlsxSink,
        sheet_handles: &HashMap<String, SheetId>,
        options: &RenderOptions,
        report: &mut RenderReport,
    ) {
        for insert in &options.images {
            let location = format!("{}!{}", insert.sheet, insert.cell.to_a1());
            let Some(&handle) = sheet_handles.get(&insert.sheet) else {
                report.warnings.push(RenderWarning::ImageLoadFailure {
                    path: insert.directive.path.clone(),
                    cell: location,
                    reason: format!("sheet {:?} not found", insert.sheet),
                });
                continue;
            };
            if let Err(err) = self.anchor_image(
                sink,
                handle,
                insert.cell.row,
                insert.cell.col,
                &insert.directive,
                &location,
                report,
            ) {
                report.warnings.push(RenderWarning::ImageLoadFailure {
                    path: insert.directive.path.clone(),
                    cell: location,
                    reason: err.to_string(),
                });
            }
        }
    }
}

/// Substitute `{{ expr }}` placeholders in a standalone string, outside any
/// workbook. Handy for filenames, sheet titles, and tests.
pub fn render_string(text: &str, data: &Value) -> (String, Vec<RenderWarning>) {
    let evaluator = Evaluator::new();
    let scope = Scope::new(data);
    let mut warnings = Vec::new();
    let out = substitute_variables(text, |expr| match evaluator.evaluate(expr, &scope) {
        Ok(value) => Some(value.to_display_string()),
        Err(err) => {
            warnings.push(eval_warning(err, "<string>".to_string()));
            None
        }
    });
    (out, warnings)
}

/// Render with a default evaluator (builtin filters only).
pub fn render(
    template_path: impl AsRef<Path>,
    data: &Value,
    output_path: impl AsRef<Path>,
    options: &RenderOptions,
) -> Result<RenderReport, RenderError> {
    Renderer::new().render(template_path, data, output_path, options)
}

/// Best-effort post-render repair: a failure keeps the unfixed bytes and
/// downgrades to a warning, never discarding the render's primary output.
fn apply_format_fix(bytes: Vec<u8>, config: &FormatFixConfig, report: &mut RenderReport) -> Vec<u8> {
    let package = match XlsxPackage::from_bytes(&bytes) {
        Ok(package) => package,
        Err(err) => {
            report.warnings.push(RenderWarning::FormatFixFailed {
                reason: err.to_string(),
            });
            return bytes;
        }
    };
    let (fixed, fix_report) = fix_package(&package, config);
    match fixed.write_to_bytes() {
        Ok(fixed_bytes) => {
            report.format_fix = Some(fix_report);
            fixed_bytes
        }
        Err(err) => {
            report.warnings.push(RenderWarning::FormatFixFailed {
                reason: err.to_string(),
            });
            bytes
        }
    }
}

fn eval_warning(err: EvalError, cell: String) -> RenderWarning {
    match err {
        EvalError::MissingVariable(expr) => RenderWarning::UnresolvedVariable { expr, cell },
        EvalError::UnknownFilter(name) => RenderWarning::UnknownFilter { name, cell },
    }
}

fn value_to_cell(value: Value) -> CellValue {
    match value {
        Value::Null => CellValue::Empty,
        Value::Bool(b) => CellValue::Bool(b),
        Value::Number(n) => CellValue::Number(n),
        Value::String(s) => CellValue::Text(s),
        other => CellValue::Text(other.to_display_string()),
    }
}
