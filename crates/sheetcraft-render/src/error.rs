use sheetcraft_model::SinkError;
use sheetcraft_xlsx::XlsxError;

/// Fatal rendering failures.
///
/// The loop-marker variants are the only template faults that abort a render:
/// once markers are unbalanced, row offsets are undefined and no
/// self-consistent output exists. Everything else (missing variables, bad
/// image paths, boundary-crossing merges) degrades to a warning in the
/// [`crate::RenderReport`].
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("sheet {sheet:?}: loop marker at row {row} opens a nested loop; nesting is not supported")]
    NestedLoop { sheet: String, row: u32 },

    #[error("sheet {sheet:?}: loop close marker at row {row} has no matching open marker")]
    UnmatchedLoopClose { sheet: String, row: u32 },

    #[error("sheet {sheet:?}: loop opened at row {row} is never closed")]
    UnterminatedLoop { sheet: String, row: u32 },

    #[error(transparent)]
    Xlsx(#[from] XlsxError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
