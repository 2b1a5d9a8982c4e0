//! Image directive resolution.
//!
//! Directives arrive either inline (the sentinel payload in a cell) or as
//! explicit insertion requests passed with the render options. Resolution
//! loads the source, works out final pixel dimensions, and hands the sink an
//! [`AnchoredImage`]. Every failure here is non-fatal to the render.

use std::path::Path;

use serde::Deserialize;
use sheetcraft_model::AnchoredImage;

use crate::imagesize::probe_dimensions;

/// Inline image directive payload, decoded from the JSON following the
/// sentinel prefix.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageDirective {
    pub path: String,
    /// Anchor at the cell carrying the directive (inline directives only).
    #[serde(default)]
    pub in_cell: bool,
    /// Scale uniformly to fit the target cell box.
    #[serde(default)]
    pub keep_ratio: bool,
    /// Explicit output width in pixels; overrides fit scaling.
    #[serde(default)]
    pub width: Option<f64>,
    /// Explicit output height in pixels; overrides fit scaling.
    #[serde(default)]
    pub height: Option<f64>,
}

/// Why a directive was dropped; recorded as a warning, never raised.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("cannot read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("unrecognized image format")]
    UnknownFormat,
}

/// Resolve a directive against the target cell's pixel geometry.
pub fn resolve_directive(
    directive: &ImageDirective,
    cell_width_px: f64,
    cell_height_px: f64,
) -> Result<AnchoredImage, ImageError> {
    let bytes = std::fs::read(&directive.path)?;
    let (intrinsic_w, intrinsic_h) = probe_dimensions(&bytes).ok_or(ImageError::UnknownFormat)?;
    let (width_px, height_px) = scaled_dimensions(
        directive,
        intrinsic_w,
        intrinsic_h,
        cell_width_px,
        cell_height_px,
    );

    Ok(AnchoredImage {
        bytes,
        width_px,
        height_px,
        extension: extension_of(&directive.path),
    })
}

/// Final pixel dimensions for a directive.
///
/// Explicit dimensions win; a single explicit dimension derives the other
/// from the intrinsic aspect ratio; `keep_ratio` fits the cell box along the
/// tighter axis; otherwise the intrinsic size is used as-is.
fn scaled_dimensions(
    directive: &ImageDirective,
    intrinsic_w: u32,
    intrinsic_h: u32,
    cell_width_px: f64,
    cell_height_px: f64,
) -> (u32, u32) {
    let iw = intrinsic_w.max(1) as f64;
    let ih = intrinsic_h.max(1) as f64;

    let (w, h) = match (directive.width, directive.height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, w * ih / iw),
        (None, Some(h)) => (h * iw / ih, h),
        (None, None) if directive.keep_ratio => {
            let scale = (cell_width_px / iw).min(cell_height_px / ih);
            (iw * scale, ih * scale)
        }
        (None, None) => (iw, ih),
    };

    (w.round().max(1.0) as u32, h.round().max(1.0) as u32)
}

fn extension_of(path: &str) -> String {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png")
        .to_ascii_lowercase();
    match ext.as_str() {
        "jpg" => "jpeg".to_string(),
        _ => ext,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn directive(json: &str) -> ImageDirective {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn payload_defaults_are_off() {
        let d = directive(r#"{"path": "x.png"}"#);
        assert!(!d.in_cell);
        assert!(!d.keep_ratio);
        assert_eq!(d.width, None);
        serde_json::from_str::<ImageDirective>(r#"{"in_cell": true}"#)
            .expect_err("path is required");
    }

    #[test]
    fn fit_scaling_prefers_the_tighter_axis() {
        let d = directive(r#"{"path": "x.png", "keep_ratio": true}"#);
        // 200x100 image into a 64x60 cell: width is the tighter axis.
        assert_eq!(scaled_dimensions(&d, 200, 100, 64.0, 60.0), (64, 32));
        // Same image into a tall narrow box fits by height instead.
        assert_eq!(scaled_dimensions(&d, 200, 100, 500.0, 25.0), (50, 25));
    }

    #[test]
    fn explicit_dimensions_override_fit() {
        let d = directive(r#"{"path": "x.png", "keep_ratio": true, "width": 80, "height": 20}"#);
        assert_eq!(scaled_dimensions(&d, 200, 100, 64.0, 60.0), (80, 20));

        let only_width = directive(r#"{"path": "x.png", "width": 50}"#);
        assert_eq!(scaled_dimensions(&only_width, 200, 100, 64.0, 60.0), (50, 25));
    }

    #[test]
    fn intrinsic_size_when_nothing_requested() {
        let d = directive(r#"{"path": "x.png"}"#);
        assert_eq!(scaled_dimensions(&d, 200, 100, 64.0, 60.0), (200, 100));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let d = directive(r#"{"path": "/definitely/not/here.png"}"#);
        assert!(matches!(
            resolve_directive(&d, 64.0, 20.0),
            Err(ImageError::Io(_))
        ));
    }

    #[test]
    fn jpg_extension_normalizes_to_jpeg() {
        assert_eq!(extension_of("photo.JPG"), "jpeg");
        assert_eq!(extension_of("logo.png"), "png");
        assert_eq!(extension_of("noext"), "png");
    }
}
