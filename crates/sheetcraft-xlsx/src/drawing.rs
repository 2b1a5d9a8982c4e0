//! DrawingML serialization for anchored images.
//!
//! Output always uses explicit `xdr:` prefixes; some strict viewers reject
//! anchors written in the default namespace, which is also what the
//! post-render format fixer repairs in foreign packages.

use sheetcraft_model::AnchoredImage;

use crate::opc::{write_relationships, Relationship};

const XDR_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing";
const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub(crate) const REL_TYPE_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

/// One image anchored to a cell, with its media part already named.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlacement {
    /// 1-indexed anchor row.
    pub row: u32,
    /// 1-indexed anchor column.
    pub col: u32,
    pub image: AnchoredImage,
    /// Media part file name under `xl/media/` (e.g. `image3.png`).
    pub media_name: String,
}

/// EMU per pixel at 96 DPI.
pub fn px_to_emu(px: u32) -> i64 {
    px as i64 * 9525
}

/// Serialize a drawing part containing one `oneCellAnchor` per placement.
///
/// Relationship ids are assigned positionally (`rId1`..) and must match
/// [`build_drawing_rels_xml`] for the same slice.
pub fn build_drawing_xml(placements: &[ImagePlacement]) -> Vec<u8> {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push_str(&format!(
        r#"<xdr:wsDr xmlns:a="{A_NS}" xmlns:r="{REL_NS}" xmlns:xdr="{XDR_NS}">"#
    ));

    for (idx, placement) in placements.iter().enumerate() {
        let object_id = idx as u32 + 1;
        let rel_id = format!("rId{object_id}");
        xml.push_str(&build_anchor_xml(placement, object_id, &rel_id));
    }

    xml.push_str("</xdr:wsDr>");
    xml.into_bytes()
}

/// One `oneCellAnchor` element, for a fresh drawing part or for appending
/// into an existing one.
pub(crate) fn build_anchor_xml(placement: &ImagePlacement, object_id: u32, rel_id: &str) -> String {
    let cx = px_to_emu(placement.image.width_px);
    let cy = px_to_emu(placement.image.height_px);

    let mut xml = String::new();
    xml.push_str("<xdr:oneCellAnchor>");
    xml.push_str(&format!(
        "<xdr:from><xdr:col>{}</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>{}</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from>",
        placement.col - 1,
        placement.row - 1,
    ));
    xml.push_str(&format!(r#"<xdr:ext cx="{cx}" cy="{cy}"/>"#));
    xml.push_str(&build_pic_xml(object_id, rel_id, cx, cy));
    xml.push_str("<xdr:clientData/>");
    xml.push_str("</xdr:oneCellAnchor>");
    xml
}

/// The `.rels` payload matching [`build_drawing_xml`]'s positional rel ids.
pub fn build_drawing_rels_xml(placements: &[ImagePlacement]) -> Vec<u8> {
    let rels: Vec<Relationship> = placements
        .iter()
        .enumerate()
        .map(|(idx, placement)| Relationship {
            id: format!("rId{}", idx + 1),
            type_uri: REL_TYPE_IMAGE.to_string(),
            target: format!("../media/{}", placement.media_name),
            target_mode: None,
        })
        .collect();
    write_relationships(&rels)
}

fn build_pic_xml(object_id: u32, embed_rel_id: &str, cx: i64, cy: i64) -> String {
    format!(
        r#"<xdr:pic><xdr:nvPicPr><xdr:cNvPr id="{object_id}" name="Picture {object_id}"/><xdr:cNvPicPr/></xdr:nvPicPr><xdr:blipFill><a:blip r:embed="{embed_rel_id}"/><a:stretch><a:fillRect/></a:stretch></xdr:blipFill><xdr:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></xdr:spPr></xdr:pic>"#
    )
}
