use std::io::{Cursor, Read, Write};
use std::path::Path;

use thiserror::Error;

/// Maximum allowed *inflated* bytes for a single ZIP entry in a package.
///
/// Safety limit against decompression bombs when materializing a whole
/// template package in memory.
pub const MAX_PART_BYTES: u64 = 256 * 1024 * 1024; // 256 MiB

/// Maximum allowed *inflated* bytes across all ZIP entries in a package.
pub const MAX_TOTAL_BYTES: u64 = 512 * 1024 * 1024; // 512 MiB

/// Size limits enforced by [`XlsxPackage::from_bytes_limited`].
#[derive(Debug, Clone, Copy)]
pub struct XlsxPackageLimits {
    /// Maximum allowed uncompressed bytes for any single part.
    pub max_part_bytes: u64,
    /// Maximum allowed uncompressed bytes across the whole package.
    pub max_total_bytes: u64,
}

impl Default for XlsxPackageLimits {
    fn default() -> Self {
        Self {
            max_part_bytes: MAX_PART_BYTES,
            max_total_bytes: MAX_TOTAL_BYTES,
        }
    }
}

#[derive(Debug, Error)]
pub enum XlsxError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml error: {0}")]
    RoXml(#[from] roxmltree::Error),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("missing xlsx part: {0}")]
    MissingPart(String),
    #[error("invalid xlsx: {0}")]
    Invalid(String),
    #[error("xlsx package part is too large to load safely: {part} is {size} bytes (max {max} bytes)")]
    PartTooLarge { part: String, size: u64, max: u64 },
    #[error("xlsx package is too large to load safely: {total} bytes uncompressed (max {max})")]
    PackageTooLarge { total: u64, max: u64 },
}

/// An xlsx package inflated into memory.
///
/// Parts are kept as an *ordered* list rather than a sorted map: the output
/// container must list entries in their original order so internal
/// relationship indices stay valid, and the format fixer must pass unmatched
/// entries through byte-for-byte in place.
#[derive(Debug, Clone, Default)]
pub struct XlsxPackage {
    parts: Vec<(String, Vec<u8>)>,
}

impl XlsxPackage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, XlsxError> {
        Self::from_bytes_limited(bytes, XlsxPackageLimits::default())
    }

    pub fn from_bytes_limited(bytes: &[u8], limits: XlsxPackageLimits) -> Result<Self, XlsxError> {
        let reader = Cursor::new(bytes);
        let mut zip = zip::ZipArchive::new(reader)?;

        let mut parts = Vec::with_capacity(zip.len());
        let mut total: u64 = 0;
        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            if !file.is_file() {
                continue;
            }

            let name = file.name().to_string();
            let size = file.size();
            if size > limits.max_part_bytes {
                return Err(XlsxError::PartTooLarge {
                    part: name,
                    size,
                    max: limits.max_part_bytes,
                });
            }
            total = total.saturating_add(size);
            if total > limits.max_total_bytes {
                return Err(XlsxError::PackageTooLarge {
                    total,
                    max: limits.max_total_bytes,
                });
            }

            let mut buf = Vec::with_capacity(size as usize);
            // Guard against ZIP metadata lying about the inflated size.
            let read = file
                .by_ref()
                .take(limits.max_part_bytes.saturating_add(1))
                .read_to_end(&mut buf)?;
            if read as u64 > limits.max_part_bytes {
                return Err(XlsxError::PartTooLarge {
                    part: name,
                    size: read as u64,
                    max: limits.max_part_bytes,
                });
            }
            parts.push((name, buf));
        }

        Ok(Self { parts })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, XlsxError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        let name = name.strip_prefix('/').unwrap_or(name);
        self.parts
            .iter()
            .find(|(key, _)| key.strip_prefix('/').unwrap_or(key) == name)
            .map(|(_, bytes)| bytes.as_slice())
    }

    pub fn part_str(&self, name: &str) -> Result<&str, XlsxError> {
        let bytes = self
            .part(name)
            .ok_or_else(|| XlsxError::MissingPart(name.to_string()))?;
        std::str::from_utf8(bytes)
            .map_err(|e| XlsxError::Invalid(format!("part {name} is not utf-8: {e}")))
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.part(name).is_some()
    }

    /// Replace a part's content in place, or append it at the end of the
    /// entry list when absent.
    pub fn set_part(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        let name = name.into();
        if let Some(slot) = self.parts.iter_mut().find(|(key, _)| *key == name) {
            slot.1 = bytes;
        } else {
            self.parts.push((name, bytes));
        }
    }

    pub fn remove_part(&mut self, name: &str) -> Option<Vec<u8>> {
        let idx = self.parts.iter().position(|(key, _)| key == name)?;
        Some(self.parts.remove(idx).1)
    }

    /// Iterate parts in container entry order.
    pub fn parts(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.parts
            .iter()
            .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn write_to_bytes(&self) -> Result<Vec<u8>, XlsxError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> Result<(), XlsxError> {
        let extra = self.missing_media_content_type_defaults()?;

        let cursor = Cursor::new(Vec::new());
        let mut zip = zip::ZipWriter::new(cursor);
        let options = zip::write::FileOptions::<()>::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for (name, bytes) in &self.parts {
            zip.start_file(name.clone(), options)?;
            if name == "[Content_Types].xml" {
                if let Some(patched) = &extra {
                    zip.write_all(patched)?;
                    continue;
                }
            }
            zip.write_all(bytes)?;
        }

        let cursor = zip.finish()?;
        w.write_all(&cursor.into_inner())?;
        Ok(())
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<(), XlsxError> {
        let bytes = self.write_to_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// When the package carries media payloads, ensure `[Content_Types].xml`
    /// has `<Default>` entries for their extensions. Conservative: defaults
    /// are only inserted for extensions actually present, and the part is left
    /// untouched when nothing is missing.
    fn missing_media_content_type_defaults(&self) -> Result<Option<Vec<u8>>, XlsxError> {
        const MEDIA_TYPES: &[(&str, &str)] = &[
            ("png", "image/png"),
            ("jpg", "image/jpeg"),
            ("jpeg", "image/jpeg"),
            ("gif", "image/gif"),
            ("bmp", "image/bmp"),
        ];

        let Some(content_types) = self.part("[Content_Types].xml") else {
            return Ok(None);
        };
        let xml = std::str::from_utf8(content_types)
            .map_err(|e| XlsxError::Invalid(format!("[Content_Types].xml not utf-8: {e}")))?;

        let mut needed: Vec<(&str, &str)> = Vec::new();
        for (ext, content_type) in MEDIA_TYPES {
            let dotted = format!(".{ext}");
            let present_in_package = self
                .part_names()
                .any(|name| name.to_ascii_lowercase().ends_with(&dotted));
            if !present_in_package {
                continue;
            }
            let declared = xml
                .to_ascii_lowercase()
                .contains(&format!(r#"extension="{ext}""#));
            if !declared {
                needed.push((ext, content_type));
            }
        }

        if needed.is_empty() {
            return Ok(None);
        }

        let close = "</Types>";
        let Some(pos) = xml.rfind(close) else {
            return Err(XlsxError::Invalid(
                "[Content_Types].xml missing </Types>".to_string(),
            ));
        };

        let mut patched = String::with_capacity(xml.len() + needed.len() * 64);
        patched.push_str(&xml[..pos]);
        for (ext, content_type) in needed {
            patched.push_str(&format!(
                r#"<Default Extension="{ext}" ContentType="{content_type}"/>"#
            ));
        }
        patched.push_str(&xml[pos..]);
        Ok(Some(patched.into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write as _;

    fn sample_package() -> Vec<u8> {
        let cursor = Cursor::new(Vec::new());
        let mut zip = zip::ZipWriter::new(cursor);
        let options = zip::write::FileOptions::<()>::default()
            .compression_method(zip::CompressionMethod::Deflated);
        // Deliberately non-alphabetical entry order.
        zip.start_file("xl/workbook.xml", options).unwrap();
        zip.write_all(b"<workbook/>").unwrap();
        zip.start_file("[Content_Types].xml", options).unwrap();
        zip.write_all(
            br#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"></Types>"#,
        )
        .unwrap();
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn preserves_entry_order_across_roundtrip() {
        let pkg = XlsxPackage::from_bytes(&sample_package()).unwrap();
        let names: Vec<&str> = pkg.part_names().collect();
        assert_eq!(names, vec!["xl/workbook.xml", "[Content_Types].xml"]);

        let bytes = pkg.write_to_bytes().unwrap();
        let reread = XlsxPackage::from_bytes(&bytes).unwrap();
        let names: Vec<&str> = reread.part_names().collect();
        assert_eq!(names, vec!["xl/workbook.xml", "[Content_Types].xml"]);
    }

    #[test]
    fn set_part_replaces_in_place() {
        let mut pkg = XlsxPackage::from_bytes(&sample_package()).unwrap();
        pkg.set_part("xl/workbook.xml", b"<workbook><sheets/></workbook>".to_vec());
        let names: Vec<&str> = pkg.part_names().collect();
        assert_eq!(names, vec!["xl/workbook.xml", "[Content_Types].xml"]);
        assert_eq!(
            pkg.part("xl/workbook.xml").unwrap(),
            b"<workbook><sheets/></workbook>"
        );
    }

    #[test]
    fn media_defaults_inserted_on_write() {
        let mut pkg = XlsxPackage::from_bytes(&sample_package()).unwrap();
        pkg.set_part("xl/media/image1.png", vec![0u8; 8]);
        let bytes = pkg.write_to_bytes().unwrap();
        let reread = XlsxPackage::from_bytes(&bytes).unwrap();
        let content_types = reread.part_str("[Content_Types].xml").unwrap();
        assert!(content_types.contains(r#"Extension="png""#));
    }

    #[test]
    fn rejects_non_zip_input() {
        assert!(XlsxPackage::from_bytes(b"this is not a zip").is_err());
    }
}
