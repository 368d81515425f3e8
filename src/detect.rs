//! Illustrator file detection.
//!
//! An `.ai` file written with PDF compatibility is a plain PDF whose header
//! is followed by the usual binary marker comment. Only the header is
//! required; the Illustrator and linearization markers are informational.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Header information of an Illustrator PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiFormat {
    /// PDF version from the header, e.g. "1.6"
    pub version: String,
    /// A linearization dictionary appears in the scanned prefix
    pub linearized: bool,
    /// The scanned prefix mentions Illustrator
    pub illustrator: bool,
}

impl std::fmt::Display for AiFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PDF {}", self.version)?;
        if self.illustrator {
            write!(f, " (Illustrator)")?;
        }
        Ok(())
    }
}

const PDF_MAGIC: &[u8] = b"%PDF-";
const VERSION_LEN: usize = 3;

/// Bytes inspected for the informational markers.
pub const HEAD_LEN: usize = 4096;

const LINEARIZED_MARKER: &[u8] = b"/Linearized";
const ILLUSTRATOR_MARKERS: &[&[u8]] = &[b"Adobe Illustrator", b"/Illustrator", b"%AI"];

/// Detect the format from the start of a file.
///
/// ```no_run
/// use unai::detect::detect_format_from_path;
///
/// let format = detect_format_from_path("artwork.ai").unwrap();
/// println!("{format}");
/// ```
pub fn detect_format_from_path<P: AsRef<Path>>(path: P) -> Result<AiFormat> {
    let file = File::open(path)?;
    let mut prefix = Vec::with_capacity(HEAD_LEN);
    file.take(HEAD_LEN as u64).read_to_end(&mut prefix)?;
    detect_format_from_bytes(&prefix)
}

/// Detect the format from in-memory data; only the first [`HEAD_LEN`]
/// bytes are inspected.
pub fn detect_format_from_bytes(data: &[u8]) -> Result<AiFormat> {
    if data.len() < PDF_MAGIC.len() + VERSION_LEN || !data.starts_with(PDF_MAGIC) {
        return Err(Error::UnknownFormat);
    }

    let raw = &data[PDF_MAGIC.len()..PDF_MAGIC.len() + VERSION_LEN];
    let version = String::from_utf8_lossy(raw).into_owned();
    if !is_valid_version(raw) {
        return Err(Error::UnsupportedVersion(version));
    }

    let head = &data[..data.len().min(HEAD_LEN)];
    Ok(AiFormat {
        version,
        linearized: contains(head, LINEARIZED_MARKER),
        illustrator: ILLUSTRATOR_MARKERS.iter().any(|m| contains(head, m)),
    })
}

fn is_valid_version(raw: &[u8]) -> bool {
    matches!(raw, [major, b'.', minor] if major.is_ascii_digit() && minor.is_ascii_digit())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Whether the file at `path` starts with a PDF header.
pub fn is_ai_file<P: AsRef<Path>>(path: P) -> bool {
    detect_format_from_path(path).is_ok()
}

/// Whether `data` starts with a PDF header.
pub fn is_ai_bytes(data: &[u8]) -> bool {
    detect_format_from_bytes(data).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_plain_pdf() {
        let format = detect_format_from_bytes(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3").unwrap();
        assert_eq!(format.version, "1.7");
        assert!(!format.illustrator);
        assert!(!format.linearized);
    }

    #[test]
    fn test_detect_illustrator_markers() {
        let data = b"%PDF-1.6\n%\xe2\xe3\xcf\xd3\n1 0 obj\n<</Linearized 1>>\n%%Creator: Adobe Illustrator(R) 24.0";
        let format = detect_format_from_bytes(data).unwrap();
        assert_eq!(format.version, "1.6");
        assert!(format.illustrator);
        assert!(format.linearized);
        assert_eq!(format.to_string(), "PDF 1.6 (Illustrator)");
    }

    #[test]
    fn test_detect_rejects_other_formats() {
        assert!(matches!(
            detect_format_from_bytes(b"%!PS-Adobe-3.0"),
            Err(Error::UnknownFormat)
        ));
        assert!(matches!(detect_format_from_bytes(b"%PDF"), Err(Error::UnknownFormat)));
        assert!(matches!(detect_format_from_bytes(b""), Err(Error::UnknownFormat)));
    }

    #[test]
    fn test_detect_bad_version() {
        assert!(matches!(
            detect_format_from_bytes(b"%PDF-x.y\n"),
            Err(Error::UnsupportedVersion(v)) if v == "x.y"
        ));
    }

    #[test]
    fn test_is_ai_bytes() {
        assert!(is_ai_bytes(b"%PDF-1.4\n"));
        assert!(!is_ai_bytes(b"Not a PDF"));
    }
}
