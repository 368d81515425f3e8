//! Document backend abstraction layer.
//!
//! Provides a trait-based interface over the parsed object graph, isolating
//! the concrete PDF library (lopdf) from classification and extraction.

use std::sync::Arc;

use crate::error::Result;
use crate::model::{ObjectId, ObjectTable, StreamObject};

/// Image codec that transport-filter decoding stops at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageCodec {
    /// `/DCTDecode` (baseline JPEG).
    Dct,
    /// `/JPXDecode` (JPEG 2000).
    Jpx,
    /// `/CCITTFaxDecode`.
    CcittFax,
    /// `/JBIG2Decode`.
    Jbig2,
}

impl ImageCodec {
    /// Map a filter name to an image codec.
    pub fn from_filter(name: &str) -> Option<Self> {
        match name {
            "DCTDecode" | "DCT" => Some(ImageCodec::Dct),
            "JPXDecode" => Some(ImageCodec::Jpx),
            "CCITTFaxDecode" | "CCF" => Some(ImageCodec::CcittFax),
            "JBIG2Decode" => Some(ImageCodec::Jbig2),
            _ => None,
        }
    }
}

/// Image payload with transport filters removed.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    /// Raw samples, or codec data when `codec` is set.
    pub data: Vec<u8>,
    /// Codec the payload is still encoded with.
    pub codec: Option<ImageCodec>,
}

/// A rendered image.
///
/// An empty `format` means the image cannot be rendered on its own
/// (masks, fax and JBIG2 codecs, unsupported color spaces).
#[derive(Debug, Clone, Default)]
pub struct RenderedImage {
    pub format: String,
    pub data: Vec<u8>,
}

impl RenderedImage {
    pub fn new(format: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            format: format.into(),
            data,
        }
    }

    /// Result for an image that is skipped.
    pub fn skipped() -> Self {
        Self::default()
    }

    pub fn is_skipped(&self) -> bool {
        self.format.is_empty()
    }
}

/// Embedded font program kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontKind {
    /// `/FontFile2`
    TrueType,
    /// `/FontFile3` with `/Subtype /OpenType`
    OpenType,
    /// `/FontFile3` with `/Subtype /Type1C` or `/CIDFontType0C`
    Cff,
    /// `/FontFile`
    Type1,
}

impl FontKind {
    /// File extension used for the sidecar.
    pub fn extension(self) -> &'static str {
        match self {
            FontKind::TrueType => "ttf",
            FontKind::OpenType => "otf",
            FontKind::Cff => "cff",
            FontKind::Type1 => "t1",
        }
    }
}

/// Reference to an embedded font program.
#[derive(Debug, Clone)]
pub struct FontProgram {
    /// Base font name with any subset prefix kept.
    pub name: String,
    pub kind: FontKind,
    /// Object number of the font file stream.
    pub file_id: ObjectId,
    pub file: Arc<StreamObject>,
}

impl FontProgram {
    pub fn extension(&self) -> &'static str {
        self.kind.extension()
    }
}

/// Abstract interface over a parsed document.
///
/// Implementations must be shareable across worker threads. Decoding of
/// distinct objects may happen concurrently; the decode cache is the only
/// mutable state behind `&self`.
pub trait DocumentBackend: Send + Sync {
    /// The resolved object table.
    fn objects(&self) -> &ObjectTable;

    /// Check structural conformance of the table.
    fn validate(&self) -> Result<()>;

    /// Strip the Illustrator private region and build the font index.
    fn optimize(&mut self) -> Result<()>;

    /// Font dictionaries that carry an embedded program. Empty before `optimize`.
    fn font_objects(&self) -> Vec<ObjectId>;

    /// Locate the embedded program of font `id`. `Ok(None)` when there is none.
    fn extract_font(&self, id: ObjectId) -> Result<Option<FontProgram>>;

    /// Decode all filters of a stream. Results are cached until `reclaim`.
    fn decode_stream(&self, id: ObjectId, stream: &StreamObject) -> Result<Arc<[u8]>>;

    /// Remove transport filters from an image stream, stopping at image codecs.
    fn decode_image(&self, id: ObjectId, stream: &StreamObject) -> Result<ImagePayload>;

    /// Produce a standalone image from a decoded payload.
    fn render_image(
        &self,
        id: ObjectId,
        stream: &StreamObject,
        payload: ImagePayload,
    ) -> Result<RenderedImage>;

    /// Drop cached decoded payloads. Returns the number of bytes released.
    fn reclaim(&self) -> u64;

    /// Bytes currently held by the decode cache.
    fn resident_bytes(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_from_filter() {
        assert_eq!(ImageCodec::from_filter("DCTDecode"), Some(ImageCodec::Dct));
        assert_eq!(ImageCodec::from_filter("JPXDecode"), Some(ImageCodec::Jpx));
        assert_eq!(ImageCodec::from_filter("CCF"), Some(ImageCodec::CcittFax));
        assert_eq!(ImageCodec::from_filter("FlateDecode"), None);
    }

    #[test]
    fn test_font_extensions() {
        assert_eq!(FontKind::TrueType.extension(), "ttf");
        assert_eq!(FontKind::OpenType.extension(), "otf");
        assert_eq!(FontKind::Cff.extension(), "cff");
        assert_eq!(FontKind::Type1.extension(), "t1");
    }

    #[test]
    fn test_rendered_image_skip() {
        assert!(RenderedImage::skipped().is_skipped());
        assert!(!RenderedImage::new("png", vec![1]).is_skipped());
    }
}
