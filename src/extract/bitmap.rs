//! Image decode adapter.

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use tiff::decoder::{Decoder as TiffDecoder, DecodingResult};
use tiff::ColorType as TiffColor;

use crate::error::{Error, Result};
use crate::model::{ObjectId, StreamObject};
use crate::parser::render::encode_png;
use crate::parser::DocumentBackend;

/// A standalone image file produced from one image object.
///
/// An empty extension means the object cannot be rendered on its own and
/// produces no file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub extension: String,
    pub content: Vec<u8>,
}

impl DecodedImage {
    pub fn is_empty(&self) -> bool {
        self.extension.is_empty()
    }

    /// MIME type for the extension, e.g. `image/png`.
    pub fn mime(&self) -> String {
        match self.extension.as_str() {
            "" => String::new(),
            "jpg" => "image/jpeg".to_string(),
            ext => format!("image/{ext}"),
        }
    }
}

/// Reads one image object through the backend.
///
/// Holds no decoded state: every `read` decodes afresh.
#[derive(Clone)]
pub struct BitmapReader {
    id: ObjectId,
    stream: Arc<StreamObject>,
    backend: Arc<dyn DocumentBackend>,
}

impl fmt::Debug for BitmapReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitmapReader").field("id", &self.id).finish()
    }
}

impl BitmapReader {
    pub fn new(id: ObjectId, stream: Arc<StreamObject>, backend: Arc<dyn DocumentBackend>) -> Self {
        Self { id, stream, backend }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn stream(&self) -> &StreamObject {
        &self.stream
    }

    /// Decode, render, and normalize the image.
    ///
    /// TIFF output is transcoded to PNG; other formats are passed through.
    pub fn read(&self) -> Result<DecodedImage> {
        let payload = self
            .backend
            .decode_image(self.id, &self.stream)
            .map_err(|e| e.for_object(self.id, "failed decoding image"))?;
        let rendered = self
            .backend
            .render_image(self.id, &self.stream, payload)
            .map_err(|e| e.for_object(self.id, "failed rendering image"))?;

        if rendered.format == "tiff" {
            let content = tiff_to_png(&rendered.data)
                .map_err(|e| e.for_object(self.id, "failed transcoding image"))?;
            return Ok(DecodedImage {
                extension: "png".to_string(),
                content,
            });
        }
        Ok(DecodedImage {
            extension: rendered.format,
            content: rendered.data,
        })
    }
}

fn transcode_err(err: tiff::TiffError) -> Error {
    Error::Transcode(err.to_string())
}

/// Convert an 8-bit TIFF to PNG. CMYK samples are mapped to RGB.
pub fn tiff_to_png(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = TiffDecoder::new(Cursor::new(data)).map_err(transcode_err)?;
    let (width, height) = decoder.dimensions().map_err(transcode_err)?;
    let color = decoder.colortype().map_err(transcode_err)?;
    let pixels = match decoder.read_image().map_err(transcode_err)? {
        DecodingResult::U8(pixels) => pixels,
        _ => return Err(Error::Transcode("only 8-bit TIFF samples are supported".to_string())),
    };

    let png = match color {
        TiffColor::Gray(8) => encode_png(&pixels, width, height, 1),
        TiffColor::RGB(8) => encode_png(&pixels, width, height, 3),
        TiffColor::RGBA(8) => encode_png(&pixels, width, height, 4),
        TiffColor::CMYK(8) => {
            let rgb: Vec<u8> = pixels
                .chunks_exact(4)
                .flat_map(|p| {
                    let k = 255 - p[3] as u16;
                    [p[0], p[1], p[2]].map(|c| ((255 - c as u16) * k / 255) as u8)
                })
                .collect();
            encode_png(&rgb, width, height, 3)
        }
        other => Err(Error::Transcode(format!("unsupported TIFF color type {other:?}"))),
    };
    png.map_err(|e| match e {
        Error::Render(msg) => Error::Transcode(msg),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiff::encoder::{colortype, TiffEncoder};

    fn cmyk_tiff(pixels: &[u8], width: u32, height: u32) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut cursor).unwrap();
            encoder
                .write_image::<colortype::CMYK8>(width, height, pixels)
                .unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_cmyk_tiff_to_png() {
        // white then black
        let tiff = cmyk_tiff(&[0, 0, 0, 0, 0, 0, 0, 255], 2, 1);
        let png = tiff_to_png(&tiff).unwrap();
        assert!(png.starts_with(b"\x89PNG\r\n\x1a\n"));
    }

    #[test]
    fn test_garbage_tiff_fails() {
        assert!(matches!(tiff_to_png(b"not a tiff"), Err(Error::Transcode(_))));
    }

    #[test]
    fn test_decoded_image_mime() {
        let image = DecodedImage {
            extension: "jpg".to_string(),
            content: vec![],
        };
        assert_eq!(image.mime(), "image/jpeg");
        assert!(!image.is_empty());
    }
}
