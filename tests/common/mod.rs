//! Fixture Illustrator documents built with lopdf.

#![allow(dead_code)]

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

/// Builder for a one-page Illustrator PDF.
pub struct Fixture {
    doc: Document,
    pages_id: ObjectId,
    page_id: ObjectId,
    private: Option<Dictionary>,
}

impl Fixture {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.6");
        let pages_id = doc.new_object_id();
        let page_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            page_id,
            private: None,
        }
    }

    /// Uncompressed 8-bit RGB image.
    pub fn rgb_image(&mut self, width: u32, height: u32) -> u32 {
        let pixels: Vec<u8> = (0..width * height * 3).map(|i| (i % 251) as u8).collect();
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        };
        self.doc.add_object(Stream::new(dict, pixels)).0
    }

    /// Flate-compressed 8-bit gray image.
    pub fn gray_image(&mut self, width: u32, height: u32) -> u32 {
        let pixels: Vec<u8> = (0..width * height).map(|i| (i * 7 % 256) as u8).collect();
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        };
        self.doc.add_object(Stream::new(dict, zlib(&pixels))).0
    }

    /// DCT image; the payload passes through untouched.
    pub fn jpeg_image(&mut self, payload: &[u8]) -> u32 {
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 1,
            "Height" => 1,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        };
        self.doc.add_object(Stream::new(dict, payload.to_vec())).0
    }

    /// Image whose Flate payload cannot be inflated.
    pub fn corrupt_image(&mut self) -> u32 {
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 4,
            "Height" => 4,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        };
        self.doc.add_object(Stream::new(dict, vec![0xff; 32])).0
    }

    /// Uncompressed 8-bit CMYK image.
    pub fn cmyk_image(&mut self, width: u32, height: u32) -> u32 {
        let pixels: Vec<u8> = (0..width * height * 4).map(|i| (i * 13 % 256) as u8).collect();
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => "DeviceCMYK",
            "BitsPerComponent" => 8,
        };
        self.doc.add_object(Stream::new(dict, pixels)).0
    }

    /// RGB image claiming `u32::MAX` by `u32::MAX` pixels over 16 bytes.
    pub fn oversized_image(&mut self) -> u32 {
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(u32::MAX),
            "Height" => i64::from(u32::MAX),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        };
        self.doc.add_object(Stream::new(dict, vec![0; 16])).0
    }

    /// Stencil mask; it has no standalone rendition.
    pub fn image_mask(&mut self) -> u32 {
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 8,
            "Height" => 1,
            "ImageMask" => true,
            "BitsPerComponent" => 1,
        };
        self.doc.add_object(Stream::new(dict, vec![0b1010_1010])).0
    }

    /// Flate-compressed content stream holding `data`.
    pub fn content_stream(&mut self, data: &[u8]) -> u32 {
        let dict = dictionary! { "Filter" => "FlateDecode" };
        self.doc.add_object(Stream::new(dict, zlib(data))).0
    }

    /// Embedded TrueType font; returns the font dictionary id.
    pub fn truetype_font(&mut self, name: &str, program: &[u8]) -> u32 {
        let file_id = self.doc.add_object(Stream::new(dictionary! {}, program.to_vec()));
        let descriptor_id = self.doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => name,
            "FontFile2" => file_id,
        });
        self.doc
            .add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "TrueType",
                "BaseFont" => name,
                "FontDescriptor" => descriptor_id,
            })
            .0
    }

    /// Store `lines` as Illustrator private data split over `parts` streams.
    pub fn private_data(&mut self, lines: &[&str], compressed: bool, parts: usize) {
        let text = lines.join("\n");
        let blob = if compressed {
            let mut blob = b"%AI12_CompressedData".to_vec();
            blob.extend_from_slice(&zlib(text.as_bytes()));
            blob
        } else {
            text.into_bytes()
        };

        let parts = parts.max(1);
        let size = blob.len().div_ceil(parts).max(1);
        let mut private = Dictionary::new();
        // insert in reverse so ordering comes from the key index
        for (index, chunk) in blob.chunks(size).enumerate().rev() {
            let id = self.doc.add_object(Stream::new(dictionary! {}, chunk.to_vec()));
            private.set(format!("AIPrivateData{}", index + 1), id);
        }
        let meta = self
            .doc
            .add_object(Stream::new(dictionary! {}, b"<x:xmpmeta/>".to_vec()));
        private.set("AIMetaData", meta);
        private.set("NumBlock", blob.chunks(size).count() as i64);
        self.private = Some(private);
    }

    /// Serialize the document.
    pub fn build(mut self) -> Vec<u8> {
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        };
        if let Some(private) = self.private.take() {
            page.set(
                "PieceInfo",
                dictionary! {
                    "Illustrator" => dictionary! {
                        "LastModified" => Object::string_literal("D:20240101000000Z"),
                        "Private" => private,
                    },
                },
            );
        }
        self.doc.objects.insert(self.page_id, Object::Dictionary(page));
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![self.page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        self.doc
            .save_to(&mut out)
            .expect("fixture document serializes");
        out
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("in-memory write");
    encoder.finish().expect("in-memory finish")
}

/// Number of regular files directly under `dir`; zero when it is missing.
pub fn file_count(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).filter(|e| e.path().is_file()).count())
        .unwrap_or(0)
}
