//! Image rendering from decoded payloads.
//!
//! JPEG and JPEG 2000 data pass through untouched. Raw samples in gray,
//! RGB, ICC-based and indexed color spaces are written as PNG; CMYK samples
//! are written as a TIFF container. Masks, fax and JBIG2 data, and color
//! spaces without a direct pixel mapping render to an empty format.

use std::io::Cursor;

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use log::debug;
use tiff::encoder::{colortype, TiffEncoder};

use crate::error::{Error, Result};
use crate::model::{Dictionary, ObjectTable, Value};
use crate::parser::backend::{ImageCodec, ImagePayload, RenderedImage};
use crate::parser::filters;

/// Pixel layout after color-space resolution.
#[derive(Debug, Clone, PartialEq)]
enum Layout {
    Gray,
    Rgb,
    Cmyk,
    /// Palette entries in the base layout, `hival + 1` of them.
    Indexed { base: Box<Layout>, palette: Vec<u8> },
}

impl Layout {
    fn components(&self) -> usize {
        match self {
            Layout::Gray => 1,
            Layout::Rgb => 3,
            Layout::Cmyk => 4,
            Layout::Indexed { .. } => 1,
        }
    }
}

/// Render one image stream.
pub fn render(table: &ObjectTable, dict: &Dictionary, payload: ImagePayload) -> Result<RenderedImage> {
    if dict.get("ImageMask").and_then(Value::as_bool) == Some(true) {
        return Ok(RenderedImage::skipped());
    }

    match payload.codec {
        Some(ImageCodec::Dct) => return Ok(RenderedImage::new("jpg", payload.data)),
        Some(ImageCodec::Jpx) => return Ok(RenderedImage::new("jpx", payload.data)),
        Some(codec) => {
            debug!("image codec {codec:?} is not rendered");
            return Ok(RenderedImage::skipped());
        }
        None => {}
    }

    let Some(layout) = dict
        .get("ColorSpace")
        .map(|cs| resolve_color_space(table, cs))
        .transpose()?
        .flatten()
    else {
        debug!("image color space has no direct pixel mapping");
        return Ok(RenderedImage::skipped());
    };

    let width = positive(table, dict, "Width")?;
    let height = positive(table, dict, "Height")?;
    let bpc = dict
        .get("BitsPerComponent")
        .and_then(|v| table.resolve(v))
        .and_then(Value::as_i64)
        .unwrap_or(8);
    if !matches!(bpc, 1 | 2 | 4 | 8 | 16) {
        return Err(Error::Render(format!("unsupported BitsPerComponent {bpc}")));
    }

    let components = layout.components();
    let mut samples = unpack(
        &payload.data,
        width as usize,
        height as usize,
        components,
        bpc as usize,
        !matches!(layout, Layout::Indexed { .. }),
    )?;
    if matches!(layout, Layout::Gray) && inverted_decode(dict) {
        samples.iter_mut().for_each(|s| *s = 255 - *s);
    }

    match layout {
        Layout::Gray => encode_png(&samples, width, height, 1).map(|d| RenderedImage::new("png", d)),
        Layout::Rgb => encode_png(&samples, width, height, 3).map(|d| RenderedImage::new("png", d)),
        Layout::Cmyk => encode_cmyk_tiff(&samples, width, height).map(|d| RenderedImage::new("tiff", d)),
        Layout::Indexed { base, palette } => {
            let n = base.components();
            let mut pixels = Vec::with_capacity(samples.len() * n);
            for &index in &samples {
                let start = index as usize * n;
                match palette.get(start..start + n) {
                    Some(entry) => pixels.extend_from_slice(entry),
                    None => pixels.extend(std::iter::repeat(0).take(n)),
                }
            }
            match *base {
                Layout::Cmyk => encode_cmyk_tiff(&pixels, width, height)
                    .map(|d| RenderedImage::new("tiff", d)),
                _ => encode_png(&pixels, width, height, n).map(|d| RenderedImage::new("png", d)),
            }
        }
    }
}

fn positive(table: &ObjectTable, dict: &Dictionary, key: &str) -> Result<u32> {
    dict.get(key)
        .and_then(|v| table.resolve(v))
        .and_then(Value::as_i64)
        .filter(|v| *v > 0 && *v <= u32::MAX as i64)
        .map(|v| v as u32)
        .ok_or_else(|| Error::Render(format!("missing or invalid /{key}")))
}

fn inverted_decode(dict: &Dictionary) -> bool {
    let Some(decode) = dict.get("Decode").and_then(Value::as_array) else {
        return false;
    };
    let first = decode.first().and_then(Value::as_i64);
    let second = decode.get(1).and_then(Value::as_i64);
    first == Some(1) && second == Some(0)
}

fn resolve_color_space(table: &ObjectTable, value: &Value) -> Result<Option<Layout>> {
    let Some(value) = table.resolve(value) else {
        return Ok(None);
    };
    match value {
        Value::Name(name) => Ok(device_layout(name)),
        Value::Array(items) => {
            let family = items.first().and_then(Value::as_name).unwrap_or_default();
            match family {
                "ICCBased" => Ok(items
                    .get(1)
                    .and_then(|s| table.resolve_dict(s))
                    .and_then(|d| d.get("N"))
                    .and_then(Value::as_i64)
                    .and_then(|n| match n {
                        1 => Some(Layout::Gray),
                        3 => Some(Layout::Rgb),
                        4 => Some(Layout::Cmyk),
                        _ => None,
                    })),
                "CalGray" => Ok(Some(Layout::Gray)),
                "CalRGB" => Ok(Some(Layout::Rgb)),
                "Indexed" | "I" => indexed(table, items),
                _ => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

fn device_layout(name: &str) -> Option<Layout> {
    match name {
        "DeviceGray" | "G" | "CalGray" => Some(Layout::Gray),
        "DeviceRGB" | "RGB" | "CalRGB" => Some(Layout::Rgb),
        "DeviceCMYK" | "CMYK" => Some(Layout::Cmyk),
        _ => None,
    }
}

fn indexed(table: &ObjectTable, items: &[Value]) -> Result<Option<Layout>> {
    let base = match items.get(1) {
        Some(base) => resolve_color_space(table, base)?,
        None => None,
    };
    let Some(base) = base.filter(|b| !matches!(b, Layout::Indexed { .. })) else {
        return Ok(None);
    };

    let palette = match items.get(3) {
        Some(Value::String(bytes)) => bytes.clone(),
        Some(lookup @ Value::Reference(_)) => match table.resolve_stream(lookup) {
            Some((_, stream)) => filters::decode(table, &stream.dict, stream.raw())?.data,
            None => table
                .resolve(lookup)
                .and_then(Value::as_bytes)
                .map(<[u8]>::to_vec)
                .unwrap_or_default(),
        },
        _ => Vec::new(),
    };
    Ok(Some(Layout::Indexed {
        base: Box::new(base),
        palette,
    }))
}

/// Expand packed samples to one byte each.
///
/// With `scale`, sub-byte samples are stretched to the full 0..=255 range;
/// without it (palette indices) they keep their value. 16-bit samples keep
/// the high byte.
fn unpack(
    data: &[u8],
    width: usize,
    height: usize,
    components: usize,
    bpc: usize,
    scale: bool,
) -> Result<Vec<u8>> {
    let too_large = || Error::Render(format!("image of {width}x{height} samples is too large"));
    let per_row = width.checked_mul(components).ok_or_else(too_large)?;
    let row_bytes = per_row.checked_mul(bpc).ok_or_else(too_large)?.div_ceil(8);
    let needed = row_bytes.checked_mul(height).ok_or_else(too_large)?;
    if data.len() < needed {
        return Err(Error::Render(format!(
            "image data too short: {} bytes, expected {needed}",
            data.len()
        )));
    }

    let mut out = Vec::with_capacity(per_row.saturating_mul(height));
    for row in data.chunks(row_bytes).take(height) {
        match bpc {
            8 => out.extend_from_slice(&row[..per_row]),
            16 => out.extend(row.chunks(2).take(per_row).map(|c| c[0])),
            _ => {
                let max = (1u16 << bpc) - 1;
                let mask = max as u8;
                for i in 0..per_row {
                    let bit = i * bpc;
                    let shift = 8 - bpc - (bit % 8);
                    let v = (row[bit / 8] >> shift) & mask;
                    out.push(if scale { (v as u16 * 255 / max) as u8 } else { v });
                }
            }
        }
    }
    Ok(out)
}

/// Encode 8-bit gray or RGB pixels as PNG.
pub fn encode_png(pixels: &[u8], width: u32, height: u32, channels: usize) -> Result<Vec<u8>> {
    let color = match channels {
        1 => ColorType::L8,
        3 => ColorType::Rgb8,
        4 => ColorType::Rgba8,
        n => return Err(Error::Render(format!("cannot encode {n} channels as PNG"))),
    };
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(pixels, width, height, color)
        .map_err(|e| Error::Render(e.to_string()))?;
    Ok(out)
}

fn encode_cmyk_tiff(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut encoder =
            TiffEncoder::new(&mut cursor).map_err(|e| Error::Render(e.to_string()))?;
        encoder
            .write_image::<colortype::CMYK8>(width, height, pixels)
            .map_err(|e| Error::Render(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}
