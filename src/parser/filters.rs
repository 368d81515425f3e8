//! Stream filter pipeline.
//!
//! Transport filters are removed in order, each followed by its predictor
//! when `/DecodeParms` asks for one. Flate, LZW and ASCII85 are decoded by
//! lopdf; ASCIIHex goes through `hex`. Decoding stops at the first image
//! codec and the remaining bytes are returned still encoded, together with
//! the codec.

use lopdf::filters::png;

use crate::error::{Error, Result};
use crate::model::{Dictionary, ObjectTable, Value};
use crate::parser::backend::ImageCodec;

/// Output of the filter pipeline.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub data: Vec<u8>,
    /// Image codec the pipeline stopped at.
    pub codec: Option<ImageCodec>,
}

/// Predictor parameters from `/DecodeParms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeParams {
    /// 1 = none, 2 = TIFF, 10..=15 = PNG.
    pub predictor: i64,
    pub columns: i64,
    pub colors: i64,
    pub bits_per_component: i64,
    /// LZW code-width switch timing.
    pub early_change: bool,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
            early_change: true,
        }
    }
}

impl DecodeParams {
    fn from_dict(table: &ObjectTable, dict: &Dictionary) -> Self {
        let int = |key: &str, default: i64| {
            dict.get(key)
                .and_then(|v| table.resolve(v))
                .and_then(Value::as_i64)
                .unwrap_or(default)
        };
        Self {
            predictor: int("Predictor", 1),
            columns: int("Columns", 1).max(1),
            colors: int("Colors", 1).max(1),
            bits_per_component: int("BitsPerComponent", 8),
            early_change: int("EarlyChange", 1) != 0,
        }
    }

    /// Row geometry as (bytes per row, bytes per pixel), checked against
    /// overflow and against the `available` decoded bytes.
    fn row_layout(&self, available: usize) -> Result<(usize, usize)> {
        if !matches!(self.bits_per_component, 1 | 2 | 4 | 8 | 16) {
            return Err(Error::Decode(format!(
                "predictor with {} bits per component",
                self.bits_per_component
            )));
        }
        let too_large = || Error::Decode("predictor row size overflows".to_string());
        let columns = usize::try_from(self.columns).map_err(|_| too_large())?;
        let colors = usize::try_from(self.colors).map_err(|_| too_large())?;
        let bpc = self.bits_per_component as usize;

        let pixel_bits = colors.checked_mul(bpc).ok_or_else(too_large)?;
        let row_bits = pixel_bits.checked_mul(columns).ok_or_else(too_large)?;
        let row = row_bits.div_ceil(8);
        if row > available {
            return Err(Error::Decode(format!(
                "predictor row of {row} bytes exceeds {available} decoded bytes"
            )));
        }
        Ok((row, pixel_bits.div_ceil(8).max(1)))
    }
}

/// Filter names of a stream dictionary, in application order.
pub fn filter_names(table: &ObjectTable, dict: &Dictionary) -> Vec<String> {
    let Some(filter) = dict.get("Filter").and_then(|f| table.resolve(f)) else {
        return Vec::new();
    };
    match filter {
        Value::Name(n) => vec![n.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| table.resolve(v).and_then(Value::as_name).map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn decode_params(table: &ObjectTable, dict: &Dictionary, count: usize) -> Vec<DecodeParams> {
    let params = dict
        .get("DecodeParms")
        .or_else(|| dict.get("DP"))
        .and_then(|p| table.resolve(p));
    match params {
        Some(Value::Dictionary(d)) => {
            let mut out = vec![DecodeParams::default(); count];
            if let Some(first) = out.first_mut() {
                *first = DecodeParams::from_dict(table, d);
            }
            out
        }
        Some(Value::Array(items)) => (0..count)
            .map(|i| {
                items
                    .get(i)
                    .and_then(|v| table.resolve_dict(v))
                    .map(|d| DecodeParams::from_dict(table, d))
                    .unwrap_or_default()
            })
            .collect(),
        _ => vec![DecodeParams::default(); count],
    }
}

/// Run the filter pipeline of `dict` over `raw`.
pub fn decode(table: &ObjectTable, dict: &Dictionary, raw: &[u8]) -> Result<Decoded> {
    let names = filter_names(table, dict);
    let params = decode_params(table, dict, names.len());

    let mut data = raw.to_vec();
    for (name, params) in names.iter().zip(params) {
        if let Some(codec) = ImageCodec::from_filter(name) {
            return Ok(Decoded {
                data,
                codec: Some(codec),
            });
        }
        data = apply(name, data, &params)?;
        data = unpredict(data, &params)?;
    }
    Ok(Decoded { data, codec: None })
}

fn apply(name: &str, input: Vec<u8>, params: &DecodeParams) -> Result<Vec<u8>> {
    match name {
        "FlateDecode" | "Fl" => with_lopdf("FlateDecode", input, params),
        "LZWDecode" | "LZW" => with_lopdf("LZWDecode", input, params),
        "ASCII85Decode" | "A85" => {
            let body = input.strip_prefix(b"<~").map(<[u8]>::to_vec).unwrap_or(input);
            with_lopdf("ASCII85Decode", body, params)
        }
        "ASCIIHexDecode" | "AHx" => ascii_hex(&input),
        "RunLengthDecode" | "RL" => run_length(&input),
        other => Err(Error::Decode(format!("unsupported filter /{other}"))),
    }
}

/// Remove one filter with lopdf. Predictors are left to [`unpredict`], which
/// checks the row geometry first.
fn with_lopdf(filter: &str, input: Vec<u8>, params: &DecodeParams) -> Result<Vec<u8>> {
    let had_input = !input.is_empty();
    let mut dict = lopdf::Dictionary::new();
    dict.set("Filter", lopdf::Object::Name(filter.as_bytes().to_vec()));
    dict.set(
        "DecodeParms",
        lopdf::dictionary! { "EarlyChange" => i64::from(params.early_change) },
    );
    let stream = lopdf::Stream::new(dict, input);

    let output = stream
        .decompressed_content()
        .map_err(|e| Error::Decode(format!("{filter}: {e}")))?;
    // lopdf logs corrupt Flate and LZW data and keeps what it could inflate
    if had_input && output.is_empty() && filter != "ASCII85Decode" {
        return Err(Error::Decode(format!("{filter}: no data could be decoded")));
    }
    Ok(output)
}

fn ascii_hex(input: &[u8]) -> Result<Vec<u8>> {
    let mut digits: Vec<u8> = input
        .iter()
        .copied()
        .take_while(|&b| b != b'>')
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    // odd trailing digit is padded with zero
    if digits.len() % 2 == 1 {
        digits.push(b'0');
    }
    hex::decode(&digits).map_err(|e| Error::Decode(format!("ASCIIHexDecode: {e}")))
}

fn run_length(input: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 2);
    let mut i = 0;
    while i < input.len() {
        let len = input[i];
        i += 1;
        match len {
            128 => break,
            0..=127 => {
                let n = len as usize + 1;
                let literal = input
                    .get(i..i + n)
                    .ok_or_else(|| Error::Decode("RunLengthDecode: truncated literal".to_string()))?;
                out.extend_from_slice(literal);
                i += n;
            }
            _ => {
                let byte = *input
                    .get(i)
                    .ok_or_else(|| Error::Decode("RunLengthDecode: truncated run".to_string()))?;
                out.extend(std::iter::repeat(byte).take(257 - len as usize));
                i += 1;
            }
        }
    }
    Ok(out)
}

/// Reverse a TIFF or PNG predictor.
fn unpredict(data: Vec<u8>, params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        i64::MIN..=1 => Ok(data),
        2 => tiff_predictor(data, params),
        10..=15 => png_predictor(data, params),
        other => Err(Error::Decode(format!("unsupported predictor {other}"))),
    }
}

fn tiff_predictor(mut data: Vec<u8>, params: &DecodeParams) -> Result<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(Error::Decode(format!(
            "TIFF predictor with {} bits per component",
            params.bits_per_component
        )));
    }
    let (row, colors) = params.row_layout(data.len())?;
    for line in data.chunks_mut(row) {
        for i in colors..line.len() {
            line[i] = line[i].wrapping_add(line[i - colors]);
        }
    }
    Ok(data)
}

fn png_predictor(mut data: Vec<u8>, params: &DecodeParams) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(data);
    }
    let (row, bpp) = params.row_layout(data.len())?;
    if row % bpp != 0 {
        return Err(Error::Decode(format!(
            "PNG predictor row of {row} bytes is not whole {bpp}-byte pixels"
        )));
    }
    let stride = row + 1;
    let rows = data.len().div_ceil(stride);
    let payload = data.len() - rows;

    // a short last row is zero-filled, then cut back
    data.resize(rows * stride, 0);
    let mut out = png::decode_frame(&data, bpp, row / bpp)
        .map_err(|e| Error::Decode(format!("PNG predictor: {e}")))?;
    out.truncate(payload);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn dict(entries: &[(&str, Value)]) -> Dictionary {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_flate_stream() {
        let table = ObjectTable::new("1.6");
        let d = dict(&[("Filter", Value::Name("FlateDecode".into()))]);
        let decoded = decode(&table, &d, &zlib(b"BT /F1 12 Tf ET")).unwrap();
        assert_eq!(decoded.data, b"BT /F1 12 Tf ET");
        assert_eq!(decoded.codec, None);
    }

    #[test]
    fn test_stops_at_image_codec() {
        let table = ObjectTable::new("1.6");
        let d = dict(&[(
            "Filter",
            Value::Array(vec![
                Value::Name("ASCIIHexDecode".into()),
                Value::Name("DCTDecode".into()),
            ]),
        )]);
        let decoded = decode(&table, &d, b"FFD8 FFE0>").unwrap();
        assert_eq!(decoded.data, vec![0xFF, 0xD8, 0xFF, 0xE0]);
        assert_eq!(decoded.codec, Some(ImageCodec::Dct));
    }

    #[test]
    fn test_corrupt_flate_fails() {
        let table = ObjectTable::new("1.6");
        let d = dict(&[("Filter", Value::Name("FlateDecode".into()))]);
        assert!(matches!(
            decode(&table, &d, &[0xff; 32]),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_unknown_filter() {
        let table = ObjectTable::new("1.6");
        let d = dict(&[("Filter", Value::Name("Crypt".into()))]);
        assert!(decode(&table, &d, b"").is_err());
    }

    #[test]
    fn test_abbreviated_names() {
        let table = ObjectTable::new("1.6");
        let d = dict(&[(
            "Filter",
            Value::Array(vec![Value::Name("AHx".into()), Value::Name("Fl".into())]),
        )]);
        let hex: String = zlib(b"q Q").iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(decode(&table, &d, hex.as_bytes()).unwrap().data, b"q Q");
    }

    #[test]
    fn test_ascii_hex_odd_digit() {
        assert_eq!(ascii_hex(b"41 4>").unwrap(), vec![0x41, 0x40]);
        assert!(ascii_hex(b"4G>").is_err());
    }

    #[test]
    fn test_ascii85_with_delimiters() {
        let table = ObjectTable::new("1.6");
        let d = dict(&[("Filter", Value::Name("A85".into()))]);
        let decoded = decode(&table, &d, b"<~87cURD]i,\"Ebo80~>").unwrap();
        assert_eq!(decoded.data, b"Hello World");
    }

    #[test]
    fn test_run_length() {
        // literal "ab", then 'c' repeated 3 times, then EOD
        let input = [1, b'a', b'b', 254, b'c', 128];
        assert_eq!(run_length(&input).unwrap(), b"abccc");
    }

    #[test]
    fn test_png_up_predictor() {
        let params = DecodeParams {
            predictor: 12,
            columns: 3,
            ..Default::default()
        };
        let data = vec![2, 1, 2, 3, 2, 1, 1, 1];
        assert_eq!(png_predictor(data, &params).unwrap(), vec![1, 2, 3, 2, 3, 4]);
    }

    #[test]
    fn test_tiff_predictor() {
        let params = DecodeParams {
            predictor: 2,
            columns: 4,
            ..Default::default()
        };
        assert_eq!(tiff_predictor(vec![1, 1, 1, 1], &params).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_decode_parms_with_predictor() {
        let table = ObjectTable::new("1.6");
        let encoded = zlib(&[1, 5, 1, 1, 7, 1]);
        let d = dict(&[
            ("Filter", Value::Name("FlateDecode".into())),
            (
                "DecodeParms",
                Value::Dictionary(dict(&[
                    ("Predictor", Value::Integer(11)),
                    ("Columns", Value::Integer(2)),
                ])),
            ),
        ]);
        assert_eq!(decode(&table, &d, &encoded).unwrap().data, vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_oversized_predictor_row_is_rejected() {
        let table = ObjectTable::new("1.6");
        let d = dict(&[
            ("Filter", Value::Name("FlateDecode".into())),
            (
                "DecodeParms",
                Value::Dictionary(dict(&[
                    ("Predictor", Value::Integer(12)),
                    ("Columns", Value::Integer(i64::MAX)),
                    ("Colors", Value::Integer(i64::MAX)),
                ])),
            ),
        ]);
        assert!(matches!(
            decode(&table, &d, &zlib(&[2, 0, 0, 0])),
            Err(Error::Decode(_))
        ));

        let params = DecodeParams {
            predictor: 12,
            columns: 1 << 40,
            ..Default::default()
        };
        assert!(matches!(png_predictor(vec![0; 16], &params), Err(Error::Decode(_))));
    }
}
