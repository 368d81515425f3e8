//! Illustrator private data: a line scanner over the (possibly compressed)
//! `AIPrivateData` blob.

use std::fmt;
use std::io::{self, BufRead, BufReader, Cursor, Write};

use flate2::read::ZlibDecoder;
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::model::{Dictionary, ObjectTable, Value};
use crate::parser::DocumentBackend;

const COMPRESSED_MARKER: &[u8] = b"%AI12_CompressedData";
const ZSTD_MARKER: &[u8] = b"%AI24_ZStandard_Data";
const PRIVATE_STREAM_PREFIX: &str = "AIPrivateData";
const READ_CHUNK: usize = 64 * 1024;

/// Lazily scanned private data lines.
///
/// A line ends at CR, LF, or CRLF and never includes its terminator. The
/// scanner is single-consumer: every read needs `&mut self`.
pub struct PrivateData {
    reader: Box<dyn BufRead + Send>,
    line: Vec<u8>,
    max_line: usize,
    pending_cr: bool,
    done: bool,
    err: Option<io::Error>,
}

impl fmt::Debug for PrivateData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateData")
            .field("max_line", &self.max_line)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl PrivateData {
    /// Locate and open the private data of a document.
    ///
    /// Returns `Ok(None)` when no page carries Illustrator private data.
    pub fn open(
        table: &ObjectTable,
        backend: &dyn DocumentBackend,
        max_line: usize,
    ) -> Result<Option<Self>> {
        let Some(private) = private_dict(table) else {
            warn!("no Illustrator private data found");
            return Ok(None);
        };

        let mut parts: Vec<(u32, &Value)> = private
            .iter()
            .filter_map(|(key, value)| {
                let index = key.strip_prefix(PRIVATE_STREAM_PREFIX)?.parse().ok()?;
                Some((index, value))
            })
            .collect();
        if parts.is_empty() {
            warn!("Illustrator private dictionary has no data streams");
            return Ok(None);
        }
        parts.sort_by_key(|(index, _)| *index);

        let mut blob = Vec::new();
        for (index, value) in parts {
            let (id, stream) = table.resolve_stream(value).ok_or_else(|| {
                Error::PrivateData(format!("{PRIVATE_STREAM_PREFIX}{index} is not a stream"))
            })?;
            let decoded = backend
                .decode_stream(id, stream)
                .map_err(|e| e.for_object(id, "failed decoding private data"))?;
            blob.extend_from_slice(&decoded);
        }
        debug!("private data blob: {} bytes", blob.len());

        Self::from_blob(blob, max_line).map(Some)
    }

    /// Scanner over an assembled blob, inflating it when it carries the
    /// compressed-data marker.
    pub fn from_blob(blob: Vec<u8>, max_line: usize) -> Result<Self> {
        if blob.starts_with(ZSTD_MARKER) {
            return Err(Error::PrivateData(
                "Zstandard-compressed private data is not supported".to_string(),
            ));
        }
        if blob.starts_with(COMPRESSED_MARKER) {
            let mut body = Cursor::new(blob);
            body.set_position(COMPRESSED_MARKER.len() as u64);
            let inflated = BufReader::with_capacity(READ_CHUNK, ZlibDecoder::new(body));
            return Ok(Self::from_reader(inflated, max_line));
        }
        Ok(Self::from_reader(Cursor::new(blob), max_line))
    }

    /// Scanner over any buffered reader.
    pub fn from_reader<R: BufRead + Send + 'static>(reader: R, max_line: usize) -> Self {
        Self {
            reader: Box::new(reader),
            line: Vec::new(),
            max_line: max_line.max(1),
            pending_cr: false,
            done: false,
            err: None,
        }
    }

    /// Advance to the next line. `false` at the end of data or on error.
    pub fn scan(&mut self) -> bool {
        if self.done {
            return false;
        }
        self.line.clear();

        loop {
            let (consumed, terminated) = {
                let buf = match self.reader.fill_buf() {
                    Ok(buf) => buf,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return self.fail(e),
                };
                if buf.is_empty() {
                    self.done = true;
                    return !self.line.is_empty();
                }
                if self.pending_cr {
                    self.pending_cr = false;
                    if buf[0] == b'\n' {
                        (1, false)
                    } else {
                        (0, false)
                    }
                } else {
                    let end = buf.iter().position(|&b| b == b'\r' || b == b'\n');
                    let take = end.unwrap_or(buf.len());
                    if self.line.len() + take > self.max_line {
                        let err = io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("line exceeds buffer size of {} bytes", self.max_line),
                        );
                        return self.fail(err);
                    }
                    self.line.extend_from_slice(&buf[..take]);
                    match end {
                        Some(i) => {
                            self.pending_cr = buf[i] == b'\r';
                            (i + 1, true)
                        }
                        None => (take, false),
                    }
                }
            };
            self.reader.consume(consumed);
            if terminated {
                return true;
            }
        }
    }

    fn fail(&mut self, err: io::Error) -> bool {
        self.err = Some(err);
        self.done = true;
        false
    }

    /// The current line, valid until the next `scan`.
    pub fn bytes(&self) -> &[u8] {
        &self.line
    }

    /// The error that stopped scanning, if any.
    pub fn err(&self) -> Option<&io::Error> {
        self.err.as_ref()
    }

    /// Release the decompressor and buffers.
    pub fn close(self) {}

    /// Copy every remaining line to `writer`, each followed by CR.
    ///
    /// Returns the number of lines written.
    pub fn write_to<W: Write>(&mut self, writer: &mut W) -> io::Result<u64> {
        let mut lines = 0;
        while self.scan() {
            writer.write_all(&self.line)?;
            writer.write_all(b"\r")?;
            lines += 1;
        }
        match self.err.take() {
            Some(e) => Err(e),
            None => Ok(lines),
        }
    }
}

/// `/PieceInfo /Illustrator /Private` of the first page that has one.
fn private_dict(table: &ObjectTable) -> Option<&Dictionary> {
    table.pages().into_iter().find_map(|(_, page)| {
        let piece_info = lookup(table, page, "PieceInfo")?;
        let illustrator = lookup(table, piece_info, "Illustrator")?;
        lookup(table, illustrator, "Private")
    })
}

fn lookup<'a>(table: &'a ObjectTable, dict: &'a Dictionary, key: &str) -> Option<&'a Dictionary> {
    dict.get(key).and_then(|v| table.resolve_dict(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    fn lines(data: &mut PrivateData) -> Vec<String> {
        let mut out = Vec::new();
        while data.scan() {
            out.push(String::from_utf8_lossy(data.bytes()).into_owned());
        }
        out
    }

    #[test]
    fn test_mixed_terminators() {
        let mut data = PrivateData::from_blob(b"a\rb\nc\r\nd".to_vec(), 1024).unwrap();
        assert_eq!(lines(&mut data), vec!["a", "b", "c", "d"]);
        assert!(data.err().is_none());
        assert!(!data.scan());
    }

    #[test]
    fn test_empty_lines_are_kept() {
        let mut data = PrivateData::from_blob(b"a\r\rb\r".to_vec(), 1024).unwrap();
        assert_eq!(lines(&mut data), vec!["a", "", "b"]);
    }

    #[test]
    fn test_crlf_split_across_reads() {
        // one-byte buffer puts CR and LF in separate fills
        let reader = BufReader::with_capacity(1, Cursor::new(b"ab\r\ncd".to_vec()));
        let mut data = PrivateData::from_reader(reader, 1024);
        assert_eq!(lines(&mut data), vec!["ab", "cd"]);
    }

    #[test]
    fn test_compressed_blob() {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"%%BeginSetup\r%%EndSetup\r").unwrap();
        let mut blob = COMPRESSED_MARKER.to_vec();
        blob.extend(enc.finish().unwrap());

        let mut data = PrivateData::from_blob(blob, 1024).unwrap();
        assert_eq!(lines(&mut data), vec!["%%BeginSetup", "%%EndSetup"]);
    }

    #[test]
    fn test_zstd_is_rejected() {
        let mut blob = ZSTD_MARKER.to_vec();
        blob.extend_from_slice(b"\x28\xb5\x2f\xfd");
        assert!(matches!(
            PrivateData::from_blob(blob, 1024),
            Err(Error::PrivateData(_))
        ));
    }

    #[test]
    fn test_line_too_long() {
        let mut data = PrivateData::from_blob(b"short\rmuch too long\r".to_vec(), 8).unwrap();
        assert!(data.scan());
        assert_eq!(data.bytes(), b"short");
        assert!(!data.scan());
        assert_eq!(data.err().map(io::Error::kind), Some(io::ErrorKind::InvalidData));
    }

    #[test]
    fn test_corrupt_compressed_blob_reports_error() {
        let mut blob = COMPRESSED_MARKER.to_vec();
        blob.extend_from_slice(b"\xff\xff\xff\xff");
        let mut data = PrivateData::from_blob(blob, 1024).unwrap();
        assert!(!data.scan());
        assert!(data.err().is_some());
    }

    #[test]
    fn test_write_to_uses_cr() {
        let mut data = PrivateData::from_blob(b"x\ny\r\nz".to_vec(), 1024).unwrap();
        let mut out = Vec::new();
        assert_eq!(data.write_to(&mut out).unwrap(), 3);
        assert_eq!(out, b"x\ry\rz\r");
        data.close();
    }
}
