//! In-process bridge for a host environment.
//!
//! A [`Session`] parses a document once and then serves metadata, per-object
//! payloads, and the private data in chunks. Every call can be issued as a
//! background request that returns a [`Pending`] handle.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{bounded, Receiver, TryRecvError};
use log::debug;

use crate::error::{Error, Result};
use crate::extract::PrivateData;
use crate::model::{ClassifiedObjects, Document, ObjectId};
use crate::parser::{AiParser, FontKind, ParseOptions};

/// Lines per private data chunk.
pub const CHUNK_LINES: usize = 100;

/// A decoded bitmap ready to hand to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmapPayload {
    /// `<id>.<ext>`, or empty when the bitmap has no standalone rendition
    pub name: String,
    pub mime: String,
    pub content: Vec<u8>,
}

/// An extracted font program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontPayload {
    /// Base font name from the font dictionary
    pub name: String,
    pub kind: FontKind,
    pub content: Vec<u8>,
}

/// One slice of the private data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    /// No further chunks follow.
    pub done: bool,
    /// CR-terminated lines.
    pub value: Vec<u8>,
}

/// Pull-based iterator over the private data, [`CHUNK_LINES`] lines at a time.
///
/// The scanner is closed on the final chunk and on the first error.
pub struct PrivateDataChunks {
    scanner: Option<PrivateData>,
}

impl fmt::Debug for PrivateDataChunks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateDataChunks")
            .field("open", &self.scanner.is_some())
            .finish()
    }
}

impl PrivateDataChunks {
    pub fn new(scanner: PrivateData) -> Self {
        Self {
            scanner: Some(scanner),
        }
    }

    /// Read the next chunk. After `done` every call yields an empty done chunk.
    pub fn next_chunk(&mut self) -> Result<Chunk> {
        let Some(scanner) = self.scanner.as_mut() else {
            return Ok(Chunk {
                done: true,
                value: Vec::new(),
            });
        };

        let mut value = Vec::new();
        for _ in 0..CHUNK_LINES {
            if !scanner.scan() {
                let failure = scanner
                    .err()
                    .map(|e| Error::PrivateData(format!("reading line: {e}")));
                self.close();
                return match failure {
                    Some(err) => Err(err),
                    None => {
                        // the final chunk carries one empty CR-terminated line
                        value.push(b'\r');
                        Ok(Chunk { done: true, value })
                    }
                };
            }
            value.extend_from_slice(scanner.bytes());
            value.push(b'\r');
        }
        Ok(Chunk { done: false, value })
    }

    pub fn is_closed(&self) -> bool {
        self.scanner.is_none()
    }

    fn close(&mut self) {
        if let Some(scanner) = self.scanner.take() {
            scanner.close();
        }
    }
}

/// Completion handle for a background request.
///
/// Dropping it abandons the result; the call itself still runs to the end.
#[derive(Debug)]
pub struct Pending<T> {
    rx: Receiver<T>,
}

impl<T> Pending<T> {
    /// Block until the call completes.
    pub fn wait(self) -> Result<T> {
        self.rx
            .recv()
            .map_err(|_| Error::Other("request was dropped before completing".to_string()))
    }

    /// The result if the call already completed.
    pub fn try_get(&self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(value) => Some(Ok(value)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(Error::Other(
                "request was dropped before completing".to_string(),
            ))),
        }
    }
}

/// A parsed document held open for lazy reads.
pub struct Session {
    metadata: String,
    version: String,
    page_count: u32,
    objects: ClassifiedObjects,
    private_data: Mutex<Option<PrivateData>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("version", &self.version)
            .field("bitmaps", &self.objects.bitmaps.len())
            .field("fonts", &self.objects.fonts.len())
            .field("streams", &self.objects.streams.len())
            .finish()
    }
}

impl Session {
    /// Parse `data` and keep the result for later reads.
    pub fn open(data: &[u8], options: ParseOptions) -> Result<Arc<Self>> {
        let document = AiParser::new(options).parse_bytes(data)?;
        Self::from_document(document).map(Arc::new)
    }

    pub fn from_document(mut document: Document) -> Result<Self> {
        let metadata = document.metadata_json()?;
        let private_data = document.take_private_data();
        debug!("session opened: {document:?}");
        Ok(Self {
            metadata,
            version: document.version().to_string(),
            page_count: document.page_count(),
            objects: document.objects().clone(),
            private_data: Mutex::new(private_data),
        })
    }

    /// The object graph snapshot as JSON.
    pub fn metadata_json(&self) -> &str {
        &self.metadata
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn bitmap_ids(&self) -> Vec<ObjectId> {
        self.objects.bitmaps.keys().copied().collect()
    }

    pub fn font_ids(&self) -> Vec<ObjectId> {
        self.objects.fonts.keys().copied().collect()
    }

    pub fn stream_ids(&self) -> Vec<ObjectId> {
        self.objects.streams.keys().copied().collect()
    }

    pub fn read_bitmap(&self, id: ObjectId) -> Result<BitmapPayload> {
        let reader = self.objects.bitmaps.get(&id).ok_or(Error::ObjectNotFound(id))?;
        let image = reader.read()?;
        let (name, mime) = if image.is_empty() {
            (String::new(), String::new())
        } else {
            (format!("{id}.{}", image.extension), image.mime())
        };
        Ok(BitmapPayload {
            name,
            mime,
            content: image.content,
        })
    }

    pub fn read_font(&self, id: ObjectId) -> Result<FontPayload> {
        let font = self.objects.fonts.get(&id).ok_or(Error::ObjectNotFound(id))?;
        let content = font.read()?;
        Ok(FontPayload {
            name: font.name().to_string(),
            kind: font.kind(),
            content: content.to_vec(),
        })
    }

    pub fn read_stream_content(&self, id: ObjectId) -> Result<Vec<u8>> {
        let stream = self.objects.streams.get(&id).ok_or(Error::ObjectNotFound(id))?;
        Ok(stream.read()?.to_vec())
    }

    /// Hand out the private data. Returns `None` when absent or already taken.
    pub fn take_private_data(&self) -> Option<PrivateDataChunks> {
        self.private_data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(PrivateDataChunks::new)
    }

    /// Run `f` on the rayon pool.
    pub fn request<T, F>(self: &Arc<Self>, f: F) -> Pending<Result<T>>
    where
        T: Send + 'static,
        F: FnOnce(&Session) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let session = Arc::clone(self);
        rayon::spawn(move || {
            // the receiver may be gone; the result is then discarded
            let _ = tx.send(f(&session));
        });
        Pending { rx }
    }

    /// Run `f` on tokio's blocking pool.
    #[cfg(feature = "async")]
    pub async fn run_async<T, F>(self: &Arc<Self>, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Session) -> Result<T> + Send + 'static,
    {
        let session = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&session))
            .await
            .map_err(|e| Error::Other(format!("blocking task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn chunks(text: &str) -> PrivateDataChunks {
        PrivateDataChunks::new(PrivateData::from_reader(Cursor::new(text.as_bytes().to_vec()), 1024))
    }

    #[test]
    fn test_chunks_short_data() {
        let mut chunks = chunks("%AI5_a\n%AI5_b\r\n%AI5_c");
        let chunk = chunks.next_chunk().unwrap();
        assert!(chunk.done);
        assert_eq!(chunk.value, b"%AI5_a\r%AI5_b\r%AI5_c\r\r");
        assert!(chunks.is_closed());

        let again = chunks.next_chunk().unwrap();
        assert!(again.done);
        assert!(again.value.is_empty());
    }

    #[test]
    fn test_chunks_split_at_line_limit() {
        let text: String = (0..CHUNK_LINES + 5).map(|i| format!("line {i}\n")).collect();
        let mut chunks = chunks(&text);

        let first = chunks.next_chunk().unwrap();
        assert!(!first.done);
        assert_eq!(first.value.iter().filter(|&&b| b == b'\r').count(), CHUNK_LINES);

        let second = chunks.next_chunk().unwrap();
        assert!(second.done);
        assert_eq!(second.value.iter().filter(|&&b| b == b'\r').count(), 6);
        assert!(second.value.starts_with(b"line 100\r"));
        assert!(second.value.ends_with(b"line 104\r\r"));
    }

    #[test]
    fn test_chunks_error_closes() {
        let mut chunks = PrivateDataChunks::new(PrivateData::from_reader(
            Cursor::new(b"0123456789abcdef\n".to_vec()),
            4,
        ));
        assert!(matches!(chunks.next_chunk(), Err(Error::PrivateData(_))));
        assert!(chunks.is_closed());
    }

    #[test]
    fn test_pending_abandoned() {
        let (tx, rx) = bounded::<u32>(1);
        let pending = Pending { rx };
        assert!(pending.try_get().is_none());
        drop(tx);
        assert!(matches!(pending.try_get(), Some(Err(Error::Other(_)))));
    }
}
