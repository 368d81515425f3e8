//! # unai
//!
//! Content extraction for Adobe Illustrator files saved with PDF
//! compatibility.
//!
//! A parse produces a [`Document`]: a metadata snapshot of the object graph
//! plus lazy readers for raster images, embedded fonts, content streams and
//! the Illustrator private data. An [`Extractor`] materializes a document
//! into a working directory holding `source.json` and sidecar files.
//!
//! ## Quick Start
//!
//! ```no_run
//! use unai::{extract_file, ExtractOptions, ParseOptions};
//!
//! fn main() -> unai::Result<()> {
//!     let extraction = extract_file("artwork.ai", ParseOptions::default(), ExtractOptions::default())?;
//!     println!("wrote {}", extraction.workspace.manifest_path().display());
//!     println!("{} bitmaps", extraction.manifest.bitmaps.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Object classification**: image streams, other streams, deduplicated fonts
//! - **Image decoding**: raw pixels to PNG, CMYK through TIFF, JPEG/JPX passthrough
//! - **Private data**: line scanner over the compressed Illustrator blob
//! - **Parallel extraction**: bounded worker pool for bitmaps
//! - **Bounded memory**: reclaim checkpoints between sequential objects
//! - **Host bridge**: lazy per-object reads through [`bridge::Session`]

pub mod bridge;
pub mod classify;
pub mod detect;
pub mod error;
pub mod extract;
pub mod model;
pub mod parser;

pub use bridge::{BitmapPayload, Chunk, FontPayload, Pending, PrivateDataChunks, Session};
pub use detect::{detect_format_from_bytes, detect_format_from_path, is_ai_file, AiFormat};
pub use error::{Error, Result};
pub use extract::{
    BitmapReader, DecodedImage, ExtractOptions, ExtractionRun, Extractor, FontHandle, Phase,
    PrivateData, ProgressCallback, Stats, StreamHandle, Workspace,
};
pub use model::{ClassifiedObjects, Document, DocumentSnapshot, Manifest, ObjectClass, ObjectId};
pub use parser::{AiParser, FontKind, ParseOptions, ValidationMode};

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Parse an Illustrator file.
///
/// # Example
///
/// ```no_run
/// use unai::parse_file;
///
/// let doc = parse_file("artwork.ai").unwrap();
/// println!("{} bitmaps", doc.objects().bitmaps.len());
/// ```
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Document> {
    AiParser::default().parse_file(path)
}

/// Parse an Illustrator file with custom options.
///
/// # Example
///
/// ```no_run
/// use unai::{parse_file_with_options, ParseOptions};
///
/// let options = ParseOptions::new().relaxed().without_private_data();
/// let doc = parse_file_with_options("artwork.ai", options).unwrap();
/// ```
pub fn parse_file_with_options<P: AsRef<Path>>(path: P, options: ParseOptions) -> Result<Document> {
    AiParser::new(options).parse_file(path)
}

/// Parse an in-memory document.
pub fn parse_bytes(data: &[u8]) -> Result<Document> {
    AiParser::default().parse_bytes(data)
}

/// Parse an in-memory document with custom options.
pub fn parse_bytes_with_options(data: &[u8], options: ParseOptions) -> Result<Document> {
    AiParser::new(options).parse_bytes(data)
}

/// Parse from a reader.
///
/// ```no_run
/// use std::fs::File;
/// use unai::parse_reader;
///
/// let doc = parse_reader(File::open("artwork.ai").unwrap()).unwrap();
/// ```
pub fn parse_reader<R: Read>(reader: R) -> Result<Document> {
    AiParser::default().parse_reader(reader)
}

/// Parse from a reader with custom options.
pub fn parse_reader_with_options<R: Read>(reader: R, options: ParseOptions) -> Result<Document> {
    AiParser::new(options).parse_reader(reader)
}

/// Working directory and manifest of a finished extraction.
#[derive(Debug)]
pub struct Extraction {
    pub workspace: Workspace,
    pub manifest: Manifest,
}

/// Parse `path` and extract it into a fresh directory named after the file
/// under the system temp directory.
pub fn extract_file<P: AsRef<Path>>(
    path: P,
    parse_options: ParseOptions,
    extract_options: ExtractOptions,
) -> Result<Extraction> {
    Unai::new()
        .with_parse_options(parse_options)
        .with_extract_options(extract_options)
        .extract(path)
}

/// File name used as the working directory prefix.
pub fn workspace_base(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unai".to_string())
}

/// Builder for parsing and extracting Illustrator documents.
///
/// # Example
///
/// ```no_run
/// use unai::Unai;
///
/// let extraction = Unai::new()
///     .relaxed()
///     .with_parallelism(4)
///     .with_output_dir("/tmp/out")
///     .extract("artwork.ai")?;
/// println!("{}", extraction.workspace.root().display());
/// # Ok::<(), unai::Error>(())
/// ```
#[derive(Clone, Default)]
pub struct Unai {
    parse_options: ParseOptions,
    extract_options: ExtractOptions,
    output_dir: Option<PathBuf>,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for Unai {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unai")
            .field("parse_options", &self.parse_options)
            .field("extract_options", &self.extract_options)
            .field("output_dir", &self.output_dir)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Unai {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options from `UNAI_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            parse_options: ParseOptions::from_env(),
            extract_options: ExtractOptions::from_env(),
            output_dir: None,
            progress: None,
        }
    }

    pub fn with_parse_options(mut self, options: ParseOptions) -> Self {
        self.parse_options = options;
        self
    }

    pub fn with_extract_options(mut self, options: ExtractOptions) -> Self {
        self.extract_options = options;
        self
    }

    /// Log validation errors instead of failing.
    pub fn relaxed(mut self) -> Self {
        self.parse_options = self.parse_options.relaxed();
        self
    }

    /// Skip the private data.
    pub fn without_private_data(mut self) -> Self {
        self.parse_options = self.parse_options.without_private_data();
        self
    }

    /// Maximum private data line length.
    pub fn with_buffer_size(mut self, bytes: usize) -> Self {
        self.parse_options = self.parse_options.with_buffer_size(bytes);
        self
    }

    /// Bitmap worker count.
    pub fn with_parallelism(mut self, n: usize) -> Self {
        self.extract_options = self.extract_options.with_parallelism(n);
        self
    }

    pub fn with_reclaim_threshold(mut self, bytes: u64) -> Self {
        self.extract_options = self.extract_options.with_reclaim_threshold(bytes);
        self
    }

    /// Create working directories under `dir` instead of the temp directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Call `callback` on every parse and extraction phase.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(Phase) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn parse<P: AsRef<Path>>(&self, path: P) -> Result<Document> {
        AiParser::new(self.parse_options.clone())
            .with_progress(self.progress.clone())
            .parse_file(path)
    }

    /// Parse and extract `path` into a new working directory.
    pub fn extract<P: AsRef<Path>>(&self, path: P) -> Result<Extraction> {
        let path = path.as_ref();
        let mut document = self.parse(path)?;
        let workspace = Workspace::create(self.output_dir.as_deref(), &workspace_base(path))
            .map_err(|e| e.in_phase(Phase::ExtractingBitmaps))?;
        let manifest = Extractor::new(self.extract_options.clone())
            .with_progress(self.progress.clone())
            .run(&mut document, &workspace)?;
        Ok(Extraction {
            workspace,
            manifest,
        })
    }

    /// Parse `data` and keep it open for lazy reads.
    pub fn open(&self, data: &[u8]) -> Result<Arc<Session>> {
        Session::open(data, self.parse_options.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unai_builder() {
        let unai = Unai::new()
            .relaxed()
            .without_private_data()
            .with_parallelism(0)
            .with_reclaim_threshold(1024)
            .with_output_dir("/tmp/unai");

        assert_eq!(unai.parse_options.validation_mode, ValidationMode::Relaxed);
        assert!(!unai.parse_options.with_private_data);
        assert_eq!(unai.extract_options.parallelism, 1);
        assert_eq!(unai.extract_options.reclaim_threshold, 1024);
        assert_eq!(unai.output_dir, Some(PathBuf::from("/tmp/unai")));
    }

    #[test]
    fn test_parse_bytes_rejects_non_pdf() {
        assert!(parse_bytes(b"").is_err());
        assert!(parse_bytes(b"%PDF").is_err());
        let err = parse_bytes(b"<!DOCTYPE html><html></html>").unwrap_err();
        assert!(matches!(err.phase(), Some(Phase::ReadingDocument)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_parse_reports_progress() {
        use std::sync::Mutex;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let parser = AiParser::default().on_progress(move |phase| {
            sink.lock().unwrap().push(phase)
        });
        assert!(parser.parse_bytes(b"not a pdf").is_err());
        assert_eq!(*seen.lock().unwrap(), vec![Phase::ReadingDocument]);
    }

    #[test]
    fn test_workspace_base() {
        assert_eq!(workspace_base(Path::new("/a/b/artwork.ai")), "artwork.ai");
        assert_eq!(workspace_base(Path::new("/")), "unai");
    }
}
