//! Illustrator document parser.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::classify::{classify, harvest_fonts};
use crate::detect::detect_format_from_bytes;
use crate::error::{Error, Result};
use crate::extract::{
    no_gauge, AllocationGauge, BitmapReader, FontHandle, Phase, PrivateData, ProgressCallback, Stats,
    StreamHandle,
};
use crate::model::{ClassifiedObjects, Document, DocumentSnapshot};
use crate::parser::{DocumentBackend, LopdfBackend, ParseOptions, ValidationMode};

/// Parser producing a [`Document`] from Illustrator PDF data.
///
/// Steps, in order: read, validate, open private data, classify streams,
/// optimize, harvest fonts, capture the metadata snapshot. Private data is
/// opened before optimize because optimize strips it from the graph.
///
/// A progress callback sees [`Phase::ReadingDocument`] and
/// [`Phase::ClassifyingObjects`].
#[derive(Clone)]
pub struct AiParser {
    options: ParseOptions,
    gauge: Arc<dyn AllocationGauge>,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for AiParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiParser")
            .field("options", &self.options)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl AiParser {
    /// Create a parser with the given options.
    pub fn new(options: ParseOptions) -> Self {
        Self {
            options,
            gauge: no_gauge(),
            progress: None,
        }
    }

    /// Use `gauge` for the parse checkpoints.
    pub fn with_gauge(mut self, gauge: Arc<dyn AllocationGauge>) -> Self {
        self.gauge = gauge;
        self
    }

    /// Call `callback` when a parse phase starts.
    pub fn on_progress<F>(self, callback: F) -> Self
    where
        F: Fn(Phase) + Send + Sync + 'static,
    {
        self.with_progress(Some(Arc::new(callback)))
    }

    /// Share an existing progress callback, or drop it with `None`.
    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    fn enter(&self, phase: Phase) {
        debug!("{phase}");
        if let Some(progress) = &self.progress {
            progress(phase);
        }
    }

    /// Parse a file from disk.
    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<Document> {
        self.enter(Phase::ReadingDocument);
        let data = std::fs::read(path.as_ref()).map_err(|e| Error::from(e).in_phase(Phase::ReadingDocument))?;
        self.parse_data(&data)
    }

    /// Parse from a reader.
    pub fn parse_reader<R: Read>(&self, mut reader: R) -> Result<Document> {
        self.enter(Phase::ReadingDocument);
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .map_err(|e| Error::from(e).in_phase(Phase::ReadingDocument))?;
        self.parse_data(&data)
    }

    /// Parse an in-memory document.
    pub fn parse_bytes(&self, data: &[u8]) -> Result<Document> {
        self.enter(Phase::ReadingDocument);
        self.parse_data(data)
    }

    fn parse_data(&self, data: &[u8]) -> Result<Document> {
        let mut stats = Stats::new(Arc::clone(&self.gauge));
        stats.observe("start");

        let format = detect_format_from_bytes(data).map_err(|e| e.in_phase(Phase::ReadingDocument))?;
        debug!("reading {format} ({} bytes)", data.len());
        let backend = LopdfBackend::load(data).map_err(|e| e.in_phase(Phase::ReadingDocument))?;
        stats.observe("read");

        self.parse_backend_with_stats(backend, stats)
    }

    /// Run the pipeline over an already read backend.
    pub fn parse_backend<B: DocumentBackend + 'static>(&self, backend: B) -> Result<Document> {
        self.enter(Phase::ReadingDocument);
        let mut stats = Stats::new(Arc::clone(&self.gauge));
        stats.observe("start");
        self.parse_backend_with_stats(backend, stats)
    }

    fn parse_backend_with_stats<B: DocumentBackend + 'static>(
        &self,
        mut backend: B,
        mut stats: Stats,
    ) -> Result<Document> {
        self.validate(&backend)?;
        stats.observe("validate");

        let private_data = if self.options.with_private_data {
            PrivateData::open(backend.objects(), &backend, self.options.buffer_size)
                .map_err(|e| e.in_phase(Phase::ReadingDocument))?
        } else {
            None
        };
        stats.observe("private data");

        self.enter(Phase::ClassifyingObjects);
        let mut classification = classify(backend.objects());
        backend
            .optimize()
            .map_err(|e| e.in_phase(Phase::ClassifyingObjects))?;
        // streams freed by optimize belong to the private region
        let table = backend.objects();
        classification
            .streams
            .retain(|id, _| table.get(*id).and_then(|e| e.as_stream()).is_some());
        classification
            .images
            .retain(|id, _| table.get(*id).and_then(|e| e.as_stream()).is_some());
        stats.observe("stream dicts");

        let fonts = harvest_fonts(&backend).map_err(|e| e.in_phase(Phase::ClassifyingObjects))?;
        stats.observe("fonts");

        let snapshot = DocumentSnapshot::capture(backend.objects());
        stats.observe("serialize");

        let backend: Arc<dyn DocumentBackend> = Arc::new(backend);
        let objects = ClassifiedObjects {
            bitmaps: classification
                .images
                .into_iter()
                .map(|(id, s)| (id, BitmapReader::new(id, s, Arc::clone(&backend))))
                .collect(),
            streams: classification
                .streams
                .into_iter()
                .map(|(id, s)| (id, StreamHandle::new(id, s, Arc::clone(&backend))))
                .collect(),
            fonts: fonts
                .into_iter()
                .map(|(id, p)| (id, FontHandle::new(id, p, Arc::clone(&backend))))
                .collect::<BTreeMap<_, _>>(),
        };

        info!(
            "parsed PDF {}: {} bitmaps, {} fonts, {} streams, private data: {}",
            snapshot.header_version,
            objects.bitmaps.len(),
            objects.fonts.len(),
            objects.streams.len(),
            if private_data.is_some() { "yes" } else { "no" }
        );
        if let Some(report) = stats.report() {
            debug!("parse statistics\n{report}");
        }

        Ok(Document::new(backend, snapshot, objects, private_data, stats))
    }

    fn validate(&self, backend: &dyn DocumentBackend) -> Result<()> {
        match backend.validate() {
            Ok(()) => Ok(()),
            Err(Error::Validation { object, message, .. }) => {
                let strict = self.options.validation_mode == ValidationMode::Strict;
                let err = Error::Validation {
                    object,
                    message,
                    strict,
                };
                if strict {
                    Err(err.in_phase(Phase::ReadingDocument))
                } else {
                    warn!("{err}");
                    Ok(())
                }
            }
            Err(e) => Err(e.in_phase(Phase::ReadingDocument)),
        }
    }
}

impl Default for AiParser {
    fn default() -> Self {
        Self::new(ParseOptions::default())
    }
}
