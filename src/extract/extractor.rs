//! Extraction orchestrator.
//!
//! Materializes a parsed [`Document`] into a [`Workspace`]: bitmaps through
//! the worker pool, fonts and stream contents sequentially with reclaim
//! checkpoints, then private data and the manifest.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use log::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::extract::bitmap::BitmapReader;
use crate::extract::pool::{Task, TaskOutcome, WorkerPool};
use crate::extract::stats::{AllocationGauge, Stats};
use crate::extract::workspace::{
    relative, Workspace, BITMAP_SUBDIR, FONT_SUBDIR, PRIVATE_DATA_FILE, STREAM_CONTENTS_SUBDIR,
};
use crate::extract::ExtractOptions;
use crate::model::{Document, Manifest, ManifestBuilder, ObjectClass, ObjectId};

/// Pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    ReadingDocument,
    ClassifyingObjects,
    ExtractingBitmaps,
    ExtractingFonts,
    ExtractingStreams,
    ExtractingPrivateData,
    BuildingManifest,
    PersistingManifest,
    /// Terminal state; `true` on success.
    Closed(bool),
}

impl Phase {
    /// Whether the phase belongs to materialization rather than parsing.
    pub fn is_extraction(self) -> bool {
        matches!(
            self,
            Phase::ExtractingBitmaps
                | Phase::ExtractingFonts
                | Phase::ExtractingStreams
                | Phase::ExtractingPrivateData
                | Phase::BuildingManifest
                | Phase::PersistingManifest
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Created => write!(f, "starting"),
            Phase::ReadingDocument => write!(f, "reading document"),
            Phase::ClassifyingObjects => write!(f, "classifying objects"),
            Phase::ExtractingBitmaps => write!(f, "extracting bitmaps"),
            Phase::ExtractingFonts => write!(f, "extracting fonts"),
            Phase::ExtractingStreams => write!(f, "extracting stream dicts"),
            Phase::ExtractingPrivateData => write!(f, "dumping private data"),
            Phase::BuildingManifest => write!(f, "building manifest"),
            Phase::PersistingManifest => write!(f, "writing source.json"),
            Phase::Closed(true) => write!(f, "done"),
            Phase::Closed(false) => write!(f, "failed"),
        }
    }
}

/// Observer of phase transitions.
pub type ProgressCallback = Arc<dyn Fn(Phase) + Send + Sync>;

/// Runs extractions with fixed options.
#[derive(Clone, Default)]
pub struct Extractor {
    options: ExtractOptions,
    gauge: Option<Arc<dyn AllocationGauge>>,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("options", &self.options)
            .field("gauge", &self.gauge.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Extractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self {
            options,
            gauge: None,
            progress: None,
        }
    }

    /// Measure live bytes with `gauge` instead of the backend decode cache.
    pub fn with_gauge(mut self, gauge: Arc<dyn AllocationGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    /// Call `callback` on every phase transition.
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

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Prepare a run: create the sidecar directories.
    pub fn begin<'d>(&self, doc: &'d mut Document, workspace: &Workspace) -> Result<ExtractionRun<'d>> {
        let gauge = match &self.gauge {
            Some(gauge) => Arc::clone(gauge),
            None => {
                let backend = Arc::clone(doc.backend());
                Arc::new(move || backend.resident_bytes())
            }
        };
        ExtractionRun::new(
            doc,
            workspace.clone(),
            self.options.clone(),
            Stats::new(gauge),
            self.progress.clone(),
        )
    }

    /// Extract everything and persist the manifest.
    pub fn run(&self, doc: &mut Document, workspace: &Workspace) -> Result<Manifest> {
        let mut run = self.begin(doc, workspace)?;
        let result = run.execute();
        run.close(result.is_ok());
        result
    }
}

/// One in-flight extraction.
///
/// Sidecars written before a failure stay on disk and in the partial view
/// returned by [`ExtractionRun::partial`]. Dropping the run removes the
/// sidecar directories that received no files.
pub struct ExtractionRun<'d> {
    doc: &'d mut Document,
    workspace: Workspace,
    options: ExtractOptions,
    stats: Stats,
    builder: ManifestBuilder,
    bitmaps_written: usize,
    fonts_written: usize,
    streams_written: usize,
    phase: Phase,
    progress: Option<ProgressCallback>,
}

impl<'d> ExtractionRun<'d> {
    fn new(
        doc: &'d mut Document,
        workspace: Workspace,
        options: ExtractOptions,
        stats: Stats,
        progress: Option<ProgressCallback>,
    ) -> Result<Self> {
        for subdir in [BITMAP_SUBDIR, FONT_SUBDIR, STREAM_CONTENTS_SUBDIR] {
            // directory setup counts as the first extraction step
            fs::create_dir_all(workspace.subdir(subdir))
                .map_err(|e| Error::from(e).in_phase(Phase::ExtractingBitmaps))?;
        }
        let builder = ManifestBuilder::new(doc.snapshot().clone());
        let mut run = Self {
            doc,
            workspace,
            options,
            stats,
            builder,
            bitmaps_written: 0,
            fonts_written: 0,
            streams_written: 0,
            phase: Phase::Created,
            progress,
        };
        run.enter(Phase::Created);
        Ok(run)
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        debug!("phase: {phase}");
        if let Some(progress) = &self.progress {
            progress(phase);
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Sidecar paths recorded so far.
    pub fn partial(&self) -> &ManifestBuilder {
        &self.builder
    }

    /// Files written per class: (bitmaps, fonts, streams).
    pub fn written(&self) -> (usize, usize, usize) {
        (self.bitmaps_written, self.fonts_written, self.streams_written)
    }

    /// Run every phase in order.
    pub fn execute(&mut self) -> Result<Manifest> {
        self.stats.observe("start");

        self.extract_bitmaps()
            .map_err(|e| e.in_phase(Phase::ExtractingBitmaps))?;
        self.stats.observe("bitmaps");

        self.extract_fonts()
            .map_err(|e| e.in_phase(Phase::ExtractingFonts))?;
        self.stats.observe("fonts");

        self.extract_streams()
            .map_err(|e| e.in_phase(Phase::ExtractingStreams))?;
        self.stats.observe("stream dicts");

        self.extract_private_data()
            .map_err(|e| e.in_phase(Phase::ExtractingPrivateData))?;
        self.stats.observe("private data");

        let manifest = self.build_manifest();
        let path = self
            .persist(&manifest)
            .map_err(|e| e.in_phase(Phase::PersistingManifest))?;
        self.stats.observe("encode");
        info!("wrote {}", path.display());

        if let Some(profile) = &self.options.profile_path {
            if let Err(e) = self.stats.write_profile(profile) {
                warn!("failed writing profile {}: {e}", profile.display());
            }
        }
        Ok(manifest)
    }

    /// Decode every bitmap through the worker pool.
    ///
    /// All outcomes are drained before returning, so every successful
    /// sidecar is recorded even when some objects fail.
    pub fn extract_bitmaps(&mut self) -> Result<()> {
        self.enter(Phase::ExtractingBitmaps);
        let readers: Vec<BitmapReader> = self.doc.objects().bitmaps.values().cloned().collect();
        let total = readers.len();
        if total == 0 {
            return Ok(());
        }

        let dir = self.workspace.subdir(BITMAP_SUBDIR);
        let pool = WorkerPool::new(self.options.parallelism)?;
        debug!("decoding {total} bitmaps on {} workers", pool.size());

        let builder = &mut self.builder;
        let written = &mut self.bitmaps_written;
        let pool_ref = &pool;
        let errors = thread::scope(|s| {
            // the collector is the only writer of the bitmap map and counter
            let collector = s.spawn(move || {
                let mut errors = Vec::new();
                for _ in 0..total {
                    let outcome = match pool_ref.recv() {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            errors.push(e);
                            break;
                        }
                    };
                    if let Some(file) = outcome.file {
                        builder.bitmap(outcome.object, relative(BITMAP_SUBDIR, &file));
                        *written += 1;
                    }
                    if let Some(err) = outcome.error {
                        errors.push(err);
                    }
                }
                errors
            });

            for reader in readers {
                let task = BitmapTask {
                    reader,
                    dir: dir.clone(),
                };
                if pool_ref.submit(task).is_err() {
                    break;
                }
            }
            collector.join()
        })
        .map_err(|_| Error::Other("bitmap collector panicked".to_string()))?;
        drop(pool);

        let mut errors = errors.into_iter();
        match errors.next() {
            None => Ok(()),
            Some(first) => Err(Error::Aggregate {
                class: ObjectClass::Bitmaps,
                count: errors.len() + 1,
                first: Box::new(first),
            }),
        }
    }

    /// Write every embedded font program.
    pub fn extract_fonts(&mut self) -> Result<()> {
        self.enter(Phase::ExtractingFonts);
        let dir = self.workspace.subdir(FONT_SUBDIR);
        let fonts: Vec<_> = self.doc.objects().fonts.values().cloned().collect();

        for font in fonts {
            let id = font.id();
            let name = format!("{id}.{}", font.extension());
            let bytes = font.read()?;
            write_sidecar(&dir.join(&name), &bytes)
                .map_err(|e| e.for_object(id, "failed writing font"))?;
            drop(bytes);

            self.builder.font(id, relative(FONT_SUBDIR, &name));
            self.fonts_written += 1;
            trace!("wrote font {name} ({})", font.name());
            self.checkpoint(id);
        }
        Ok(())
    }

    /// Write the decoded contents of every non-image stream.
    pub fn extract_streams(&mut self) -> Result<()> {
        self.enter(Phase::ExtractingStreams);
        let dir = self.workspace.subdir(STREAM_CONTENTS_SUBDIR);
        let streams: Vec<_> = self.doc.objects().streams.values().cloned().collect();

        for stream in streams {
            let id = stream.id();
            let name = id.to_string();
            let bytes = stream.read()?;
            write_sidecar(&dir.join(&name), &bytes)
                .map_err(|e| e.for_object(id, "failed writing stream contents"))?;
            drop(bytes);

            self.builder.stream(id, relative(STREAM_CONTENTS_SUBDIR, &name));
            self.streams_written += 1;
            self.checkpoint(id);
        }
        Ok(())
    }

    /// Drop cached payloads when live bytes grew past the threshold.
    fn checkpoint(&mut self, id: ObjectId) {
        if self.stats.growth() <= self.options.reclaim_threshold {
            return;
        }
        self.stats.observe(format!("at {id} - before reclaim"));
        let released = self.doc.backend().reclaim();
        debug!("reclaimed {released} bytes at obj#:{id}");
        self.stats.observe(format!("at {id} - after reclaim"));
    }

    /// Write the private data lines to `_private.ai`.
    ///
    /// The scanner is closed whether or not writing succeeds.
    pub fn extract_private_data(&mut self) -> Result<()> {
        self.enter(Phase::ExtractingPrivateData);
        let Some(mut data) = self.doc.take_private_data() else {
            self.builder.private_data("");
            return Ok(());
        };

        let path = self.workspace.private_data_path();
        let result = File::create(&path).and_then(|file| {
            let mut writer = BufWriter::new(file);
            let lines = data.write_to(&mut writer)?;
            writer.flush()?;
            Ok(lines)
        });
        data.close();

        let lines = result?;
        debug!("wrote {lines} private data lines");
        self.builder.private_data(PRIVATE_DATA_FILE);
        Ok(())
    }

    fn build_manifest(&mut self) -> Manifest {
        self.enter(Phase::BuildingManifest);
        self.builder.clone().build()
    }

    fn persist(&mut self, manifest: &Manifest) -> Result<PathBuf> {
        self.enter(Phase::PersistingManifest);
        let path = self.workspace.manifest_path();
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut writer, manifest)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(path)
    }

    /// Enter the terminal state and tear down.
    pub fn close(mut self, success: bool) {
        self.enter(Phase::Closed(success));
    }
}

impl Drop for ExtractionRun<'_> {
    fn drop(&mut self) {
        for (subdir, written) in [
            (BITMAP_SUBDIR, self.bitmaps_written),
            (FONT_SUBDIR, self.fonts_written),
            (STREAM_CONTENTS_SUBDIR, self.streams_written),
        ] {
            if written == 0 {
                // best effort; a non-empty directory stays
                let _ = fs::remove_dir(self.workspace.subdir(subdir));
            }
        }
    }
}

fn write_sidecar(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes)?;
    Ok(())
}

/// Decode one bitmap and write it into the bitmap directory.
struct BitmapTask {
    reader: BitmapReader,
    dir: PathBuf,
}

impl Task for BitmapTask {
    fn object(&self) -> ObjectId {
        self.reader.id()
    }

    fn run(self) -> TaskOutcome {
        let id = self.reader.id();
        let image = match self.reader.read() {
            Ok(image) => image,
            Err(e) => return TaskOutcome::failed(id, e),
        };
        if image.is_empty() {
            trace!("bitmap {id} has no standalone rendition");
            return TaskOutcome::skipped(id);
        }

        let name = format!("{id}.{}", image.extension);
        match write_sidecar(&self.dir.join(&name), &image.content) {
            Ok(()) => TaskOutcome::written(id, name),
            Err(e) => TaskOutcome::failed(id, e.for_object(id, "failed writing image")),
        }
    }
}
