//! Object extraction: readers for each object class, the private data
//! scanner, the worker pool, and the orchestrator that writes sidecars and
//! the manifest.

mod bitmap;
mod extractor;
mod font;
mod options;
mod pool;
mod private_data;
mod stats;
mod stream;
mod workspace;

pub use bitmap::{tiff_to_png, BitmapReader, DecodedImage};
pub use extractor::{ExtractionRun, Extractor, Phase, ProgressCallback};
pub use font::FontHandle;
pub use options::{
    default_parallelism, ExtractOptions, DEFAULT_RECLAIM_THRESHOLD, PARALLELISM_ENV, PROFILE_ENV,
};
pub use pool::{Task, TaskOutcome, WorkerPool};
pub use private_data::PrivateData;
pub use stats::{byte_size, no_gauge, AllocationGauge, Checkpoint, ReportRow, Stats, StatsReport};
pub use stream::StreamHandle;
pub use workspace::{
    relative, Workspace, BITMAP_SUBDIR, FONT_SUBDIR, MANIFEST_FILE, PRIVATE_DATA_FILE,
    STREAM_CONTENTS_SUBDIR,
};
