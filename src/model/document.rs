//! Parsed document: metadata snapshot plus lazily readable objects.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::extract::{BitmapReader, FontHandle, PrivateData, Stats, StreamHandle};
use crate::model::{DocumentSnapshot, ObjectId};
use crate::parser::DocumentBackend;

/// Objects materialized by the extractor, keyed by object number.
///
/// `bitmaps` and `streams` never share a key.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedObjects {
    pub bitmaps: BTreeMap<ObjectId, BitmapReader>,
    pub streams: BTreeMap<ObjectId, StreamHandle>,
    pub fonts: BTreeMap<ObjectId, FontHandle>,
}

impl ClassifiedObjects {
    pub fn is_empty(&self) -> bool {
        self.bitmaps.is_empty() && self.streams.is_empty() && self.fonts.is_empty()
    }
}

/// Result of parsing one Illustrator file.
pub struct Document {
    backend: Arc<dyn DocumentBackend>,
    snapshot: DocumentSnapshot,
    objects: ClassifiedObjects,
    private_data: Option<PrivateData>,
    stats: Stats,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("version", &self.snapshot.header_version)
            .field("bitmaps", &self.objects.bitmaps.len())
            .field("streams", &self.objects.streams.len())
            .field("fonts", &self.objects.fonts.len())
            .field("private_data", &self.private_data.is_some())
            .finish()
    }
}

impl Document {
    pub(crate) fn new(
        backend: Arc<dyn DocumentBackend>,
        snapshot: DocumentSnapshot,
        objects: ClassifiedObjects,
        private_data: Option<PrivateData>,
        stats: Stats,
    ) -> Self {
        Self {
            backend,
            snapshot,
            objects,
            private_data,
            stats,
        }
    }

    /// Metadata snapshot taken after the optimize pass.
    pub fn snapshot(&self) -> &DocumentSnapshot {
        &self.snapshot
    }

    /// Snapshot serialized as JSON.
    pub fn metadata_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.snapshot)?)
    }

    /// PDF header version.
    pub fn version(&self) -> &str {
        &self.snapshot.header_version
    }

    pub fn page_count(&self) -> u32 {
        self.snapshot.page_count
    }

    pub fn objects(&self) -> &ClassifiedObjects {
        &self.objects
    }

    pub fn bitmap(&self, id: ObjectId) -> Result<&BitmapReader> {
        self.objects.bitmaps.get(&id).ok_or(Error::ObjectNotFound(id))
    }

    pub fn font(&self, id: ObjectId) -> Result<&FontHandle> {
        self.objects.fonts.get(&id).ok_or(Error::ObjectNotFound(id))
    }

    pub fn stream(&self, id: ObjectId) -> Result<&StreamHandle> {
        self.objects.streams.get(&id).ok_or(Error::ObjectNotFound(id))
    }

    pub fn has_private_data(&self) -> bool {
        self.private_data.is_some()
    }

    /// Take the private data scanner. It can be consumed only once.
    pub fn take_private_data(&mut self) -> Option<PrivateData> {
        self.private_data.take()
    }

    /// Checkpoints recorded while parsing.
    pub fn parse_stats(&self) -> &Stats {
        &self.stats
    }

    pub fn backend(&self) -> &Arc<dyn DocumentBackend> {
        &self.backend
    }
}
