//! Lazy reader for non-image streams.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{Dictionary, ObjectId, StreamObject};
use crate::parser::DocumentBackend;

/// Handle to a content, form, or other non-image stream.
#[derive(Clone)]
pub struct StreamHandle {
    id: ObjectId,
    stream: Arc<StreamObject>,
    backend: Arc<dyn DocumentBackend>,
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle").field("id", &self.id).finish()
    }
}

impl StreamHandle {
    pub fn new(id: ObjectId, stream: Arc<StreamObject>, backend: Arc<dyn DocumentBackend>) -> Self {
        Self { id, stream, backend }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn dict(&self) -> &Dictionary {
        &self.stream.dict
    }

    /// Decoded stream contents. Shared with the backend cache until reclaimed.
    pub fn read(&self) -> Result<Arc<[u8]>> {
        self.backend
            .decode_stream(self.id, &self.stream)
            .map_err(|e| e.for_object(self.id, "failed decoding stream contents"))
    }
}
