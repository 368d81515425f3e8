//! Lazy reader for embedded font programs.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::model::ObjectId;
use crate::parser::{DocumentBackend, FontKind, FontProgram};

/// Handle to the embedded program of one font dictionary.
#[derive(Clone)]
pub struct FontHandle {
    id: ObjectId,
    program: FontProgram,
    backend: Arc<dyn DocumentBackend>,
}

impl fmt::Debug for FontHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontHandle")
            .field("id", &self.id)
            .field("name", &self.program.name)
            .field("kind", &self.program.kind)
            .finish()
    }
}

impl FontHandle {
    pub fn new(id: ObjectId, program: FontProgram, backend: Arc<dyn DocumentBackend>) -> Self {
        Self { id, program, backend }
    }

    /// Object number of the font dictionary.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.program.name
    }

    pub fn kind(&self) -> FontKind {
        self.program.kind
    }

    /// Sidecar extension, e.g. `ttf`.
    pub fn extension(&self) -> &'static str {
        self.program.extension()
    }

    /// Decoded font program bytes.
    pub fn read(&self) -> Result<Arc<[u8]>> {
        self.backend
            .decode_stream(self.program.file_id, &self.program.file)
            .map_err(|e| e.for_object(self.id, "failed decoding font program"))
    }
}
