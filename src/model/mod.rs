//! Document model types.
//!
//! The object model mirrors the PDF object graph with owned values so that
//! the table can be shared across worker threads once parsing is done.
//! The manifest types describe the persisted `source.json`.

mod document;
mod manifest;
mod object;

pub use document::{ClassifiedObjects, Document};
pub use manifest::{
    DocumentSnapshot, Manifest, ManifestBuilder, SnapshotEntry, SnapshotObject, FORMAT_VERSION,
};
pub use object::{
    decode_text, Dictionary, ObjectClass, ObjectEntry, ObjectId, ObjectRef, ObjectTable,
    StreamKind, StreamObject, Value,
};
