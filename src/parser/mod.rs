//! Document reading: backend abstraction, filters, rendering, and the parse pipeline.

mod ai_parser;
mod backend;
pub mod filters;
mod lopdf_backend;
mod options;
pub mod render;

pub use ai_parser::AiParser;
pub use backend::{DocumentBackend, FontKind, FontProgram, ImageCodec, ImagePayload, RenderedImage};
pub use lopdf_backend::LopdfBackend;
pub use options::{ParseOptions, ValidationMode, BUFFER_SIZE_ENV, DEFAULT_BUFFER_SIZE, VALIDATION_ENV};
