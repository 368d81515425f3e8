//! Error types for unai library.

use std::io;
use thiserror::Error;

use crate::extract::Phase;
use crate::model::{ObjectClass, ObjectId};

/// Result type alias for unai operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during document extraction.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file format is not recognized as PDF.
    #[error("Unknown file format: not a valid PDF")]
    UnknownFormat,

    /// The PDF version is not supported.
    #[error("Unsupported PDF version: {0}")]
    UnsupportedVersion(String),

    /// The document could not be read into an object graph.
    #[error("while opening read context: {0}")]
    DocumentRead(String),

    /// The PDF document is encrypted.
    #[error("Document is encrypted")]
    Encrypted,

    /// Structural non-conformance found by the validator.
    #[error("validation error (obj#:{}){}: {message}", object_label(.object), relaxed_hint(.strict))]
    Validation {
        /// Offending object, when known.
        object: Option<ObjectId>,
        /// What the validator rejected.
        message: String,
        /// Whether the failure happened in strict mode.
        strict: bool,
    },

    /// A stream filter could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// An image could not be rendered.
    #[error("Render error: {0}")]
    Render(String),

    /// A rendered image could not be transcoded.
    #[error("Transcode error: {0}")]
    Transcode(String),

    /// Error extracting an embedded font program.
    #[error("Font extraction error: {0}")]
    Font(String),

    /// Error locating or decompressing the private data blob.
    #[error("Private data error: {0}")]
    PrivateData(String),

    /// Object number not present in the requested set.
    #[error("Object {0} not found")]
    ObjectNotFound(ObjectId),

    /// Failure tied to one object.
    #[error("{context} (obj#:{object}): {source}")]
    Object {
        /// Object number the failure belongs to.
        object: ObjectId,
        /// Step that failed.
        context: &'static str,
        /// Underlying error.
        #[source]
        source: Box<Error>,
    },

    /// One or more objects of a class failed.
    #[error("failed extracting {class} (total of {count} errors): {first}")]
    Aggregate {
        /// Class that was being extracted.
        class: ObjectClass,
        /// Number of failed objects.
        count: usize,
        /// First recorded failure.
        #[source]
        first: Box<Error>,
    },

    /// Failure annotated with the pipeline phase it occurred in.
    #[error("whilst {phase}: {source}")]
    Phase {
        /// Phase the failure occurred in.
        phase: Phase,
        /// Underlying error.
        #[source]
        source: Box<Error>,
    },

    /// Manifest or profile serialization failed.
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

fn object_label(object: &Option<ObjectId>) -> String {
    object.map_or_else(|| "?".to_string(), |o| o.to_string())
}

fn relaxed_hint(strict: &bool) -> &'static str {
    if *strict {
        " (try relaxed mode)"
    } else {
        ""
    }
}

impl Error {
    /// Attach an object number and step label.
    pub fn for_object(self, object: ObjectId, context: &'static str) -> Self {
        Error::Object {
            object,
            context,
            source: Box::new(self),
        }
    }

    /// Attach the pipeline phase.
    pub fn in_phase(self, phase: Phase) -> Self {
        Error::Phase {
            phase,
            source: Box::new(self),
        }
    }

    /// Phase the error was raised in, if it was annotated.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Error::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Process exit status for the batch front end.
    ///
    /// Parse-side failures map to 1, extraction-side failures to 2.
    pub fn exit_code(&self) -> i32 {
        match self.phase() {
            Some(phase) if phase.is_extraction() => 2,
            _ => 1,
        }
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => Error::Io(e),
            lopdf::Error::Decryption(_) => Error::Encrypted,
            _ => Error::DocumentRead(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialize(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Encrypted;
        assert_eq!(err.to_string(), "Document is encrypted");

        let err = Error::Validation {
            object: Some(12),
            message: "missing /Pages".to_string(),
            strict: true,
        };
        assert_eq!(
            err.to_string(),
            "validation error (obj#:12) (try relaxed mode): missing /Pages"
        );
    }

    #[test]
    fn test_object_context() {
        let err = Error::Decode("bad zlib header".to_string()).for_object(7, "failed decoding image");
        assert_eq!(
            err.to_string(),
            "failed decoding image (obj#:7): Decode error: bad zlib header"
        );
    }

    #[test]
    fn test_aggregate_display() {
        let err = Error::Aggregate {
            class: ObjectClass::Bitmaps,
            count: 3,
            first: Box::new(Error::Render("boom".to_string())),
        };
        assert_eq!(
            err.to_string(),
            "failed extracting bitmaps (total of 3 errors): Render error: boom"
        );
    }

    #[test]
    fn test_exit_codes() {
        let parse = Error::DocumentRead("eof".to_string()).in_phase(Phase::ReadingDocument);
        assert_eq!(parse.exit_code(), 1);

        let dump = Error::Other("x".to_string()).in_phase(Phase::ExtractingStreams);
        assert_eq!(dump.exit_code(), 2);

        assert_eq!(Error::UnknownFormat.exit_code(), 1);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
