//! Parsing options and configuration.

use std::env;

use log::warn;

/// Environment variable overriding the maximum private-data line length.
pub const BUFFER_SIZE_ENV: &str = "UNAI_BUFFER_SIZE";
/// Environment variable selecting the validation mode (`strict` or `relaxed`).
pub const VALIDATION_ENV: &str = "UNAI_VALIDATION";

/// Default maximum private-data line length: 512 MiB.
pub const DEFAULT_BUFFER_SIZE: usize = 512 * 1024 * 1024;

/// Options for parsing Illustrator documents.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// How validation findings are treated.
    pub validation_mode: ValidationMode,

    /// Whether to open the Illustrator private data.
    pub with_private_data: bool,

    /// Maximum length of one private-data line in bytes.
    pub buffer_size: usize,
}

impl ParseOptions {
    /// Create new parse options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `UNAI_BUFFER_SIZE` and `UNAI_VALIDATION`.
    ///
    /// Values that do not parse are ignored with a warning.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(raw) = env::var(BUFFER_SIZE_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => options.buffer_size = size,
                _ => warn!("ignoring {BUFFER_SIZE_ENV}={raw:?}"),
            }
        }
        if let Ok(raw) = env::var(VALIDATION_ENV) {
            match raw.parse() {
                Ok(mode) => options.validation_mode = mode,
                Err(()) => warn!("ignoring {VALIDATION_ENV}={raw:?}"),
            }
        }
        options
    }

    /// Set validation mode.
    pub fn with_validation_mode(mut self, mode: ValidationMode) -> Self {
        self.validation_mode = mode;
        self
    }

    /// Downgrade validation errors to warnings.
    pub fn relaxed(mut self) -> Self {
        self.validation_mode = ValidationMode::Relaxed;
        self
    }

    /// Enable or disable private data.
    pub fn with_private_data(mut self, enabled: bool) -> Self {
        self.with_private_data = enabled;
        self
    }

    /// Skip private data.
    pub fn without_private_data(mut self) -> Self {
        self.with_private_data = false;
        self
    }

    /// Set the maximum private-data line length.
    pub fn with_buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes.max(1);
        self
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            validation_mode: ValidationMode::Strict,
            with_private_data: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Validation mode during parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Validation errors abort the parse
    #[default]
    Strict,
    /// Validation errors are logged and parsing continues
    Relaxed,
}

impl std::str::FromStr for ValidationMode {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ValidationMode::Strict),
            "relaxed" | "lenient" => Ok(ValidationMode::Relaxed),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options_builder() {
        let options = ParseOptions::new()
            .relaxed()
            .without_private_data()
            .with_buffer_size(4096);

        assert_eq!(options.validation_mode, ValidationMode::Relaxed);
        assert!(!options.with_private_data);
        assert_eq!(options.buffer_size, 4096);
    }

    #[test]
    fn test_default_options() {
        let options = ParseOptions::default();
        assert_eq!(options.validation_mode, ValidationMode::Strict);
        assert!(options.with_private_data);
        assert_eq!(options.buffer_size, 512 * 1024 * 1024);
    }

    #[test]
    fn test_validation_mode_from_str() {
        assert_eq!("Relaxed".parse(), Ok(ValidationMode::Relaxed));
        assert_eq!("strict".parse(), Ok(ValidationMode::Strict));
        assert_eq!("loose".parse::<ValidationMode>(), Err(()));
    }
}
