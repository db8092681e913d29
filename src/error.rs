//! Error handling for radar compositing operations.
//!
//! One error enum covers the whole pipeline: object I/O, option parsing,
//! area lookup, projection, quality control, tile work and combination.
//! Recoverable conditions (unreadable inputs, failed tiles) are logged by the
//! caller and never surface here; what does surface aborts the request.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for the radar compositor
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// A radar object file could not be encoded or decoded
    #[error("Codec error in file '{path}': {reason}")]
    Codec { path: PathBuf, reason: String },

    /// Invalid option value (product, selection method, interpolation method, ...)
    #[error("Invalid value '{value}' for {option}, expected one of: {expected}")]
    InvalidOption {
        option: String,
        value: String,
        expected: String,
    },

    /// Unknown quality control mode
    #[error("Invalid quality control mode '{mode}', expected 'analyze' or 'analyze_and_apply'")]
    InvalidQualityControlMode { mode: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Area or projection id not present in the registry
    #[error("Unknown area: {id}")]
    UnknownArea { id: String },

    /// Projection definition could not be used
    #[error("Projection error for '{definition}': {reason}")]
    Projection { definition: String, reason: String },

    /// No input object carries a usable nominal time
    #[error("Indeterminate timestamp: {message}")]
    IndeterminateTimestamp { message: String },

    /// Composite generation failed inside the generator
    #[error("Composite generation failed: {message}")]
    Generation { message: String },

    /// A quality control detector failed
    #[error("Quality control detector '{detector}' failed: {message}")]
    QualityControl { detector: String, message: String },

    /// Tile results could not be merged
    #[error("Tile combination failed: {message}")]
    TileCombination { message: String },

    /// A tile worker could not run its task
    #[error("Tile worker for '{tile}' failed: {message}")]
    TileWorker { tile: String, message: String },

    /// Date/time parsing error
    #[error("Date/time parsing error: {message}")]
    DateTimeParsing {
        message: String,
        #[source]
        source: chrono::ParseError,
    },

    /// Configuration or registry file could not be parsed
    #[error("YAML error in '{path}': {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl Error {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a codec error for a radar object file
    pub fn codec(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Codec {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid option error
    pub fn invalid_option(
        option: impl Into<String>,
        value: impl Into<String>,
        expected: &[&str],
    ) -> Self {
        Self::InvalidOption {
            option: option.into(),
            value: value.into(),
            expected: expected.join(", "),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn unknown_area(id: impl Into<String>) -> Self {
        Self::UnknownArea { id: id.into() }
    }

    pub fn projection(definition: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Projection {
            definition: definition.into(),
            reason: reason.into(),
        }
    }

    pub fn indeterminate_timestamp(message: impl Into<String>) -> Self {
        Self::IndeterminateTimestamp {
            message: message.into(),
        }
    }

    /// Create a generation error
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    pub fn quality_control(detector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QualityControl {
            detector: detector.into(),
            message: message.into(),
        }
    }

    pub fn tile_combination(message: impl Into<String>) -> Self {
        Self::TileCombination {
            message: message.into(),
        }
    }

    pub fn tile_worker(tile: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TileWorker {
            tile: tile.into(),
            message: message.into(),
        }
    }

    /// Create a date/time parsing error
    pub fn datetime_parsing(message: impl Into<String>, source: chrono::ParseError) -> Self {
        Self::DateTimeParsing {
            message: message.into(),
            source,
        }
    }

    /// Whether this error is a configuration problem detected before any work ran
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::InvalidOption { .. }
                | Self::InvalidQualityControlMode { .. }
                | Self::UnknownArea { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::io("I/O operation failed", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_option_lists_expected_values() {
        let err = Error::invalid_option("product", "foo", &["ppi", "cappi"]);
        assert_eq!(
            err.to_string(),
            "Invalid value 'foo' for product, expected one of: ppi, cappi"
        );
        assert!(err.is_configuration());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io { .. }));
        assert!(!err.is_configuration());
    }
}
