use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::request::PdfFormats;

/// Unified error type for collaborators and configuration
///
/// This enum is the vocabulary spoken by everything at the edges of the
/// pipeline:
/// - Converters (typed client errors plus an opaque failure)
/// - PDF engines (merge, format conversion, metadata)
/// - External processes and the request working directory
/// - Request validation and configuration loading
///
/// The coordinator never hands this type to its caller directly; it wraps it
/// into a [`PipelineError`] that records the stage and file involved.
#[derive(Error, Debug)]
pub enum Error {
    // ==========================================================================
    // Conversion Errors
    // ==========================================================================
    /// The requested PDF/A and PDF/UA combination is not supported
    #[error("invalid PDF formats: {0}")]
    InvalidPdfFormats(String),

    /// The page ranges expression could not be parsed
    #[error("malformed page ranges '{0}'")]
    MalformedPageRanges(String),

    /// The converter failed for a reason unrelated to the request options
    #[error("conversion failed: {0}")]
    Conversion(String),

    // ==========================================================================
    // PDF Engine Errors
    // ==========================================================================
    /// Failed to merge PDF files
    #[error("merge failed: {0}")]
    Merge(String),

    /// Failed to convert a PDF to a PDF/A or PDF/UA variant
    #[error("PDF format conversion failed: {0}")]
    Normalize(String),

    /// Failed to write metadata into a PDF
    #[error("failed to write metadata: {0}")]
    Metadata(String),

    /// Error from the lopdf library
    #[error("lopdf error: {0}")]
    Lopdf(String),

    /// The engine does not implement the requested operation
    #[error("{engine} does not support {operation}")]
    Unsupported {
        engine: &'static str,
        operation: &'static str,
    },

    // ==========================================================================
    // Process Errors
    // ==========================================================================
    /// An external program exited unsuccessfully
    #[error("{program} exited with {}: {stderr}", exit_label(.code))]
    ProcessFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// An external program did not finish in time
    #[error("{program} timed out after {secs}s")]
    ProcessTimeout { program: String, secs: u64 },

    // ==========================================================================
    // Working Directory Errors
    // ==========================================================================
    /// Failed to give a file its final logical name
    #[error("failed to rename '{}' to '{name}': {reason}", .from.display())]
    Rename {
        from: PathBuf,
        name: String,
        reason: String,
    },

    // ==========================================================================
    // Request Errors
    // ==========================================================================
    /// The request failed validation before reaching the pipeline
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Failed to load configuration file
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Invalid configuration value
    #[error("invalid config value for '{field}': {reason}")]
    ConfigInvalid { field: String, reason: String },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[allow(clippy::ref_option)]
fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}"))
}

pub type Result<T> = std::result::Result<T, Error>;

/// The pipeline stage a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Convert,
    Merge,
    Normalize,
    Metadata,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Convert => "convert",
            Self::Merge => "merge PDFs",
            Self::Normalize => "convert PDF format",
            Self::Metadata => "write metadata",
        };
        f.write_str(label)
    }
}

/// A failure caused by the request's own option values.
///
/// The display text is safe to show to the client as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientInputError {
    #[error("A PDF format in '{formats}' is not supported")]
    UnsupportedPdfFormats { formats: PdfFormats },

    #[error("Malformed page ranges '{ranges}' (nativePageRanges)")]
    MalformedPageRanges { ranges: String },
}

/// Broad class of a pipeline failure, used by transports to pick a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request parameters are invalid for the converter
    ClientInput,
    /// Anything else: engine failures, I/O, naming
    Internal,
}

/// Error returned by [`crate::Pipeline`] runs.
///
/// Every variant aborts the whole request; there is never a partial result.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Bad PDF format combination or page ranges
    #[error("{error} ('{}')", .file.display())]
    ClientInput {
        file: PathBuf,
        error: ClientInputError,
    },

    /// A converter or PDF engine call failed
    #[error("{stage} '{}': {source}", .file.display())]
    Stage {
        stage: Stage,
        file: PathBuf,
        #[source]
        source: Error,
    },

    /// Renaming a finished output failed
    #[error("rename output path '{}': {source}", .file.display())]
    Naming {
        file: PathBuf,
        #[source]
        source: Error,
    },
}

impl PipelineError {
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::ClientInput { .. } => ErrorClass::ClientInput,
            Self::Stage { .. } | Self::Naming { .. } => ErrorClass::Internal,
        }
    }

    pub const fn is_client_error(&self) -> bool {
        matches!(self.class(), ErrorClass::ClientInput)
    }

    /// HTTP status a transport should answer with.
    pub const fn status_code(&self) -> u16 {
        match self.class() {
            ErrorClass::ClientInput => 400,
            ErrorClass::Internal => 500,
        }
    }

    /// Message a transport may show to the client.
    ///
    /// Internal failures never leak engine details.
    pub fn public_message(&self) -> String {
        match self {
            Self::ClientInput { error, .. } => error.to_string(),
            Self::Stage { .. } | Self::Naming { .. } => "Internal Server Error".to_string(),
        }
    }

    /// The stage that failed, if the failure happened in one.
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            Self::ClientInput { .. } => Some(Stage::Convert),
            Self::Naming { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_bad_request() {
        let err = PipelineError::ClientInput {
            file: PathBuf::from("/work/a.docx"),
            error: ClientInputError::MalformedPageRanges {
                ranges: "1-foo".to_string(),
            },
        };
        assert_eq!(err.class(), ErrorClass::ClientInput);
        assert_eq!(err.status_code(), 400);
        assert_eq!(
            err.public_message(),
            "Malformed page ranges '1-foo' (nativePageRanges)"
        );
    }

    #[test]
    fn test_unsupported_formats_message_echoes_combination() {
        let err = ClientInputError::UnsupportedPdfFormats {
            formats: PdfFormats::new(Some("PDF/A-4x".to_string()), true),
        };
        assert_eq!(
            err.to_string(),
            "A PDF format in '{PdfA:PDF/A-4x PdfUa:true}' is not supported"
        );
    }

    #[test]
    fn test_stage_failures_hide_details_from_clients() {
        let err = PipelineError::Stage {
            stage: Stage::Merge,
            file: PathBuf::from("/work/out.pdf"),
            source: Error::Merge("object stream corrupt".to_string()),
        };
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.public_message(), "Internal Server Error");
        assert!(err.to_string().contains("merge PDFs"));
        assert!(err.to_string().contains("object stream corrupt"));
        assert_eq!(err.stage(), Some(Stage::Merge));
    }

    #[test]
    fn test_naming_failure_is_internal() {
        let err = PipelineError::Naming {
            file: PathBuf::from("/work/x.pdf"),
            source: Error::Rename {
                from: PathBuf::from("/work/x.pdf"),
                name: "a.docx.pdf".to_string(),
                reason: "permission denied".to_string(),
            },
        };
        assert!(!err.is_client_error());
        assert_eq!(err.stage(), None);
        assert!(err.to_string().contains("a.docx.pdf"));
    }

    #[test]
    fn test_process_failed_display() {
        let err = Error::ProcessFailed {
            program: "soffice".to_string(),
            code: Some(81),
            stderr: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "soffice exited with code 81: boom");

        let err = Error::ProcessFailed {
            program: "soffice".to_string(),
            code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("a signal"));
    }
}
