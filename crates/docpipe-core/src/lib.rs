//! docpipe core library
//!
//! Coordinates batch document conversion:
//! - Per-file conversion to PDF or DOCX through a [`Converter`]
//! - Optional merge, PDF/A / PDF/UA conversion and metadata through a [`PdfEngine`]
//! - Deterministic naming of multi-file results
//! - Typed failures a transport can map to client or server errors
//!
//! Default collaborators are included: LibreOffice (`soffice`) for
//! conversion, lopdf for PDF manipulation and a temporary [`WorkDir`] for
//! request-scoped paths.

pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod request;
pub mod util;

pub use config::{AppConfig, LibreOfficeConfig};
pub use engine::{
    Converter, LibreOffice, LopdfEngine, PathAllocator, PdfEngine, WorkDir, create_engines,
};
pub use error::{ClientInputError, Error, ErrorClass, PipelineError, Result, Stage};
pub use pipeline::{Pipeline, StageOutputs};
pub use request::{
    ConversionOptions, ConversionRequest, ConversionRequestBuilder, FormatStrategy, Metadata,
    PdfFormats,
};
