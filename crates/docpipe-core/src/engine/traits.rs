use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;
use crate::request::{ConversionOptions, Metadata, PdfFormats};

/// Trait for document conversion backends (e.g. LibreOffice)
#[async_trait]
pub trait Converter: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &'static str;

    /// File extensions this converter accepts, without the leading dot
    fn extensions(&self) -> &[&'static str];

    /// Convert `input` to a PDF written at `output`.
    ///
    /// Options a backend cannot honor are skipped with a warning rather than
    /// failing the conversion; [`crate::LibreOffice`] ignores `landscape`.
    ///
    /// Fails with [`crate::Error::InvalidPdfFormats`] or
    /// [`crate::Error::MalformedPageRanges`] when the options are at fault.
    async fn pdf(&self, input: &Path, output: &Path, options: &ConversionOptions) -> Result<()>;

    /// Convert `input` to a DOCX document written at `output`.
    async fn docx(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Trait for PDF manipulation backends
#[async_trait]
pub trait PdfEngine: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &'static str;

    /// Merge `inputs`, in order, into a single PDF at `output`.
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;

    /// Convert `input` into the requested PDF/A and/or PDF/UA variant.
    async fn convert(&self, formats: &PdfFormats, input: &Path, output: &Path) -> Result<()>;

    /// Write (and overwrite) metadata entries of the PDF at `path`, in place.
    async fn write_metadata(&self, metadata: &Metadata, path: &Path) -> Result<()>;
}

/// Issues output paths for one request.
///
/// Implementations must never hand out the same path twice, even across
/// concurrent requests.
pub trait PathAllocator: Send + Sync {
    /// A fresh path ending in `extension` (".pdf" and "pdf" are equivalent).
    fn generate_path(&self, extension: &str) -> PathBuf;

    /// Give `from` the logical file name `name` and return its new path.
    fn rename(&self, from: &Path, name: &str) -> Result<PathBuf>;
}
