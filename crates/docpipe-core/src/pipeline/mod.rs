//! The conversion pipeline coordinator.
//!
//! ```text
//! inputs ──▶ convert ──▶ merge? ──▶ PDF format? ──▶ metadata? ──▶ naming
//!            (each)      (all→1)    (each)          (each)        (>1 only)
//! ```
//!
//! Stages run strictly in this order and strictly one after another; within
//! a stage, files are processed sequentially and the first failure aborts the
//! request. There are no retries, timeouts or partial results at this layer.

mod naming;
mod outputs;

pub use naming::{DOCX_SUFFIX, PDF_SUFFIX, logical_name, rename_outputs};
pub use outputs::StageOutputs;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::engine::{Converter, PathAllocator, PdfEngine, create_engines};
use crate::error::{ClientInputError, Error, PipelineError, Stage};
use crate::request::{ConversionRequest, Metadata, PdfFormats};

/// Drives a [`Converter`] and a [`PdfEngine`] through the stages of a request.
///
/// Holds no per-request state, so one instance can serve concurrent requests
/// as long as each brings its own [`PathAllocator`].
#[derive(Clone)]
pub struct Pipeline {
    converter: Arc<dyn Converter>,
    engine: Arc<dyn PdfEngine>,
}

impl Pipeline {
    pub fn new(converter: Arc<dyn Converter>, engine: Arc<dyn PdfEngine>) -> Self {
        Self { converter, engine }
    }

    /// Pipeline backed by LibreOffice and lopdf as configured.
    pub fn from_config(config: &AppConfig) -> Self {
        let (converter, engine) = create_engines(&config.libreoffice);
        Self::new(converter, engine)
    }

    pub fn converter(&self) -> &dyn Converter {
        self.converter.as_ref()
    }

    pub fn engine(&self) -> &dyn PdfEngine {
        self.engine.as_ref()
    }

    /// Convert every input to PDF, then merge, convert PDF formats and write
    /// metadata as the request asks, and name the results.
    pub async fn run_pdf(
        &self,
        request: &ConversionRequest,
        paths: &dyn PathAllocator,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        info!(
            "Starting PDF pipeline: {} input(s) with {}, merge={}, formats={:?}",
            request.inputs().len(),
            self.converter.name(),
            request.merge(),
            request.strategy()
        );

        // ── Stage 1: convert each input ──────────────────────────────────────
        let outputs = self.convert_to_pdf(request, paths).await?;

        // ── Stage 2: merge (never for a single file) ─────────────────────────
        let outputs = if outputs.len() > 1 && request.merge() {
            self.merge(&outputs, paths).await?
        } else {
            outputs
        };

        // ── Stage 3: PDF/A and PDF/UA, unless the converter already did it ───
        let outputs = match request.strategy().post_process_formats() {
            Some(formats) => self.normalize(&outputs, formats, paths).await?,
            None => outputs,
        };

        // ── Stage 4: metadata, last so no later stage rewrites it ────────────
        let outputs = if request.metadata().is_empty() {
            outputs
        } else {
            self.write_metadata(outputs, request.metadata()).await?
        };

        // ── Stage 5: naming ──────────────────────────────────────────────────
        let outputs = if outputs.len() > 1 {
            rename_outputs(&outputs, request.inputs(), PDF_SUFFIX, paths)?
        } else {
            outputs
        };

        info!("PDF pipeline complete: {} output(s)", outputs.len());
        Ok(outputs.into_paths())
    }

    /// Convert every input to DOCX and name the results.
    ///
    /// Any converter failure is reported as a generic conversion failure.
    pub async fn run_docx(
        &self,
        request: &ConversionRequest,
        paths: &dyn PathAllocator,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        info!(
            "Starting DOCX pipeline: {} input(s) with {}",
            request.inputs().len(),
            self.converter.name()
        );

        let mut converted = Vec::with_capacity(request.inputs().len());
        for input in request.inputs() {
            let output = paths.generate_path(DOCX_SUFFIX);
            debug!("Converting {} to DOCX", input.display());

            self.converter
                .docx(input, &output)
                .await
                .map_err(|source| stage_failure(Stage::Convert, input, source))?;
            converted.push(output);
        }
        let outputs = StageOutputs::new(converted);

        let outputs = if outputs.len() > 1 {
            rename_outputs(&outputs, request.inputs(), DOCX_SUFFIX, paths)?
        } else {
            outputs
        };

        info!("DOCX pipeline complete: {} output(s)", outputs.len());
        Ok(outputs.into_paths())
    }

    async fn convert_to_pdf(
        &self,
        request: &ConversionRequest,
        paths: &dyn PathAllocator,
    ) -> Result<StageOutputs, PipelineError> {
        let options = request.options();
        let mut converted = Vec::with_capacity(request.inputs().len());

        for input in request.inputs() {
            let output = paths.generate_path(PDF_SUFFIX);
            debug!("Converting {} to PDF", input.display());

            self.converter
                .pdf(input, &output, options)
                .await
                .map_err(|err| classify_conversion_error(err, input, request))?;
            converted.push(output);
        }

        Ok(StageOutputs::new(converted))
    }

    async fn merge(
        &self,
        outputs: &StageOutputs,
        paths: &dyn PathAllocator,
    ) -> Result<StageOutputs, PipelineError> {
        let merged = paths.generate_path(PDF_SUFFIX);
        debug!("Merging {} PDFs with {}", outputs.len(), self.engine.name());

        self.engine
            .merge(outputs.paths(), &merged)
            .await
            .map_err(|source| stage_failure(Stage::Merge, &merged, source))?;

        Ok(StageOutputs::new(vec![merged]))
    }

    async fn normalize(
        &self,
        outputs: &StageOutputs,
        formats: &PdfFormats,
        paths: &dyn PathAllocator,
    ) -> Result<StageOutputs, PipelineError> {
        let mut normalized = Vec::with_capacity(outputs.len());

        for input in outputs {
            let output = paths.generate_path(PDF_SUFFIX);
            debug!("Converting {} to {}", input.display(), formats);

            self.engine
                .convert(formats, input, &output)
                .await
                .map_err(|source| stage_failure(Stage::Normalize, input, source))?;
            normalized.push(output);
        }

        Ok(StageOutputs::new(normalized))
    }

    /// Metadata is written in place, so the same paths come back.
    async fn write_metadata(
        &self,
        outputs: StageOutputs,
        metadata: &Metadata,
    ) -> Result<StageOutputs, PipelineError> {
        for path in &outputs {
            debug!("Writing {} metadata entries to {}", metadata.len(), path.display());

            self.engine
                .write_metadata(metadata, path)
                .await
                .map_err(|source| stage_failure(Stage::Metadata, path, source))?;
        }

        Ok(outputs)
    }
}

fn stage_failure(stage: Stage, file: &Path, source: Error) -> PipelineError {
    warn!("Failed to {} '{}': {}", stage, file.display(), source);
    PipelineError::Stage {
        stage,
        file: file.to_path_buf(),
        source,
    }
}

/// Separate the converter's client-attributable failures from the rest.
fn classify_conversion_error(
    err: Error,
    input: &Path,
    request: &ConversionRequest,
) -> PipelineError {
    let error = if matches!(err, Error::InvalidPdfFormats(_)) {
        ClientInputError::UnsupportedPdfFormats {
            formats: request.pdf_formats().clone(),
        }
    } else if matches!(err, Error::MalformedPageRanges(_)) {
        ClientInputError::MalformedPageRanges {
            ranges: request.options().page_ranges.clone(),
        }
    } else {
        return stage_failure(Stage::Convert, input, err);
    };

    debug!("Rejected '{}': {}", input.display(), err);
    PipelineError::ClientInput {
        file: input.to_path_buf(),
        error,
    }
}
