//! Validated conversion requests and the option bundles derived from them.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Requested PDF conformance levels.
///
/// Both unset is the zero value and means "no PDF format conversion".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PdfFormats {
    /// Archival variant, e.g. "PDF/A-2b"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdfa: Option<String>,

    /// Universal accessibility (PDF/UA)
    #[serde(default)]
    pub pdfua: bool,
}

impl PdfFormats {
    pub fn new(pdfa: Option<String>, pdfua: bool) -> Self {
        Self {
            pdfa: pdfa.filter(|v| !v.trim().is_empty()),
            pdfua,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.pdfa.is_none() && !self.pdfua
    }
}

impl fmt::Display for PdfFormats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{PdfA:{} PdfUa:{}}}",
            self.pdfa.as_deref().unwrap_or_default(),
            self.pdfua
        )
    }
}

/// Metadata entries to stamp into every output PDF.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(pub Map<String, Value>);

impl Metadata {
    /// Parse a JSON object. An empty string yields an empty mapping.
    pub fn from_json(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str::<Map<String, Value>>(raw)
            .map(Self)
            .map_err(|e| Error::InvalidRequest(format!("unmarshal metadata: {e}")))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }
}

impl FromIterator<(String, Value)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Options handed to the converter for every input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOptions {
    /// Advisory: converters without an orientation switch ignore it
    pub landscape: bool,
    pub page_ranges: String,
    pub export_form_fields: bool,
    pub single_page_sheets: bool,
    /// Set only when the converter itself must produce PDF/A or PDF/UA
    pub pdf_formats: Option<PdfFormats>,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            landscape: false,
            page_ranges: String::new(),
            export_form_fields: true,
            single_page_sheets: false,
            pdf_formats: None,
        }
    }
}

/// Where PDF format conversion happens for a request.
///
/// Decided once when the request is built; the pipeline never re-derives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatStrategy {
    /// No PDF/A or PDF/UA requested
    None,
    /// The converter produces the formats while converting each input
    Native(PdfFormats),
    /// The PDF engine converts every output after the merge stage
    PostProcess(PdfFormats),
}

impl FormatStrategy {
    pub fn decide(formats: &PdfFormats, native: bool) -> Self {
        if formats.is_empty() {
            Self::None
        } else if native {
            Self::Native(formats.clone())
        } else {
            Self::PostProcess(formats.clone())
        }
    }

    pub const fn native_formats(&self) -> Option<&PdfFormats> {
        match self {
            Self::Native(formats) => Some(formats),
            Self::None | Self::PostProcess(_) => None,
        }
    }

    pub const fn post_process_formats(&self) -> Option<&PdfFormats> {
        match self {
            Self::PostProcess(formats) => Some(formats),
            Self::None | Self::Native(_) => None,
        }
    }
}

/// A validated batch conversion request.
///
/// Construct through [`ConversionRequest::builder`]; `inputs` is never empty.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    inputs: Vec<PathBuf>,
    options: ConversionOptions,
    pdf_formats: PdfFormats,
    strategy: FormatStrategy,
    merge: bool,
    metadata: Metadata,
}

impl ConversionRequest {
    pub fn builder<I, P>(inputs: I) -> ConversionRequestBuilder
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        ConversionRequestBuilder {
            inputs: inputs.into_iter().map(Into::into).collect(),
            landscape: false,
            page_ranges: String::new(),
            export_form_fields: true,
            single_page_sheets: false,
            pdfa: None,
            pdfua: false,
            native_pdf_formats: true,
            merge: false,
            metadata: Metadata::default(),
            allowed_extensions: None,
        }
    }

    /// A request for the DOCX pipeline, which only looks at the inputs.
    pub fn docx<I, P>(inputs: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::builder(inputs).build()
    }

    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    /// Options for the per-file conversion stage.
    pub const fn options(&self) -> &ConversionOptions {
        &self.options
    }

    /// The requested formats, whichever stage ends up applying them.
    pub const fn pdf_formats(&self) -> &PdfFormats {
        &self.pdf_formats
    }

    pub const fn strategy(&self) -> &FormatStrategy {
        &self.strategy
    }

    pub const fn merge(&self) -> bool {
        self.merge
    }

    pub const fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

/// Builder for [`ConversionRequest`], defaulting every field like the
/// LibreOffice form route does.
#[derive(Debug, Clone)]
pub struct ConversionRequestBuilder {
    inputs: Vec<PathBuf>,
    landscape: bool,
    page_ranges: String,
    export_form_fields: bool,
    single_page_sheets: bool,
    pdfa: Option<String>,
    pdfua: bool,
    native_pdf_formats: bool,
    merge: bool,
    metadata: Metadata,
    allowed_extensions: Option<Vec<String>>,
}

impl ConversionRequestBuilder {
    pub fn landscape(mut self, v: bool) -> Self {
        self.landscape = v;
        self
    }

    pub fn page_ranges(mut self, ranges: impl Into<String>) -> Self {
        self.page_ranges = ranges.into();
        self
    }

    pub fn export_form_fields(mut self, v: bool) -> Self {
        self.export_form_fields = v;
        self
    }

    pub fn single_page_sheets(mut self, v: bool) -> Self {
        self.single_page_sheets = v;
        self
    }

    pub fn pdfa(mut self, pdfa: impl Into<String>) -> Self {
        self.pdfa = Some(pdfa.into());
        self
    }

    pub fn pdfua(mut self, v: bool) -> Self {
        self.pdfua = v;
        self
    }

    pub fn native_pdf_formats(mut self, v: bool) -> Self {
        self.native_pdf_formats = v;
        self
    }

    pub fn merge(mut self, v: bool) -> Self {
        self.merge = v;
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Reject inputs whose extension is not in `extensions` (case-insensitive,
    /// with or without the leading dot).
    pub fn allowed_extensions(mut self, extensions: &[&str]) -> Self {
        self.allowed_extensions = Some(
            extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        );
        self
    }

    /// Validate and freeze the request.
    pub fn build(self) -> Result<ConversionRequest> {
        if self.inputs.is_empty() {
            return Err(Error::InvalidRequest(
                "at least one input file is required".into(),
            ));
        }

        if let Some(allowed) = &self.allowed_extensions {
            for input in &self.inputs {
                if !has_allowed_extension(input, allowed) {
                    return Err(Error::InvalidRequest(format!(
                        "file '{}' has an unsupported extension",
                        input.display()
                    )));
                }
            }
        }

        // Batch outputs are named after the input file name
        let mut names = HashSet::with_capacity(self.inputs.len());
        for input in &self.inputs {
            let name = input.file_name().unwrap_or(input.as_os_str());
            if !names.insert(name) {
                return Err(Error::InvalidRequest(format!(
                    "duplicate input file name '{}'",
                    name.to_string_lossy()
                )));
            }
        }

        let pdf_formats = PdfFormats::new(self.pdfa, self.pdfua);
        let strategy = FormatStrategy::decide(&pdf_formats, self.native_pdf_formats);

        let options = ConversionOptions {
            landscape: self.landscape,
            page_ranges: self.page_ranges,
            export_form_fields: self.export_form_fields,
            single_page_sheets: self.single_page_sheets,
            pdf_formats: strategy.native_formats().cloned(),
        };

        Ok(ConversionRequest {
            inputs: self.inputs,
            options,
            pdf_formats,
            strategy,
            merge: self.merge,
            metadata: self.metadata,
        })
    }
}

fn has_allowed_extension(path: &Path, allowed: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
}
