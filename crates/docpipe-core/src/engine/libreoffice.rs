use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::process::Command;
use tracing::{debug, warn};

use super::page_ranges;
use super::traits::Converter;
use crate::config::LibreOfficeConfig;
use crate::error::{Error, Result};
use crate::request::{ConversionOptions, PdfFormats};

/// Document extensions LibreOffice can open
pub const EXTENSIONS: &[&str] = &[
    "123", "602", "abw", "bib", "bmp", "cdr", "cgm", "cmx", "csv", "cwk", "dbf", "dif", "doc",
    "docm", "docx", "dot", "dotm", "dotx", "dxf", "emf", "eps", "epub", "fodg", "fodp", "fods",
    "fodt", "fopd", "gif", "htm", "html", "hwp", "jpeg", "jpg", "key", "ltx", "lwp", "mcw", "met",
    "mml", "mw", "numbers", "odd", "odg", "odm", "odp", "ods", "odt", "otg", "oth", "otp", "ots",
    "ott", "pages", "pbm", "pcd", "pct", "pcx", "pdb", "pgm", "png", "pot", "potm", "potx", "ppm",
    "pps", "ppt", "pptm", "pptx", "psd", "psw", "pub", "pwp", "pxl", "ras", "rtf", "sda", "sdc",
    "sdd", "sdp", "sdw", "sgl", "slk", "smf", "stc", "std", "sti", "stw", "svg", "svm", "swf",
    "sxc", "sxd", "sxg", "sxi", "sxm", "sxw", "tga", "tif", "tiff", "txt", "uof", "uop", "uos",
    "uot", "vdx", "vor", "vsd", "vsdm", "vsdx", "wb2", "wk1", "wks", "wmf", "wpd", "wpg", "wps",
    "xbm", "xhtml", "xls", "xlsb", "xlsm", "xlsx", "xlt", "xltm", "xltx", "xlw", "xml", "xpm",
    "zabw",
];

const SPREADSHEETS: &[&str] = &[
    "123", "csv", "dbf", "dif", "fods", "numbers", "ods", "ots", "pxl", "sdc", "slk", "stc",
    "sxc", "uos", "wb2", "wk1", "wks", "xls", "xlsb", "xlsm", "xlsx", "xlt", "xltm", "xltx",
    "xlw",
];

const PRESENTATIONS: &[&str] = &[
    "fodp", "key", "odp", "otp", "pot", "potm", "potx", "pps", "ppt", "pptm", "pptx", "sda",
    "sdd", "sdp", "sti", "sxi", "uop",
];

const DRAWINGS: &[&str] = &[
    "cdr", "fodg", "odg", "otg", "pdf", "std", "sxd", "vdx", "vsd", "vsdm", "vsdx",
];

/// Converter backed by the `soffice` command line.
///
/// Each call runs in its own scratch directory with a private user profile,
/// so several conversions may run at once.
///
/// `soffice --convert-to` has no orientation switch: `landscape` is logged
/// and otherwise ignored.
pub struct LibreOffice {
    binary: PathBuf,
    timeout: Duration,
}

impl LibreOffice {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn from_config(config: &LibreOfficeConfig) -> Self {
        Self::new(config.binary.clone(), Duration::from_secs(config.timeout_secs))
    }

    fn program(&self) -> String {
        self.binary.display().to_string()
    }

    /// Run `soffice --convert-to <filter>` and move the result to `output`.
    async fn run(&self, input: &Path, output: &Path, filter: &str) -> Result<()> {
        let parent = output.parent().unwrap_or_else(|| Path::new("."));
        let scratch = tempfile::Builder::new()
            .prefix(".soffice-")
            .tempdir_in(parent)?;
        let profile = std::path::absolute(scratch.path().join("profile"))?;
        let outdir = scratch.path().join("out");
        tokio::fs::create_dir_all(&outdir).await?;

        let mut command = Command::new(&self.binary);
        command
            .arg(format!("-env:UserInstallation=file://{}", profile.display()))
            .args(["--headless", "--invisible", "--nocrashreport", "--nodefault"])
            .args(["--nologo", "--nofirststartwizard", "--norestore"])
            .arg("--convert-to")
            .arg(filter)
            .arg("--outdir")
            .arg(&outdir)
            .arg(input)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!("Running {} --convert-to {} {}", self.program(), filter, input.display());

        let result = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| Error::ProcessTimeout {
                program: self.program(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| Error::Conversion(format!("failed to execute {}: {e}", self.program())))?;

        if !result.status.success() {
            return Err(Error::ProcessFailed {
                program: self.program(),
                code: result.status.code(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        // soffice may exit 0 without writing anything
        let produced = first_file(&outdir).await?.ok_or_else(|| {
            Error::Conversion(format!(
                "{} produced no output for '{}': {}",
                self.program(),
                input.display(),
                String::from_utf8_lossy(&result.stderr).trim()
            ))
        })?;

        tokio::fs::rename(&produced, output).await?;
        Ok(())
    }
}

#[async_trait]
impl Converter for LibreOffice {
    fn name(&self) -> &'static str {
        "libreoffice"
    }

    fn extensions(&self) -> &[&'static str] {
        EXTENSIONS
    }

    async fn pdf(&self, input: &Path, output: &Path, options: &ConversionOptions) -> Result<()> {
        page_ranges::validate(&options.page_ranges)?;

        if options.landscape {
            warn!(
                "Landscape orientation is not available through soffice; converting '{}' as-is",
                input.display()
            );
        }

        let filter = pdf_filter(input, options)?;
        self.run(input, output, &filter).await
    }

    async fn docx(&self, input: &Path, output: &Path) -> Result<()> {
        self.run(input, output, "docx:MS Word 2007 XML").await
    }
}

/// Build the `pdf:<export filter>:<json options>` argument.
fn pdf_filter(input: &Path, options: &ConversionOptions) -> Result<String> {
    let mut props = Map::new();
    props.insert("ExportFormFields".into(), typed("boolean", options.export_form_fields));
    props.insert("SinglePageSheets".into(), typed("boolean", options.single_page_sheets));

    if !options.page_ranges.trim().is_empty() {
        props.insert("PageRange".into(), typed("string", options.page_ranges.trim()));
    }

    if let Some(formats) = &options.pdf_formats {
        if let Some(version) = select_pdf_version(formats)? {
            props.insert("SelectPdfVersion".into(), typed("long", version));
        }
        if formats.pdfua {
            props.insert("PDFUACompliance".into(), typed("boolean", true));
            props.insert("UseTaggedPDF".into(), typed("boolean", true));
        }
    }

    Ok(format!("pdf:{}:{}", export_filter(input), Value::Object(props)))
}

fn typed(kind: &str, value: impl ToString) -> Value {
    json!({ "type": kind, "value": value.to_string() })
}

/// Map the PDF/A variant to LibreOffice's `SelectPdfVersion` value.
fn select_pdf_version(formats: &PdfFormats) -> Result<Option<u8>> {
    let version = match formats.pdfa.as_deref() {
        None => return Ok(None),
        Some("PDF/A-1b") => 1,
        Some("PDF/A-2b") => 2,
        Some("PDF/A-3b") => 3,
        Some(other) => {
            return Err(Error::InvalidPdfFormats(format!(
                "unsupported PDF/A variant '{other}'"
            )));
        }
    };

    // PDF/A-1 predates the tagging PDF/UA relies on
    if version == 1 && formats.pdfua {
        return Err(Error::InvalidPdfFormats(
            "PDF/A-1b cannot be combined with PDF/UA".to_string(),
        ));
    }

    Ok(Some(version))
}

fn export_filter(input: &Path) -> &'static str {
    let ext = input
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if SPREADSHEETS.contains(&ext.as_str()) {
        "calc_pdf_Export"
    } else if PRESENTATIONS.contains(&ext.as_str()) {
        "impress_pdf_Export"
    } else if DRAWINGS.contains(&ext.as_str()) {
        "draw_pdf_Export"
    } else {
        "writer_pdf_Export"
    }
}

async fn first_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}
