//! Collaborators of the pipeline: the traits it drives and the default
//! implementations shipped with the crate.

mod libreoffice;
mod lopdf_engine;
pub mod page_ranges;
mod traits;
mod workdir;

pub use libreoffice::{EXTENSIONS as LIBREOFFICE_EXTENSIONS, LibreOffice};
pub use lopdf_engine::LopdfEngine;
pub use traits::{Converter, PathAllocator, PdfEngine};
pub use workdir::WorkDir;

use std::sync::Arc;

use crate::config::LibreOfficeConfig;

/// Build the default converter and PDF engine pair from configuration.
///
/// The LibreOffice converter doubles as the PDF/A and PDF/UA normalizer of
/// the lopdf engine.
pub fn create_engines(config: &LibreOfficeConfig) -> (Arc<dyn Converter>, Arc<dyn PdfEngine>) {
    let converter: Arc<dyn Converter> = Arc::new(LibreOffice::from_config(config));
    let engine: Arc<dyn PdfEngine> = Arc::new(LopdfEngine::with_normalizer(Arc::clone(&converter)));
    (converter, engine)
}
