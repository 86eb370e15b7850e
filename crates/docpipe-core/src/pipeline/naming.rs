//! Naming of multi-file results.
//!
//! Batch responses are delivered as an archive, so every entry must map back
//! to its source: `document.docx` becomes `document.docx.pdf`.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::outputs::StageOutputs;
use crate::engine::PathAllocator;
use crate::error::{Error, PipelineError};

/// Suffix appended to input names by the PDF pipeline
pub const PDF_SUFFIX: &str = "pdf";
/// Suffix appended to input names by the DOCX pipeline
pub const DOCX_SUFFIX: &str = "docx";

/// Logical name of the output produced from `input`.
pub fn logical_name(input: &Path, suffix: &str) -> String {
    let base = input
        .file_name()
        .map_or_else(|| input.to_string_lossy(), |name| name.to_string_lossy());
    format!("{base}.{suffix}")
}

/// Rename every output after the input at the same position.
///
/// Order is preserved. The first failed rename aborts the whole operation and
/// no renamed set is returned.
pub fn rename_outputs(
    outputs: &StageOutputs,
    inputs: &[PathBuf],
    suffix: &str,
    paths: &dyn PathAllocator,
) -> Result<StageOutputs, PipelineError> {
    if outputs.len() != inputs.len() {
        let file = outputs.paths().first().cloned().unwrap_or_default();
        return Err(PipelineError::Naming {
            file: file.clone(),
            source: Error::Rename {
                from: file,
                name: format!("*.{suffix}"),
                reason: format!("{} outputs for {} inputs", outputs.len(), inputs.len()),
            },
        });
    }

    let mut renamed = Vec::with_capacity(outputs.len());
    for (output, input) in outputs.iter().zip(inputs) {
        let name = logical_name(input, suffix);
        let path = paths
            .rename(output, &name)
            .map_err(|source| PipelineError::Naming {
                file: output.clone(),
                source,
            })?;
        debug!("Named {} as {}", output.display(), name);
        renamed.push(path);
    }

    Ok(StageOutputs::new(renamed))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::Result;
    use std::sync::Mutex;

    /// Records renames without touching the filesystem.
    #[derive(Default)]
    struct FakePaths {
        renames: Mutex<Vec<(PathBuf, String)>>,
        fail_on: Option<String>,
    }

    impl PathAllocator for FakePaths {
        fn generate_path(&self, extension: &str) -> PathBuf {
            PathBuf::from(format!("/work/generated.{extension}"))
        }

        fn rename(&self, from: &Path, name: &str) -> Result<PathBuf> {
            if self.fail_on.as_deref() == Some(name) {
                return Err(Error::Rename {
                    from: from.to_path_buf(),
                    name: name.to_string(),
                    reason: "disk full".to_string(),
                });
            }
            self.renames
                .lock()
                .unwrap()
                .push((from.to_path_buf(), name.to_string()));
            Ok(Path::new("/work").join(name))
        }
    }

    fn outputs(names: &[&str]) -> StageOutputs {
        names.iter().map(|n| PathBuf::from(format!("/work/{n}"))).collect()
    }

    #[test]
    fn test_logical_name_appends_suffix() {
        assert_eq!(logical_name(Path::new("/up/document.docx"), "pdf"), "document.docx.pdf");
        assert_eq!(logical_name(Path::new("notes"), "docx"), "notes.docx");
    }

    #[test]
    fn test_rename_preserves_order() {
        let paths = FakePaths::default();
        let inputs = vec![PathBuf::from("/up/a.docx"), PathBuf::from("/up/b.xlsx")];

        let renamed =
            rename_outputs(&outputs(&["1.pdf", "2.pdf"]), &inputs, PDF_SUFFIX, &paths).unwrap();

        assert_eq!(
            renamed.paths(),
            &[PathBuf::from("/work/a.docx.pdf"), PathBuf::from("/work/b.xlsx.pdf")]
        );
        let renames = paths.renames.lock().unwrap();
        assert_eq!(renames[0], (PathBuf::from("/work/1.pdf"), "a.docx.pdf".to_string()));
        assert_eq!(renames[1], (PathBuf::from("/work/2.pdf"), "b.xlsx.pdf".to_string()));
    }

    #[test]
    fn test_rename_failure_aborts() {
        let paths = FakePaths {
            fail_on: Some("b.docx.docx".to_string()),
            ..Default::default()
        };
        let inputs = vec![
            PathBuf::from("a.docx"),
            PathBuf::from("b.docx"),
            PathBuf::from("c.docx"),
        ];

        let err = rename_outputs(
            &outputs(&["1.docx", "2.docx", "3.docx"]),
            &inputs,
            DOCX_SUFFIX,
            &paths,
        )
        .unwrap_err();

        match err {
            PipelineError::Naming { file, .. } => assert_eq!(file, PathBuf::from("/work/2.docx")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(paths.renames.lock().unwrap().len(), 1, "third file must not be renamed");
    }

    #[test]
    fn test_length_mismatch_is_naming_failure() {
        let paths = FakePaths::default();
        let err = rename_outputs(
            &outputs(&["merged.pdf"]),
            &[PathBuf::from("a.docx"), PathBuf::from("b.docx")],
            PDF_SUFFIX,
            &paths,
        )
        .unwrap_err();

        assert!(matches!(err, PipelineError::Naming { .. }));
        assert!(paths.renames.lock().unwrap().is_empty());
    }
}
