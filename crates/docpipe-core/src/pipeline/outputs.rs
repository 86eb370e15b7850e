use std::path::PathBuf;

/// The ordered output files as of the last completed stage.
///
/// A value is never modified once built. Each stage produces a fresh
/// `StageOutputs` and the pipeline rebinds it at the stage boundary, so the
/// arity change made by merging is always a wholesale replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutputs(Vec<PathBuf>);

impl StageOutputs {
    pub const fn new(paths: Vec<PathBuf>) -> Self {
        Self(paths)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathBuf> {
        self.0.iter()
    }

    pub fn into_paths(self) -> Vec<PathBuf> {
        self.0
    }
}

impl<'a> IntoIterator for &'a StageOutputs {
    type Item = &'a PathBuf;
    type IntoIter = std::slice::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<PathBuf> for StageOutputs {
    fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
