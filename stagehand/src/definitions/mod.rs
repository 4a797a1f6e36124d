//! Stage definitions: loading them from disk and resolving a pipeline.

mod frontmatter;

pub use frontmatter::parse_stage;

use crate::core::Stage;
use crate::errors::{DefinitionError, MissingStageError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Loaded stages keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageSet {
    stages: BTreeMap<String, Stage>,
}

impl StageSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stage, replacing any stage with the same name.
    pub fn insert(&mut self, stage: Stage) -> Option<Stage> {
        self.stages.insert(stage.name.clone(), stage)
    }

    /// Adds a stage, builder style.
    #[must_use]
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.insert(stage);
        self
    }

    /// Looks a stage up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Stage> {
        self.stages.get(name)
    }

    /// Stage names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(String::as_str)
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if no stage is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Resolves `order` into stages, failing on the first unknown name.
    pub fn resolve<S: AsRef<str>>(&self, order: &[S]) -> Result<Vec<Stage>, MissingStageError> {
        order
            .iter()
            .enumerate()
            .map(|(index, name)| {
                self.get(name.as_ref())
                    .cloned()
                    .ok_or_else(|| MissingStageError::new(name.as_ref(), index))
            })
            .collect()
    }
}

impl FromIterator<Stage> for StageSet {
    fn from_iter<I: IntoIterator<Item = Stage>>(iter: I) -> Self {
        let mut set = Self::new();
        for stage in iter {
            set.insert(stage);
        }
        set
    }
}

/// Reads one stage file.
pub fn load_stage_file(path: &Path) -> Result<Stage, DefinitionError> {
    let text = std::fs::read_to_string(path).map_err(|source| DefinitionError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_stage(&text, path)
}

/// Reads every `*.md` file of `dir` in file-name order.
///
/// Later files win when two define the same name.
pub fn load_stage_set(dir: impl AsRef<Path>) -> Result<StageSet, DefinitionError> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(DefinitionError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|source| DefinitionError::Read {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "md"))
        .collect();
    paths.sort();

    let mut set = StageSet::new();
    for path in &paths {
        let stage = load_stage_file(path)?;
        debug!(stage = %stage.name, path = %path.display(), invocation = %stage.invocation, "Loaded stage definition");
        set.insert(stage);
    }

    if set.is_empty() {
        return Err(DefinitionError::Empty {
            path: dir.to_path_buf(),
        });
    }
    info!(count = set.len(), dir = %dir.display(), "Loaded stage definitions");
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::InvocationStrategy;
    use tempfile::TempDir;

    fn write(dir: &TempDir, file: &str, text: &str) {
        std::fs::write(dir.path().join(file), text).unwrap();
    }

    #[test]
    fn test_load_sorted_and_skip_other_files() {
        let dir = TempDir::new().unwrap();
        write(&dir, "b.md", "---\nname: shared\ncli_command: second\n---\n");
        write(&dir, "a.md", "---\nname: shared\ncli_command: first\n---\n");
        write(&dir, "coder.md", "---\ncli_command: cat\ninvocation: positional\n---\n");
        write(&dir, "notes.txt", "not a stage");

        let set = load_stage_set(dir.path()).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.get("shared").unwrap().command, "second");
        assert_eq!(set.get("coder").unwrap().invocation, InvocationStrategy::PositionalArgument);
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["coder", "shared"]);
    }

    #[test]
    fn test_missing_and_empty_dirs() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(load_stage_set(dir.path()), Err(DefinitionError::Empty { .. })));
        assert!(matches!(
            load_stage_set(dir.path().join("nope")),
            Err(DefinitionError::DirectoryNotFound { .. })
        ));
    }

    #[test]
    fn test_bad_file_fails_whole_load() {
        let dir = TempDir::new().unwrap();
        write(&dir, "ok.md", "---\ncli_command: cat\n---\n");
        write(&dir, "broken.md", "plain markdown");

        assert!(matches!(load_stage_set(dir.path()), Err(DefinitionError::MissingFrontmatter { .. })));
    }

    #[test]
    fn test_resolve_reports_first_missing() {
        let set: StageSet = [Stage::new("a", "cat"), Stage::new("c", "cat")].into_iter().collect();

        assert_eq!(set.resolve(&["a", "c"]).unwrap().len(), 2);

        let err = set.resolve(&["a", "b", "c"]).unwrap_err();
        assert_eq!(err.stage, "b");
        assert_eq!(err.index, 1);
    }
}
