//! Base-directory scanning via the `ignore` crate

use std::path::{Component, Path, PathBuf};

use color_eyre::Result;
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;

use crate::config::CONFIG_FILENAME;
use crate::index::INDEX_FILENAME;

/// Scanner for a sync base directory
///
/// Walks recursively, returning relative filenames with forward slashes.
/// The reserved index and config files are never reported.
pub struct Scanner {
    root: PathBuf,
    /// Glob patterns excluded from the walk
    ignores: Vec<String>,
}

impl Scanner {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ignores: Vec::new(),
        }
    }

    /// Add an ignore pattern (gitignore-style glob)
    #[must_use]
    pub fn ignore(mut self, pattern: impl Into<String>) -> Self {
        self.ignores.push(pattern.into());
        self
    }

    fn walk_builder(&self) -> Result<WalkBuilder> {
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(false) // Sync hidden files too
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .require_git(false);

        if !self.ignores.is_empty() {
            let mut overrides = OverrideBuilder::new(&self.root);
            for pattern in &self.ignores {
                // "!" inverts an override into an ignore
                overrides.add(&format!("!{pattern}"))?;
            }
            builder.overrides(overrides.build()?);
        }

        Ok(builder)
    }

    /// Scan and return the sorted relative filenames present
    ///
    /// # Errors
    /// Returns an error if directory traversal fails.
    pub fn scan(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();

        for result in self.walk_builder()?.build() {
            let entry = result?;
            let path = entry.path();

            if !path.is_file() {
                continue;
            }

            let relative = path.strip_prefix(&self.root)?;
            let name = relative_name(relative);

            if name == INDEX_FILENAME || name == CONFIG_FILENAME {
                continue;
            }

            names.push(name);
        }

        names.sort();
        Ok(names)
    }
}

/// Join path components with forward slashes
fn relative_name(relative: &Path) -> String {
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_simple_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("file1.txt"), "hello").unwrap();
        fs::write(dir.path().join("file2.txt"), "world").unwrap();

        let names = Scanner::new(dir.path()).scan().unwrap();
        assert_eq!(names, vec!["file1.txt", "file2.txt"]);
    }

    #[test]
    fn test_scan_excludes_reserved_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(INDEX_FILENAME), "a.txt,1,\n").unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), "block_size = 4096\n").unwrap();
        fs::write(dir.path().join("tracked.txt"), "data").unwrap();

        let names = Scanner::new(dir.path()).scan().unwrap();
        assert_eq!(names, vec!["tracked.txt"]);
    }

    #[test]
    fn test_scan_nested_directories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub/deep")).unwrap();
        fs::write(dir.path().join("root.txt"), "root").unwrap();
        fs::write(dir.path().join("sub/nested.txt"), "nested").unwrap();
        fs::write(dir.path().join("sub/deep/leaf.txt"), "leaf").unwrap();

        let names = Scanner::new(dir.path()).scan().unwrap();
        assert_eq!(
            names,
            vec!["root.txt", "sub/deep/leaf.txt", "sub/nested.txt"]
        );
    }

    #[test]
    fn test_ignore_patterns() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("keep.txt"), "keep").unwrap();
        fs::write(dir.path().join("skip.log"), "skip").unwrap();

        let names = Scanner::new(dir.path()).ignore("*.log").scan().unwrap();
        assert_eq!(names, vec!["keep.txt"]);
    }

    #[test]
    fn test_scan_includes_hidden_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".env"), "SECRET=1").unwrap();

        let names = Scanner::new(dir.path()).scan().unwrap();
        assert_eq!(names, vec![".env"]);
    }
}
