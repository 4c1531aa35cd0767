//! Extension allow-list filter for input paths.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A case-insensitive set of file extensions, stored lowercase with a leading dot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionSet {
    extensions: HashSet<String>,
}

impl ExtensionSet {
    /// Builds a set from extensions like ".docx", "PDF" or ".Txt".
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|e| normalize_extension(e.as_ref()))
            .filter(|e| e.len() > 1)
            .collect();
        Self { extensions }
    }

    /// Whether the path's extension is in the set.
    pub fn matches(&self, path: &Path) -> bool {
        extension_of(path)
            .map(|ext| self.extensions.contains(&ext))
            .unwrap_or(false)
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.extensions.contains(&normalize_extension(extension))
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }
}

/// Result of partitioning paths by extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredPaths {
    /// Paths whose extension is in the allow-list, in input order.
    pub accepted: Vec<PathBuf>,
    /// Every other path, in input order.
    pub discarded: Vec<PathBuf>,
}

/// Partitions `paths` into accepted and discarded by extension membership.
///
/// An absent input yields two empty partitions.
pub fn filter_by_extension(paths: Option<&[PathBuf]>, allowed: &ExtensionSet) -> FilteredPaths {
    let Some(paths) = paths else {
        return FilteredPaths::default();
    };

    let (accepted, discarded): (Vec<PathBuf>, Vec<PathBuf>) = paths
        .iter()
        .cloned()
        .partition(|path| allowed.matches(path));

    FilteredPaths {
        accepted,
        discarded,
    }
}

/// Lowercase extension of a path including the leading dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
}

fn normalize_extension(ext: &str) -> String {
    let trimmed = ext.trim().to_lowercase();
    if trimmed.starts_with('.') {
        trimmed
    } else {
        format!(".{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_partition_preserves_order() {
        let input = paths(&["/a/one.docx", "/a/setup.exe", "/b/two.DOCX", "/b/three.pdf"]);
        let set = ExtensionSet::new([".docx", ".pdf"]);

        let result = filter_by_extension(Some(&input), &set);

        assert_eq!(result.accepted, paths(&["/a/one.docx", "/b/two.DOCX", "/b/three.pdf"]));
        assert_eq!(result.discarded, paths(&["/a/setup.exe"]));
    }

    #[test]
    fn test_partition_is_exact() {
        let input = paths(&["a.txt", "b.md", "c", "d.TXT", ".hidden", "e.tar.gz"]);
        let set = ExtensionSet::new(["TXT", ".gz"]);

        let result = filter_by_extension(Some(&input), &set);

        assert_eq!(result.accepted.len() + result.discarded.len(), input.len());
        for path in &input {
            let in_accepted = result.accepted.contains(path);
            let in_discarded = result.discarded.contains(path);
            assert!(in_accepted ^ in_discarded, "{:?} must be in exactly one side", path);
        }
        assert_eq!(result.accepted, paths(&["a.txt", "d.TXT", "e.tar.gz"]));
    }

    #[test]
    fn test_empty_set_discards_everything() {
        let input = paths(&["a.docx", "b.pdf"]);
        let result = filter_by_extension(Some(&input), &ExtensionSet::default());
        assert!(result.accepted.is_empty());
        assert_eq!(result.discarded, input);
    }

    #[test]
    fn test_absent_input() {
        let set = ExtensionSet::new([".docx"]);
        let result = filter_by_extension(None, &set);
        assert!(result.accepted.is_empty());
        assert!(result.discarded.is_empty());
    }

    #[test]
    fn test_extension_set_normalization() {
        let set = ExtensionSet::new(["DOCX", " .Pdf ", "."]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(".docx"));
        assert!(set.contains("pdf"));
        assert!(set.matches(Path::new("report.PDF")));
        assert!(!set.matches(Path::new("README")));
    }
}
