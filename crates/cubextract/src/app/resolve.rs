//! Directory-tree search over the vendor distribution.
//!
//! Every search is a pre-order walk in which the entries of a directory are visited in
//! lexicographic file-name order, so the "first match" is reproducible across platforms. The
//! root itself is never a candidate. Symlinks are not followed and unreadable entries are
//! skipped with a warning.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ignore::{DirEntry, WalkBuilder};

/// Predicate over directory basenames. Matching is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirQuery {
    /// Basename equals the name.
    Exact(String),
    /// Basename contains the needle.
    Contains(String),
    /// Basename contains at least one of the needles.
    ContainsAny(Vec<String>),
}

impl DirQuery {
    pub fn exact(name: impl Into<String>) -> Self {
        DirQuery::Exact(name.into().to_lowercase())
    }

    pub fn contains(needle: impl Into<String>) -> Self {
        DirQuery::Contains(needle.into().to_lowercase())
    }

    pub fn contains_any<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DirQuery::ContainsAny(
            needles
                .into_iter()
                .map(|needle| needle.into().to_lowercase())
                .collect(),
        )
    }

    pub fn matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        match self {
            DirQuery::Exact(expected) => name == *expected,
            DirQuery::Contains(needle) => name.contains(needle.as_str()),
            DirQuery::ContainsAny(needles) => {
                needles.iter().any(|needle| name.contains(needle.as_str()))
            }
        }
    }
}

/// Predicate over file basenames: a case-insensitive prefix, a required fragment, and an
/// optional extension allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileQuery {
    prefix: String,
    fragment: String,
    extensions: Vec<String>,
}

impl FileQuery {
    pub fn new(prefix: &str, fragment: &str) -> Self {
        Self {
            prefix: prefix.to_lowercase(),
            fragment: fragment.to_lowercase(),
            extensions: Vec::new(),
        }
    }

    /// Restrict matches to the given extensions. An empty list accepts any extension.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    pub fn matches(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        if !lower.starts_with(&self.prefix) || !lower.contains(&self.fragment) {
            return false;
        }
        if self.extensions.is_empty() {
            return true;
        }
        Path::new(&lower)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|allowed| allowed == ext))
    }
}

/// First directory under `root` whose basename satisfies `query`.
pub fn find_directory(root: &Path, query: &DirQuery) -> Option<PathBuf> {
    directories(root)
        .find(|entry| query.matches(&entry_name(entry)))
        .map(|entry| entry.into_path())
}

/// Every directory under `root` whose basename satisfies `query`, in traversal order.
pub fn find_all_directories(root: &Path, query: &DirQuery) -> Vec<PathBuf> {
    directories(root)
        .filter(|entry| query.matches(&entry_name(entry)))
        .map(|entry| entry.into_path())
        .collect()
}

/// First file under `root` whose basename satisfies `query`.
pub fn find_file(root: &Path, query: &FileQuery) -> Option<PathBuf> {
    find_all_files(root, query).into_iter().next()
}

/// Every file under `root` whose basename satisfies `query`, in traversal order.
pub fn find_all_files(root: &Path, query: &FileQuery) -> Vec<PathBuf> {
    find_files_where(root, |name| query.matches(name))
}

/// Every file under `root` whose basename satisfies `predicate`, in traversal order.
pub fn find_files_where(root: &Path, predicate: impl Fn(&str) -> bool) -> Vec<PathBuf> {
    entries(root)
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter(|entry| predicate(&entry_name(entry)))
        .map(|entry| entry.into_path())
        .collect()
}

/// Names of the immediate subdirectories of `path`, sorted.
pub fn list_child_directories(path: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

pub(crate) fn walker(root: &Path) -> WalkBuilder {
    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b));
    builder
}

fn entries(root: &Path) -> impl Iterator<Item = DirEntry> {
    walker(root)
        .build()
        .filter_map(|result| match result {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.depth() > 0)
}

fn directories(root: &Path) -> impl Iterator<Item = DirEntry> {
    entries(root).filter(|entry| entry.file_type().is_some_and(|ft| ft.is_dir()))
}

fn entry_name(entry: &DirEntry) -> String {
    entry.file_name().to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn tree(paths: &[&str]) -> Result<tempfile::TempDir> {
        let temp = tempfile::tempdir()?;
        for path in paths {
            let full = temp.path().join(path);
            if path.ends_with('/') {
                fs::create_dir_all(&full)?;
            } else {
                if let Some(parent) = full.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&full, b"x")?;
            }
        }
        Ok(temp)
    }

    #[test]
    fn finds_single_match_case_insensitively() -> Result<()> {
        let temp = tree(&["sdk/Projects/NUCLEO-U575ZI/Examples/", "sdk/Middlewares/"])?;
        let found = find_directory(temp.path(), &DirQuery::exact("EXAMPLES"));
        assert_eq!(found, Some(temp.path().join("sdk/Projects/NUCLEO-U575ZI/Examples")));

        let found = find_directory(temp.path(), &DirQuery::contains("nucleo"));
        assert_eq!(found, Some(temp.path().join("sdk/Projects/NUCLEO-U575ZI")));
        Ok(())
    }

    #[test]
    fn returns_none_without_match() -> Result<()> {
        let temp = tree(&["a/b/c/", "d/file.txt"])?;
        assert_eq!(find_directory(temp.path(), &DirQuery::contains("missing")), None);
        // Files never satisfy a directory query.
        assert_eq!(find_directory(temp.path(), &DirQuery::contains("file")), None);
        Ok(())
    }

    #[test]
    fn root_is_not_a_candidate() -> Result<()> {
        let temp = tree(&["examples/"])?;
        let root = temp.path().join("examples");
        assert_eq!(find_directory(&root, &DirQuery::exact("examples")), None);
        Ok(())
    }

    #[test]
    fn first_match_follows_sorted_preorder() -> Result<()> {
        let temp = tree(&["b_timer/", "a/nested_timer/", "a/z/"])?;
        let all = find_all_directories(temp.path(), &DirQuery::contains("timer"));
        assert_eq!(
            all,
            vec![
                temp.path().join("a/nested_timer"),
                temp.path().join("b_timer"),
            ]
        );
        assert_eq!(
            find_directory(temp.path(), &DirQuery::contains("timer")),
            Some(temp.path().join("a/nested_timer"))
        );
        Ok(())
    }

    #[test]
    fn file_query_requires_prefix_fragment_and_extension() -> Result<()> {
        let temp = tree(&[
            "dfp/Source/startup_stm32u575xx.s",
            "dfp/Source/system_stm32u575xx.c",
            "dfp/Include/stm32u575xx.h",
            "dfp/Include/stm32u585xx.h",
            "dfp/Linker/stm32u575_flash.icf",
        ])?;
        let root = temp.path();

        let startup = find_file(root, &FileQuery::new("startup", "575"));
        assert_eq!(startup, Some(root.join("dfp/Source/startup_stm32u575xx.s")));

        let any_ext = find_all_files(root, &FileQuery::new("STM32", "575"));
        assert_eq!(any_ext.len(), 2);

        let header = find_file(root, &FileQuery::new("stm32", "575").with_extensions([".h"]));
        assert_eq!(header, Some(root.join("dfp/Include/stm32u575xx.h")));

        assert_eq!(find_file(root, &FileQuery::new("startup", "999")), None);
        Ok(())
    }

    #[test]
    fn lists_only_immediate_child_directories_sorted() -> Result<()> {
        let temp = tree(&["Timer/Basic/Board/", "Timer/Advanced/", "Timer/readme.txt"])?;
        let children = list_child_directories(&temp.path().join("Timer"))?;
        assert_eq!(children, vec!["Advanced".to_string(), "Basic".to_string()]);
        Ok(())
    }
}
