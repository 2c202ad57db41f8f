//! Domain models for selections, resolved locations, and model identifiers.

use std::fmt;
use std::path::PathBuf;

/// What the user asked for: one board, one example, optionally one sub-example, one IDE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionKey {
    pub board: String,
    pub example: String,
    pub sub_example: Option<String>,
    pub ide: String,
}

impl SelectionKey {
    /// Directory name of the bundle produced for this selection.
    ///
    /// `<example>[_<sub-example>]_<ide>`, with separators and whitespace flattened so the name
    /// is always a single path component.
    pub fn bundle_name(&self) -> String {
        let mut parts = vec![sanitize_component(&self.example)];
        if let Some(sub) = &self.sub_example {
            parts.push(sanitize_component(sub));
        }
        parts.push(sanitize_component(&self.ide));
        parts.join("_")
    }
}

fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_owned(),
        _ => cleaned,
    }
}

/// Three-digit microcontroller variant code, e.g. `575` for a `U575` board.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelId(String);

impl ModelId {
    pub(crate) fn new(digits: impl Into<String>) -> Self {
        Self(digits.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Every location the copier needs, each one found on disk during resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocations {
    pub sdk_root: PathBuf,
    pub examples_root: PathBuf,
    /// Example directory, already narrowed to the chosen sub-example if any.
    pub example_dir: PathBuf,
    pub board_dir: PathBuf,
    pub cmsis_dir: PathBuf,
    pub dfp_dir: PathBuf,
    pub model: ModelId,
    pub startup_file: PathBuf,
    pub include_file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(sub: Option<&str>) -> SelectionKey {
        SelectionKey {
            board: "NUCLEO-U575ZI".into(),
            example: "GPIO Toggle".into(),
            sub_example: sub.map(str::to_owned),
            ide: "IAR".into(),
        }
    }

    #[test]
    fn bundle_name_includes_sub_example_when_present() {
        assert_eq!(key(None).bundle_name(), "GPIO_Toggle_IAR");
        assert_eq!(key(Some("Advanced")).bundle_name(), "GPIO_Toggle_Advanced_IAR");
    }

    #[test]
    fn bundle_name_never_contains_separators_or_parent_refs() {
        let mut selection = key(Some(".."));
        selection.example = "../../etc".into();
        let name = selection.bundle_name();
        assert!(!name.contains('/'));
        assert!(!name.contains('\\'));
        assert_eq!(name, ".._.._etc___IAR");
    }
}
