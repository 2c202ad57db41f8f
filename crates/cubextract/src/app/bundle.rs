//! Staged destination bundles.
//!
//! Copies land in a hidden temporary directory next to the final destination. The bundle only
//! appears at its final path once [`StagedBundle::publish`] renames it there; dropping an
//! unpublished bundle removes everything that was staged.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;

use crate::domain::errors::ExtractError;

const STAGE_PREFIX: &str = ".cubextract-stage-";
const PREVIOUS_PREFIX: &str = ".cubextract-previous-";

/// Where one copy step writes (inside the stage) and where that path ends up once published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub staged: PathBuf,
    pub published: PathBuf,
}

#[derive(Debug)]
pub struct StagedBundle {
    destination: PathBuf,
    stage: TempDir,
    /// Absolute forms of the destination and the stage, never to be read from while copying.
    reserved: Vec<PathBuf>,
}

impl StagedBundle {
    /// Create an empty stage for a bundle that will be published at `destination`.
    pub fn create(destination: impl Into<PathBuf>) -> Result<Self, ExtractError> {
        let destination = destination.into();
        let parent = parent_dir(&destination);
        fs::create_dir_all(&parent).map_err(|source| ExtractError::Publish {
            path: destination.clone(),
            source,
        })?;

        let stage = tempfile::Builder::new()
            .prefix(STAGE_PREFIX)
            .tempdir_in(&parent)
            .map_err(|source| ExtractError::Publish {
                path: destination.clone(),
                source,
            })?;

        let reserved = vec![absolute(&destination), absolute(stage.path())];
        tracing::debug!(
            destination = %destination.display(),
            stage = %stage.path().display(),
            "staging bundle"
        );

        Ok(Self {
            destination,
            stage,
            reserved,
        })
    }

    pub fn stage_root(&self) -> &Path {
        self.stage.path()
    }

    pub(crate) fn reserved(&self) -> &[PathBuf] {
        &self.reserved
    }

    /// Whether `path` is the destination, the stage, or inside either of them.
    pub fn is_reserved(&self, path: &Path) -> bool {
        let path = absolute(path);
        self.reserved.iter().any(|reserved| path.starts_with(reserved))
    }

    /// Resolve a bundle-relative path, refusing anything that would land outside the bundle.
    pub fn target(&self, relative: impl AsRef<Path>) -> Result<Target, ExtractError> {
        let relative = relative.as_ref();
        let confined = !relative.as_os_str().is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !confined {
            return Err(ExtractError::EscapesDestination {
                path: relative.to_path_buf(),
            });
        }
        Ok(Target {
            staged: self.stage.path().join(relative),
            published: self.destination.join(relative),
        })
    }

    /// Move the stage to the destination, replacing any bundle already there.
    pub fn publish(self) -> Result<PathBuf, ExtractError> {
        let publish_err = |source: io::Error| ExtractError::Publish {
            path: self.destination.clone(),
            source,
        };

        let parent = parent_dir(&self.destination);
        let previous = if fs::symlink_metadata(&self.destination).is_ok() {
            let holder = tempfile::Builder::new()
                .prefix(PREVIOUS_PREFIX)
                .tempdir_in(&parent)
                .map_err(publish_err)?;
            let moved = holder.path().join("bundle");
            fs::rename(&self.destination, &moved).map_err(publish_err)?;
            tracing::debug!(destination = %self.destination.display(), "replacing existing bundle");
            Some((holder, moved))
        } else {
            None
        };

        if let Err(source) = fs::rename(self.stage.path(), &self.destination) {
            if let Some((holder, moved)) = previous
                && let Err(err) = fs::rename(&moved, &self.destination)
            {
                let kept = holder.keep();
                tracing::warn!(
                    error = %err,
                    kept = %kept.display(),
                    "failed to restore previous bundle"
                );
            }
            return Err(publish_err(source));
        }

        tracing::info!(destination = %self.destination.display(), "bundle published");
        Ok(self.destination.clone())
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Canonical form of `path`, or of its parent joined with the file name when `path` does not
/// exist yet.
pub(crate) fn absolute(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent_or_cwd(parent))
            .map(|parent| parent.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

fn parent_or_cwd(parent: &Path) -> &Path {
    if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn target_rejects_escaping_paths() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let bundle = StagedBundle::create(temp.path().join("Blink_IAR"))?;

        for escaping in ["../x", "/etc/passwd", "a/../../b", ""] {
            let err = bundle.target(escaping).expect_err(escaping);
            assert!(matches!(err, ExtractError::EscapesDestination { .. }));
        }

        let target = bundle.target("inc/stm32u575xx.h")?;
        assert!(target.staged.starts_with(bundle.stage_root()));
        assert_eq!(target.published, temp.path().join("Blink_IAR/inc/stm32u575xx.h"));
        Ok(())
    }

    #[test]
    fn nothing_appears_until_published() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let destination = temp.path().join("out/Blink_IAR");
        let bundle = StagedBundle::create(&destination)?;
        fs::write(bundle.stage_root().join("main.c"), b"int main;")?;
        assert!(!destination.exists());

        let published = bundle.publish()?;
        assert_eq!(published, destination);
        assert_eq!(fs::read(destination.join("main.c"))?, b"int main;");

        let leftovers: Vec<_> = fs::read_dir(temp.path().join("out"))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(leftovers, ["Blink_IAR"]);
        Ok(())
    }

    #[test]
    fn dropped_stage_leaves_no_trace() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let destination = temp.path().join("Blink_IAR");
        {
            let bundle = StagedBundle::create(&destination)?;
            fs::write(bundle.stage_root().join("partial.c"), b"")?;
        }
        assert!(!destination.exists());
        assert_eq!(fs::read_dir(temp.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn publish_replaces_previous_bundle() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let destination = temp.path().join("Blink_IAR");
        fs::create_dir_all(destination.join("stale"))?;
        fs::write(destination.join("stale/old.c"), b"")?;

        let bundle = StagedBundle::create(&destination)?;
        fs::write(bundle.stage_root().join("new.c"), b"")?;
        bundle.publish()?;

        assert!(destination.join("new.c").exists());
        assert!(!destination.join("stale").exists());
        assert_eq!(fs::read_dir(temp.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn reserved_paths_cover_destination_and_stage() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let bundle = StagedBundle::create(temp.path().join("Blink_IAR"))?;
        assert!(bundle.is_reserved(&temp.path().join("Blink_IAR")));
        assert!(bundle.is_reserved(&bundle.stage_root().join("inc")));
        assert!(!bundle.is_reserved(temp.path()));
        Ok(())
    }
}
