//! Rule-based project copier.
//!
//! Builds the bundle from the resolved locations: auxiliary files and keyword directories from
//! the example, debug configurations from the board, the shared CMSIS headers, the vendor HAL
//! include directory, the device startup and include files, and finally the IDE-specific
//! subtrees. Every step merges into
//! whatever earlier steps wrote and refuses to read from the bundle itself.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::app::bundle::{StagedBundle, absolute};
use crate::app::resolve::{self, DirQuery};
use crate::app::rules::{CompiledRule, RuleSet};
use crate::domain::errors::ExtractError;
use crate::domain::model::{ResolvedLocations, SelectionKey};
use crate::infra::config::RuleKind;

/// Why a copy step did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The source is the bundle or lies inside it.
    SelfCopy,
    /// An IDE rule's source or the vendor include directory does not exist.
    Missing,
    /// A keyword directory holding IDE project descriptors.
    ProjectScaffold,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub source: PathBuf,
    pub reason: SkipReason,
}

/// What a copy run did, with bundle-relative destinations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub directories: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
    pub skipped: Vec<Skipped>,
    /// Files written, including those inside copied directories.
    pub file_count: usize,
}

/// Populate `bundle` for `selection` from the resolved `locations`.
pub fn copy_project(
    selection: &SelectionKey,
    locations: &ResolvedLocations,
    rules: &RuleSet,
    bundle: &StagedBundle,
) -> Result<CopyReport, ExtractError> {
    let mut copier = Copier {
        rules,
        bundle,
        report: CopyReport::default(),
    };

    copier.copy_aux_files(&locations.example_dir)?;
    copier.copy_matching_dirs(&locations.example_dir, rules.keywords(), true)?;
    copier.copy_matching_dirs(&locations.board_dir, rules.debug(), false)?;
    copier.copy_dir(&locations.cmsis_dir, Path::new(rules.shared_dest()))?;
    copier.copy_global_include(&locations.sdk_root)?;
    copier.copy_file(&locations.startup_file, &file_name(&locations.startup_file)?)?;
    copier.copy_file(
        &locations.include_file,
        &Path::new(rules.include_dest()).join(file_name(&locations.include_file)?),
    )?;
    copier.copy_ide_subtrees(&selection.ide, &locations.board_dir)?;

    let report = copier.report;
    tracing::info!(
        directories = report.directories.len(),
        files = report.file_count,
        skipped = report.skipped.len(),
        "bundle populated"
    );
    Ok(report)
}

struct Copier<'a> {
    rules: &'a RuleSet,
    bundle: &'a StagedBundle,
    report: CopyReport,
}

impl Copier<'_> {
    fn copy_aux_files(&mut self, example_dir: &Path) -> Result<(), ExtractError> {
        let rules = self.rules;
        for file in resolve::find_files_where(example_dir, |name| rules.is_aux_file(name)) {
            let name = file_name(&file)?;
            self.copy_file(&file, &name)?;
        }
        Ok(())
    }

    /// Copy every directory under `root` matching `query` to the bundle root, by name. A copied
    /// directory is taken whole; matches nested inside it are not copied again.
    fn copy_matching_dirs(
        &mut self,
        root: &Path,
        query: &DirQuery,
        skip_scaffolds: bool,
    ) -> Result<(), ExtractError> {
        let mut taken: Vec<PathBuf> = Vec::new();
        for dir in resolve::find_all_directories(root, query) {
            if taken.iter().any(|parent| dir.starts_with(parent)) {
                continue;
            }
            if skip_scaffolds && self.rules.is_project_scaffold(&dir) {
                self.skip(dir, SkipReason::ProjectScaffold);
                continue;
            }
            let name = file_name(&dir)?;
            self.copy_dir(&dir, &name)?;
            taken.push(dir);
        }
        Ok(())
    }

    fn copy_global_include(&mut self, sdk_root: &Path) -> Result<(), ExtractError> {
        let rules = self.rules;
        let Some((source, dest)) = rules.global_include() else {
            return Ok(());
        };
        let source = sdk_root.join(source);
        if !source.is_dir() {
            self.skip(source, SkipReason::Missing);
            return Ok(());
        }
        self.copy_dir(&source, Path::new(dest))
    }

    fn copy_ide_subtrees(&mut self, ide: &str, board_dir: &Path) -> Result<(), ExtractError> {
        let rules = self.rules;
        let Some(profile) = rules.profile(ide) else {
            tracing::info!(
                ide,
                board = %board_dir.display(),
                "no rules for IDE, copying the whole board directory"
            );
            return self.copy_dir(board_dir, &file_name(board_dir)?);
        };

        tracing::debug!(
            ide = %profile.profile.name,
            rules = profile.rules.len(),
            "applying IDE rules"
        );
        for compiled in &profile.rules {
            self.apply_rule(compiled, board_dir)?;
        }
        Ok(())
    }

    fn apply_rule(&mut self, compiled: &CompiledRule, board_dir: &Path) -> Result<(), ExtractError> {
        let rule = &compiled.rule;
        let source = match (rule.kind, rule.search) {
            (RuleKind::Dir, true) => {
                resolve::find_all_directories(board_dir, &DirQuery::exact(rule.source.as_str()))
                    .into_iter()
                    .find(|dir| compiled.accepts(dir))
            }
            (RuleKind::File, true) => {
                resolve::find_files_where(board_dir, |name| name.eq_ignore_ascii_case(&rule.source))
                    .into_iter()
                    .next()
            }
            (RuleKind::Dir, false) => Some(board_dir.join(&rule.source))
                .filter(|dir| dir.is_dir() && compiled.accepts(dir)),
            (RuleKind::File, false) => {
                Some(board_dir.join(&rule.source)).filter(|file| file.is_file())
            }
        };

        let Some(source) = source else {
            self.skip(board_dir.join(&rule.source), SkipReason::Missing);
            return Ok(());
        };

        match rule.kind {
            RuleKind::Dir => self.copy_dir(&source, Path::new(rule.dest())),
            RuleKind::File => self.copy_file(&source, Path::new(rule.dest())),
        }
    }

    fn copy_dir(&mut self, source: &Path, relative: &Path) -> Result<(), ExtractError> {
        let target = self.bundle.target(relative)?;
        if self.bundle.is_reserved(source) {
            self.skip(source.to_path_buf(), SkipReason::SelfCopy);
            return Ok(());
        }

        let copied = copy_tree(source, &target.staged, self.bundle.reserved())?;
        tracing::debug!(
            from = %source.display(),
            to = %target.published.display(),
            files = copied,
            "copied directory"
        );
        self.report.directories.push(relative.to_path_buf());
        self.report.file_count += copied;
        Ok(())
    }

    fn copy_file(&mut self, source: &Path, relative: &Path) -> Result<(), ExtractError> {
        let target = self.bundle.target(relative)?;
        if self.bundle.is_reserved(source) {
            self.skip(source.to_path_buf(), SkipReason::SelfCopy);
            return Ok(());
        }

        overwrite(source, &target.staged)?;
        tracing::debug!(
            from = %source.display(),
            to = %target.published.display(),
            "copied file"
        );
        self.report.files.push(relative.to_path_buf());
        self.report.file_count += 1;
        Ok(())
    }

    fn skip(&mut self, source: PathBuf, reason: SkipReason) {
        tracing::debug!(source = %source.display(), ?reason, "skipped copy step");
        self.report.skipped.push(Skipped { source, reason });
    }
}

/// Recursively copy `source` into `target`, merging with existing content and overwriting
/// files. Paths under any of `excluded` are never read. Returns the number of files written.
pub fn copy_tree(source: &Path, target: &Path, excluded: &[PathBuf]) -> Result<usize, ExtractError> {
    let root = absolute(source);
    let excluded = excluded.to_vec();
    let mut builder = resolve::walker(&root);
    builder.filter_entry(move |entry| !excluded.iter().any(|path| entry.path().starts_with(path)));

    let mut copied = 0;
    for result in builder.build() {
        let entry = result.map_err(|err| ExtractError::copy(&root, target, walk_error(err)))?;
        let Ok(relative) = entry.path().strip_prefix(&root) else {
            continue;
        };
        let dest = if relative.as_os_str().is_empty() {
            target.to_path_buf()
        } else {
            target.join(relative)
        };

        if entry.file_type().is_some_and(|ft| ft.is_dir()) {
            fs::create_dir_all(&dest)
                .map_err(|err| ExtractError::copy(entry.path(), &dest, err))?;
            continue;
        }

        // Symlinks are resolved; links to directories and dangling links are left out.
        match fs::metadata(entry.path()) {
            Ok(metadata) if metadata.is_file() => {
                overwrite(entry.path(), &dest)?;
                copied += 1;
            }
            _ => tracing::debug!(path = %entry.path().display(), "not a regular file, skipped"),
        }
    }
    Ok(copied)
}

fn overwrite(from: &Path, to: &Path) -> Result<(), ExtractError> {
    let result = (|| -> io::Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        // Removing first lets read-only vendor files be replaced.
        if fs::symlink_metadata(to).is_ok_and(|meta| meta.is_file()) {
            fs::remove_file(to)?;
        }
        fs::copy(from, to)?;
        Ok(())
    })();
    result.map_err(|err| ExtractError::copy(from, to, err))
}

fn walk_error(err: ignore::Error) -> io::Error {
    let message = err.to_string();
    err.into_io_error()
        .unwrap_or_else(|| io::Error::other(message))
}

fn file_name(path: &Path) -> Result<PathBuf, ExtractError> {
    path.file_name()
        .map(PathBuf::from)
        .ok_or_else(|| ExtractError::EscapesDestination {
            path: path.to_path_buf(),
        })
}
