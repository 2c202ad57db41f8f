//! Extraction sessions.
//!
//! A session runs the resolution pipeline strictly in order:
//! examples root, example, sub-example (asked only when ambiguous), board, CMSIS, DFP, model,
//! startup file, include file, and then the copy. The first step that cannot be resolved ends
//! the run with its [`ExtractError`]; nothing is written before every step has succeeded.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::app::bundle::StagedBundle;
use crate::app::copy::{CopyReport, copy_project};
use crate::app::model_id::extract_model;
use crate::app::resolve::{self, DirQuery, FileQuery};
use crate::app::rules::RuleSet;
use crate::domain::errors::ExtractError;
use crate::domain::model::{ModelId, ResolvedLocations, SelectionKey};
use crate::infra::config::{Config, Resolve};
use crate::infra::prompt::Prompter;

/// Values supplied up front; anything missing is taken from the config or prompted for.
#[derive(Debug, Clone, Default)]
pub struct SessionRequest {
    pub root: Option<PathBuf>,
    pub example: Option<String>,
    pub board: Option<String>,
    pub sub_example: Option<String>,
    pub ide: Option<String>,
    pub destination: Option<PathBuf>,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub selection: SelectionKey,
    pub locations: ResolvedLocations,
    pub bundle: PathBuf,
    pub report: CopyReport,
}

pub struct Session<'a> {
    config: &'a Config,
    rules: RuleSet,
    prompter: &'a mut dyn Prompter,
}

impl<'a> Session<'a> {
    pub fn new(config: &'a Config, prompter: &'a mut dyn Prompter) -> Result<Self> {
        let rules = RuleSet::from_config(config).context("invalid copy rules")?;
        Ok(Self {
            config,
            rules,
            prompter,
        })
    }

    pub fn run(&mut self, request: SessionRequest) -> Result<Outcome> {
        let root = match request.root.or_else(|| self.config.defaults.sdk_root.clone()) {
            Some(root) => root,
            None => PathBuf::from(self.given_or_ask(None, "SDK root directory")?),
        };
        let example = self.given_or_ask(request.example, "Example name")?;
        let board = self.given_or_ask(request.board, "Board name")?;

        let config = self.config;
        let cfg = &config.resolve;
        let examples_root = resolve_examples_root(&root, cfg)?;
        let example_dir = resolve_example_dir(&examples_root, &example)?;
        let (example_dir, sub_example) =
            self.narrow_sub_example(example_dir, &board, request.sub_example.as_deref())?;
        let board_dir = resolve_board_dir(&example_dir, &board)?;
        let cmsis_dir = resolve_cmsis_dir(&root, cfg)?;
        let dfp_dir = resolve_dfp_dir(&root, cfg)?;
        let model = resolve_model(&board, &board_dir)?;
        let startup_file = resolve_startup_file(&dfp_dir, &model, cfg)?;
        let include_file = resolve_include_file(&dfp_dir, &model, cfg)?;

        let locations = ResolvedLocations {
            sdk_root: root,
            examples_root,
            example_dir,
            board_dir,
            cmsis_dir,
            dfp_dir,
            model,
            startup_file,
            include_file,
        };

        let ide_question = format!("IDE ({})", self.rules.profile_names().join(", "));
        let ide = self.given_or_ask(request.ide, &ide_question)?;
        let destination_root = match request
            .destination
            .or_else(|| self.config.defaults.destination.clone())
        {
            Some(destination) => destination,
            None => PathBuf::from(self.given_or_ask(None, "Destination directory")?),
        };

        let selection = SelectionKey {
            board,
            example,
            sub_example,
            ide,
        };
        let destination = destination_root.join(selection.bundle_name());

        let bundle = StagedBundle::create(&destination)?;
        let report = copy_project(&selection, &locations, &self.rules, &bundle)?;
        let bundle = bundle.publish()?;

        Ok(Outcome {
            selection,
            locations,
            bundle,
            report,
        })
    }

    /// Narrow `example_dir` to one of its children when the example has several sub-examples.
    fn narrow_sub_example(
        &mut self,
        example_dir: PathBuf,
        board: &str,
        requested: Option<&str>,
    ) -> Result<(PathBuf, Option<String>)> {
        let children = resolve::list_child_directories(&example_dir).with_context(|| {
            format!("failed to list sub-examples of {}", example_dir.display())
        })?;

        if let Some(requested) = requested {
            let chosen = match_sub_example(&children, requested).ok_or_else(|| {
                ExtractError::ExampleNotFound {
                    name: requested.to_owned(),
                    root: example_dir.clone(),
                }
            })?;
            return Ok((example_dir.join(&chosen), Some(chosen)));
        }

        let choices = sub_example_choices(children, board);
        if choices.is_empty() {
            return Ok((example_dir, None));
        }

        let answer = self.prompter.choose("Sub-example number", &choices)?;
        let chosen = select_sub_example(&choices, &answer)?;
        tracing::info!(sub_example = %chosen, "sub-example selected");
        Ok((example_dir.join(&chosen), Some(chosen)))
    }

    fn given_or_ask(&mut self, given: Option<String>, question: &str) -> Result<String> {
        let value = match given {
            Some(value) => value.trim().to_owned(),
            None => self.prompter.ask(question)?,
        };
        if value.is_empty() {
            bail!("{question}: a value is required");
        }
        Ok(value)
    }
}

/// The `examples` directory under `root`, or `root` itself when it already is one.
pub fn resolve_examples_root(root: &Path, cfg: &Resolve) -> Result<PathBuf, ExtractError> {
    let query = DirQuery::exact(cfg.examples_dir.as_str());
    let is_examples = root
        .file_name()
        .is_some_and(|name| query.matches(&name.to_string_lossy()));
    let found = if is_examples && root.is_dir() {
        Some(root.to_path_buf())
    } else {
        resolve::find_directory(root, &query)
    };
    found
        .inspect(|path| tracing::info!(path = %path.display(), "examples root resolved"))
        .ok_or_else(|| ExtractError::RootNotFound {
            marker: cfg.examples_dir.clone(),
            root: root.to_path_buf(),
        })
}

/// Directory of the example called `name`. An exact name wins over partial matches; otherwise
/// the first candidate in traversal order is used and the others are reported.
pub fn resolve_example_dir(examples_root: &Path, name: &str) -> Result<PathBuf, ExtractError> {
    let candidates = resolve::find_all_directories(examples_root, &DirQuery::contains(name));
    let exact = DirQuery::exact(name);
    let chosen = candidates
        .iter()
        .find(|path| {
            path.file_name()
                .is_some_and(|file| exact.matches(&file.to_string_lossy()))
        })
        .or_else(|| candidates.first())
        .cloned()
        .ok_or_else(|| ExtractError::ExampleNotFound {
            name: name.to_owned(),
            root: examples_root.to_path_buf(),
        })?;

    if candidates.len() > 1 {
        let others: Vec<String> = candidates
            .iter()
            .filter(|candidate| **candidate != chosen)
            .map(|candidate| candidate.display().to_string())
            .collect();
        tracing::warn!(
            chosen = %chosen.display(),
            others = ?others,
            "example name is ambiguous"
        );
    }
    tracing::info!(path = %chosen.display(), "example resolved");
    Ok(chosen)
}

/// Sub-examples worth asking about: the children of the example directory, unless there is at
/// most one of them or the children are board directories themselves.
pub fn sub_example_choices(children: Vec<String>, board: &str) -> Vec<String> {
    let board_query = DirQuery::contains(board);
    if children.len() <= 1 || children.iter().any(|child| board_query.matches(child)) {
        return Vec::new();
    }
    children
}

/// Parse a 1-based `answer` against `choices`.
pub fn select_sub_example(choices: &[String], answer: &str) -> Result<String, ExtractError> {
    answer
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|index| index.checked_sub(1))
        .and_then(|index| choices.get(index))
        .cloned()
        .ok_or_else(|| ExtractError::InvalidSelection {
            input: answer.to_owned(),
            max: choices.len(),
        })
}

fn match_sub_example(children: &[String], requested: &str) -> Option<String> {
    let exact = DirQuery::exact(requested);
    let partial = DirQuery::contains(requested);
    children
        .iter()
        .find(|child| exact.matches(child))
        .or_else(|| children.iter().find(|child| partial.matches(child)))
        .cloned()
}

pub fn resolve_board_dir(example_dir: &Path, board: &str) -> Result<PathBuf, ExtractError> {
    resolve::find_directory(example_dir, &DirQuery::contains(board))
        .inspect(|path| tracing::info!(path = %path.display(), "board resolved"))
        .ok_or_else(|| ExtractError::BoardNotFound {
            name: board.to_owned(),
            root: example_dir.to_path_buf(),
        })
}

pub fn resolve_cmsis_dir(root: &Path, cfg: &Resolve) -> Result<PathBuf, ExtractError> {
    resolve::find_directory(root, &DirQuery::exact(cfg.cmsis_dir.as_str()))
        .inspect(|path| tracing::info!(path = %path.display(), "CMSIS resolved"))
        .ok_or_else(|| ExtractError::RootNotFound {
            marker: cfg.cmsis_dir.clone(),
            root: root.to_path_buf(),
        })
}

/// `<root>/dfp` when present, else the first directory named like it anywhere under `root`.
pub fn resolve_dfp_dir(root: &Path, cfg: &Resolve) -> Result<PathBuf, ExtractError> {
    let direct = root.join(&cfg.dfp_dir);
    let found = if direct.is_dir() {
        Some(direct)
    } else {
        resolve::find_directory(root, &DirQuery::exact(cfg.dfp_dir.as_str()))
    };
    found
        .inspect(|path| tracing::info!(path = %path.display(), "device pack resolved"))
        .ok_or_else(|| ExtractError::RootNotFound {
            marker: cfg.dfp_dir.clone(),
            root: root.to_path_buf(),
        })
}

/// Model from the board name as typed, falling back to the resolved board directory's name.
pub fn resolve_model(board: &str, board_dir: &Path) -> Result<ModelId, ExtractError> {
    extract_model(board)
        .or_else(|| {
            board_dir
                .file_name()
                .and_then(|name| extract_model(&name.to_string_lossy()))
        })
        .inspect(|model| tracing::info!(%model, "model extracted"))
        .ok_or_else(|| ExtractError::ModelNotExtractable {
            board: board.to_owned(),
        })
}

pub fn resolve_startup_file(
    dfp_dir: &Path,
    model: &ModelId,
    cfg: &Resolve,
) -> Result<PathBuf, ExtractError> {
    let query = FileQuery::new(&cfg.startup_prefix, model.as_str())
        .with_extensions(&cfg.startup_extensions);
    first_file(dfp_dir, &query, "startup file").ok_or_else(|| {
        ExtractError::StartupFileNotFound {
            model: model.to_string(),
            root: dfp_dir.to_path_buf(),
        }
    })
}

pub fn resolve_include_file(
    dfp_dir: &Path,
    model: &ModelId,
    cfg: &Resolve,
) -> Result<PathBuf, ExtractError> {
    let query = FileQuery::new(&cfg.include_prefix, model.as_str())
        .with_extensions(&cfg.include_extensions);
    first_file(dfp_dir, &query, "include file").ok_or_else(|| {
        ExtractError::IncludeFileNotFound {
            model: model.to_string(),
            root: dfp_dir.to_path_buf(),
        }
    })
}

fn first_file(root: &Path, query: &FileQuery, role: &str) -> Option<PathBuf> {
    let mut candidates = resolve::find_all_files(root, query).into_iter();
    let chosen = candidates.next()?;
    let others: Vec<String> = candidates.map(|path| path.display().to_string()).collect();
    if !others.is_empty() {
        tracing::debug!(role, ?others, "other candidates ignored");
    }
    tracing::info!(role, path = %chosen.display(), "file resolved");
    Some(chosen)
}
