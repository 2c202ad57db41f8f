//! Configuration management utilities.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs_next::config_dir;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static DEFAULT_CONFIG: Lazy<&'static str> =
    Lazy::new(|| include_str!("../../assets/default-config.toml"));
static WORKSPACE_CONFIG_PATH: &str = ".cubextract/config.toml";

/// Layered configuration loaded from built-in defaults, user, workspace, and env.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub resolve: Resolve,
    #[serde(default)]
    pub filters: Filters,
    #[serde(default)]
    pub ides: Vec<IdeProfile>,
}

/// Values used when neither the command line nor the prompt supplies one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Defaults {
    #[serde(default)]
    pub sdk_root: Option<PathBuf>,
    #[serde(default)]
    pub destination: Option<PathBuf>,
}

/// Marker names and file-name conventions of the vendor tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolve {
    #[serde(default = "Resolve::default_examples_dir")]
    pub examples_dir: String,
    #[serde(default = "Resolve::default_cmsis_dir")]
    pub cmsis_dir: String,
    #[serde(default = "Resolve::default_dfp_dir")]
    pub dfp_dir: String,
    #[serde(default = "Resolve::default_startup_prefix")]
    pub startup_prefix: String,
    #[serde(default = "Resolve::default_include_prefix")]
    pub include_prefix: String,
    #[serde(default = "Resolve::default_startup_extensions")]
    pub startup_extensions: Vec<String>,
    #[serde(default = "Resolve::default_include_extensions")]
    pub include_extensions: Vec<String>,
}

impl Resolve {
    fn default_examples_dir() -> String {
        "examples".into()
    }

    fn default_cmsis_dir() -> String {
        "CMSIS".into()
    }

    fn default_dfp_dir() -> String {
        "dfp".into()
    }

    fn default_startup_prefix() -> String {
        "startup".into()
    }

    fn default_include_prefix() -> String {
        "stm32".into()
    }

    fn default_startup_extensions() -> Vec<String> {
        vec!["s".into()]
    }

    fn default_include_extensions() -> Vec<String> {
        vec!["h".into()]
    }
}

impl Default for Resolve {
    fn default() -> Self {
        Self {
            examples_dir: Self::default_examples_dir(),
            cmsis_dir: Self::default_cmsis_dir(),
            dfp_dir: Self::default_dfp_dir(),
            startup_prefix: Self::default_startup_prefix(),
            include_prefix: Self::default_include_prefix(),
            startup_extensions: Self::default_startup_extensions(),
            include_extensions: Self::default_include_extensions(),
        }
    }
}

/// IDE-independent copy filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    /// Directories under the example whose name contains one of these are copied whole.
    #[serde(default = "Filters::default_keywords")]
    pub keywords: Vec<String>,
    /// Directories under the board whose name contains this are copied whole.
    #[serde(default = "Filters::default_debug_keyword")]
    pub debug_keyword: String,
    /// Keyword matches starting with this prefix are skipped when they hold project descriptors.
    #[serde(default = "Filters::default_reserved_prefix")]
    pub reserved_prefix: String,
    #[serde(default = "Filters::default_descriptor_globs")]
    pub descriptor_globs: Vec<String>,
    /// Files copied flat into the bundle root.
    #[serde(default = "Filters::default_aux_files")]
    pub aux_files: Vec<String>,
    #[serde(default = "Filters::default_shared_dest")]
    pub shared_dest: String,
    #[serde(default = "Filters::default_include_dest")]
    pub include_dest: String,
    /// Vendor-wide include directory, relative to the SDK root. Empty disables the copy.
    #[serde(default = "Filters::default_global_include")]
    pub global_include: String,
    #[serde(default = "Filters::default_global_include_dest")]
    pub global_include_dest: String,
}

impl Filters {
    fn default_keywords() -> Vec<String> {
        vec!["hal".into(), "device".into()]
    }

    fn default_debug_keyword() -> String {
        "debug".into()
    }

    fn default_reserved_prefix() -> String {
        "hal_".into()
    }

    fn default_descriptor_globs() -> Vec<String> {
        vec!["*.ewp".into(), "*.ewd".into()]
    }

    fn default_aux_files() -> Vec<String> {
        ["readme", "readme.*", "*.sha", "*.sha1", "*.pdsc"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn default_shared_dest() -> String {
        "CMSIS".into()
    }

    fn default_include_dest() -> String {
        "inc".into()
    }

    fn default_global_include() -> String {
        "hal/Inc".into()
    }

    fn default_global_include_dest() -> String {
        "Inc".into()
    }
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            keywords: Self::default_keywords(),
            debug_keyword: Self::default_debug_keyword(),
            reserved_prefix: Self::default_reserved_prefix(),
            descriptor_globs: Self::default_descriptor_globs(),
            aux_files: Self::default_aux_files(),
            shared_dest: Self::default_shared_dest(),
            include_dest: Self::default_include_dest(),
            global_include: Self::default_global_include(),
            global_include_dest: Self::default_global_include_dest(),
        }
    }
}

/// Copy rules selected by an IDE identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdeProfile {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub rules: Vec<CopyRule>,
}

impl IdeProfile {
    /// Whether `ide` names this profile, ignoring case.
    pub fn answers_to(&self, ide: &str) -> bool {
        let ide = ide.trim();
        self.name.eq_ignore_ascii_case(ide)
            || self.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(ide))
    }
}

/// One entry of an IDE profile: copy `source` (relative to the board directory) to `dest`
/// (relative to the bundle root, defaults to `source`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyRule {
    pub source: String,
    #[serde(default)]
    pub dest: Option<String>,
    #[serde(default)]
    pub kind: RuleKind,
    /// Look for `source` by name anywhere under the board directory.
    #[serde(default)]
    pub search: bool,
    /// Globs of which at least one must match a file directly inside the source directory.
    #[serde(default)]
    pub require: Vec<String>,
}

impl CopyRule {
    pub fn dest(&self) -> &str {
        self.dest.as_deref().unwrap_or(&self.source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    #[default]
    Dir,
    File,
}

/// Environment overrides for critical settings.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    sdk_root: Option<PathBuf>,
    destination: Option<PathBuf>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            sdk_root: env::var_os("CUBEXTRACT_SDK_ROOT").map(PathBuf::from),
            destination: env::var_os("CUBEXTRACT_DEST").map(PathBuf::from),
        }
    }

    #[cfg(test)]
    fn for_tests(sdk_root: &str, destination: &str) -> Self {
        Self {
            sdk_root: Some(PathBuf::from(sdk_root)),
            destination: Some(PathBuf::from(destination)),
        }
    }
}

impl Config {
    /// Load configuration from built-in defaults, user config, workspace config, and env overrides.
    pub fn load() -> Result<Self> {
        let env = EnvOverrides::from_env();
        let global = global_config_path();
        let workspace = workspace_config_path()?;
        Self::load_with_layers(global, workspace, env)
    }

    /// The configuration shipped with the binary, including the built-in IDE table.
    pub fn builtin() -> Result<Self> {
        Self::from_str(&DEFAULT_CONFIG).context("built-in configuration is invalid")
    }

    fn load_with_layers(
        global: Option<PathBuf>,
        workspace: Option<PathBuf>,
        env_overrides: EnvOverrides,
    ) -> Result<Self> {
        let mut layers: Vec<Config> = vec![Self::builtin()?];

        if let Some(global_path) = global.filter(|path| path.exists()) {
            tracing::debug!(path = %global_path.display(), "loading user config");
            layers.push(Self::from_file(&global_path)?);
        }

        if let Some(workspace_path) = workspace.filter(|path| path.exists()) {
            tracing::debug!(path = %workspace_path.display(), "loading workspace config");
            layers.push(Self::from_file(&workspace_path)?);
        }

        let merged = layers.into_iter().reduce(Config::merge).unwrap_or_default();
        Ok(apply_env_overrides(merged, env_overrides))
    }

    fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_str(&data).with_context(|| format!("in config file {}", path.display()))
    }

    fn from_str(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).with_context(|| "failed to parse TOML config".to_string())?;
        Ok(config)
    }

    fn merge(self, other: Self) -> Self {
        Self {
            defaults: merge_defaults(self.defaults, other.defaults),
            resolve: merge_resolve(self.resolve, other.resolve),
            filters: merge_filters(self.filters, other.filters),
            ides: merge_ides(self.ides, other.ides),
        }
    }
}

fn merge_defaults(base: Defaults, overlay: Defaults) -> Defaults {
    Defaults {
        sdk_root: overlay.sdk_root.or(base.sdk_root),
        destination: overlay.destination.or(base.destination),
    }
}

fn choose<T: PartialEq>(base: T, overlay: T, default_fn: fn() -> T) -> T {
    if overlay != default_fn() {
        overlay
    } else {
        base
    }
}

fn merge_resolve(base: Resolve, overlay: Resolve) -> Resolve {
    Resolve {
        examples_dir: choose(
            base.examples_dir,
            overlay.examples_dir,
            Resolve::default_examples_dir,
        ),
        cmsis_dir: choose(base.cmsis_dir, overlay.cmsis_dir, Resolve::default_cmsis_dir),
        dfp_dir: choose(base.dfp_dir, overlay.dfp_dir, Resolve::default_dfp_dir),
        startup_prefix: choose(
            base.startup_prefix,
            overlay.startup_prefix,
            Resolve::default_startup_prefix,
        ),
        include_prefix: choose(
            base.include_prefix,
            overlay.include_prefix,
            Resolve::default_include_prefix,
        ),
        startup_extensions: choose(
            base.startup_extensions,
            overlay.startup_extensions,
            Resolve::default_startup_extensions,
        ),
        include_extensions: choose(
            base.include_extensions,
            overlay.include_extensions,
            Resolve::default_include_extensions,
        ),
    }
}

fn merge_filters(base: Filters, overlay: Filters) -> Filters {
    Filters {
        keywords: choose(base.keywords, overlay.keywords, Filters::default_keywords),
        debug_keyword: choose(
            base.debug_keyword,
            overlay.debug_keyword,
            Filters::default_debug_keyword,
        ),
        reserved_prefix: choose(
            base.reserved_prefix,
            overlay.reserved_prefix,
            Filters::default_reserved_prefix,
        ),
        descriptor_globs: choose(
            base.descriptor_globs,
            overlay.descriptor_globs,
            Filters::default_descriptor_globs,
        ),
        aux_files: choose(base.aux_files, overlay.aux_files, Filters::default_aux_files),
        shared_dest: choose(
            base.shared_dest,
            overlay.shared_dest,
            Filters::default_shared_dest,
        ),
        include_dest: choose(
            base.include_dest,
            overlay.include_dest,
            Filters::default_include_dest,
        ),
        global_include: choose(
            base.global_include,
            overlay.global_include,
            Filters::default_global_include,
        ),
        global_include_dest: choose(
            base.global_include_dest,
            overlay.global_include_dest,
            Filters::default_global_include_dest,
        ),
    }
}

/// Overlay profiles replace base profiles of the same name and append new ones.
fn merge_ides(mut base: Vec<IdeProfile>, overlay: Vec<IdeProfile>) -> Vec<IdeProfile> {
    for profile in overlay {
        match base
            .iter_mut()
            .find(|existing| existing.name.eq_ignore_ascii_case(&profile.name))
        {
            Some(existing) => *existing = profile,
            None => base.push(profile),
        }
    }
    base
}

fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|base| base.join("cubextract/config.toml"))
}

fn workspace_config_path() -> Result<Option<PathBuf>> {
    let cwd = env::current_dir()?;
    Ok(find_workspace_config(&cwd))
}

fn find_workspace_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(WORKSPACE_CONFIG_PATH))
        .find(|candidate| candidate.exists())
}

fn apply_env_overrides(mut config: Config, env: EnvOverrides) -> Config {
    if let Some(sdk_root) = env.sdk_root {
        config.defaults.sdk_root = Some(sdk_root);
    }
    if let Some(destination) = env.destination {
        config.defaults.destination = Some(destination);
    }
    config
}
