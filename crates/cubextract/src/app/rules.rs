//! Compiled copy rules: the IDE lookup table plus the IDE-independent filters.

use std::path::{Component, Path};

use anyhow::{Context, Result, bail};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::app::resolve::DirQuery;
use crate::infra::config::{Config, CopyRule, IdeProfile};

/// Rules ready to be applied by the copier.
#[derive(Debug, Clone)]
pub struct RuleSet {
    profiles: Vec<CompiledProfile>,
    keywords: DirQuery,
    debug: DirQuery,
    reserved_prefix: String,
    descriptors: GlobSet,
    aux_files: GlobSet,
    shared_dest: String,
    include_dest: String,
    global_include: Option<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct CompiledProfile {
    pub profile: IdeProfile,
    pub rules: Vec<CompiledRule>,
}

#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: CopyRule,
    pub require: Option<GlobSet>,
}

impl CompiledRule {
    /// Whether `dir` satisfies the rule's `require` globs. Rules without globs accept any dir.
    pub fn accepts(&self, dir: &Path) -> bool {
        match &self.require {
            None => true,
            Some(globs) => contains_matching_file(dir, globs),
        }
    }
}

impl RuleSet {
    pub fn from_config(config: &Config) -> Result<Self> {
        let filters = &config.filters;

        let profiles = config
            .ides
            .iter()
            .map(compile_profile)
            .collect::<Result<Vec<_>>>()?;

        for dest in [&filters.shared_dest, &filters.include_dest] {
            ensure_relative(dest).context("invalid [filters] destination")?;
        }
        for keyword in filters.keywords.iter().chain([&filters.debug_keyword]) {
            if keyword.trim().is_empty() {
                bail!("invalid [filters] keyword: empty keywords match every directory");
            }
        }
        let global_include = if filters.global_include.trim().is_empty() {
            None
        } else {
            ensure_relative(&filters.global_include).context("invalid [filters] global_include")?;
            ensure_relative(&filters.global_include_dest)
                .context("invalid [filters] global_include_dest")?;
            Some((
                filters.global_include.clone(),
                filters.global_include_dest.clone(),
            ))
        };

        Ok(Self {
            profiles,
            keywords: DirQuery::contains_any(filters.keywords.iter().cloned()),
            debug: DirQuery::contains(filters.debug_keyword.clone()),
            reserved_prefix: filters.reserved_prefix.to_lowercase(),
            descriptors: build_globset(&filters.descriptor_globs)
                .context("invalid descriptor glob")?,
            aux_files: build_globset(&filters.aux_files).context("invalid auxiliary file glob")?,
            shared_dest: filters.shared_dest.clone(),
            include_dest: filters.include_dest.clone(),
            global_include,
        })
    }

    /// Profile for `ide`, or `None` when the identifier is not in the table.
    pub fn profile(&self, ide: &str) -> Option<&CompiledProfile> {
        self.profiles
            .iter()
            .find(|compiled| compiled.profile.answers_to(ide))
    }

    pub fn profile_names(&self) -> Vec<&str> {
        self.profiles
            .iter()
            .map(|compiled| compiled.profile.name.as_str())
            .collect()
    }

    pub fn keywords(&self) -> &DirQuery {
        &self.keywords
    }

    pub fn debug(&self) -> &DirQuery {
        &self.debug
    }

    /// A keyword match that is really IDE scaffolding: reserved prefix plus project descriptors.
    pub fn is_project_scaffold(&self, dir: &Path) -> bool {
        if self.reserved_prefix.is_empty() {
            return false;
        }
        let has_prefix = dir
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .is_some_and(|name| name.starts_with(&self.reserved_prefix));
        has_prefix && contains_matching_file(dir, &self.descriptors)
    }

    pub fn is_aux_file(&self, name: &str) -> bool {
        self.aux_files.is_match(name)
    }

    pub fn shared_dest(&self) -> &str {
        &self.shared_dest
    }

    pub fn include_dest(&self) -> &str {
        &self.include_dest
    }

    /// Vendor-wide include directory (relative to the SDK root) and its bundle destination.
    pub fn global_include(&self) -> Option<(&str, &str)> {
        self.global_include
            .as_ref()
            .map(|(source, dest)| (source.as_str(), dest.as_str()))
    }
}

fn compile_profile(profile: &IdeProfile) -> Result<CompiledProfile> {
    let rules = profile
        .rules
        .iter()
        .map(|rule| -> Result<CompiledRule> {
            ensure_relative(&rule.source)
                .and_then(|()| ensure_relative(rule.dest()))
                .with_context(|| format!("invalid rule '{}' for IDE {}", rule.source, profile.name))?;
            let require = if rule.require.is_empty() {
                None
            } else {
                Some(build_globset(&rule.require).with_context(|| {
                    format!("invalid require glob in IDE {}", profile.name)
                })?)
            };
            Ok(CompiledRule {
                rule: rule.clone(),
                require,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CompiledProfile {
        profile: profile.clone(),
        rules,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid glob '{pattern}'"))?;
        builder.add(glob);
    }
    builder.build().context("failed to build glob set")
}

/// Reject anything but plain relative components.
pub(crate) fn ensure_relative(raw: &str) -> Result<()> {
    let path = Path::new(raw);
    if raw.trim().is_empty() {
        bail!("path is empty");
    }
    if !path
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        bail!("'{raw}' must be a relative path without '..'");
    }
    Ok(())
}

fn contains_matching_file(dir: &Path, globs: &GlobSet) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|ft| ft.is_file()))
        .any(|entry| globs.is_match(entry.file_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn rules() -> RuleSet {
        let config = Config::builtin().expect("builtin config");
        RuleSet::from_config(&config).expect("compile rules")
    }

    #[test]
    fn looks_up_profiles_by_name_or_alias() {
        let rules = rules();
        assert_eq!(rules.profile("ewarm").map(|p| p.profile.name.as_str()), Some("IAR"));
        assert_eq!(rules.profile(" VSCode ").map(|p| p.profile.name.as_str()), Some("STM32VSCode"));
        assert!(rules.profile("eclipse").is_none());
        assert_eq!(rules.profile_names(), ["IAR", "STM32CubeMX2", "STM32VSCode"]);
    }

    #[test]
    fn aux_globs_match_case_insensitively() {
        let rules = rules();
        assert!(rules.is_aux_file("README"));
        assert!(rules.is_aux_file("readme.md"));
        assert!(rules.is_aux_file("Keil.STM32U5xx_DFP.pdsc"));
        assert!(rules.is_aux_file("package.sha1"));
        assert!(!rules.is_aux_file("readme_old.txt"));
        assert!(!rules.is_aux_file("main.c"));
    }

    #[test]
    fn scaffold_needs_both_prefix_and_descriptors() -> Result<()> {
        let rules = rules();
        let temp = tempfile::tempdir()?;
        let scaffold = temp.path().join("hal_gpio");
        let plain = temp.path().join("hal_uart");
        let project = temp.path().join("stm32_hal_ewarm");
        for dir in [&scaffold, &plain, &project] {
            fs::create_dir_all(dir)?;
        }
        fs::write(scaffold.join("Project.EWP"), b"")?;
        fs::write(plain.join("hal_uart.c"), b"")?;
        fs::write(project.join("Project.ewd"), b"")?;

        assert!(rules.is_project_scaffold(&scaffold));
        assert!(!rules.is_project_scaffold(&plain));
        assert!(!rules.is_project_scaffold(&project));
        Ok(())
    }

    #[test]
    fn rejects_rules_escaping_the_bundle() {
        let mut config = Config::builtin().expect("builtin config");
        config.ides.push(IdeProfile {
            name: "Evil".into(),
            aliases: Vec::new(),
            rules: vec![CopyRule {
                source: "src".into(),
                dest: Some("../outside".into()),
                kind: Default::default(),
                search: false,
                require: Vec::new(),
            }],
        });
        assert!(RuleSet::from_config(&config).is_err());
    }

    #[test]
    fn rejects_empty_keywords() {
        let mut config = Config::builtin().expect("builtin config");
        config.filters.keywords.push(" ".into());
        assert!(RuleSet::from_config(&config).is_err());

        let mut config = Config::builtin().expect("builtin config");
        config.filters.debug_keyword = String::new();
        assert!(RuleSet::from_config(&config).is_err());
    }

    #[test]
    fn global_include_can_be_disabled() {
        assert_eq!(rules().global_include(), Some(("hal/Inc", "Inc")));

        let mut config = Config::builtin().expect("builtin config");
        config.filters.global_include = String::new();
        let rules = RuleSet::from_config(&config).expect("compile rules");
        assert_eq!(rules.global_include(), None);

        let mut config = Config::builtin().expect("builtin config");
        config.filters.global_include = "../hal/Inc".into();
        assert!(RuleSet::from_config(&config).is_err());
    }

    #[test]
    fn ensure_relative_accepts_nested_plain_paths() {
        assert!(ensure_relative("inc").is_ok());
        assert!(ensure_relative("Drivers/CMSIS").is_ok());
        assert!(ensure_relative("/abs").is_err());
        assert!(ensure_relative("a/../b").is_err());
        assert!(ensure_relative("./a").is_err());
        assert!(ensure_relative("").is_err());
    }
}
