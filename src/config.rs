use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::classifier::MatchMode;
use crate::cli::Cli;
use crate::error::{Error, Result};
use crate::policy::{DEFAULT_AUTO_THRESHOLD, DEFAULT_MANUAL_THRESHOLD, Thresholds};
use crate::registry::KeywordRegistry;

pub const DEFAULT_CONFIG_PATH: &str = "bugroute.toml";
pub const DEFAULT_REPORT_PATH: &str = "routing-report.json";
pub const DEFAULT_DELAY_MS: u64 = 1000;
pub const DEFAULT_LIST_LIMIT: u32 = 100;
pub const DEFAULT_CLICKUP_TOKEN_ENV: &str = "CLICKUP_API_TOKEN";

/// Labels that mark an issue as already handled by a previous run.
pub fn default_exclude_labels() -> Vec<String> {
    vec![
        "routed".to_string(),
        "auto-routed".to_string(),
        "manual-review".to_string(),
    ]
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DestinationFile {
    /// Repository slug; defaults to `<owner>/<destination id>`.
    pub repo: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ClickUpFile {
    pub token_env: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub owner: Option<String>,
    #[serde(default)]
    pub repositories: Vec<String>,
    pub auto_threshold: Option<f64>,
    pub manual_threshold: Option<f64>,
    pub match_mode: Option<String>,
    pub delay_ms: Option<u64>,
    pub label: Option<String>,
    pub exclude_labels: Option<Vec<String>>,
    pub list_limit: Option<u32>,
    pub report_path: Option<String>,
    pub templates_dir: Option<String>,
    pub dry_run: Option<bool>,
    pub clickup: Option<ClickUpFile>,
    #[serde(default)]
    pub destinations: BTreeMap<String, DestinationFile>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClickUpConfig {
    pub token_env: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub registry: KeywordRegistry,
    pub thresholds: Thresholds,
    pub match_mode: MatchMode,
    pub repositories: Vec<String>,
    pub label: Option<String>,
    pub exclude_labels: Vec<String>,
    pub list_limit: u32,
    pub delay_ms: u64,
    pub report_path: String,
    pub templates_dir: Option<String>,
    pub dry_run: bool,
    pub clickup: Option<ClickUpConfig>,
}

impl Config {
    pub fn load(cli: &Cli) -> Result<Self> {
        let config_path = Path::new(cli.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH));
        let file_config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            parse_config(&content)?
        } else {
            return Err(Error::ConfigNotFound(config_path.to_path_buf()));
        };

        merge(file_config, cli)
    }
}

pub fn parse_config(content: &str) -> Result<ConfigFile> {
    let config: ConfigFile = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn validate_repo_slug(field: &str, slug: &str) -> Result<()> {
    let mut parts = slug.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => Ok(()),
        _ => Err(Error::ConfigValidation(format!(
            "{field}: expected owner/name, got {slug:?}"
        ))),
    }
}

fn validate(config: &ConfigFile) -> Result<()> {
    if let Some(ref mode) = config.match_mode
        && MatchMode::parse(mode).is_none()
    {
        return Err(Error::ConfigValidation(format!(
            "unknown match_mode: {mode} (expected: substring, word)"
        )));
    }
    for repo in &config.repositories {
        validate_repo_slug("repositories", repo)?;
    }
    if config.destinations.is_empty() {
        return Err(Error::ConfigValidation(
            "at least one [destinations.<id>] table is required".to_string(),
        ));
    }
    for (id, dest) in &config.destinations {
        match dest.repo {
            Some(ref repo) => validate_repo_slug(&format!("destinations.{id}.repo"), repo)?,
            None if config.owner.is_none() => {
                return Err(Error::ConfigValidation(format!(
                    "destinations.{id} has no repo and no top-level owner is set"
                )));
            }
            None => {}
        }
    }
    if let Some(limit) = config.list_limit
        && limit == 0
    {
        return Err(Error::ConfigValidation(
            "list_limit must be > 0".to_string(),
        ));
    }
    Ok(())
}

fn build_registry(file: &ConfigFile) -> Result<KeywordRegistry> {
    KeywordRegistry::new(file.destinations.iter().map(|(id, dest)| {
        let repository = match (&dest.repo, &file.owner) {
            (Some(repo), _) => repo.clone(),
            (None, Some(owner)) => format!("{owner}/{id}"),
            // rejected by validate()
            (None, None) => id.clone(),
        };
        (id.clone(), repository, dest.keywords.clone())
    }))
}

pub fn merge(file: ConfigFile, cli: &Cli) -> Result<Config> {
    let registry = build_registry(&file)?;

    let thresholds = Thresholds::new(
        cli.auto_threshold
            .or(file.auto_threshold)
            .unwrap_or(DEFAULT_AUTO_THRESHOLD),
        cli.manual_threshold
            .or(file.manual_threshold)
            .unwrap_or(DEFAULT_MANUAL_THRESHOLD),
    )?;

    let match_mode = match cli.match_mode.as_deref().or(file.match_mode.as_deref()) {
        Some(mode) => MatchMode::parse(mode).ok_or_else(|| {
            Error::ConfigValidation(format!(
                "unknown match_mode: {mode} (expected: substring, word)"
            ))
        })?,
        None => MatchMode::default(),
    };

    Ok(Config {
        registry,
        thresholds,
        match_mode,
        repositories: file.repositories,
        label: file.label,
        exclude_labels: file.exclude_labels.unwrap_or_else(default_exclude_labels),
        list_limit: file.list_limit.unwrap_or(DEFAULT_LIST_LIMIT),
        delay_ms: cli.delay_ms.or(file.delay_ms).unwrap_or(DEFAULT_DELAY_MS),
        report_path: cli
            .report
            .clone()
            .or(file.report_path)
            .unwrap_or_else(|| DEFAULT_REPORT_PATH.to_string()),
        templates_dir: file.templates_dir,
        dry_run: cli.dry_run || file.dry_run.unwrap_or(false),
        clickup: file.clickup.map(|c| ClickUpConfig {
            token_env: c
                .token_env
                .unwrap_or_else(|| DEFAULT_CLICKUP_TOKEN_ENV.to_string()),
        }),
    })
}
