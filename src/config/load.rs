//! Configuration layering: defaults, then environment overrides, then files.
//!
//! Each later layer overrides the earlier ones. Environment parse failures
//! are fatal; a file that cannot be read or parsed is logged and skipped.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::error::AppError;

use super::tree::ConfigStore;

/// Prefix shared by every environment variable this crate reads.
pub const ENV_PREFIX: &str = "LLM_KNIFE_";

/// Directory under the user's home that holds the per-user config files.
pub const USER_CONFIG_DIR: &str = ".llm_knife";

/// File name stem used for config files in the working directory.
pub const LOCAL_CONFIG_STEM: &str = "llm_knife_config";

/// How an enumerated environment variable is parsed before it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnvKind {
    Str,
    Int,
    Float,
}

/// Enumerated environment overrides: variable suffix, tree path, parse rule.
const ENV_OVERRIDES: &[(&str, &str, EnvKind)] = &[
    ("AWS_REGION", "aws.region", EnvKind::Str),
    ("ANTHROPIC_MODEL_ID", "aws.bedrock.anthropic.model_id", EnvKind::Str),
    ("MAX_TOKENS", "aws.bedrock.anthropic.max_tokens", EnvKind::Int),
    ("TEMPERATURE", "aws.bedrock.anthropic.temperature", EnvKind::Float),
    ("LOG_LEVEL", "logging.level", EnvKind::Str),
];

/// On-disk serialisation formats, picked by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    /// `.yaml`/`.yml` → YAML, `.toml` → TOML, anything else → JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            Some("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }

    fn parse(self, raw: &str) -> Result<Value, String> {
        match self {
            ConfigFormat::Yaml => serde_yaml::from_str(raw).map_err(|e| e.to_string()),
            ConfigFormat::Json => serde_json::from_str(raw).map_err(|e| e.to_string()),
            ConfigFormat::Toml => toml::from_str(raw).map_err(|e| e.to_string()),
        }
    }

    fn render(self, tree: &Value) -> Result<String, String> {
        match self {
            ConfigFormat::Yaml => serde_yaml::to_string(tree).map_err(|e| e.to_string()),
            ConfigFormat::Json => serde_json::to_string_pretty(tree).map_err(|e| e.to_string()),
            // TOML has no null; absent keys say the same thing
            ConfigFormat::Toml => {
                toml::to_string_pretty(&without_nulls(tree.clone())).map_err(|e| e.to_string())
            }
        }
    }
}

fn without_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, without_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items.into_iter().filter(|v| !v.is_null()).map(without_nulls).collect(),
        ),
        other => other,
    }
}

/// Outcome of the file layer: files merged and files skipped, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileLayerReport {
    pub loaded: Vec<PathBuf>,
    /// Each skipped file with the reason it could not be used.
    pub skipped: Vec<(PathBuf, String)>,
}

/// The four candidate config files, in merge order: per-user YAML, per-user
/// JSON, working-directory YAML, working-directory JSON.
///
/// The per-user pair is omitted when no home directory is known.
pub fn candidate_paths(home: Option<&Path>, cwd: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(4);
    if let Some(home) = home {
        let dir = home.join(USER_CONFIG_DIR);
        paths.push(dir.join("config.yaml"));
        paths.push(dir.join("config.json"));
    }
    paths.push(cwd.join(format!("{LOCAL_CONFIG_STEM}.yaml")));
    paths.push(cwd.join(format!("{LOCAL_CONFIG_STEM}.json")));
    paths
}

/// Default target for [`ConfigStore::save`]: `~/.llm_knife/config.yaml`.
pub fn default_save_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(USER_CONFIG_DIR).join("config.yaml"))
}

fn default_tree(environment: String) -> Map<String, Value> {
    let tree = json!({
        "aws": {
            "region": "us-east-1",
            "bedrock": {
                "anthropic": {
                    "model_id": "anthropic.claude-3-sonnet-20240229-v1:0",
                    "max_tokens": 1024,
                    "temperature": 0.7,
                }
            }
        },
        "openai": {
            "model": "gpt-4",
            "api_base_url": "https://api.openai.com/v1/chat/completions",
            "timeout_seconds": 60,
        },
        "logging": {
            "level": "info",
        },
        "environment": environment,
    });
    match tree {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl ConfigStore {
    /// Build the production tree: defaults, process environment, then the
    /// four candidate files under `$HOME` and the working directory.
    ///
    /// The file-layer report is returned so a caller that installs its log
    /// subscriber afterwards can still surface skipped files.
    pub fn load() -> Result<(Self, FileLayerReport), AppError> {
        let cwd = env::current_dir()?;
        let home = dirs::home_dir();
        let paths = candidate_paths(home.as_deref(), &cwd);
        Self::load_with_report(|key| env::var(key).ok(), &paths)
    }

    /// Same pipeline as [`ConfigStore::load`] with injected sources.
    /// Tests pass a closure instead of mutating process env vars.
    pub fn load_with<F>(env: F, paths: &[PathBuf]) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::load_with_report(env, paths).map(|(store, _)| store)
    }

    pub fn load_with_report<F>(env: F, paths: &[PathBuf]) -> Result<(Self, FileLayerReport), AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut store = ConfigStore::new();
        store.load_defaults(&env);
        store.load_from_env(&env)?;
        let report = store.load_from_files(paths);
        info!(
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            "configuration resolved"
        );
        Ok((store, report))
    }

    /// Replace the tree with the fixed baseline. The `environment` tag comes
    /// from `LLM_KNIFE_ENV`, falling back to `"development"`.
    pub fn load_defaults<F>(&mut self, env: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = env(&format!("{ENV_PREFIX}ENV")).unwrap_or_else(|| "development".into());
        *self = ConfigStore::from_map(default_tree(environment));
    }

    /// Apply the enumerated `LLM_KNIFE_*` overrides. Unset or empty variables
    /// are ignored; a value that fails to parse aborts with
    /// [`AppError::InvalidEnv`].
    pub fn load_from_env<F>(&mut self, env: &F) -> Result<(), AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for (suffix, path, kind) in ENV_OVERRIDES {
            let var = format!("{ENV_PREFIX}{suffix}");
            let Some(raw) = env(&var).filter(|v| !v.is_empty()) else {
                continue;
            };
            let value = match kind {
                EnvKind::Str => Value::from(raw.clone()),
                EnvKind::Int => raw
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|e| AppError::InvalidEnv {
                        var: var.clone(),
                        value: raw.clone(),
                        reason: e.to_string(),
                    })?,
                EnvKind::Float => {
                    let parsed = raw.trim().parse::<f64>().map_err(|e| AppError::InvalidEnv {
                        var: var.clone(),
                        value: raw.clone(),
                        reason: e.to_string(),
                    })?;
                    serde_json::Number::from_f64(parsed)
                        .map(Value::Number)
                        .ok_or_else(|| AppError::InvalidEnv {
                            var: var.clone(),
                            value: raw.clone(),
                            reason: "not a finite number".into(),
                        })?
                }
            };
            debug!(var = %var, path, "applying env override");
            self.set(path, value)?;
        }
        Ok(())
    }

    /// Deep-merge every existing file in `paths`, in order. Failures are
    /// logged, recorded in the report, and the file is skipped.
    pub fn load_from_files(&mut self, paths: &[PathBuf]) -> FileLayerReport {
        let mut report = FileLayerReport::default();
        for path in paths {
            if !path.exists() {
                continue;
            }
            match read_config_file(path) {
                Ok(overlay) => {
                    debug!(path = %path.display(), "merging config file");
                    self.merge(overlay);
                    report.loaded.push(path.clone());
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "could not load config file, skipping");
                    report.skipped.push((path.clone(), e.to_string()));
                }
            }
        }
        report
    }

    /// Write the whole tree to `path` (default `~/.llm_knife/config.yaml`),
    /// creating parent directories. Format follows the file extension.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, AppError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_save_path()
                .ok_or_else(|| AppError::Config("no home directory to save config into".into()))?,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tree = Value::Object(self.as_map().clone());
        let rendered = ConfigFormat::from_path(&path)
            .render(&tree)
            .map_err(|e| AppError::Config(format!("cannot serialize config for {}: {e}", path.display())))?;
        fs::write(&path, rendered)?;
        info!(path = %path.display(), "configuration saved");
        Ok(path)
    }
}

/// Read and parse one config file. The document root must be a mapping.
fn read_config_file(path: &Path) -> Result<Map<String, Value>, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    let parsed = ConfigFormat::from_path(path)
        .parse(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;
    match parsed {
        Value::Object(map) => Ok(map),
        other => Err(AppError::Config(format!(
            "{} must contain a mapping at the top level, found {}",
            path.display(),
            kind_name(&other)
        ))),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nothing",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
