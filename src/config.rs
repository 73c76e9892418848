//! Configuration for rl-eval.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (RL_EVAL_HOME, RL_EVAL_LANGUAGE, and the API key
//!    variable named by `llm.api_key_env`)
//! 2. Config file (.rl-eval/config.yaml)
//! 3. Defaults (~/.rl-eval)
//!
//! Config file discovery:
//! - Searches current directory and parents for .rl-eval/config.yaml
//! - Paths in config file are relative to the project root (parent of .rl-eval/)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::OpenAiSettings;
use crate::core::evaluation::{EvalOptions, FailurePolicy};
use crate::core::retry::RetryPolicy;
use crate::core::runner::RunnerOptions;
use crate::domain::Language;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const CONFIG_DIR: &str = ".rl-eval";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub language: Option<Language>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub llm: Option<LlmConfig>,
    #[serde(default)]
    pub runner: Option<RunnerConfig>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub evaluation: Option<EvaluationConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Output root (relative to the project root)
    pub home: Option<String>,
    /// Prompt set YAML (relative to the project root)
    pub prompts: Option<String>,
    /// Directory holding prediction files (relative to the project root)
    pub results: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmConfig {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u32>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunnerConfig {
    pub max_concurrent: Option<usize>,
    pub request_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvaluationConfig {
    pub failure_policy: Option<FailurePolicy>,
    pub exclude_empty_gold: Option<bool>,
}

/// Model endpoint settings
#[derive(Debug, Clone, Serialize)]
pub struct LlmSettings {
    pub model: String,
    pub base_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4.1".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.7,
            top_p: 0.8,
            max_tokens: 8192,
            timeout_seconds: 120,
        }
    }
}

impl LlmSettings {
    /// Adapter settings, reading the API key from the environment
    pub fn adapter_settings(&self, model: Option<&str>) -> Result<OpenAiSettings> {
        let api_key = std::env::var(&self.api_key_env)
            .with_context(|| format!("{} environment variable required", self.api_key_env))?;

        Ok(OpenAiSettings {
            base_url: self.base_url.clone(),
            api_key,
            model: model.unwrap_or(&self.model).to_string(),
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            timeout: Duration::from_secs(self.timeout_seconds),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunnerSettings {
    pub max_concurrent: usize,
    pub request_delay_ms: u64,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            request_delay_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationSettings {
    pub failure_policy: FailurePolicy,
    pub exclude_empty_gold: bool,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::AsEmpty,
            exclude_empty_gold: true,
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// Output root
    pub home: PathBuf,
    /// Directory holding prediction files
    pub results_dir: PathBuf,
    /// Prompt set file (if configured)
    pub prompts: Option<PathBuf>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub language: Language,
    pub llm: LlmSettings,
    pub runner: RunnerSettings,
    pub retry: RetryPolicy,
    pub evaluation: EvaluationSettings,
}

impl ResolvedConfig {
    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            max_concurrent: self.runner.max_concurrent,
            request_delay: Duration::from_millis(self.runner.request_delay_ms),
            retry: self.retry.clone(),
        }
    }

    pub fn eval_options(&self) -> EvalOptions {
        EvalOptions {
            failure_policy: self.evaluation.failure_policy,
            exclude_empty_gold: self.evaluation.exclude_empty_gold,
        }
    }
}

/// Environment overrides
#[derive(Debug, Clone, Default)]
struct EnvOverrides {
    home: Option<String>,
    language: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            home: std::env::var("RL_EVAL_HOME").ok(),
            language: std::env::var("RL_EVAL_LANGUAGE").ok(),
        }
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge file settings, environment overrides and defaults
fn resolve(
    config_path: Option<PathBuf>,
    file: ConfigFile,
    env: EnvOverrides,
    default_home: PathBuf,
) -> Result<ResolvedConfig> {
    // Project root is the parent of .rl-eval/ (i.e., grandparent of config.yaml)
    let base_dir = config_path
        .as_deref()
        .and_then(Path::parent)
        .and_then(Path::parent)
        .map(Path::to_path_buf);

    let relative = |value: &Option<String>| -> Option<PathBuf> {
        let value = value.as_deref()?;
        Some(match &base_dir {
            Some(base) => resolve_path(base, value),
            None => PathBuf::from(value),
        })
    };

    let home = match env.home {
        Some(env_home) => PathBuf::from(env_home),
        None => relative(&file.paths.home).unwrap_or(default_home),
    };
    let results_dir = relative(&file.paths.results).unwrap_or_else(|| home.join("results"));
    let prompts = relative(&file.paths.prompts);

    let language = match env.language {
        Some(value) => value
            .parse::<Language>()
            .map_err(|e| anyhow::anyhow!("Invalid RL_EVAL_LANGUAGE: {}", e))?,
        None => file.language.unwrap_or_default(),
    };

    let defaults = LlmSettings::default();
    let llm_file = file.llm.unwrap_or_default();
    let llm = LlmSettings {
        model: llm_file.model.unwrap_or(defaults.model),
        base_url: llm_file.base_url.unwrap_or(defaults.base_url),
        api_key_env: llm_file.api_key_env.unwrap_or(defaults.api_key_env),
        temperature: llm_file.temperature.unwrap_or(defaults.temperature),
        top_p: llm_file.top_p.unwrap_or(defaults.top_p),
        max_tokens: llm_file.max_tokens.unwrap_or(defaults.max_tokens),
        timeout_seconds: llm_file.timeout_seconds.unwrap_or(defaults.timeout_seconds),
    };

    let runner_file = file.runner.unwrap_or_default();
    let runner = RunnerSettings {
        max_concurrent: runner_file.max_concurrent.unwrap_or(5),
        request_delay_ms: runner_file.request_delay_ms.unwrap_or(100),
    };

    let evaluation_file = file.evaluation.unwrap_or_default();
    let evaluation = EvaluationSettings {
        failure_policy: evaluation_file.failure_policy.unwrap_or_default(),
        exclude_empty_gold: evaluation_file.exclude_empty_gold.unwrap_or(true),
    };

    Ok(ResolvedConfig {
        home,
        results_dir,
        prompts,
        config_file: config_path,
        language,
        llm,
        runner,
        retry: file.retry.unwrap_or_default(),
        evaluation,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);

    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let config_path = find_config_file(&cwd);
    let file = match &config_path {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    resolve(config_path, file, EnvOverrides::from_env(), default_home)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(root: &Path, body: &str) -> PathBuf {
        let dir = root.join(CONFIG_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}", body).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(
            None,
            ConfigFile::default(),
            EnvOverrides::default(),
            PathBuf::from("/home/u/.rl-eval"),
        )
        .unwrap();

        assert_eq!(config.home, PathBuf::from("/home/u/.rl-eval"));
        assert_eq!(config.results_dir, PathBuf::from("/home/u/.rl-eval/results"));
        assert_eq!(config.language, Language::Zh);
        assert_eq!(config.llm.model, "gpt-4.1");
        assert_eq!(config.llm.max_tokens, 8192);
        assert_eq!(config.runner.max_concurrent, 5);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.evaluation.failure_policy, FailurePolicy::AsEmpty);
        assert!(config.evaluation.exclude_empty_gold);
    }

    #[test]
    fn test_config_file_parsing_and_discovery() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(
            temp.path(),
            r#"
language: en
paths:
  results: results
  prompts: prompts/en.yaml
llm:
  model: Qwen3-235B-A22B
  base_url: https://llm.example.test/v1
runner:
  max_concurrent: 2
retry:
  max_attempts: 3
evaluation:
  failure_policy: exclude
"#,
        );

        let nested = temp.path().join("data").join("round1");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_config_file(&nested), Some(config_path.clone()));

        let file = load_config_file(&config_path).unwrap();
        let config = resolve(
            Some(config_path),
            file,
            EnvOverrides::default(),
            PathBuf::from("/unused"),
        )
        .unwrap();

        assert_eq!(config.language, Language::En);
        assert_eq!(config.llm.model, "Qwen3-235B-A22B");
        assert_eq!(config.llm.temperature, 0.7);
        assert_eq!(config.runner.max_concurrent, 2);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.rate_limit_max_delay_ms, 60_000);
        assert_eq!(config.evaluation.failure_policy, FailurePolicy::Exclude);
        assert!(config.results_dir.ends_with("results"));
        assert!(config.prompts.unwrap().ends_with("prompts/en.yaml"));
    }

    #[test]
    fn test_env_overrides_win() {
        let file: ConfigFile = serde_yaml::from_str("language: en\npaths:\n  home: /from/file").unwrap();
        let env = EnvOverrides {
            home: Some("/from/env".to_string()),
            language: Some("zh".to_string()),
        };
        let config = resolve(None, file, env, PathBuf::from("/default")).unwrap();
        assert_eq!(config.home, PathBuf::from("/from/env"));
        assert_eq!(config.language, Language::Zh);

        let bad = EnvOverrides {
            home: None,
            language: Some("fr".to_string()),
        };
        assert!(resolve(None, ConfigFile::default(), bad, PathBuf::from("/d")).is_err());
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
