//! Runtime configuration: CLI flags over environment over config file over defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::ai::Provider;
use crate::export::ExportMode;
use crate::slack::{RetryPolicy, DEFAULT_CACHE_TTL, DEFAULT_PAGE_DELAY_MS, DEFAULT_PAGE_SIZE};

const APP_DIR: &str = "slack-extract";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_EXPORT_ROOT: &str = "slack-export";
const DEFAULT_LANGUAGE: &str = "English";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
    #[error("SLACK_USER_TOKEN is not set (xoxp-... or xoxc-... with SLACK_DS_COOKIE)")]
    MissingToken,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub slack: SlackSection,
    pub export: ExportSection,
    pub llm: LlmSection,
    pub retry: RetryPolicy,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SlackSection {
    pub token: Option<String>,
    pub cookie: Option<String>,
    pub page_size: Option<u32>,
    pub page_delay_ms: Option<u64>,
    pub cache_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExportSection {
    pub root: Option<PathBuf>,
    pub download_attachments: Option<bool>,
    pub mode: Option<ExportMode>,
    /// Save the index after every channel (default) or only when the batch ends
    pub save_index_each_channel: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub provider: Option<Provider>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub language: Option<String>,
}

/// Values given on the command line. `None` defers to the lower layers.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub export_root: Option<PathBuf>,
    pub download_attachments: Option<bool>,
    pub mode: Option<ExportMode>,
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: Provider,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub language: String,
}

impl LlmConfig {
    /// The configured model, or the provider's default.
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or_else(|| self.provider.default_model())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub slack_token: Option<String>,
    pub slack_cookie: Option<String>,
    pub export_root: PathBuf,
    pub download_attachments: bool,
    pub mode: ExportMode,
    pub save_index_each_channel: bool,
    pub retry: RetryPolicy,
    pub page_size: u32,
    pub page_delay: Duration,
    pub cache_ttl: Duration,
    pub llm: LlmConfig,
}

impl Config {
    /// Resolve the final configuration from every layer.
    pub fn from_sources(
        overrides: Overrides,
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let var = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        let download_attachments = match overrides.download_attachments {
            Some(value) => value,
            None => match var("DOWNLOAD_ATTACHMENTS") {
                Some(value) => parse_bool("DOWNLOAD_ATTACHMENTS", &value)?,
                None => file.export.download_attachments.unwrap_or(false),
            },
        };

        let provider = match overrides.provider {
            Some(provider) => provider,
            None => match var("LLM_PROVIDER") {
                Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                    name: "LLM_PROVIDER",
                    value,
                })?,
                None => file.llm.provider.unwrap_or_default(),
            },
        };

        let api_key = var("LLM_API_KEY")
            .or_else(|| var("OPENAI_API_KEY"))
            .or_else(|| var("GEMINI_API_KEY"))
            .or(file.llm.api_key);

        Ok(Self {
            slack_token: var("SLACK_USER_TOKEN").or(file.slack.token),
            slack_cookie: var("SLACK_DS_COOKIE").or(file.slack.cookie),
            export_root: overrides
                .export_root
                .or_else(|| var("EXPORT_ROOT").map(PathBuf::from))
                .or(file.export.root)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_ROOT)),
            download_attachments,
            mode: overrides.mode.or(file.export.mode).unwrap_or_default(),
            save_index_each_channel: file.export.save_index_each_channel.unwrap_or(true),
            retry: file.retry,
            page_size: file.slack.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 1000),
            page_delay: Duration::from_millis(file.slack.page_delay_ms.unwrap_or(DEFAULT_PAGE_DELAY_MS)),
            cache_ttl: file
                .slack
                .cache_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CACHE_TTL),
            llm: LlmConfig {
                provider,
                api_key,
                model: overrides.model.or_else(|| var("LLM_MODEL")).or(file.llm.model),
                base_url: var("LLM_BASE_URL").or(file.llm.base_url),
                language: overrides
                    .language
                    .or(file.llm.language)
                    .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            },
        })
    }

    /// Load the config file and resolve against the process environment.
    pub fn load(config_path: Option<&Path>, overrides: Overrides) -> Result<Self, ConfigError> {
        let file = load_file_config(config_path)?;
        Self::from_sources(overrides, file, |name| std::env::var(name).ok())
    }

    pub fn require_slack_token(&self) -> Result<&str, ConfigError> {
        self.slack_token.as_deref().ok_or(ConfigError::MissingToken)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE))
}

/// Read the config file. An explicit path must exist; the default location is optional.
pub fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let path = match explicit_path {
        Some(p) if !p.exists() => return Err(ConfigError::NotFound(p.to_path_buf())),
        Some(p) => Some(p.to_path_buf()),
        None => default_config_path().filter(|p| p.exists()),
    };

    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    tracing::debug!("Loading config from {}", path.display());

    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(Overrides::default(), FileConfig::default(), env_from(&[])).unwrap();

        assert_eq!(config.export_root, PathBuf::from("slack-export"));
        assert!(!config.download_attachments);
        assert_eq!(config.mode, ExportMode::Incremental);
        assert!(config.save_index_each_channel);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.page_size, 200);
        assert_eq!(config.page_delay, Duration::from_millis(100));
        assert_eq!(config.cache_ttl, DEFAULT_CACHE_TTL);
        assert_eq!(config.llm.provider, Provider::OpenAi);
        assert_eq!(config.llm.model_or_default(), "gpt-4o-mini");
        assert_eq!(config.llm.language, "English");
        assert!(matches!(config.require_slack_token(), Err(ConfigError::MissingToken)));
    }

    #[test]
    fn test_file_config_parses() {
        let file: FileConfig = toml::from_str(
            r#"
[slack]
token = "xoxp-file"
page_size = 50
cache_ttl_secs = 60

[export]
root = "/data/slack"
download_attachments = true
mode = "overwrite"
save_index_each_channel = false

[llm]
provider = "gemini"
language = "Korean"

[retry]
max_retries = 2
initial_backoff = 250
"#,
        )
        .unwrap();

        let config = Config::from_sources(Overrides::default(), file, env_from(&[])).unwrap();
        assert_eq!(config.require_slack_token().unwrap(), "xoxp-file");
        assert_eq!(config.page_size, 50);
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.export_root, PathBuf::from("/data/slack"));
        assert!(config.download_attachments);
        assert_eq!(config.mode, ExportMode::Overwrite);
        assert!(!config.save_index_each_channel);
        assert_eq!(config.llm.provider, Provider::Gemini);
        assert_eq!(config.llm.model_or_default(), "gemini-1.5-flash");
        assert_eq!(config.llm.language, "Korean");
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(250));
        assert_eq!(config.retry.max_backoff, Duration::from_secs(60));
    }

    #[test]
    fn test_env_beats_file_and_cli_beats_env() {
        let file = FileConfig {
            slack: SlackSection {
                token: Some("xoxp-file".into()),
                ..Default::default()
            },
            export: ExportSection {
                root: Some("from-file".into()),
                download_attachments: Some(false),
                ..Default::default()
            },
            ..Default::default()
        };
        let env = env_from(&[
            ("SLACK_USER_TOKEN", "xoxc-env"),
            ("SLACK_DS_COOKIE", "xoxd-env"),
            ("EXPORT_ROOT", "from-env"),
            ("DOWNLOAD_ATTACHMENTS", "true"),
            ("LLM_PROVIDER", "gemini"),
            ("LLM_MODEL", "gemini-1.5-pro"),
        ]);
        let overrides = Overrides {
            export_root: Some("from-cli".into()),
            provider: Some(Provider::OpenAi),
            ..Default::default()
        };

        let config = Config::from_sources(overrides, file, env).unwrap();
        assert_eq!(config.slack_token.as_deref(), Some("xoxc-env"));
        assert_eq!(config.slack_cookie.as_deref(), Some("xoxd-env"));
        assert_eq!(config.export_root, PathBuf::from("from-cli"));
        assert!(config.download_attachments);
        assert_eq!(config.llm.provider, Provider::OpenAi);
        assert_eq!(config.llm.model.as_deref(), Some("gemini-1.5-pro"));
    }

    #[test]
    fn test_api_key_fallbacks() {
        let config = Config::from_sources(
            Overrides::default(),
            FileConfig::default(),
            env_from(&[("GEMINI_API_KEY", "g-key"), ("OPENAI_API_KEY", "")]),
        )
        .unwrap();
        assert_eq!(config.llm.api_key.as_deref(), Some("g-key"));

        let config = Config::from_sources(
            Overrides::default(),
            FileConfig::default(),
            env_from(&[("LLM_API_KEY", "main"), ("OPENAI_API_KEY", "o-key")]),
        )
        .unwrap();
        assert_eq!(config.llm.api_key.as_deref(), Some("main"));
    }

    #[test]
    fn test_invalid_env_values_rejected() {
        let err = Config::from_sources(
            Overrides::default(),
            FileConfig::default(),
            env_from(&[("DOWNLOAD_ATTACHMENTS", "maybe")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "DOWNLOAD_ATTACHMENTS", .. }));

        let err = Config::from_sources(
            Overrides::default(),
            FileConfig::default(),
            env_from(&[("LLM_PROVIDER", "claude")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("LLM_PROVIDER"));
    }

    #[test]
    fn test_explicit_config_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(load_file_config(Some(&missing)), Err(ConfigError::NotFound(_))));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[export\nroot = 1").unwrap();
        assert!(matches!(load_file_config(Some(&bad)), Err(ConfigError::Parse { .. })));
    }
}
