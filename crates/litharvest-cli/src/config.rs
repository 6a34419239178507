//! Configuration loading from TOML files

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use litharvest_entrez::Source;
use litharvest_pipeline::PipelineConfig;

/// Global configuration for litharvest
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub entrez: EntrezConfig,
    pub collect: CollectConfig,
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./harvest"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EntrezConfig {
    pub base_url: String,
    /// Contact address the service asks every client to identify with
    pub email: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub api_key: Option<String>,
}

impl Default for EntrezConfig {
    fn default() -> Self {
        Self {
            base_url: litharvest_entrez::client::DEFAULT_BASE_URL.to_string(),
            email: String::new(),
            api_key: std::env::var("NCBI_API_KEY").ok(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    pub workers: usize,
    pub page_size: usize,
    pub checkpoint_interval: usize,
    /// Sources to harvest ("pubmed", "pmc")
    pub sources: Vec<String>,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            page_size: 10_000,
            checkpoint_interval: 10,
            sources: vec!["pubmed".to_string(), "pmc".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub batch_size: usize,
    pub save_raw_xml: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            save_raw_xml: true,
        }
    }
}

/// Deserialize a string that may contain an environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./litharvest.toml (current directory)
    /// 2. ~/.config/litharvest/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("litharvest.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "litharvest") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Resolve the configured source names, CLI override first.
    pub fn sources(&self, override_names: &[String]) -> Result<Vec<Source>> {
        let names = if override_names.is_empty() {
            &self.collect.sources
        } else {
            override_names
        };
        names
            .iter()
            .map(|name| {
                Source::from_name(name)
                    .with_context(|| format!("unknown source {name:?} (expected pubmed or pmc)"))
            })
            .collect()
    }

    /// Materialize the pipeline configuration from this config plus CLI
    /// overrides.
    pub fn pipeline(
        &self,
        sources: Vec<Source>,
        workers_override: Option<usize>,
    ) -> PipelineConfig {
        let rate_delay = if self.entrez.api_key.is_some() {
            litharvest_core::rate::DELAY_WITH_KEY
        } else {
            litharvest_core::rate::DELAY_WITHOUT_KEY
        };
        PipelineConfig {
            sources,
            workers: workers_override.unwrap_or(self.collect.workers).max(1),
            page_size: self.collect.page_size,
            checkpoint_interval: self.collect.checkpoint_interval.max(1),
            batch_size: self.fetch.batch_size.max(1),
            output_dir: self.output.dir.clone(),
            rate_delay,
            retry: litharvest_core::RetryPolicy::default(),
            save_raw_xml: self.fetch.save_raw_xml,
        }
    }

    pub fn client(&self) -> litharvest_entrez::EntrezClient {
        litharvest_entrez::EntrezClient::new(
            &self.entrez.base_url,
            &self.entrez.email,
            self.entrez.api_key.clone(),
        )
    }
}

/// Rate delay the current credential level allows (for display only).
pub fn rate_delay_label(config: &Config) -> Duration {
    if config.entrez.api_key.is_some() {
        litharvest_core::rate::DELAY_WITH_KEY
    } else {
        litharvest_core::rate::DELAY_WITHOUT_KEY
    }
}
