use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::RagError;
use crate::rag::fusion::FusionWeights;
use crate::rag::orchestrator::AnswerOptions;
use crate::rag::packer::PackerConfig;
use crate::rag::prompts::PromptSet;

/// Process-wide configuration.
///
/// Built once at startup and read-only afterwards; the orchestrator copies
/// what it needs at construction time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub fusion: FusionWeights,
    #[serde(default)]
    pub packer: PackerConfig,
    #[serde(default)]
    pub prompts: PromptSet,
    #[serde(default)]
    pub defaults: AnswerOptions,
}

/// Azure AI Search connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub index_name: String,
    pub api_version: String,
    pub semantic_configuration: String,
    pub fields: FieldMapping,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            index_name: "rag-labs-index".to_string(),
            api_version: "2023-11-01".to_string(),
            semantic_configuration: "default".to_string(),
            fields: FieldMapping::default(),
        }
    }
}

/// Index field names
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    pub id: String,
    pub content: String,
    pub title: String,
    pub vector: String,
    pub document_id: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            id: "chunk_id".to_string(),
            content: "chunk".to_string(),
            title: "title".to_string(),
            vector: "text_vector".to_string(),
            document_id: "parent_id".to_string(),
        }
    }
}

/// Language model and embedding provider credentials.
///
/// Azure OpenAI is used when endpoint, key and deployment are all present;
/// otherwise standard OpenAI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub azure_endpoint: Option<String>,
    #[serde(skip_serializing)]
    pub azure_api_key: Option<String>,
    pub azure_deployment: Option<String>,
    pub azure_embedding_deployment: String,
    pub api_version: String,
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_embedding_model: String,
    /// Completion length cap
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            azure_endpoint: None,
            azure_api_key: None,
            azure_deployment: None,
            azure_embedding_deployment: "text-embedding-ada-002".to_string(),
            api_version: "2024-02-15-preview".to_string(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4".to_string(),
            openai_embedding_model: "text-embedding-ada-002".to_string(),
            max_tokens: 500,
        }
    }
}

impl LlmConfig {
    pub fn uses_azure_openai(&self) -> bool {
        self.azure_endpoint.is_some()
            && self.azure_api_key.is_some()
            && self.azure_deployment.is_some()
    }

    pub fn uses_openai(&self) -> bool {
        self.openai_api_key.is_some()
    }
}

/// Per-call timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub search_ms: u64,
    pub embedding_ms: u64,
    pub completion_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            search_ms: 10_000,
            embedding_ms: 10_000,
            completion_ms: 60_000,
        }
    }
}

/// Bounded retry after a failed provider call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: crate::retry::DEFAULT_MAX_RETRIES,
            base_delay_ms: 250,
        }
    }
}

impl RagConfig {
    /// Load configuration from `path` (or the default location), then
    /// overlay credentials from the environment. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let mut config = if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
            toml::from_str::<RagConfig>(&contents)
                .with_context(|| format!("Failed to parse config file {}", config_path.display()))?
        } else {
            RagConfig::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Save configuration to `path` (or the default location). Secrets are not written.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&config_path, toml_string).context("Failed to write config file")?;

        Ok(config_path)
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;

        Ok(home.join(".ragpilot").join("config.toml"))
    }

    /// Overlay values from environment-style variables
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("AZURE_SEARCH_ENDPOINT") {
            self.search.endpoint = Some(v);
        }
        if let Some(v) = get("AZURE_SEARCH_KEY") {
            self.search.api_key = Some(v);
        }
        if let Some(v) = get("AZURE_SEARCH_INDEX_NAME") {
            self.search.index_name = v;
        }
        if let Some(v) = get("AZURE_OPENAI_ENDPOINT") {
            self.llm.azure_endpoint = Some(v);
        }
        if let Some(v) = get("AZURE_OPENAI_API_KEY") {
            self.llm.azure_api_key = Some(v);
        }
        if let Some(v) = get("AZURE_OPENAI_DEPLOYMENT_NAME") {
            self.llm.azure_deployment = Some(v);
        }
        if let Some(v) = get("AZURE_OPENAI_EMBEDDING_DEPLOYMENT") {
            self.llm.azure_embedding_deployment = v;
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_API_VERSION") {
            self.llm.api_version = v;
        }
        if let Some(v) = get("OPENAI_DEPLOYMENT_NAME") {
            self.llm.openai_model = v;
        }

        self.search.endpoint = self.search.endpoint.take().map(|e| normalize_endpoint(&e));
        self.llm.azure_endpoint = self.llm.azure_endpoint.take().map(|e| normalize_endpoint(&e));
    }

    /// Check credentials and tunables. Called once at startup.
    pub fn validate(&self) -> crate::Result<()> {
        if self.search.endpoint.is_none() {
            return Err(RagError::Configuration(
                "AZURE_SEARCH_ENDPOINT is required".to_string(),
            ));
        }
        if self.search.api_key.is_none() {
            return Err(RagError::Configuration(
                "AZURE_SEARCH_KEY is required".to_string(),
            ));
        }
        if !self.llm.uses_azure_openai() && !self.llm.uses_openai() {
            return Err(RagError::Configuration(
                "Either AZURE_OPENAI_* credentials or OPENAI_API_KEY must be provided".to_string(),
            ));
        }
        if self.timeouts.search_ms == 0
            || self.timeouts.embedding_ms == 0
            || self.timeouts.completion_ms == 0
        {
            return Err(RagError::Configuration(
                "timeouts must be greater than zero".to_string(),
            ));
        }

        self.fusion.validate().map_err(RagError::Configuration)?;
        self.defaults
            .validate()
            .map_err(|e| RagError::Configuration(format!("defaults: {}", e)))?;

        Ok(())
    }
}

/// Prefix `https://` when no scheme is given and drop trailing slashes
pub fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}
