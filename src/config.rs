//! TOML configuration.
//!
//! The whole configuration is loaded once by [`load_config`] and handed to
//! every component by reference. Every section has defaults matching the
//! reference setup, so an empty file is a valid configuration.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::prompt::PromptTemplate;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            extension: default_extension(),
        }
    }
}

fn default_directory() -> PathBuf {
    PathBuf::from("~/Downloads")
}
fn default_extension() -> String {
    ".pdf".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("./indexed_hashes.txt")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_verification_query")]
    pub verification_query: String,
    #[serde(default = "default_verification_preview_chars")]
    pub verification_preview_chars: usize,
    #[serde(default = "default_search_k")]
    pub search_k: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            collection: default_collection(),
            verification_query: default_verification_query(),
            verification_preview_chars: default_verification_preview_chars(),
            search_k: default_search_k(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./data/index.sqlite")
}
fn default_collection() -> String {
    "pdf_documents".to_string()
}
fn default_verification_query() -> String {
    "Scrum".to_string()
}
fn default_verification_preview_chars() -> usize {
    100
}
fn default_search_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub max_retries: u32,
    /// Unset means requests may block indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_ollama_url(),
            model: default_model(),
            batch_size: default_batch_size(),
            max_retries: 0,
            timeout_secs: None,
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "llama3".to_string()
}
fn default_batch_size() -> usize {
    16
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            url: default_ollama_url(),
            model: default_model(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_input_variables")]
    pub input_variables: Vec<String>,
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            input_variables: default_input_variables(),
            template: default_template(),
            context_chars: default_context_chars(),
        }
    }
}

fn default_input_variables() -> Vec<String> {
    vec!["question".to_string(), "context".to_string()]
}
fn default_template() -> String {
    r#"
    You are a helpful assistant knowledgeable about the contents of the PDFs.
    Here is some context from the PDFs:
    {context}

    Q: {question}
    A:
"#
    .to_string()
}
fn default_context_chars() -> usize {
    200
}

impl PromptConfig {
    /// Builds the prompt template, checking it against the declared variables.
    pub fn template(&self) -> Result<PromptTemplate> {
        Ok(PromptTemplate::new(&self.template, &self.input_variables)?)
    }
}

impl DocumentsConfig {
    /// The source directory with a leading `~` resolved to the home directory.
    pub fn resolved_directory(&self) -> PathBuf {
        expand_home(&self.directory)
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;

    config.ledger.path = expand_home(&config.ledger.path);
    config.index.path = expand_home(&config.index.path);
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.documents.extension.is_empty() {
        bail!("documents.extension must not be empty");
    }

    if config.index.collection.trim().is_empty() {
        bail!("index.collection must not be empty");
    }
    if config.index.verification_preview_chars == 0 {
        bail!("index.verification_preview_chars must be > 0");
    }
    if config.index.search_k == 0 {
        bail!("index.search_k must be > 0");
    }

    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }

    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    check_url("embedding.url", &config.embedding.url)?;
    check_url("llm.url", &config.llm.url)?;

    if config.prompt.context_chars == 0 {
        bail!("prompt.context_chars must be > 0");
    }
    for required in ["question", "context"] {
        if !config.prompt.input_variables.iter().any(|v| v == required) {
            bail!("prompt.input_variables must include '{}'", required);
        }
    }
    config
        .prompt
        .template()
        .context("prompt.template does not match prompt.input_variables")?;

    Ok(())
}

fn check_url(key: &str, url: &str) -> Result<()> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("{} must be an http(s) URL, got '{}'", key, url);
    }
    Ok(())
}
