//! Simple CLI configuration loader for sandloop
//!
//! Implements single-source priority loading with flag overrides:
//! 1. --config file/dir (highest priority)
//! 2. Current working directory: ./sandloop.json or ./.sandloop/config.json
//! 3. XDG config: $XDG_CONFIG_HOME/sandloop/config.json
//! 4. Environment variables only (no files)
//!
//! Sandbox and step settings can then be overridden from the environment.

use anyhow::{anyhow, bail, Context, Result};
use sandloop_core::{ModelParams, Protocol, ResolvedLlmConfig, SandboxBackend, SandboxConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Raw configuration file format (simple single-file schema)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawConfig {
    /// Protocol to use
    pub protocol: String,
    /// API key (can be "env:VAR_NAME" for environment variable)
    pub api_key: String,
    /// Base URL (optional, uses protocol default if not specified)
    pub base_url: Option<String>,
    /// Model name
    pub model: String,
    /// Model parameters (optional)
    #[serde(default)]
    pub params: ModelParams,
    /// Additional headers (optional)
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Sandbox settings (optional)
    #[serde(default)]
    pub sandbox: SandboxConfig,
    /// Step budget (optional)
    #[serde(default)]
    pub max_steps: Option<usize>,
    /// System prompt (optional)
    #[serde(default)]
    pub system_prompt: Option<String>,
}

/// Everything a run needs from configuration
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub llm: ResolvedLlmConfig,
    pub sandbox: SandboxConfig,
    pub max_steps: Option<usize>,
    pub system_prompt: Option<String>,
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// CLI configuration loader
pub struct CliConfigLoader {
    /// Override config file/directory path
    config_override: Option<PathBuf>,
    /// Flag overrides
    protocol_override: Option<String>,
    api_key_override: Option<String>,
    base_url_override: Option<String>,
    model_override: Option<String>,
    /// Directory searched for project-local config
    search_dir: Option<PathBuf>,
    /// Source of environment variables
    env: EnvLookup,
}

impl CliConfigLoader {
    /// Create a new loader
    pub fn new() -> Self {
        Self {
            config_override: None,
            protocol_override: None,
            api_key_override: None,
            base_url_override: None,
            model_override: None,
            search_dir: None,
            env: Box::new(|key| std::env::var(key).ok().filter(|v| !v.is_empty())),
        }
    }

    /// Set config file/directory override
    pub fn with_config_override(mut self, path: PathBuf) -> Self {
        self.config_override = Some(path);
        self
    }

    /// Set protocol override
    pub fn with_protocol_override(mut self, protocol: String) -> Self {
        self.protocol_override = Some(protocol);
        self
    }

    /// Set API key override
    pub fn with_api_key_override(mut self, api_key: String) -> Self {
        self.api_key_override = Some(api_key);
        self
    }

    /// Set base URL override
    pub fn with_base_url_override(mut self, base_url: String) -> Self {
        self.base_url_override = Some(base_url);
        self
    }

    /// Set model override
    pub fn with_model_override(mut self, model: String) -> Self {
        self.model_override = Some(model);
        self
    }

    /// Search `dir` instead of the current directory
    pub fn with_search_dir(mut self, dir: PathBuf) -> Self {
        self.search_dir = Some(dir);
        self
    }

    /// Read environment variables through `lookup`
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Box::new(lookup);
        self
    }

    fn var(&self, key: &str) -> Option<String> {
        (self.env)(key)
    }

    /// Load and resolve configuration
    pub async fn load(&self) -> Result<LoadedConfig> {
        // Step 1: Find and load base configuration
        let mut config = if let Some(override_path) = &self.config_override {
            self.load_from_path(override_path).await.with_context(|| {
                format!(
                    "Failed to load config from override path: {}",
                    override_path.display()
                )
            })?
        } else {
            self.search_and_load().await?
        };

        // Step 2: Apply flag overrides
        if let Some(protocol) = &self.protocol_override {
            config.protocol = protocol.clone();
        }
        if let Some(api_key) = &self.api_key_override {
            config.api_key = api_key.clone();
        }
        if let Some(base_url) = &self.base_url_override {
            config.base_url = Some(base_url.clone());
        }
        if let Some(model) = &self.model_override {
            config.model = model.clone();
        }

        // Step 3: Environment overrides for the sandbox and step budget
        self.apply_env_overrides(&mut config)?;

        // Step 4: Resolve to final config
        let sandbox = config.sandbox.clone();
        let max_steps = config.max_steps;
        let system_prompt = config.system_prompt.clone();
        let llm = self.resolve_llm(config)?;

        Ok(LoadedConfig {
            llm,
            sandbox,
            max_steps,
            system_prompt,
        })
    }

    /// Search for config in priority order
    async fn search_and_load(&self) -> Result<RawConfig> {
        if let Some(config) = self.try_load_cwd().await? {
            return Ok(config);
        }

        if let Some(config) = self.try_load_xdg().await? {
            return Ok(config);
        }

        self.try_load_env_only()
    }

    /// Try loading from current working directory
    async fn try_load_cwd(&self) -> Result<Option<RawConfig>> {
        let cwd = match &self.search_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };

        let sandloop_json = cwd.join("sandloop.json");
        if sandloop_json.exists() {
            return Ok(Some(self.load_file(&sandloop_json).await?));
        }

        let dir_config = cwd.join(".sandloop").join("config.json");
        if dir_config.exists() {
            return Ok(Some(self.load_file(&dir_config).await?));
        }

        Ok(None)
    }

    /// Try loading from XDG config directory
    async fn try_load_xdg(&self) -> Result<Option<RawConfig>> {
        let config_dir = self
            .var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(dirs::config_dir);

        if let Some(config_dir) = config_dir {
            let config_path = config_dir.join("sandloop").join("config.json");
            if config_path.exists() {
                return Ok(Some(self.load_file(&config_path).await?));
            }
        }
        Ok(None)
    }

    /// Build a config from environment variables only
    ///
    /// `API_KEY`, `BASE_URL` and `MODEL_NAME` take precedence; otherwise a
    /// single provider key (`OPENAI_API_KEY` or `ANTHROPIC_API_KEY`) decides
    /// the protocol.
    fn try_load_env_only(&self) -> Result<RawConfig> {
        let preference = self
            .protocol_override
            .clone()
            .or_else(|| self.var("SANDLOOP_PROTOCOL"));
        let base_url = self.var("BASE_URL");
        let model_name = self.var("MODEL_NAME");

        let generic_key = self.var("API_KEY").or_else(|| self.api_key_override.clone());
        if let Some(api_key) = generic_key {
            let protocol = preference.unwrap_or_else(|| "openai".to_string());
            let model = model_name.unwrap_or_else(|| default_model(&protocol).to_string());
            return Ok(env_config(protocol, api_key, base_url, model));
        }

        let openai_key = self.var("OPENAI_API_KEY");
        let anthropic_key = self.var("ANTHROPIC_API_KEY");
        let available: Vec<&str> = [
            openai_key.as_ref().map(|_| "openai"),
            anthropic_key.as_ref().map(|_| "anthropic"),
        ]
        .into_iter()
        .flatten()
        .collect();

        let protocol = match preference.as_deref() {
            Some(preferred) if available.contains(&preferred) => preferred.to_string(),
            Some(preferred) => bail!(
                "Protocol '{}' specified but no corresponding API key found. Available keys: {}",
                preferred,
                available.join(", ")
            ),
            None => match available.as_slice() {
                [] => bail!(
                    "No configuration found. Create a sandloop.json file or set API_KEY, \
                     OPENAI_API_KEY or ANTHROPIC_API_KEY"
                ),
                [only] => only.to_string(),
                _ => bail!(
                    "Multiple API keys detected: {}. Choose one with SANDLOOP_PROTOCOL or --protocol",
                    available.join(", ")
                ),
            },
        };

        let (api_key, base_url) = match protocol.as_str() {
            "anthropic" => (anthropic_key, self.var("ANTHROPIC_BASE_URL").or(base_url)),
            _ => (openai_key, self.var("OPENAI_BASE_URL").or(base_url)),
        };
        let api_key = api_key.ok_or_else(|| anyhow!("No API key found for {}", protocol))?;
        let model = model_name.unwrap_or_else(|| default_model(&protocol).to_string());

        Ok(env_config(protocol, api_key, base_url, model))
    }

    fn apply_env_overrides(&self, config: &mut RawConfig) -> Result<()> {
        if let Some(image) = self.var("SANDBOX_IMAGE") {
            config.sandbox.image = image;
        }
        if let Some(domain) = self.var("SANDBOX_DOMAIN") {
            config.sandbox.domain = Some(domain);
        }
        if let Some(api_key) = self.var("SANDBOX_API_KEY") {
            config.sandbox.api_key = Some(api_key);
        }
        if let Some(backend) = self.var("SANDBOX_BACKEND") {
            config.sandbox.backend = SandboxBackend::parse(&backend)
                .ok_or_else(|| anyhow!("Unknown SANDBOX_BACKEND '{}'", backend))?;
        }
        if let Some(max_steps) = self.var("MAX_STEPS") {
            let steps = max_steps
                .parse::<usize>()
                .with_context(|| format!("MAX_STEPS must be a positive integer, got '{}'", max_steps))?;
            config.max_steps = Some(steps);
        }
        Ok(())
    }

    /// Load configuration from a specific path (file or directory)
    async fn load_from_path(&self, path: &Path) -> Result<RawConfig> {
        if path.is_file() {
            self.load_file(path).await
        } else if path.is_dir() {
            let config_file = path.join("config.json");
            if config_file.exists() {
                self.load_file(&config_file).await
            } else {
                Err(anyhow!(
                    "No config.json found in directory: {}",
                    path.display()
                ))
            }
        } else {
            Err(anyhow!("Config path does not exist: {}", path.display()))
        }
    }

    /// Load a single config file
    async fn load_file(&self, path: &Path) -> Result<RawConfig> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Resolve raw config to ResolvedLlmConfig
    fn resolve_llm(&self, config: RawConfig) -> Result<ResolvedLlmConfig> {
        let protocol = Protocol::parse(&config.protocol);

        // Resolve API key (handle env: prefix)
        let api_key = match config.api_key.strip_prefix("env:") {
            Some(var_name) => self
                .var(var_name)
                .ok_or_else(|| anyhow!("Environment variable not found: {}", var_name))?,
            None => config.api_key,
        };

        let base_url = match config.base_url {
            Some(url) => normalize_base_url(&url),
            None => protocol
                .default_base_url()
                .unwrap_or("http://localhost")
                .to_string(),
        };

        let resolved = ResolvedLlmConfig::new(protocol, base_url, api_key, config.model)
            .with_params(config.params)
            .with_headers(config.headers);

        resolved
            .validate()
            .map_err(|e| anyhow!("Configuration validation failed: {}", e))?;

        Ok(resolved)
    }
}

impl Default for CliConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn default_model(protocol: &str) -> &'static str {
    match protocol {
        "anthropic" => DEFAULT_ANTHROPIC_MODEL,
        "mock" => "mock-model",
        _ => DEFAULT_OPENAI_MODEL,
    }
}

fn env_config(protocol: String, api_key: String, base_url: Option<String>, model: String) -> RawConfig {
    RawConfig {
        protocol,
        api_key,
        base_url,
        model,
        params: ModelParams::default(),
        headers: HashMap::new(),
        sandbox: SandboxConfig::default(),
        max_steps: None,
        system_prompt: None,
    }
}

/// Prefix `https://` when the URL has no scheme
fn normalize_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}
