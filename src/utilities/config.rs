//! Runtime configuration.
//!
//! Resolved in three layers: built-in defaults, an optional YAML file named
//! by `ZORAL_CONFIG`, then individual environment variables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chat::engine::EngineSettings;
use crate::llms::providers::ollama::{OllamaConfig, DEFAULT_OLLAMA_URL};
use crate::utilities::errors::ZoralError;
use crate::utilities::paths::default_db_path;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoralConfig {
    /// Name the persona answers to.
    pub persona_name: String,
    /// Backend model id.
    pub model: String,
    /// Ollama server base URL.
    pub ollama_url: String,
    /// Database path; the platform data directory when unset.
    pub db_path: Option<PathBuf>,
    /// Interactions pulled into the context window.
    pub context_turns: usize,
    /// Line cap on the rolling transcript.
    pub max_transcript_lines: usize,
    pub request_timeout_secs: u64,
    pub reflection_timeout_secs: u64,
    /// HTTP listen address.
    pub bind_addr: String,
}

impl Default for ZoralConfig {
    fn default() -> Self {
        Self {
            persona_name: crate::persona::DEFAULT_PERSONA_NAME.to_string(),
            model: "zoral".to_string(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            db_path: None,
            context_turns: crate::chat::context_window::DEFAULT_CONTEXT_TURNS,
            max_transcript_lines: crate::chat::context_window::DEFAULT_MAX_LINES,
            request_timeout_secs: 120,
            reflection_timeout_secs: 60,
            bind_addr: "0.0.0.0:5000".to_string(),
        }
    }
}

impl ZoralConfig {
    /// Parse a YAML document. Missing keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ZoralError> {
        serde_yaml::from_str(yaml).map_err(|e| ZoralError::Config {
            message: format!("invalid config yaml: {}", e),
        })
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ZoralError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ZoralError::Config {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Load from `ZORAL_CONFIG` (if set) and the process environment.
    pub fn load() -> Result<Self, ZoralError> {
        let mut config = match std::env::var("ZORAL_CONFIG") {
            Ok(path) => Self::from_yaml_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        let vars: HashMap<String, String> = std::env::vars().collect();
        config.apply_overrides(&vars);
        Ok(config)
    }

    /// Apply environment-style overrides.
    ///
    /// Unparseable numbers are ignored with a warning rather than failing
    /// startup.
    pub fn apply_overrides(&mut self, vars: &HashMap<String, String>) {
        if let Some(v) = vars.get("ZORAL_PERSONA") {
            self.persona_name = v.clone();
        }
        if let Some(v) = vars.get("ZORAL_MODEL") {
            self.model = v.clone();
        }
        if let Some(v) = vars.get("OLLAMA_URL") {
            self.ollama_url = v.clone();
        }
        if let Some(v) = vars.get("ZORAL_DB") {
            self.db_path = Some(PathBuf::from(v));
        }
        if let Some(v) = vars.get("PORT") {
            match v.parse::<u16>() {
                Ok(port) => self.bind_addr = format!("0.0.0.0:{}", port),
                Err(_) => tracing::warn!(value = %v, "ignoring invalid PORT"),
            }
        }
        if let Some(v) = vars.get("ZORAL_CONTEXT_TURNS") {
            match v.parse::<usize>() {
                Ok(n) => self.context_turns = n,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid ZORAL_CONTEXT_TURNS"),
            }
        }
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(default_db_path)
    }

    pub fn ollama_config(&self) -> OllamaConfig {
        OllamaConfig {
            base_url: self.ollama_url.clone(),
            model: self.model.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            persona_name: self.persona_name.clone(),
            context_turns: self.context_turns,
            max_transcript_lines: self.max_transcript_lines,
            chat_timeout: Duration::from_secs(self.request_timeout_secs),
            reflection_timeout: Duration::from_secs(self.reflection_timeout_secs),
        }
    }
}
