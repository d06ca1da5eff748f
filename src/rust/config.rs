// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Run configuration and the model registry
//!
//! Every field has a default, so an empty `proofbench.toml` (or none at all)
//! is a valid configuration. Command-line flags are applied on top.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::{Ablation, SamplingParams};
use crate::error::ConfigError;
use crate::executor::SandboxKind;

/// Complete configuration of one invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub run: RunSettings,
    pub context: ContextSettings,
    pub llm: LlmSettings,
    pub verify: VerifySettings,
    /// Models in addition to the built-in registry
    pub models: Vec<ModelSpec>,
}

/// Scheduling and output layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub logs_dir: PathBuf,
    /// Worker count
    pub threads: usize,
    /// Bound on one unit end to end (generation plus verification)
    pub unit_timeout_secs: u64,
    /// Model ids to evaluate
    pub models: Vec<String>,
    pub no_dependencies: bool,
    pub no_lines: bool,
    /// Re-run units that already have a stored result
    pub force: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("logs"),
            threads: num_cpus::get(),
            unit_timeout_secs: 900,
            models: vec!["gpt-4o-mini".to_string()],
            no_dependencies: false,
            no_lines: false,
            force: false,
        }
    }
}

impl RunSettings {
    pub fn ablation(&self) -> Ablation {
        Ablation::from_flags(self.no_dependencies, self.no_lines)
    }
}

/// Context window around the target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// Lines of file text before the target; `None` means from the top of the file
    pub window_lines: Option<usize>,
    /// Lines of file text after the target's proof
    pub following_lines: usize,
}

/// Model endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Overrides `OPENAI_BASE_URL`
    pub base_url: Option<String>,
    /// Sent as the `api-version` query parameter when set (Azure deployments)
    pub api_version: Option<String>,
    pub request_timeout_secs: u64,
    /// Attempts per request, including the first
    pub max_retries: u32,
    pub max_backoff_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Coq version quoted in the system prompt; detected from `coqc` when unset
    pub coq_version: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            api_version: None,
            request_timeout_secs: 600,
            max_retries: 5,
            max_backoff_secs: 35,
            temperature: 0.1,
            max_tokens: 16384,
            coq_version: None,
        }
    }
}

impl LlmSettings {
    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// Compiler invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifySettings {
    pub coqc: PathBuf,
    pub timeout_secs: u64,
    /// Feedback rounds after a failed first attempt; 0 disables the loop
    pub feedback_rounds: u32,
    pub sandbox: SandboxKind,
    /// Extra arguments appended after the project's load paths
    pub extra_args: Vec<String>,
}

impl Default for VerifySettings {
    fn default() -> Self {
        Self {
            coqc: PathBuf::from("coqc"),
            timeout_secs: 60,
            feedback_rounds: 0,
            sandbox: SandboxKind::None,
            extra_args: Vec::new(),
        }
    }
}

/// Name of the token limit parameter a model accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenParam {
    MaxTokens,
    MaxCompletionTokens,
}

/// Per-model request shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Identifier sent to the endpoint
    pub id: String,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    #[serde(default = "default_true")]
    pub supports_temperature: bool,
    #[serde(default = "default_true")]
    pub supports_system_prompt: bool,
    #[serde(default = "default_token_param")]
    pub token_param: TokenParam,
    /// Maximum prompt plus completion length in tokens
    #[serde(default = "default_context_window")]
    pub context_window: u64,
}

fn default_true() -> bool {
    true
}

fn default_token_param() -> TokenParam {
    TokenParam::MaxTokens
}

fn default_context_window() -> u64 {
    128_000
}

impl ModelSpec {
    pub fn chat(id: &str, context_window: u64) -> Self {
        Self {
            id: id.to_string(),
            reasoning_effort: None,
            supports_temperature: true,
            supports_system_prompt: true,
            token_param: TokenParam::MaxTokens,
            context_window,
        }
    }

    pub fn reasoning(id: &str, effort: &str, context_window: u64) -> Self {
        Self {
            id: id.to_string(),
            reasoning_effort: Some(effort.to_string()),
            supports_temperature: false,
            supports_system_prompt: true,
            token_param: TokenParam::MaxCompletionTokens,
            context_window,
        }
    }

    /// Directory-safe form of the id
    pub fn slug(&self) -> String {
        self.id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect()
    }
}

/// Models the harness knows about without configuration
pub fn builtin_models() -> Vec<ModelSpec> {
    vec![
        ModelSpec::chat("gpt-4o-mini", 128_000),
        ModelSpec::chat("gpt-4o", 128_000),
        ModelSpec::reasoning("o4-mini", "medium", 200_000),
        ModelSpec::chat("deepseek/deepseek-prover-v2", 163_840),
        ModelSpec::chat("deepseek/deepseek-r1-0528:free", 163_840),
    ]
}

impl RunConfig {
    /// Load from a TOML file; a missing default file yields the defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from("proofbench.toml"), false),
        };
        if !path.exists() {
            if required {
                return Err(ConfigError::Parse {
                    path,
                    message: "file not found".to_string(),
                });
            }
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Self::from_toml(&content).map_err(|message| ConfigError::Parse { path, message })
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Check ranges; returns the first invalid field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Invalid(format!(
                "llm.temperature must be in [0, 2], got {}",
                self.llm.temperature
            )));
        }
        if self.llm.max_tokens == 0 {
            return Err(ConfigError::Invalid("llm.max_tokens must be > 0".into()));
        }
        if self.llm.max_retries == 0 {
            return Err(ConfigError::Invalid("llm.max_retries must be > 0".into()));
        }
        if self.run.threads == 0 {
            return Err(ConfigError::Invalid("run.threads must be > 0".into()));
        }
        if self.run.unit_timeout_secs == 0 || self.verify.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be > 0".into()));
        }
        if self.run.models.is_empty() {
            return Err(ConfigError::Invalid("at least one model is required".into()));
        }
        for id in &self.run.models {
            self.model(id)?;
        }
        Ok(())
    }

    /// Look a model up, configured models first
    pub fn model(&self, id: &str) -> Result<ModelSpec, ConfigError> {
        self.models
            .iter()
            .cloned()
            .chain(builtin_models())
            .find(|m| m.id == id)
            .ok_or_else(|| ConfigError::UnknownModel(id.to_string()))
    }

    pub fn all_models(&self) -> Vec<ModelSpec> {
        let mut all = self.models.clone();
        for m in builtin_models() {
            if !all.iter().any(|c| c.id == m.id) {
                all.push(m);
            }
        }
        all
    }

    /// Directory holding the run log and summary of one configuration
    pub fn results_dir(&self, model: &ModelSpec, params: SamplingParams) -> PathBuf {
        self.run.logs_dir.join(format!(
            "{}-{}-{}-{}",
            self.run.ablation().slug(),
            model.slug(),
            params.temperature,
            params.max_tokens
        ))
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.run.logs_dir.join("objects").join(self.run.ablation().slug())
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.run.logs_dir.join("cache")
    }
}
