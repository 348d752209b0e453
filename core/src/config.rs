use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::dispatcher::DispatchConfig;
use crate::sandbox::{Preopen, SandboxConfig};

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const MOONSHOT_BASE_URL: &str = "https://api.moonshot.cn/v1";
pub const DEFAULT_MODEL: &str = "moonshotai/kimi-k2";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("no API key found; set OPENROUTER_API_KEY or MOONSHOT_API_KEY")]
    MissingApiKey,
    #[error("{var} has an invalid value '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// Which OpenAI-compatible endpoint the credentials belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    OpenRouter,
    Moonshot,
}

impl Backend {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Backend::OpenRouter => OPENROUTER_BASE_URL,
            Backend::Moonshot => MOONSHOT_BASE_URL,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub backend: Backend,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolsConfig {
    /// Root that file-operation paths are resolved against.
    pub workspace_dir: PathBuf,
    pub visualization_dir: PathBuf,
    /// SearXNG-style JSON search endpoint; synthetic results when unset.
    pub search_endpoint: Option<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::from("."),
            visualization_dir: PathBuf::from("visualizations"),
            search_endpoint: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub llm: LlmConfig,
    pub dispatch: DispatchConfig,
    pub tools: ToolsConfig,
    pub sandbox: SandboxConfig,
    pub output_dir: PathBuf,
    pub report_dir: PathBuf,
}

impl Settings {
    /// Load from the process environment, after merging a `.env` file if one
    /// exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let settings = Self::from_lookup(|key| std::env::var(key).ok())?;
        info!(
            backend = ?settings.llm.backend,
            model = %settings.llm.model,
            max_iterations = settings.dispatch.max_iterations,
            "configuration loaded"
        );
        Ok(settings)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let (backend, api_key) = if let Some(key) = get("OPENROUTER_API_KEY") {
            (Backend::OpenRouter, key)
        } else if let Some(key) = get("MOONSHOT_API_KEY") {
            (Backend::Moonshot, key)
        } else {
            return Err(ConfigError::MissingApiKey);
        };

        let llm = LlmConfig {
            backend,
            api_key,
            base_url: get("AGENT_BASE_URL").unwrap_or_else(|| backend.default_base_url().to_string()),
            model: get("AGENT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: parse(&get, "AGENT_MAX_TOKENS", 4096)?,
            temperature: parse(&get, "AGENT_TEMPERATURE", 0.7)?,
        };

        let dispatch = DispatchConfig {
            max_iterations: parse(&get, "AGENT_MAX_ITERATIONS", 10)?,
            ..DispatchConfig::default()
        };
        if dispatch.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                var: "AGENT_MAX_ITERATIONS",
                value: "0".into(),
            });
        }

        let tools = ToolsConfig {
            workspace_dir: get("AGENT_WORKSPACE_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
            visualization_dir: get("AGENT_VISUALIZATION_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("visualizations")),
            search_endpoint: get("SEARCH_ENDPOINT"),
        };

        let defaults = SandboxConfig::default();
        let memory_mb: usize = parse(&get, "SANDBOX_MAX_MEMORY_MB", defaults.max_memory_bytes >> 20)?;
        let max_memory_bytes = memory_mb.checked_mul(1 << 20).ok_or_else(|| ConfigError::Invalid {
            var: "SANDBOX_MAX_MEMORY_MB",
            value: memory_mb.to_string(),
        })?;
        let sandbox = SandboxConfig {
            interpreter: get("SANDBOX_INTERPRETER").map(PathBuf::from),
            interpreter_args: get("SANDBOX_INTERPRETER_ARGS")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or(defaults.interpreter_args),
            fuel: parse(&get, "SANDBOX_FUEL", defaults.fuel)?,
            timeout: Duration::from_secs(parse(&get, "SANDBOX_TIMEOUT_SECS", defaults.timeout.as_secs())?),
            max_memory_bytes,
            max_output_bytes: defaults.max_output_bytes,
            preopens: get("SANDBOX_PREOPEN").map(|v| parse_preopens(&v)).unwrap_or_default(),
        };

        Ok(Self {
            llm,
            dispatch,
            tools,
            sandbox,
            output_dir: get("AGENT_OUTPUT_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("agentic_outputs")),
            report_dir: get("AGENT_REPORT_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("reports")),
        })
    }
}

fn parse<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

/// `host[:guest],host[:guest]`; the guest path defaults to the host path.
fn parse_preopens(value: &str) -> Vec<Preopen> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((host, guest)) => Preopen {
                host: PathBuf::from(host),
                guest: guest.to_string(),
            },
            None => Preopen {
                host: PathBuf::from(entry),
                guest: entry.to_string(),
            },
        })
        .collect()
}
