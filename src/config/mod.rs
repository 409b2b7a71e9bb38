use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub research: ResearchConfig,
    pub output: OutputConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
}

/// Supported chat-completion providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    DeepSeek,
    OpenAi,
}

impl LlmProvider {
    /// Provider name as used in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::DeepSeek => "deepseek",
            LlmProvider::OpenAi => "openai",
        }
    }

    /// Default API base URL for the provider
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::DeepSeek => "https://api.deepseek.com",
            LlmProvider::OpenAi => "https://api.openai.com/v1",
        }
    }

    /// Default model for the provider
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::DeepSeek => "deepseek-chat",
            LlmProvider::OpenAi => "gpt-4o-mini",
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deepseek" => Ok(LlmProvider::DeepSeek),
            "openai" => Ok(LlmProvider::OpenAi),
            _ => Err(format!("Unsupported LLM provider: {}", s)),
        }
    }
}

/// Language model configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Web search configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub api_key: String,
    pub base_url: String,
}

/// Bounds applied by the research pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchConfig {
    /// Reflection rounds executed for every section.
    pub max_reflections: u32,
    /// Advisory cap written into the outline prompt.
    pub max_sections: usize,
    pub max_search_results: usize,
    pub search_timeout_secs: u64,
    /// Per-result content cap (characters) when building synthesis prompts.
    pub max_content_length: usize,
}

/// Report output configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub output_dir: PathBuf,
    pub save_intermediate_states: bool,
}

/// Checkpoint database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration for the LLM provider
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_process_env()
    }

    /// Load configuration after reading an explicit env file
    pub fn from_env_file(path: &Path) -> Result<Self, AppError> {
        dotenvy::from_path(path).map_err(|e| AppError::Config {
            message: format!("Failed to load env file {}: {}", path.display(), e),
        })?;
        Self::from_process_env()
    }

    fn from_process_env() -> Result<Self, AppError> {
        let provider: LlmProvider = env::var("LLM_PROVIDER")
            .unwrap_or_else(|_| "deepseek".to_string())
            .parse()
            .map_err(|message| AppError::Config { message })?;

        let (key_var, model_var) = match provider {
            LlmProvider::DeepSeek => ("DEEPSEEK_API_KEY", "DEEPSEEK_MODEL"),
            LlmProvider::OpenAi => ("OPENAI_API_KEY", "OPENAI_MODEL"),
        };

        let llm = LlmConfig {
            provider,
            api_key: required_var(key_var)?,
            base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| provider.default_base_url().to_string()),
            model: env::var(model_var).unwrap_or_else(|_| provider.default_model().to_string()),
            temperature: parsed_var("LLM_TEMPERATURE", 0.7),
            max_tokens: parsed_var("LLM_MAX_TOKENS", 4000),
        };

        let search = SearchConfig {
            api_key: required_var("TAVILY_API_KEY")?,
            base_url: env::var("TAVILY_BASE_URL")
                .unwrap_or_else(|_| "https://api.tavily.com".to_string()),
        };

        let defaults = ResearchConfig::default();
        let research = ResearchConfig {
            max_reflections: parsed_var("MAX_REFLECTIONS", defaults.max_reflections),
            max_sections: env::var("MAX_SECTIONS")
                .or_else(|_| env::var("MAX_PARAGRAPHS"))
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_sections),
            max_search_results: parsed_var("MAX_SEARCH_RESULTS", defaults.max_search_results),
            search_timeout_secs: parsed_var("SEARCH_TIMEOUT", defaults.search_timeout_secs),
            max_content_length: parsed_var("MAX_CONTENT_LENGTH", defaults.max_content_length),
        };

        let output = OutputConfig {
            output_dir: PathBuf::from(env::var("OUTPUT_DIR").unwrap_or_else(|_| "reports".to_string())),
            save_intermediate_states: bool_var("SAVE_INTERMEDIATE_STATES", true),
        };

        let database = DatabaseConfig {
            enabled: bool_var("DATABASE_ENABLED", true),
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/research.db".to_string()),
            ),
            max_connections: parsed_var("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: parsed_var("REQUEST_TIMEOUT_MS", 120000),
            max_retries: parsed_var("MAX_RETRIES", 3),
            retry_delay_ms: parsed_var("RETRY_DELAY_MS", 1000),
        };

        Ok(Config {
            llm,
            search,
            research,
            output,
            database,
            logging,
            request,
        })
    }
}

fn required_var(name: &str) -> Result<String, AppError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::Config {
            message: format!("{} is required", name),
        })
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn bool_var(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

impl ResearchConfig {
    /// Search timeout as a [`Duration`]
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_reflections: 2,
            max_sections: 5,
            max_search_results: 3,
            search_timeout_secs: 240,
            max_content_length: 20000,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 120000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}
