//! Config environment variable tests
//!
//! These tests verify that Config::from_env() reads required keys and
//! applies environment variable overrides.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use serial_test::serial;
use std::env;
use std::io::Write;
use std::time::Duration;

use deep_research::config::{Config, LlmProvider, LogFormat};
use deep_research::AppError;

const OVERRIDES: &[&str] = &[
    "LLM_PROVIDER",
    "LLM_BASE_URL",
    "DEEPSEEK_MODEL",
    "OPENAI_API_KEY",
    "OPENAI_MODEL",
    "MAX_REFLECTIONS",
    "MAX_SECTIONS",
    "MAX_PARAGRAPHS",
    "SEARCH_TIMEOUT",
    "SAVE_INTERMEDIATE_STATES",
    "DATABASE_ENABLED",
    "DATABASE_PATH",
    "LOG_FORMAT",
    "REQUEST_TIMEOUT_MS",
    "MAX_RETRIES",
];

/// Set the required keys and clear every override.
fn reset_env() {
    env::set_var("DEEPSEEK_API_KEY", "sk-test");
    env::set_var("TAVILY_API_KEY", "tvly-test");
    for name in OVERRIDES {
        env::remove_var(name);
    }
}

#[test]
#[serial]
fn test_config_defaults() {
    reset_env();

    let config = Config::from_env().unwrap();
    assert_eq!(config.llm.provider, LlmProvider::DeepSeek);
    assert_eq!(config.llm.api_key, "sk-test");
    assert_eq!(config.llm.model, "deepseek-chat");
    assert_eq!(config.llm.base_url, "https://api.deepseek.com");
    assert_eq!(config.search.api_key, "tvly-test");
    assert_eq!(config.research.max_reflections, 2);
    assert_eq!(config.research.max_sections, 5);
    assert_eq!(config.research.search_timeout(), Duration::from_secs(240));
    assert!(config.output.save_intermediate_states);
    assert_eq!(config.logging.format, LogFormat::Pretty);
}

#[test]
#[serial]
fn test_config_missing_search_key() {
    reset_env();
    env::remove_var("TAVILY_API_KEY");

    let err = Config::from_env().unwrap_err();
    assert!(matches!(err, AppError::Config { .. }));
    assert!(err.to_string().contains("TAVILY_API_KEY"));

    env::set_var("TAVILY_API_KEY", "tvly-test");
}

#[test]
#[serial]
fn test_config_blank_key_is_missing() {
    reset_env();
    env::set_var("DEEPSEEK_API_KEY", "   ");

    let err = Config::from_env().unwrap_err();
    assert!(err.to_string().contains("DEEPSEEK_API_KEY"));

    env::set_var("DEEPSEEK_API_KEY", "sk-test");
}

#[test]
#[serial]
fn test_config_openai_provider() {
    reset_env();
    env::set_var("LLM_PROVIDER", "openai");
    env::set_var("OPENAI_API_KEY", "sk-openai");
    env::set_var("OPENAI_MODEL", "gpt-4o");

    let config = Config::from_env().unwrap();
    assert_eq!(config.llm.provider, LlmProvider::OpenAi);
    assert_eq!(config.llm.api_key, "sk-openai");
    assert_eq!(config.llm.model, "gpt-4o");
    assert_eq!(config.llm.base_url, "https://api.openai.com/v1");

    reset_env();
}

#[test]
#[serial]
fn test_config_unknown_provider() {
    reset_env();
    env::set_var("LLM_PROVIDER", "claude");

    let err = Config::from_env().unwrap_err();
    assert!(err.to_string().contains("Unsupported LLM provider"));

    reset_env();
}

#[test]
#[serial]
fn test_config_research_overrides() {
    reset_env();
    env::set_var("MAX_REFLECTIONS", "4");
    env::set_var("MAX_PARAGRAPHS", "7");
    env::set_var("SEARCH_TIMEOUT", "30");

    let config = Config::from_env().unwrap();
    assert_eq!(config.research.max_reflections, 4);
    assert_eq!(config.research.max_sections, 7);
    assert_eq!(config.research.search_timeout(), Duration::from_secs(30));

    // MAX_SECTIONS wins over the legacy name.
    env::set_var("MAX_SECTIONS", "3");
    let config = Config::from_env().unwrap();
    assert_eq!(config.research.max_sections, 3);

    reset_env();
}

#[test]
#[serial]
fn test_config_invalid_number_uses_default() {
    reset_env();
    env::set_var("MAX_REFLECTIONS", "many");

    let config = Config::from_env().unwrap();
    assert_eq!(config.research.max_reflections, 2);

    reset_env();
}

#[test]
#[serial]
fn test_config_output_and_database_overrides() {
    reset_env();
    env::set_var("SAVE_INTERMEDIATE_STATES", "false");
    env::set_var("DATABASE_ENABLED", "false");
    env::set_var("DATABASE_PATH", "/custom/path.db");
    env::set_var("LOG_FORMAT", "json");
    env::set_var("REQUEST_TIMEOUT_MS", "60000");
    env::set_var("MAX_RETRIES", "5");

    let config = Config::from_env().unwrap();
    assert!(!config.output.save_intermediate_states);
    assert!(!config.database.enabled);
    assert_eq!(config.database.path.to_str().unwrap(), "/custom/path.db");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.request.timeout_ms, 60000);
    assert_eq!(config.request.max_retries, 5);

    reset_env();
}

#[test]
#[serial]
fn test_config_from_env_file() {
    reset_env();
    env::remove_var("TAVILY_API_KEY");

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "TAVILY_API_KEY=tvly-from-file").unwrap();
    writeln!(file, "MAX_REFLECTIONS=1").unwrap();

    let config = Config::from_env_file(file.path()).unwrap();
    assert_eq!(config.search.api_key, "tvly-from-file");
    assert_eq!(config.research.max_reflections, 1);

    reset_env();
}

#[test]
#[serial]
fn test_config_missing_env_file() {
    reset_env();
    let err = Config::from_env_file(std::path::Path::new("/nonexistent/.env")).unwrap_err();
    assert!(matches!(err, AppError::Config { .. }));
}
