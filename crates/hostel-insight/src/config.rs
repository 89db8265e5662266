// hostel-insight/crates/hostel-insight/src/config.rs

use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    /// Base URL the presentation layer should call.
    pub public_api_url: String,
    pub request_timeout_seconds: u64,

    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub llm_temperature: f32,
    pub llm_timeout_seconds: u64,
    pub embeddings_enabled: bool,
    pub embedding_model: String,

    pub hostel_db_path: PathBuf,
    pub query_timeout_seconds: u64,
    pub max_result_rows: usize,
    pub schema_pretext_path: Option<PathBuf>,

    pub knowledge_db_path: PathBuf,
    pub memory_db_path: PathBuf,
    pub kb_folder: PathBuf,
    pub reindex_on_startup: bool,

    pub retrieval_top_k: usize,
    pub memory_top_k: usize,
    pub history_limit: usize,
    pub adapter_timeout_seconds: u64,
    pub max_context_chars: usize,
    pub debug_enabled: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }

        let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".into());
        let api_port: u16 = env::var("API_PORT")
            .unwrap_or_else(|_| "8000".into())
            .parse()
            .context("API_PORT must be a port number")?;
        let public_api_url = env::var("PUBLIC_API_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", api_host, api_port));

        let llm_base_url = env::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8081".into())
            .trim_end_matches('/')
            .to_string();
        let llm_api_key = env::var("LLM_API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty());

        let schema_pretext_path = env::var("SCHEMA_PRETEXT")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            api_host,
            api_port,
            public_api_url,
            request_timeout_seconds: env::var("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "120".into())
                .parse()?,
            llm_base_url,
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
            llm_api_key,
            llm_temperature: env::var("LLM_TEMPERATURE")
                .unwrap_or_else(|_| "0".into())
                .parse()?,
            llm_timeout_seconds: env::var("LLM_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "60".into())
                .parse()?,
            embeddings_enabled: env_flag("EMBEDDINGS_ENABLED", true),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".into()),
            hostel_db_path: env::var("HOSTEL_DB_PATH")
                .unwrap_or_else(|_| "./data/hostel.db".into())
                .into(),
            query_timeout_seconds: env::var("QUERY_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "15".into())
                .parse()?,
            max_result_rows: env::var("MAX_RESULT_ROWS")
                .unwrap_or_else(|_| "1000".into())
                .parse()?,
            schema_pretext_path,
            knowledge_db_path: env::var("KNOWLEDGE_DB_PATH")
                .unwrap_or_else(|_| "./data/knowledge.db".into())
                .into(),
            memory_db_path: env::var("MEMORY_DB_PATH")
                .unwrap_or_else(|_| "./data/memory.db".into())
                .into(),
            kb_folder: env::var("KB_FOLDER")
                .unwrap_or_else(|_| "./knowledge_base".into())
                .into(),
            reindex_on_startup: env_flag("REINDEX_ON_STARTUP", false),
            retrieval_top_k: env::var("RETRIEVAL_TOP_K")
                .unwrap_or_else(|_| "6".into())
                .parse()?,
            memory_top_k: env::var("MEMORY_TOP_K")
                .unwrap_or_else(|_| "8".into())
                .parse()?,
            history_limit: env::var("HISTORY_LIMIT")
                .unwrap_or_else(|_| "10".into())
                .parse()?,
            adapter_timeout_seconds: env::var("ADAPTER_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "5".into())
                .parse()?,
            max_context_chars: env::var("MAX_CONTEXT_CHARS")
                .unwrap_or_else(|_| "6000".into())
                .parse()?,
            debug_enabled: env_flag("CHAT_DEBUG_ENABLED", true),
        })
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- API: {}:{}", self.api_host, self.api_port);
        info!("- Public API URL: {}", self.public_api_url);
        info!("- LLM: {} (model: {}, timeout: {}s)", self.llm_base_url, self.llm_model, self.llm_timeout_seconds);
        info!("- Embeddings: {} ({})", self.embeddings_enabled, self.embedding_model);
        info!("- Hostel DB: {}", self.hostel_db_path.display());
        info!("- Query limits: {}s, {} rows", self.query_timeout_seconds, self.max_result_rows);
        info!("- Knowledge DB: {}", self.knowledge_db_path.display());
        info!("- Memory DB: {}", self.memory_db_path.display());
        info!("- KB folder: {} (reindex on startup: {})", self.kb_folder.display(), self.reindex_on_startup);
        info!("- Top-k: retrieval {}, memory {}", self.retrieval_top_k, self.memory_top_k);
        info!("- Context budget: {} chars", self.max_context_chars);
        info!("- Debug responses: {}", self.debug_enabled);
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse()
            .with_context(|| format!("invalid API address {}:{}", self.api_host, self.api_port))
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_seconds)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_seconds)
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_host: "127.0.0.1".to_string(),
            api_port: 8000,
            public_api_url: "http://127.0.0.1:8000".to_string(),
            request_timeout_seconds: 120,
            llm_base_url: "http://127.0.0.1:8081".to_string(),
            llm_model: "gpt-4o-mini".to_string(),
            llm_api_key: None,
            llm_temperature: 0.0,
            llm_timeout_seconds: 60,
            embeddings_enabled: true,
            embedding_model: "text-embedding-3-small".to_string(),
            hostel_db_path: PathBuf::from("./data/hostel.db"),
            query_timeout_seconds: 15,
            max_result_rows: 1000,
            schema_pretext_path: None,
            knowledge_db_path: PathBuf::from("./data/knowledge.db"),
            memory_db_path: PathBuf::from("./data/memory.db"),
            kb_folder: PathBuf::from("./knowledge_base"),
            reindex_on_startup: false,
            retrieval_top_k: 6,
            memory_top_k: 8,
            history_limit: 10,
            adapter_timeout_seconds: 5,
            max_context_chars: 6000,
            debug_enabled: true,
        }
    }
}

/// Reads a boolean toggle; accepts `1/true/yes/on` (case-insensitive).
fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => parse_flag(&v).unwrap_or_else(|| {
            warn!("Unrecognized value '{}' for {}, using default {}", v, name, default);
            default
        }),
        Err(_) => default,
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        Config {
            api_port: 8000,
            llm_base_url: "http://127.0.0.1:8001".to_string(),
            ..Config::default()
        }
    }

    // ===== API Address Tests =====

    #[test]
    fn test_api_addr_parsing() {
        let config = create_test_config();
        let addr = config.api_addr().unwrap();

        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 8000);
    }

    #[test]
    fn test_api_addr_with_zero_address() {
        let mut config = create_test_config();
        config.api_host = "0.0.0.0".to_string();
        config.api_port = 5000;

        let addr = config.api_addr().unwrap();
        assert_eq!(addr.port(), 5000);
        assert_eq!(addr.ip().to_string(), "0.0.0.0");
    }

    #[test]
    fn test_api_addr_rejects_hostname_garbage() {
        let mut config = create_test_config();
        config.api_host = "not a host".to_string();
        assert!(config.api_addr().is_err());
    }

    // ===== Flag Parsing Tests =====

    #[test]
    fn test_parse_flag_variants() {
        assert_eq!(parse_flag("true"), Some(true));
        assert_eq!(parse_flag(" YES "), Some(true));
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    // ===== Limits Tests =====

    #[test]
    fn test_default_limits_are_positive() {
        let config = create_test_config();
        assert!(config.query_timeout_seconds > 0);
        assert!(config.llm_timeout_seconds > 0);
        assert!(config.adapter_timeout_seconds > 0);
        assert!(config.max_result_rows > 0);
        assert!(config.max_context_chars > 0);
    }

    #[test]
    fn test_adapter_timeout_shorter_than_llm_timeout() {
        let config = create_test_config();
        assert!(config.adapter_timeout() < config.llm_timeout());
    }

    #[test]
    fn test_default_temperature_is_deterministic() {
        let config = create_test_config();
        assert_eq!(config.llm_temperature, 0.0);
    }
}
