//! Server configuration, loaded from environment variables at startup.

use std::path::PathBuf;

use clarity_core::embedding::DEFAULT_EMBEDDING_MODEL;
use clarity_core::generation::GenerationSettings;
use clarity_core::llm::DEFAULT_CHAT_MODEL;
use clarity_core::openai::{DEFAULT_BASE_URL, OpenAiConfig};
use clarity_core::vector_store::DEFAULT_SESSION_CAP;

/// Runtime configuration for clarity-server.
///
/// Every field has a default so the server starts without any environment
/// variables set; it then runs with the offline embedder and fallback replies.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:8000"`).
    pub bind_address: String,

    /// sqlx URL; the scheme picks the driver (`sqlite://` or `postgres://`).
    pub database_url: String,
    pub db_max_connections: u32,

    /// Directory holding the vector store snapshot and session log.
    pub vector_store_dir: PathBuf,
    /// Session messages kept in the vector store before the oldest are evicted.
    pub vector_session_cap: usize,

    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_embedding_model: String,

    /// Auth platform base URL; token checks answer 503 while unset.
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub supabase_service_role_key: Option<String>,

    /// Bearer token guarding `/api/v1/admin`; open when unset.
    pub admin_token: Option<String>,

    /// Comma-separated origin list, `*` for any.
    pub cors_allowed_origins: String,
    pub enable_docs: bool,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,
    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,
    /// Daily-rolling log file; stdout only when unset.
    pub log_file: Option<PathBuf>,

    pub max_ws_connections: usize,
    pub max_context_length: usize,
    pub max_retrieved_documents: usize,
    pub top_k_responses: usize,
    pub history_window: i64,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("CLARITY_BIND", "0.0.0.0:8000"),
            database_url: env_or("DATABASE_URL", "sqlite://clarity.db?mode=rwc"),
            db_max_connections: parse_env("CLARITY_DB_MAX_CONNECTIONS", 5),
            vector_store_dir: PathBuf::from(env_or("CHROMA_PERSIST_DIRECTORY", "./data/chroma_db")),
            vector_session_cap: parse_env("CLARITY_VECTOR_SESSION_CAP", DEFAULT_SESSION_CAP),
            openai_api_key: env_opt(&["OPENAI_API_KEY"]),
            openai_base_url: env_or("OPENAI_BASE_URL", DEFAULT_BASE_URL),
            openai_model: env_or("OPENAI_MODEL", DEFAULT_CHAT_MODEL),
            openai_embedding_model: env_or("OPENAI_EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            supabase_url: env_opt(&["SUPABASE_URL", "VITE_SUPABASE_URL"]),
            supabase_anon_key: env_opt(&["SUPABASE_ANON_KEY", "VITE_SUPABASE_ANON_KEY"]),
            supabase_service_role_key: env_opt(&["SUPABASE_SERVICE_ROLE_KEY"]),
            admin_token: env_opt(&["CLARITY_ADMIN_TOKEN"]),
            cors_allowed_origins: env_or("CLARITY_CORS_ORIGINS", "http://localhost:3000,http://localhost:5173"),
            enable_docs: env_flag("CLARITY_ENABLE_DOCS", true),
            log_level: env_or("CLARITY_LOG", "info"),
            log_json: env_flag("CLARITY_LOG_JSON", false),
            log_file: env_opt(&["CLARITY_LOG_FILE"]).map(PathBuf::from),
            max_ws_connections: parse_env("CLARITY_MAX_WS_CONNECTIONS", 256),
            max_context_length: parse_env("MAX_CONTEXT_LENGTH", 4000),
            max_retrieved_documents: parse_env("MAX_RETRIEVED_DOCUMENTS", 10),
            top_k_responses: parse_env("TOP_K_RESPONSES", 3),
            history_window: parse_env("HISTORY_WINDOW", 10),
        }
    }

    pub fn openai(&self) -> OpenAiConfig {
        OpenAiConfig::new(self.openai_base_url.clone(), self.openai_api_key.clone())
    }

    pub fn generation(&self) -> GenerationSettings {
        GenerationSettings {
            max_context_length: self.max_context_length,
            top_k_responses: self.top_k_responses,
        }
    }
}

impl Default for Config {
    /// Offline defaults: in-memory SQLite, no remote services, docs on.
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:0".into(),
            database_url: "sqlite::memory:".into(),
            db_max_connections: 1,
            vector_store_dir: PathBuf::from("./data/chroma_db"),
            vector_session_cap: DEFAULT_SESSION_CAP,
            openai_api_key: None,
            openai_base_url: DEFAULT_BASE_URL.into(),
            openai_model: DEFAULT_CHAT_MODEL.into(),
            openai_embedding_model: DEFAULT_EMBEDDING_MODEL.into(),
            supabase_url: None,
            supabase_anon_key: None,
            supabase_service_role_key: None,
            admin_token: None,
            cors_allowed_origins: "*".into(),
            enable_docs: true,
            log_level: "info".into(),
            log_json: false,
            log_file: None,
            max_ws_connections: 256,
            max_context_length: 4000,
            max_retrieved_documents: 10,
            top_k_responses: 3,
            history_window: 10,
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// First non-blank value among `keys`.
fn env_opt(keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| std::env::var(k).ok().filter(|v| !v.trim().is_empty()))
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
