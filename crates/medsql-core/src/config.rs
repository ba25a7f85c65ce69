// Configuration loading and parsing (assistant.toml, credentials.toml, .env).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },

    #[error("invalid database url `{url}`: expected sqlite:///<path> or a file path")]
    InvalidDatabaseUrl { url: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseSettings,
    pub llm: LlmSettings,
    pub agent: AgentSettings,
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
    pub export: ExportSettings,
    pub credentials: CredentialsConfig,
}

// ---------------------------------------------------------------------------
// assistant.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire assistant.toml file.
#[derive(Debug, Clone, Deserialize)]
struct AssistantFile {
    database: DatabaseSettings,
    llm: LlmSettings,
    agent: AgentSettings,
    cache: CacheSettings,
    #[serde(default)]
    logging: LoggingSettings,
    #[serde(default)]
    export: ExportSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// `sqlite:///path/to/file.db` or a plain file path.
    pub url: String,
    pub pool_size: u32,
    pub connection_timeout_secs: u64,
    /// Rows per table included in the schema shown to the model.
    pub sample_rows: usize,
    /// Writable SQLite file for query history and assistant state.
    #[serde(default = "default_state_path")]
    pub state_path: String,
}

fn default_state_path() -> String {
    "medsql-state.db".to_string()
}

impl DatabaseSettings {
    /// Resolve the SQLite file path from the configured URL.
    pub fn file_path(&self) -> Result<PathBuf, ConfigError> {
        sqlite_path_from_url(&self.url)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    pub api_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentSettings {
    pub max_tool_rounds: usize,
    pub max_result_rows: usize,
    /// Append query-improvement notes to answers.
    pub rewrite_notes: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub query_results_capacity: usize,
    pub schema_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportSettings {
    pub dir: Option<String>,
}

impl ExportSettings {
    /// Directory exports are written to. Falls back to the per-user data
    /// directory, then to `./exports`.
    pub fn resolve_dir(&self) -> PathBuf {
        if let Some(dir) = self.dir.as_deref().filter(|d| !d.trim().is_empty()) {
            return PathBuf::from(dir);
        }
        directories::ProjectDirs::from("", "", "medsql")
            .map(|dirs| dirs.data_local_dir().join("exports"))
            .unwrap_or_else(|| PathBuf::from("exports"))
    }
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub groq_api_key: Option<String>,
    /// Accepted for compatibility with existing `.env` files; unused.
    pub agno_api_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/assistant.toml` and
/// (optionally) `config/credentials.toml` relative to `base_dir`, then apply
/// environment overrides through `env`.
///
/// `env` is the variable lookup; `load_config()` passes `std::env::var`.
/// This does not auto-copy defaults.
pub fn load_config_from(
    base_dir: &Path,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- assistant.toml (required) ---
    let assistant_path = config_dir.join("assistant.toml");
    let assistant_text = read_file(&assistant_path)?;
    let file: AssistantFile =
        toml::from_str(&assistant_text).map_err(|e| ConfigError::ParseError {
            path: assistant_path.clone(),
            source: e,
        })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let mut config = Config {
        database: file.database,
        llm: file.llm,
        agent: file.agent,
        cache: file.cache,
        logging: file.logging,
        export: file.export,
        credentials,
    };

    apply_env_overrides(&mut config, env);
    validate(&config)?;

    Ok(config)
}

/// Apply `DATABASE_URL`, `LOG_LEVEL`, `GROQ_API_KEY` and `AGNO_API_KEY`.
/// Empty values are ignored.
pub fn apply_env_overrides(config: &mut Config, env: &dyn Fn(&str) -> Option<String>) {
    let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = non_empty("DATABASE_URL") {
        config.database.url = url;
    }
    if let Some(level) = non_empty("LOG_LEVEL") {
        config.logging.level = level.to_lowercase();
    }
    if let Some(key) = non_empty("GROQ_API_KEY") {
        config.credentials.groq_api_key = Some(key);
    }
    if let Some(key) = non_empty("AGNO_API_KEY") {
        config.credentials.agno_api_key = Some(key);
    }
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads `.env`, copies defaults, and loads config
/// relative to the current working directory using the process environment.
pub fn load_config() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();

    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd, &|key| std::env::var(key).ok())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

/// Strip the `sqlite:///` (or `sqlite://`) scheme from a database URL.
/// Bare paths pass through unchanged.
pub fn sqlite_path_from_url(url: &str) -> Result<PathBuf, ConfigError> {
    let trimmed = url.trim();
    let path = trimmed
        .strip_prefix("sqlite:///")
        .or_else(|| trimmed.strip_prefix("sqlite://"))
        .unwrap_or(trimmed);

    if path.is_empty() || path.contains("://") {
        return Err(ConfigError::InvalidDatabaseUrl {
            url: url.to_string(),
        });
    }
    Ok(PathBuf::from(path))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    config.database.file_path()?;

    let positive: &[(&str, u64)] = &[
        ("database.pool_size", config.database.pool_size as u64),
        (
            "database.connection_timeout_secs",
            config.database.connection_timeout_secs,
        ),
        ("llm.max_tokens", config.llm.max_tokens as u64),
        ("llm.request_timeout_secs", config.llm.request_timeout_secs),
        ("agent.max_tool_rounds", config.agent.max_tool_rounds as u64),
        ("agent.max_result_rows", config.agent.max_result_rows as u64),
        (
            "cache.query_results_capacity",
            config.cache.query_results_capacity as u64,
        ),
    ];
    for (name, val) in positive {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    let temp = config.llm.temperature;
    if !(0.0..=2.0).contains(&temp) {
        return Err(ConfigError::ValidationError {
            field: "llm.temperature".into(),
            message: format!("must be between 0.0 and 2.0 inclusive, got {temp}"),
        });
    }

    if config.llm.model.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "llm.model".into(),
            message: "must not be empty".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    /// The workspace root holding `defaults/`.
    fn project_root() -> PathBuf {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        assert!(
            root.join("defaults").exists(),
            "Cannot locate defaults/ directory from {:?}",
            root
        );
        root
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    /// Fresh temp dir with config/assistant.toml copied from defaults.
    fn temp_config_dir(name: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        fs::copy(
            project_root().join("defaults/assistant.toml"),
            tmp.join("config/assistant.toml"),
        )
        .unwrap();
        tmp
    }

    #[test]
    fn load_valid_config_from_defaults() {
        let tmp = temp_config_dir("medsql_config_valid");
        let config = load_config_from(&tmp, &no_env).expect("should load valid config");

        assert_eq!(config.database.url, "sqlite:///medical_practice.db");
        assert_eq!(config.database.pool_size, 4);
        assert_eq!(config.database.sample_rows, 3);
        assert_eq!(config.database.state_path, "medsql-state.db");
        assert_eq!(
            config.llm.model,
            "meta-llama/llama-4-scout-17b-16e-instruct"
        );
        assert_eq!(config.llm.request_timeout_secs, 60);
        assert_eq!(config.agent.max_result_rows, 100);
        assert!(config.agent.rewrite_notes);
        assert_eq!(config.cache.query_results_capacity, 100);
        assert_eq!(config.cache.schema_ttl_secs, 300);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.export.dir.as_deref(), Some("exports"));
        assert!(config.credentials.groq_api_key.is_none());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn credentials_toml_with_api_key() {
        let tmp = temp_config_dir("medsql_config_with_creds");
        fs::write(
            tmp.join("config/credentials.toml"),
            "groq_api_key = \"gsk-test-key\"\n",
        )
        .unwrap();

        let config = load_config_from(&tmp, &no_env).expect("should load with credentials.toml");
        assert_eq!(
            config.credentials.groq_api_key.as_deref(),
            Some("gsk-test-key")
        );

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn env_overrides_take_precedence() {
        let tmp = temp_config_dir("medsql_config_env");
        fs::write(
            tmp.join("config/credentials.toml"),
            "groq_api_key = \"from-file\"\n",
        )
        .unwrap();

        let vars: HashMap<&str, &str> = [
            ("DATABASE_URL", "sqlite:///other.db"),
            ("GROQ_API_KEY", "from-env"),
            ("LOG_LEVEL", "DEBUG"),
            ("AGNO_API_KEY", ""),
        ]
        .into_iter()
        .collect();
        let env = |key: &str| vars.get(key).map(|v| v.to_string());

        let config = load_config_from(&tmp, &env).unwrap();
        assert_eq!(config.database.url, "sqlite:///other.db");
        assert_eq!(config.credentials.groq_api_key.as_deref(), Some("from-env"));
        assert_eq!(config.logging.level, "debug");
        // Empty values do not override.
        assert!(config.credentials.agno_api_key.is_none());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn sqlite_url_forms() {
        assert_eq!(
            sqlite_path_from_url("sqlite:///medical_practice.db").unwrap(),
            PathBuf::from("medical_practice.db")
        );
        assert_eq!(
            sqlite_path_from_url("sqlite://data/x.db").unwrap(),
            PathBuf::from("data/x.db")
        );
        assert_eq!(
            sqlite_path_from_url("plain.db").unwrap(),
            PathBuf::from("plain.db")
        );
        assert!(matches!(
            sqlite_path_from_url("sqlite:///"),
            Err(ConfigError::InvalidDatabaseUrl { .. })
        ));
        assert!(matches!(
            sqlite_path_from_url("postgres://host/db"),
            Err(ConfigError::InvalidDatabaseUrl { .. })
        ));
    }

    #[test]
    fn rejects_invalid_database_url() {
        let tmp = temp_config_dir("medsql_config_bad_url");
        let env = |key: &str| (key == "DATABASE_URL").then(|| "mysql://db".to_string());

        let err = load_config_from(&tmp, &env).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDatabaseUrl { .. }));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_zero_pool_size() {
        let tmp = temp_config_dir("medsql_config_zero_pool");
        let text = fs::read_to_string(tmp.join("config/assistant.toml")).unwrap();
        fs::write(
            tmp.join("config/assistant.toml"),
            text.replace("pool_size = 4", "pool_size = 0"),
        )
        .unwrap();

        let err = load_config_from(&tmp, &no_env).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "database.pool_size");
            }
            other => panic!("expected ValidationError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_temperature_out_of_range() {
        let tmp = temp_config_dir("medsql_config_temperature");
        let text = fs::read_to_string(tmp.join("config/assistant.toml")).unwrap();
        fs::write(
            tmp.join("config/assistant.toml"),
            text.replace("temperature = 0.1", "temperature = 3.5"),
        )
        .unwrap();

        let err = load_config_from(&tmp, &no_env).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "llm.temperature");
            }
            other => panic!("expected ValidationError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn file_not_found_for_missing_assistant_toml() {
        let tmp = std::env::temp_dir().join("medsql_config_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();

        let err = load_config_from(&tmp, &no_env).unwrap_err();
        match &err {
            ConfigError::FileNotFound { path } => {
                assert!(path.ends_with("assistant.toml"));
            }
            other => panic!("expected FileNotFound, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn parse_error_for_invalid_toml() {
        let tmp = std::env::temp_dir().join("medsql_config_invalid_toml");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        fs::write(tmp.join("config/assistant.toml"), "this is not valid [[[ toml").unwrap();

        let err = load_config_from(&tmp, &no_env).unwrap_err();
        match &err {
            ConfigError::ParseError { path, .. } => {
                assert!(path.ends_with("assistant.toml"));
            }
            other => panic!("expected ParseError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_copies_missing_files() {
        let tmp = std::env::temp_dir().join("medsql_config_ensure_copies");
        let _ = fs::remove_dir_all(&tmp);

        let defaults_dir = tmp.join("defaults");
        fs::create_dir_all(&defaults_dir).unwrap();
        fs::copy(
            project_root().join("defaults/assistant.toml"),
            defaults_dir.join("assistant.toml"),
        )
        .unwrap();
        fs::write(
            defaults_dir.join("credentials.toml.example"),
            "groq_api_key = \"gsk_...\"\n",
        )
        .unwrap();

        assert!(!tmp.join("config").exists());

        let copied = ensure_config_files(&tmp).expect("should succeed");
        assert_eq!(copied.len(), 1);
        assert!(tmp.join("config/assistant.toml").exists());
        assert!(!tmp.join("config/credentials.toml.example").exists());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_skips_existing() {
        let tmp = std::env::temp_dir().join("medsql_config_ensure_skips");
        let _ = fs::remove_dir_all(&tmp);

        let defaults_dir = tmp.join("defaults");
        let config_dir = tmp.join("config");
        fs::create_dir_all(&defaults_dir).unwrap();
        fs::create_dir_all(&config_dir).unwrap();
        fs::copy(
            project_root().join("defaults/assistant.toml"),
            defaults_dir.join("assistant.toml"),
        )
        .unwrap();
        fs::write(config_dir.join("assistant.toml"), "# custom\n").unwrap();

        let copied = ensure_config_files(&tmp).expect("should succeed");
        assert!(copied.is_empty());

        let content = fs::read_to_string(config_dir.join("assistant.toml")).unwrap();
        assert_eq!(content, "# custom\n");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_errors_when_both_dirs_missing() {
        let tmp = std::env::temp_dir().join("medsql_config_both_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        let err = ensure_config_files(&tmp).unwrap_err();
        match &err {
            ConfigError::DefaultsCopyError { message } => {
                assert!(message.contains("neither defaults/ nor config/"));
            }
            other => panic!("expected DefaultsCopyError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn export_dir_prefers_configured_value() {
        let settings = ExportSettings {
            dir: Some("out".to_string()),
        };
        assert_eq!(settings.resolve_dir(), PathBuf::from("out"));

        let blank = ExportSettings {
            dir: Some("  ".to_string()),
        };
        assert!(blank.resolve_dir().ends_with("exports"));
    }
}
