use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub whatsapp: WhatsAppConfig,
    pub catalog: CatalogConfig,
    pub company: CompanyConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: SecretString,
    /// Chat-completions endpoint base. Defaults to the xAI API; point it at
    /// OpenRouter or any OpenAI-compatible gateway to swap providers.
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct WhatsAppConfig {
    pub api_url: String,
    pub api_key: SecretString,
    pub instance: String,
    pub manager_phone: Option<String>,
}

#[derive(Clone, Debug)]
pub struct CatalogConfig {
    /// Endpoint serving the published price table as a JSON array.
    pub source_url: String,
    pub cache_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CompanyConfig {
    pub agent_name: String,
    pub company_name: String,
    pub quote_validity_days: i64,
    pub max_history_messages: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Base URL under which stored quote artifacts are publicly reachable.
    pub public_base_url: String,
    pub artifact_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub whatsapp_api_url: Option<String>,
    pub whatsapp_api_key: Option<String>,
    pub whatsapp_instance: Option<String>,
    pub manager_phone: Option<String>,
    pub catalog_source_url: Option<String>,
    pub public_base_url: Option<String>,
    pub artifact_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://orcabot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                api_key: String::new().into(),
                base_url: "https://api.x.ai/v1".to_string(),
                model: "grok-2-latest".to_string(),
                timeout_secs: 60,
                max_retries: 2,
            },
            whatsapp: WhatsAppConfig {
                api_url: String::new(),
                api_key: String::new().into(),
                instance: String::new(),
                manager_phone: None,
            },
            catalog: CatalogConfig { source_url: String::new(), cache_ttl_secs: 600 },
            company: CompanyConfig {
                agent_name: "Ana Laura".to_string(),
                company_name: "Empresa".to_string(),
                quote_validity_days: 7,
                max_history_messages: 20,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                public_base_url: "http://localhost:8000".to_string(),
                artifact_dir: PathBuf::from("artifacts"),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("orcabot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = secret_value(llm_api_key_value);
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(whatsapp) = patch.whatsapp {
            if let Some(api_url) = whatsapp.api_url {
                self.whatsapp.api_url = api_url;
            }
            if let Some(whatsapp_api_key_value) = whatsapp.api_key {
                self.whatsapp.api_key = secret_value(whatsapp_api_key_value);
            }
            if let Some(instance) = whatsapp.instance {
                self.whatsapp.instance = instance;
            }
            if let Some(manager_phone) = whatsapp.manager_phone {
                self.whatsapp.manager_phone = Some(manager_phone);
            }
        }

        if let Some(catalog) = patch.catalog {
            if let Some(source_url) = catalog.source_url {
                self.catalog.source_url = source_url;
            }
            if let Some(cache_ttl_secs) = catalog.cache_ttl_secs {
                self.catalog.cache_ttl_secs = cache_ttl_secs;
            }
        }

        if let Some(company) = patch.company {
            if let Some(agent_name) = company.agent_name {
                self.company.agent_name = agent_name;
            }
            if let Some(company_name) = company.company_name {
                self.company.company_name = company_name;
            }
            if let Some(quote_validity_days) = company.quote_validity_days {
                self.company.quote_validity_days = quote_validity_days;
            }
            if let Some(max_history_messages) = company.max_history_messages {
                self.company.max_history_messages = max_history_messages;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(public_base_url) = server.public_base_url {
                self.server.public_base_url = public_base_url;
            }
            if let Some(artifact_dir) = server.artifact_dir {
                self.server.artifact_dir = artifact_dir;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ORCABOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("ORCABOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("ORCABOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ORCABOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("ORCABOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ORCABOT_LLM_API_KEY") {
            self.llm.api_key = secret_value(value);
        }
        if let Some(value) = read_env("ORCABOT_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("ORCABOT_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("ORCABOT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("ORCABOT_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("ORCABOT_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("ORCABOT_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("ORCABOT_WHATSAPP_API_URL") {
            self.whatsapp.api_url = value;
        }
        if let Some(value) = read_env("ORCABOT_WHATSAPP_API_KEY") {
            self.whatsapp.api_key = secret_value(value);
        }
        if let Some(value) = read_env("ORCABOT_WHATSAPP_INSTANCE") {
            self.whatsapp.instance = value;
        }
        if let Some(value) = read_env("ORCABOT_MANAGER_PHONE") {
            self.whatsapp.manager_phone = Some(value);
        }

        if let Some(value) = read_env("ORCABOT_CATALOG_SOURCE_URL") {
            self.catalog.source_url = value;
        }
        if let Some(value) = read_env("ORCABOT_CATALOG_CACHE_TTL_SECS") {
            self.catalog.cache_ttl_secs = parse_u64("ORCABOT_CATALOG_CACHE_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("ORCABOT_AGENT_NAME") {
            self.company.agent_name = value;
        }
        if let Some(value) = read_env("ORCABOT_COMPANY_NAME") {
            self.company.company_name = value;
        }
        if let Some(value) = read_env("ORCABOT_QUOTE_VALIDITY_DAYS") {
            self.company.quote_validity_days = parse_i64("ORCABOT_QUOTE_VALIDITY_DAYS", &value)?;
        }
        if let Some(value) = read_env("ORCABOT_MAX_HISTORY_MESSAGES") {
            self.company.max_history_messages = parse_u32("ORCABOT_MAX_HISTORY_MESSAGES", &value)?;
        }

        if let Some(value) = read_env("ORCABOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ORCABOT_SERVER_PORT") {
            self.server.port = parse_u16("ORCABOT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("ORCABOT_SERVER_PUBLIC_BASE_URL") {
            self.server.public_base_url = value;
        }
        if let Some(value) = read_env("ORCABOT_SERVER_ARTIFACT_DIR") {
            self.server.artifact_dir = PathBuf::from(value);
        }

        let log_level = read_env("ORCABOT_LOGGING_LEVEL").or_else(|| read_env("ORCABOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ORCABOT_LOGGING_FORMAT").or_else(|| read_env("ORCABOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = secret_value(llm_api_key);
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = llm_base_url;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(whatsapp_api_url) = overrides.whatsapp_api_url {
            self.whatsapp.api_url = whatsapp_api_url;
        }
        if let Some(whatsapp_api_key) = overrides.whatsapp_api_key {
            self.whatsapp.api_key = secret_value(whatsapp_api_key);
        }
        if let Some(whatsapp_instance) = overrides.whatsapp_instance {
            self.whatsapp.instance = whatsapp_instance;
        }
        if let Some(manager_phone) = overrides.manager_phone {
            self.whatsapp.manager_phone = Some(manager_phone);
        }
        if let Some(catalog_source_url) = overrides.catalog_source_url {
            self.catalog.source_url = catalog_source_url;
        }
        if let Some(public_base_url) = overrides.public_base_url {
            self.server.public_base_url = public_base_url;
        }
        if let Some(artifact_dir) = overrides.artifact_dir {
            self.server.artifact_dir = artifact_dir;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_whatsapp(&self.whatsapp)?;
        validate_catalog(&self.catalog)?;
        validate_company(&self.company)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("orcabot.toml"), PathBuf::from("config/orcabot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.api_key is required (xAI or OpenRouter key)".to_string(),
        ));
    }

    if !llm.base_url.starts_with("http://") && !llm.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_whatsapp(whatsapp: &WhatsAppConfig) -> Result<(), ConfigError> {
    if whatsapp.api_url.trim().is_empty() {
        return Err(ConfigError::Validation(
            "whatsapp.api_url is required (Evolution API base URL)".to_string(),
        ));
    }
    if !whatsapp.api_url.starts_with("http://") && !whatsapp.api_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "whatsapp.api_url must start with http:// or https://".to_string(),
        ));
    }
    if whatsapp.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation("whatsapp.api_key is required".to_string()));
    }
    if whatsapp.instance.trim().is_empty() {
        return Err(ConfigError::Validation(
            "whatsapp.instance is required (Evolution instance name)".to_string(),
        ));
    }

    Ok(())
}

fn validate_catalog(catalog: &CatalogConfig) -> Result<(), ConfigError> {
    if catalog.source_url.trim().is_empty() {
        return Err(ConfigError::Validation(
            "catalog.source_url is required (published price table endpoint)".to_string(),
        ));
    }
    if catalog.cache_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "catalog.cache_ttl_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_company(company: &CompanyConfig) -> Result<(), ConfigError> {
    if company.quote_validity_days <= 0 {
        return Err(ConfigError::Validation(
            "company.quote_validity_days must be greater than zero".to_string(),
        ));
    }
    if company.max_history_messages == 0 {
        return Err(ConfigError::Validation(
            "company.max_history_messages must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }
    if !server.public_base_url.starts_with("http://")
        && !server.public_base_url.starts_with("https://")
    {
        return Err(ConfigError::Validation(
            "server.public_base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    whatsapp: Option<WhatsAppPatch>,
    catalog: Option<CatalogPatch>,
    company: Option<CompanyPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct WhatsAppPatch {
    api_url: Option<String>,
    api_key: Option<String>,
    instance: Option<String>,
    manager_phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogPatch {
    source_url: Option<String>,
    cache_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CompanyPatch {
    agent_name: Option<String>,
    company_name: Option<String>,
    quote_validity_days: Option<i64>,
    max_history_messages: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    public_base_url: Option<String>,
    artifact_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    const REQUIRED_VARS: &[(&str, &str)] = &[
        ("ORCABOT_LLM_API_KEY", "xai-test-key"),
        ("ORCABOT_WHATSAPP_API_URL", "https://evolution.test"),
        ("ORCABOT_WHATSAPP_API_KEY", "evo-test-key"),
        ("ORCABOT_WHATSAPP_INSTANCE", "vendas"),
        ("ORCABOT_CATALOG_SOURCE_URL", "https://catalog.test/precos.json"),
    ];

    fn set_required_vars() {
        for (key, value) in REQUIRED_VARS {
            env::set_var(key, value);
        }
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
        for (key, _) in REQUIRED_VARS {
            env::remove_var(key);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();
        // Interpolate into a field with no `ORCABOT_*` override in this
        // fixture, so the env layer cannot mask the file layer.
        env::set_var("TEST_AGENT_NAME", "Ana de Teste");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("orcabot.toml");
            fs::write(
                &path,
                r#"
[company]
agent_name = "${TEST_AGENT_NAME}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.company.agent_name == "Ana de Teste",
                "agent name should be interpolated from environment",
            )
        })();

        clear_vars(&["TEST_AGENT_NAME"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();
        env::set_var("ORCABOT_LOG_LEVEL", "warn");
        env::set_var("ORCABOT_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warn log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )
        })();

        clear_vars(&["ORCABOT_LOG_LEVEL", "ORCABOT_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();
        env::set_var("ORCABOT_DATABASE_URL", "sqlite://from-env.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("orcabot.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")
        })();

        clear_vars(&["ORCABOT_DATABASE_URL"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();
        env::remove_var("ORCABOT_LLM_API_KEY");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_key")
            );
            ensure(has_message, "validation failure should mention llm.api_key")
        })();

        clear_vars(&[]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("xai-test-key"), "debug output should not contain llm key")?;
            ensure(
                !debug.contains("evo-test-key"),
                "debug output should not contain whatsapp key",
            )
        })();

        clear_vars(&[]);
        result
    }
}
