use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use shopper_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    let llm_api_key = if config.llm.api_key.is_none() {
        "<unset>".to_string()
    } else if config.llm.is_demo_mode() {
        "<placeholder> (demo mode)".to_string()
    } else {
        "<redacted>".to_string()
    };
    lines.push(render_line("llm.api_key", &llm_api_key, source("llm.api_key", &["SHOPPER_LLM_API_KEY"])));
    lines.push(render_line(
        "llm.base_url",
        &config.llm.base_url,
        source("llm.base_url", &["SHOPPER_LLM_BASE_URL"]),
    ));
    lines.push(render_line("llm.model", &config.llm.model, source("llm.model", &["SHOPPER_LLM_MODEL"])));
    lines.push(render_line(
        "llm.timeout_secs",
        &config.llm.timeout_secs.to_string(),
        source("llm.timeout_secs", &["SHOPPER_LLM_TIMEOUT_SECS"]),
    ));
    lines.push(render_line(
        "llm.temperature",
        &config.llm.temperature.to_string(),
        source("llm.temperature", &["SHOPPER_LLM_TEMPERATURE"]),
    ));
    lines.push(render_line(
        "llm.max_tokens",
        &config.llm.max_tokens.to_string(),
        source("llm.max_tokens", &["SHOPPER_LLM_MAX_TOKENS"]),
    ));

    let catalog_path = config
        .catalog
        .path
        .as_deref()
        .map_or_else(|| "<embedded>".to_string(), |path| path.display().to_string());
    lines.push(render_line("catalog.path", &catalog_path, source("catalog.path", &["SHOPPER_CATALOG_PATH"])));

    lines.push(render_line(
        "session.default_weather",
        &config.session.default_weather,
        source("session.default_weather", &["SHOPPER_SESSION_DEFAULT_WEATHER"]),
    ));
    lines.push(render_line(
        "session.default_location",
        &config.session.default_location,
        source("session.default_location", &["SHOPPER_SESSION_DEFAULT_LOCATION"]),
    ));
    lines.push(render_line(
        "session.max_sessions",
        &config.session.max_sessions.to_string(),
        source("session.max_sessions", &["SHOPPER_SESSION_MAX_SESSIONS"]),
    ));
    lines.push(render_line(
        "session.idle_ttl_secs",
        &config.session.idle_ttl_secs.to_string(),
        source("session.idle_ttl_secs", &["SHOPPER_SESSION_IDLE_TTL_SECS"]),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", &["SHOPPER_SERVER_BIND_ADDRESS"]),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", &["SHOPPER_SERVER_PORT"]),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["SHOPPER_LOGGING_LEVEL", "SHOPPER_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", &["SHOPPER_LOGGING_FORMAT", "SHOPPER_LOG_FORMAT"]),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("shopper.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/shopper.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
