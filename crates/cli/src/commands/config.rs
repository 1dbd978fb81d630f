use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use eventdesk_core::config::{AppConfig, LoadOptions};
use eventdesk_core::lifecycle::PenaltyPolicy;
use serde::Serialize;
use toml::Value;

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: String,
    value: String,
    source: String,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut entries = Vec::new();

    entries.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", &["EVENTDESK_DATABASE_URL"]),
    ));
    entries.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", &["EVENTDESK_DATABASE_MAX_CONNECTIONS"]),
    ));
    entries.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", &["EVENTDESK_DATABASE_TIMEOUT_SECS"]),
    ));

    for (category, policy) in
        [("venue", &config.penalties.venue), ("service", &config.penalties.service)]
    {
        entries.extend(render_policy(category, policy, &source));
    }

    entries.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["EVENTDESK_LOGGING_LEVEL", "EVENTDESK_LOG_LEVEL"]),
    ));
    entries.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", &["EVENTDESK_LOGGING_FORMAT", "EVENTDESK_LOG_FORMAT"]),
    ));

    let data = serde_json::json!({ "entries": entries });
    CommandResult::success_with_data(
        "config",
        "effective config (source precedence: env > file > default)",
        data,
    )
}

fn render_policy(
    category: &str,
    policy: &PenaltyPolicy,
    source: &dyn Fn(&str, &[&str]) -> String,
) -> Vec<ConfigEntry> {
    let window_key = format!("penalties.{category}.free_window_days");
    let rate_key = format!("penalties.{category}.penalty_rate");
    let env_prefix = format!("EVENTDESK_PENALTIES_{}", category.to_ascii_uppercase());
    let window_env = format!("{env_prefix}_FREE_WINDOW_DAYS");
    let rate_env = format!("{env_prefix}_PENALTY_RATE");

    vec![
        render_line(
            &window_key,
            &policy.free_window_days.to_string(),
            source(&window_key, &[window_env.as_str()]),
        ),
        render_line(
            &rate_key,
            &policy.penalty_rate.to_string(),
            source(&rate_key, &[rate_env.as_str()]),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("eventdesk.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/eventdesk.toml");
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
    for env_key in env_keys {
        if env::var(env_key).map(|value| !value.trim().is_empty()).unwrap_or(false) {
            return format!("env ({env_key})");
        }
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

fn render_line(key: &str, value: &str, source: String) -> ConfigEntry {
    ConfigEntry { key: key.to_string(), value: value.to_string(), source }
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::contains_path;

    #[test]
    fn nested_penalty_keys_are_found_in_the_file_document() {
        let doc: Value = "[penalties.venue]\nfree_window_days = 10\n".parse().expect("toml");

        assert!(contains_path(&doc, "penalties.venue.free_window_days"));
        assert!(!contains_path(&doc, "penalties.venue.penalty_rate"));
        assert!(!contains_path(&doc, "penalties.service.free_window_days"));
    }
}
