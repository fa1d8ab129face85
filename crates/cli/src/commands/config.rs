use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::commands::CommandResult;
use risepal_core::config::{AppConfig, LoadOptions};
use serde_json::Value as JsonValue;
use toml::Value;

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

    let mut entries = Vec::new();
    flatten("", &config.redacted_json(), &mut entries);

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, value) in entries {
        let source = field_source(
            &key_path,
            &env_keys(&key_path),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(&key_path, &value, source));
    }

    CommandResult::success("config", lines.join("\n"))
}

fn flatten(prefix: &str, value: &JsonValue, out: &mut Vec<(String, String)>) {
    match value {
        JsonValue::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                flatten(&path, child, out);
            }
        }
        JsonValue::Null => out.push((prefix.to_string(), "<unset>".to_string())),
        JsonValue::String(text) => out.push((prefix.to_string(), text.clone())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

/// Environment variables that can set `key_path`, most specific first.
fn env_keys(key_path: &str) -> Vec<String> {
    if key_path.starts_with("dialogue.role_policy") {
        return Vec::new();
    }
    let primary = format!("RISEPAL_{}", key_path.replace('.', "_").to_ascii_uppercase());
    match key_path {
        "logging.level" => vec![primary, "RISEPAL_LOG_LEVEL".to_string()],
        "logging.format" => vec![primary, "RISEPAL_LOG_FORMAT".to_string()],
        _ => vec![primary],
    }
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("risepal.toml"), PathBuf::from("config/risepal.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[String],
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
