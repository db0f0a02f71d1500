//! Configuration management commands.

use console::style;

use crate::cli::icons::warning;
use crate::config::Config;

/// Print the effective configuration as TOML.
pub fn cmd_config_show(config: &Config) -> anyhow::Result<()> {
    if let Some(ref path) = config.source_path {
        eprintln!("{} {}", style("# Loaded from").dim(), path.display());
    }
    print!("{}", config.to_toml()?);
    Ok(())
}

/// Print a single config value.
pub fn cmd_config_get(config: &Config, setting: &str) -> anyhow::Result<()> {
    let value = serde_json::to_value(config)?;
    let result = navigate_json(&value, setting)?;

    match result {
        serde_json::Value::String(s) => println!("{}", s),
        serde_json::Value::Null => println!("null"),
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }

    Ok(())
}

/// Print the path of the loaded config file.
pub fn cmd_config_path(config: &Config) -> anyhow::Result<()> {
    match config.source_path {
        Some(ref path) => println!("{}", path.display()),
        None => eprintln!("{} No config file found; using defaults", warning()),
    }
    Ok(())
}

/// Navigate a JSON value by dot-separated path.
fn navigate_json<'a>(
    value: &'a serde_json::Value,
    path: &str,
) -> anyhow::Result<&'a serde_json::Value> {
    if path.is_empty() {
        return Ok(value);
    }

    let mut current = value;
    for part in path.split('.') {
        current = match current {
            serde_json::Value::Object(map) => map
                .get(part)
                .ok_or_else(|| anyhow::anyhow!("Setting '{}' not found", path))?,
            serde_json::Value::Array(arr) => {
                let index: usize = part
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Invalid array index '{}' in '{}'", part, path))?;
                arr.get(index)
                    .ok_or_else(|| anyhow::anyhow!("Index {} out of range in '{}'", index, path))?
            }
            _ => anyhow::bail!("Cannot navigate into '{}' at '{}'", path, part),
        };
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_navigate_json_nested() {
        let value = serde_json::to_value(Config::default()).unwrap();
        let result = navigate_json(&value, "ensemble.confidence.baseline").unwrap();
        assert_eq!(result, &json!(0.9));
    }

    #[test]
    fn test_navigate_json_array_index() {
        let value = json!({ "names": ["openai", "gemini"] });
        let result = navigate_json(&value, "names.1").unwrap();
        assert_eq!(result, &json!("gemini"));
    }

    #[test]
    fn test_navigate_json_not_found() {
        let value = json!({ "server": { "port": 3030 } });
        assert!(navigate_json(&value, "server.host").is_err());
        assert!(navigate_json(&value, "server.port.x").is_err());
    }

    #[test]
    fn test_navigate_json_empty_path() {
        let value = json!({ "a": 1 });
        assert_eq!(navigate_json(&value, "").unwrap(), &value);
    }
}
