use std::collections::HashMap;
use std::path::Path;

use crate::error::{Result, StackError};

/// prefix shared by every override key, in `.env` files and the environment.
pub const OVERRIDE_PREFIX: &str = "IOTHUB_";

/// Parses `KEY=value` lines. Blank lines and `#` comments are skipped, and
/// a value wrapped in matching quotes is unwrapped.
pub fn parse_dot_env(contents: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((key, val)) = line.split_once('=') {
            map.insert(key.trim().to_string(), unquote(val.trim()).to_string());
        }
    }
    map
}

fn unquote(val: &str) -> &str {
    for quote in ['"', '\''] {
        if val.len() >= 2 && val.starts_with(quote) && val.ends_with(quote) {
            return &val[1..val.len() - 1];
        }
    }
    val
}

pub fn load_dot_env(path: &Path) -> Result<HashMap<String, String>> {
    let contents = std::fs::read_to_string(path).map_err(|e| StackError::io(path, e))?;
    Ok(parse_dot_env(&contents))
}

/// every `IOTHUB_*` variable of the current process.
pub fn env_overrides() -> HashMap<String, String> {
    std::env::vars().filter(|(k, _)| k.starts_with(OVERRIDE_PREFIX)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_env_lines() {
        let map = parse_dot_env(
            "# deployment overrides\n\
             IOTHUB_REGION=eu-central-1\n\
             \n\
             export IOTHUB_API_MODE=\"public\"\n\
             IOTHUB_STACK_NAME = 'iot-hub-dev'\n\
             not a pair\n",
        );
        assert_eq!(map.len(), 3);
        assert_eq!(map["IOTHUB_REGION"], "eu-central-1");
        assert_eq!(map["IOTHUB_API_MODE"], "public");
        assert_eq!(map["IOTHUB_STACK_NAME"], "iot-hub-dev");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_dot_env(Path::new("/definitely/not/here/.env")).unwrap_err();
        assert!(matches!(err, StackError::Io { .. }));
    }
}
