use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use studio_contracts::models::DEFAULT_IMAGE_MODEL;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_ASPECT_RATIO: &str = "1:1";

/// Checked in order; the first non-empty value wins.
pub const API_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];

/// Process environment layered over an optional `.env` file.
#[derive(Debug, Clone, Default)]
pub struct EnvLayer {
    dotenv: HashMap<String, String>,
}

impl EnvLayer {
    pub fn new(dotenv: HashMap<String, String>) -> Self {
        Self { dotenv }
    }

    /// Reads `path` if it exists; a missing file yields an empty layer.
    pub fn with_dotenv_file(path: &Path) -> Self {
        Self::new(load_dotenv(path))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        non_empty_env(key).or_else(|| {
            self.dotenv
                .get(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
    }

    pub fn image_model(&self) -> String {
        self.get("GEMINI_IMAGE_MODEL")
            .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub aspect_ratio: String,
    /// `None` leaves the request without a client-side deadline.
    pub request_timeout: Option<Duration>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            request_timeout: None,
        }
    }
}

impl GeminiConfig {
    pub fn from_layer(layer: &EnvLayer) -> Self {
        Self::from_lookup(|key| layer.get(key))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            api_key: API_KEY_VARS.iter().find_map(|key| lookup(key)),
            api_base: lookup("GEMINI_API_BASE")
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.api_base),
            aspect_ratio: defaults.aspect_ratio,
            request_timeout: lookup("GEMINI_REQUEST_TIMEOUT")
                .and_then(|value| value.trim().parse::<f64>().ok())
                .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
                .map(Duration::from_secs_f64),
        }
    }
}

/// Parses `KEY=value` lines; `export ` prefixes, comments and matching quotes are handled.
pub fn parse_dotenv(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for raw_line in content.lines() {
        let mut line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(stripped) = line.strip_prefix("export ") {
            line = stripped.trim();
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        let unquoted = [('"', '"'), ('\'', '\'')]
            .iter()
            .find_map(|(open, close)| {
                value
                    .strip_prefix(*open)
                    .and_then(|rest| rest.strip_suffix(*close))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), unquoted.to_string());
    }
    vars
}

pub fn load_dotenv(path: &Path) -> HashMap<String, String> {
    std::fs::read_to_string(path)
        .map(|content| parse_dotenv(&content))
        .unwrap_or_default()
}

pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_any_variables() {
        let config = GeminiConfig::from_lookup(|_| None);
        assert_eq!(config, GeminiConfig::default());
        assert_eq!(config.aspect_ratio, "1:1");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn api_key_precedence_and_base_trimming() {
        let config = GeminiConfig::from_lookup(lookup_from(&[
            ("API_KEY", "generic"),
            ("GOOGLE_API_KEY", "google"),
            ("GEMINI_API_BASE", " http://localhost:9999/v1beta/ "),
            ("GEMINI_REQUEST_TIMEOUT", "45"),
        ]));
        assert_eq!(config.api_key.as_deref(), Some("google"));
        assert_eq!(config.api_base, "http://localhost:9999/v1beta");
        assert_eq!(config.request_timeout, Some(Duration::from_secs(45)));
    }

    #[test]
    fn invalid_timeout_is_ignored() {
        let config = GeminiConfig::from_lookup(lookup_from(&[("GEMINI_REQUEST_TIMEOUT", "-3")]));
        assert!(config.request_timeout.is_none());
        let config = GeminiConfig::from_lookup(lookup_from(&[("GEMINI_REQUEST_TIMEOUT", "soon")]));
        assert!(config.request_timeout.is_none());
    }

    #[test]
    fn dotenv_parsing_handles_exports_quotes_and_comments() {
        let vars = parse_dotenv(
            "# credentials\nexport GEMINI_API_KEY=\"abc 123\"\nGEMINI_API_BASE='http://x'\nBROKEN\n=nokey\n",
        );
        assert_eq!(vars.get("GEMINI_API_KEY").map(String::as_str), Some("abc 123"));
        assert_eq!(vars.get("GEMINI_API_BASE").map(String::as_str), Some("http://x"));
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn env_layer_reads_dotenv_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join(".env");
        std::fs::write(&path, "STUDIO_TEST_ONLY_KEY=from-file\n")?;
        let layer = EnvLayer::with_dotenv_file(&path);
        assert_eq!(layer.get("STUDIO_TEST_ONLY_KEY").as_deref(), Some("from-file"));
        let empty = EnvLayer::with_dotenv_file(&temp.path().join("missing"));
        assert!(empty.get("STUDIO_TEST_ONLY_KEY").is_none());
        Ok(())
    }
}
