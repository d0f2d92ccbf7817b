use crate::error::{ProxyError, Result};
use crate::models::ModelMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    pub backend: BackendConfig,
    /// Extra public → backend model pairs, merged into the builtin table.
    #[serde(default)]
    pub models: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    /// Environment variable holding a bearer token for the backend.
    /// Most local backends (Ollama and friends) need none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

fn default_port() -> u16 {
    8080
}

impl ProxyConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        let candidates = config_search_paths();
        for candidate in &candidates {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        Err(ProxyError::config(format!(
            "No config file found. Searched: {}. Create one from config.example.toml",
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }

    /// Build the model map from the builtin table plus this config's extras.
    ///
    /// # Errors
    /// Returns `ProxyError::Config` if the combined table is not a bijection.
    pub fn model_map(&self) -> Result<ModelMap> {
        ModelMap::new(
            self.models
                .iter()
                .map(|(public, backend)| (public.as_str(), backend.as_str())),
        )
    }

    /// Resolve the backend API key, if one is configured.
    pub fn resolve_api_key(&self) -> Result<Option<String>> {
        match self.backend.api_key_env {
            Some(ref env) => std::env::var(env).map(Some).map_err(|_| {
                ProxyError::config(format!(
                    "Environment variable '{env}' not set. Set it with your backend API key."
                ))
            }),
            None => Ok(None),
        }
    }
}

fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // CWD
    paths.push(PathBuf::from("gemma-proxy.toml"));

    // XDG / platform config dir
    if cfg!(target_os = "macos") {
        if let Some(home) = home_path() {
            paths.push(
                home.join("Library")
                    .join("Application Support")
                    .join("gemma-proxy")
                    .join("config.toml"),
            );
        }
    } else {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join("gemma-proxy").join("config.toml"));
        }
        if let Some(home) = home_path() {
            paths.push(home.join(".config").join("gemma-proxy").join("config.toml"));
        }
    }

    // Home directory fallback
    if let Some(home) = home_path() {
        paths.push(home.join(".gemma-proxy.toml"));
    }

    paths
}

fn home_path() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
port = 9090

[backend]
base_url = "http://localhost:11434/v1"

[models]
"gemma-2-2b-it" = "gemma2:2b"
"#
        )
        .unwrap();

        let config = ProxyConfig::load(f.path()).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.backend.base_url, "http://localhost:11434/v1");
        assert_eq!(
            config.models.get("gemma-2-2b-it"),
            Some(&"gemma2:2b".to_string())
        );

        let map = config.model_map().unwrap();
        assert_eq!(map.to_backend("gemma-2-2b-it"), Some("gemma2:2b"));
        assert_eq!(map.to_backend("gemma-3-1b-it"), Some("gemma3:1b"));
    }

    #[test]
    fn test_conflicting_model_extra_rejected() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
[backend]
base_url = "http://localhost:11434/v1"

[models]
"gemma-3-1b-it" = "somewhere:else"
"#
        )
        .unwrap();

        let config = ProxyConfig::load(f.path()).unwrap();
        assert!(config.model_map().is_err());
    }

    #[test]
    fn test_no_api_key_env_is_fine() {
        let config = ProxyConfig {
            port: 8080,
            backend: BackendConfig {
                base_url: "http://localhost:11434/v1".to_string(),
                api_key_env: None,
            },
            models: HashMap::new(),
        };
        assert_eq!(config.resolve_api_key().unwrap(), None);
    }
}
