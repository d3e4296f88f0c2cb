//! Tool-server registry file types.

use figaro_types::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One tool server to run in a container. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerDefinition {
    /// Human-readable server name, used in logs and error messages.
    pub name: String,
    /// Container image reference.
    pub image: String,
    /// Command and arguments run inside the container.
    #[serde(default)]
    pub command: Vec<String>,
    /// Environment variables passed to the container.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// The server registry file (`~/.figaro/servers.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerRegistry {
    #[serde(default)]
    pub docker_servers: Vec<ContainerDefinition>,
}

impl ServerRegistry {
    /// Load the registry from disk. An absent or unreadable file is fatal.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&data).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_registry() {
        let json = r#"{
            "docker_servers": [
                {
                    "name": "filesystem",
                    "image": "mcp/filesystem:latest",
                    "command": ["serve", "/data"],
                    "env": {"LOG_LEVEL": "debug"}
                },
                {
                    "name": "echo",
                    "image": "mcp/echo"
                }
            ]
        }"#;
        let registry: ServerRegistry = serde_json::from_str(json).unwrap();
        assert_eq!(registry.docker_servers.len(), 2);
        let fs = &registry.docker_servers[0];
        assert_eq!(fs.name, "filesystem");
        assert_eq!(fs.command, vec!["serve", "/data"]);
        assert_eq!(fs.env["LOG_LEVEL"], "debug");
        let echo = &registry.docker_servers[1];
        assert!(echo.command.is_empty());
        assert!(echo.env.is_empty());
    }

    #[test]
    fn missing_file_is_fatal() {
        let result = ServerRegistry::load(Path::new("/nonexistent/figaro/servers.json"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn empty_object_is_empty_registry() {
        let registry: ServerRegistry = serde_json::from_str("{}").unwrap();
        assert!(registry.docker_servers.is_empty());
    }
}
