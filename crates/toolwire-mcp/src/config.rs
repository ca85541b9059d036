//! MCP server list (`mcp.json`).
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "files": { "command": "npx", "args": ["-y", "@mcp/files"], "env": {"ROOT": "/tmp"} },
//!     "search": { "type": "http", "url": "http://localhost:8080/mcp" }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::McpError;

/// File name looked up in the working directory and the user config dir.
pub const CONFIG_FILE_NAME: &str = "mcp.json";

/// Root of the server list file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfigFile {
    /// Server entries keyed by name, in name order.
    #[serde(rename = "mcpServers", default, deserialize_with = "null_as_empty")]
    pub mcp_servers: BTreeMap<String, ServerEntry>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, ServerEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

/// One server entry as written in the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerEntry {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// `stdio` (default), `http` or `sse`.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Which transport a server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    Http,
    Sse,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
            Self::Sse => write!(f, "sse"),
        }
    }
}

/// Everything needed to open a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    Http {
        url: String,
    },
    Sse {
        url: String,
    },
}

impl TransportConfig {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio { .. } => TransportKind::Stdio,
            Self::Http { .. } => TransportKind::Http,
            Self::Sse { .. } => TransportKind::Sse,
        }
    }
}

/// A validated server definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub name: String,
    pub transport: TransportConfig,
    pub description: Option<String>,
}

impl ServerEntry {
    /// Validate this entry into a [`ServerConfig`].
    pub fn resolve(&self, name: &str) -> Result<ServerConfig, McpError> {
        let transport = match self.kind.as_deref().unwrap_or("") {
            "" | "stdio" => {
                let command = non_empty(self.command.as_deref())
                    .ok_or_else(|| McpError::invalid_config(name, "stdio server requires a command"))?;
                TransportConfig::Stdio {
                    command: command.to_string(),
                    args: self.args.clone(),
                    env: self.env.clone(),
                }
            }
            kind @ ("http" | "sse") => {
                let url = non_empty(self.url.as_deref())
                    .ok_or_else(|| McpError::invalid_config(name, format!("{} server requires a url", kind)))?
                    .to_string();
                if kind == "http" {
                    TransportConfig::Http { url }
                } else {
                    TransportConfig::Sse { url }
                }
            }
            other => {
                return Err(McpError::invalid_config(
                    name,
                    format!("unsupported transport type '{}'", other),
                ))
            }
        };

        Ok(ServerConfig {
            name: name.to_string(),
            transport,
            description: self.description.clone(),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl McpConfigFile {
    /// Parse a server list from JSON text.
    pub fn from_json(text: &str, path: &Path) -> Result<Self, McpError> {
        serde_json::from_str(text).map_err(|source| McpError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve every entry, in name order.
    pub fn resolve(&self) -> Vec<(String, Result<ServerConfig, McpError>)> {
        self.mcp_servers
            .iter()
            .map(|(name, entry)| (name.clone(), entry.resolve(name)))
            .collect()
    }
}

/// Load a server list. A missing file is an empty list.
pub fn load_config(path: &Path) -> Result<McpConfigFile, McpError> {
    let path = expand_tilde(path);

    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No MCP config file, using empty server list");
            return Ok(McpConfigFile::default());
        }
        Err(source) => return Err(McpError::ConfigRead { path, source }),
    };

    McpConfigFile::from_json(&text, &path)
}

/// `./mcp.json` if present, else `~/.config/mcp/mcp.json`.
pub fn default_config_path() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join("mcp").join(CONFIG_FILE_NAME))
        .unwrap_or(local)
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };

    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}
