//! Error types for Toolwire.
//!
//! Library crates keep their own detailed error enums and convert into
//! [`Error`] at the application boundary.

use thiserror::Error;

/// Result type alias using the Toolwire [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Toolwire.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tool execution error
    #[error("Tool error: {0}")]
    Tool(String),

    /// MCP error
    #[error("MCP error: {0}")]
    Mcp(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Get a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Error::Config(_) => Some("Check your config file at ~/.config/toolwire/config.toml"),
            Error::Mcp(_) => Some("Check the server definitions in mcp.json or ~/.config/mcp/mcp.json"),
            Error::NotFound(_) => Some("Use 'toolwire tools' to see available tools"),
            _ => None,
        }
    }
}

/// Format an error with its recovery suggestion.
pub fn format_error_with_suggestion(error: &Error) -> String {
    let mut output = error.to_string();
    if let Some(suggestion) = error.recovery_suggestion() {
        output.push_str(&format!("\n  Suggestion: {}", suggestion));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_has_suggestion() {
        let err = Error::Config("bad value".to_string());
        assert_eq!(err.to_string(), "Configuration error: bad value");
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_format_with_suggestion() {
        let err = Error::NotFound("search".to_string());
        let formatted = format_error_with_suggestion(&err);
        assert!(formatted.starts_with("Not found: search"));
        assert!(formatted.contains("Suggestion: Use 'toolwire tools'"));
    }

    #[test]
    fn test_format_without_suggestion() {
        let err = Error::Tool("boom".to_string());
        assert_eq!(format_error_with_suggestion(&err), "Tool error: boom");
    }
}
