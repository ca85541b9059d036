//! # toolwire-core
//!
//! Core types and abstractions shared by the Toolwire crates.
//!
//! This crate provides:
//! - Tool definitions, tool calls and tool results
//! - The layered application configuration
//! - Common error types

pub mod config;
pub mod error;
pub mod tool;

pub use config::Config;
pub use error::{Error, Result};
pub use tool::{ToolCall, ToolDefinition, ToolResult};
