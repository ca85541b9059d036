//! MCP server and tool commands.
//!
//! Every command loads the server list, does its work, and closes all
//! connections before returning, including on failure.

use serde_json::Value;
use toolwire_core::error::format_error_with_suggestion;
use toolwire_core::{Error, ToolCall};
use toolwire_mcp::McpManager;

use crate::AppContext;

fn fail(error: Error) -> anyhow::Error {
    anyhow::anyhow!(format_error_with_suggestion(&error))
}

async fn load(ctx: &AppContext) -> anyhow::Result<McpManager> {
    let mut manager = McpManager::from_settings(&ctx.config.mcp);
    let loaded = manager
        .load_from_config(&ctx.mcp_config_path)
        .await
        .map_err(|e| fail(Error::from(e)))?;
    tracing::debug!(path = %ctx.mcp_config_path.display(), loaded, "Loaded MCP servers");
    Ok(manager)
}

pub async fn servers(ctx: &AppContext) -> anyhow::Result<()> {
    let mut manager = load(ctx).await?;
    let servers = manager.servers().await;

    if servers.is_empty() {
        println!("No MCP servers loaded from {}", ctx.mcp_config_path.display());
    } else {
        println!("MCP servers:");
        for server in &servers {
            println!(
                "  {} ({}) - {} tools: {}",
                server.name,
                server.transport,
                server.tool_count,
                server.tool_names.join(", ")
            );
        }
    }

    manager.close().await;
    Ok(())
}

pub async fn tools(ctx: &AppContext) -> anyhow::Result<()> {
    let mut manager = load(ctx).await?;
    let tools = manager.all_tools().await;

    if tools.is_empty() {
        println!("No MCP tools available");
    }

    let mut current: Option<&str> = None;
    for (server, tool) in &tools {
        if current != Some(server.as_str()) {
            println!("{}:", server);
            current = Some(server.as_str());
        }

        let description = tool.description.as_deref().unwrap_or("");
        match manager.tool_server(&tool.name) {
            Some(owner) if owner != server => {
                println!("  {} - {} (shadowed by {})", tool.name, description, owner);
            }
            _ => println!("  {} - {}", tool.name, description),
        }
    }

    manager.close().await;
    Ok(())
}

pub async fn call(ctx: &AppContext, tool: &str, args: Option<&str>) -> anyhow::Result<()> {
    let arguments: Value = match args {
        Some(raw) => serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("--args is not valid JSON: {}", e))?,
        None => Value::Object(Default::default()),
    };
    if !arguments.is_object() {
        anyhow::bail!("--args must be a JSON object");
    }

    let mut manager = load(ctx).await?;

    let routed = manager.has_tool(tool);
    let call = ToolCall::new(format!("call_{}", uuid::Uuid::new_v4()), tool, arguments);
    let result = manager.execute(&call).await;
    manager.close().await;

    tracing::debug!(tool = tool, duration_ms = result.duration_ms, "Tool call finished");

    if result.success {
        println!("{}", result.output);
        Ok(())
    } else if routed {
        Err(fail(Error::Tool(result.content().to_string())))
    } else {
        Err(fail(Error::NotFound(format!("unknown MCP tool: {}", tool))))
    }
}

pub async fn schema(ctx: &AppContext) -> anyhow::Result<()> {
    let mut manager = load(ctx).await?;
    let schemas = manager.function_schemas().await;
    manager.close().await;

    println!("{}", serde_json::to_string_pretty(&schemas)?);
    Ok(())
}
