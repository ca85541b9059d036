//! Scriptable stdio MCP server used by the integration tests.
//!
//! Speaks newline-delimited JSON-RPC on stdin/stdout. It prints a banner line
//! at startup and a log notification before every reply, so clients have to
//! skip non-reply traffic.
//!
//! Behaviour is driven by environment variables:
//!
//! - `MOCK_NAME`: server name reported by `initialize` (default `mock`)
//! - `MOCK_TOOLS`: comma-separated tool list (default `echo,fail,add,last_id`)
//! - `MOCK_FAIL_ON`: method answered with a JSON-RPC error
//! - `MOCK_EXIT_ON`: method that makes the server exit without replying
//! - `MOCK_SILENT_ON`: method that never gets a reply
//! - `MOCK_FLOOD`: extra notifications written before each reply
//! - `MOCK_STALE`: when set, a reply to a different id precedes each reply

use std::env;
use std::io::{self, BufRead, Write};

use serde_json::{json, Value};

const DEFAULT_TOOLS: &str = "echo,fail,add,last_id";

struct Behaviour {
    name: String,
    tools: Vec<String>,
    fail_on: Option<String>,
    exit_on: Option<String>,
    silent_on: Option<String>,
    flood: usize,
    stale: bool,
}

impl Behaviour {
    fn from_env() -> Self {
        let tools = env::var("MOCK_TOOLS").unwrap_or_else(|_| DEFAULT_TOOLS.to_string());
        Self {
            name: env::var("MOCK_NAME").unwrap_or_else(|_| "mock".to_string()),
            tools: tools
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            fail_on: env::var("MOCK_FAIL_ON").ok(),
            exit_on: env::var("MOCK_EXIT_ON").ok(),
            silent_on: env::var("MOCK_SILENT_ON").ok(),
            flood: env::var("MOCK_FLOOD").ok().and_then(|v| v.parse().ok()).unwrap_or(0),
            stale: env::var("MOCK_STALE").is_ok(),
        }
    }
}

fn main() -> io::Result<()> {
    let behaviour = Behaviour::from_env();
    let stdin = io::stdin();
    let mut out = io::stdout().lock();

    writeln!(out, "{} mock MCP server starting", behaviour.name)?;
    out.flush()?;

    for line in stdin.lock().lines() {
        let line = line?;
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            continue;
        };

        let method = message.get("method").and_then(Value::as_str).unwrap_or_default().to_string();
        let Some(id) = message.get("id").cloned() else {
            // Notifications get no reply.
            continue;
        };

        if behaviour.exit_on.as_deref() == Some(method.as_str()) {
            return Ok(());
        }
        if behaviour.silent_on.as_deref() == Some(method.as_str()) {
            continue;
        }

        for n in 0..behaviour.flood.max(1) {
            let note = json!({
                "jsonrpc": "2.0",
                "method": "notifications/message",
                "params": {"level": "info", "data": format!("handling {} ({})", method, n)}
            });
            writeln!(out, "{}", note)?;
        }

        if behaviour.stale {
            let other = id.as_i64().map(|i| i + 1000).unwrap_or(1000);
            writeln!(out, "{}", json!({"jsonrpc": "2.0", "id": other, "result": {"stale": true}}))?;
        }

        let outcome = if behaviour.fail_on.as_deref() == Some(method.as_str()) {
            Err((-32603, format!("mock failure on {}", method)))
        } else {
            handle(&behaviour, &method, message.get("params"), &id)
        };

        let reply = match outcome {
            Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Err((code, text)) => json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": text}}),
        };
        writeln!(out, "{}", reply)?;
        out.flush()?;
    }

    Ok(())
}

fn handle(behaviour: &Behaviour, method: &str, params: Option<&Value>, id: &Value) -> Result<Value, (i32, String)> {
    match method {
        "initialize" => Ok(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": behaviour.name, "version": "0.1.0"}
        })),
        "tools/list" => {
            let tools: Vec<Value> = behaviour.tools.iter().map(|name| tool_schema(name)).collect();
            Ok(json!({ "tools": tools }))
        }
        "tools/call" => {
            let params = params.cloned().unwrap_or(Value::Null);
            let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
            let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
            if !behaviour.tools.iter().any(|t| t == name) {
                return Err((-32602, format!("unknown tool: {}", name)));
            }
            Ok(call_tool(name, &arguments, id))
        }
        _ => Err((-32601, format!("method not found: {}", method))),
    }
}

fn tool_schema(name: &str) -> Value {
    match name {
        "add" => json!({
            "name": "add",
            "description": "Add two numbers",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "a": {"type": "number", "description": "First operand"},
                    "b": {"type": "number", "description": "Second operand"}
                },
                "required": ["a", "b"]
            }
        }),
        other => json!({
            "name": other,
            "description": format!("Mock {} tool", other),
            "inputSchema": {"type": "object", "properties": {}}
        }),
    }
}

fn call_tool(name: &str, arguments: &Value, id: &Value) -> Value {
    let text = |t: String| json!({"content": [{"type": "text", "text": t}]});

    match name {
        "fail" => json!({
            "content": [{"type": "text", "text": "requested failure"}],
            "isError": true
        }),
        "add" => {
            let a = arguments.get("a").and_then(Value::as_f64).unwrap_or(0.0);
            let b = arguments.get("b").and_then(Value::as_f64).unwrap_or(0.0);
            text((a + b).to_string())
        }
        "last_id" => text(id.to_string()),
        _ => text(arguments.to_string()),
    }
}
