//! MCP server discovery and tool routing.
//!
//! [`McpManager`] starts every configured server, keeps the ones that reach
//! `Ready`, and routes tool calls by tool name. A server that fails at any
//! stage is logged and left out; the rest still load.
//!
//! Tool names share one namespace. When two servers expose the same name the
//! server processed later (configuration order, i.e. ascending server name)
//! owns the route.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use toolwire_core::config::McpSettings;
use toolwire_core::tool::{ToolCall, ToolDefinition, ToolResult};
use tracing::{debug, info, warn};

use crate::client::{Connection, ConnectionState, McpConnection};
use crate::config::{load_config, ServerConfig, TransportConfig, TransportKind};
use crate::correlator::RequestCorrelator;
use crate::error::McpError;
use crate::http::HttpChannel;
use crate::protocol::{ClientInfo, McpTool};
use crate::stdio::StdioChannel;
use crate::tools::{to_tool_definition, FunctionTool};

/// Opens a connection for a server definition.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ServerConfig) -> Result<Arc<dyn Connection>, McpError>;
}

/// Connector that spawns processes and talks HTTP.
pub struct TransportConnector {
    client_info: ClientInfo,
    timeout: Duration,
    max_attempts: usize,
    http: reqwest::Client,
}

impl TransportConnector {
    pub fn new(client_info: ClientInfo, timeout: Duration, max_attempts: usize) -> Self {
        Self {
            client_info,
            timeout,
            max_attempts,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_settings(settings: &McpSettings) -> Self {
        Self::new(
            ClientInfo::new(&settings.client_name, &settings.client_version),
            Duration::from_secs(settings.request_timeout_secs),
            settings.max_read_attempts,
        )
    }
}

impl Default for TransportConnector {
    fn default() -> Self {
        Self::from_settings(&McpSettings::default())
    }
}

#[async_trait]
impl Connector for TransportConnector {
    async fn connect(&self, config: &ServerConfig) -> Result<Arc<dyn Connection>, McpError> {
        let correlator = RequestCorrelator::new(self.max_attempts);

        let connection: Arc<dyn Connection> = match &config.transport {
            TransportConfig::Stdio { command, args, env } => {
                let channel = StdioChannel::spawn(command, args, env, correlator, self.timeout)?;
                Arc::new(McpConnection::new(&config.name, channel, self.client_info.clone()))
            }
            TransportConfig::Http { url } | TransportConfig::Sse { url } => {
                let channel = HttpChannel::new(
                    self.http.clone(),
                    url,
                    config.transport.kind(),
                    correlator,
                    self.timeout,
                );
                Arc::new(McpConnection::new(&config.name, channel, self.client_info.clone()))
            }
        };

        Ok(connection)
    }
}

/// Summary of a loaded server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSummary {
    pub name: String,
    pub transport: TransportKind,
    pub tool_count: usize,
    pub tool_names: Vec<String>,
}

/// Owns every Ready connection and the tool routing table.
pub struct McpManager {
    connector: Arc<dyn Connector>,
    /// Registered connections, by server name.
    connections: BTreeMap<String, Arc<dyn Connection>>,
    /// Tool name to the connection serving it.
    routes: HashMap<String, Arc<dyn Connection>>,
}

impl McpManager {
    /// Create an empty manager using `connector` to open servers.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            connections: BTreeMap::new(),
            routes: HashMap::new(),
        }
    }

    /// Create an empty manager for real transports.
    pub fn from_settings(settings: &McpSettings) -> Self {
        Self::new(Arc::new(TransportConnector::from_settings(settings)))
    }

    /// Load every server in the file at `path`.
    ///
    /// The file is parsed before anything changes, so a parse error leaves
    /// the current servers in place. Otherwise existing connections are
    /// closed and replaced. Returns the number of servers that became Ready.
    pub async fn load_from_config(&mut self, path: impl AsRef<Path>) -> Result<usize, McpError> {
        let file = load_config(path.as_ref())?;

        if !self.connections.is_empty() {
            self.close().await;
        }

        Ok(self.load_servers(file.resolve()).await)
    }

    /// Start the given servers and merge the ones that reach Ready.
    ///
    /// Entries that failed to resolve are logged and skipped. Startup runs
    /// concurrently; results merge in the order given.
    pub async fn load_servers(&mut self, entries: Vec<(String, Result<ServerConfig, McpError>)>) -> usize {
        info!(count = entries.len(), "Starting MCP servers");

        let connector = Arc::clone(&self.connector);
        let starts = entries.into_iter().map(|(name, resolved)| {
            let connector = Arc::clone(&connector);
            async move {
                match resolved {
                    Ok(config) => start_server(connector.as_ref(), &config).await,
                    Err(e) => {
                        warn!(server = %name, error = %e, "Skipping MCP server with invalid config");
                        None
                    }
                }
            }
        });

        let started = join_all(starts).await;

        let mut loaded = 0;
        let mut failed = 0;
        for outcome in started {
            match outcome {
                Some((connection, tools)) => {
                    self.register(connection, &tools);
                    loaded += 1;
                }
                None => failed += 1,
            }
        }

        info!(
            loaded = loaded,
            failed = failed,
            tools = self.routes.len(),
            "MCP servers started"
        );

        loaded
    }

    fn register(&mut self, connection: Arc<dyn Connection>, tools: &[McpTool]) {
        let server = connection.name().to_string();

        for tool in tools {
            if let Some(previous) = self.routes.insert(tool.name.clone(), Arc::clone(&connection)) {
                if previous.name() != server {
                    warn!(
                        tool = %tool.name,
                        previous = %previous.name(),
                        server = %server,
                        "Tool name collision, later server takes the route"
                    );
                }
            }
        }

        info!(server = %server, tool_count = tools.len(), "Loaded tools from MCP server");
        self.connections.insert(server, connection);
    }

    /// Call a tool on whichever server owns its name.
    pub async fn execute_tool(&self, name: &str, arguments: Value) -> Result<String, McpError> {
        let connection = self
            .routes
            .get(name)
            .ok_or_else(|| McpError::UnknownTool(name.to_string()))?;

        debug!(tool = name, server = %connection.name(), "Routing tool call");
        connection.call_tool(name, arguments).await
    }

    /// Run a tool call and package the outcome for a conversation.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let start = Instant::now();
        let outcome = self.execute_tool(&call.name, call.arguments.clone()).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => ToolResult::success(&call.id, output).with_duration(duration_ms),
            Err(e) => ToolResult::error(&call.id, e.to_string()).with_duration(duration_ms),
        }
    }

    /// Whether a tool name is routed.
    pub fn has_tool(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    /// Name of the server that owns a tool.
    pub fn tool_server(&self, name: &str) -> Option<&str> {
        self.routes.get(name).map(|c| c.name())
    }

    /// Number of registered servers.
    pub fn server_count(&self) -> usize {
        self.connections.len()
    }

    /// Live servers in name order. A server whose connection dropped after
    /// loading stays registered but is not listed.
    pub async fn servers(&self) -> Vec<ServerSummary> {
        let mut servers = Vec::with_capacity(self.connections.len());
        for (name, connection) in &self.connections {
            if connection.state().await != ConnectionState::Ready {
                continue;
            }
            let tool_names: Vec<String> = connection.tools().await.into_iter().map(|t| t.name).collect();
            servers.push(ServerSummary {
                name: name.clone(),
                transport: connection.transport(),
                tool_count: tool_names.len(),
                tool_names,
            });
        }
        servers
    }

    /// Tools of every live server, paired with the server name.
    pub async fn all_tools(&self) -> Vec<(String, McpTool)> {
        let mut all = Vec::new();
        for (name, connection) in &self.connections {
            if connection.state().await != ConnectionState::Ready {
                continue;
            }
            for tool in connection.tools().await {
                all.push((name.clone(), tool));
            }
        }
        all
    }

    /// Every tool as a [`ToolDefinition`].
    pub async fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.all_tools()
            .await
            .iter()
            .map(|(server, tool)| to_tool_definition(server, tool))
            .collect()
    }

    /// Every tool in chat-completion function format.
    pub async fn function_schemas(&self) -> Vec<FunctionTool> {
        self.all_tools()
            .await
            .iter()
            .map(|(_, tool)| FunctionTool::from_mcp(tool))
            .collect()
    }

    /// Close every connection and clear the routing table.
    ///
    /// Close failures are logged; every connection is attempted.
    pub async fn close(&mut self) {
        if self.connections.is_empty() {
            return;
        }

        info!(count = self.connections.len(), "Stopping MCP servers");

        self.routes.clear();
        let connections = std::mem::take(&mut self.connections);
        let closes = connections.values().map(|c| async move { (c.name().to_string(), c.close().await) });

        for (server, result) in join_all(closes).await {
            if let Err(e) = result {
                warn!(server = %server, error = %e, "Failed to close MCP server");
            }
        }
    }
}

impl Default for McpManager {
    fn default() -> Self {
        Self::new(Arc::new(TransportConnector::default()))
    }
}

/// Drive one server from connect to Ready. Anything short of Ready is
/// closed and logged.
async fn start_server(connector: &dyn Connector, config: &ServerConfig) -> Option<(Arc<dyn Connection>, Vec<McpTool>)> {
    let name = config.name.as_str();

    let connection = match connector.connect(config).await {
        Ok(connection) => connection,
        Err(e) => {
            warn!(server = %name, error = %e, "Failed to start MCP server");
            return None;
        }
    };

    if let Err(e) = connection.initialize().await {
        warn!(server = %name, error = %e, "Failed to initialize MCP server");
        discard(connection.as_ref()).await;
        return None;
    }

    match connection.list_tools().await {
        Ok(tools) => Some((connection, tools)),
        Err(e) => {
            warn!(server = %name, error = %e, "Failed to list tools from MCP server");
            discard(connection.as_ref()).await;
            None
        }
    }
}

async fn discard(connection: &dyn Connection) {
    if let Err(e) = connection.close().await {
        debug!(server = %connection.name(), error = %e, "Error closing failed MCP server");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::error::TransportError;

    #[derive(Clone, Default)]
    struct Script {
        fail_connect: bool,
        fail_init: bool,
        fail_list: bool,
        disconnect_on_call: bool,
        tools: Vec<&'static str>,
    }

    #[derive(Default)]
    struct Counters {
        calls: AtomicUsize,
        closes: AtomicUsize,
    }

    struct FakeConnection {
        name: String,
        script: Script,
        state: Mutex<ConnectionState>,
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl Connection for FakeConnection {
        fn name(&self) -> &str {
            &self.name
        }

        fn transport(&self) -> TransportKind {
            TransportKind::Stdio
        }

        async fn state(&self) -> ConnectionState {
            *self.state.lock().unwrap()
        }

        async fn tools(&self) -> Vec<McpTool> {
            self.script.tools.iter().map(|t| McpTool::new(*t, format!("{} tool", t))).collect()
        }

        async fn initialize(&self) -> Result<(), McpError> {
            if self.script.fail_init {
                *self.state.lock().unwrap() = ConnectionState::Failed;
                return Err(McpError::init_failed("scripted"));
            }
            *self.state.lock().unwrap() = ConnectionState::Initialized;
            Ok(())
        }

        async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
            if self.script.fail_list {
                *self.state.lock().unwrap() = ConnectionState::Failed;
                return Err(McpError::discovery_failed("scripted"));
            }
            *self.state.lock().unwrap() = ConnectionState::Ready;
            Ok(self.tools().await)
        }

        async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, McpError> {
            self.counters.calls.fetch_add(1, Ordering::SeqCst);
            if self.script.disconnect_on_call {
                *self.state.lock().unwrap() = ConnectionState::Closed;
                return Err(TransportError::ConnectionClosed.into());
            }
            Ok(format!("{}:{}:{}", self.name, name, arguments))
        }

        async fn close(&self) -> Result<(), McpError> {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            *self.state.lock().unwrap() = ConnectionState::Closed;
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeConnector {
        scripts: HashMap<String, Script>,
        counters: Arc<Counters>,
    }

    impl FakeConnector {
        fn with(mut self, name: &str, script: Script) -> Self {
            self.scripts.insert(name.to_string(), script);
            self
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, config: &ServerConfig) -> Result<Arc<dyn Connection>, McpError> {
            let script = self.scripts.get(&config.name).cloned().unwrap_or_default();
            if script.fail_connect {
                return Err(McpError::from(TransportError::SpawnFailed(
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no such binary"),
                )));
            }
            Ok(Arc::new(FakeConnection {
                name: config.name.clone(),
                script,
                state: Mutex::new(ConnectionState::Starting),
                counters: Arc::clone(&self.counters),
            }))
        }
    }

    fn tools(names: &[&'static str]) -> Script {
        Script {
            tools: names.to_vec(),
            ..Default::default()
        }
    }

    fn write_config(dir: &tempfile::TempDir, json: &str) -> std::path::PathBuf {
        let path = dir.path().join("mcp.json");
        std::fs::write(&path, json).unwrap();
        path
    }

    fn manager(connector: FakeConnector) -> (McpManager, Arc<Counters>) {
        let counters = Arc::clone(&connector.counters);
        (McpManager::new(Arc::new(connector)), counters)
    }

    const FIVE_SERVERS: &str = r#"{
        "mcpServers": {
            "a-spawn-fails": { "command": "a" },
            "b-init-fails": { "command": "b" },
            "c-list-fails": { "command": "c" },
            "d-healthy": { "command": "d" },
            "e-bad-type": { "type": "websocket", "url": "ws://localhost" }
        }
    }"#;

    #[tokio::test]
    async fn test_partial_failures_skip_only_failing_servers() {
        let connector = FakeConnector::default()
            .with("a-spawn-fails", Script { fail_connect: true, ..Default::default() })
            .with("b-init-fails", Script { fail_init: true, tools: vec!["b_tool"], ..Default::default() })
            .with("c-list-fails", Script { fail_list: true, tools: vec!["c_tool"], ..Default::default() })
            .with("d-healthy", tools(&["read", "write"]));
        let (mut manager, counters) = manager(connector);

        let dir = tempfile::tempdir().unwrap();
        let loaded = manager.load_from_config(write_config(&dir, FIVE_SERVERS)).await.unwrap();

        assert_eq!(loaded, 1);
        let servers = manager.servers().await;
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "d-healthy");
        assert_eq!(servers[0].tool_names, vec!["read", "write"]);
        assert_eq!(servers[0].transport, TransportKind::Stdio);

        assert!(manager.has_tool("read"));
        assert!(!manager.has_tool("b_tool"));
        assert!(!manager.has_tool("c_tool"));

        // Servers that got past connect but not to Ready were closed.
        assert_eq!(counters.closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_tool_collision_last_server_wins() {
        let connector = FakeConnector::default()
            .with("alpha", tools(&["shared", "alpha_only"]))
            .with("beta", tools(&["shared"]));
        let (mut manager, counters) = manager(connector);

        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"{"mcpServers": {"beta": {"command": "b"}, "alpha": {"command": "a"}}}"#,
        );
        manager.load_from_config(&path).await.unwrap();

        assert_eq!(manager.tool_server("shared"), Some("beta"));
        assert_eq!(manager.tool_server("alpha_only"), Some("alpha"));

        let output = manager.execute_tool("shared", json!({"k": 1})).await.unwrap();
        assert_eq!(output, r#"beta:shared:{"k":1}"#);
        assert_eq!(counters.calls.load(Ordering::SeqCst), 1);

        // Both servers stay registered.
        assert_eq!(manager.server_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_sent_anywhere() {
        let (mut manager, counters) = manager(FakeConnector::default().with("only", tools(&["known"])));
        let dir = tempfile::tempdir().unwrap();
        manager
            .load_from_config(write_config(&dir, r#"{"mcpServers": {"only": {"command": "x"}}}"#))
            .await
            .unwrap();

        let err = manager.execute_tool("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::UnknownTool(ref name) if name == "nope"));
        assert_eq!(err.to_string(), "unknown MCP tool: nope");

        let result = manager.execute(&ToolCall::new("call-1", "nope", json!({}))).await;
        assert!(!result.success);
        assert_eq!(result.tool_call_id, "call-1");
        assert_eq!(result.content(), "unknown MCP tool: nope");

        assert_eq!(counters.calls.load(Ordering::SeqCst), 0);
        assert_eq!(manager.tool_server("nope"), None);
    }

    #[tokio::test]
    async fn test_execute_wraps_success() {
        let (mut manager, _) = manager(FakeConnector::default().with("srv", tools(&["echo"])));
        let dir = tempfile::tempdir().unwrap();
        manager
            .load_from_config(write_config(&dir, r#"{"mcpServers": {"srv": {"command": "x"}}}"#))
            .await
            .unwrap();

        let result = manager.execute(&ToolCall::new("call-2", "echo", json!({"x": 1}))).await;
        assert!(result.success);
        assert_eq!(result.output, r#"srv:echo:{"x":1}"#);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_missing_config_loads_nothing() {
        let (mut manager, _) = manager(FakeConnector::default());
        let loaded = manager.load_from_config("/nonexistent/path/mcp.json").await.unwrap();
        assert_eq!(loaded, 0);
        assert!(manager.servers().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_config_keeps_current_servers() {
        let (mut manager, counters) = manager(FakeConnector::default().with("srv", tools(&["echo"])));
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, r#"{"mcpServers": {"srv": {"command": "x"}}}"#);
        manager.load_from_config(&path).await.unwrap();

        std::fs::write(&path, "{ not json").unwrap();
        let err = manager.load_from_config(&path).await.unwrap_err();
        assert!(matches!(err, McpError::ConfigParse { .. }));

        assert!(manager.has_tool("echo"));
        assert_eq!(counters.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reload_replaces_servers() {
        let connector = FakeConnector::default()
            .with("old", tools(&["old_tool"]))
            .with("new", tools(&["new_tool"]));
        let (mut manager, counters) = manager(connector);
        let dir = tempfile::tempdir().unwrap();

        let path = write_config(&dir, r#"{"mcpServers": {"old": {"command": "x"}}}"#);
        manager.load_from_config(&path).await.unwrap();

        std::fs::write(&path, r#"{"mcpServers": {"new": {"command": "y"}}}"#).unwrap();
        manager.load_from_config(&path).await.unwrap();

        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert!(!manager.has_tool("old_tool"));
        assert_eq!(manager.tool_server("new_tool"), Some("new"));
    }

    #[tokio::test]
    async fn test_close_clears_routing() {
        let connector = FakeConnector::default()
            .with("one", tools(&["a"]))
            .with("two", tools(&["b"]));
        let (mut manager, counters) = manager(connector);
        let dir = tempfile::tempdir().unwrap();
        manager
            .load_from_config(write_config(
                &dir,
                r#"{"mcpServers": {"one": {"command": "x"}, "two": {"command": "y"}}}"#,
            ))
            .await
            .unwrap();

        manager.close().await;
        manager.close().await;

        assert_eq!(counters.closes.load(Ordering::SeqCst), 2);
        assert_eq!(manager.server_count(), 0);
        assert!(!manager.has_tool("a"));
        assert!(matches!(
            manager.execute_tool("a", json!({})).await,
            Err(McpError::UnknownTool(_))
        ));
    }

    #[tokio::test]
    async fn test_dropped_server_is_not_listed() {
        let connector = FakeConnector::default()
            .with("dies", Script { disconnect_on_call: true, tools: vec!["flaky"], ..Default::default() })
            .with("stays", tools(&["steady"]));
        let (mut manager, counters) = manager(connector);
        let dir = tempfile::tempdir().unwrap();
        manager
            .load_from_config(write_config(
                &dir,
                r#"{"mcpServers": {"dies": {"command": "x"}, "stays": {"command": "y"}}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(manager.servers().await.len(), 2);

        let err = manager.execute_tool("flaky", json!({})).await.unwrap_err();
        assert!(err.is_disconnect());

        let names: Vec<String> = manager.servers().await.into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["stays"]);
        let tools: Vec<String> = manager.all_tools().await.into_iter().map(|(_, t)| t.name).collect();
        assert_eq!(tools, vec!["steady"]);

        // Still registered, so close reaches it.
        assert_eq!(manager.server_count(), 2);
        manager.close().await;
        assert_eq!(counters.closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_definitions_and_schemas() {
        let connector = FakeConnector::default()
            .with("fs", tools(&["read"]))
            .with("web", tools(&["fetch", "search"]));
        let (mut manager, _) = manager(connector);
        let dir = tempfile::tempdir().unwrap();
        manager
            .load_from_config(write_config(
                &dir,
                r#"{"mcpServers": {"web": {"type": "http", "url": "http://localhost:1"}, "fs": {"command": "x"}}}"#,
            ))
            .await
            .unwrap();

        let definitions = manager.tool_definitions().await;
        let names: Vec<&str> = definitions.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["read", "fetch", "search"]);
        assert!(matches!(
            definitions[1].category,
            toolwire_core::tool::ToolCategory::Mcp(ref s) if s == "web"
        ));

        let schemas = manager.function_schemas().await;
        assert_eq!(schemas.len(), 3);
        assert!(schemas.iter().all(|s| s.kind == "function"));
    }
}
