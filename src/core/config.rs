//! Configuration management for the tool server.
//!
//! This module provides a centralized configuration structure populated from
//! `MCP_`-prefixed environment variables (and a `.env` file, if present) on
//! top of documented defaults.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::transport::TransportConfig;

/// Main configuration structure for the tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server identification and metadata.
    pub server: ServerConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Transport configuration.
    pub transport: TransportConfig,

    /// Dispatch engine limits.
    pub dispatch: DispatchConfig,

    /// Security and path validation configuration.
    pub security: SecurityConfig,

    /// Named remote hosts for `ssh_exec`.
    pub remote: RemoteConfig,

    /// Outbound HTTP tool settings.
    pub http: HttpToolConfig,
}

/// Server identification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The name of the server as reported to clients.
    pub name: String,

    /// The version of the server.
    pub version: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trace").
    pub level: String,

    /// Write diagnostics to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Tool classes with distinct time budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    /// Local file reads, writes, listings and searches.
    Filesystem,
    /// Host metrics: disk, memory, CPU, processes.
    System,
    /// Outbound HTTP.
    Network,
    /// Commands on remote hosts.
    Remote,
}

impl ToolCategory {
    pub const ALL: [ToolCategory; 4] = [
        ToolCategory::Filesystem,
        ToolCategory::System,
        ToolCategory::Network,
        ToolCategory::Remote,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filesystem => "filesystem",
            Self::System => "system",
            Self::Network => "network",
            Self::Remote => "remote",
        }
    }

    /// Default per-call budget for the category.
    pub fn default_timeout(&self) -> Duration {
        match self {
            Self::Filesystem => Duration::from_secs(10),
            Self::System => Duration::from_secs(15),
            Self::Network => Duration::from_secs(30),
            Self::Remote => Duration::from_secs(60),
        }
    }
}

/// Longest budget a call can be given.
pub const MAX_CALL_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Dispatch engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Requests executed at once. `1` gives strictly ordered responses.
    pub max_in_flight: usize,

    /// Ceiling on the text placed in one `call_tool` result.
    pub max_result_bytes: usize,

    /// Per-category call budgets.
    pub category_timeouts: HashMap<ToolCategory, Duration>,

    /// Per-tool call budgets, overriding the category.
    pub tool_timeouts: HashMap<String, Duration>,

    /// Time a cancelled handler gets to clean up before it is aborted.
    pub cancel_grace: Duration,

    /// Time in-flight calls get to finish after the input stream closes.
    pub shutdown_grace: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 16,
            max_result_bytes: 64 * 1024,
            category_timeouts: ToolCategory::ALL
                .iter()
                .map(|c| (*c, c.default_timeout()))
                .collect(),
            tool_timeouts: HashMap::new(),
            cancel_grace: Duration::from_millis(250),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl DispatchConfig {
    /// Budget for one tool: tool override, then category, then the category
    /// default. Never more than [`MAX_CALL_TIMEOUT`].
    pub fn timeout_for(&self, tool: &str, category: ToolCategory) -> Duration {
        self.tool_timeouts
            .get(tool)
            .or_else(|| self.category_timeouts.get(&category))
            .copied()
            .unwrap_or_else(|| category.default_timeout())
            .min(MAX_CALL_TIMEOUT)
    }
}

/// Configuration for security and path validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Optional root directory for path operations.
    /// If None, no path restrictions are enforced.
    pub root_path: Option<PathBuf>,

    /// Whether symlinks may be used at all when a root is configured.
    /// Allowed symlinks must still resolve inside the root.
    pub allow_symlinks: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            root_path: None,
            allow_symlinks: true,
        }
    }
}

/// One remote host reachable through `ssh_exec`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHost {
    /// Name the host is addressed by in tool arguments.
    pub alias: String,
    pub user: Option<String>,
    pub hostname: String,
    pub port: Option<u16>,
}

impl RemoteHost {
    /// Parse `alias=[user@]host[:port]`.
    pub fn parse(entry: &str) -> Option<Self> {
        let (alias, target) = entry.split_once('=')?;
        let alias = alias.trim();
        let target = target.trim();
        if alias.is_empty() || target.is_empty() {
            return None;
        }

        let (user, host_port) = match target.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
            Some(_) => return None,
            None => (None, target),
        };

        let (hostname, port) = match host_port.rsplit_once(':') {
            Some((host, port)) => (host, Some(port.parse::<u16>().ok()?)),
            None => (host_port, None),
        };
        if hostname.is_empty() {
            return None;
        }

        Some(Self {
            alias: alias.to_string(),
            user,
            hostname: hostname.to_string(),
            port,
        })
    }

    /// `user@host` destination for the ssh command line.
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.hostname),
            None => self.hostname.clone(),
        }
    }
}

/// Remote execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Hosts that may be targeted.
    pub hosts: Vec<RemoteHost>,

    /// ssh client binary.
    pub ssh_binary: String,

    /// Seconds ssh waits for the TCP connection.
    pub connect_timeout_secs: u64,

    /// Optional identity file passed with `-i`.
    pub identity_file: Option<PathBuf>,

    /// Bytes kept from each of stdout and stderr.
    pub max_output_bytes: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            ssh_binary: "ssh".to_string(),
            connect_timeout_secs: 10,
            identity_file: None,
            max_output_bytes: 256 * 1024,
        }
    }
}

impl RemoteConfig {
    pub fn host(&self, alias: &str) -> Option<&RemoteHost> {
        self.hosts.iter().find(|h| h.alias == alias)
    }
}

/// Outbound HTTP configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpToolConfig {
    /// Response bodies are cut off after this many bytes.
    pub max_body_bytes: usize,

    /// User-Agent sent with every request.
    pub user_agent: String,
}

impl Default for HttpToolConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024,
            user_agent: format!("ops-tool-server/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Read the diagnostic settings alone, so logging can start before the
    /// rest of the configuration is parsed and reported on.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut logging = Self::default();
        if let Ok(level) = std::env::var("MCP_LOG_LEVEL") {
            logging.level = level;
        }
        if let Ok(file) = std::env::var("MCP_LOG_FILE") {
            if !file.trim().is_empty() {
                logging.file = Some(PathBuf::from(file));
            }
        }
        logging
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                name: "ops-tool-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            logging: LoggingConfig::default(),
            transport: TransportConfig::default(),
            dispatch: DispatchConfig::default(),
            security: SecurityConfig::default(),
            remote: RemoteConfig::default(),
            http: HttpToolConfig::default(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables are expected to be prefixed with `MCP_`.
    /// For example: `MCP_SERVER_NAME`, `MCP_LOG_LEVEL`. Invalid values are
    /// reported and replaced by defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(name) = std::env::var("MCP_SERVER_NAME") {
            config.server.name = name;
        }

        config.logging = LoggingConfig::from_env();

        config.transport = TransportConfig::from_env();

        // Dispatch limits
        if let Some(n) = env_number::<usize>("MCP_MAX_IN_FLIGHT").filter(|n| *n > 0) {
            config.dispatch.max_in_flight = n;
        }
        if let Some(n) = env_number::<usize>("MCP_MAX_RESULT_BYTES").filter(|n| *n > 0) {
            config.dispatch.max_result_bytes = n;
        }
        for category in ToolCategory::ALL {
            let key = format!("MCP_TIMEOUT_{}_SECS", category.as_str().to_uppercase());
            if let Some(secs) = env_number::<u64>(&key).filter(|s| *s > 0) {
                config
                    .dispatch
                    .category_timeouts
                    .insert(category, capped_timeout(&key, secs));
            }
        }
        if let Ok(raw) = std::env::var("MCP_TOOL_TIMEOUTS") {
            config.dispatch.tool_timeouts = parse_tool_timeouts(&raw);
        }
        if let Some(ms) = env_number::<u64>("MCP_CANCEL_GRACE_MS") {
            config.dispatch.cancel_grace = Duration::from_millis(ms);
        }
        if let Some(ms) = env_number::<u64>("MCP_SHUTDOWN_GRACE_MS") {
            config.dispatch.shutdown_grace = Duration::from_millis(ms);
        }

        // Security configuration
        if let Ok(root_path) = std::env::var("MCP_ROOT_PATH") {
            config.security.root_path = Some(PathBuf::from(root_path));
            info!("Path security enabled: root directory set to {:?}", config.security.root_path);
        } else {
            warn!(
                "MCP_ROOT_PATH not set - no path restrictions active. \
                 All filesystem paths will be allowed."
            );
        }

        if let Ok(allow_symlinks) = std::env::var("MCP_ALLOW_SYMLINKS") {
            config.security.allow_symlinks = allow_symlinks.parse().unwrap_or(true);
            info!("Symlinks allowed: {}", config.security.allow_symlinks);
        }

        // Remote hosts
        if let Ok(raw) = std::env::var("MCP_SSH_HOSTS") {
            config.remote.hosts = parse_remote_hosts(&raw);
            info!("{} remote host(s) configured", config.remote.hosts.len());
        }
        if let Ok(binary) = std::env::var("MCP_SSH_BINARY") {
            config.remote.ssh_binary = binary;
        }
        if let Ok(identity) = std::env::var("MCP_SSH_IDENTITY_FILE") {
            config.remote.identity_file = Some(PathBuf::from(identity));
        }
        if let Some(secs) = env_number::<u64>("MCP_SSH_CONNECT_TIMEOUT_SECS").filter(|s| *s > 0) {
            config.remote.connect_timeout_secs = secs;
        }

        // HTTP tools
        if let Some(n) = env_number::<usize>("MCP_HTTP_MAX_BODY_BYTES").filter(|n| *n > 0) {
            config.http.max_body_bytes = n;
        }
        if let Ok(agent) = std::env::var("MCP_HTTP_USER_AGENT") {
            config.http.user_agent = agent;
        }

        config
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid {} value: {}", key, raw);
            None
        }
    }
}

fn capped_timeout(key: &str, secs: u64) -> Duration {
    let timeout = Duration::from_secs(secs);
    if timeout > MAX_CALL_TIMEOUT {
        warn!(
            "Timeout for {} of {}s exceeds the {}s maximum; using the maximum",
            key,
            secs,
            MAX_CALL_TIMEOUT.as_secs()
        );
        return MAX_CALL_TIMEOUT;
    }
    timeout
}

/// Parse `tool=secs,tool=secs`.
fn parse_tool_timeouts(raw: &str) -> HashMap<String, Duration> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let parsed = entry
                .split_once('=')
                .and_then(|(name, secs)| Some((name.trim(), secs.trim().parse::<u64>().ok()?)))
                .filter(|(name, secs)| !name.is_empty() && *secs > 0);
            if parsed.is_none() {
                warn!("Ignoring invalid MCP_TOOL_TIMEOUTS entry: {}", entry);
            }
            parsed.map(|(name, secs)| (name.to_string(), capped_timeout(name, secs)))
        })
        .collect()
}

/// Parse `alias=[user@]host[:port],...`.
fn parse_remote_hosts(raw: &str) -> Vec<RemoteHost> {
    let mut hosts: Vec<RemoteHost> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        match RemoteHost::parse(entry) {
            Some(host) if hosts.iter().any(|h| h.alias == host.alias) => {
                warn!("Ignoring duplicate remote host alias: {}", host.alias);
            }
            Some(host) => hosts.push(host),
            None => warn!("Ignoring invalid MCP_SSH_HOSTS entry: {}", entry),
        }
    }
    hosts
}
