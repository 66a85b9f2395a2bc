use std::collections::HashMap;

use yaml_lite::FromYaml;
use yaml_lite_derive::FromYaml;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_TRIGGER_MODE: u8 = 0;
const DEFAULT_IDLE_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_WORKER_COUNT: usize = 4;
const DEFAULT_DOCUMENT_ROOT: &str = "./www";
const DEFAULT_BACKLOG: u32 = 128;
const DEFAULT_MAX_CONNECTIONS: usize = 1024;
const DEFAULT_KEEPALIVE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_KEEPALIVE_MAX_REQUESTS: u32 = 100;

/// Startup options as read from the configuration document. Parsed
/// once, validated, then wrapped in a read-only `Config` for the lifetime
/// of the process.
#[derive(Debug, Clone, FromYaml)]
pub struct RawConfig {
    pub port: u16,
    pub trigger_mode: u8,
    pub idle_timeout_ms: u64,
    pub graceful_linger: bool,
    pub worker_count: usize,
    pub document_root: String,
    pub backlog: u32,
    pub max_connections: usize,
    pub keepalive_timeout_secs: u64,
    pub keepalive_max_requests: u32,
    pub error_pages: HashMap<u16, String>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            trigger_mode: DEFAULT_TRIGGER_MODE,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            graceful_linger: false,
            worker_count: DEFAULT_WORKER_COUNT,
            document_root: DEFAULT_DOCUMENT_ROOT.to_string(),
            backlog: DEFAULT_BACKLOG,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            keepalive_timeout_secs: DEFAULT_KEEPALIVE_TIMEOUT_SECS,
            keepalive_max_requests: DEFAULT_KEEPALIVE_MAX_REQUESTS,
            error_pages: HashMap::new(),
        }
    }
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ConfigError {}

/// The validated, immutable configuration snapshot the reactor is built
/// from. Read-only for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub trigger_mode: TriggerMode,
    pub idle_timeout_ms: u64,
    pub graceful_linger: bool,
    pub worker_count: usize,
    pub document_root: String,
    pub backlog: u32,
    pub max_connections: usize,
    pub keepalive_timeout_secs: u64,
    pub keepalive_max_requests: u32,
    pub error_pages: HashMap<u16, String>,
}

/// Selects whether the listening socket and/or connection sockets drain
/// readiness in a loop (edge-triggered) or perform exactly one I/O call
/// per event (level-triggered).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    LevelBoth = 0,
    EdgeListenerOnly = 1,
    EdgeConnectionOnly = 2,
    EdgeBoth = 3,
}

impl TriggerMode {
    fn from_u8(n: u8) -> Option<Self> {
        match n {
            0 => Some(TriggerMode::LevelBoth),
            1 => Some(TriggerMode::EdgeListenerOnly),
            2 => Some(TriggerMode::EdgeConnectionOnly),
            3 => Some(TriggerMode::EdgeBoth),
            _ => None,
        }
    }

    pub fn listener_edge(self) -> bool {
        matches!(self, TriggerMode::EdgeListenerOnly | TriggerMode::EdgeBoth)
    }

    pub fn connection_edge(self) -> bool {
        matches!(self, TriggerMode::EdgeConnectionOnly | TriggerMode::EdgeBoth)
    }
}

impl Config {
    pub fn from_str(source: &str) -> Result<Self, ConfigError> {
        let raw = RawConfig::from_str(source).map_err(|e| ConfigError { message: e.to_string() })?;
        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> Result<Self, ConfigError> {
        if !(1024..=65535).contains(&raw.port) {
            return Err(ConfigError {
                message: format!("port {} out of range 1024..65535", raw.port),
            });
        }
        let trigger_mode = TriggerMode::from_u8(raw.trigger_mode).ok_or_else(|| ConfigError {
            message: format!("trigger_mode {} out of range 0..3", raw.trigger_mode),
        })?;
        if raw.worker_count == 0 {
            return Err(ConfigError { message: "worker_count must be positive".into() });
        }
        if raw.document_root.trim().is_empty() {
            return Err(ConfigError { message: "document_root must not be empty".into() });
        }
        if raw.backlog == 0 {
            return Err(ConfigError { message: "backlog must be positive".into() });
        }
        if raw.max_connections == 0 {
            return Err(ConfigError { message: "max_connections must be positive".into() });
        }
        Ok(Config {
            port: raw.port,
            trigger_mode,
            idle_timeout_ms: raw.idle_timeout_ms,
            graceful_linger: raw.graceful_linger,
            worker_count: raw.worker_count,
            document_root: raw.document_root,
            backlog: raw.backlog,
            max_connections: raw.max_connections,
            keepalive_timeout_secs: raw.keepalive_timeout_secs,
            keepalive_max_requests: raw.keepalive_max_requests,
            error_pages: raw.error_pages,
        })
    }

    /// Human-readable rendering of the effective configuration, logged once
    /// before the reactor enters its main loop.
    pub fn display_config(&self) {
        proxy_log::info!("⦿ listening on port {}", self.port);
        proxy_log::info!("⦿ trigger mode: {:?}", self.trigger_mode);
        proxy_log::info!("⦿ document root: {}", self.document_root);
        proxy_log::info!(
            "⦿ workers: {}  backlog: {}  max_connections: {}",
            self.worker_count,
            self.backlog,
            self.max_connections
        );
        if self.idle_timeout_ms == 0 {
            proxy_log::info!("⦿ idle timeout: disabled");
        } else {
            proxy_log::info!("⦿ idle timeout: {} ms", self.idle_timeout_ms);
        }
        proxy_log::info!(
            "⦿ keep-alive: timeout={}s max={}",
            self.keepalive_timeout_secs,
            self.keepalive_max_requests
        );
        for (code, path) in &self.error_pages {
            proxy_log::info!("⦿ error page {} -> {}", code, path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_document() {
        let src = "\
port: 9090
trigger_mode: 3
idle_timeout_ms: 5000
graceful_linger: true
worker_count: 8
document_root: ./public
backlog: 256
max_connections: 2048
keepalive_timeout_secs: 10
keepalive_max_requests: 50
error_pages:
  404: /errors/404.html
  500: /errors/500.html
";
        let cfg = Config::from_str(src).unwrap();
        assert_eq!(cfg.port, 9090);
        assert_eq!(cfg.trigger_mode, TriggerMode::EdgeBoth);
        assert_eq!(cfg.worker_count, 8);
        assert_eq!(cfg.document_root, "./public");
        assert_eq!(cfg.error_pages.get(&404).map(String::as_str), Some("/errors/404.html"));
    }

    #[test]
    fn rejects_out_of_range_port() {
        let src = "port: 80\ndocument_root: ./www\n";
        let err = Config::from_str(src).unwrap_err();
        assert!(err.message.contains("port"));
    }

    #[test]
    fn rejects_zero_workers() {
        let src = "port: 8080\nworker_count: 0\ndocument_root: ./www\n";
        let err = Config::from_str(src).unwrap_err();
        assert!(err.message.contains("worker_count"));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let src = "document_root: ./www\n";
        let cfg = Config::from_str(src).unwrap();
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.worker_count, DEFAULT_WORKER_COUNT);
    }
}
