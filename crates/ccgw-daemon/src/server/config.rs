//! Server configuration.

use std::time::Duration;

use ccgw_core::Config;
use ccgw_core::config::DaemonConfig;

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host; a name or an IP address.
    pub host: String,

    /// Bind port.
    pub port: u16,

    /// Project used when a request names none.
    pub default_project: String,

    /// Interval between SSE keep-alive comments.
    pub keep_alive: Duration,

    /// Origins allowed by CORS; `"*"` allows any.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            default_project: "default".to_string(),
            keep_alive: Duration::from_secs(15),
            allowed_origins: DaemonConfig::default().allowed_origins,
        }
    }
}

impl ServerConfig {
    /// Derive the server settings from the gateway configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.daemon.host.clone(),
            port: config.daemon.port,
            default_project: config.projects.default_project.clone(),
            keep_alive: Duration::from_secs(config.streaming.keep_alive_secs.max(1)),
            allowed_origins: config.daemon.allowed_origins.clone(),
        }
    }

    /// `host:port` as accepted by `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
        assert_eq!(config.default_project, "default");
    }

    #[test]
    fn derived_from_gateway_config() {
        let mut config = Config::default();
        config.daemon.host = "localhost".into();
        config.daemon.port = 9123;
        config.projects.default_project = "scratch".into();
        config.daemon.allowed_origins = vec!["https://app.example".into()];

        let server = ServerConfig::from_config(&config);
        assert_eq!(server.bind_addr(), "localhost:9123");
        assert_eq!(server.default_project, "scratch");
        assert_eq!(server.allowed_origins, ["https://app.example"]);
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let server = ServerConfig {
            host: "::1".into(),
            ..ServerConfig::default()
        };
        assert_eq!(server.bind_addr(), "[::1]:8000");
    }
}
