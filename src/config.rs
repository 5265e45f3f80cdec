// SPDX-License-Identifier: Apache-2.0

//! Server configuration
//!
//! Every setting is a CLI flag with a `PGDECK_*` environment fallback.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::engine::types::PoolSettings;

#[derive(Parser, Debug, Clone)]
#[command(name = "pgdeck", version, about = "Web administration backend for PostgreSQL")]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "PGDECK_BIND", default_value = "127.0.0.1:4900")]
    pub bind: SocketAddr,

    /// UI origin allowed by CORS
    #[arg(long, env = "PGDECK_ALLOWED_ORIGIN", default_value = "http://localhost:5173")]
    pub allowed_origin: String,

    /// Saved connection profiles file (default: <data dir>/pgdeck/saved_servers.json)
    #[arg(long, env = "PGDECK_SAVED_SERVERS")]
    pub saved_servers: Option<PathBuf>,

    /// Directory for JSON log files. Logs go to stdout only when unset.
    #[arg(long, env = "PGDECK_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Max connections per session pool
    #[arg(long, env = "PGDECK_POOL_MAX_CONNECTIONS", default_value_t = 5)]
    pub pool_max_connections: u32,

    #[arg(long, env = "PGDECK_ACQUIRE_TIMEOUT_SECS", default_value_t = 10)]
    pub acquire_timeout_secs: u64,

    /// Idle pooled connections are closed after this long
    #[arg(long, env = "PGDECK_IDLE_TIMEOUT_SECS", default_value_t = 300)]
    pub idle_timeout_secs: u64,

    #[arg(long, env = "PGDECK_CONNECT_TIMEOUT_SECS", default_value_t = 15)]
    pub connect_timeout_secs: u64,

    /// Sessions unused for this long are closed by the sweeper
    #[arg(long, env = "PGDECK_SESSION_TTL_SECS", default_value_t = 1800)]
    pub session_ttl_secs: u64,

    #[arg(long, env = "PGDECK_SWEEP_INTERVAL_SECS", default_value_t = 60)]
    pub sweep_interval_secs: u64,

    #[arg(long, env = "PGDECK_MAX_SESSIONS", default_value_t = 64)]
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 4900)),
            allowed_origin: "http://localhost:5173".to_string(),
            saved_servers: None,
            log_dir: None,
            pool_max_connections: 5,
            acquire_timeout_secs: 10,
            idle_timeout_secs: 300,
            connect_timeout_secs: 15,
            session_ttl_secs: 1800,
            sweep_interval_secs: 60,
            max_sessions: 64,
        }
    }
}

impl ServerConfig {
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.pool_max_connections.max(1),
            acquire_timeout: Duration::from_secs(self.acquire_timeout_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            ..PoolSettings::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn saved_servers_path(&self) -> PathBuf {
        self.saved_servers.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("pgdeck")
                .join("saved_servers.json")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_parsed_defaults() {
        let parsed = ServerConfig::try_parse_from(["pgdeck"]).unwrap();
        let default = ServerConfig::default();
        assert_eq!(parsed.bind, default.bind);
        assert_eq!(parsed.allowed_origin, default.allowed_origin);
        assert_eq!(parsed.session_ttl(), Duration::from_secs(1800));
        assert_eq!(parsed.max_sessions, 64);
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = ServerConfig::try_parse_from([
            "pgdeck",
            "--bind",
            "0.0.0.0:8080",
            "--pool-max-connections",
            "0",
            "--saved-servers",
            "/tmp/servers.json",
        ])
        .unwrap();

        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.pool_settings().max_connections, 1);
        assert_eq!(config.saved_servers_path(), PathBuf::from("/tmp/servers.json"));
        assert_eq!(config.pool_settings().application_name, "pgdeck");
    }
}
