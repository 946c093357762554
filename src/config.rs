use std::net::SocketAddr;
use std::time::Duration;

use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};

use crate::error::{BoltqError, Result};

/// Connection and pool settings for the job record store.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Upper bound on open connections in the pool
    pub max_open_conns: u32,
    /// Connections the pool keeps open at all times; extra idle ones are
    /// closed after `conn_max_idle_time`
    pub min_conns: u32,
    /// Connections older than this are closed and replaced
    pub conn_max_lifetime: Duration,
    pub conn_max_idle_time: Duration,
    pub acquire_timeout: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "boltq".to_string(),
            password: "boltq_dev".to_string(),
            database: "boltq".to_string(),
            max_open_conns: 25,
            min_conns: 5,
            conn_max_lifetime: Duration::from_secs(5 * 60),
            conn_max_idle_time: Duration::from_secs(60),
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

impl PostgresConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .ssl_mode(PgSslMode::Prefer)
    }

    pub fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_open_conns)
            .min_connections(self.min_conns.min(self.max_open_conns))
            .max_lifetime(self.conn_max_lifetime)
            .idle_timeout(self.conn_max_idle_time)
            .acquire_timeout(self.acquire_timeout)
    }
}

/// Connection and pool settings for the dispatch queue.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// host:port
    pub addr: String,
    pub password: Option<String>,
    /// Logical database index
    pub db: i64,
    pub pool_max_size: u32,
    pub pool_min_idle: u32,
    pub conn_max_lifetime: Duration,
    pub conn_max_idle_time: Duration,
    pub connection_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addr: "localhost:6379".to_string(),
            password: None,
            db: 0,
            pool_max_size: 25,
            pool_min_idle: 5,
            conn_max_lifetime: Duration::from_secs(5 * 60),
            conn_max_idle_time: Duration::from_secs(60),
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisConfig {
    pub fn connection_info(&self) -> Result<ConnectionInfo> {
        let (host, port) = self
            .addr
            .rsplit_once(':')
            .ok_or_else(|| BoltqError::Config(format!("invalid redis address: {}", self.addr)))?;
        let port: u16 = port
            .parse()
            .map_err(|_| BoltqError::Config(format!("invalid redis port in: {}", self.addr)))?;

        Ok(ConnectionInfo {
            addr: ConnectionAddr::Tcp(host.to_string(), port),
            redis: RedisConnectionInfo {
                db: self.db,
                password: self.password.clone().filter(|p| !p.is_empty()),
                ..Default::default()
            },
        })
    }
}

/// Settings for the sweep that republishes jobs stuck in `queued`.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub enabled: bool,
    /// Time between sweeps
    pub interval: Duration,
    /// Minimum age of a queued job before it is considered stuck
    pub grace: Duration,
    /// Stale jobs fetched per page while sweeping
    pub batch_size: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30),
            grace: Duration::from_secs(60),
            batch_size: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub listen_addr: SocketAddr,
    /// Server-side cap on request duration; a shorter client deadline wins
    pub request_timeout: Duration,
    pub postgres: PostgresConfig,
    pub redis: RedisConfig,
    pub reconcile: ReconcileConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 50051)),
            request_timeout: Duration::from_secs(30),
            postgres: PostgresConfig::default(),
            redis: RedisConfig::default(),
            reconcile: ReconcileConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_postgres(mut self, postgres: PostgresConfig) -> Self {
        self.postgres = postgres;
        self
    }

    pub fn with_redis(mut self, redis: RedisConfig) -> Self {
        self.redis = redis;
        self
    }

    pub fn with_reconcile(mut self, reconcile: ReconcileConfig) -> Self {
        self.reconcile = reconcile;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_config_default() {
        let cfg = PostgresConfig::default();
        assert_eq!(cfg.host, "localhost");
        assert_eq!(cfg.port, 5432);
        assert_eq!(cfg.user, "boltq");
        assert_eq!(cfg.database, "boltq");
        assert_eq!(cfg.max_open_conns, 25);
        assert_eq!(cfg.min_conns, 5);
        assert_eq!(cfg.conn_max_lifetime, Duration::from_secs(300));
    }

    #[test]
    fn postgres_pool_options_from_config() {
        let opts = PostgresConfig::default().pool_options();
        assert_eq!(opts.get_max_connections(), 25);
        assert_eq!(opts.get_min_connections(), 5);
        assert_eq!(opts.get_idle_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(opts.get_max_lifetime(), Some(Duration::from_secs(300)));

        let capped = PostgresConfig {
            max_open_conns: 2,
            min_conns: 10,
            ..Default::default()
        };
        assert_eq!(capped.pool_options().get_min_connections(), 2);
    }

    #[test]
    fn redis_connection_info_from_addr() {
        let cfg = RedisConfig {
            addr: "cache.internal:6380".to_string(),
            password: Some("secret".to_string()),
            db: 3,
            ..Default::default()
        };
        let info = cfg.connection_info().unwrap();
        assert_eq!(
            info.addr,
            ConnectionAddr::Tcp("cache.internal".to_string(), 6380)
        );
        assert_eq!(info.redis.db, 3);
        assert_eq!(info.redis.password.as_deref(), Some("secret"));
    }

    #[test]
    fn redis_empty_password_is_none() {
        let cfg = RedisConfig {
            password: Some(String::new()),
            ..Default::default()
        };
        let info = cfg.connection_info().unwrap();
        assert!(info.redis.password.is_none());
    }

    #[test]
    fn redis_connection_info_rejects_bad_addr() {
        let missing_port = RedisConfig {
            addr: "localhost".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            missing_port.connection_info(),
            Err(BoltqError::Config(_))
        ));

        let bad_port = RedisConfig {
            addr: "localhost:redis".to_string(),
            ..Default::default()
        };
        assert!(matches!(bad_port.connection_info(), Err(BoltqError::Config(_))));
    }

    #[test]
    fn reconcile_config_default() {
        let cfg = ReconcileConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.interval, Duration::from_secs(30));
        assert_eq!(cfg.grace, Duration::from_secs(60));
        assert_eq!(cfg.batch_size, 100);
    }

    #[test]
    fn service_config_default() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "0.0.0.0:50051");
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn service_config_builders() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let cfg = ServiceConfig::new(addr)
            .with_postgres(PostgresConfig {
                database: "jobs_test".to_string(),
                ..Default::default()
            })
            .with_reconcile(ReconcileConfig {
                enabled: false,
                ..Default::default()
            });
        assert_eq!(cfg.listen_addr, addr);
        assert_eq!(cfg.postgres.database, "jobs_test");
        assert!(!cfg.reconcile.enabled);
    }
}
