use crate::core::{Result, ShardError};
use std::net::SocketAddr;
use std::time::Duration;

/// Default number of events retained by the control-plane event log.
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 50;
/// Default router shard-map cache TTL.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(5000);

/// Thresholds used by the failover `detect` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthThresholds {
    /// Replica lag above which a shard is considered degraded.
    pub max_replica_lag_secs: u64,
    /// WAL segments awaiting shipment above which a shard is considered degraded.
    pub max_wal_backlog: u64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_replica_lag_secs: 10,
            max_wal_backlog: 15,
        }
    }
}

/// Control-plane configuration
#[derive(Debug, Clone)]
pub struct ControlPlaneConfig {
    /// Address the HTTP transport binds to
    pub listen_addr: SocketAddr,

    /// Events kept in the ring buffer; the oldest is dropped on overflow
    pub event_log_capacity: usize,

    /// Failover detection thresholds
    pub health: HealthThresholds,

    /// Largest LSN gap tolerated between new primary and replicas during verify
    pub max_verify_lsn_gap: u64,

    /// Load the reference topology on startup
    pub seed_demo: bool,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 4000)),
            event_log_capacity: DEFAULT_EVENT_LOG_CAPACITY,
            health: HealthThresholds::default(),
            max_verify_lsn_gap: 0,
            seed_demo: false,
        }
    }
}

impl ControlPlaneConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `PORT` and `EVENT_LOG_CAPACITY` on top of the defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(port) = env_parse::<u16>("PORT")? {
            config.listen_addr.set_port(port);
        }
        if let Some(capacity) = env_parse::<usize>("EVENT_LOG_CAPACITY")? {
            config = config.event_log_capacity(capacity);
        }
        config.validate()?;
        Ok(config)
    }

    /// Set the listen address
    pub fn listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    /// Set the event log capacity
    pub fn event_log_capacity(mut self, capacity: usize) -> Self {
        self.event_log_capacity = capacity;
        self
    }

    /// Set failover detection thresholds
    pub fn health(mut self, health: HealthThresholds) -> Self {
        self.health = health;
        self
    }

    /// Set the tolerated LSN gap for failover verification
    pub fn max_verify_lsn_gap(mut self, gap: u64) -> Self {
        self.max_verify_lsn_gap = gap;
        self
    }

    /// Enable or disable the demo seed
    pub fn seed_demo(mut self, seed: bool) -> Self {
        self.seed_demo = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_log_capacity == 0 {
            return Err(ShardError::Validation(
                "event_log_capacity must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Router (data-plane) configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Address the router HTTP transport binds to
    pub listen_addr: SocketAddr,

    /// Base URL of the control plane serving `/shard-map`
    pub control_plane_url: String,

    /// Maximum cache age before the shard map is refetched
    pub cache_ttl: Duration,

    /// Upper bound on a single shard-map fetch
    pub fetch_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 4100)),
            control_plane_url: "http://localhost:4000".to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            fetch_timeout: Duration::from_secs(2),
        }
    }
}

impl RouterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `PORT`, `CONTROL_PLANE_URL` and `ROUTER_CACHE_TTL_MS` on top of the defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(port) = env_parse::<u16>("PORT")? {
            config.listen_addr.set_port(port);
        }
        if let Ok(url) = std::env::var("CONTROL_PLANE_URL") {
            config = config.control_plane_url(url);
        }
        if let Some(ttl_ms) = env_parse::<u64>("ROUTER_CACHE_TTL_MS")? {
            config = config.cache_ttl(Duration::from_millis(ttl_ms));
        }
        config.validate()?;
        Ok(config)
    }

    /// Set the listen address
    pub fn listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    /// Set the control plane base URL
    pub fn control_plane_url(mut self, url: impl Into<String>) -> Self {
        self.control_plane_url = url.into();
        self
    }

    /// Set the cache TTL
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the fetch timeout
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.control_plane_url.trim().is_empty() {
            return Err(ShardError::Validation(
                "control_plane_url must not be empty".to_string(),
            ));
        }
        if self.fetch_timeout.is_zero() {
            return Err(ShardError::Validation(
                "fetch_timeout must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ShardError::Validation(format!("{key} has an invalid value '{raw}'"))),
        Err(_) => Ok(None),
    }
}
