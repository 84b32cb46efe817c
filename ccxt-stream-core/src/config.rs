//! Connection, heartbeat, reconnect and cache-limit configuration.
//!
//! Every struct implements `Default` with the values exchanges commonly use and
//! derives `Deserialize` with `#[serde(default)]`, so an adapter can load a
//! partial override from any serde format. Durations serialize as milliseconds.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default maximum number of recorded subscriptions per connection.
pub const DEFAULT_MAX_SUBSCRIPTIONS: usize = 200;

/// Default bound for trades, orders, my-trades and candle caches.
pub const DEFAULT_CACHE_LIMIT: usize = 1000;

/// Default number of deltas buffered before a book's first snapshot.
pub const DEFAULT_ORDERBOOK_BUFFER: usize = 100;

/// Default bound for fills parked while their order is unknown.
pub const DEFAULT_PENDING_FILLS: usize = 256;

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Liveness policy for one connection.
///
/// A probe is sent every `interval`. If nothing that counts as alive arrives
/// within `interval * timeout_multiple`, the connection is declared dead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Probe interval; zero disables the heartbeat.
    #[serde(with = "duration_ms")]
    pub interval: Duration,
    /// Number of intervals without a liveness signal before timing out.
    pub timeout_multiple: u32,
    /// Treat any inbound frame as a liveness signal, not only pong frames.
    pub traffic_counts_as_alive: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(15_000),
            timeout_multiple: 2,
            traffic_counts_as_alive: true,
        }
    }
}

impl HeartbeatConfig {
    /// Heartbeat with the given probe interval and default timeout multiple.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    /// Disabled heartbeat.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Sets the timeout multiple.
    pub fn with_timeout_multiple(mut self, multiple: u32) -> Self {
        self.timeout_multiple = multiple.max(1);
        self
    }

    /// Only pong frames count as liveness.
    pub fn pong_only(mut self) -> Self {
        self.traffic_counts_as_alive = false;
        self
    }

    /// Whether the heartbeat task should run.
    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Window after which a silent connection is dead.
    pub fn timeout(&self) -> Duration {
        self.interval.saturating_mul(self.timeout_multiple.max(1))
    }
}

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Base delay for the first retry (default: 1 second)
    #[serde(with = "duration_ms")]
    pub base_delay: Duration,
    /// Maximum delay cap (default: 60 seconds)
    #[serde(with = "duration_ms")]
    pub max_delay: Duration,
    /// Jitter factor (0.0 - 1.0, default: 0.25 for 25%)
    pub jitter_factor: f64,
    /// Multiplier for exponential growth (default: 2.0)
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.25,
            multiplier: 2.0,
        }
    }
}

/// Calculates retry delay with exponential backoff and jitter.
#[derive(Debug, Clone)]
pub struct BackoffStrategy {
    config: BackoffConfig,
}

impl BackoffStrategy {
    /// Creates a new backoff strategy with the given configuration.
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// Delay before the given attempt; attempt `0` means the first reconnect.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let capped_delay_ms = self.capped_delay_ms(attempt);

        let jitter_ms = if self.config.jitter_factor > 0.0 {
            let jitter_range = capped_delay_ms * self.config.jitter_factor;
            rand::rng().random::<f64>() * jitter_range
        } else {
            0.0
        };

        Self::to_duration(capped_delay_ms + jitter_ms)
    }

    /// Delay before the given attempt, without jitter.
    pub fn calculate_delay_without_jitter(&self, attempt: u32) -> Duration {
        Self::to_duration(self.capped_delay_ms(attempt))
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn capped_delay_ms(&self, attempt: u32) -> f64 {
        let base_ms = self.config.base_delay.as_millis() as f64;
        let max_ms = self.config.max_delay.as_millis() as f64;
        let exponent = attempt.min(i32::MAX as u32) as i32;
        (base_ms * self.config.multiplier.powi(exponent)).min(max_ms)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn to_duration(ms: f64) -> Duration {
        Duration::from_millis(ms.max(0.0) as u64)
    }
}

/// What happens when a dead connection is replaced by the pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Replay recorded subscribe frames, in registration order, on the replacement connection.
    pub resubscribe: bool,
    /// Delay applied between consecutive failed connection attempts to one URL.
    pub backoff: BackoffConfig,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            resubscribe: true,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Capacity of each bounded cache and buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheLimits {
    /// Public trades per symbol.
    pub trades: usize,
    /// Live orders across all symbols.
    pub orders: usize,
    /// Private fills per symbol.
    pub my_trades: usize,
    /// Candles per (symbol, timeframe).
    pub ohlcv: usize,
    /// Fills waiting for their order to appear.
    pub pending_fills: usize,
    /// Deltas buffered before a book's first snapshot.
    pub orderbook_buffer: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            trades: DEFAULT_CACHE_LIMIT,
            orders: DEFAULT_CACHE_LIMIT,
            my_trades: DEFAULT_CACHE_LIMIT,
            ohlcv: DEFAULT_CACHE_LIMIT,
            pending_fills: DEFAULT_PENDING_FILLS,
            orderbook_buffer: DEFAULT_ORDERBOOK_BUFFER,
        }
    }
}

/// Per-connection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WsConfig {
    /// Handshake timeout.
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Time allowed for a close frame to flush on shutdown.
    #[serde(with = "duration_ms")]
    pub shutdown_timeout: Duration,
    /// Maximum number of recorded subscriptions.
    pub max_subscriptions: usize,
    /// Liveness policy.
    pub heartbeat: HeartbeatConfig,
    /// Replacement policy after a fatal error.
    pub reconnect: ReconnectPolicy,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
            max_subscriptions: DEFAULT_MAX_SUBSCRIPTIONS,
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl WsConfig {
    /// Sets the handshake timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the heartbeat policy.
    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Sets the reconnect policy.
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Sets the subscription capacity.
    pub fn with_max_subscriptions(mut self, max: usize) -> Self {
        self.max_subscriptions = max;
        self
    }
}
