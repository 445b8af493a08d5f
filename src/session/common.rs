//! Venue-agnostic session state machine, backoff, and heartbeat
//! monitoring (§4.4). Generalized from the teacher's
//! `scrapers::binance_session` module — same mechanics, shared across
//! all 8 venues instead of one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::info;

/// Tunable session parameters. Defaults satisfy spec.md §4.4/§7
/// ("backoff >= 2s"); overridable per-process via environment.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,

    pub connect_timeout_ms: u64,
    pub ping_interval_ms: u64,
    pub pong_timeout_ms: u64,
    pub stale_data_timeout_ms: u64,
    pub consecutive_stale_threshold: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: 2_000,
            backoff_max_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.3,

            connect_timeout_ms: 10_000,
            ping_interval_ms: 20_000,
            pong_timeout_ms: 10_000,
            stale_data_timeout_ms: 15_000,
            consecutive_stale_threshold: 3,
        }
    }
}

impl SessionConfig {
    pub fn from_env(prefix: &str) -> Self {
        let mut config = Self::default();
        let var = |suffix: &str| std::env::var(format!("{prefix}_{suffix}"));

        if let Ok(v) = var("BACKOFF_BASE_MS") {
            config.backoff_base_ms = v.parse().unwrap_or(config.backoff_base_ms);
        }
        if let Ok(v) = var("BACKOFF_MAX_MS") {
            config.backoff_max_ms = v.parse().unwrap_or(config.backoff_max_ms);
        }
        if let Ok(v) = var("PING_INTERVAL_MS") {
            config.ping_interval_ms = v.parse().unwrap_or(config.ping_interval_ms);
        }
        if let Ok(v) = var("STALE_DATA_TIMEOUT_MS") {
            config.stale_data_timeout_ms = v.parse().unwrap_or(config.stale_data_timeout_ms);
        }
        config
    }
}

/// State machine states (§4.4). `Faulted` and `Closing` are folded into
/// the transition back to `Connecting`/`Disconnected` — a fault always
/// routes through backoff before the next connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Subscribing,
    Streaming,
    Shutdown,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Subscribing => "SUBSCRIBING",
            Self::Streaming => "STREAMING",
            Self::Shutdown => "SHUTDOWN",
        };
        write!(f, "{s}")
    }
}

/// Exponential backoff with jitter (thundering-herd prevention),
/// identical mechanics to the teacher's `BackoffCalculator`.
#[derive(Debug)]
pub struct BackoffCalculator {
    config: SessionConfig,
    attempt: u32,
    rng_state: u64,
}

impl BackoffCalculator {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            attempt: 0,
            rng_state: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(12345)
                | 1,
        }
    }

    #[inline]
    fn next_random(&mut self) -> f64 {
        self.rng_state ^= self.rng_state << 13;
        self.rng_state ^= self.rng_state >> 7;
        self.rng_state ^= self.rng_state << 17;
        (self.rng_state as f64) / (u64::MAX as f64)
    }

    pub fn next_backoff(&mut self) -> Duration {
        let base = (self.config.backoff_base_ms as f64)
            * self.config.backoff_multiplier.powi(self.attempt as i32);
        let capped = base.min(self.config.backoff_max_ms as f64);

        let jitter_range = capped * self.config.jitter_factor;
        let jitter = (self.next_random() * 2.0 - 1.0) * jitter_range;
        let final_ms = (capped + jitter).max(self.config.backoff_base_ms as f64);

        self.attempt += 1;
        Duration::from_millis(final_ms as u64)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Heartbeat action resulting from a health check (§4.4, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    Ok,
    SendPing,
    PongTimeout,
    DataStale,
}

/// Tracks ping/pong round trips and data staleness for one connection.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: SessionConfig,
    last_ping_sent: Option<Instant>,
    awaiting_pong: bool,
    last_data_received: Instant,
    consecutive_stale_checks: u32,
}

impl HeartbeatMonitor {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            last_ping_sent: None,
            awaiting_pong: false,
            last_data_received: Instant::now(),
            consecutive_stale_checks: 0,
        }
    }

    pub fn reset(&mut self) {
        self.last_ping_sent = None;
        self.awaiting_pong = false;
        self.last_data_received = Instant::now();
        self.consecutive_stale_checks = 0;
    }

    #[inline]
    pub fn record_data_received(&mut self) {
        self.last_data_received = Instant::now();
        self.consecutive_stale_checks = 0;
    }

    pub fn record_ping_sent(&mut self) {
        self.last_ping_sent = Some(Instant::now());
        self.awaiting_pong = true;
    }

    pub fn record_pong_received(&mut self) {
        self.awaiting_pong = false;
    }

    pub fn check(&mut self) -> HeartbeatAction {
        let now = Instant::now();

        if self.awaiting_pong {
            if let Some(ping_time) = self.last_ping_sent {
                if now.duration_since(ping_time) > Duration::from_millis(self.config.pong_timeout_ms)
                {
                    return HeartbeatAction::PongTimeout;
                }
            }
        }

        let data_age = now.duration_since(self.last_data_received);
        if data_age > Duration::from_millis(self.config.stale_data_timeout_ms) {
            self.consecutive_stale_checks += 1;
            if self.consecutive_stale_checks >= self.config.consecutive_stale_threshold {
                return HeartbeatAction::DataStale;
            }
        }

        let should_ping = match self.last_ping_sent {
            None => true,
            Some(ping_time) => {
                now.duration_since(ping_time) > Duration::from_millis(self.config.ping_interval_ms)
            }
        };

        if should_ping && !self.awaiting_pong {
            return HeartbeatAction::SendPing;
        }

        HeartbeatAction::Ok
    }
}

/// Per-session counters, surfaced via periodic `info!` summaries.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    pub connections_attempted: AtomicU64,
    pub connections_succeeded: AtomicU64,
    pub reconnections: AtomicU64,
    pub pong_timeouts: AtomicU64,
    pub data_stale_events: AtomicU64,
    pub frames_decoded: AtomicU64,
    pub frames_dropped: AtomicU64,
}

impl SessionMetrics {
    #[inline]
    pub fn record_connect_attempt(&self) {
        self.connections_attempted.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn record_connect_success(&self) {
        self.connections_succeeded.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn record_reconnection(&self) {
        self.reconnections.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn record_pong_timeout(&self) {
        self.pong_timeouts.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn record_data_stale(&self) {
        self.data_stale_events.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn record_frame_decoded(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> String {
        format!(
            "connects={}/{} reconnects={} pong_timeouts={} stale={} decoded={} dropped={}",
            self.connections_succeeded.load(Ordering::Relaxed),
            self.connections_attempted.load(Ordering::Relaxed),
            self.reconnections.load(Ordering::Relaxed),
            self.pong_timeouts.load(Ordering::Relaxed),
            self.data_stale_events.load(Ordering::Relaxed),
            self.frames_decoded.load(Ordering::Relaxed),
            self.frames_dropped.load(Ordering::Relaxed),
        )
    }
}

pub fn log_transition(exchange: &str, from: SessionState, to: SessionState, reason: &str) {
    info!(exchange, from = %from, to = %to, reason, "session_transition");
}
