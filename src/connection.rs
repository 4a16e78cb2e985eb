//! Connection lifecycle state for the reconnect loop
//!
//! Pure data model: transitions are functions of the current state, the
//! tick time and the transport's reported connectivity, so the whole
//! machine is unit-testable without a network.

use std::time::{Duration, Instant};

/// Seconds added per backoff level between connect attempts.
pub const BACKOFF_BASE_SECS: u64 = 5;

/// Ceiling for the backoff level. Caps the retry delay at
/// `MAX_BACKOFF_LEVEL * BACKOFF_BASE_SECS` seconds.
pub const MAX_BACKOFF_LEVEL: u8 = 12;

/// Connection state as seen by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Out of the reconnect loop entirely (explicit shutdown).
    Disconnected,
    /// Waiting for the next attempt. `last_attempt` is `None` until the
    /// first attempt has been made, which makes that attempt due
    /// immediately.
    Connecting {
        backoff: u8,
        last_attempt: Option<Instant>,
    },
    /// Transport reported a live session, most recently at `last_seen`.
    Connected { last_seen: Instant },
}

impl ConnectionState {
    /// Initial state: connecting, no delay before the first attempt.
    pub fn startup() -> Self {
        ConnectionState::Connecting {
            backoff: 0,
            last_attempt: None,
        }
    }

    /// Linear retry delay for a backoff level, capped.
    pub fn retry_delay(backoff: u8) -> Duration {
        Duration::from_secs(u64::from(backoff.min(MAX_BACKOFF_LEVEL)) * BACKOFF_BASE_SECS)
    }

    /// Whether a connect attempt is due. Only ever true in `Connecting`.
    pub fn attempt_due(&self, now: Instant) -> bool {
        match self {
            ConnectionState::Connecting {
                backoff,
                last_attempt,
            } => match last_attempt {
                None => true,
                Some(last) => now.duration_since(*last) >= Self::retry_delay(*backoff),
            },
            _ => false,
        }
    }

    /// Record a failed or skipped attempt: saturating backoff increment,
    /// attempt clock restarted.
    pub fn record_failure(&mut self, now: Instant) {
        if let ConnectionState::Connecting {
            backoff,
            last_attempt,
        } = self
        {
            *backoff = backoff.saturating_add(1).min(MAX_BACKOFF_LEVEL);
            *last_attempt = Some(now);
        }
    }

    /// Record a successful connect or an already-connected transport.
    pub fn record_success(&mut self, now: Instant) {
        *self = ConnectionState::Connected { last_seen: now };
    }

    /// Record a detected drop of an established session. Counts as one
    /// failed attempt so the next retry lands a base interval later
    /// instead of hammering the broker.
    pub fn record_drop(&mut self, now: Instant) {
        *self = ConnectionState::Connecting {
            backoff: 1,
            last_attempt: Some(now),
        };
    }

    /// Refresh the liveness timestamp while connected. Keeps the retry
    /// clock warm so a future drop does not immediately re-fire.
    pub fn refresh(&mut self, now: Instant) {
        if let ConnectionState::Connected { last_seen } = self {
            *last_seen = now;
        }
    }

    /// Current backoff level; zero outside of `Connecting`.
    pub fn backoff_level(&self) -> u8 {
        match self {
            ConnectionState::Connecting { backoff, .. } => *backoff,
            _ => 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }
}
