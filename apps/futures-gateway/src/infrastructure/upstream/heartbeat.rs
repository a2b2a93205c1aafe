//! Heartbeat Monitor
//!
//! Tracks liveness of the upstream socket. The connection loop ticks the
//! monitor on a fixed interval; each tick either asks for a ping or reports
//! that the socket has been silent past the timeout. Any inbound frame
//! counts as proof of life.

use std::time::{Duration, Instant};

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between pings.
    pub ping_interval: Duration,
    /// Silence after which the connection is considered dead.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Action requested by a heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Send a ping frame.
    SendPing,
    /// Drop the connection.
    TimedOut,
}

/// Liveness state for one connection.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    last_seen: Instant,
}

impl HeartbeatMonitor {
    /// Start monitoring a freshly opened connection.
    #[must_use]
    pub fn new(config: HeartbeatConfig) -> Self {
        Self::started_at(config, Instant::now())
    }

    fn started_at(config: HeartbeatConfig, now: Instant) -> Self {
        Self {
            config,
            last_seen: now,
        }
    }

    /// Ping interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.config.ping_interval
    }

    /// Record inbound traffic.
    pub fn saw_traffic(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Decide what to do on an interval tick.
    #[must_use]
    pub fn on_tick(&self) -> HeartbeatAction {
        self.on_tick_at(Instant::now())
    }

    fn on_tick_at(&self, now: Instant) -> HeartbeatAction {
        if now.saturating_duration_since(self.last_seen) > self.config.timeout {
            HeartbeatAction::TimedOut
        } else {
            HeartbeatAction::SendPing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HeartbeatConfig {
        HeartbeatConfig {
            ping_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(25),
        }
    }

    #[test]
    fn pings_while_traffic_is_recent() {
        let start = Instant::now();
        let monitor = HeartbeatMonitor::started_at(config(), start);
        assert_eq!(monitor.on_tick_at(start + Duration::from_secs(10)), HeartbeatAction::SendPing);
        assert_eq!(monitor.on_tick_at(start + Duration::from_secs(20)), HeartbeatAction::SendPing);
    }

    #[test]
    fn times_out_after_silence() {
        let start = Instant::now();
        let monitor = HeartbeatMonitor::started_at(config(), start);
        assert_eq!(monitor.on_tick_at(start + Duration::from_secs(30)), HeartbeatAction::TimedOut);
    }

    #[test]
    fn traffic_resets_the_clock() {
        let mut monitor = HeartbeatMonitor::started_at(config(), Instant::now() - Duration::from_secs(60));
        monitor.saw_traffic();
        assert_eq!(monitor.on_tick(), HeartbeatAction::SendPing);
    }
}
