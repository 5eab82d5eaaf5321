//! Mirror Configuration
//!
//! Timing knobs for the background reconciler.

use std::time::Duration;

/// Configuration for a [`MirrorSet`](crate::mirror::MirrorSet).
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Time between reconciliation passes (default: 60s)
    pub reconcile_interval: Duration,

    /// How often the idle reconciler checks for shutdown (default: 500ms)
    pub poll_tick: Duration,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(60),
            poll_tick: Duration::from_millis(500),
        }
    }
}

impl MirrorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reconciliation interval.
    pub fn reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = interval;
        self
    }

    /// Set the shutdown poll tick.
    pub fn poll_tick(mut self, tick: Duration) -> Self {
        self.poll_tick = tick;
        self
    }

    /// Number of poll ticks that make up one reconciliation interval.
    pub fn ticks_per_interval(&self) -> u32 {
        let ticks = self.reconcile_interval.as_nanos() / self.poll_tick.as_nanos().max(1);
        ticks.clamp(1, u32::MAX as u128) as u32
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_tick.is_zero() {
            return Err(ConfigError::ZeroPollTick);
        }
        if self.poll_tick > self.reconcile_interval {
            return Err(ConfigError::TickExceedsInterval);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("poll_tick must be greater than zero")]
    ZeroPollTick,
    #[error("poll_tick must not exceed reconcile_interval")]
    TickExceedsInterval,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MirrorConfig::default();
        assert_eq!(config.reconcile_interval, Duration::from_secs(60));
        assert_eq!(config.poll_tick, Duration::from_millis(500));
        assert_eq!(config.ticks_per_interval(), 120);
    }

    #[test]
    fn test_builder_pattern() {
        let config = MirrorConfig::new()
            .reconcile_interval(Duration::from_secs(5))
            .poll_tick(Duration::from_millis(100));

        assert_eq!(config.reconcile_interval, Duration::from_secs(5));
        assert_eq!(config.ticks_per_interval(), 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ticks_never_zero() {
        let config = MirrorConfig::new()
            .reconcile_interval(Duration::from_millis(10))
            .poll_tick(Duration::from_millis(10));
        assert_eq!(config.ticks_per_interval(), 1);
    }

    #[test]
    fn test_validate_zero_tick() {
        let config = MirrorConfig::new().poll_tick(Duration::ZERO);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroPollTick)));
    }

    #[test]
    fn test_validate_tick_longer_than_interval() {
        let config = MirrorConfig::new()
            .reconcile_interval(Duration::from_millis(100))
            .poll_tick(Duration::from_secs(1));
        assert!(matches!(config.validate(), Err(ConfigError::TickExceedsInterval)));
    }
}
