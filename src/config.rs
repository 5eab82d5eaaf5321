use crate::mirror::MirrorConfig;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Stores
    pub sqlite_path: Option<String>,
    pub memory_stores: usize,

    // Reconciliation
    pub reconcile_secs: u64,
    pub poll_tick_ms: u64,

    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sqlite_path: None,
            memory_stores: 1,
            reconcile_secs: 60,
            poll_tick_ms: 500,
            debug: false,
        }
    }
}

impl Config {
    /// Reconciler timing derived from the process settings.
    pub fn mirror_config(&self) -> MirrorConfig {
        MirrorConfig::default()
            .reconcile_interval(Duration::from_secs(self.reconcile_secs))
            .poll_tick(Duration::from_millis(self.poll_tick_ms))
    }

    /// Total number of stores the process will attach.
    pub fn store_count(&self) -> usize {
        self.memory_stores + usize::from(self.sqlite_path.is_some())
    }
}

pub fn load_config() -> anyhow::Result<Config> {
    let sqlite_path = std::env::var("MIRROR_SQLITE_PATH")
        .ok()
        .filter(|p| !p.trim().is_empty());

    let memory_stores = std::env::var("MIRROR_MEMORY_STORES")
        .unwrap_or_else(|_| "1".to_string())
        .parse()
        .unwrap_or(1);

    let reconcile_secs = std::env::var("MIRROR_RECONCILE_SECS")
        .unwrap_or_else(|_| "60".to_string())
        .parse()
        .unwrap_or(60);

    let poll_tick_ms = std::env::var("MIRROR_POLL_TICK_MS")
        .unwrap_or_else(|_| "500".to_string())
        .parse()
        .unwrap_or(500);

    let debug = std::env::var("DEBUG").is_ok();

    Ok(Config {
        sqlite_path,
        memory_stores,
        reconcile_secs,
        poll_tick_ms,
        debug,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    // Tests below mutate process environment.
    static ENV: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.memory_stores, 1);
        assert_eq!(cfg.reconcile_secs, 60);
        assert_eq!(cfg.poll_tick_ms, 500);
        assert!(cfg.sqlite_path.is_none());
        assert_eq!(cfg.store_count(), 1);
    }

    #[test]
    fn test_default_mirror_config_is_valid() {
        let mirror = Config::default().mirror_config();
        assert_eq!(mirror.reconcile_interval, Duration::from_secs(60));
        assert_eq!(mirror.poll_tick, Duration::from_millis(500));
        assert!(mirror.validate().is_ok());
    }

    #[test]
    fn test_load_config_defaults() {
        let _env = ENV.lock();
        std::env::remove_var("MIRROR_SQLITE_PATH");
        std::env::remove_var("MIRROR_MEMORY_STORES");
        std::env::remove_var("MIRROR_RECONCILE_SECS");
        std::env::remove_var("MIRROR_POLL_TICK_MS");

        let cfg = load_config().unwrap();
        assert!(cfg.sqlite_path.is_none());
        assert_eq!(cfg.memory_stores, 1);
        assert_eq!(cfg.reconcile_secs, 60);
        assert_eq!(cfg.poll_tick_ms, 500);
    }

    #[test]
    fn test_load_config_with_sqlite_path() {
        let _env = ENV.lock();
        std::env::set_var("MIRROR_SQLITE_PATH", "/tmp/mirror.db");
        std::env::set_var("MIRROR_MEMORY_STORES", "2");
        let cfg = load_config().unwrap();
        assert_eq!(cfg.sqlite_path, Some("/tmp/mirror.db".to_string()));
        assert_eq!(cfg.store_count(), 3);
        std::env::remove_var("MIRROR_SQLITE_PATH");
        std::env::remove_var("MIRROR_MEMORY_STORES");
    }

    #[test]
    fn test_load_config_blank_sqlite_path_is_unset() {
        let _env = ENV.lock();
        std::env::set_var("MIRROR_SQLITE_PATH", "  ");
        let cfg = load_config().unwrap();
        assert!(cfg.sqlite_path.is_none());
        std::env::remove_var("MIRROR_SQLITE_PATH");
    }

    #[test]
    fn test_load_config_with_timing() {
        let _env = ENV.lock();
        std::env::set_var("MIRROR_RECONCILE_SECS", "5");
        std::env::set_var("MIRROR_POLL_TICK_MS", "100");
        let cfg = load_config().unwrap();
        assert_eq!(cfg.reconcile_secs, 5);
        assert_eq!(cfg.mirror_config().ticks_per_interval(), 50);
        std::env::remove_var("MIRROR_RECONCILE_SECS");
        std::env::remove_var("MIRROR_POLL_TICK_MS");
    }

    #[test]
    fn test_load_config_parse_error_uses_default() {
        let _env = ENV.lock();
        std::env::set_var("MIRROR_RECONCILE_SECS", "not_a_number");
        let cfg = load_config().unwrap();
        assert_eq!(cfg.reconcile_secs, 60); // default
        std::env::remove_var("MIRROR_RECONCILE_SECS");
    }

    #[test]
    fn test_load_config_with_debug() {
        let _env = ENV.lock();
        std::env::set_var("DEBUG", "1");
        let cfg = load_config().unwrap();
        assert!(cfg.debug);
        std::env::remove_var("DEBUG");
    }
}
