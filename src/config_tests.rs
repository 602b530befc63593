use crate::config::Config;
use std::env;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::OnceLock;

// Serializes tests that touch process environment variables.
static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn get_env_lock() -> &'static Mutex<()> {
    ENV_LOCK.get_or_init(|| Mutex::new(()))
}

const VARS: &[&str] = &[
    "LABSCOPE_CACHE_DIR",
    "LABSCOPE_EXPORT_REPORTS",
    "LABSCOPE_DEFAULT_STARTING_BALANCE",
    "LABSCOPE_WORKERS",
    "LABSCOPE_ROI_DIVERGENCE_PCT",
    "LABSCOPE_PAGE_SIZE",
    "LABSCOPE_LOW_RISK_THRESHOLD",
    "LABSCOPE_MEDIUM_RISK_THRESHOLD",
    "LABSCOPE_RANGE_MAX_VALUES",
];

fn clear_vars() {
    for var in VARS {
        unsafe { env::remove_var(var) };
    }
}

#[test]
fn test_config_defaults() {
    let _guard = get_env_lock().lock().unwrap();
    clear_vars();

    let config = Config::from_env().unwrap();
    assert_eq!(config.cache.cache_dir, PathBuf::from("./.labscope_cache"));
    assert!(config.cache.export_reports);
    assert_eq!(config.analysis.default_starting_balance, 10_000.0);
    assert_eq!(config.analysis.workers, 4);
    assert_eq!(config.analysis.page_size, 100);
    assert_eq!(config.robustness.low_risk_threshold, 70.0);
    assert_eq!(config.ranges.max_values, 10);
}

#[test]
fn test_config_overrides() {
    let _guard = get_env_lock().lock().unwrap();
    clear_vars();
    unsafe {
        env::set_var("LABSCOPE_CACHE_DIR", "/tmp/labscope");
        env::set_var("LABSCOPE_EXPORT_REPORTS", "false");
        env::set_var("LABSCOPE_DEFAULT_STARTING_BALANCE", "2500");
        env::set_var("LABSCOPE_WORKERS", "8");
        env::set_var("LABSCOPE_RANGE_MAX_VALUES", "6");
    }

    let config = Config::from_env().unwrap();
    assert_eq!(config.cache.cache_dir, PathBuf::from("/tmp/labscope"));
    assert!(!config.cache.export_reports);
    assert_eq!(config.analysis.default_starting_balance, 2500.0);
    assert_eq!(config.analysis.workers, 8);
    assert_eq!(config.ranges.max_values, 6);

    clear_vars();
}

#[test]
fn test_config_rejects_bad_values() {
    let _guard = get_env_lock().lock().unwrap();
    clear_vars();

    unsafe { env::set_var("LABSCOPE_WORKERS", "many") };
    assert!(Config::from_env().is_err());
    clear_vars();

    unsafe {
        env::set_var("LABSCOPE_LOW_RISK_THRESHOLD", "30");
        env::set_var("LABSCOPE_MEDIUM_RISK_THRESHOLD", "50");
    }
    assert!(Config::from_env().is_err());
    clear_vars();
}
