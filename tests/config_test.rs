use std::io::Write;
use std::time::Duration;

use tui_worker_pool::config::Config;

#[test]
fn defaults_match_the_reference_console() {
    let config = Config::default();
    assert_eq!(config.workers, 5);
    assert_eq!(config.queue_capacity(), 5);
    assert_eq!(config.work_duration(), Duration::from_secs(5));
    assert_eq!(config.work_timeout(), None);
    assert_eq!(config.tick_interval(), Duration::from_millis(100));
    assert_eq!(config.input_char_limit, 156);
    assert!(config.validate().is_ok());
}

#[test]
fn file_overrides_defaults_and_env_overrides_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "workers = 3\nwork_ms = 250\nlog_dir = \"/tmp/workpool\"").unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.workers, 3);
    assert_eq!(config.queue_capacity(), 3);
    assert_eq!(config.work_ms, 250);
    assert_eq!(config.tick_ms, 100);

    // Kept in one test: the environment is process-wide.
    unsafe {
        std::env::set_var("WORKPOOL_WORKERS", "8");
        std::env::set_var("WORKPOOL_QUEUE_CAPACITY", "2");
        std::env::set_var("WORKPOOL_WORK_TIMEOUT_MS", "1500");
    }
    let config = config.with_env().unwrap();
    assert_eq!(config.workers, 8);
    assert_eq!(config.queue_capacity(), 2);
    assert_eq!(config.work_timeout(), Some(Duration::from_millis(1500)));
    assert_eq!(config.work_ms, 250);

    unsafe {
        std::env::set_var("WORKPOOL_WORKERS", "many");
    }
    assert!(Config::from_env().is_err());

    unsafe {
        std::env::remove_var("WORKPOOL_WORKERS");
        std::env::remove_var("WORKPOOL_QUEUE_CAPACITY");
        std::env::remove_var("WORKPOOL_WORK_TIMEOUT_MS");
    }
}

#[test]
fn unknown_keys_are_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "wokers = 3").unwrap();
    assert!(Config::from_file(file.path()).is_err());
}

#[test]
fn validate_rejects_zero_sizes() {
    let zero_workers = Config {
        workers: 0,
        ..Config::default()
    };
    assert!(zero_workers.validate().is_err());

    let zero_capacity = Config {
        queue_capacity: Some(0),
        ..Config::default()
    };
    assert!(zero_capacity.validate().is_err());

    let zero_tick = Config {
        tick_ms: 0,
        ..Config::default()
    };
    assert!(zero_tick.validate().is_err());
}
