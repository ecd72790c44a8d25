//! # tui-worker-pool
//!
//! A fixed pool of workers draining a bounded task queue, with live status
//! in a terminal UI. Workers report through a single event stream consumed
//! by the UI, so UI state has exactly one owner. Every diagnostic is fanned
//! out to a text log, a JSON log and an embedded SQLite store.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod event;
pub mod model;
pub mod queue;
pub mod telemetry;
pub mod ui;
