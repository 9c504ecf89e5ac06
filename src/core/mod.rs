//! Core modules shared by every engine component.
//!
//! Storage, the broker audit log, configuration, the injectable clock and
//! the text completion providers live here.

pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod output;
pub mod pool;
pub mod provider;
pub mod schemas;
pub mod store;
pub mod time;
