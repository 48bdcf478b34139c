//! Synthetic write-load generator for document stores.

pub mod backoff;
pub mod bench;
pub mod config;
pub mod document;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod output;
pub mod store;
pub mod worker;
