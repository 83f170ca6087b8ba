//! Metrics Module
//!
//! Session counters exported for Prometheus scraping.

pub mod collector;

pub use collector::Metrics;
