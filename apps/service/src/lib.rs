//! Beacon - HTTP endpoint uptime monitoring.
//!
//! Endpoints are probed on a schedule through a local job queue. Every probe
//! is recorded, drives the UP/DEGRADED/DOWN state machine, opens and resolves
//! incidents and fans status changes out to notification channels.

pub mod alerts;
pub mod cache;
pub mod config;
pub mod database;
pub mod endpoints;
pub mod error;
pub mod events;
pub mod expiry;
pub mod monitoring;
pub mod orchestrator;
pub mod pool;
pub mod scheduler;
pub mod stats;
pub mod validation;

pub use config::Config;
pub use error::{MonitorError, MonitorResult};
pub use orchestrator::Orchestrator;
