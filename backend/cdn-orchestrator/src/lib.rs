//! Multi-provider content delivery orchestration
//!
//! Distributes uploads across several edge providers, routes reads to the
//! best healthy copy, keeps per-provider circuit breakers, coordinates purges
//! and reports usage and cost.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod services;

pub use config::Settings;
pub use error::{CdnError, Result};
pub use orchestrator::{CdnOrchestrator, ProviderView, SystemStatus};
