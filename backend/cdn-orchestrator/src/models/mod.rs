//! Data model shared by the orchestration services

pub mod file;
pub mod geo;
pub mod health;
pub mod provider;

pub use file::{DistributedFile, FileAnalytics, PlacementStatus, ProviderPlacement, ProviderUsage};
pub use geo::{Coordinates, GeoLocation};
pub use health::{BreakerState, HealthState, HealthStatus};
pub use provider::{
    Capabilities, Pricing, ProviderConfig, ProviderDefinition, ProviderKind, ProviderTimeouts,
};
