//! Application Layer
//!
//! Use cases built on the domain ports: the four-tier cache, the source
//! fallback chain and the orchestrator that ties them together.

pub mod cache_system;
pub mod orchestrator;
pub mod source_manager;
pub mod sources;

pub use cache_system::{CacheConfig, CacheStats, CacheSystem, TierHits};
pub use orchestrator::{
    ApyOrchestrator, ApyRequest, ApyResponse, HealthReport, OrchestratorConfig, RequestOptions,
    RequestStats, ResponseMetadata,
};
pub use source_manager::SourceManager;
pub use sources::{CrossProtocolSource, PersistedSource, PrimarySource, StaticSource};
