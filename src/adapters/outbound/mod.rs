mod dashmap_apy_store;
mod http_yield_provider;
mod sqlite_apy_store;
mod system_clock;

pub use dashmap_apy_store::DashMapApyStore;
pub use http_yield_provider::{HttpProviderConfig, HttpYieldProvider};
pub use sqlite_apy_store::SqliteApyStore;
pub use system_clock::{ManualClock, SystemClock};
