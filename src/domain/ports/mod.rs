mod apy_source;
mod apy_store;
mod clock;
mod yield_provider;

pub use apy_source::ApySource;
pub use apy_store::ApyStore;
pub use clock::Clock;
pub use yield_provider::YieldProvider;
