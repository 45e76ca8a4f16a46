//! Domain Layer
//!
//! Pure data, error taxonomy, ports and scoring logic. Nothing here performs I/O.

pub mod entities;
pub mod errors;
pub mod ports;
pub mod services;
pub mod value_objects;

pub use errors::ApyError;
pub use value_objects::{CacheTier, Confidence, OverallHealth};
