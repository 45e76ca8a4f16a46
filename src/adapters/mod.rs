//! Adapters
//!
//! Inbound: the HTTP status and admin surface.
//! Outbound: implementations of the domain ports.

pub mod inbound;
pub mod outbound;
