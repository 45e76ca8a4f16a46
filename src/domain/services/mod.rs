mod scoring;

pub use scoring::{Scoring, ScoringConfig};
