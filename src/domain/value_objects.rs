//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use serde::{Deserialize, Serialize};

/// Upper bound for a believable yield percentage.
pub const MAX_PLAUSIBLE_APY: f64 = 50.0;

/// Check whether a yield percentage is plausible.
///
/// Valid values satisfy `0 < v <= 50`. NaN and infinities are rejected.
///
/// # Examples
/// ```
/// use apy_guard::domain::value_objects::is_plausible_apy;
///
/// assert!(is_plausible_apy(8.5));
/// assert!(!is_plausible_apy(0.0));
/// assert!(!is_plausible_apy(75.0));
/// ```
pub fn is_plausible_apy(value: f64) -> bool {
    value.is_finite() && value > 0.0 && value <= MAX_PLAUSIBLE_APY
}

/// Freshness/trust score in `[0, 1]`.
///
/// Construction always clamps, so a `Confidence` can never leave its range.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Confidence(f64);

impl Confidence {
    pub const ZERO: Confidence = Confidence(0.0);
    pub const FULL: Confidence = Confidence(1.0);

    /// Create a confidence, clamping into `[0, 1]` (NaN becomes 0).
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self::ZERO;
        }
        Self(value.clamp(0.0, 1.0))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Multiply by a factor, staying within range.
    pub fn scale(self, factor: f64) -> Self {
        Self::new(self.0 * factor)
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self::FULL
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Cache tier that served a value.
///
/// Tiers are numbered by speed: L1 is the global hot slot, L2 the per-user
/// session map, L3 the persisted store and L4 the static constants.
/// Reads with a user id consult L2 before L1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    /// L1 - single global slot
    Global,
    /// L2 - per-user session entries
    Session,
    /// L3 - persisted store
    Persisted,
    /// L4 - static constants
    Static,
}

impl CacheTier {
    /// Parse a tier from its level name (`l1`..`l4`) or descriptive name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "l1" | "global" => Some(Self::Global),
            "l2" | "session" => Some(Self::Session),
            "l3" | "persisted" => Some(Self::Persisted),
            "l4" | "static" => Some(Self::Static),
            _ => None,
        }
    }

    /// Convert to the short level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "l1",
            Self::Session => "l2",
            Self::Persisted => "l3",
            Self::Static => "l4",
        }
    }
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregate health classification of the whole subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallHealth {
    Healthy,
    Degraded,
    Critical,
}

impl OverallHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Critical => "critical",
        }
    }
}

impl Default for OverallHealth {
    fn default() -> Self {
        Self::Healthy
    }
}

impl std::fmt::Display for OverallHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
