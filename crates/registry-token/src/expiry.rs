//! Renewal timing for issued tokens.

use chrono::{DateTime, Duration, Utc};

/// Default minimum remaining validity, in seconds.
pub const DEFAULT_THRESHOLD_SECS: u64 = 600;

/// Decides when a token is due for reissue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPlanner {
    /// Lifetime of a freshly issued token
    pub ttl: Duration,
    /// Minimum remaining validity before renewal
    pub threshold: Duration,
}

impl ExpiryPlanner {
    pub fn new(ttl: Duration, threshold: Duration) -> Self {
        Self { ttl, threshold }
    }

    /// Expiry to sign into the next token.
    ///
    /// Keeps `prior` while it is still outside the threshold window so an
    /// unchanged token is not rotated needlessly.
    pub fn compute_expire(
        &self,
        now: DateTime<Utc>,
        prior: Option<DateTime<Utc>>,
    ) -> DateTime<Utc> {
        match prior {
            Some(prior) if now + self.threshold <= prior => prior,
            _ => now + self.ttl,
        }
    }

    /// Whether an observed expiry still leaves at least `threshold` of validity.
    pub fn insync(&self, observed: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        observed - now >= self.threshold
    }
}
