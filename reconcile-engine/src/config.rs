//! Resolver configuration.

use std::time::Duration;

/// Retry policy for the merge transaction and for re-resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Total attempts for a merge that keeps hitting serialization
    /// failures or deadlocks. Always at least 1.
    pub max_merge_attempts: u32,
    /// Base backoff between merge attempts; attempt `n` waits `n * backoff`.
    pub merge_retry_backoff: Duration,
    /// Total pipeline passes when a concurrent merge moves the resolved
    /// primary before the cluster is loaded or enriched. Always at least 1.
    pub max_resolution_passes: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_merge_attempts: 3,
            merge_retry_backoff: Duration::from_millis(25),
            max_resolution_passes: 3,
        }
    }
}

impl ResolverConfig {
    /// Create configuration from environment variables.
    ///
    /// - `RECONCILE_MERGE_MAX_ATTEMPTS` (default: 3)
    /// - `RECONCILE_MERGE_RETRY_BACKOFF_MS` (default: 25)
    /// - `RECONCILE_RESOLUTION_MAX_PASSES` (default: 3)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_merge_attempts = std::env::var("RECONCILE_MERGE_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.max_merge_attempts);
        let merge_retry_backoff = std::env::var("RECONCILE_MERGE_RETRY_BACKOFF_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.merge_retry_backoff);
        let max_resolution_passes = std::env::var("RECONCILE_RESOLUTION_MAX_PASSES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.max_resolution_passes);

        Self {
            max_merge_attempts,
            merge_retry_backoff,
            max_resolution_passes,
        }
        .normalized()
    }

    /// No retries, no waiting.
    pub fn single_attempt() -> Self {
        Self {
            max_merge_attempts: 1,
            merge_retry_backoff: Duration::ZERO,
            max_resolution_passes: 1,
        }
    }

    fn normalized(mut self) -> Self {
        self.max_merge_attempts = self.max_merge_attempts.max(1);
        self.max_resolution_passes = self.max_resolution_passes.max(1);
        self
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.max_merge_attempts.max(1)
    }

    pub(crate) fn passes(&self) -> u32 {
        self.max_resolution_passes.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ResolverConfig::default();
        assert_eq!(config.max_merge_attempts, 3);
        assert_eq!(config.merge_retry_backoff, Duration::from_millis(25));
        assert_eq!(config.max_resolution_passes, 3);
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        let config = ResolverConfig {
            max_merge_attempts: 0,
            merge_retry_backoff: Duration::ZERO,
            max_resolution_passes: 0,
        };
        assert_eq!(config.attempts(), 1);
        assert_eq!(config.passes(), 1);
        let config = config.normalized();
        assert_eq!(config.max_merge_attempts, 1);
        assert_eq!(config.max_resolution_passes, 1);
    }
}
