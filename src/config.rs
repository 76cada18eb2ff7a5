//! Resolver configuration

use std::time::Duration;

/// Tunables applied at [`Resolver`](crate::Resolver) construction.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Number of record cache shards.
    pub cache_shards: usize,

    /// Number of server registry shards.
    pub comm_shards: usize,

    /// How long to wait on one nameserver before moving to the next.
    pub query_timeout: Duration,

    /// Expiry applied to every record ingested from a response.
    ///
    /// The responses' own TTL fields are ignored; honoring them per
    /// record is a local change to the ingest step.
    pub record_ttl: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_shards: 1024,
            comm_shards: 64,
            query_timeout: Duration::from_secs(3),
            record_ttl: Duration::from_secs(365 * 24 * 60 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.cache_shards, 1024);
        assert_eq!(config.comm_shards, 64);
        assert_eq!(config.query_timeout, Duration::from_secs(3));
        assert_eq!(config.record_ttl, Duration::from_secs(365 * 24 * 60 * 60));
    }
}
