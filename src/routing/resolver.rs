//! Cache-then-directory resolution.

use std::sync::Arc;

use tracing::{debug, warn};

use super::cache::{RoutingCache, TtlCache};
use super::directory::SdsDirectory;
use super::types::{EndpointDetails, ReliabilityDetails, RoutingAndReliability};
use super::RoutingError;

/// Resolves endpoint and reliability details for an org/interaction pair.
///
/// Cache problems never fail a resolution: a read error is logged and
/// treated as a miss, a write error is logged and the freshly resolved
/// value returned anyway.
pub struct RoutingResolver {
    directory: SdsDirectory,
    cache: Arc<dyn RoutingCache>,
}

impl RoutingResolver {
    pub fn new(directory: SdsDirectory, cache: Arc<dyn RoutingCache>) -> Self {
        Self { directory, cache }
    }

    /// Resolver over the stock in-process TTL cache.
    pub fn with_ttl_cache(directory: SdsDirectory, ttl: std::time::Duration) -> Self {
        Self::new(
            directory,
            Arc::new(TtlCache::<RoutingAndReliability>::new(ttl)),
        )
    }

    pub async fn endpoint(
        &self,
        org_code: &str,
        service_id: &str,
    ) -> Result<EndpointDetails, RoutingError> {
        Ok(self.resolve(org_code, service_id).await?.endpoint())
    }

    pub async fn reliability(
        &self,
        org_code: &str,
        service_id: &str,
    ) -> Result<ReliabilityDetails, RoutingError> {
        Ok(self.resolve(org_code, service_id).await?.reliability())
    }

    async fn resolve(
        &self,
        org_code: &str,
        service_id: &str,
    ) -> Result<RoutingAndReliability, RoutingError> {
        let key = format!("{org_code}-{service_id}");

        match self.cache.get(&key).await {
            Ok(Some(cached)) => {
                debug!(key = %key, "Routing resolved from cache");
                return Ok(cached);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "Routing cache read failed, treating as miss");
            }
        }

        let resolved = self.directory.lookup(org_code, service_id).await?;

        if let Err(e) = self.cache.put(&key, resolved.clone()).await {
            warn!(key = %key, error = %e, "Routing cache write failed, returning resolved value");
        }

        Ok(resolved)
    }
}
