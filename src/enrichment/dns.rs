//! Résolution DNS inverse des adresses observées

use super::cache::{CachedLookup, Clock};
use crate::error::LookupError;
use async_trait::async_trait;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::Resolver;
use log::debug;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Résolveur DNS inverse
#[async_trait]
pub trait ReverseResolver: Send + Sync {
    /// Nom associé à `ip`, `Ok(None)` quand il n'en existe pas
    async fn reverse(&self, ip: IpAddr) -> Result<Option<String>, LookupError>;
}

type TokioResolver = Resolver<TokioConnectionProvider>;

/// Résolveur réseau basé sur hickory
pub struct HickoryReverseResolver {
    resolver: TokioResolver,
}

impl HickoryReverseResolver {
    pub fn new() -> Self {
        Self {
            resolver: Resolver::builder_with_config(
                ResolverConfig::default(),
                TokioConnectionProvider::default(),
            )
            .build(),
        }
    }
}

impl Default for HickoryReverseResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReverseResolver for HickoryReverseResolver {
    async fn reverse(&self, ip: IpAddr) -> Result<Option<String>, LookupError> {
        let lookup = self
            .resolver
            .reverse_lookup(ip)
            .await
            .map_err(|e| LookupError::Failed(e.to_string()))?;
        Ok(lookup
            .iter()
            .next()
            .map(|name| name.to_string().trim_end_matches('.').to_string()))
    }
}

/// Résolveur inactif (DNS inverse désactivé dans la configuration)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReverseDns;

#[async_trait]
impl ReverseResolver for NoReverseDns {
    async fn reverse(&self, _ip: IpAddr) -> Result<Option<String>, LookupError> {
        Ok(None)
    }
}

/// Noms d'hôte avec cache positif et négatif
pub struct HostnameResolver {
    resolver: Arc<dyn ReverseResolver>,
    cache: CachedLookup<IpAddr>,
}

impl HostnameResolver {
    pub fn new(
        resolver: Arc<dyn ReverseResolver>,
        ttl: Duration,
        max_entries: usize,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            resolver,
            cache: CachedLookup::new(ttl, max_entries, timeout, clock),
        }
    }

    /// Nom d'hôte de `ip`. Une adresse illisible n'est jamais résolue.
    pub async fn hostname(&self, ip: &str) -> Option<String> {
        let Ok(addr) = ip.parse::<IpAddr>() else {
            debug!("Adresse non résolvable: {}", ip);
            return None;
        };

        let resolver = self.resolver.clone();
        self.cache
            .get_or_resolve(addr, move || async move { resolver.reverse(addr).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::cache::ManualClock;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Résolveur factice qui compte les appels réseau
    struct FakeResolver {
        names: HashMap<IpAddr, String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReverseResolver for FakeResolver {
        async fn reverse(&self, ip: IpAddr) -> Result<Option<String>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.names.get(&ip) {
                Some(name) => Ok(Some(name.clone())),
                None => Err(LookupError::Failed("NXDOMAIN".into())),
            }
        }
    }

    fn setup(clock: Arc<ManualClock>) -> (Arc<FakeResolver>, HostnameResolver) {
        let fake = Arc::new(FakeResolver {
            names: HashMap::from([("10.0.0.5".parse().unwrap(), "john-laptop.corp".to_string())]),
            calls: AtomicUsize::new(0),
        });
        let hostnames = HostnameResolver::new(
            fake.clone(),
            Duration::from_secs(3600),
            1000,
            Duration::from_secs(1),
            clock,
        );
        (fake, hostnames)
    }

    #[tokio::test]
    async fn test_negative_result_served_from_cache() {
        let (fake, hostnames) = setup(Arc::new(ManualClock::new()));
        assert_eq!(hostnames.hostname("10.0.0.99").await, None);
        assert_eq!(hostnames.hostname("10.0.0.99").await, None);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_negative_result_expires() {
        let clock = Arc::new(ManualClock::new());
        let (fake, hostnames) = setup(clock.clone());
        hostnames.hostname("10.0.0.99").await;
        clock.advance(Duration::from_secs(3601));
        hostnames.hostname("10.0.0.99").await;
        assert_eq!(fake.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_positive_result_and_unparsable_address() {
        let (fake, hostnames) = setup(Arc::new(ManualClock::new()));
        assert_eq!(hostnames.hostname("10.0.0.5").await.as_deref(), Some("john-laptop.corp"));
        assert_eq!(hostnames.hostname("unknown").await, None);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_resolver() {
        assert_eq!(NoReverseDns.reverse("10.0.0.1".parse().unwrap()).await.unwrap(), None);
    }
}
