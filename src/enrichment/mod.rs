//! Enrichissement des adresses observées
//!
//! Pour chaque IP : MAC (table IP→MAC de l'ingestion), constructeur (OUI),
//! nom d'hôte (DNS inverse) et nom d'utilisateur déduit du nom d'hôte. Chaque
//! étape tolère l'échec et se replie sur une valeur absente.

pub mod cache;
pub mod dns;
pub mod user_name;
pub mod vendor;

use crate::config::EnrichmentConfig;
use crate::error::ConfigError;
use crate::models::StatsSnapshot;
use cache::{Clock, SystemClock};
use dns::{HickoryReverseResolver, HostnameResolver, NoReverseDns, ReverseResolver};
use futures::stream::{self, StreamExt};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use user_name::extract_user_name;
use vendor::{OuiDatabase, VendorResolver, VendorSource};

/// Résultat de l'enrichissement d'une adresse, recalculé à la demande
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentEntry {
    pub ip: String,
    pub mac: Option<String>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
    pub user_name: Option<String>,
    pub display_name: String,
    pub packets: u64,
    pub bytes: u64,
}

/// Ligne de l'annuaire IP-MAC servi aux clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpMacItem {
    pub ip: String,
    pub mac: Option<String>,
    pub host: String,
    pub packets: u64,
    pub bytes: u64,
    pub vendor: Option<String>,
    pub user_name: Option<String>,
}

impl From<EnrichmentEntry> for IpMacItem {
    fn from(entry: EnrichmentEntry) -> Self {
        let host = entry
            .hostname
            .clone()
            .or_else(|| host_label(&entry.ip))
            .unwrap_or_else(|| entry.ip.clone());
        Self {
            ip: entry.ip,
            mac: entry.mac,
            host,
            packets: entry.packets,
            bytes: entry.bytes,
            vendor: entry.vendor,
            user_name: entry.user_name,
        }
    }
}

/// `host-<dernier octet>` pour une adresse IPv4
pub fn host_label(ip: &str) -> Option<String> {
    let addr: Ipv4Addr = ip.parse().ok()?;
    Some(format!("host-{}", addr.octets()[3]))
}

/// Nom affiché : utilisateur, sinon nom d'hôte, sinon `host-<octet>`, sinon l'IP
pub fn display_name(user_name: Option<&str>, hostname: Option<&str>, ip: &str) -> String {
    user_name
        .or(hostname)
        .map(str::to_string)
        .or_else(|| host_label(ip))
        .unwrap_or_else(|| ip.to_string())
}

pub struct Enricher {
    vendors: VendorResolver,
    hostnames: HostnameResolver,
    concurrency: usize,
    include_unmapped: bool,
}

impl Enricher {
    pub fn new(vendors: VendorResolver, hostnames: HostnameResolver, concurrency: usize, include_unmapped: bool) -> Self {
        Self {
            vendors,
            hostnames,
            concurrency: concurrency.max(1),
            include_unmapped,
        }
    }

    /// Construit l'enrichisseur avec des sources explicites
    pub fn with_sources(
        config: &EnrichmentConfig,
        vendor_source: Arc<dyn VendorSource>,
        reverse: Arc<dyn ReverseResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ttl = Duration::from_secs(config.cache_ttl_secs);
        let timeout = Duration::from_millis(config.lookup_timeout_ms);
        Self::new(
            VendorResolver::new(vendor_source, ttl, config.cache_max_entries, timeout, clock.clone()),
            HostnameResolver::new(reverse, ttl, config.cache_max_entries, timeout, clock),
            config.concurrency,
            config.include_unmapped,
        )
    }

    /// Sources réelles : base OUI (fichier ou table intégrée) et DNS hickory
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self, ConfigError> {
        let database = match &config.oui_database {
            Some(path) => OuiDatabase::load(path)?,
            None => OuiDatabase::builtin(),
        };
        let reverse: Arc<dyn ReverseResolver> = if config.reverse_dns {
            Arc::new(HickoryReverseResolver::new())
        } else {
            info!("DNS inverse désactivé");
            Arc::new(NoReverseDns)
        };
        Ok(Self::with_sources(config, Arc::new(database), reverse, Arc::new(SystemClock)))
    }

    /// Enrichit une adresse du snapshot. Ne renvoie jamais d'erreur.
    pub async fn enrich(&self, snapshot: &StatsSnapshot, ip: &str) -> EnrichmentEntry {
        let mac = snapshot.ip_to_mac.get(ip).cloned();
        let counters = snapshot.ip_counters.get(ip).copied().unwrap_or_default();

        let vendor_lookup = async {
            match mac.as_deref() {
                Some(mac) => self.vendors.vendor_for(mac).await,
                None => None,
            }
        };
        let (vendor, hostname) = tokio::join!(vendor_lookup, self.hostnames.hostname(ip));

        let user_name = hostname.as_deref().and_then(extract_user_name);
        let display_name = display_name(user_name.as_deref(), hostname.as_deref(), ip);

        EnrichmentEntry {
            ip: ip.to_string(),
            mac,
            hostname,
            vendor,
            user_name,
            display_name,
            packets: counters.packets,
            bytes: counters.bytes,
        }
    }

    /// Adresses à enrichir, sans doublon
    fn directory_addresses(&self, snapshot: &StatsSnapshot) -> BTreeSet<String> {
        let mut addresses: BTreeSet<String> = snapshot.ip_to_mac.keys().cloned().collect();
        if self.include_unmapped {
            addresses.extend(snapshot.ip_counters.iter().map(|(address, _)| address.to_string()));
        }
        addresses
    }

    /// Annuaire IP-MAC trié par paquets décroissants puis par IP
    pub async fn directory(&self, snapshot: &StatsSnapshot) -> Vec<IpMacItem> {
        let addresses = self.directory_addresses(snapshot);
        debug!("Enrichissement de {} adresses", addresses.len());

        let mut items: Vec<IpMacItem> = stream::iter(addresses)
            .map(|ip| async move { self.enrich(snapshot, &ip).await })
            .buffer_unordered(self.concurrency)
            .map(IpMacItem::from)
            .collect()
            .await;

        items.sort_by(|a, b| b.packets.cmp(&a.packets).then_with(|| a.ip.cmp(&b.ip)));
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::cache::ManualClock;
    use crate::error::LookupError;
    use crate::models::CounterTable;
    use crate::stats::StatsAccumulator;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::net::IpAddr;

    struct StaticResolver(HashMap<IpAddr, String>);

    #[async_trait]
    impl ReverseResolver for StaticResolver {
        async fn reverse(&self, ip: IpAddr) -> Result<Option<String>, LookupError> {
            Ok(self.0.get(&ip).cloned())
        }
    }

    fn enricher(include_unmapped: bool) -> Enricher {
        let names = HashMap::from([
            ("10.0.0.1".parse().unwrap(), "alice-pc.corp".to_string()),
            ("10.0.0.2".parse().unwrap(), "printer.corp".to_string()),
        ]);
        let config = EnrichmentConfig {
            include_unmapped,
            ..EnrichmentConfig::default()
        };
        Enricher::with_sources(
            &config,
            Arc::new(OuiDatabase::builtin()),
            Arc::new(StaticResolver(names)),
            Arc::new(ManualClock::new()),
        )
    }

    fn snapshot() -> StatsSnapshot {
        let mut snapshot = StatsAccumulator::new().finalize();
        let mut counters = CounterTable::new();
        for (ip, times) in [("10.0.0.1", 2), ("10.0.0.2", 5), ("10.0.0.3", 2), ("10.0.0.9", 7)] {
            for _ in 0..times {
                counters.record(ip, 100);
            }
        }
        snapshot.ip_counters = counters;
        snapshot.ip_to_mac.insert("10.0.0.1".into(), "00:50:56:00:00:01".into());
        snapshot.ip_to_mac.insert("10.0.0.2".into(), "00:11:22:33:44:55".into());
        snapshot.ip_to_mac.insert("10.0.0.3".into(), "08:00:27:00:00:03".into());
        snapshot
    }

    #[test]
    fn test_display_name_chain() {
        assert_eq!(display_name(Some("Alice"), Some("alice-pc"), "10.0.0.1"), "Alice");
        assert_eq!(display_name(None, Some("printer"), "10.0.0.2"), "printer");
        assert_eq!(display_name(None, None, "10.0.0.42"), "host-42");
        assert_eq!(display_name(None, None, "fe80::1"), "fe80::1");
    }

    #[test]
    fn test_host_label_only_for_ipv4() {
        assert_eq!(host_label("192.168.1.20").as_deref(), Some("host-20"));
        assert_eq!(host_label("2001:db8::7"), None);
        let item = IpMacItem::from(EnrichmentEntry {
            ip: "2001:db8::7".into(),
            mac: None,
            hostname: None,
            vendor: None,
            user_name: None,
            display_name: "2001:db8::7".into(),
            packets: 1,
            bytes: 60,
        });
        assert_eq!(item.host, "2001:db8::7");
    }

    #[tokio::test]
    async fn test_enrich_single_address() {
        let entry = enricher(false).enrich(&snapshot(), "10.0.0.1").await;
        assert_eq!(entry.mac.as_deref(), Some("00:50:56:00:00:01"));
        assert_eq!(entry.vendor.as_deref(), Some("VMware, Inc."));
        assert_eq!(entry.hostname.as_deref(), Some("alice-pc.corp"));
        assert_eq!(entry.user_name.as_deref(), Some("Alice"));
        assert_eq!(entry.display_name, "Alice");
        assert_eq!(entry.packets, 2);
        assert_eq!(entry.bytes, 200);
    }

    #[tokio::test]
    async fn test_directory_sorted_and_coalesced() {
        let items = enricher(false).directory(&snapshot()).await;
        let order: Vec<&str> = items.iter().map(|i| i.ip.as_str()).collect();
        assert_eq!(order, vec!["10.0.0.2", "10.0.0.1", "10.0.0.3"]);

        let printer = &items[0];
        assert_eq!(printer.host, "printer.corp");
        assert_eq!(printer.vendor, None);
        assert_eq!(printer.user_name, None);

        let unnamed = &items[2];
        assert_eq!(unnamed.host, "host-3");
        assert_eq!(unnamed.vendor.as_deref(), Some("PCS Systemtechnik GmbH (VirtualBox)"));

        let json = serde_json::to_value(printer).unwrap();
        assert!(json.get("userName").is_some());
    }

    #[tokio::test]
    async fn test_directory_can_include_unmapped_addresses() {
        let items = enricher(true).directory(&snapshot()).await;
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].ip, "10.0.0.9");
        assert_eq!(items[0].mac, None);
    }
}
