//! Stockage des ingestions terminées
//!
//! Le moteur ne dépend que du trait `RunStore` ; le backend est choisi une
//! seule fois au démarrage d'après la configuration.

pub mod directory;
pub mod memory;

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::models::{ClassifiedPacket, RunInfo, StatsSnapshot};
use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use directory::DirectoryStore;
pub use memory::MemoryStore;

/// Longueur maximale d'un identifiant d'ingestion
const MAX_ID_LEN: usize = 64;

/// Vérifie qu'un identifiant ne contient que `[A-Za-z0-9_-]`
pub fn validate_run_id(id: &str) -> Result<(), StorageError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidId(id.to_string()))
    }
}

/// Filtres appliqués avant la pagination
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketFilter {
    /// Étiquette de protocole, comparée sans tenir compte de la casse
    pub protocol: Option<String>,
    /// Sous-chaîne recherchée dans l'adresse source ou destination
    pub address: Option<String>,
}

impl PacketFilter {
    pub fn matches(&self, packet: &ClassifiedPacket) -> bool {
        if let Some(protocol) = &self.protocol {
            if !packet.protocol.eq_ignore_ascii_case(protocol) {
                return false;
            }
        }
        if let Some(address) = &self.address {
            let inner = &packet.packet;
            let hit = [&inner.src_ip, &inner.dst_ip]
                .into_iter()
                .flatten()
                .any(|ip| ip.contains(address.as_str()));
            if !hit {
                return false;
            }
        }
        true
    }
}

/// Tranche de paquets filtrés, avec le total avant pagination
#[derive(Debug, Clone, PartialEq)]
pub struct PacketSlice {
    pub items: Vec<ClassifiedPacket>,
    pub total: usize,
}

impl PacketSlice {
    /// Filtre puis découpe une séquence ordonnée
    pub fn from_packets(packets: &[ClassifiedPacket], skip: usize, limit: usize, filter: &PacketFilter) -> Self {
        let mut total = 0;
        let mut items = Vec::with_capacity(limit.min(packets.len()));
        for packet in packets.iter().filter(|p| filter.matches(p)) {
            if total >= skip && items.len() < limit {
                items.push(packet.clone());
            }
            total += 1;
        }
        Self { items, total }
    }
}

/// Document complet d'une ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDocument {
    pub info: RunInfo,
    pub snapshot: StatsSnapshot,
    pub packets: Vec<ClassifiedPacket>,
}

/// Contrat de stockage des ingestions
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Enregistre une ingestion. Échoue sans rien laisser de partiel.
    async fn store_run(&self, document: RunDocument) -> Result<(), StorageError>;

    async fn get_run(&self, id: &str) -> Result<Option<RunInfo>, StorageError>;

    async fn get_snapshot(&self, id: &str) -> Result<Option<StatsSnapshot>, StorageError>;

    /// Paquets filtrés puis paginés ; `None` si l'ingestion n'existe pas
    async fn get_packets(
        &self,
        id: &str,
        skip: usize,
        limit: usize,
        filter: &PacketFilter,
    ) -> Result<Option<PacketSlice>, StorageError>;

    /// Ingestions, la plus récente en premier
    async fn list_runs(&self, skip: usize, limit: usize) -> Result<Vec<RunInfo>, StorageError>;

    async fn latest_run_id(&self) -> Result<Option<String>, StorageError> {
        Ok(self.list_runs(0, 1).await?.into_iter().next().map(|run| run.id))
    }
}

/// Ouvre le backend configuré
pub fn open(config: &StorageConfig) -> Result<Arc<dyn RunStore>, StorageError> {
    match config {
        StorageConfig::Memory => {
            info!("Stockage en mémoire");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageConfig::Directory { path } => {
            info!("Stockage dans le répertoire {}", path.display());
            Ok(Arc::new(DirectoryStore::open(path)?))
        }
    }
}
