//! Stockage en mémoire du processus

use super::{validate_run_id, PacketFilter, PacketSlice, RunDocument, RunStore};
use crate::error::StorageError;
use crate::models::{RunInfo, StatsSnapshot};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::info;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStore {
    runs: DashMap<String, Arc<RunDocument>>,
    // Ordre d'enregistrement, le plus ancien en tête
    order: RwLock<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn document(&self, id: &str) -> Result<Option<Arc<RunDocument>>, StorageError> {
        validate_run_id(id)?;
        Ok(self.runs.get(id).map(|doc| doc.value().clone()))
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn store_run(&self, document: RunDocument) -> Result<(), StorageError> {
        validate_run_id(&document.info.id)?;
        let id = document.info.id.clone();
        let packets = document.packets.len();

        // Verrou d'ordre pris avant l'insertion : un lecteur ne voit jamais
        // une ingestion absente de la liste
        let mut order = self.order.write().await;
        match self.runs.entry(id.clone()) {
            Entry::Occupied(_) => return Err(StorageError::AlreadyExists(id)),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(document));
            }
        }
        order.push(id.clone());

        info!("Ingestion {} stockée en mémoire ({} paquets)", id, packets);
        Ok(())
    }

    async fn get_run(&self, id: &str) -> Result<Option<RunInfo>, StorageError> {
        Ok(self.document(id)?.map(|doc| doc.info.clone()))
    }

    async fn get_snapshot(&self, id: &str) -> Result<Option<StatsSnapshot>, StorageError> {
        Ok(self.document(id)?.map(|doc| doc.snapshot.clone()))
    }

    async fn get_packets(
        &self,
        id: &str,
        skip: usize,
        limit: usize,
        filter: &PacketFilter,
    ) -> Result<Option<PacketSlice>, StorageError> {
        Ok(self
            .document(id)?
            .map(|doc| PacketSlice::from_packets(&doc.packets, skip, limit, filter)))
    }

    async fn list_runs(&self, skip: usize, limit: usize) -> Result<Vec<RunInfo>, StorageError> {
        let order = self.order.read().await;
        Ok(order
            .iter()
            .rev()
            .filter_map(|id| self.runs.get(id).map(|doc| doc.info.clone()))
            .skip(skip)
            .take(limit)
            .collect())
    }
}
