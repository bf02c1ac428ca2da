//! Façade du moteur : ingestion, lectures et annuaire enrichi
//!
//! Partagée derrière un `Arc` par l'API HTTP et la CLI. L'état mutable vit
//! dans le stockage ; un instantané n'est jamais modifié après écriture.

pub mod query;

use crate::config::Config;
use crate::enrichment::{Enricher, IpMacItem};
use crate::error::{IngestError, QueryError, SetupError};
use crate::ingest::ingest_batches;
use crate::models::{ConnectionRecord, DecodedPacket, RunInfo, StatsSnapshot};
use crate::stats::report::SummaryReport;
use crate::storage::{self, validate_run_id, RunDocument, RunStore};
use chrono::Utc;
use log::{debug, info, warn};
use query::{PacketPage, PacketQuery, PacketRow};
use std::sync::Arc;
use std::time::Instant;

pub struct NetlensService {
    config: Config,
    store: Arc<dyn RunStore>,
    enricher: Enricher,
}

/// Identifiant d'ingestion : horodatage puis suffixe aléatoire
fn new_run_id() -> String {
    format!(
        "{}-{:08x}",
        Utc::now().format("%Y%m%d%H%M%S"),
        rand::random::<u32>()
    )
}

impl NetlensService {
    pub fn new(config: Config, store: Arc<dyn RunStore>, enricher: Enricher) -> Self {
        Self {
            config,
            store,
            enricher,
        }
    }

    /// Ouvre le stockage et prépare l'enrichissement d'après la configuration
    pub fn from_config(config: Config) -> Result<Self, SetupError> {
        let store = storage::open(&config.storage)?;
        let enricher = Enricher::from_config(&config.enrichment)?;
        Ok(Self::new(config, store, enricher))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Ingère une capture décodée et la stocke sous un nouvel identifiant
    pub async fn ingest(&self, name: &str, packets: Vec<DecodedPacket>) -> Result<RunInfo, IngestError> {
        let started = Instant::now();
        let count = packets.len();
        info!("Ingestion de {} ({} paquets)", name, count);

        let run = ingest_batches(packets, self.config.ingest.batch_size, self.config.ingest.workers).await?;
        for diagnostic in &run.diagnostics {
            debug!("{}", diagnostic);
        }
        if !run.diagnostics.is_empty() {
            warn!(
                "{}: {} paquets partiels traités avec des valeurs par défaut",
                name,
                run.diagnostics.len()
            );
        }

        let info = RunInfo {
            id: new_run_id(),
            name: name.to_string(),
            created_at: Utc::now(),
            packet_count: run.snapshot.total_packets,
            total_bytes: run.snapshot.total_bytes,
            diagnostics: run.diagnostics.len(),
        };
        self.store
            .store_run(RunDocument {
                info: info.clone(),
                snapshot: run.snapshot,
                packets: run.packets,
            })
            .await?;

        info!(
            "Ingestion {} terminée en {:.2?} ({} paquets, {} octets)",
            info.id,
            started.elapsed(),
            info.packet_count,
            info.total_bytes
        );
        Ok(info)
    }

    /// Métadonnées d'une ingestion
    pub async fn run_info(&self, id: &str) -> Result<RunInfo, QueryError> {
        validate_run_id(id)
            .map_err(|_| QueryError::Validation(format!("identifiant d'ingestion invalide: {}", id)))?;
        self.store
            .get_run(id)
            .await?
            .ok_or_else(|| QueryError::RunNotFound(id.to_string()))
    }

    /// Identifiant demandé s'il existe, sinon la dernière ingestion
    pub async fn resolve_run(&self, requested: Option<&str>) -> Result<String, QueryError> {
        match requested {
            Some(id) => Ok(self.run_info(id).await?.id),
            None => self.store.latest_run_id().await?.ok_or(QueryError::NoData),
        }
    }

    pub async fn snapshot(&self, run: Option<&str>) -> Result<StatsSnapshot, QueryError> {
        let id = self.resolve_run(run).await?;
        self.store
            .get_snapshot(&id)
            .await?
            .ok_or(QueryError::RunNotFound(id))
    }

    pub async fn summary(&self, run: Option<&str>) -> Result<SummaryReport, QueryError> {
        let snapshot = self.snapshot(run).await?;
        Ok(SummaryReport::build(&snapshot, self.config.display_offset()))
    }

    /// Page de paquets filtrés. Les paramètres sont validés avant toute lecture.
    pub async fn packets(&self, query: &PacketQuery) -> Result<PacketPage, QueryError> {
        let query = query.validate(self.config.default_per_page, self.config.max_per_page)?;
        let id = self.resolve_run(query.run_id.as_deref()).await?;

        let slice = self
            .store
            .get_packets(&id, query.skip(), query.per_page, &query.filter)
            .await?
            .ok_or_else(|| QueryError::RunNotFound(id.clone()))?;

        let display = self.config.display_offset();
        Ok(PacketPage {
            items: slice
                .items
                .iter()
                .map(|packet| PacketRow::from_classified(packet, display))
                .collect(),
            total: slice.total,
            page: query.page,
            per_page: query.per_page,
        })
    }

    /// Annuaire IP-MAC enrichi, trié par paquets décroissants
    pub async fn ip_mac_map(&self, run: Option<&str>) -> Result<Vec<IpMacItem>, QueryError> {
        let snapshot = self.snapshot(run).await?;
        Ok(self.enricher.directory(&snapshot).await)
    }

    pub async fn connections(&self, run: Option<&str>) -> Result<Vec<ConnectionRecord>, QueryError> {
        Ok(self.snapshot(run).await?.connections)
    }

    pub async fn list_runs(&self, skip: usize, limit: usize) -> Result<Vec<RunInfo>, QueryError> {
        Ok(self.store.list_runs(skip, limit).await?)
    }
}
