//! Pipeline d'ingestion
//!
//! Classifie chaque paquet dans l'ordre de capture puis alimente la table des
//! connexions et l'accumulateur de statistiques. Un paquet partiel n'interrompt
//! jamais l'ingestion : il est compté et un diagnostic est conservé.

use crate::classifier::{classify, describe};
use crate::error::IngestError;
use crate::flows::FlowTable;
use crate::models::{AppLayer, ClassifiedPacket, DecodedPacket, StatsSnapshot, Transport};
use crate::stats::StatsAccumulator;
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Anomalie relevée sur un paquet isolé
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PacketIssue {
    #[error("en-tête de transport sans adresses IP")]
    MissingAddresses,

    #[error("longueur nulle")]
    ZeroLength,

    #[error("couche DNS sans nom de requête")]
    EmptyDnsQuery,

    #[error("couche HTTP sans méthode")]
    MissingHttpMethod,
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("paquet #{sequence_index}: {issue}")]
#[serde(rename_all = "camelCase")]
pub struct PacketDiagnostic {
    pub sequence_index: u64,
    pub issue: PacketIssue,
}

fn inspect(packet: &DecodedPacket) -> Option<PacketIssue> {
    if packet.length == 0 {
        return Some(PacketIssue::ZeroLength);
    }
    if !matches!(packet.transport, Transport::None)
        && packet.src_ip.is_none()
        && packet.dst_ip.is_none()
    {
        return Some(PacketIssue::MissingAddresses);
    }
    match &packet.app {
        AppLayer::Dns { qname, .. } if qname.as_deref().map_or(true, str::is_empty) => {
            Some(PacketIssue::EmptyDnsQuery)
        }
        AppLayer::Http { method: None, .. } => Some(PacketIssue::MissingHttpMethod),
        _ => None,
    }
}

/// Résultat d'une ingestion terminée, en lecture seule
#[derive(Debug, Clone)]
pub struct IngestionRun {
    pub packets: Vec<ClassifiedPacket>,
    pub snapshot: StatsSnapshot,
    pub diagnostics: Vec<PacketDiagnostic>,
}

/// Ingestion en cours
#[derive(Debug, Default)]
pub struct Ingestion {
    next_index: u64,
    packets: Vec<ClassifiedPacket>,
    stats: StatsAccumulator,
    flows: FlowTable,
    diagnostics: Vec<PacketDiagnostic>,
}

impl Ingestion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingestion d'un lot dont le premier paquet porte l'indice `start`
    pub fn with_start_index(start: u64) -> Self {
        Self {
            next_index: start,
            ..Self::default()
        }
    }

    /// Classifie et comptabilise un paquet. Le paquet est toujours compté,
    /// l'erreur ne fait que signaler des données partielles.
    pub fn push(&mut self, packet: DecodedPacket) -> Result<(), PacketDiagnostic> {
        let sequence_index = self.next_index;
        self.next_index += 1;

        let issue = inspect(&packet);
        let protocol = classify(&packet);
        let classified = ClassifiedPacket {
            sequence_index,
            protocol: protocol.to_string(),
            info: describe(&packet, protocol),
            packet,
        };

        self.flows.ingest(&classified);
        self.stats.update(&classified);
        self.packets.push(classified);

        match issue {
            None => Ok(()),
            Some(issue) => {
                let diagnostic = PacketDiagnostic { sequence_index, issue };
                debug!("Paquet partiel: {}", diagnostic);
                self.diagnostics.push(diagnostic.clone());
                Err(diagnostic)
            }
        }
    }

    /// Ingère une séquence ordonnée ; les diagnostics restent collectés
    pub fn extend<I: IntoIterator<Item = DecodedPacket>>(&mut self, packets: I) {
        for packet in packets {
            let _ = self.push(packet);
        }
    }

    /// Fusionne l'état d'un lot qui suit immédiatement celui-ci
    pub fn merge(&mut self, other: Ingestion) {
        self.next_index = self.next_index.max(other.next_index);
        self.packets.extend(other.packets);
        self.stats.merge(other.stats);
        self.flows.merge(other.flows);
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn diagnostics(&self) -> &[PacketDiagnostic] {
        &self.diagnostics
    }

    /// Fige l'ingestion. Échoue si aucun paquet n'a été fourni.
    pub fn finish(self) -> Result<IngestionRun, IngestError> {
        if self.stats.total_packets() == 0 {
            return Err(IngestError::Empty);
        }

        let mut snapshot = self.stats.finalize();
        snapshot.connections = self.flows.into_records();

        info!(
            "Ingestion terminée: {} paquets, {} octets, {} connexions TCP, {} diagnostics",
            snapshot.total_packets,
            snapshot.total_bytes,
            snapshot.connections.len(),
            self.diagnostics.len()
        );

        Ok(IngestionRun {
            packets: self.packets,
            snapshot,
            diagnostics: self.diagnostics,
        })
    }
}

/// Ingestion parallèle par lots contigus
///
/// Chaque lot est traité sur un worker bloquant (au plus `workers` à la fois),
/// puis les états partiels sont fusionnés dans l'ordre des lots. Le résultat est
/// identique à une ingestion séquentielle.
pub async fn ingest_batches(
    packets: Vec<DecodedPacket>,
    batch_size: usize,
    workers: usize,
) -> Result<IngestionRun, IngestError> {
    if packets.is_empty() {
        return Err(IngestError::Empty);
    }

    let batch_size = batch_size.max(1);
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let total = packets.len();

    let mut handles = Vec::with_capacity(total.div_ceil(batch_size));
    let mut remaining = packets.into_iter();
    let mut start = 0u64;
    loop {
        let batch: Vec<DecodedPacket> = remaining.by_ref().take(batch_size).collect();
        if batch.is_empty() {
            break;
        }
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| IngestError::Worker(e.to_string()))?;
        let batch_start = start;
        start += batch.len() as u64;

        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let mut ingestion = Ingestion::with_start_index(batch_start);
            ingestion.extend(batch);
            ingestion
        }));
    }

    debug!("{} paquets répartis en {} lots", total, handles.len());

    let mut merged = Ingestion::new();
    for handle in handles {
        let part = handle
            .await
            .map_err(|e| IngestError::Worker(e.to_string()))?;
        merged.merge(part);
    }
    merged.finish()
}
