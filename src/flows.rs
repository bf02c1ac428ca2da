//! Agrégation des connexions TCP
//!
//! Une connexion est identifiée par le quadruplet orienté
//! (ip source, port source, ip destination, port destination). Les deux sens
//! d'un même échange produisent donc deux enregistrements distincts.

use crate::models::{ClassifiedPacket, ConnectionKey, ConnectionRecord, Transport};
use std::collections::HashMap;

const UNKNOWN_ADDRESS: &str = "unknown";

impl ConnectionKey {
    /// Clé d'un paquet TCP, `None` pour les autres transports
    pub fn from_packet(packet: &ClassifiedPacket) -> Option<Self> {
        match packet.packet.transport {
            Transport::Tcp { sport, dport, .. } => Some(Self {
                src_ip: packet
                    .packet
                    .src_ip
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string()),
                src_port: sport,
                dst_ip: packet
                    .packet
                    .dst_ip
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string()),
                dst_port: dport,
            }),
            _ => None,
        }
    }
}

/// Table des connexions TCP, dans l'ordre de première apparition
#[derive(Debug, Default, Clone)]
pub struct FlowTable {
    records: Vec<ConnectionRecord>,
    index: HashMap<ConnectionKey, usize>,
}

impl FlowTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, key: ConnectionKey) -> &mut ConnectionRecord {
        let records = &mut self.records;
        let position = *self.index.entry(key.clone()).or_insert_with(|| {
            records.push(ConnectionRecord::new(key));
            records.len() - 1
        });
        &mut self.records[position]
    }

    /// Met à jour la table avec un paquet. Retourne `false` pour un paquet non TCP.
    pub fn ingest(&mut self, packet: &ClassifiedPacket) -> bool {
        let Some(key) = ConnectionKey::from_packet(packet) else {
            return false;
        };
        let flags = match packet.packet.transport {
            Transport::Tcp { flags, .. } => flags,
            _ => return false,
        };

        let record = self.slot(key);
        record.packet_count += 1;
        record.byte_count += packet.packet.length as u64;
        record.flags_seen.insert(flags);
        true
    }

    /// Fusionne la table d'un lot ultérieur (sommes et union des drapeaux)
    pub fn merge(&mut self, other: FlowTable) {
        for record in other.records {
            let slot = self.slot(record.key.clone());
            slot.packet_count += record.packet_count;
            slot.byte_count += record.byte_count;
            slot.flags_seen.extend(record.flags_seen);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<ConnectionRecord> {
        self.records
    }
}
