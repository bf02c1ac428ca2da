//! Moteur de statistiques
//!
//! Les compteurs sont mis à jour paquet par paquet dans l'ordre d'ingestion ;
//! le classement des gros émetteurs et les séries temporelles sont calculés une
//! seule fois, au moment de `finalize`.

pub mod histogram;
pub mod report;

use crate::models::{AddressEntry, ClassifiedPacket, CounterTable, SecondBucket, StatsSnapshot};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Nombre d'adresses conservées dans le classement des gros émetteurs
pub const TOP_TALKERS: usize = 10;

/// Statistiques en cours d'accumulation
#[derive(Debug, Clone, Default)]
pub struct StatsAccumulator {
    total_packets: u64,
    total_bytes: u64,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    protocol_counts: BTreeMap<String, u64>,
    ip_counters: CounterTable,
    mac_counters: CounterTable,
    ip_to_mac: BTreeMap<String, String>,
    packet_sizes: Vec<u32>,
    min_size: Option<u32>,
    max_size: Option<u32>,
    per_second: BTreeMap<i64, SecondBucket>,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_packets(&self) -> u64 {
        self.total_packets
    }

    /// Intègre un paquet classifié
    pub fn update(&mut self, classified: &ClassifiedPacket) {
        let packet = &classified.packet;
        let size = packet.length;
        let bytes = size as u64;

        self.total_packets += 1;
        self.total_bytes += bytes;
        self.packet_sizes.push(size);
        self.min_size = Some(self.min_size.map_or(size, |min| min.min(size)));
        self.max_size = Some(self.max_size.map_or(size, |max| max.max(size)));

        let ts = packet.timestamp;
        self.start_time = Some(self.start_time.map_or(ts, |start| start.min(ts)));
        self.end_time = Some(self.end_time.map_or(ts, |end| end.max(ts)));

        // Regroupement par seconde calendaire de capture
        let second = ts.timestamp();
        let bucket = self.per_second.entry(second).or_insert(SecondBucket {
            second,
            packets: 0,
            bytes: 0,
        });
        bucket.packets += 1;
        bucket.bytes += bytes;

        *self
            .protocol_counts
            .entry(classified.protocol.clone())
            .or_insert(0) += 1;

        // Source et destination sont comptées indépendamment
        for ip in [&packet.src_ip, &packet.dst_ip].into_iter().flatten() {
            self.ip_counters.record(ip, bytes);
        }

        if packet.has_ethernet() {
            for mac in [&packet.src_mac, &packet.dst_mac].into_iter().flatten() {
                self.mac_counters.record(mac, bytes);
            }
            // La dernière association vue l'emporte
            if let (Some(ip), Some(mac)) = (&packet.src_ip, &packet.src_mac) {
                self.ip_to_mac.insert(ip.clone(), mac.clone());
            }
            if let (Some(ip), Some(mac)) = (&packet.dst_ip, &packet.dst_mac) {
                self.ip_to_mac.insert(ip.clone(), mac.clone());
            }
        }
    }

    /// Fusionne l'accumulateur d'un lot ultérieur
    ///
    /// Sommes, min/max et unions sont commutatifs ; les tables ordonnées et
    /// l'association IP→MAC supposent que `other` suit `self` dans la capture.
    pub fn merge(&mut self, other: StatsAccumulator) {
        self.total_packets += other.total_packets;
        self.total_bytes += other.total_bytes;
        self.start_time = match (self.start_time, other.start_time) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.end_time = match (self.end_time, other.end_time) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        for (protocol, count) in other.protocol_counts {
            *self.protocol_counts.entry(protocol).or_insert(0) += count;
        }
        self.ip_counters.merge(other.ip_counters);
        self.mac_counters.merge(other.mac_counters);
        self.ip_to_mac.extend(other.ip_to_mac);
        self.packet_sizes.extend(other.packet_sizes);
        self.min_size = match (self.min_size, other.min_size) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max_size = match (self.max_size, other.max_size) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        for (second, bucket) in other.per_second {
            let slot = self.per_second.entry(second).or_insert(SecondBucket {
                second,
                packets: 0,
                bytes: 0,
            });
            slot.packets += bucket.packets;
            slot.bytes += bucket.bytes;
        }
    }

    /// Produit l'instantané figé. Ne modifie pas l'accumulateur.
    pub fn finalize(&self) -> StatsSnapshot {
        let duration_sec = match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => {
                (end - start).num_microseconds().unwrap_or(0).max(0) as f64 / 1_000_000.0
            }
            _ => 0.0,
        };

        let avg_packet_size = if self.total_packets > 0 {
            self.total_bytes as f64 / self.total_packets as f64
        } else {
            0.0
        };

        let packet_rate = if duration_sec > 0.0 {
            self.total_packets as f64 / duration_sec
        } else {
            0.0
        };

        // Capture instantanée ou vide : pas de courbe de débit
        let throughput = if duration_sec > 0.0 {
            self.per_second.values().copied().collect()
        } else {
            Vec::new()
        };

        StatsSnapshot {
            total_packets: self.total_packets,
            total_bytes: self.total_bytes,
            start_time: self.start_time,
            end_time: self.end_time,
            duration_sec,
            protocol_counts: self.protocol_counts.clone(),
            ip_counters: self.ip_counters.clone(),
            mac_counters: self.mac_counters.clone(),
            ip_to_mac: self.ip_to_mac.clone(),
            packet_sizes: self.packet_sizes.clone(),
            min_packet_size: self.min_size,
            max_packet_size: self.max_size,
            unique_ips: self.ip_counters.len(),
            unique_macs: self.mac_counters.len(),
            avg_packet_size,
            packet_rate,
            top_talkers: top_talkers(&self.ip_counters, TOP_TALKERS),
            throughput,
            connections: Vec::new(),
        }
    }
}

/// Adresses triées par octets décroissants. Le tri est stable : à égalité,
/// l'ordre de première apparition est conservé.
pub fn top_talkers(counters: &CounterTable, limit: usize) -> Vec<AddressEntry> {
    let mut ranked: Vec<AddressEntry> = counters
        .iter()
        .map(|(address, c)| AddressEntry {
            address: address.to_string(),
            packets: c.packets,
            bytes: c.bytes,
        })
        .collect();
    ranked.sort_by(|a, b| b.bytes.cmp(&a.bytes));
    ranked.truncate(limit);
    ranked
}
