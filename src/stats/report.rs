//! Rapport de synthèse servi aux clients

use super::histogram::{round1, size_histogram, SizeBucket};
use crate::models::StatsSnapshot;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_packets: u64,
    pub total_bytes: u64,
    pub unique_ips: usize,
    pub unique_macs: usize,
    pub duration_sec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolShare {
    pub protocol: String,
    pub count: u64,
    pub pct: f64,
}

/// Point de la courbe de débit : une seconde contenant du trafic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputPoint {
    pub t: String,
    pub pps: u64,
    pub bps: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    pub overview: Overview,
    pub protocol_distribution: Vec<ProtocolShare>,
    pub pps: Vec<ThroughputPoint>,
    pub size_histogram: Vec<SizeBucket>,
}

impl SummaryReport {
    /// Construit le rapport à partir d'un instantané figé. Les libellés de
    /// temps sont exprimés dans le fuseau d'affichage `display`.
    pub fn build(snapshot: &StatsSnapshot, display: FixedOffset) -> Self {
        Self {
            overview: Overview {
                total_packets: snapshot.total_packets,
                total_bytes: snapshot.total_bytes,
                unique_ips: snapshot.unique_ips,
                unique_macs: snapshot.unique_macs,
                duration_sec: (snapshot.duration_sec * 100.0).round_ties_even() / 100.0,
            },
            protocol_distribution: protocol_distribution(snapshot),
            pps: throughput_points(snapshot, display),
            size_histogram: size_histogram(&snapshot.packet_sizes),
        }
    }
}

/// Répartition par protocole, du plus fréquent au moins fréquent
pub fn protocol_distribution(snapshot: &StatsSnapshot) -> Vec<ProtocolShare> {
    let total: u64 = snapshot.protocol_counts.values().sum();
    if total == 0 {
        return Vec::new();
    }

    let mut shares: Vec<ProtocolShare> = snapshot
        .protocol_counts
        .iter()
        .map(|(protocol, count)| ProtocolShare {
            protocol: protocol.clone(),
            count: *count,
            pct: round1(*count as f64 / total as f64 * 100.0),
        })
        .collect();
    // protocol_counts est trié par nom : à égalité, ordre alphabétique
    shares.sort_by(|a, b| b.count.cmp(&a.count));
    shares
}

pub fn throughput_points(snapshot: &StatsSnapshot, display: FixedOffset) -> Vec<ThroughputPoint> {
    snapshot
        .throughput
        .iter()
        .map(|bucket| ThroughputPoint {
            t: format_second(bucket.second, display),
            pps: bucket.packets,
            bps: bucket.bytes,
        })
        .collect()
}

fn format_second(second: i64, display: FixedOffset) -> String {
    match DateTime::from_timestamp(second, 0) {
        Some(ts) => ts.with_timezone(&display).format("%H:%M:%S").to_string(),
        None => second.to_string(),
    }
}
