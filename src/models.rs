use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Combinaison de drapeaux TCP, affichée sous forme de lettres ("S", "SA", "FA"...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TcpFlags(pub u8);

impl TcpFlags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;
    pub const ECE: u8 = 0x40;
    pub const CWR: u8 = 0x80;

    const LETTERS: [(u8, char); 8] = [
        (Self::FIN, 'F'),
        (Self::SYN, 'S'),
        (Self::RST, 'R'),
        (Self::PSH, 'P'),
        (Self::ACK, 'A'),
        (Self::URG, 'U'),
        (Self::ECE, 'E'),
        (Self::CWR, 'C'),
    ];

    pub fn contains(self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    /// Reconstruit la combinaison depuis sa forme textuelle
    pub fn from_letters(letters: &str) -> Option<Self> {
        let mut bits = 0u8;
        for c in letters.chars() {
            let (bit, _) = Self::LETTERS
                .iter()
                .find(|(_, letter)| *letter == c.to_ascii_uppercase())?;
            bits |= bit;
        }
        Some(TcpFlags(bits))
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (bit, letter) in Self::LETTERS {
            if self.contains(bit) {
                write!(f, "{}", letter)?;
            }
        }
        Ok(())
    }
}

impl Serialize for TcpFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TcpFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Les décodeurs amont fournissent soit les bits bruts, soit les lettres
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bits(u8),
            Letters(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Bits(bits) => Ok(TcpFlags(bits)),
            Repr::Letters(letters) => TcpFlags::from_letters(&letters).ok_or_else(|| {
                serde::de::Error::custom(format!("drapeaux TCP invalides: {}", letters))
            }),
        }
    }
}

/// Couche réseau d'un paquet décodé
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum NetworkLayer {
    Ip {
        version: u8,
        #[serde(default)]
        ttl: u8,
    },
    Arp {
        operation: u16,
    },
    #[default]
    None,
}

/// Couche transport d'un paquet décodé
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Transport {
    Tcp {
        sport: u16,
        dport: u16,
        #[serde(default)]
        flags: TcpFlags,
        #[serde(default)]
        seq: u32,
        #[serde(default)]
        ack: u32,
    },
    Udp {
        sport: u16,
        dport: u16,
        #[serde(default)]
        len: u16,
    },
    Icmp {
        #[serde(rename = "icmpType")]
        icmp_type: u8,
        #[serde(default)]
        code: u8,
    },
    #[default]
    None,
}

/// Couche applicative d'un paquet décodé
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum AppLayer {
    Dns {
        qname: Option<String>,
        qtype: Option<u16>,
    },
    Http {
        method: Option<String>,
        path: Option<String>,
        host: Option<String>,
    },
    #[default]
    None,
}

/// Paquet tel que produit par le décodeur amont, immuable une fois créé
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedPacket {
    pub timestamp: DateTime<Utc>,
    pub length: u32,
    #[serde(default)]
    pub src_ip: Option<String>,
    #[serde(default)]
    pub dst_ip: Option<String>,
    #[serde(default)]
    pub src_mac: Option<String>,
    #[serde(default)]
    pub dst_mac: Option<String>,
    #[serde(default)]
    pub network: NetworkLayer,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default)]
    pub app: AppLayer,
}

impl DecodedPacket {
    /// Trame Ethernet présente (au moins une adresse MAC)
    pub fn has_ethernet(&self) -> bool {
        self.src_mac.is_some() || self.dst_mac.is_some()
    }

    /// Couche IP présente. Sans couche réseau explicite, la présence d'une
    /// adresse suffit.
    pub fn has_ip(&self) -> bool {
        match self.network {
            NetworkLayer::Ip { .. } => true,
            NetworkLayer::Arp { .. } => false,
            NetworkLayer::None => self.src_ip.is_some() || self.dst_ip.is_some(),
        }
    }

    pub fn is_arp(&self) -> bool {
        matches!(self.network, NetworkLayer::Arp { .. })
    }

    pub fn is_tcp(&self) -> bool {
        matches!(self.transport, Transport::Tcp { .. })
    }

    pub fn is_udp(&self) -> bool {
        matches!(self.transport, Transport::Udp { .. })
    }

    pub fn is_icmp(&self) -> bool {
        matches!(self.transport, Transport::Icmp { .. })
    }

    pub fn has_dns(&self) -> bool {
        matches!(self.app, AppLayer::Dns { .. })
    }

    pub fn has_http(&self) -> bool {
        matches!(self.app, AppLayer::Http { .. })
    }

    /// Ports source et destination pour TCP et UDP
    pub fn ports(&self) -> Option<(u16, u16)> {
        match self.transport {
            Transport::Tcp { sport, dport, .. } | Transport::Udp { sport, dport, .. } => {
                Some((sport, dport))
            }
            _ => None,
        }
    }
}

/// Paquet étiqueté par le classifieur
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedPacket {
    /// Ordre d'ingestion, stable, utilisé pour le tri et la pagination
    pub sequence_index: u64,
    pub protocol: String,
    pub info: String,
    pub packet: DecodedPacket,
}

/// Clé directionnelle d'une connexion TCP
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionKey {
    pub src_ip: String,
    pub src_port: u16,
    pub dst_ip: String,
    pub dst_port: u16,
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port
        )
    }
}

/// Compteurs d'une connexion TCP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    #[serde(flatten)]
    pub key: ConnectionKey,
    pub packet_count: u64,
    pub byte_count: u64,
    pub flags_seen: BTreeSet<TcpFlags>,
}

impl ConnectionRecord {
    pub fn new(key: ConnectionKey) -> Self {
        Self {
            key,
            packet_count: 0,
            byte_count: 0,
            flags_seen: BTreeSet::new(),
        }
    }
}

/// Paquets et octets vus pour une adresse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AddressCounters {
    pub packets: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressEntry {
    pub address: String,
    pub packets: u64,
    pub bytes: u64,
}

/// Table de compteurs par adresse, conservant l'ordre de première apparition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<AddressEntry>", into = "Vec<AddressEntry>")]
pub struct CounterTable {
    entries: Vec<(String, AddressCounters)>,
    index: HashMap<String, usize>,
}

impl CounterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ajoute un paquet de `bytes` octets au compteur de l'adresse
    pub fn record(&mut self, address: &str, bytes: u64) {
        self.add(address, AddressCounters { packets: 1, bytes });
    }

    fn add(&mut self, address: &str, counters: AddressCounters) {
        let position = match self.index.get(address) {
            Some(position) => *position,
            None => {
                self.entries
                    .push((address.to_string(), AddressCounters::default()));
                self.index
                    .insert(address.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        let slot = &mut self.entries[position].1;
        slot.packets += counters.packets;
        slot.bytes += counters.bytes;
    }

    /// Fusionne une autre table ; les nouvelles adresses sont ajoutées à la suite
    pub fn merge(&mut self, other: CounterTable) {
        for (address, counters) in other.entries {
            self.add(&address, counters);
        }
    }

    pub fn get(&self, address: &str) -> Option<&AddressCounters> {
        self.index.get(address).map(|position| &self.entries[*position].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AddressCounters)> {
        self.entries
            .iter()
            .map(|(address, counters)| (address.as_str(), counters))
    }
}

impl From<Vec<AddressEntry>> for CounterTable {
    fn from(entries: Vec<AddressEntry>) -> Self {
        let mut table = CounterTable::new();
        for entry in entries {
            table.add(
                &entry.address,
                AddressCounters {
                    packets: entry.packets,
                    bytes: entry.bytes,
                },
            );
        }
        table
    }
}

impl From<CounterTable> for Vec<AddressEntry> {
    fn from(table: CounterTable) -> Self {
        table
            .entries
            .into_iter()
            .map(|(address, counters)| AddressEntry {
                address,
                packets: counters.packets,
                bytes: counters.bytes,
            })
            .collect()
    }
}

/// Trafic observé pendant une seconde calendaire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondBucket {
    /// Secondes depuis l'époque Unix (horodatage tronqué)
    pub second: i64,
    pub packets: u64,
    pub bytes: u64,
}

/// Instantané figé des statistiques d'une ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_packets: u64,
    pub total_bytes: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_sec: f64,
    pub protocol_counts: BTreeMap<String, u64>,
    pub ip_counters: CounterTable,
    pub mac_counters: CounterTable,
    /// Dernière MAC vue pour chaque IP
    pub ip_to_mac: BTreeMap<String, String>,
    pub packet_sizes: Vec<u32>,
    pub min_packet_size: Option<u32>,
    pub max_packet_size: Option<u32>,
    pub unique_ips: usize,
    pub unique_macs: usize,
    pub avg_packet_size: f64,
    pub packet_rate: f64,
    pub top_talkers: Vec<AddressEntry>,
    pub throughput: Vec<SecondBucket>,
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
}

/// Métadonnées d'une ingestion stockée
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInfo {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub packet_count: u64,
    pub total_bytes: u64,
    pub diagnostics: usize,
}
