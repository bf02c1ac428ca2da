//! Validation des requêtes de liste de paquets et mise en forme des pages

use crate::error::QueryError;
use crate::models::{AppLayer, ClassifiedPacket, NetworkLayer, Transport};
use crate::storage::PacketFilter;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

/// Paramètres bruts d'une requête de liste, tels que reçus du client
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub protocol: Option<String>,
    pub ip: Option<String>,
    pub file_id: Option<String>,
}

/// Requête validée, prête à être envoyée au stockage
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedQuery {
    pub page: usize,
    pub per_page: usize,
    pub filter: PacketFilter,
    pub run_id: Option<String>,
}

impl ValidatedQuery {
    pub fn skip(&self) -> usize {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn check_filter(name: &str, value: &str, allowed: impl Fn(char) -> bool) -> Result<(), QueryError> {
    if value.chars().all(allowed) {
        Ok(())
    } else {
        Err(QueryError::Validation(format!(
            "filtre {} non supporté: {:?}",
            name, value
        )))
    }
}

impl PacketQuery {
    /// Valide les paramètres avant tout accès aux données. Un `perPage`
    /// supérieur au maximum est ramené au maximum.
    pub fn validate(&self, default_per_page: usize, max_per_page: usize) -> Result<ValidatedQuery, QueryError> {
        let page = self.page.unwrap_or(1);
        if page < 1 {
            return Err(QueryError::Validation(format!(
                "page doit être supérieur ou égal à 1 (reçu {})",
                page
            )));
        }

        let per_page = match self.per_page {
            None => default_per_page,
            Some(n) if n < 1 => {
                return Err(QueryError::Validation(format!(
                    "perPage doit être supérieur ou égal à 1 (reçu {})",
                    n
                )))
            }
            Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
        }
        .min(max_per_page);

        let protocol = non_empty(&self.protocol);
        if let Some(protocol) = protocol {
            check_filter("protocol", protocol, |c| {
                c.is_ascii_alphanumeric() || c == '-' || c == '_'
            })?;
        }
        let address = non_empty(&self.ip);
        if let Some(address) = address {
            check_filter("ip", address, |c| c.is_ascii_hexdigit() || c == '.' || c == ':')?;
        }

        Ok(ValidatedQuery {
            page: usize::try_from(page).unwrap_or(usize::MAX),
            per_page,
            filter: PacketFilter {
                protocol: protocol.map(str::to_string),
                address: address.map(str::to_string),
            },
            run_id: non_empty(&self.file_id).map(str::to_string),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EthernetLayer {
    pub src_mac: Option<String>,
    pub dst_mac: Option<String>,
}

/// Couches présentes d'un paquet ; les couches absentes sont `null`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacketLayers {
    pub ethernet: Option<EthernetLayer>,
    pub network: Option<NetworkLayer>,
    pub transport: Option<Transport>,
    pub app: Option<AppLayer>,
}

/// Ligne de la liste de paquets
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacketRow {
    pub id: String,
    pub ts: String,
    pub src: String,
    pub dst: String,
    pub proto: String,
    pub size: u32,
    pub info: String,
    pub layers: PacketLayers,
}

impl PacketRow {
    pub fn from_classified(classified: &ClassifiedPacket, display: FixedOffset) -> Self {
        let packet = &classified.packet;
        let layers = PacketLayers {
            ethernet: packet.has_ethernet().then(|| EthernetLayer {
                src_mac: packet.src_mac.clone(),
                dst_mac: packet.dst_mac.clone(),
            }),
            network: (!matches!(packet.network, NetworkLayer::None)).then(|| packet.network.clone()),
            transport: (!matches!(packet.transport, Transport::None)).then(|| packet.transport.clone()),
            app: (!matches!(packet.app, AppLayer::None)).then(|| packet.app.clone()),
        };

        Self {
            id: format!("pkt-{}", classified.sequence_index),
            ts: packet
                .timestamp
                .with_timezone(&display)
                .format("%Y-%m-%d %H:%M:%S%.3f")
                .to_string(),
            src: packet.src_ip.clone().unwrap_or_else(|| "Unknown".to_string()),
            dst: packet.dst_ip.clone().unwrap_or_else(|| "Unknown".to_string()),
            proto: classified.protocol.clone(),
            size: packet.length,
            info: classified.info.clone(),
            layers,
        }
    }
}

/// Page de paquets : `total` compte l'ensemble filtré, pas la page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketPage {
    pub items: Vec<PacketRow>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
}
