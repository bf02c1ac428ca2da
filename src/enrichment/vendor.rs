//! Recherche du constructeur d'une carte réseau à partir de son préfixe OUI

use super::cache::{CachedLookup, Clock};
use crate::error::{ConfigError, LookupError};
use async_trait::async_trait;
use log::{debug, info};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Préfixe constructeur (trois premiers octets d'une adresse MAC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Oui([u8; 3]);

impl Oui {
    pub fn new(bytes: [u8; 3]) -> Self {
        Oui(bytes)
    }

    /// Premier octet avec le bit de groupe (multicast, diffusion)
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Adresse administrée localement, sans constructeur enregistré
    pub fn is_local(&self) -> bool {
        self.0[0] & 0x02 != 0
    }
}

impl fmt::Display for Oui {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}:{:02X}:{:02X}", self.0[0], self.0[1], self.0[2])
    }
}

fn hex_digits(text: &str) -> Option<Vec<u8>> {
    let digits: String = text
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect();
    if digits.len() % 2 != 0 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect()
}

/// Extrait l'OUI d'une adresse MAC complète (`aa:bb:cc:dd:ee:ff`,
/// `aa-bb-...` ou `aabb.ccdd.eeff`)
pub fn parse_mac(mac: &str) -> Option<Oui> {
    let bytes = hex_digits(mac.trim())?;
    if bytes.len() != 6 {
        return None;
    }
    Some(Oui([bytes[0], bytes[1], bytes[2]]))
}

fn parse_prefix(prefix: &str) -> Option<Oui> {
    let bytes = hex_digits(prefix.trim())?;
    if bytes.len() < 3 {
        return None;
    }
    Some(Oui([bytes[0], bytes[1], bytes[2]]))
}

/// Source de correspondance OUI → constructeur
#[async_trait]
pub trait VendorSource: Send + Sync {
    async fn lookup(&self, oui: Oui) -> Result<Option<String>, LookupError>;
}

/// Petite table intégrée, utilisée sans base externe
const BUILTIN_VENDORS: &[([u8; 3], &str)] = &[
    ([0x00, 0x00, 0x0C], "Cisco Systems, Inc"),
    ([0x00, 0x15, 0x5D], "Microsoft Corporation"),
    ([0x00, 0x1C, 0x42], "Parallels, Inc."),
    ([0x00, 0x50, 0x56], "VMware, Inc."),
    ([0x00, 0x0C, 0x29], "VMware, Inc."),
    ([0x08, 0x00, 0x27], "PCS Systemtechnik GmbH (VirtualBox)"),
    ([0xB8, 0x27, 0xEB], "Raspberry Pi Foundation"),
    ([0xDC, 0xA6, 0x32], "Raspberry Pi Trading Ltd"),
    ([0x52, 0x54, 0x00], "QEMU virtual NIC"),
];

static BUILTIN: Lazy<HashMap<Oui, String>> = Lazy::new(|| {
    BUILTIN_VENDORS
        .iter()
        .map(|(prefix, name)| (Oui(*prefix), name.to_string()))
        .collect()
});

/// Base OUI en mémoire
#[derive(Debug, Clone, Default)]
pub struct OuiDatabase {
    entries: HashMap<Oui, String>,
}

impl OuiDatabase {
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN.clone(),
        }
    }

    /// Charge un fichier `manuf` de Wireshark ou `oui.txt` de l'IEEE
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::OuiDatabase {
            path: path.display().to_string(),
            source,
        })?;
        let database = Self::parse(&content);
        info!("Base OUI chargée: {} préfixes depuis {}", database.len(), path.display());
        Ok(database)
    }

    pub fn parse(content: &str) -> Self {
        let mut entries = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // Format IEEE : "00-00-0C   (hex)\t\tCisco Systems, Inc"
            if let Some((prefix, name)) = line.split_once("(hex)") {
                if let Some(oui) = parse_prefix(prefix) {
                    entries.insert(oui, name.trim().to_string());
                }
                continue;
            }

            // Format manuf : "00:00:0C\tCisco\tCisco Systems, Inc"
            let mut fields = line.split('\t').filter(|f| !f.trim().is_empty());
            let Some(prefix) = fields.next() else { continue };
            // Les blocs plus fins que /24 ne désignent pas un OUI entier
            if prefix.contains('/') {
                continue;
            }
            let short = fields.next();
            let long = fields.next();
            if let (Some(oui), Some(name)) = (parse_prefix(prefix), long.or(short)) {
                entries.insert(oui, name.trim().to_string());
            }
        }
        Self { entries }
    }

    pub fn get(&self, oui: &Oui) -> Option<&str> {
        self.entries.get(oui).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl VendorSource for OuiDatabase {
    async fn lookup(&self, oui: Oui) -> Result<Option<String>, LookupError> {
        Ok(self.get(&oui).map(str::to_string))
    }
}

/// Résolution du constructeur avec cache par OUI
pub struct VendorResolver {
    source: Arc<dyn VendorSource>,
    cache: CachedLookup<Oui>,
}

impl VendorResolver {
    pub fn new(
        source: Arc<dyn VendorSource>,
        ttl: Duration,
        max_entries: usize,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            cache: CachedLookup::new(ttl, max_entries, timeout, clock),
        }
    }

    /// Constructeur de la carte `mac`. Les adresses de groupe, administrées
    /// localement ou illisibles n'ont pas de constructeur.
    pub async fn vendor_for(&self, mac: &str) -> Option<String> {
        let oui = parse_mac(mac)?;
        if oui.is_multicast() || oui.is_local() {
            debug!("Pas de constructeur pour {} (adresse non attribuée)", mac);
            return None;
        }

        let source = self.source.clone();
        self.cache
            .get_or_resolve(oui, move || async move { source.lookup(oui).await })
            .await
    }
}
