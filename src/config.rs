use crate::error::ConfigError;
use crate::logger::LogMode;
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "/etc/netlens/config.json";

/// Backend de stockage des ingestions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// En mémoire, perdu à l'arrêt du processus
    Memory,
    /// Un document JSON par ingestion dans `path`
    Directory { path: PathBuf },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Directory {
            path: PathBuf::from("netlens-data"),
        }
    }
}

/// Paramètres de l'ingestion par lots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Nombre de paquets par lot
    pub batch_size: usize,
    /// Nombre maximal de lots traités en parallèle
    pub workers: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            workers: num_cpus::get(),
        }
    }
}

/// Paramètres de l'enrichissement des adresses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Durée de vie des résultats en cache (positifs et négatifs)
    pub cache_ttl_secs: u64,
    pub cache_max_entries: usize,
    /// Délai maximal d'une recherche externe
    pub lookup_timeout_ms: u64,
    /// Adresses enrichies simultanément
    pub concurrency: usize,
    pub reverse_dns: bool,
    /// Fichier `manuf` (Wireshark) ou `oui.txt` (IEEE) ; table intégrée sinon
    pub oui_database: Option<PathBuf>,
    /// Inclure dans l'annuaire les IP vues sans adresse MAC
    pub include_unmapped: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 3600,
            cache_max_entries: 1000,
            lookup_timeout_ms: 3000,
            concurrency: 16,
            reverse_dns: true,
            oui_database: None,
            include_unmapped: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Adresse d'écoute du serveur HTTP
    pub listen_address: String,
    pub port: u16,

    /// Niveau de log
    pub log_level: String,

    /// Mode de journalisation (fichier ou systemd-journal)
    pub log_mode: LogMode,

    pub storage: StorageConfig,

    /// Pagination de la liste des paquets
    pub default_per_page: usize,
    pub max_per_page: usize,

    /// Décalage horaire (minutes) des libellés de temps du résumé
    pub display_utc_offset_minutes: i32,

    pub ingest: IngestConfig,
    pub enrichment: EnrichmentConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_address: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            log_mode: LogMode::File,
            storage: StorageConfig::default(),
            default_per_page: 25,
            max_per_page: 100,
            display_utc_offset_minutes: 0,
            ingest: IngestConfig::default(),
            enrichment: EnrichmentConfig::default(),
        }
    }
}

/// Fichier effectivement lu : `path` s'il est donné, sinon le fichier par défaut
pub fn config_path(path: Option<&Path>) -> &Path {
    path.unwrap_or_else(|| Path::new(CONFIG_FILE))
}

impl Config {
    /// Charge la configuration depuis `path` (ou le fichier par défaut).
    /// Un fichier absent donne la configuration par défaut. Rien n'est
    /// journalisé ici, les logs ne sont pas encore initialisés.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = config_path(path);

        let mut config = if path.exists() {
            let content = fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Sauvegarde la configuration dans `path`
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let config_json = serde_json::to_string_pretty(self)?;
        fs::write(path, config_json)?;
        Ok(())
    }

    /// Surcharges par variables d'environnement
    pub fn apply_env(&mut self) {
        if let Some(port) = env::var("NETLENS_PORT").ok().and_then(|p| p.parse().ok()) {
            self.port = port;
        }
        if let Ok(address) = env::var("NETLENS_LISTEN_ADDRESS") {
            self.listen_address = address;
        }
        if let Ok(dir) = env::var("NETLENS_DATA_DIR") {
            self.storage = StorageConfig::Directory {
                path: PathBuf::from(dir),
            };
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_per_page == 0 {
            return Err(ConfigError::Invalid("max_per_page doit être positif".into()));
        }
        if self.default_per_page == 0 || self.default_per_page > self.max_per_page {
            return Err(ConfigError::Invalid(format!(
                "default_per_page ({}) doit être compris entre 1 et max_per_page ({})",
                self.default_per_page, self.max_per_page
            )));
        }
        if self.enrichment.cache_ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache_ttl_secs doit être positif".into()));
        }
        if self.ingest.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size doit être positif".into()));
        }
        if self.display_utc_offset_minutes.abs() >= 24 * 60 {
            return Err(ConfigError::Invalid(format!(
                "décalage horaire hors limites: {} minutes",
                self.display_utc_offset_minutes
            )));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_address, self.port)
    }

    /// Fuseau d'affichage des libellés de temps
    pub fn display_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.display_utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_fallback() {
        assert_eq!(config_path(None), Path::new(CONFIG_FILE));
        let custom = Path::new("/tmp/netlens.json");
        assert_eq!(config_path(Some(custom)), custom);
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_addr(), "0.0.0.0:8000");
        assert_eq!(config.display_offset(), Utc.fix());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{"port": 9000, "storage": {"backend": "memory"}}"#).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.storage, StorageConfig::Memory);
        assert_eq!(config.max_per_page, 100);
        assert_eq!(config.enrichment.cache_ttl_secs, 3600);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.default_per_page = 500;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.ingest.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.enrichment.cache_ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_display_offset_minutes() {
        let config = Config {
            display_utc_offset_minutes: 120,
            ..Config::default()
        };
        assert_eq!(config.display_offset().local_minus_utc(), 7200);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            port: 8123,
            storage: StorageConfig::Directory {
                path: dir.path().join("runs"),
            },
            ..Config::default()
        };
        config.save(&path).unwrap();

        let mut loaded: Config = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        loaded.ingest.workers = config.ingest.workers;
        assert_eq!(loaded, config);
    }
}
