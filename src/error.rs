//! Types d'erreurs du moteur
//!
//! Chaque couche possède sa propre énumération ; les erreurs « attendues » par
//! paquet (données partielles) ne passent pas par ici mais par
//! `ingest::PacketDiagnostic`.

use thiserror::Error;

/// Erreurs de l'ingestion d'un lot de paquets
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("aucun paquet à ingérer")]
    Empty,

    #[error("échec d'un worker d'ingestion: {0}")]
    Worker(String),

    #[error("erreur de décodage: {0}")]
    Decode(#[from] DecodeError),

    #[error("erreur de stockage: {0}")]
    Storage(#[from] StorageError),
}

/// Erreurs du collaborateur de décodage
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("lecture impossible: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON invalide (ligne {line}): {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("format de capture non supporté: {0}")]
    Unsupported(String),

    #[cfg(feature = "pcap-file")]
    #[error("erreur pcap: {0}")]
    Pcap(#[from] pcap::Error),
}

/// Erreurs du contrat de stockage
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("identifiant d'ingestion invalide: {0}")]
    InvalidId(String),

    #[error("l'ingestion {0} existe déjà")]
    AlreadyExists(String),

    #[error("erreur d'entrée/sortie: {0}")]
    Io(#[from] std::io::Error),

    #[error("erreur de sérialisation: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("stockage indisponible: {0}")]
    Unavailable(String),
}

/// Erreurs de la couche de requêtes
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("paramètre invalide: {0}")]
    Validation(String),

    #[error("aucune donnée ingérée. Veuillez d'abord importer une capture.")]
    NoData,

    #[error("ingestion introuvable: {0}")]
    RunNotFound(String),

    #[error("erreur de stockage: {0}")]
    Storage(#[from] StorageError),
}

/// Erreurs des recherches externes (DNS inverse, constructeurs)
#[derive(Error, Debug, Clone)]
pub enum LookupError {
    #[error("délai dépassé")]
    Timeout,

    #[error("échec de la résolution: {0}")]
    Failed(String),
}

/// Erreurs de configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("lecture de la configuration impossible: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration JSON invalide: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("configuration invalide: {0}")]
    Invalid(String),

    #[error("base OUI illisible ({path}): {source}")]
    OuiDatabase {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Erreurs d'initialisation du service
#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
