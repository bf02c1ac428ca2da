//! Bibliothèque netlens : agrégation et enrichissement de captures réseau
//!
//! Les paquets arrivent déjà décodés. netlens les classe par protocole, agrège
//! connexions et statistiques, puis enrichit les adresses observées (constructeur,
//! nom d'hôte, utilisateur probable) à la demande.

// Modèle et traitement des paquets
pub mod models;     // Structures de données
pub mod classifier; // Étiquette de protocole par paquet
pub mod flows;      // Table des connexions TCP
pub mod stats;      // Statistiques, histogramme et rapport
pub mod ingest;     // Pipeline d'ingestion
pub mod decode;     // Lecture des captures

// Lectures et enrichissement
pub mod enrichment; // Constructeurs, DNS inverse, noms d'utilisateur
pub mod storage;    // Contrat de stockage et backends
pub mod services;   // Façade du moteur
pub mod api;        // API HTTP

// Socle
pub mod config;
pub mod logger;
pub mod error;
pub mod cli;

// Re-export des structures principales
pub use config::Config;
pub use logger::LogMode;
pub use models::{ClassifiedPacket, DecodedPacket, StatsSnapshot};
pub use services::NetlensService;
