//! Initialisation de la journalisation (stderr ou systemd-journal)

use crate::config::Config;
use log::{info, LevelFilter};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Destination des journaux
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogMode {
    /// Sortie standard d'erreur, via env_logger
    #[default]
    File,
    /// Journal via systemd-journal
    SystemdJournal,
}

/// Niveau de log lu dans la configuration, `info` si inconnu
pub fn level_filter(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

fn init_env_logger(level: &str) {
    // RUST_LOG reste prioritaire sur le niveau configuré
    let result = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();
    if let Err(e) = result {
        eprintln!("Logger déjà initialisé: {}", e);
    }
}

/// Installe le logger choisi par `config.log_mode`
pub fn init_logging(config: &Config) {
    match config.log_mode {
        LogMode::File => init_env_logger(&config.log_level),
        LogMode::SystemdJournal => {
            #[cfg(feature = "systemd")]
            {
                use systemd_journal_logger::JournalLog;

                match JournalLog::new() {
                    Ok(logger) => {
                        if let Err(e) = logger.with_syslog_identifier("netlens".to_string()).install() {
                            eprintln!("Erreur lors de l'installation du logger systemd: {}", e);
                            init_env_logger(&config.log_level);
                        } else {
                            log::set_max_level(level_filter(&config.log_level));
                            info!("Logger systemd initialisé avec niveau: {}", config.log_level);
                        }
                    }
                    Err(e) => {
                        eprintln!("Erreur lors de l'initialisation du logger systemd: {}", e);
                        init_env_logger(&config.log_level);
                    }
                }
            }

            #[cfg(not(feature = "systemd"))]
            {
                eprintln!(
                    "AVERTISSEMENT: le mode SystemdJournal n'est pas disponible (feature 'systemd' non activée), sortie standard utilisée."
                );
                init_env_logger(&config.log_level);
            }
        }
    }
    info!("Journalisation prête (mode {:?})", config.log_mode);
}
