//! Adaptateur vers le collaborateur de décodage
//!
//! Les paquets arrivent soit déjà décodés (JSON), soit sous forme de trames
//! Ethernet brutes converties par `frame`.

pub mod frame;
#[cfg(feature = "pcap-file")]
pub mod pcap_file;

use crate::error::DecodeError;
use crate::models::DecodedPacket;
use clap::ValueEnum;
use log::info;
use std::fs;
use std::path::Path;

/// Format d'un fichier de capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CaptureFormat {
    /// Tableau JSON ou une ligne JSON par paquet
    Json,
    /// Fichier pcap/pcapng (fonctionnalité `pcap-file`)
    Pcap,
}

impl CaptureFormat {
    /// Déduit le format de l'extension du fichier
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("pcap") | Some("pcapng") | Some("cap") => CaptureFormat::Pcap,
            _ => CaptureFormat::Json,
        }
    }
}

/// Charge une capture dans le format demandé
pub fn load(path: &Path, format: CaptureFormat) -> Result<Vec<DecodedPacket>, DecodeError> {
    let packets = match format {
        CaptureFormat::Json => load_json(path)?,
        CaptureFormat::Pcap => load_pcap(path)?,
    };
    info!("{} paquets décodés depuis {}", packets.len(), path.display());
    Ok(packets)
}

#[cfg(feature = "pcap-file")]
fn load_pcap(path: &Path) -> Result<Vec<DecodedPacket>, DecodeError> {
    pcap_file::load_pcap(path)
}

#[cfg(not(feature = "pcap-file"))]
fn load_pcap(_path: &Path) -> Result<Vec<DecodedPacket>, DecodeError> {
    Err(DecodeError::Unsupported(
        "lecture pcap désactivée (compiler avec --features pcap-file)".to_string(),
    ))
}

pub fn load_json(path: &Path) -> Result<Vec<DecodedPacket>, DecodeError> {
    let content = fs::read_to_string(path)?;
    parse_json(&content)
}

/// Accepte un tableau JSON ou des lignes JSON (une par paquet)
pub fn parse_json(content: &str) -> Result<Vec<DecodedPacket>, DecodeError> {
    if content.trim_start().starts_with('[') {
        return serde_json::from_str(content).map_err(|source| DecodeError::Json {
            line: source.line(),
            source,
        });
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| DecodeError::Json {
                line: idx + 1,
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PACKET: &str = r#"{"timestamp":"2024-03-01T10:00:00Z","length":60,"srcIp":"10.0.0.1","dstIp":"10.0.0.2","transport":{"type":"UDP","sport":5000,"dport":53}}"#;

    #[test]
    fn test_parse_array_and_lines() {
        let array = format!("[{},{}]", PACKET, PACKET);
        assert_eq!(parse_json(&array).unwrap().len(), 2);

        let lines = format!("{}\n\n{}\n", PACKET, PACKET);
        assert_eq!(parse_json(&lines).unwrap().len(), 2);
    }

    #[test]
    fn test_bad_line_reports_position() {
        let lines = format!("{}\n{{\"length\": 1}}\n", PACKET);
        match parse_json(&lines) {
            Err(DecodeError::Json { line, .. }) => assert_eq!(line, 2),
            other => panic!("résultat inattendu: {:?}", other.map(|p| p.len())),
        }
    }

    #[test]
    fn test_load_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", PACKET).unwrap();
        let packets = load(file.path(), CaptureFormat::Json).unwrap();
        assert_eq!(packets[0].ports(), Some((5000, 53)));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(CaptureFormat::from_path(Path::new("a.PCAP")), CaptureFormat::Pcap);
        assert_eq!(CaptureFormat::from_path(Path::new("a.json")), CaptureFormat::Json);
        assert_eq!(CaptureFormat::from_path(Path::new("capture")), CaptureFormat::Json);
    }
}
