//! Lecture d'un fichier pcap hors ligne (libpcap)

use super::frame::decode_frame;
use crate::error::DecodeError;
use crate::models::DecodedPacket;
use chrono::{TimeZone, Utc};
use log::{debug, warn};
use pcap::{Capture, Linktype};
use std::path::Path;

/// Décode toutes les trames Ethernet d'un fichier pcap/pcapng
pub fn load_pcap(path: &Path) -> Result<Vec<DecodedPacket>, DecodeError> {
    let mut capture = Capture::from_file(path)?;

    let link = capture.get_datalink();
    if link != Linktype::ETHERNET {
        return Err(DecodeError::Unsupported(format!(
            "type de lien {:?} (seul Ethernet est pris en charge)",
            link
        )));
    }

    let mut packets = Vec::new();
    let mut skipped = 0usize;
    loop {
        match capture.next_packet() {
            Ok(frame) => {
                let sec = frame.header.ts.tv_sec as i64;
                let usec = frame.header.ts.tv_usec as u32;
                match Utc.timestamp_opt(sec, usec.saturating_mul(1000)).single() {
                    Some(ts) => packets.push(decode_frame(frame.data, ts, frame.header.len)),
                    None => skipped += 1,
                }
            }
            Err(pcap::Error::NoMorePackets) => break,
            Err(e) => return Err(e.into()),
        }
    }

    if skipped > 0 {
        warn!("{} trames ignorées (horodatage invalide) dans {}", skipped, path.display());
    }
    debug!("{} trames lues depuis {}", packets.len(), path.display());
    Ok(packets)
}
