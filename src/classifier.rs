//! Classification des paquets
//!
//! Table de règles ordonnée, la première règle qui correspond l'emporte :
//! couche applicative, puis ports TCP/UDP connus, puis type de trame.

use crate::models::{AppLayer, DecodedPacket, NetworkLayer, Transport};

/// Services TCP connus, dans l'ordre de priorité
const TCP_SERVICES: &[(u16, &str)] = &[
    (443, "HTTPS"),
    (22, "SSH"),
    (21, "FTP"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (143, "IMAP"),
    (993, "IMAPS"),
    (995, "POP3S"),
    (3389, "RDP"),
    (5900, "VNC"),
    (8080, "HTTP-Alt"),
    (8443, "HTTPS-Alt"),
];

/// Services UDP connus, dans l'ordre de priorité
const UDP_SERVICES: &[(u16, &str)] = &[
    (53, "DNS"),
    (67, "DHCP"),
    (68, "DHCP"),
    (69, "TFTP"),
    (123, "NTP"),
    (161, "SNMP"),
    (162, "SNMP-Trap"),
    (500, "IKE"),
    (4500, "IPSec-NAT"),
    (5353, "mDNS"),
    (443, "QUIC"),
];

/// Cherche le premier service dont le port est égal au port source ou destination
fn lookup_service(table: &[(u16, &'static str)], sport: u16, dport: u16) -> Option<&'static str> {
    table
        .iter()
        .find(|(port, _)| *port == sport || *port == dport)
        .map(|(_, name)| *name)
}

/// Retourne l'étiquette de protocole d'un paquet. Ne peut pas échouer.
pub fn classify(packet: &DecodedPacket) -> &'static str {
    // La couche applicative l'emporte toujours sur les ports
    if packet.has_dns() {
        return "DNS";
    }
    if packet.has_http() {
        return "HTTP";
    }

    match packet.transport {
        Transport::Tcp { sport, dport, .. } => lookup_service(TCP_SERVICES, sport, dport).unwrap_or("TCP"),
        Transport::Udp { sport, dport, .. } => lookup_service(UDP_SERVICES, sport, dport).unwrap_or("UDP"),
        Transport::Icmp { .. } => "ICMP",
        Transport::None => {
            if packet.is_arp() {
                "ARP"
            } else if packet.has_ip() {
                "IP"
            } else {
                "Other"
            }
        }
    }
}

fn icmp_type_name(icmp_type: u8) -> String {
    match icmp_type {
        0 => "Echo Reply".to_string(),
        8 => "Echo Request".to_string(),
        3 => "Destination Unreachable".to_string(),
        other => format!("Type {}", other),
    }
}

/// Ligne de résumé affichée dans la liste des paquets
pub fn describe(packet: &DecodedPacket, label: &str) -> String {
    match &packet.transport {
        Transport::Tcp { sport, dport, flags, .. } => {
            return format!("{} → {} [{}]", sport, dport, flags);
        }
        Transport::Udp { sport, dport, len } => {
            return format!("{} → {} Len={}", sport, dport, len);
        }
        Transport::Icmp { icmp_type, .. } => return icmp_type_name(*icmp_type),
        Transport::None => {}
    }

    if let NetworkLayer::Arp { operation } = packet.network {
        let op = match operation {
            1 => "Request".to_string(),
            2 => "Reply".to_string(),
            other => format!("Op {}", other),
        };
        return format!(
            "{}: Who has {}? Tell {}",
            op,
            packet.dst_ip.as_deref().unwrap_or("?"),
            packet.src_ip.as_deref().unwrap_or("?")
        );
    }

    if let AppLayer::Dns { qname: Some(qname), .. } = &packet.app {
        return format!("Query: {}", qname);
    }

    label.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TcpFlags;
    use chrono::{TimeZone, Utc};

    fn packet(transport: Transport) -> DecodedPacket {
        DecodedPacket {
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            length: 60,
            src_ip: Some("10.0.0.1".to_string()),
            dst_ip: Some("10.0.0.2".to_string()),
            src_mac: None,
            dst_mac: None,
            network: NetworkLayer::Ip { version: 4, ttl: 64 },
            transport,
            app: AppLayer::None,
        }
    }

    fn tcp(sport: u16, dport: u16) -> Transport {
        Transport::Tcp { sport, dport, flags: TcpFlags(TcpFlags::ACK), seq: 0, ack: 0 }
    }

    fn udp(sport: u16, dport: u16) -> Transport {
        Transport::Udp { sport, dport, len: 20 }
    }

    #[test]
    fn test_tcp_well_known_ports() {
        assert_eq!(classify(&packet(tcp(50000, 443))), "HTTPS");
        assert_eq!(classify(&packet(tcp(443, 50000))), "HTTPS");
        assert_eq!(classify(&packet(tcp(50000, 53))), "DNS");
        assert_eq!(classify(&packet(tcp(50000, 59999))), "TCP");
        assert_eq!(classify(&packet(tcp(8443, 50000))), "HTTPS-Alt");
    }

    #[test]
    fn test_table_order_breaks_ties() {
        // 22 et 443 à la fois : HTTPS est plus haut dans la table
        assert_eq!(classify(&packet(tcp(22, 443))), "HTTPS");
        assert_eq!(classify(&packet(udp(123, 53))), "DNS");
    }

    #[test]
    fn test_udp_ports() {
        assert_eq!(classify(&packet(udp(67, 68))), "DHCP");
        assert_eq!(classify(&packet(udp(40000, 68))), "DHCP");
        assert_eq!(classify(&packet(udp(40000, 443))), "QUIC");
        assert_eq!(classify(&packet(udp(40000, 5353))), "mDNS");
        assert_eq!(classify(&packet(udp(40000, 40001))), "UDP");
    }

    #[test]
    fn test_application_layer_wins_over_ports() {
        let mut http = packet(tcp(50000, 9999));
        http.app = AppLayer::Http { method: Some("GET".into()), path: Some("/".into()), host: None };
        assert_eq!(classify(&http), "HTTP");

        let mut dns = packet(tcp(50000, 443));
        dns.app = AppLayer::Dns { qname: Some("example.com.".into()), qtype: Some(1) };
        assert_eq!(classify(&dns), "DNS");
    }

    #[test]
    fn test_frame_fallbacks() {
        assert_eq!(classify(&packet(Transport::Icmp { icmp_type: 8, code: 0 })), "ICMP");

        let mut arp = packet(Transport::None);
        arp.network = NetworkLayer::Arp { operation: 1 };
        assert_eq!(classify(&arp), "ARP");

        assert_eq!(classify(&packet(Transport::None)), "IP");

        let mut other = packet(Transport::None);
        other.network = NetworkLayer::None;
        other.src_ip = None;
        other.dst_ip = None;
        assert_eq!(classify(&other), "Other");
    }

    #[test]
    fn test_describe() {
        let syn = packet(Transport::Tcp { sport: 1234, dport: 80, flags: TcpFlags(TcpFlags::SYN), seq: 1, ack: 0 });
        assert_eq!(describe(&syn, "HTTP"), "1234 → 80 [S]");
        assert_eq!(describe(&packet(udp(5000, 53)), "DNS"), "5000 → 53 Len=20");
        assert_eq!(describe(&packet(Transport::Icmp { icmp_type: 0, code: 0 }), "ICMP"), "Echo Reply");

        let mut arp = packet(Transport::None);
        arp.network = NetworkLayer::Arp { operation: 1 };
        assert_eq!(describe(&arp, "ARP"), "Request: Who has 10.0.0.2? Tell 10.0.0.1");

        assert_eq!(describe(&packet(Transport::None), "IP"), "IP");
    }
}
