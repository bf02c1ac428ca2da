//! Conversion d'une trame Ethernet brute en `DecodedPacket`

use crate::models::{AppLayer, DecodedPacket, NetworkLayer, TcpFlags, Transport};
use chrono::{DateTime, Utc};
use pnet::packet::arp::ArpPacket;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::icmp::IcmpPacket;
use pnet::packet::icmpv6::Icmpv6Packet;
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;

/// Ports sur lesquels la charge UDP est lue comme du DNS (DNS, mDNS, LLMNR)
const DNS_PORTS: [u16; 3] = [53, 5353, 5355];

const HTTP_METHODS: [&str; 9] = [
    "GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH", "CONNECT", "TRACE",
];

/// Décode une trame. Une trame illisible donne un paquet sans couches,
/// classé « Other » plus loin.
pub fn decode_frame(data: &[u8], timestamp: DateTime<Utc>, wire_len: u32) -> DecodedPacket {
    let mut packet = DecodedPacket {
        timestamp,
        length: wire_len,
        src_ip: None,
        dst_ip: None,
        src_mac: None,
        dst_mac: None,
        network: NetworkLayer::None,
        transport: Transport::None,
        app: AppLayer::None,
    };

    let Some(ethernet) = EthernetPacket::new(data) else {
        return packet;
    };
    packet.src_mac = Some(ethernet.get_source().to_string());
    packet.dst_mac = Some(ethernet.get_destination().to_string());

    match ethernet.get_ethertype() {
        EtherTypes::Ipv4 => {
            if let Some(ipv4) = Ipv4Packet::new(ethernet.payload()) {
                packet.src_ip = Some(ipv4.get_source().to_string());
                packet.dst_ip = Some(ipv4.get_destination().to_string());
                packet.network = NetworkLayer::Ip {
                    version: 4,
                    ttl: ipv4.get_ttl(),
                };
                decode_transport(&mut packet, ipv4.get_next_level_protocol(), ipv4.payload());
            }
        }
        EtherTypes::Ipv6 => {
            if let Some(ipv6) = Ipv6Packet::new(ethernet.payload()) {
                packet.src_ip = Some(ipv6.get_source().to_string());
                packet.dst_ip = Some(ipv6.get_destination().to_string());
                packet.network = NetworkLayer::Ip {
                    version: 6,
                    ttl: ipv6.get_hop_limit(),
                };
                decode_transport(&mut packet, ipv6.get_next_header(), ipv6.payload());
            }
        }
        EtherTypes::Arp => {
            if let Some(arp) = ArpPacket::new(ethernet.payload()) {
                // Adresses protocolaires de l'émetteur et de la cible
                packet.src_ip = Some(arp.get_sender_proto_addr().to_string());
                packet.dst_ip = Some(arp.get_target_proto_addr().to_string());
                packet.network = NetworkLayer::Arp {
                    operation: arp.get_operation().0,
                };
            }
        }
        _ => {}
    }

    packet
}

fn decode_transport(packet: &mut DecodedPacket, protocol: IpNextHeaderProtocol, payload: &[u8]) {
    match protocol {
        IpNextHeaderProtocols::Tcp => {
            if let Some(tcp) = TcpPacket::new(payload) {
                let (sport, dport) = (tcp.get_source(), tcp.get_destination());
                packet.transport = Transport::Tcp {
                    sport,
                    dport,
                    flags: TcpFlags(tcp.get_flags() as u8),
                    seq: tcp.get_sequence(),
                    ack: tcp.get_acknowledgement(),
                };
                let body = tcp.payload();
                packet.app = if sport == 53 || dport == 53 {
                    // DNS sur TCP : préfixe de longueur sur deux octets
                    body.get(2..).and_then(parse_dns).unwrap_or_default()
                } else {
                    sniff_http(body).unwrap_or_default()
                };
            }
        }
        IpNextHeaderProtocols::Udp => {
            if let Some(udp) = UdpPacket::new(payload) {
                let (sport, dport) = (udp.get_source(), udp.get_destination());
                packet.transport = Transport::Udp {
                    sport,
                    dport,
                    len: udp.get_length(),
                };
                if DNS_PORTS.contains(&sport) || DNS_PORTS.contains(&dport) {
                    packet.app = parse_dns(udp.payload()).unwrap_or_default();
                }
            }
        }
        IpNextHeaderProtocols::Icmp => {
            if let Some(icmp) = IcmpPacket::new(payload) {
                packet.transport = Transport::Icmp {
                    icmp_type: icmp.get_icmp_type().0,
                    code: icmp.get_icmp_code().0,
                };
            }
        }
        IpNextHeaderProtocols::Icmpv6 => {
            if let Some(icmp) = Icmpv6Packet::new(payload) {
                packet.transport = Transport::Icmp {
                    icmp_type: icmp.get_icmpv6_type().0,
                    code: icmp.get_icmpv6_code().0,
                };
            }
        }
        _ => {}
    }
}

/// Lit l'en-tête DNS (RFC 1035) et la première question
///
/// `None` si la charge n'a pas la forme d'un message DNS. Un message sans
/// question reste une couche DNS, avec un nom absent.
pub fn parse_dns(payload: &[u8]) -> Option<AppLayer> {
    if payload.len() < 12 {
        return None;
    }
    let qdcount = u16::from_be_bytes([payload[4], payload[5]]);
    if qdcount == 0 {
        return Some(AppLayer::Dns { qname: None, qtype: None });
    }

    let mut pos = 12;
    let mut labels: Vec<String> = Vec::new();
    loop {
        let label_len = *payload.get(pos)? as usize;
        if label_len == 0 {
            pos += 1;
            break;
        }
        // Pas de compression attendue dans la section question
        if label_len & 0xC0 == 0xC0 {
            pos += 2;
            break;
        }
        pos += 1;
        let label = payload.get(pos..pos + label_len)?;
        labels.push(String::from_utf8_lossy(label).into_owned());
        pos += label_len;
    }

    let qtype = payload
        .get(pos..pos + 2)
        .map(|bytes| u16::from_be_bytes([bytes[0], bytes[1]]));
    let qname = if labels.is_empty() {
        ".".to_string()
    } else {
        format!("{}.", labels.join("."))
    };

    Some(AppLayer::Dns {
        qname: Some(qname),
        qtype,
    })
}

/// Reconnaît une ligne de requête HTTP/1.x ou le début d'une réponse
pub fn sniff_http(payload: &[u8]) -> Option<AppLayer> {
    if payload.is_empty() {
        return None;
    }
    let head_len = payload.len().min(2048);
    let text = String::from_utf8_lossy(&payload[..head_len]);
    let mut lines = text.split("\r\n");
    let request_line = lines.next()?;

    if request_line.starts_with("HTTP/1.") {
        return Some(AppLayer::Http {
            method: None,
            path: None,
            host: None,
        });
    }

    let mut parts = request_line.split(' ');
    let method = parts.next()?;
    let path = parts.next()?;
    let version = parts.next()?;
    if !HTTP_METHODS.contains(&method) || !version.starts_with("HTTP/") {
        return None;
    }

    let host = lines
        .take_while(|line| !line.is_empty())
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("host")
                .then(|| value.trim().to_string())
        });

    Some(AppLayer::Http {
        method: Some(method.to_string()),
        path: Some(path.to_string()),
        host,
    })
}
