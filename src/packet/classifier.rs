//! Protocol classifier
//!
//! Maps either a link-layer frame (sliced with `etherparse`) or a raw IPv4 buffer to
//! a [`PacketRecord`]. Classification never fails: anything that cannot be parsed
//! becomes a minimal `Unknown` record, except raw non-IPv4 traffic which is dropped.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use etherparse::{NetSlice, SlicedPacket, TransportSlice};

use crate::constants::MIN_IPV4_HEADER_LEN;
use crate::packet::record::{PacketRecord, Protocol};

const IPPROTO_ICMP: u8 = 1;
const IPPROTO_TCP: u8 = 6;
const IPPROTO_UDP: u8 = 17;

/// Link layer of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayer {
    Ethernet,
    /// Frame starts directly with the IP header
    Ip,
}

/// Classify a frame delivered by the capture library.
///
/// `wire_len` is the original length on the wire, which may exceed `data.len()`
/// when the capture was truncated.
pub fn classify_frame(link: LinkLayer, data: &[u8], wire_len: u32) -> PacketRecord {
    classify_frame_at(link, data, wire_len, Utc::now())
}

pub fn classify_frame_at(
    link: LinkLayer,
    data: &[u8],
    wire_len: u32,
    timestamp: DateTime<Utc>,
) -> PacketRecord {
    let sliced = match link {
        LinkLayer::Ethernet => SlicedPacket::from_ethernet(data).map_err(|e| e.to_string()),
        LinkLayer::Ip => SlicedPacket::from_ip(data).map_err(|e| e.to_string()),
    };

    match sliced {
        Ok(sliced) => classify_sliced(&sliced, wire_len, timestamp),
        Err(e) => {
            tracing::trace!(error = %e, "Frame did not slice, recording as unknown");
            PacketRecord::fallback(wire_len, timestamp)
        }
    }
}

/// Classify an already sliced packet.
pub fn classify_sliced(
    packet: &SlicedPacket<'_>,
    wire_len: u32,
    timestamp: DateTime<Utc>,
) -> PacketRecord {
    let mut record = PacketRecord::fallback(wire_len, timestamp);

    let Some(net) = &packet.net else {
        return record;
    };

    if let NetSlice::Ipv4(ipv4) = net {
        record.source_addr = Some(ipv4.header().source_addr());
        record.dest_addr = Some(ipv4.header().destination_addr());
    }

    match &packet.transport {
        Some(TransportSlice::Tcp(tcp)) => {
            let dst_port = tcp.destination_port();
            record.protocol = Protocol::for_tcp(dst_port);
            record.port = Some(dst_port);
        }
        Some(TransportSlice::Udp(udp)) => {
            let dst_port = udp.destination_port();
            record.protocol = Protocol::for_udp(Some(udp.source_port()), dst_port);
            record.port = Some(dst_port);
        }
        Some(TransportSlice::Icmpv4(_)) => {
            record.protocol = Protocol::Icmp;
        }
        _ => {}
    }

    record
}

/// Classify a raw IP buffer as received from a raw socket.
///
/// Returns `None` for buffers shorter than an IPv4 header and for anything that is
/// not IPv4; those are dropped from sonification.
pub fn classify_raw(data: &[u8]) -> Option<PacketRecord> {
    classify_raw_at(data, Utc::now())
}

pub fn classify_raw_at(data: &[u8], timestamp: DateTime<Utc>) -> Option<PacketRecord> {
    if data.len() < MIN_IPV4_HEADER_LEN || data[0] >> 4 != 4 {
        return None;
    }

    let size = u32::try_from(data.len()).unwrap_or(u32::MAX);
    let record = match parse_ipv4(data) {
        Some(header) => header.into_record(size, timestamp),
        None => {
            tracing::trace!(len = data.len(), "Malformed IPv4 header, recording as unknown");
            PacketRecord::fallback(size, timestamp)
        }
    };

    Some(record)
}

struct Ipv4Fields {
    source: Ipv4Addr,
    destination: Ipv4Addr,
    protocol: Protocol,
    port: Option<u16>,
}

impl Ipv4Fields {
    fn into_record(self, size_bytes: u32, timestamp: DateTime<Utc>) -> PacketRecord {
        PacketRecord {
            size_bytes,
            timestamp,
            protocol: self.protocol,
            source_addr: Some(self.source),
            dest_addr: Some(self.destination),
            port: self.port,
        }
    }
}

fn parse_ipv4(data: &[u8]) -> Option<Ipv4Fields> {
    let header_len = usize::from(data[0] & 0x0F) * 4;
    if header_len < MIN_IPV4_HEADER_LEN {
        return None;
    }

    let source = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
    let destination = Ipv4Addr::new(data[16], data[17], data[18], data[19]);

    // Source and destination ports, present only when 4 bytes of L4 were captured
    let ports = data
        .get(header_len..header_len + 4)
        .map(|l4| (u16::from_be_bytes([l4[0], l4[1]]), u16::from_be_bytes([l4[2], l4[3]])));

    let (protocol, port) = match data[9] {
        IPPROTO_TCP => match ports {
            Some((_, dst)) => (Protocol::for_tcp(dst), Some(dst)),
            None => (Protocol::Tcp, None),
        },
        IPPROTO_UDP => match ports {
            Some((src, dst)) => (Protocol::for_udp(Some(src), dst), Some(dst)),
            None => (Protocol::Udp, None),
        },
        IPPROTO_ICMP => (Protocol::Icmp, None),
        _ => (Protocol::Ip, None),
    };

    Some(Ipv4Fields {
        source,
        destination,
        protocol,
        port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::PacketBuilder;
    use proptest::prelude::*;

    fn ipv4_tcp(src_port: u16, dst_port: u16) -> Vec<u8> {
        let builder = PacketBuilder::ipv4([192, 168, 1, 10], [93, 184, 216, 34], 64)
            .tcp(src_port, dst_port, 1, 1024);
        let mut packet = Vec::with_capacity(builder.size(8));
        builder.write(&mut packet, &[0u8; 8]).unwrap();
        packet
    }

    fn ipv4_udp(src_port: u16, dst_port: u16) -> Vec<u8> {
        let builder = PacketBuilder::ipv4([10, 0, 0, 5], [10, 0, 0, 1], 64).udp(src_port, dst_port);
        let mut packet = Vec::with_capacity(builder.size(4));
        builder.write(&mut packet, &[1, 2, 3, 4]).unwrap();
        packet
    }

    fn ethernet_tcp(dst_port: u16) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ipv4([192, 168, 0, 1], [192, 168, 0, 2], 64)
            .tcp(50000, dst_port, 0, 512);
        let mut packet = Vec::with_capacity(builder.size(0));
        builder.write(&mut packet, &[]).unwrap();
        packet
    }

    #[test]
    fn test_raw_tcp_and_promotion() {
        let record = classify_raw(&ipv4_tcp(51000, 80)).unwrap();
        assert_eq!(record.protocol, Protocol::Http);
        assert_eq!(record.port, Some(80));
        assert_eq!(record.source_addr, Some(Ipv4Addr::new(192, 168, 1, 10)));
        assert_eq!(record.dest_addr, Some(Ipv4Addr::new(93, 184, 216, 34)));

        assert_eq!(classify_raw(&ipv4_tcp(51000, 443)).unwrap().protocol, Protocol::Https);
        assert_eq!(classify_raw(&ipv4_tcp(443, 51000)).unwrap().protocol, Protocol::Tcp);
    }

    #[test]
    fn test_raw_udp_dns_either_direction() {
        assert_eq!(classify_raw(&ipv4_udp(40000, 53)).unwrap().protocol, Protocol::Dns);

        let reply = classify_raw(&ipv4_udp(53, 40000)).unwrap();
        assert_eq!(reply.protocol, Protocol::Dns);
        assert_eq!(reply.port, Some(40000));

        assert_eq!(classify_raw(&ipv4_udp(40000, 123)).unwrap().protocol, Protocol::Udp);
    }

    #[test]
    fn test_raw_size_is_buffer_length() {
        let packet = ipv4_udp(1000, 2000);
        let record = classify_raw(&packet).unwrap();
        assert_eq!(record.size_bytes as usize, packet.len());
    }

    #[test]
    fn test_raw_truncated_transport_leaves_port_unset() {
        let mut header = ipv4_tcp(1234, 80);
        header.truncate(22);
        let record = classify_raw(&header).unwrap();
        assert_eq!(record.protocol, Protocol::Tcp);
        assert_eq!(record.port, None);
    }

    #[test]
    fn test_raw_icmp_and_generic_ip() {
        let mut header = [0u8; 20];
        header[0] = 0x45;
        header[9] = 1;
        assert_eq!(classify_raw(&header).unwrap().protocol, Protocol::Icmp);

        header[9] = 47; // GRE
        let record = classify_raw(&header).unwrap();
        assert_eq!(record.protocol, Protocol::Ip);
        assert_eq!(record.port, None);
    }

    #[test]
    fn test_raw_bad_header_length_falls_back() {
        let mut header = [0u8; 24];
        header[0] = 0x42;
        header[9] = 6;
        let record = classify_raw(&header).unwrap();
        assert_eq!(record.protocol, Protocol::Unknown);
        assert_eq!(record.size_bytes, 24);
        assert!(record.source_addr.is_none());
    }

    #[test]
    fn test_raw_drops_ipv6() {
        let mut header = [0u8; 40];
        header[0] = 0x60;
        assert!(classify_raw(&header).is_none());
    }

    #[test]
    fn test_frame_ethernet() {
        let frame = ethernet_tcp(443);
        let record = classify_frame(LinkLayer::Ethernet, &frame, 1500);
        assert_eq!(record.protocol, Protocol::Https);
        assert_eq!(record.port, Some(443));
        assert_eq!(record.size_bytes, 1500);
        assert_eq!(record.source_addr, Some(Ipv4Addr::new(192, 168, 0, 1)));
    }

    #[test]
    fn test_frame_icmp() {
        let builder = PacketBuilder::ethernet2([1; 6], [2; 6])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .icmpv4_echo_request(1, 1);
        let mut frame = Vec::with_capacity(builder.size(0));
        builder.write(&mut frame, &[]).unwrap();

        let record = classify_frame(LinkLayer::Ethernet, &frame, frame.len() as u32);
        assert_eq!(record.protocol, Protocol::Icmp);
        assert_eq!(record.port, None);
    }

    #[test]
    fn test_frame_ipv6_udp_has_no_ipv4_addresses() {
        let builder = PacketBuilder::ipv6([0xfe; 16], [0xfd; 16], 64).udp(5353, 53);
        let mut frame = Vec::with_capacity(builder.size(0));
        builder.write(&mut frame, &[]).unwrap();

        let record = classify_frame(LinkLayer::Ip, &frame, frame.len() as u32);
        assert_eq!(record.protocol, Protocol::Dns);
        assert!(record.source_addr.is_none());
    }

    #[test]
    fn test_frame_garbage_is_unknown() {
        let record = classify_frame(LinkLayer::Ethernet, &[0xff; 5], 5);
        assert_eq!(record, PacketRecord::fallback(5, record.timestamp));
    }

    proptest! {
        #[test]
        fn short_buffers_are_dropped(data in proptest::collection::vec(any::<u8>(), 0..20)) {
            prop_assert!(classify_raw(&data).is_none());
        }

        #[test]
        fn non_ipv4_is_dropped(
            first in any::<u8>().prop_filter("not version 4", |b| b >> 4 != 4),
            rest in proptest::collection::vec(any::<u8>(), 19..200),
        ) {
            let mut data = vec![first];
            data.extend(rest);
            prop_assert!(classify_raw(&data).is_none());
        }

        #[test]
        fn raw_classification_is_total(data in proptest::collection::vec(any::<u8>(), 0..300)) {
            if let Some(record) = classify_raw(&data) {
                prop_assert_eq!(record.size_bytes as usize, data.len());
            }
        }

        #[test]
        fn frame_classification_is_total(data in proptest::collection::vec(any::<u8>(), 0..300)) {
            let record = classify_frame(LinkLayer::Ethernet, &data, data.len() as u32);
            prop_assert_eq!(record.size_bytes as usize, data.len());
        }
    }
}
