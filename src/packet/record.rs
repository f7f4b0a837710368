//! Immutable snapshot of one observed packet

use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Protocol label used for sonification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Protocol {
    Tcp,
    Udp,
    Http,
    Https,
    Dns,
    Icmp,
    /// IPv4 with a transport the classifier does not name
    Ip,
    #[default]
    Unknown,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Http => "HTTP",
            Protocol::Https => "HTTPS",
            Protocol::Dns => "DNS",
            Protocol::Icmp => "ICMP",
            Protocol::Ip => "IP",
            Protocol::Unknown => "Unknown",
        }
    }

    /// TCP with well-known destination ports promoted to the application protocol
    pub fn for_tcp(dst_port: u16) -> Self {
        match dst_port {
            80 => Protocol::Http,
            443 => Protocol::Https,
            _ => Protocol::Tcp,
        }
    }

    /// UDP promoted to DNS when either side uses port 53
    pub fn for_udp(src_port: Option<u16>, dst_port: u16) -> Self {
        if dst_port == 53 || src_port == Some(53) {
            Protocol::Dns
        } else {
            Protocol::Udp
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketRecord {
    /// Wire length including headers
    pub size_bytes: u32,
    pub timestamp: DateTime<Utc>,
    pub protocol: Protocol,
    pub source_addr: Option<Ipv4Addr>,
    pub dest_addr: Option<Ipv4Addr>,
    /// Destination port when meaningful
    pub port: Option<u16>,
}

impl PacketRecord {
    /// Minimal record used whenever parsing fails
    pub fn fallback(size_bytes: u32, timestamp: DateTime<Utc>) -> Self {
        Self {
            size_bytes,
            timestamp,
            protocol: Protocol::Unknown,
            source_addr: None,
            dest_addr: None,
            port: None,
        }
    }
}
