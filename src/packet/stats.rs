//! Per-protocol traffic statistics for the presentation feed

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::packet::record::{PacketRecord, Protocol};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProtocolCounter {
    pub packets: u64,
    pub bytes: u64,
}

/// Packet and byte counts keyed by protocol
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProtocolStats {
    counters: BTreeMap<Protocol, ProtocolCounter>,
}

impl ProtocolStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: &PacketRecord) {
        let counter = self.counters.entry(record.protocol).or_default();
        counter.packets += 1;
        counter.bytes += u64::from(record.size_bytes);
    }

    pub fn extend<'a>(&mut self, records: impl IntoIterator<Item = &'a PacketRecord>) {
        for record in records {
            self.record(record);
        }
    }

    pub fn get(&self, protocol: Protocol) -> ProtocolCounter {
        self.counters.get(&protocol).copied().unwrap_or_default()
    }

    pub fn total_packets(&self) -> u64 {
        self.counters.values().map(|c| c.packets).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.counters.values().map(|c| c.bytes).sum()
    }

    pub fn reset(&mut self) {
        self.counters.clear();
    }
}

/// Renders as `TCP: 3, DNS: 1`
impl fmt::Display for ProtocolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (protocol, counter) in &self.counters {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", protocol, counter.packets)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(protocol: Protocol, size_bytes: u32) -> PacketRecord {
        PacketRecord {
            protocol,
            ..PacketRecord::fallback(size_bytes, Utc::now())
        }
    }

    #[test]
    fn test_counts_and_display() {
        let mut stats = ProtocolStats::new();
        let records = [
            record(Protocol::Tcp, 100),
            record(Protocol::Dns, 80),
            record(Protocol::Tcp, 1400),
        ];
        stats.extend(&records);

        assert_eq!(stats.get(Protocol::Tcp), ProtocolCounter { packets: 2, bytes: 1500 });
        assert_eq!(stats.get(Protocol::Udp), ProtocolCounter::default());
        assert_eq!(stats.total_packets(), 3);
        assert_eq!(stats.total_bytes(), 1580);
        assert_eq!(stats.to_string(), "TCP: 2, DNS: 1");

        stats.reset();
        assert_eq!(stats.to_string(), "");
    }
}
