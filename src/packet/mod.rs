//! Packet records, classification and the capture-to-consumer queues

pub mod classifier;
pub mod queue;
pub mod record;
pub mod stats;

pub use classifier::{classify_frame, classify_raw, LinkLayer};
pub use queue::{packet_bus, PacketSink, PacketStream};
pub use record::{PacketRecord, Protocol};
pub use stats::ProtocolStats;
