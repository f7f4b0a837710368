//! Fan-out queue between the capture domain and its consumers
//!
//! Every published record is delivered to two independent unbounded channels, one
//! drained by the synthesis tick and one by the presentation tick, so neither
//! consumer can starve the other.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::packet::record::PacketRecord;

/// Producer handle shared by capture sources. Cloning is cheap.
#[derive(Clone)]
pub struct PacketSink {
    audio_tx: Sender<PacketRecord>,
    visual_tx: Sender<PacketRecord>,
}

impl PacketSink {
    /// Enqueue a record for both consumers. Never blocks; a consumer that has gone
    /// away is ignored.
    pub fn publish(&self, record: PacketRecord) {
        let _ = self.visual_tx.send(record.clone());
        let _ = self.audio_tx.send(record);
    }
}

/// Consumer side of one fan-out branch
#[derive(Clone)]
pub struct PacketStream {
    rx: Receiver<PacketRecord>,
}

impl PacketStream {
    /// Take everything queued right now without waiting
    pub fn drain(&self) -> Vec<PacketRecord> {
        self.rx.try_iter().collect()
    }

    /// Drop everything queued right now, returning how many records were discarded
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Create the fan-out: `(sink, audio stream, visual stream)`
pub fn packet_bus() -> (PacketSink, PacketStream, PacketStream) {
    let (audio_tx, audio_rx) = unbounded();
    let (visual_tx, visual_rx) = unbounded();

    (
        PacketSink { audio_tx, visual_tx },
        PacketStream { rx: audio_rx },
        PacketStream { rx: visual_rx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::thread;

    #[test]
    fn test_both_consumers_see_every_record() {
        let (sink, audio, visual) = packet_bus();
        for size in [64, 128, 256] {
            sink.publish(PacketRecord::fallback(size, Utc::now()));
        }

        let sizes: Vec<u32> = audio.drain().iter().map(|r| r.size_bytes).collect();
        assert_eq!(sizes, vec![64, 128, 256]);
        assert_eq!(visual.len(), 3);
        assert_eq!(visual.drain().len(), 3);
        assert!(audio.is_empty() && visual.is_empty());
    }

    #[test]
    fn test_order_preserved_from_producer_thread() {
        let (sink, audio, _visual) = packet_bus();
        let producer = thread::spawn(move || {
            for size in 0..1000u32 {
                sink.publish(PacketRecord::fallback(size, Utc::now()));
            }
        });
        producer.join().unwrap();

        let sizes: Vec<u32> = audio.drain().iter().map(|r| r.size_bytes).collect();
        assert_eq!(sizes, (0..1000).collect::<Vec<_>>());
    }

    #[test]
    fn test_publish_after_consumer_dropped() {
        let (sink, audio, visual) = packet_bus();
        drop(visual);
        sink.publish(PacketRecord::fallback(1, Utc::now()));
        assert_eq!(audio.clear(), 1);
    }
}
