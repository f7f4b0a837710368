//! Live capture through libpcap / Npcap
//!
//! Frames arrive already framed by the capture library and are sliced with
//! `etherparse`, so this is the highest-fidelity source.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use pcap::{Active, Capture, Device, Linktype};

use crate::capture::{join_with_timeout, CaptureMode, CaptureSource, InterfaceInfo};
use crate::config::CaptureConfig;
use crate::constants::LIVE_SNAPLEN;
use crate::error::CaptureError;
use crate::packet::{classify_frame, LinkLayer, PacketRecord, PacketSink};

const CONTEXT: &str = "Live packet capture";

/// Enumerate capture interfaces. Fails when the library is missing or reports none.
pub fn list_interfaces() -> Result<Vec<InterfaceInfo>, CaptureError> {
    let devices = Device::list().map_err(|e| CaptureError::Unavailable(e.to_string()))?;

    Ok(devices
        .into_iter()
        .map(|device| {
            let label = format!(
                "[LiveCapture] {}",
                device.desc.as_deref().unwrap_or(device.name.as_str())
            );
            InterfaceInfo {
                name: device.name,
                label,
            }
        })
        .collect())
}

fn link_layer(linktype: Linktype) -> Option<LinkLayer> {
    if linktype == Linktype::ETHERNET {
        Some(LinkLayer::Ethernet)
    } else if linktype == Linktype::RAW || linktype == Linktype::IPV4 {
        Some(LinkLayer::Ip)
    } else {
        None
    }
}

/// Arrival handler: classify one frame and enqueue it
fn on_arrival(sink: &PacketSink, link: Option<LinkLayer>, data: &[u8], wire_len: u32) {
    let record = match link {
        Some(link) => classify_frame(link, data, wire_len),
        None => PacketRecord::fallback(wire_len, chrono::Utc::now()),
    };
    sink.publish(record);
}

fn dispatch_loop(mut capture: Capture<Active>, running: Arc<AtomicBool>, sink: PacketSink) {
    let linktype = capture.get_datalink();
    let link = link_layer(linktype);
    if link.is_none() {
        tracing::warn!(?linktype, "Unsupported link type, packets will be recorded as unknown");
    }

    while running.load(Ordering::Relaxed) {
        match capture.next_packet() {
            Ok(packet) => on_arrival(&sink, link, packet.data, packet.header.len),
            Err(e) => {
                if !keep_polling(&e, &running) {
                    break;
                }
            }
        }
    }
    // Dropping the capture closes the interface
}

/// Poll timeouts are routine. Anything else ends the capture and clears `running`
/// so the source reports itself stopped.
fn keep_polling(error: &pcap::Error, running: &AtomicBool) -> bool {
    if matches!(error, pcap::Error::TimeoutExpired) {
        return true;
    }
    if running.swap(false, Ordering::SeqCst) {
        tracing::warn!(error = %error, "Live capture ended unexpectedly");
    }
    false
}

pub struct LiveCaptureSource {
    config: CaptureConfig,
    interface: InterfaceInfo,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl LiveCaptureSource {
    pub fn new(config: CaptureConfig, interface: InterfaceInfo) -> Self {
        Self {
            config,
            interface,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    fn open(&self) -> Result<Capture<Active>, CaptureError> {
        let open_err = |e: pcap::Error| CaptureError::from_interface(CONTEXT, e.to_string());

        Capture::from_device(self.interface.name.as_str())
            .map_err(open_err)?
            .promisc(self.config.promiscuous)
            .snaplen(LIVE_SNAPLEN)
            .timeout(self.config.poll_timeout_ms.max(1) as i32)
            .open()
            .map_err(open_err)
    }
}

impl CaptureSource for LiveCaptureSource {
    fn mode(&self) -> CaptureMode {
        CaptureMode::LiveCapture
    }

    fn start(&mut self, sink: PacketSink) -> Result<(), CaptureError> {
        if self.is_running() {
            return Ok(());
        }

        let capture = self.open()?;
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let spawned = thread::Builder::new()
            .name("capture-live".to_owned())
            .spawn(move || dispatch_loop(capture, running, sink));

        match spawned {
            Ok(handle) => {
                self.thread_handle = Some(handle);
                tracing::info!(interface = %self.interface.name, "Live capture started");
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(CaptureError::Thread(e))
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            join_with_timeout(handle, self.config.stop_timeout());
            tracing::info!(interface = %self.interface.name, "Live capture stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self
                .thread_handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    fn describe(&self) -> String {
        format!("Capturing via LiveCapture: {}", self.interface.label)
    }
}

impl Drop for LiveCaptureSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{packet_bus, Protocol};

    #[test]
    fn test_link_layer_mapping() {
        assert_eq!(link_layer(Linktype::ETHERNET), Some(LinkLayer::Ethernet));
        assert_eq!(link_layer(Linktype::RAW), Some(LinkLayer::Ip));
        assert_eq!(link_layer(Linktype::IEEE802_11), None);
    }

    #[test]
    fn test_unsupported_link_records_unknown() {
        let (sink, audio, _visual) = packet_bus();
        on_arrival(&sink, None, &[0u8; 60], 60);
        let records = audio.drain();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].protocol, Protocol::Unknown);
        assert_eq!(records[0].size_bytes, 60);
    }

    #[test]
    fn test_capture_error_clears_running() {
        let running = AtomicBool::new(true);
        assert!(keep_polling(&pcap::Error::TimeoutExpired, &running));
        assert!(running.load(Ordering::SeqCst));

        assert!(!keep_polling(&pcap::Error::NoMorePackets, &running));
        assert!(!running.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stop_without_start() {
        let mut source = LiveCaptureSource::new(
            CaptureConfig::default(),
            InterfaceInfo {
                name: "lo".to_owned(),
                label: "[LiveCapture] lo".to_owned(),
            },
        );
        source.stop();
        source.stop();
        assert!(!source.is_running());
    }
}
