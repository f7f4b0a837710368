//! Packet capture
//!
//! Three interchangeable strategies share the [`CaptureSource`] contract: produce
//! [`PacketRecord`](crate::packet::PacketRecord)s into a [`PacketSink`] between
//! `start` and `stop`. The [`selector`] picks exactly one per run.

pub mod demo;
#[cfg(feature = "live-capture")]
pub mod live;
pub mod raw;
pub mod selector;

use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::CaptureError;
use crate::packet::PacketSink;

pub use demo::{DemoGenerator, DemoSource};
pub use raw::RawSocketSource;
pub use selector::{CaptureSelector, HostProbe, Selection, SystemProbe};

/// Acquisition strategy in use for this run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CaptureMode {
    /// Structured capture through the platform capture library
    LiveCapture,
    /// Raw IP socket, bytes parsed by hand
    RawSocket,
    /// Simulated traffic
    Demo,
}

impl CaptureMode {
    /// Status line shown before capture starts
    pub fn ready_message(&self) -> &'static str {
        match self {
            CaptureMode::LiveCapture => "Ready - packet capture library detected",
            CaptureMode::RawSocket => "Ready - Raw Socket mode (run as Administrator for best results)",
            CaptureMode::Demo => "Ready - Demo mode (install libpcap/Npcap for real capture)",
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CaptureMode::LiveCapture => "LiveCapture",
            CaptureMode::RawSocket => "RawSocket",
            CaptureMode::Demo => "Demo",
        })
    }
}

/// One selectable capture entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceInfo {
    /// Identifier handed to the capture library
    pub name: String,
    /// Human-readable label
    pub label: String,
}

impl InterfaceInfo {
    pub fn raw_socket() -> Self {
        Self {
            name: "raw_socket".to_owned(),
            label: "[Raw Socket] All IP Traffic".to_owned(),
        }
    }

    pub fn demo() -> Self {
        Self {
            name: "demo".to_owned(),
            label: "[Demo] Simulated Network Traffic".to_owned(),
        }
    }
}

/// A packet acquisition strategy.
pub trait CaptureSource: Send {
    fn mode(&self) -> CaptureMode;

    /// Begin producing records into `sink`.
    ///
    /// Failures here are user-facing: they carry an actionable message and leave
    /// the source stopped.
    fn start(&mut self, sink: PacketSink) -> Result<(), CaptureError>;

    /// Stop producing records and release handles. Idempotent and best-effort:
    /// safe before `start`, safe twice, never fails.
    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// Status line while capturing
    fn describe(&self) -> String;
}

/// Join a worker thread, giving up after `timeout`.
///
/// Returns true when the thread finished in time. A thread that overruns is
/// detached; it holds no state other than what it was given.
pub(crate) fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            tracing::warn!(
                thread = handle.thread().name().unwrap_or("capture"),
                "Capture thread did not stop within {:?}, detaching",
                timeout
            );
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }

    if handle.join().is_err() {
        tracing::warn!("Capture thread panicked");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_with_timeout() {
        let quick = thread::spawn(|| {});
        assert!(join_with_timeout(quick, Duration::from_secs(1)));

        let slow = thread::spawn(|| thread::sleep(Duration::from_millis(500)));
        let started = Instant::now();
        assert!(!join_with_timeout(slow, Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn test_synthetic_entries() {
        assert_eq!(InterfaceInfo::raw_socket().label, "[Raw Socket] All IP Traffic");
        assert_eq!(InterfaceInfo::demo().name, "demo");
        assert_eq!(CaptureMode::RawSocket.to_string(), "RawSocket");
    }
}
