//! # Packet Sonifier
//!
//! Turns live network traffic into sound: packets are captured, classified by
//! protocol and rendered as short decaying tones mixed into a continuous PCM stream.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                          CAPTURE DOMAIN                                      │
//! │   ┌───────────────┐    ┌───────────────┐    ┌───────────────┐               │
//! │   │  LiveCapture  │ or │   RawSocket   │ or │     Demo      │  (selector)   │
//! │   │ libpcap/Npcap │    │ capture thread│    │ jittered timer│               │
//! │   └───────┬───────┘    └───────┬───────┘    └───────┬───────┘               │
//! │           └──────────── classifier ─────────────────┘                        │
//! │                                │ PacketRecord                                │
//! │                                ▼                                             │
//! │                  ┌───────────────────────────┐                               │
//! │                  │  PacketSink (fan-out)     │                               │
//! │                  └─────┬───────────────┬─────┘                               │
//! └────────────────────────┼───────────────┼─────────────────────────────────────┘
//!                          │               │
//!            audio stream  ▼               ▼  visual stream
//! ┌───────────────────────────────┐   ┌───────────────────────────────┐
//! │  SYNTHESIS TICK (20 ms)       │   │  PRESENTATION TICK (16 ms)    │
//! │  ToneEngine: spawn + mix      │   │  stats / particles (external) │
//! │        │                      │   └───────────────────────────────┘
//! │        ▼                      │
//! │  SampleRing ──▶ output device │──▶ ScopeTap (oscilloscope feed)
//! └───────────────────────────────┘
//! ```

pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod packet;
pub mod session;
pub mod synth;

pub use error::{Error, Result};
pub use session::Sonifier;

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Output sample rate (mono)
    pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

    /// Synthesis tick period in milliseconds
    pub const DEFAULT_TICK_MS: u32 = 20;

    /// Presentation tick period in milliseconds
    pub const PRESENTATION_TICK_MS: u64 = 16;

    /// Per-sample amplitude decay factor
    pub const DEFAULT_DECAY_PER_SAMPLE: f32 = 0.999;

    /// Amplitude below which a tone is considered silent and removed
    pub const DEFAULT_INAUDIBLE_FLOOR: f32 = 0.001;

    /// Hard limiter ceiling for mixed samples
    pub const DEFAULT_LIMITER_CEILING: f32 = 0.8;

    /// Output ring buffer capacity in milliseconds of audio
    pub const DEFAULT_RING_CAPACITY_MS: u32 = 250;

    /// Oscilloscope tap capacity in samples
    pub const DEFAULT_SCOPE_CAPACITY: usize = 2048;

    /// Packet size mapped to the top of the frequency / amplitude range
    pub const FULL_SCALE_PACKET_SIZE: f32 = 1500.0;

    /// Minimum IPv4 header length
    pub const MIN_IPV4_HEADER_LEN: usize = 20;

    /// Receive buffer for raw IP capture
    pub const RAW_RECV_BUFFER_SIZE: usize = 65536;

    /// Snapshot length for live capture
    pub const LIVE_SNAPLEN: i32 = 65535;

    /// Upper bound for tearing down a capture source
    pub const STOP_TIMEOUT: Duration = Duration::from_secs(1);

    /// Well-known external address used to discover the outward-facing local address
    pub const LOCAL_ADDR_PROBE_TARGET: &str = "8.8.8.8:65530";
}
