//! Per-packet oscillator state and the packet-to-tone mapping

use std::f32::consts::TAU;

use serde::Serialize;

use crate::constants::FULL_SCALE_PACKET_SIZE;
use crate::packet::{PacketRecord, Protocol};
use crate::synth::waveform::Waveform;

const MIN_FREQUENCY_HZ: f32 = 200.0;
const FREQUENCY_SPAN_HZ: f32 = 1800.0;
const MIN_AMPLITUDE: f32 = 0.1;
const AMPLITUDE_SPAN: f32 = 0.2;

/// Spawn parameters derived from one packet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneParams {
    pub frequency_hz: f32,
    pub amplitude: f32,
    pub waveform: Waveform,
    /// Initial lifetime in seconds
    pub lifetime: f32,
}

impl ToneParams {
    pub fn for_record(record: &PacketRecord) -> Self {
        Self {
            frequency_hz: frequency_for_size(record.size_bytes),
            amplitude: amplitude_for_size(record.size_bytes),
            waveform: waveform_for(record.protocol),
            lifetime: lifetime_for(record.protocol),
        }
    }
}

fn normalized_size(size_bytes: u32) -> f32 {
    (size_bytes as f32 / FULL_SCALE_PACKET_SIZE).min(1.0)
}

/// 200 Hz for an empty packet up to 2000 Hz at 1500 bytes and beyond
pub fn frequency_for_size(size_bytes: u32) -> f32 {
    MIN_FREQUENCY_HZ + FREQUENCY_SPAN_HZ * normalized_size(size_bytes)
}

/// 0.1 for an empty packet up to 0.3 at 1500 bytes and beyond
pub fn amplitude_for_size(size_bytes: u32) -> f32 {
    MIN_AMPLITUDE + AMPLITUDE_SPAN * normalized_size(size_bytes)
}

pub fn waveform_for(protocol: Protocol) -> Waveform {
    match protocol {
        Protocol::Tcp | Protocol::Http | Protocol::Https => Waveform::Sine,
        Protocol::Udp => Waveform::Square,
        Protocol::Dns | Protocol::Icmp => Waveform::Triangle,
        Protocol::Ip | Protocol::Unknown => Waveform::Sine,
    }
}

/// Tone lifetime in seconds
pub fn lifetime_for(protocol: Protocol) -> f32 {
    match protocol {
        Protocol::Tcp => 0.2,
        Protocol::Http | Protocol::Https => 0.25,
        Protocol::Udp => 0.1,
        Protocol::Dns | Protocol::Icmp => 0.15,
        Protocol::Ip | Protocol::Unknown => 0.1,
    }
}

/// One sounding oscillator. Owned by the tone engine.
#[derive(Debug, Clone)]
pub struct ActiveTone {
    pub protocol: Protocol,
    pub frequency_hz: f32,
    pub amplitude: f32,
    pub waveform: Waveform,
    /// Radians in [0, 2π)
    pub phase: f32,
    /// Seconds left before the tone expires
    pub remaining_life: f32,
    phase_step: f32,
}

impl ActiveTone {
    pub fn spawn(record: &PacketRecord, sample_rate: u32) -> Self {
        let params = ToneParams::for_record(record);
        Self {
            protocol: record.protocol,
            frequency_hz: params.frequency_hz,
            amplitude: params.amplitude,
            waveform: params.waveform,
            phase: 0.0,
            remaining_life: params.lifetime,
            phase_step: TAU * params.frequency_hz / sample_rate as f32,
        }
    }

    /// Current output value, before mixing
    #[inline]
    pub fn value(&self) -> f32 {
        self.waveform.sample(self.phase) * self.amplitude
    }

    /// Move forward by one sample: phase, lifetime and amplitude decay.
    #[inline]
    pub fn advance(&mut self, sample_period: f32, decay: f32) {
        self.phase = (self.phase + self.phase_step).rem_euclid(TAU);
        self.remaining_life -= sample_period;
        self.amplitude *= decay;
    }

    pub fn is_expired(&self, inaudible_floor: f32) -> bool {
        self.remaining_life <= 0.0 || self.amplitude < inaudible_floor
    }

    pub fn snapshot(&self) -> ToneSnapshot {
        ToneSnapshot {
            protocol: self.protocol,
            frequency_hz: self.frequency_hz,
            amplitude: self.amplitude,
            waveform: self.waveform,
            remaining_life: self.remaining_life,
        }
    }
}

/// Read-only copy of a tone for stats and visualization
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ToneSnapshot {
    pub protocol: Protocol,
    pub frequency_hz: f32,
    pub amplitude: f32,
    pub waveform: Waveform,
    pub remaining_life: f32,
}
