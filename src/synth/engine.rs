//! Tone engine: spawns tones from packet records and mixes them per tick
//!
//! Single-owner state. Only the synthesis tick touches the tone list and writes
//! to the output ring; everyone else gets [`ToneSnapshot`] copies.

use crate::audio::buffer::{SampleRing, ScopeTap};
use crate::config::SynthConfig;
use crate::packet::PacketRecord;
use crate::synth::tone::{ActiveTone, ToneSnapshot};

/// Result of writing one tick of audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixOutcome {
    /// The whole block was accepted by the ring buffer
    Written(usize),
    /// The ring buffer could not take the whole block; nothing was written
    Dropped(usize),
}

pub struct ToneEngine {
    tones: Vec<ActiveTone>,
    sample_rate: u32,
    sample_period: f32,
    samples_per_tick: usize,
    decay: f32,
    inaudible_floor: f32,
    ceiling: f32,
    /// Mix buffer, reused every tick
    block: Vec<f32>,
    tones_spawned: u64,
}

impl ToneEngine {
    pub fn new(config: &SynthConfig, sample_rate: u32) -> Self {
        let samples_per_tick = config.samples_per_tick(sample_rate);
        Self {
            tones: Vec::new(),
            sample_rate,
            sample_period: 1.0 / sample_rate as f32,
            samples_per_tick,
            decay: config.decay_per_sample,
            inaudible_floor: config.inaudible_floor,
            ceiling: config.limiter_ceiling,
            block: vec![0.0; samples_per_tick],
            tones_spawned: 0,
        }
    }

    /// Start one tone for `record`
    pub fn spawn(&mut self, record: &PacketRecord) {
        self.tones.push(ActiveTone::spawn(record, self.sample_rate));
        self.tones_spawned += 1;
    }

    /// Mix one tick of audio into the internal block and return it.
    ///
    /// Every sample sums all live tones, then advances each of them; a tone is
    /// removed the moment it crosses its lifetime or the inaudibility floor.
    pub fn mix_block(&mut self) -> &[f32] {
        let (period, decay, floor, ceiling) =
            (self.sample_period, self.decay, self.inaudible_floor, self.ceiling);

        for out in self.block.iter_mut() {
            let mixed: f32 = self.tones.iter().map(ActiveTone::value).sum();
            *out = mixed.clamp(-ceiling, ceiling);

            self.tones.retain_mut(|tone| {
                tone.advance(period, decay);
                !tone.is_expired(floor)
            });
        }

        &self.block
    }

    /// Advance every tone by one tick without producing output
    pub fn advance_silent(&mut self) {
        let (period, decay, floor) = (self.sample_period, self.decay, self.inaudible_floor);

        for _ in 0..self.samples_per_tick {
            if self.tones.is_empty() {
                break;
            }
            self.tones.retain_mut(|tone| {
                tone.advance(period, decay);
                !tone.is_expired(floor)
            });
        }
    }

    /// Mix one tick and hand it to the output ring, all-or-nothing.
    ///
    /// The scope tap sees the block only when the ring accepted it, so the
    /// oscilloscope shows what is actually played.
    pub fn render_into(&mut self, ring: &SampleRing, scope: Option<&ScopeTap>) -> MixOutcome {
        self.mix_block();

        if ring.try_push_block(&self.block) {
            if let Some(scope) = scope {
                scope.extend(&self.block);
            }
            MixOutcome::Written(self.block.len())
        } else {
            tracing::trace!(
                samples = self.block.len(),
                free = ring.free(),
                "Output ring full, dropping tick"
            );
            MixOutcome::Dropped(self.block.len())
        }
    }

    pub fn clear(&mut self) {
        self.tones.clear();
    }

    pub fn active_tones(&self) -> usize {
        self.tones.len()
    }

    pub fn tones_spawned(&self) -> u64 {
        self.tones_spawned
    }

    pub fn samples_per_tick(&self) -> usize {
        self.samples_per_tick
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn snapshot(&self) -> Vec<ToneSnapshot> {
        self.tones.iter().map(ActiveTone::snapshot).collect()
    }
}
