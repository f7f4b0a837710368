//! Audio output device draining the sample ring
//!
//! The cpal stream lives on its own thread (streams are not `Send` on every host)
//! and pulls mono samples from the shared ring, copying each one to every output
//! channel. Missing samples play as silence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig, SupportedStreamConfigRange};
use crossbeam_channel::bounded;

use crate::audio::buffer::SharedSampleRing;
use crate::audio::device::get_output_device;
use crate::error::AudioError;

/// Anything that can be started and stopped to drain the output ring.
pub trait OutputDevice: Send {
    /// Begin draining. Calling it while already running is a no-op.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Stop draining. Idempotent, never fails.
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// cpal-backed output stream
pub struct CpalOutput {
    device_name: Option<String>,
    sample_rate: u32,
    ring: SharedSampleRing,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CpalOutput {
    pub fn new(device_name: Option<String>, sample_rate: u32, ring: SharedSampleRing) -> Self {
        Self {
            device_name,
            sample_rate,
            ring,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    fn stream_config(device: &cpal::Device, sample_rate: u32) -> Result<StreamConfig, AudioError> {
        let preferred_channels = device
            .default_output_config()
            .map(|config| config.channels())
            .unwrap_or(2);
        let ranges = device
            .supported_output_configs()
            .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?;

        pick_stream_config(ranges, sample_rate, preferred_channels)
    }
}

/// Choose an f32 configuration that runs at exactly `sample_rate`.
///
/// The ring holds samples at that rate, so any other rate would shift the pitch.
/// Ranges with the device's default channel count win, then the fewest channels.
fn pick_stream_config(
    ranges: impl IntoIterator<Item = SupportedStreamConfigRange>,
    sample_rate: u32,
    preferred_channels: u16,
) -> Result<StreamConfig, AudioError> {
    let rate = SampleRate(sample_rate);
    let mut offered = Vec::new();

    let best = ranges
        .into_iter()
        .inspect(|range| {
            offered.push(format!(
                "{:?} {}ch {}-{} Hz",
                range.sample_format(),
                range.channels(),
                range.min_sample_rate().0,
                range.max_sample_rate().0
            ))
        })
        .filter(|range| {
            range.sample_format() == SampleFormat::F32
                && range.channels() > 0
                && range.min_sample_rate() <= rate
                && rate <= range.max_sample_rate()
        })
        .min_by_key(|range| (range.channels() != preferred_channels, range.channels()));

    match best {
        Some(range) => Ok(range.with_sample_rate(rate).config()),
        None => Err(AudioError::UnsupportedFormat(format!(
            "no f32 output at {} Hz (device offers: {}); set audio.sample_rate to a supported rate",
            sample_rate,
            if offered.is_empty() { "nothing".to_owned() } else { offered.join(", ") }
        ))),
    }
}

impl OutputDevice for CpalOutput {
    fn start(&mut self) -> Result<(), AudioError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let device = get_output_device(self.device_name.as_deref())?;
        let config = Self::stream_config(&device, self.sample_rate)?;
        let channels = usize::from(config.channels.max(1));

        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        let running = Arc::clone(&self.running);
        let ring = Arc::clone(&self.ring);
        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("audio-output".to_owned())
            .spawn(move || {
                let mut mono = Vec::new();
                let stream = device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let frames = data.len() / channels;
                        mono.resize(frames, 0.0);
                        ring.read_into(&mut mono);
                        for (frame, &sample) in data.chunks_mut(channels).zip(mono.iter()) {
                            frame.fill(sample);
                        }
                    },
                    |err| tracing::warn!("Output stream error: {}", err),
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                        running.store(false, Ordering::SeqCst);
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    running.store(false, Ordering::SeqCst);
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Keep the stream alive while running
                while running.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
                // Stream is dropped here, stopping playback
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(AudioError::StreamError("output thread exited".to_owned())));

        match ready {
            Ok(()) => {
                self.thread_handle = Some(handle);
                tracing::info!(sample_rate = self.sample_rate, channels, "Audio output started");
                Ok(())
            }
            Err(e) => {
                let _ = handle.join();
                Err(e)
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            tracing::debug!("Audio output stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::SupportedBufferSize;

    fn range(format: SampleFormat, channels: u16, min: u32, max: u32) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn test_picks_f32_range_containing_rate() {
        let ranges = vec![
            range(SampleFormat::I16, 2, 8000, 96000),
            range(SampleFormat::F32, 2, 48000, 48000),
            range(SampleFormat::F32, 2, 8000, 96000),
        ];
        let config = pick_stream_config(ranges, 44100, 2).unwrap();
        assert_eq!(config.sample_rate, SampleRate(44100));
        assert_eq!(config.channels, 2);
    }

    #[test]
    fn test_prefers_default_channel_count() {
        let ranges = vec![
            range(SampleFormat::F32, 1, 8000, 96000),
            range(SampleFormat::F32, 6, 8000, 96000),
            range(SampleFormat::F32, 2, 8000, 96000),
        ];
        assert_eq!(pick_stream_config(ranges.clone(), 44100, 2).unwrap().channels, 2);
        assert_eq!(pick_stream_config(ranges, 44100, 8).unwrap().channels, 1);
    }

    #[test]
    fn test_rate_only_device_is_unsupported() {
        let ranges = vec![range(SampleFormat::F32, 2, 48000, 48000)];
        let err = pick_stream_config(ranges, 44100, 2).unwrap_err();
        assert!(matches!(err, AudioError::UnsupportedFormat(ref msg) if msg.contains("48000")));
    }

    #[test]
    fn test_integer_only_device_is_unsupported() {
        let ranges = vec![range(SampleFormat::I16, 2, 8000, 96000)];
        assert!(matches!(
            pick_stream_config(ranges, 44100, 2),
            Err(AudioError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            pick_stream_config(Vec::new(), 44100, 2),
            Err(AudioError::UnsupportedFormat(ref msg)) if msg.contains("nothing")
        ));
    }
}
