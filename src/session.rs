//! Sonification session
//!
//! [`Sonifier`] wires the selected capture source into the tone engine. It owns
//! the session flags, the fan-out queue and everything the synthesis tick touches.
//! The presentation side only ever sees drained copies.

use std::sync::Arc;

use serde::Serialize;

use crate::audio::buffer::{create_shared_ring, ScopeTap, SharedSampleRing, SharedScopeTap};
use crate::audio::output::OutputDevice;
use crate::capture::{CaptureMode, CaptureSelector, CaptureSource, InterfaceInfo, Selection};
use crate::config::AppConfig;
use crate::error::Result;
use crate::packet::{packet_bus, PacketRecord, PacketSink, PacketStream};
use crate::synth::{MixOutcome, ToneEngine, ToneSnapshot};

/// What one synthesis tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Records taken off the audio queue
    pub drained: usize,
    /// Tones started from those records
    pub spawned: usize,
    /// Samples handed to the ring, if this tick produced output
    pub written: Option<usize>,
    /// True when the ring rejected the tick's block
    pub dropped: bool,
    pub active_tones: usize,
}

pub struct Sonifier {
    config: AppConfig,
    selector: CaptureSelector,
    selection: Selection,
    source: Option<Box<dyn CaptureSource>>,
    sink: PacketSink,
    audio_stream: PacketStream,
    visual_stream: PacketStream,
    engine: ToneEngine,
    ring: SharedSampleRing,
    scope: SharedScopeTap,
    output: Option<Box<dyn OutputDevice>>,
    is_capturing: bool,
    is_muted: bool,
    has_captured: bool,
}

impl Sonifier {
    /// Create a session for an already detected capture selection
    pub fn new(config: AppConfig, selection: Selection) -> Self {
        let (sink, audio_stream, visual_stream) = packet_bus();
        let engine = ToneEngine::new(&config.synth, config.audio.sample_rate);
        let ring = create_shared_ring(config.audio.ring_capacity_samples());
        let scope = Arc::new(ScopeTap::new(config.audio.scope_capacity));

        Self {
            selector: CaptureSelector::new(config.capture.clone()),
            config,
            selection,
            source: None,
            sink,
            audio_stream,
            visual_stream,
            engine,
            ring,
            scope,
            output: None,
            is_capturing: false,
            is_muted: true,
            has_captured: false,
        }
    }

    /// Probe the host and create a session for the best available capture mode
    pub fn detect(config: AppConfig) -> Self {
        let selection = CaptureSelector::new(config.capture.clone()).detect_system();
        Self::new(config, selection)
    }

    /// Attach the device that drains the output ring. It runs only while
    /// capturing and unmuted.
    pub fn attach_output(&mut self, output: Box<dyn OutputDevice>) {
        if let Some(mut previous) = self.output.replace(output) {
            previous.stop();
        }
        self.sync_output();
    }

    /// Start capturing with the source bound to the current selection
    pub fn start(&mut self) -> Result<()> {
        if self.is_capturing {
            return Ok(());
        }
        let source = self.selector.create_source(&self.selection);
        self.start_with_source(source)
    }

    /// Start capturing with an explicit source.
    ///
    /// On failure the session stays stopped and the error is returned for the user.
    pub fn start_with_source(&mut self, mut source: Box<dyn CaptureSource>) -> Result<()> {
        if self.is_capturing {
            return Ok(());
        }

        self.is_capturing = true;
        if let Err(e) = source.start(self.sink.clone()) {
            self.is_capturing = false;
            tracing::warn!(mode = %source.mode(), error = %e, "Capture failed to start");
            return Err(e.into());
        }

        tracing::info!("{}", source.describe());
        self.source = Some(source);
        self.has_captured = true;
        self.sync_output();
        Ok(())
    }

    /// Stop capturing. Safe to call at any time, any number of times.
    pub fn stop(&mut self) {
        self.is_capturing = false;

        if let Some(mut source) = self.source.take() {
            source.stop();
        }

        self.engine.clear();
        self.audio_stream.clear();
        self.visual_stream.clear();
        self.sync_output();
        self.ring.clear();
    }

    pub fn set_muted(&mut self, muted: bool) {
        if self.is_muted == muted {
            return;
        }
        self.is_muted = muted;
        tracing::info!(muted, "Audio mute changed");

        self.sync_output();
        if muted {
            self.ring.clear();
        }
    }

    /// Flip mute, returning the new state
    pub fn toggle_mute(&mut self) -> bool {
        self.set_muted(!self.is_muted);
        self.is_muted
    }

    /// Run one synthesis tick: drain queued records, spawn their tones and mix a
    /// block into the output ring.
    ///
    /// While muted or stopped nothing is spawned or written, but existing tones
    /// keep decaying.
    pub fn synth_tick(&mut self) -> TickReport {
        let records = self.audio_stream.drain();
        let drained = records.len();
        let audible = self.is_audible();

        let (spawned, outcome) = if audible {
            for record in &records {
                self.engine.spawn(record);
            }
            let outcome = self.engine.render_into(&self.ring, Some(&self.scope));
            (drained, Some(outcome))
        } else {
            self.engine.advance_silent();
            (0, None)
        };

        TickReport {
            drained,
            spawned,
            written: match outcome {
                Some(MixOutcome::Written(n)) => Some(n),
                _ => None,
            },
            dropped: matches!(outcome, Some(MixOutcome::Dropped(_))),
            active_tones: self.engine.active_tones(),
        }
    }

    /// Records observed since the last call, for presentation
    pub fn visual_feed(&self) -> Vec<PacketRecord> {
        self.visual_stream.drain()
    }

    /// Most recent mixed samples, for the oscilloscope
    pub fn scope_feed(&self) -> Vec<f32> {
        self.scope.drain()
    }

    pub fn tone_snapshot(&self) -> Vec<ToneSnapshot> {
        self.engine.snapshot()
    }

    pub fn status_line(&self) -> String {
        match (&self.source, self.is_capturing) {
            (Some(source), true) if source.is_running() => source.describe(),
            (Some(source), true) => format!("Capture interrupted - {} mode", source.mode()),
            _ if self.has_captured => format!("Stopped - {} mode available", self.mode()),
            _ => self.selection.mode.ready_message().to_owned(),
        }
    }

    /// Select a listed interface by index. Takes effect on the next start.
    pub fn select_interface(&mut self, index: usize) -> bool {
        self.selection.select_index(index)
    }

    /// Select a listed interface by name or label fragment
    pub fn select_interface_matching(&mut self, query: &str) -> bool {
        self.selection.select_matching(query)
    }

    pub fn mode(&self) -> CaptureMode {
        self.selection.mode
    }

    pub fn interfaces(&self) -> &[InterfaceInfo] {
        &self.selection.interfaces
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn is_capturing(&self) -> bool {
        self.is_capturing
    }

    /// True while capturing and the source is still producing
    pub fn is_source_alive(&self) -> bool {
        self.is_capturing && self.source.as_ref().is_some_and(|source| source.is_running())
    }

    pub fn is_muted(&self) -> bool {
        self.is_muted
    }

    pub fn tones_spawned(&self) -> u64 {
        self.engine.tones_spawned()
    }

    pub fn active_tones(&self) -> usize {
        self.engine.active_tones()
    }

    pub fn ring(&self) -> SharedSampleRing {
        Arc::clone(&self.ring)
    }

    pub fn scope(&self) -> SharedScopeTap {
        Arc::clone(&self.scope)
    }

    /// Producer handle onto the session queue
    pub fn sink(&self) -> PacketSink {
        self.sink.clone()
    }

    /// Handle for draining the presentation feed from another task
    pub fn visual_stream(&self) -> PacketStream {
        self.visual_stream.clone()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn is_audible(&self) -> bool {
        self.is_capturing && !self.is_muted
    }

    /// Run the output device exactly while audible
    fn sync_output(&mut self) {
        let audible = self.is_audible();
        let Some(output) = self.output.as_mut() else {
            return;
        };

        if audible && !output.is_running() {
            if let Err(e) = output.start() {
                tracing::warn!(error = %e, "Audio output failed to start, continuing silently");
            }
        } else if !audible && output.is_running() {
            output.stop();
        }
    }
}

impl Drop for Sonifier {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AudioError, CaptureError, Error};
    use crate::packet::Protocol;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Source that publishes nothing on its own
    struct QuietSource {
        running: bool,
        fail_with: Option<fn() -> CaptureError>,
    }

    impl CaptureSource for QuietSource {
        fn mode(&self) -> CaptureMode {
            CaptureMode::Demo
        }

        fn start(&mut self, _sink: PacketSink) -> std::result::Result<(), CaptureError> {
            if let Some(fail) = self.fail_with {
                return Err(fail());
            }
            self.running = true;
            Ok(())
        }

        fn stop(&mut self) {
            self.running = false;
        }

        fn is_running(&self) -> bool {
            self.running
        }

        fn describe(&self) -> String {
            "quiet".to_owned()
        }
    }

    fn quiet() -> Box<dyn CaptureSource> {
        Box::new(QuietSource {
            running: false,
            fail_with: None,
        })
    }

    #[derive(Clone, Default)]
    struct FakeOutput {
        running: Arc<AtomicBool>,
        starts: Arc<AtomicUsize>,
    }

    impl OutputDevice for FakeOutput {
        fn start(&mut self) -> std::result::Result<(), AudioError> {
            self.running.store(true, Ordering::SeqCst);
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&mut self) {
            self.running.store(false, Ordering::SeqCst);
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
    }

    fn session() -> Sonifier {
        Sonifier::new(AppConfig::default(), Selection::demo())
    }

    fn tcp(size: u32) -> PacketRecord {
        PacketRecord {
            protocol: Protocol::Tcp,
            ..PacketRecord::fallback(size, Utc::now())
        }
    }

    #[test]
    fn test_starts_muted_and_stopped() {
        let sonifier = session();
        assert!(sonifier.is_muted());
        assert!(!sonifier.is_capturing());
        assert_eq!(sonifier.status_line(), CaptureMode::Demo.ready_message());
    }

    #[test]
    fn test_muted_tick_spawns_nothing() {
        let mut sonifier = session();
        sonifier.start_with_source(quiet()).unwrap();
        sonifier.sink().publish(tcp(512));

        let report = sonifier.synth_tick();
        assert_eq!(report.drained, 1);
        assert_eq!(report.spawned, 0);
        assert_eq!(report.written, None);
        assert!(sonifier.ring().is_empty());
        // the presentation feed still sees the record
        assert_eq!(sonifier.visual_feed().len(), 1);
    }

    #[test]
    fn test_unmuted_tick_spawns_and_writes() {
        let mut sonifier = session();
        sonifier.start_with_source(quiet()).unwrap();
        sonifier.set_muted(false);
        sonifier.sink().publish(tcp(512));
        sonifier.sink().publish(tcp(1500));

        let report = sonifier.synth_tick();
        assert_eq!(report.spawned, 2);
        assert_eq!(report.written, Some(882));
        assert_eq!(sonifier.ring().len(), 882);
        assert_eq!(sonifier.scope_feed().len(), 882);
    }

    #[test]
    fn test_decay_continues_while_muted() {
        let mut sonifier = session();
        sonifier.start_with_source(quiet()).unwrap();
        sonifier.set_muted(false);
        sonifier.sink().publish(tcp(1500));
        sonifier.synth_tick();
        let before = sonifier.tone_snapshot()[0];

        sonifier.set_muted(true);
        sonifier.synth_tick();
        let after = sonifier.tone_snapshot()[0];
        assert!(after.amplitude < before.amplitude);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut sonifier = session();
        sonifier.stop();

        sonifier.start_with_source(quiet()).unwrap();
        sonifier.set_muted(false);
        sonifier.sink().publish(tcp(1500));
        sonifier.synth_tick();
        assert_eq!(sonifier.active_tones(), 1);

        sonifier.stop();
        sonifier.stop();
        assert!(!sonifier.is_capturing());
        assert_eq!(sonifier.active_tones(), 0);
        assert!(sonifier.ring().is_empty());
        assert_eq!(sonifier.status_line(), "Stopped - Demo mode available");
    }

    #[test]
    fn test_status_reports_dead_source() {
        let mut sonifier = session();
        sonifier.start_with_source(quiet()).unwrap();
        assert!(sonifier.is_source_alive());
        assert_eq!(sonifier.status_line(), "quiet");

        // the source's worker died on its own; the session is still capturing
        if let Some(source) = sonifier.source.as_mut() {
            source.stop();
        }
        assert!(sonifier.is_capturing());
        assert!(!sonifier.is_source_alive());
        assert_eq!(sonifier.status_line(), "Capture interrupted - Demo mode");
    }

    #[test]
    fn test_failed_start_reverts() {
        let mut sonifier = session();
        let failing = Box::new(QuietSource {
            running: false,
            fail_with: Some(|| CaptureError::PermissionDenied("Raw socket capture".to_owned())),
        });

        let err = sonifier.start_with_source(failing).unwrap_err();
        assert!(matches!(err, Error::Capture(ref e) if e.is_permission_denied()));
        assert!(!sonifier.is_capturing());
    }

    #[test]
    fn test_output_follows_mute_and_capture() {
        let mut sonifier = session();
        let output = FakeOutput::default();
        sonifier.attach_output(Box::new(output.clone()));
        assert!(!output.is_running());

        sonifier.start_with_source(quiet()).unwrap();
        assert!(!output.is_running());

        assert!(!sonifier.toggle_mute());
        assert!(output.is_running());

        sonifier.set_muted(true);
        assert!(!output.is_running());

        sonifier.set_muted(false);
        sonifier.stop();
        assert!(!output.is_running());
        assert_eq!(output.starts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_start_binds_demo_source() {
        let mut config = AppConfig::default();
        config.capture.demo_min_interval_ms = 1;
        config.capture.demo_max_interval_ms = 2;
        let mut sonifier = Sonifier::new(config, Selection::demo());

        sonifier.start().unwrap();
        assert!(sonifier.is_capturing());
        assert_eq!(sonifier.status_line(), "Demo Mode: Simulated network traffic");
        sonifier.stop();
    }
}
