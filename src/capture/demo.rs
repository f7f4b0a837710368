//! Demo capture: fabricated traffic on a jittered timer

use std::net::Ipv4Addr;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::capture::{join_with_timeout, CaptureMode, CaptureSource};
use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::packet::{PacketRecord, PacketSink, Protocol};

const DEMO_PROTOCOLS: [Protocol; 5] = [
    Protocol::Tcp,
    Protocol::Udp,
    Protocol::Http,
    Protocol::Https,
    Protocol::Dns,
];

const DEMO_SIZES: [u32; 6] = [64, 128, 256, 512, 1024, 1500];

/// Deterministic (given a seed) source of plausible packet records
pub struct DemoGenerator {
    rng: StdRng,
    min_interval_ms: u64,
    max_interval_ms: u64,
}

impl DemoGenerator {
    pub fn new(seed: Option<u64>, min_interval_ms: u64, max_interval_ms: u64) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            min_interval_ms,
            max_interval_ms: max_interval_ms.max(min_interval_ms),
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(
            config.demo_seed,
            config.demo_min_interval_ms,
            config.demo_max_interval_ms,
        )
    }

    /// Fabricate one record
    pub fn next_record(&mut self) -> PacketRecord {
        let protocol = DEMO_PROTOCOLS[self.rng.gen_range(0..DEMO_PROTOCOLS.len())];
        let size_bytes = DEMO_SIZES[self.rng.gen_range(0..DEMO_SIZES.len())];

        PacketRecord {
            size_bytes,
            timestamp: Utc::now(),
            protocol,
            source_addr: Some(Ipv4Addr::new(192, 168, 1, self.rng.gen_range(1..255))),
            dest_addr: Some(Ipv4Addr::new(10, 0, 0, self.rng.gen_range(1..255))),
            port: Some(self.rng.gen_range(80..65535)),
        }
    }

    /// Delay before the next record, uniformly jittered
    pub fn next_interval(&mut self) -> Duration {
        let ms = if self.min_interval_ms == self.max_interval_ms {
            self.min_interval_ms
        } else {
            self.rng.gen_range(self.min_interval_ms..self.max_interval_ms)
        };
        Duration::from_millis(ms)
    }
}

/// Timer-driven demo source
pub struct DemoSource {
    config: CaptureConfig,
    stop_tx: Option<Sender<()>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl DemoSource {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            stop_tx: None,
            thread_handle: None,
        }
    }
}

impl CaptureSource for DemoSource {
    fn mode(&self) -> CaptureMode {
        CaptureMode::Demo
    }

    fn start(&mut self, sink: PacketSink) -> Result<(), CaptureError> {
        if self.is_running() {
            return Ok(());
        }

        let mut generator = DemoGenerator::from_config(&self.config);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("capture-demo".to_owned())
            .spawn(move || loop {
                match stop_rx.recv_timeout(generator.next_interval()) {
                    Err(RecvTimeoutError::Timeout) => sink.publish(generator.next_record()),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(CaptureError::Thread)?;

        self.stop_tx = Some(stop_tx);
        self.thread_handle = Some(handle);
        tracing::info!("Demo capture started");
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the sender wakes the timer immediately
        self.stop_tx.take();

        if let Some(handle) = self.thread_handle.take() {
            join_with_timeout(handle, self.config.stop_timeout());
            tracing::info!("Demo capture stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn describe(&self) -> String {
        "Demo Mode: Simulated network traffic".to_owned()
    }
}

impl Drop for DemoSource {
    fn drop(&mut self) {
        self.stop();
    }
}
