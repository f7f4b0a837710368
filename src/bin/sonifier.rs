//! Packet Sonifier
//!
//! Captures network traffic (or simulates it) and plays every packet as a short
//! tone. Per-protocol statistics are printed once per second.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use packet_sonifier::{
    audio::{list_output_devices, CpalOutput},
    capture::CaptureMode,
    config::AppConfig,
    constants::PRESENTATION_TICK_MS,
    packet::ProtocolStats,
    Error, Sonifier,
};

#[derive(Parser, Debug)]
#[command(name = "sonifier", version, about = "Listen to your network traffic")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interface to capture on, by index or name
    #[arg(short, long)]
    interface: Option<String>,

    /// Start with audio enabled
    #[arg(long)]
    unmute: bool,

    /// Stop after this many seconds
    #[arg(short, long)]
    duration: Option<u64>,

    /// Skip capture probing and simulate traffic
    #[arg(long)]
    demo: bool,

    /// Print statistics as JSON lines
    #[arg(long)]
    json: bool,

    /// List capture interfaces and exit
    #[arg(long)]
    list_interfaces: bool,

    /// List audio output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    write_config: bool,
}

#[derive(Serialize)]
struct StatsLine<'a> {
    mode: CaptureMode,
    stats: &'a ProtocolStats,
    total_packets: u64,
    total_bytes: u64,
    active_tones: usize,
    ring_fill: f32,
    ring_overflows: usize,
    ring_underruns: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    if args.demo {
        config.capture.force_demo = true;
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log.level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if args.write_config {
        let path = match args.config.clone() {
            Some(path) => path,
            None => AppConfig::default_path()?,
        };
        config.save(&path)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    if args.list_devices {
        println!("\n=== Audio Output Devices ===");
        for device in list_output_devices() {
            let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
            println!("  {}{}", device.name, default_marker);
            println!("    Sample rates: {:?}", device.sample_rates);
            println!("    Channels: {:?}", device.channels);
        }
        return Ok(());
    }

    tracing::info!("Starting Packet Sonifier");

    let mut sonifier = Sonifier::detect(config.clone());

    println!("\n=== Capture Interfaces ({}) ===", sonifier.mode());
    for (index, interface) in sonifier.interfaces().iter().enumerate() {
        println!("  {}: {}", index, interface.label);
    }
    println!();

    if args.list_interfaces {
        return Ok(());
    }

    if let Some(choice) = args.interface.as_deref() {
        let selected = match choice.parse::<usize>() {
            Ok(index) => sonifier.select_interface(index),
            Err(_) => sonifier.select_interface_matching(choice),
        };
        if !selected {
            anyhow::bail!("No capture interface matches '{}'", choice);
        }
    }

    tracing::info!("{}", sonifier.status_line());

    sonifier.attach_output(Box::new(CpalOutput::new(
        config.audio.device.clone(),
        config.audio.sample_rate,
        sonifier.ring(),
    )));

    if let Err(e) = sonifier.start() {
        if let Error::Capture(capture) = &e {
            if capture.is_permission_denied() {
                anyhow::bail!("{} Alternatively, run with --demo.", capture);
            }
        }
        return Err(e).context("Failed to start capture");
    }
    sonifier.set_muted(!args.unmute);

    let mode = sonifier.mode();
    let visual = sonifier.visual_stream();
    let ring = sonifier.ring();
    let scope = sonifier.scope();
    let sonifier = Arc::new(Mutex::new(sonifier));

    // Synthesis domain
    let synth_handle = {
        let sonifier = Arc::clone(&sonifier);
        let mut tick = interval(config.synth.tick_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::spawn(async move {
            loop {
                tick.tick().await;
                let report = sonifier.lock().synth_tick();
                if report.dropped {
                    tracing::trace!("Synthesis tick dropped, output ring full");
                }
            }
        })
    };

    // Presentation domain
    let mut frame = interval(Duration::from_millis(PRESENTATION_TICK_MS));
    frame.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut report = interval(Duration::from_secs(1));
    report.tick().await;

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut stats = ProtocolStats::new();
    let mut source_lost = false;

    tracing::info!("Press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = frame.tick() => {
                stats.extend(&visual.drain());
                // The oscilloscope has no renderer here; keep the tap from going stale
                scope.drain();
            }
            _ = report.tick() => {
                let (active_tones, alive, status) = {
                    let sonifier = sonifier.lock();
                    (sonifier.active_tones(), sonifier.is_source_alive(), sonifier.status_line())
                };
                if !alive && !source_lost {
                    tracing::warn!("{}", status);
                    source_lost = true;
                }
                if args.json {
                    let line = StatsLine {
                        mode,
                        stats: &stats,
                        total_packets: stats.total_packets(),
                        total_bytes: stats.total_bytes(),
                        active_tones,
                        ring_fill: ring.fill_level(),
                        ring_overflows: ring.overflow_count(),
                        ring_underruns: ring.underrun_count(),
                    };
                    println!("{}", serde_json::to_string(&line)?);
                } else if stats.total_packets() > 0 {
                    println!(
                        "[{}] {} ({:.1} KB, {} tones)",
                        mode,
                        stats,
                        stats.total_bytes() as f64 / 1024.0,
                        active_tones
                    );
                }
                stats.reset();
            }
            _ = &mut deadline => {
                tracing::info!("Duration elapsed");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    synth_handle.abort();
    let mut sonifier = sonifier.lock();
    sonifier.stop();
    tracing::info!("{}", sonifier.status_line());

    Ok(())
}
