//! Capture strategy selection
//!
//! Probes the host in priority order (structured capture, then raw sockets) and
//! falls back to the demo generator. A failing probe is never an error, it only
//! moves on to the next strategy.

use crate::capture::demo::DemoSource;
use crate::capture::raw::{probe_raw_socket, RawSocketSource};
use crate::capture::{CaptureMode, CaptureSource, InterfaceInfo};
use crate::config::CaptureConfig;
use crate::error::CaptureError;

/// Host capability checks, one per real strategy
pub trait HostProbe {
    /// Interfaces available for structured capture
    fn live_interfaces(&self) -> Result<Vec<InterfaceInfo>, CaptureError>;

    /// Whether a raw IP socket can be created
    fn raw_socket(&self) -> Result<(), CaptureError>;
}

/// Probes the real host
pub struct SystemProbe;

impl HostProbe for SystemProbe {
    #[cfg(feature = "live-capture")]
    fn live_interfaces(&self) -> Result<Vec<InterfaceInfo>, CaptureError> {
        crate::capture::live::list_interfaces()
    }

    #[cfg(not(feature = "live-capture"))]
    fn live_interfaces(&self) -> Result<Vec<InterfaceInfo>, CaptureError> {
        Err(CaptureError::Unavailable(
            "built without the live-capture feature".to_owned(),
        ))
    }

    fn raw_socket(&self) -> Result<(), CaptureError> {
        probe_raw_socket()
    }
}

/// Outcome of detection: the mode for this run and its selectable entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub mode: CaptureMode,
    pub interfaces: Vec<InterfaceInfo>,
    selected: usize,
}

impl Selection {
    pub fn new(mode: CaptureMode, interfaces: Vec<InterfaceInfo>) -> Self {
        Self {
            mode,
            interfaces,
            selected: 0,
        }
    }

    pub fn demo() -> Self {
        Self::new(CaptureMode::Demo, vec![InterfaceInfo::demo()])
    }

    pub fn selected_interface(&self) -> Option<&InterfaceInfo> {
        self.interfaces.get(self.selected)
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    /// Select by position. Returns false and keeps the current choice when out of range.
    pub fn select_index(&mut self, index: usize) -> bool {
        if index < self.interfaces.len() {
            self.selected = index;
            true
        } else {
            false
        }
    }

    /// Select the first entry whose name matches exactly or whose label contains `query`
    pub fn select_matching(&mut self, query: &str) -> bool {
        let found = self
            .interfaces
            .iter()
            .position(|i| i.name == query)
            .or_else(|| self.interfaces.iter().position(|i| i.label.contains(query)));

        match found {
            Some(index) => self.select_index(index),
            None => false,
        }
    }
}

pub struct CaptureSelector {
    config: CaptureConfig,
}

impl CaptureSelector {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// Detect the best available strategy on this host
    pub fn detect_system(&self) -> Selection {
        self.detect(&SystemProbe)
    }

    /// Detect using `probe`. Always returns a usable selection.
    pub fn detect(&self, probe: &impl HostProbe) -> Selection {
        if self.config.force_demo {
            tracing::info!("Demo mode forced by configuration");
            return Selection::demo();
        }

        match probe.live_interfaces() {
            Ok(interfaces) if !interfaces.is_empty() => {
                tracing::info!(count = interfaces.len(), "Live capture available");
                let mut selection = Selection::new(CaptureMode::LiveCapture, interfaces);
                if let Some(preferred) = self.config.interface.as_deref() {
                    if !selection.select_matching(preferred) {
                        tracing::warn!(preferred, "Configured interface not found, using the first one");
                    }
                }
                return selection;
            }
            Ok(_) => tracing::debug!("Live capture library lists no interfaces"),
            Err(e) => tracing::debug!(error = %e, "Live capture unavailable"),
        }

        match probe.raw_socket() {
            Ok(()) => {
                tracing::info!("Raw socket capture available");
                return Selection::new(CaptureMode::RawSocket, vec![InterfaceInfo::raw_socket()]);
            }
            Err(e) => tracing::debug!(error = %e, "Raw socket capture unavailable"),
        }

        tracing::info!("No capture mechanism available, using demo mode");
        Selection::demo()
    }

    /// Bind the capture strategy for a session
    pub fn create_source(&self, selection: &Selection) -> Box<dyn CaptureSource> {
        match selection.mode {
            #[cfg(feature = "live-capture")]
            CaptureMode::LiveCapture => match selection.selected_interface() {
                Some(interface) => Box::new(crate::capture::live::LiveCaptureSource::new(
                    self.config.clone(),
                    interface.clone(),
                )),
                None => Box::new(DemoSource::new(self.config.clone())),
            },
            #[cfg(not(feature = "live-capture"))]
            CaptureMode::LiveCapture => Box::new(DemoSource::new(self.config.clone())),
            CaptureMode::RawSocket => Box::new(RawSocketSource::new(self.config.clone())),
            CaptureMode::Demo => Box::new(DemoSource::new(self.config.clone())),
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}
