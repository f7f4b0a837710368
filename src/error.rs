//! Error types for the sonification engine

use std::io;

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Capture subsystem errors
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The capture mechanism exists but the process lacks the privilege to use it
    #[error("{0} requires elevated privileges. Please run as Administrator (or root).")]
    PermissionDenied(String),

    #[error("Could not determine local IP address")]
    NoLocalAddress,

    #[error("Socket error: {0}. Try running as Administrator.")]
    Socket(#[source] io::Error),

    #[error("Interface error: {0}")]
    Interface(String),

    #[error("Capture mechanism unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to spawn capture thread: {0}")]
    Thread(#[source] io::Error),
}

impl CaptureError {
    /// Classify a socket error, separating privilege failures from everything else.
    pub fn from_socket(context: &str, err: io::Error) -> Self {
        if is_permission_error(&err) {
            CaptureError::PermissionDenied(context.to_owned())
        } else {
            CaptureError::Socket(err)
        }
    }

    /// Classify a capture library error message.
    pub fn from_interface(context: &str, message: String) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("permission denied") || lower.contains("not permitted") {
            CaptureError::PermissionDenied(context.to_owned())
        } else {
            CaptureError::Interface(message)
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, CaptureError::PermissionDenied(_))
    }
}

fn is_permission_error(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::PermissionDenied {
        return true;
    }

    // EPERM / EACCES on unix, WSAEACCES on Windows
    matches!(err.raw_os_error(), Some(1) | Some(13) | Some(10013))
}

/// Audio subsystem errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No configuration directory available on this platform")]
    NoConfigDir,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_errors_are_distinguished() {
        let err = CaptureError::from_socket(
            "Raw socket capture",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(err.is_permission_denied());
        assert!(err.to_string().contains("elevated privileges"));

        let err = CaptureError::from_socket("Raw socket capture", io::Error::from_raw_os_error(1));
        assert!(err.is_permission_denied());

        let err = CaptureError::from_socket(
            "Raw socket capture",
            io::Error::from(io::ErrorKind::AddrNotAvailable),
        );
        assert!(!err.is_permission_denied());
    }

    #[test]
    fn test_interface_messages() {
        let err = CaptureError::from_interface("Live capture", "eth0: You don't have permission to capture on that device (socket: Operation not permitted)".into());
        assert!(err.is_permission_denied());

        let err = CaptureError::from_interface("Live capture", "No such device exists".into());
        assert!(matches!(err, CaptureError::Interface(_)));
    }
}
