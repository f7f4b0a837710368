//! Raw socket capture
//!
//! Receives whole IP datagrams on a raw socket and classifies the bytes by hand.
//! Socket flavour per platform:
//! - Linux: `AF_PACKET`/`SOCK_DGRAM` bound to `ETH_P_IP`, which hands over IP
//!   packets of every interface with the link header stripped.
//! - Windows: `AF_INET`/`SOCK_RAW`/`IPPROTO_IP` bound to the outward-facing
//!   address, with `SIO_RCVALL` for promiscuous receive.
//! - Other unix: `AF_INET`/`SOCK_RAW`, which only sees what the kernel forwards to
//!   raw sockets.

use std::io::{self, Read};
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::capture::{join_with_timeout, CaptureMode, CaptureSource};
use crate::config::CaptureConfig;
use crate::constants::{MIN_IPV4_HEADER_LEN, RAW_RECV_BUFFER_SIZE};
use crate::error::CaptureError;
use crate::packet::{classify_raw, PacketSink};

const CONTEXT: &str = "Raw socket capture";
const TRANSIENT_ERROR_BACKOFF: Duration = Duration::from_millis(10);

#[cfg(any(target_os = "linux", target_os = "android"))]
fn open_raw_socket() -> io::Result<Socket> {
    const ETH_P_IP: u16 = 0x0800;
    Socket::new(
        Domain::PACKET,
        Type::DGRAM,
        Some(Protocol::from(i32::from(ETH_P_IP.to_be()))),
    )
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn open_raw_socket() -> io::Result<Socket> {
    Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::from(0)))
}

/// Check that a raw socket can be created. The socket is closed immediately.
pub fn probe_raw_socket() -> Result<(), CaptureError> {
    open_raw_socket()
        .map(drop)
        .map_err(|e| CaptureError::from_socket(CONTEXT, e))
}

/// Outward-facing local IPv4 address.
///
/// Asks the routing table via a connected (never used) UDP socket, then falls back
/// to resolving the machine's host name.
pub fn local_ipv4(probe_target: &str) -> Option<Ipv4Addr> {
    let routed = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).and_then(|socket| {
        socket.connect(probe_target)?;
        socket.local_addr()
    });

    match routed {
        Ok(SocketAddr::V4(addr)) if !addr.ip().is_unspecified() => return Some(*addr.ip()),
        Ok(addr) => tracing::debug!(%addr, "Routed local address is not usable IPv4"),
        Err(e) => tracing::debug!(error = %e, "Could not route to {}", probe_target),
    }

    host_name_ipv4()
}

fn host_name() -> Option<String> {
    hostname::get().ok()?.into_string().ok()
}

/// First non-loopback IPv4 address the host name resolves to
fn host_name_ipv4() -> Option<Ipv4Addr> {
    let host = host_name()?;
    let resolved = resolve_ipv4(&host);
    if resolved.is_none() {
        tracing::debug!(%host, "Host name has no non-loopback IPv4 address");
    }
    resolved
}

fn resolve_ipv4(host: &str) -> Option<Ipv4Addr> {
    (host, 0)
        .to_socket_addrs()
        .ok()?
        .find_map(|addr| match addr {
            SocketAddr::V4(v4) if !v4.ip().is_loopback() => Some(*v4.ip()),
            _ => None,
        })
}

#[cfg(windows)]
fn prepare_socket(socket: &Socket, local: Ipv4Addr) -> Result<(), CaptureError> {
    socket
        .bind(&SocketAddr::from((local, 0)).into())
        .map_err(|e| CaptureError::from_socket(CONTEXT, e))?;

    #[allow(deprecated)]
    let header_included = socket.set_header_included(true);
    if let Err(e) = header_included {
        tracing::debug!(error = %e, "Could not set IP_HDRINCL");
    }
    Ok(())
}

#[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
fn prepare_socket(socket: &Socket, local: Ipv4Addr) -> Result<(), CaptureError> {
    socket
        .bind(&SocketAddr::from((local, 0)).into())
        .map_err(|e| CaptureError::from_socket(CONTEXT, e))
}

// Packet sockets bind by interface index, not address; unbound means every interface.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn prepare_socket(_socket: &Socket, _local: Ipv4Addr) -> Result<(), CaptureError> {
    Ok(())
}

#[cfg(windows)]
fn enable_receive_all(socket: &Socket) -> io::Result<()> {
    use std::os::windows::io::AsRawSocket;
    use windows::Win32::Networking::WinSock::{WSAIoctl, SIO_RCVALL, SOCKET, SOCKET_ERROR};

    let enable: u32 = 1;
    let mut returned: u32 = 0;
    // SAFETY: the socket handle is owned by `socket` and outlives the call; the input
    // buffer is a live u32 and no output buffer or overlapped I/O is used.
    let rc = unsafe {
        WSAIoctl(
            SOCKET(socket.as_raw_socket() as usize),
            SIO_RCVALL,
            Some(std::ptr::addr_of!(enable).cast()),
            std::mem::size_of::<u32>() as u32,
            None,
            0,
            &mut returned,
            None,
            None,
        )
    };

    if rc == SOCKET_ERROR {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(not(windows))]
fn enable_receive_all(_socket: &Socket) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "no receive-all control on this platform",
    ))
}

/// Capture thread body. Exits when `running` is cleared or the socket is shut down
/// during a stop; any other receive error is transient.
fn receive_loop(socket: Arc<Socket>, running: Arc<AtomicBool>, sink: PacketSink) {
    let mut buffer = vec![0u8; RAW_RECV_BUFFER_SIZE];
    let mut received: u64 = 0;

    while running.load(Ordering::Relaxed) {
        match (&*socket).read(&mut buffer) {
            Ok(len) if len >= MIN_IPV4_HEADER_LEN => {
                if let Some(record) = classify_raw(&buffer[..len]) {
                    sink.publish(record);
                    received += 1;
                }
            }
            Ok(_) => {}
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                tracing::warn!(error = %e, "Raw socket receive error, retrying");
                thread::sleep(TRANSIENT_ERROR_BACKOFF);
            }
        }
    }

    tracing::debug!(packets = received, "Raw socket capture loop exited");
}

pub struct RawSocketSource {
    config: CaptureConfig,
    running: Arc<AtomicBool>,
    socket: Option<Arc<Socket>>,
    local_addr: Option<Ipv4Addr>,
    thread_handle: Option<JoinHandle<()>>,
}

impl RawSocketSource {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            socket: None,
            local_addr: None,
            thread_handle: None,
        }
    }

    pub fn local_addr(&self) -> Option<Ipv4Addr> {
        self.local_addr
    }
}

impl CaptureSource for RawSocketSource {
    fn mode(&self) -> CaptureMode {
        CaptureMode::RawSocket
    }

    fn start(&mut self, sink: PacketSink) -> Result<(), CaptureError> {
        if self.is_running() {
            return Ok(());
        }

        let local = local_ipv4(&self.config.local_addr_probe).ok_or(CaptureError::NoLocalAddress)?;
        let socket = open_raw_socket().map_err(|e| CaptureError::from_socket(CONTEXT, e))?;
        prepare_socket(&socket, local)?;

        if self.config.promiscuous {
            if let Err(e) = enable_receive_all(&socket) {
                tracing::warn!(error = %e, "Could not enable promiscuous receive, capturing local traffic only");
            }
        }

        let timeout = Duration::from_millis(u64::from(self.config.raw_read_timeout_ms.max(1)));
        socket
            .set_read_timeout(Some(timeout))
            .map_err(|e| CaptureError::from_socket(CONTEXT, e))?;

        let socket = Arc::new(socket);
        self.running.store(true, Ordering::SeqCst);

        let handle = {
            let socket = Arc::clone(&socket);
            let running = Arc::clone(&self.running);
            thread::Builder::new()
                .name("capture-raw".to_owned())
                .spawn(move || receive_loop(socket, running, sink))
        };

        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(CaptureError::Thread(e));
            }
        };

        self.socket = Some(socket);
        self.local_addr = Some(local);
        self.thread_handle = Some(handle);
        tracing::info!(%local, "Raw socket capture started");
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(socket) = self.socket.take() {
            // Unblocks a pending receive where the platform supports it; the read
            // timeout covers the rest. Already-closed errors are expected here.
            let _ = socket.shutdown(std::net::Shutdown::Both);
        }

        if let Some(handle) = self.thread_handle.take() {
            join_with_timeout(handle, self.config.stop_timeout());
            tracing::info!("Raw socket capture stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self
                .thread_handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    fn describe(&self) -> String {
        match self.local_addr {
            Some(addr) => format!("Capturing via Raw Socket: {}", addr),
            None => "Capturing via Raw Socket".to_owned(),
        }
    }
}

impl Drop for RawSocketSource {
    fn drop(&mut self) {
        self.stop();
    }
}
