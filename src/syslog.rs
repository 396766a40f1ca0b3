//! Syslog transport behind the `syslog` feature (C3 "kind: external-protocol"
//! handoff). Wire-level severity/facility framing is out of scope (spec §1);
//! this module's job is to establish and maintain the socket and hand off
//! already-formatted bytes, reconnecting on failure the way the teacher's
//! pre-rewrite backend did.

use std::io::{self, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs, UdpSocket};
use std::os::unix::net::{UnixDatagram, UnixStream};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use syslog::LoggerBackend as SyslogBackend;

use crate::error::EngineError;
use crate::sink::ExternalWriter;

const TIMEOUT_DEFAULT: Duration = Duration::from_secs(5);
const UNIX_SOCK_PATHS: [&str; 3] = ["/dev/log", "/var/run/syslog", "/var/run/log"];
// NOTE: local /dev/log is always available
const LOCAL_TCP: &str = "127.0.0.1:601";
const RECONNECT_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub enum SyslogAddr {
    Tcp(String),
    Udp { local: String, remote: String },
    Unix(PathBuf),
}

/// Config for the syslog destination. When `server` is `None`, connects to
/// the local well-known unix socket, falling back to a local TCP relay.
#[derive(Debug, Clone)]
pub struct SyslogConfig {
    pub server: Option<SyslogAddr>,
    /// Drop the message when the server is unreachable after this long; also
    /// applies to the initial TCP connect timeout.
    pub timeout: Duration,
}

impl Default for SyslogConfig {
    fn default() -> Self {
        Self { server: None, timeout: TIMEOUT_DEFAULT }
    }
}

impl SyslogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = d;
        self
    }

    pub fn unix(mut self, path: impl Into<PathBuf>) -> Self {
        self.server = Some(SyslogAddr::Unix(path.into()));
        self
    }

    pub fn tcp(mut self, remote: impl Into<String>) -> Self {
        self.server = Some(SyslogAddr::Tcp(remote.into()));
        self
    }

    pub fn udp(mut self, local: impl Into<String>, remote: impl Into<String>) -> Self {
        self.server = Some(SyslogAddr::Udp { local: local.into(), remote: remote.into() });
        self
    }

    /// Parses `syslog://host:port` or `syslog:///absolute/unix/socket/path`
    /// (spec §6 sink URIs).
    pub fn from_uri(uri: &str) -> Result<Self, EngineError> {
        let rest = uri.strip_prefix("syslog://").ok_or_else(|| EngineError::UnknownScheme(uri.to_string()))?;
        let mut config = Self::default();
        if let Some(path) = rest.strip_prefix('/') {
            config.server = Some(SyslogAddr::Unix(PathBuf::from(format!("/{path}"))));
        } else if !rest.is_empty() {
            config.server = Some(SyslogAddr::Tcp(rest.to_string()));
        }
        Ok(config)
    }
}

fn connect_unix(path: &Path) -> io::Result<SyslogBackend> {
    let sock = UnixDatagram::unbound()?;
    match sock.connect(path) {
        Ok(()) => Ok(SyslogBackend::Unix(sock)),
        Err(e) => {
            if e.raw_os_error() == Some(libc::EPROTOTYPE) {
                let sock = UnixStream::connect(path)?;
                Ok(SyslogBackend::UnixStream(BufWriter::new(sock)))
            } else {
                Err(e)
            }
        }
    }
}

fn connect_tcp(remote: &str, timeout: Duration) -> io::Result<SyslogBackend> {
    for addr in remote.to_socket_addrs()? {
        let socket = TcpStream::connect_timeout(&addr, timeout)?;
        return Ok(SyslogBackend::Tcp(BufWriter::new(socket)));
    }
    Err(io::Error::new(io::ErrorKind::NotFound, "syslog: no server address"))
}

fn connect_udp(local: &str, remote: &str) -> io::Result<SyslogBackend> {
    let server_addr = remote
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "syslog: no server address"))?;
    let socket = UdpSocket::bind(local)?;
    Ok(SyslogBackend::Udp(socket, server_addr))
}

fn connect(server: &Option<SyslogAddr>, timeout: Duration) -> io::Result<SyslogBackend> {
    match server {
        Some(SyslogAddr::Unix(p)) => connect_unix(p),
        Some(SyslogAddr::Udp { local, remote }) => connect_udp(local, remote),
        Some(SyslogAddr::Tcp(remote)) => connect_tcp(remote, timeout),
        None => {
            for p in &UNIX_SOCK_PATHS {
                if let Ok(backend) = connect_unix(Path::new(p)) {
                    return Ok(backend);
                }
            }
            connect_tcp(LOCAL_TCP, timeout)
        }
    }
}

/// Transport for the syslog external-protocol sink. Reconnects on write
/// failure, retrying with backoff until `timeout` elapses before giving up
/// on that message.
pub(crate) struct SyslogWriter {
    server: Option<SyslogAddr>,
    timeout: Duration,
    backend: Option<SyslogBackend>,
}

impl SyslogWriter {
    pub(crate) fn connect(config: &SyslogConfig) -> io::Result<Self> {
        let backend = connect(&config.server, config.timeout)?;
        Ok(Self { server: config.server.clone(), timeout: config.timeout, backend: Some(backend) })
    }

    fn reconnect(&mut self) -> io::Result<()> {
        self.backend = Some(connect(&self.server, self.timeout)?);
        Ok(())
    }
}

impl ExternalWriter for SyslogWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if let Some(backend) = self.backend.as_mut() {
            if backend.write_all(bytes).is_ok() {
                return Ok(());
            }
        }
        self.backend = None;
        let start = Instant::now();
        loop {
            thread::sleep(RECONNECT_BACKOFF);
            if self.reconnect().is_ok() {
                if let Some(backend) = self.backend.as_mut() {
                    if backend.write_all(bytes).is_ok() {
                        return Ok(());
                    }
                }
                self.backend = None;
            }
            if start.elapsed() > self.timeout {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "syslog: giving up after timeout"));
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.backend.as_mut() {
            Some(backend) => backend.flush(),
            None => Ok(()),
        }
    }
}
