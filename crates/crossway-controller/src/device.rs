//! Serial device access.
//!
//! Both boards hang off USB serial ports. A [`Connector`] opens a fresh byte
//! stream to one of them; [`open_with_retry`] keeps trying until the board
//! shows up. [`MemoryActuator`] stands in for the signal board when none is
//! attached and records every command it is sent.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Instant;
use tracing::{info, warn};

use crossway_proto::ActuatorCommand;

/// Bidirectional byte stream to a device.
pub trait DeviceStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> DeviceStream for T {}

/// Opens connections to a device.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a new stream to the device.
    async fn open(&self) -> io::Result<Box<dyn DeviceStream>>;

    /// Human-readable device address for logs.
    fn address(&self) -> String;
}

/// Timing for (re)connecting to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay between failed attempts.
    pub retry_delay: Duration,
    /// Wait after a successful open before first use.
    pub settle_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(3),
            settle_delay: Duration::ZERO,
        }
    }
}

/// Opens a stream, retrying with a fixed delay until it succeeds.
pub async fn open_with_retry(
    connector: &dyn Connector,
    policy: ReconnectPolicy,
) -> Box<dyn DeviceStream> {
    let mut attempt: u32 = 0;

    loop {
        attempt = attempt.saturating_add(1);
        match connector.open().await {
            Ok(stream) => {
                info!(device = %connector.address(), attempt, "device connected");
                if !policy.settle_delay.is_zero() {
                    tokio::time::sleep(policy.settle_delay).await;
                }
                return stream;
            }
            Err(e) => {
                warn!(
                    device = %connector.address(),
                    attempt,
                    error = %e,
                    "waiting for device"
                );
                tokio::time::sleep(policy.retry_delay).await;
            }
        }
    }
}

/// A serial port opened as a character device.
///
/// Line settings (baud rate and framing) are expected to be configured on the
/// port already, e.g. by udev or `stty`.
#[derive(Debug, Clone)]
pub struct SerialDevice {
    path: PathBuf,
}

impl SerialDevice {
    /// Creates a connector for the device at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Device path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Connector for SerialDevice {
    async fn open(&self) -> io::Result<Box<dyn DeviceStream>> {
        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .await?;
        Ok(Box::new(file))
    }

    fn address(&self) -> String {
        self.path.display().to_string()
    }
}

/// A command received by a [`MemoryActuator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedCommand {
    /// When the command arrived.
    pub at: Instant,
    /// The decoded command.
    pub command: ActuatorCommand,
}

#[derive(Debug, Default)]
struct MemoryLog {
    commands: Vec<RecordedCommand>,
    opens: u32,
    failing_opens: u32,
    failing_writes: u32,
}

/// In-memory signal board.
///
/// Cloning shares the log, so a clone kept by the caller sees everything sent
/// through connections opened by the link.
#[derive(Debug, Clone, Default)]
pub struct MemoryActuator {
    log: Arc<Mutex<MemoryLog>>,
}

impl MemoryActuator {
    /// Creates an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` open attempts fail.
    pub fn fail_next_opens(&self, count: u32) {
        self.log.lock().failing_opens = count;
    }

    /// Makes the next `count` writes fail.
    pub fn fail_next_writes(&self, count: u32) {
        self.log.lock().failing_writes = count;
    }

    /// Commands received so far.
    #[must_use]
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.log.lock().commands.clone()
    }

    /// Successful opens so far.
    #[must_use]
    pub fn opens(&self) -> u32 {
        self.log.lock().opens
    }
}

#[async_trait]
impl Connector for MemoryActuator {
    async fn open(&self) -> io::Result<Box<dyn DeviceStream>> {
        let mut log = self.log.lock();
        if log.failing_opens > 0 {
            log.failing_opens -= 1;
            return Err(io::Error::new(io::ErrorKind::NotFound, "board not attached"));
        }
        log.opens += 1;

        Ok(Box::new(MemoryStream {
            log: Arc::clone(&self.log),
            partial: Vec::new(),
        }))
    }

    fn address(&self) -> String {
        "memory".to_owned()
    }
}

struct MemoryStream {
    log: Arc<Mutex<MemoryLog>>,
    partial: Vec<u8>,
}

impl AsyncRead for MemoryStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MemoryStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let mut log = this.log.lock();
        if log.failing_writes > 0 {
            log.failing_writes -= 1;
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "board disconnected",
            )));
        }

        this.partial.extend_from_slice(buf);
        while let Some(end) = this.partial.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = this.partial.drain(..=end).collect();
            let text = String::from_utf8_lossy(&line);
            match text.parse::<ActuatorCommand>() {
                Ok(command) => log.commands.push(RecordedCommand {
                    at: Instant::now(),
                    command,
                }),
                Err(e) => warn!(error = %e, "memory actuator ignored line"),
            }
        }

        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
