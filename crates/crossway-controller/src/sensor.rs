//! Sensor board reader.

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::device::{open_with_retry, Connector, ReconnectPolicy};

/// Reads density lines from the sensor board and queues them for the
/// controller loop.
///
/// The device is reopened whenever it disconnects or a read fails.
pub struct SensorReader {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
}

impl std::fmt::Debug for SensorReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorReader")
            .field("device", &self.connector.address())
            .field("policy", &self.policy)
            .finish()
    }
}

impl SensorReader {
    /// Creates a reader for the given device.
    pub fn new(connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        Self { connector, policy }
    }

    /// Reads until cancelled or the receiving side is dropped.
    pub async fn run(self, lines: mpsc::Sender<String>, cancel: CancellationToken) {
        info!(device = %self.connector.address(), "sensor reader started");

        loop {
            let stream = tokio::select! {
                biased;

                () = cancel.cancelled() => break,

                stream = open_with_retry(self.connector.as_ref(), self.policy) => stream,
            };

            let mut reader = BufReader::new(stream);
            let mut buf = Vec::new();

            loop {
                buf.clear();
                let read = tokio::select! {
                    biased;

                    () = cancel.cancelled() => {
                        info!("sensor reader stopped");
                        return;
                    }

                    read = reader.read_until(b'\n', &mut buf) => read,
                };

                match read {
                    Ok(0) => {
                        warn!(device = %self.connector.address(), "sensor disconnected");
                        break;
                    }
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        debug!(line, "sensor line");
                        if lines.send(line.to_owned()).await.is_err() {
                            info!("controller gone, sensor reader stopping");
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(device = %self.connector.address(), error = %e, "sensor read failed");
                        break;
                    }
                }
            }

            tokio::select! {
                biased;

                () = cancel.cancelled() => break,

                () = tokio::time::sleep(self.policy.retry_delay) => {}
            }
        }

        info!("sensor reader stopped");
    }
}
