//! Density telemetry forwarding.
//!
//! The ingestor hands each merged density snapshot to a
//! [`TelemetryForwarder`], which never blocks: snapshots go into a bounded
//! queue and are dropped when it is full. A background task drains the queue
//! into a [`TelemetrySink`]; delivery failures are logged and discarded.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crossway_proto::LANE_COUNT;

use crate::error::TelemetryError;

/// Timestamp format stored with each record.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One historical density record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetryRecord {
    pub lane0: u32,
    pub lane1: u32,
    pub lane2: u32,
    pub lane3: u32,
    /// Local wall-clock time the snapshot was taken.
    pub timestamp: String,
}

impl TelemetryRecord {
    /// Builds a record from lane densities.
    #[must_use]
    pub fn new(densities: [u32; LANE_COUNT], at: DateTime<Local>) -> Self {
        let [lane0, lane1, lane2, lane3] = densities;
        Self {
            lane0,
            lane1,
            lane2,
            lane3,
            timestamp: at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

/// Destination for telemetry records.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Delivers one record.
    async fn push(&self, record: &TelemetryRecord) -> Result<(), TelemetryError>;

    /// Sink name for logs.
    fn name(&self) -> &'static str;
}

/// Pushes records to a Realtime-Database-style REST endpoint.
///
/// Each record is `POST`ed to `{url}/{collection}.json`, which appends it
/// under a generated key.
#[derive(Debug, Clone)]
pub struct HttpTelemetrySink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTelemetrySink {
    /// Creates a sink for the given database URL and collection.
    pub fn new(url: &str, collection: &str, timeout: Duration) -> Result<Self, TelemetryError> {
        let base = url.trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(TelemetryError::InvalidEndpoint(url.to_owned()));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: format!("{base}/{collection}.json"),
        })
    }

    /// Full URL records are posted to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TelemetrySink for HttpTelemetrySink {
    async fn push(&self, record: &TelemetryRecord) -> Result<(), TelemetryError> {
        self.client
            .post(&self.endpoint)
            .json(record)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Writes records to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTelemetrySink;

#[async_trait]
impl TelemetrySink for LogTelemetrySink {
    async fn push(&self, record: &TelemetryRecord) -> Result<(), TelemetryError> {
        debug!(
            lane0 = record.lane0,
            lane1 = record.lane1,
            lane2 = record.lane2,
            lane3 = record.lane3,
            timestamp = %record.timestamp,
            "density snapshot"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Non-blocking handle for enqueueing snapshots.
#[derive(Debug, Clone)]
pub struct TelemetryForwarder {
    tx: mpsc::Sender<TelemetryRecord>,
}

impl TelemetryForwarder {
    /// Creates a forwarder and the receiving end for [`run_telemetry`].
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TelemetryRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueues a snapshot of the given densities, dropping it if the queue is
    /// full or closed.
    pub fn forward(&self, densities: [u32; LANE_COUNT]) {
        let record = TelemetryRecord::new(densities, Local::now());
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("telemetry queue full, dropping snapshot");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("telemetry stopped, dropping snapshot");
            }
        }
    }
}

/// Drains queued records into the sink until cancelled or the queue closes.
pub async fn run_telemetry(
    sink: Arc<dyn TelemetrySink>,
    mut rx: mpsc::Receiver<TelemetryRecord>,
    cancel: CancellationToken,
) {
    info!(sink = sink.name(), "telemetry forwarder started");

    loop {
        let record = tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            record = rx.recv() => match record {
                Some(record) => record,
                None => break,
            },
        };

        if let Err(e) = sink.push(&record).await {
            warn!(sink = sink.name(), error = %e, "telemetry push failed");
        }
    }

    info!("telemetry forwarder stopped");
}
