//! Actuator link with transparent reconnect.

use std::io;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crossway_proto::ActuatorCommand;

use crate::device::{open_with_retry, Connector, DeviceStream, ReconnectPolicy};
use crate::error::LinkError;

/// Outbound connection to the signal board.
///
/// A failed write triggers a blocking reconnect followed by exactly one retry.
pub struct ActuatorLink {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    stream: Option<Box<dyn DeviceStream>>,
}

impl std::fmt::Debug for ActuatorLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActuatorLink")
            .field("device", &self.connector.address())
            .field("policy", &self.policy)
            .field("connected", &self.stream.is_some())
            .finish()
    }
}

impl ActuatorLink {
    /// Creates a disconnected link.
    pub fn new(connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        Self {
            connector,
            policy,
            stream: None,
        }
    }

    /// Returns true if a stream is currently open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Opens the device, waiting as long as it takes.
    pub async fn connect(&mut self) {
        self.stream = Some(open_with_retry(self.connector.as_ref(), self.policy).await);
    }

    /// Sends one command.
    ///
    /// On a write failure the link reconnects (retrying until the device is
    /// back) and writes the command once more. A second failure is returned.
    pub async fn send(&mut self, command: ActuatorCommand) -> Result<(), LinkError> {
        let bytes = command.encode();

        if self.stream.is_none() {
            self.connect().await;
        }

        match self.write(&bytes).await {
            Ok(()) => {
                debug!(%command, "actuator command sent");
                return Ok(());
            }
            Err(e) => {
                warn!(%command, error = %e, "actuator write failed, reconnecting");
                self.stream = None;
            }
        }

        self.connect().await;
        if let Err(source) = self.write(&bytes).await {
            self.stream = None;
            return Err(LinkError::Write {
                command: command.to_string(),
                source,
            });
        }

        debug!(%command, "actuator command sent after reconnect");
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        stream.write_all(bytes).await?;
        stream.flush().await
    }
}

/// Shared handle to the actuator link.
///
/// Holding the guard from [`Actuator::lock`] grants exclusive command
/// authority; commands are emitted in the order guards are acquired.
#[derive(Debug, Clone)]
pub struct Actuator {
    link: Arc<Mutex<ActuatorLink>>,
}

impl Actuator {
    /// Wraps a link for sharing.
    pub fn new(link: ActuatorLink) -> Self {
        Self {
            link: Arc::new(Mutex::new(link)),
        }
    }

    /// Acquires exclusive use of the link.
    pub async fn lock(&self) -> MutexGuard<'_, ActuatorLink> {
        self.link.lock().await
    }

    /// Sends one command.
    pub async fn send(&self, command: ActuatorCommand) -> Result<(), LinkError> {
        self.lock().await.send(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryActuator;
    use crossway_proto::LaneId;
    use std::time::Duration;

    fn make_link(board: &MemoryActuator) -> ActuatorLink {
        ActuatorLink::new(
            Arc::new(board.clone()),
            ReconnectPolicy {
                retry_delay: Duration::from_secs(3),
                settle_delay: Duration::from_secs(2),
            },
        )
    }

    fn sent(board: &MemoryActuator) -> Vec<ActuatorCommand> {
        board.commands().into_iter().map(|c| c.command).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn connects_lazily_on_first_send() {
        let board = MemoryActuator::new();
        let mut link = make_link(&board);
        assert!(!link.is_connected());

        link.send(ActuatorCommand::AllRed).await.unwrap();

        assert!(link.is_connected());
        assert_eq!(board.opens(), 1);
        assert_eq!(sent(&board), vec![ActuatorCommand::AllRed]);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_and_retries_once_after_write_failure() {
        let board = MemoryActuator::new();
        let mut link = make_link(&board);
        link.connect().await;

        board.fail_next_writes(1);
        let lane = LaneId::new(2).unwrap();
        link.send(ActuatorCommand::Green(lane)).await.unwrap();

        assert_eq!(board.opens(), 2);
        assert_eq!(sent(&board), vec![ActuatorCommand::Green(lane)]);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_waits_for_device() {
        let board = MemoryActuator::new();
        let mut link = make_link(&board);
        link.connect().await;

        board.fail_next_writes(1);
        board.fail_next_opens(2);
        link.send(ActuatorCommand::AllRed).await.unwrap();

        assert_eq!(board.opens(), 2);
        assert_eq!(sent(&board), vec![ActuatorCommand::AllRed]);
    }

    #[tokio::test(start_paused = true)]
    async fn second_failure_is_reported() {
        let board = MemoryActuator::new();
        let mut link = make_link(&board);
        link.connect().await;

        board.fail_next_writes(2);
        let result = link.send(ActuatorCommand::AllRed).await;

        assert!(matches!(result, Err(LinkError::Write { .. })));
        assert!(!link.is_connected());
        assert!(sent(&board).is_empty());

        // The link recovers on the next command.
        link.send(ActuatorCommand::AllRed).await.unwrap();
        assert_eq!(sent(&board), vec![ActuatorCommand::AllRed]);
    }

    #[tokio::test(start_paused = true)]
    async fn shared_handle_sends_in_lock_order() {
        let board = MemoryActuator::new();
        let actuator = Actuator::new(make_link(&board));
        let lane = LaneId::new(1).unwrap();

        actuator.send(ActuatorCommand::Green(lane)).await.unwrap();
        actuator.clone().send(ActuatorCommand::Yellow(lane)).await.unwrap();

        assert_eq!(
            sent(&board),
            vec![ActuatorCommand::Green(lane), ActuatorCommand::Yellow(lane)]
        );
    }
}
