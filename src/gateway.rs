use log::{debug, info};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::command_payload::RaCommand;
use crate::ra_manager::{RaManager, RaManagerError, Result};
use crate::zone_state::StatusFrame;

struct GatewayRequest {
    command: RaCommand,
    reply: oneshot::Sender<Result<String>>,
}

/// Handle to the single worker that owns the RadioRA interface.
///
/// Commands are queued and executed one at a time, so a command and its reply are
/// never interleaved with another caller's traffic.
#[derive(Clone)]
pub struct RaGateway {
    requests: mpsc::Sender<GatewayRequest>,
}

impl RaGateway {
    pub fn spawn(mut manager: RaManager, queue_depth: usize) -> (RaGateway, JoinHandle<()>) {
        let (requests, mut receiver) = mpsc::channel::<GatewayRequest>(queue_depth.max(1));

        let worker = tokio::task::spawn_blocking(move || {
            let _span = tracing::info_span!("radiora_queue").entered();
            info!("RadioRA command queue started");

            while let Some(request) = receiver.blocking_recv() {
                let result = manager.execute(&request.command);

                if request.reply.send(result).is_err() {
                    debug!("Caller of {} went away before the reply", request.command);
                }
            }

            info!("RadioRA command queue stopped");
        });

        (RaGateway { requests }, worker)
    }

    /// A gateway whose worker has already stopped
    #[cfg(test)]
    pub fn closed() -> RaGateway {
        let (requests, _) = mpsc::channel(1);
        RaGateway { requests }
    }

    /// Queue a command and wait for the raw reply line
    pub async fn execute(&self, command: RaCommand) -> Result<String> {
        let (reply, reply_receiver) = oneshot::channel();

        self.requests
            .send(GatewayRequest { command, reply })
            .await
            .map_err(|_| RaManagerError::QueueClosed)?;

        reply_receiver.await.map_err(|_| RaManagerError::QueueClosed)?
    }

    /// Query the zone map
    pub async fn zone_states(&self) -> Result<StatusFrame> {
        let reply = self.execute(RaCommand::QueryZoneMap).await?;
        StatusFrame::from_reply(&reply)
    }
}
