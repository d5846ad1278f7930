//! Periodic liveness signal to the coordinator.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use fsn_protocol::CoordinatorRequest;

use crate::context::NodeContext;
use crate::coordinator::CoordinatorClient;

/// Sends `heartbeat` on the registration connection forever.
///
/// Each round trip is awaited, its reply ignored, then the loop sleeps for
/// the fixed interval.  Failures are logged and the loop carries on; there
/// is no backoff and no reconnect.
pub struct HeartbeatLoop {
    client: Arc<CoordinatorClient>,
    ctx: Arc<NodeContext>,
    interval: Duration,
}

impl HeartbeatLoop {
    pub fn new(client: Arc<CoordinatorClient>, ctx: Arc<NodeContext>) -> Self {
        let interval = ctx.config.heartbeat_interval;
        Self {
            client,
            ctx,
            interval,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "heartbeat loop started");

        let mut sent: u64 = 0;
        loop {
            let node_id = self.ctx.node_id();
            let result = self
                .client
                .call(CoordinatorRequest::Heartbeat {
                    node_id: node_id.clone(),
                    sent_at_ms: Utc::now().timestamp_millis(),
                })
                .await;
            sent += 1;

            match result {
                Ok(_) => tracing::trace!(node_id = %node_id, sent, "heartbeat acknowledged"),
                Err(e) => tracing::warn!(node_id = %node_id, sent, error = %e, "heartbeat failed"),
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}
