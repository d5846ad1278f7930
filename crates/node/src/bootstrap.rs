//! Node startup: context, listener, registration, heartbeat.
//!
//! The listener starts before the coordinator is dialled, so the advertised
//! address sent in `register_node` is the concrete bound one.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;

use fsn_domain::config::{NodeConfig, RejectPolicy};
use fsn_domain::error::{Error, Result};

use crate::context::NodeContext;
use crate::coordinator::CoordinatorClient;
use crate::heartbeat::HeartbeatLoop;
use crate::listener::NodeListener;
use crate::registration::{register, RegistrationOutcome};

/// A started node and the handles of its background tasks.
pub struct RunningNode {
    pub ctx: Arc<NodeContext>,
    /// Address the listener is bound to (as advertised to the coordinator).
    pub address: SocketAddr,
    pub outcome: RegistrationOutcome,
    pub coordinator: Arc<CoordinatorClient>,
    pub listener: JoinHandle<Result<()>>,
    pub heartbeat: JoinHandle<()>,
}

impl RunningNode {
    /// Stop the accept loop and the heartbeat.  Connections already being
    /// served run until their peers hang up.
    pub fn abort(&self) {
        self.heartbeat.abort();
        self.listener.abort();
    }
}

/// Boot a node.  Bind, dial and (with [`RejectPolicy::Halt`]) rejection
/// failures are returned as errors; nothing is retried.
pub async fn start(config: NodeConfig) -> Result<RunningNode> {
    let ctx = Arc::new(NodeContext::open(config)?);

    // ── Listener ─────────────────────────────────────────────────────
    let listener = NodeListener::bind(&ctx.config.listen_addr).await?;
    let address = listener.local_addr();
    let listener_task = listener.spawn(ctx.clone());

    // ── Registration ─────────────────────────────────────────────────
    let registered = async {
        let client = CoordinatorClient::connect(&ctx.config.coordinator_url).await?;
        let outcome = register(&client, &ctx, &address.to_string()).await?;
        Ok::<_, Error>((Arc::new(client), outcome))
    }
    .await;

    let (coordinator, outcome) = match registered {
        Ok(r) => r,
        Err(e) => {
            listener_task.abort();
            return Err(e);
        }
    };

    if outcome == RegistrationOutcome::Rejected && ctx.config.reject_policy == RejectPolicy::Halt {
        listener_task.abort();
        return Err(Error::Rejected);
    }

    // ── Heartbeat ────────────────────────────────────────────────────
    let heartbeat = HeartbeatLoop::new(coordinator.clone(), ctx.clone()).spawn();

    tracing::info!(
        node_id = %ctx.node_id(),
        address = %address,
        coordinator = %coordinator.url(),
        "node connected to coordinator"
    );

    Ok(RunningNode {
        ctx,
        address,
        outcome,
        coordinator,
        listener: listener_task,
        heartbeat,
    })
}
