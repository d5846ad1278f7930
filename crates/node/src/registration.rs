//! One-time registration handshake with the coordinator.

use fsn_domain::error::{Error, Result};
use fsn_domain::trace::TraceEvent;
use fsn_protocol::{CoordinatorRequest, CoordinatorResponse, PROTOCOL_VERSION};

use crate::context::NodeContext;
use crate::coordinator::CoordinatorClient;

/// How the coordinator answered `register_node`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// Accepted under the ID the node already had.
    Existing,
    /// Accepted and assigned this (new) ID.
    Assigned(String),
    /// Turned away.
    Rejected,
}

impl RegistrationOutcome {
    fn label(&self) -> &'static str {
        match self {
            RegistrationOutcome::Existing => "existing",
            RegistrationOutcome::Assigned(_) => "assigned",
            RegistrationOutcome::Rejected => "rejected",
        }
    }
}

/// Present the node's current ID and advertised address to the coordinator.
///
/// A newly assigned ID becomes the active ID in `ctx` and is persisted.  A
/// failure to persist it is logged only: the node keeps running under the
/// new ID and will simply register as new again after a restart.
pub async fn register(
    client: &CoordinatorClient,
    ctx: &NodeContext,
    address: &str,
) -> Result<RegistrationOutcome> {
    let local_id = ctx.node_id();
    let response = client
        .call(CoordinatorRequest::RegisterNode {
            protocol_version: PROTOCOL_VERSION,
            node_id: local_id.clone(),
            address: address.to_string(),
        })
        .await?;

    let outcome = match response {
        CoordinatorResponse::Registered { accepted: false, .. } => {
            tracing::warn!(node_id = %local_id, "rejected - failed to register with coordinator");
            RegistrationOutcome::Rejected
        }
        CoordinatorResponse::Registered {
            accepted: true,
            new_id: Some(new_id),
        } if !new_id.is_empty() => {
            if let Err(e) = ctx.identity.store(&new_id) {
                tracing::error!(
                    node_id = %new_id,
                    path = %ctx.identity.path().display(),
                    error = %e,
                    "failed to persist assigned node ID"
                );
            }
            ctx.set_node_id(new_id.clone());
            tracing::info!(node_id = %new_id, "registered as new node");
            RegistrationOutcome::Assigned(new_id)
        }
        CoordinatorResponse::Registered { accepted: true, .. } => {
            tracing::info!(node_id = %local_id, "registered as existing node");
            RegistrationOutcome::Existing
        }
        other => {
            return Err(Error::Protocol(format!(
                "unexpected reply to register_node: {other:?}"
            )));
        }
    };

    TraceEvent::NodeRegistered {
        node_id: ctx.node_id(),
        outcome: outcome.label().into(),
        address: address.to_string(),
    }
    .emit();

    Ok(outcome)
}
