//! Inbound connection handling.
//!
//! Every accepted TCP connection is upgraded to a WebSocket and served on its
//! own task.  Within a connection each request runs on its own task (bounded
//! by `max_concurrent_requests`) and responses are funnelled through a single
//! writer task, so replies may arrive out of request order; callers match
//! them by envelope `id`.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use fsn_domain::error::{Error, Result};
use fsn_domain::trace::TraceEvent;
use fsn_protocol::{Envelope, NodeRequest, NodeResponse};

use crate::context::NodeContext;
use crate::dispatch::dispatch;

/// A bound, not yet serving, listener.
pub struct NodeListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl NodeListener {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Connection(format!("bind {addr}: {e}")))?;
        let local_addr = listener.local_addr()?;

        tracing::info!(address = %local_addr, "now listening");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// The concrete bound address (the advertised address).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until an accept error ends the loop.
    pub async fn serve(self, ctx: Arc<NodeContext>) -> Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!(address = %self.local_addr, error = %e, "accept failed, listener stopping");
                    return Err(Error::Io(e));
                }
            };
            tracing::info!(peer = %peer, "new connection");

            let ctx = ctx.clone();
            tokio::spawn(async move { serve_connection(ctx, stream, peer).await });
        }
    }

    pub fn spawn(self, ctx: Arc<NodeContext>) -> JoinHandle<Result<()>> {
        tokio::spawn(self.serve(ctx))
    }
}

/// Single connection lifecycle: upgrade -> read/dispatch loop -> drain.
async fn serve_connection(ctx: Arc<NodeContext>, stream: TcpStream, peer: SocketAddr) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "websocket upgrade failed");
            return;
        }
    };
    TraceEvent::ConnectionAccepted {
        peer: peer.to_string(),
    }
    .emit();

    let (mut sink, mut stream) = ws.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Envelope<NodeResponse>>(64);
    let request_semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrent_requests));

    // Writer task: sends responses to the WebSocket.
    let writer_task = tokio::spawn(async move {
        while let Some(resp) = outbound_rx.recv().await {
            let json = match resp.to_json() {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize response");
                    continue;
                }
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Reader loop: decode and dispatch inbound requests.
    let max_req = ctx.config.max_request_bytes;
    let mut requests: u64 = 0;
    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(_)) => {
                let _ = outbound_tx
                    .send(malformed(0, "binary frames are not supported"))
                    .await;
                continue;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "connection read failed");
                break;
            }
        };
        requests += 1;

        // ── Pre-parse size limit ─────────────────────────────────
        if text.len() > max_req {
            tracing::warn!(
                peer = %peer,
                bytes = text.len(),
                max = max_req,
                "request exceeds max_request_bytes"
            );
            let _ = outbound_tx
                .send(malformed(0, "request exceeds max_request_bytes"))
                .await;
            continue;
        }

        let request = match Envelope::<NodeRequest>::from_json(&text) {
            Ok(env) => env,
            Err(bad) => {
                tracing::warn!(peer = %peer, id = bad.id, reason = %bad.reason, "malformed request");
                let _ = outbound_tx.send(malformed(bad.id, &bad.reason)).await;
                continue;
            }
        };
        tracing::debug!(peer = %peer, id = request.id, op = request.body.op(), "received request");

        let ctx = ctx.clone();
        let tx = outbound_tx.clone();
        let sem = request_semaphore.clone();
        tokio::spawn(async move {
            let _permit = sem.acquire().await;
            let resp = dispatch(&ctx, request.body).await;
            let _ = tx.send(Envelope::new(request.id, resp)).await;
        });
    }

    // In-flight handlers hold sender clones; the writer drains their replies
    // (or fails fast on a closed socket) before exiting.
    drop(outbound_tx);
    let _ = writer_task.await;

    TraceEvent::ConnectionClosed {
        peer: peer.to_string(),
        requests,
    }
    .emit();
}

fn malformed(id: u64, reason: &str) -> Envelope<NodeResponse> {
    Envelope::new(
        id,
        NodeResponse::Malformed {
            reason: reason.to_string(),
        },
    )
}
