//! Test fixtures: an in-process coordinator and a client for the node's
//! inbound listener.

#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use fsn_domain::config::{NodeConfig, NodeConfigBuilder};
use fsn_protocol::{CoordinatorRequest, CoordinatorResponse, Envelope, NodeRequest, NodeResponse};

// ── Mini coordinator ────────────────────────────────────────────────────

/// A captured `register_node`.
#[derive(Debug, Clone)]
pub struct CapturedRegistration {
    pub node_id: String,
    pub address: String,
}

#[derive(Default)]
pub struct CoordinatorState {
    /// Rejects every registration when set.
    pub reject: bool,
    /// Drops the node's connection right after answering `register_node`.
    pub hang_up_after_register: bool,
    /// IDs handed out to unknown nodes, in order.
    pub assign_queue: Vec<String>,
    pub known: HashSet<String>,
    pub registrations: Vec<CapturedRegistration>,
    pub heartbeats: Vec<(String, Instant)>,
}

impl CoordinatorState {
    pub fn heartbeat_count(&self) -> usize {
        self.heartbeats.len()
    }
}

pub struct MiniCoordinator {
    pub addr: SocketAddr,
    pub state: Arc<Mutex<CoordinatorState>>,
}

impl MiniCoordinator {
    /// Boots a tiny WS server on an ephemeral port.  Nodes presenting an
    /// empty ID get the next ID from `assign`; any other ID is accepted as-is.
    pub async fn start(assign: &[&str]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(CoordinatorState {
            assign_queue: assign.iter().rev().map(|s| s.to_string()).collect(),
            ..Default::default()
        }));

        let shared = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _peer)) = listener.accept().await {
                let state = shared.clone();
                tokio::spawn(async move { serve_node(stream, state).await });
            }
        });

        Self { addr, state }
    }

    pub fn set_reject(&self, reject: bool) {
        self.state.lock().reject = reject;
    }

    pub fn set_hang_up_after_register(&self, hang_up: bool) {
        self.state.lock().hang_up_after_register = hang_up;
    }

    pub fn heartbeat_count(&self) -> usize {
        self.state.lock().heartbeat_count()
    }

    pub fn registrations(&self) -> Vec<CapturedRegistration> {
        self.state.lock().registrations.clone()
    }
}

async fn serve_node(stream: TcpStream, state: Arc<Mutex<CoordinatorState>>) {
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

    while let Some(Ok(msg)) = ws.next().await {
        let Message::Text(text) = msg else { continue };
        let env = match Envelope::<CoordinatorRequest>::from_json(&text) {
            Ok(env) => env,
            Err(bad) => {
                let reply = Envelope::new(
                    bad.id,
                    CoordinatorResponse::Malformed { reason: bad.reason },
                );
                let _ = ws.send(Message::Text(reply.to_json().unwrap())).await;
                continue;
            }
        };

        let mut hang_up = false;
        let body = {
            let mut st = state.lock();
            match env.body {
                CoordinatorRequest::RegisterNode {
                    node_id, address, ..
                } => {
                    st.registrations.push(CapturedRegistration {
                        node_id: node_id.clone(),
                        address,
                    });
                    hang_up = st.hang_up_after_register;
                    if st.reject {
                        CoordinatorResponse::Registered {
                            accepted: false,
                            new_id: None,
                        }
                    } else if node_id.is_empty() {
                        let id = st.assign_queue.pop().expect("no IDs left to assign");
                        st.known.insert(id.clone());
                        CoordinatorResponse::Registered {
                            accepted: true,
                            new_id: Some(id),
                        }
                    } else {
                        st.known.insert(node_id);
                        CoordinatorResponse::Registered {
                            accepted: true,
                            new_id: None,
                        }
                    }
                }
                CoordinatorRequest::Heartbeat { node_id, .. } => {
                    st.heartbeats.push((node_id, Instant::now()));
                    CoordinatorResponse::HeartbeatAck
                }
            }
        };

        let reply = Envelope::new(env.id, body).to_json().unwrap();
        if ws.send(Message::Text(reply)).await.is_err() || hang_up {
            break;
        }
    }
}

// ── Node config ─────────────────────────────────────────────────────────

pub fn node_config(coordinator: SocketAddr, data_dir: &Path) -> NodeConfigBuilder {
    NodeConfig::builder(coordinator.to_string())
        .data_dir(data_dir)
        .heartbeat_interval(Duration::from_millis(50))
}

// ── Client for the node's listener ──────────────────────────────────────

/// Plays the coordinator side of the node's inbound RPC surface.
pub struct NodeConn {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
}

impl NodeConn {
    pub async fn connect(addr: SocketAddr) -> Self {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
            .await
            .unwrap();
        Self { ws, next_id: 1 }
    }

    /// Send a request and wait for the response with the same id.
    pub async fn call(&mut self, request: NodeRequest) -> NodeResponse {
        let id = self.next_id;
        self.next_id += 1;
        let json = Envelope::new(id, request).to_json().unwrap();
        self.send_raw(&json).await;
        self.recv_for(id).await
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.ws.send(Message::Text(text.to_string())).await.unwrap();
    }

    pub async fn recv_for(&mut self, id: u64) -> NodeResponse {
        let text = self.recv_raw_for(id).await;
        Envelope::<NodeResponse>::from_json(&text).unwrap().body
    }

    /// The response frame for `id`, exactly as the node sent it.
    pub async fn recv_raw_for(&mut self, id: u64) -> String {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            match tokio::time::timeout_at(deadline, self.ws.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => {
                    let env = Envelope::<NodeResponse>::from_json(&text).unwrap();
                    if env.id == id {
                        return text;
                    }
                }
                Ok(Some(Ok(_))) => continue,
                Ok(other) => panic!("connection dropped before response: {other:?}"),
                Err(_) => panic!("timeout waiting for response {id}"),
            }
        }
    }
}
