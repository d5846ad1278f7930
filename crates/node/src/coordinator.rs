//! Outbound connection to the coordinator.
//!
//! One WebSocket carries both the registration handshake and every later
//! heartbeat.  Calls are strict request/response round trips: the socket is
//! held for the whole exchange, so concurrent callers queue.

use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use fsn_domain::error::{Error, Result};
use fsn_protocol::{CoordinatorRequest, CoordinatorResponse, Envelope};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct CoordinatorClient {
    url: String,
    socket: Mutex<WsStream>,
    next_id: AtomicU64,
}

impl CoordinatorClient {
    /// Dial the coordinator.  No retry: a failed dial is returned as-is.
    pub async fn connect(url: &str) -> Result<Self> {
        tracing::info!(url = %url, "connecting to coordinator");
        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::Connection(format!("dial {url}: {e}")))?;

        Ok(Self {
            url: url.to_string(),
            socket: Mutex::new(ws),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one request and wait for the response carrying the same id.
    ///
    /// Frames with other ids are stale replies and are skipped.
    pub async fn call(&self, request: CoordinatorRequest) -> Result<CoordinatorResponse> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let json = Envelope::new(id, request).to_json()?;

        let mut ws = self.socket.lock().await;
        ws.send(Message::Text(json))
            .await
            .map_err(|e| Error::Connection(format!("send: {e}")))?;

        loop {
            let text = match ws.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | None => {
                    return Err(Error::Connection("coordinator closed the connection".into()));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(Error::Connection(format!("receive: {e}"))),
            };

            match Envelope::<CoordinatorResponse>::from_json(&text) {
                Ok(env) if env.id == id => {
                    return match env.body {
                        CoordinatorResponse::Malformed { reason } => Err(Error::Protocol(
                            format!("coordinator rejected request frame: {reason}"),
                        )),
                        body => Ok(body),
                    };
                }
                Ok(env) => {
                    tracing::debug!(expected = id, got = env.id, "skipping stale coordinator reply");
                }
                Err(bad) if bad.id == id => {
                    return Err(Error::Protocol(format!(
                        "undecodable coordinator reply: {}",
                        bad.reason
                    )));
                }
                Err(bad) => {
                    tracing::debug!(reason = %bad.reason, "skipping undecodable coordinator frame");
                }
            }
        }
    }
}
