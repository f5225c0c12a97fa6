//! `UpstreamClient`: one long-lived, self-reconnecting WebSocket to the node.
//!
//! Outgoing requests go through an [`UpstreamHandle`] and never block: while
//! the node is unreachable they wait in the channel and are flushed, in
//! order, once a connection is up again.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use nanorelay_core::config::NodeConfig;
use nanorelay_protocol::UpstreamRequest;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::error::{Result, UpstreamError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Callbacks for one upstream channel.
pub trait UpstreamHandler: Send + Sync + 'static {
    /// Requests to send first on every (re)connect, before anything queued.
    fn on_open(&self) -> Vec<UpstreamRequest>;

    /// One text frame from the node.
    fn on_message(&self, text: &str);

    fn on_error(&self, error: &UpstreamError) {
        warn!(error = %error, "upstream connection error");
    }
}

/// Cloneable sending side of an [`UpstreamClient`].
#[derive(Clone)]
pub struct UpstreamHandle {
    tx: mpsc::UnboundedSender<UpstreamRequest>,
    connected: Arc<AtomicBool>,
}

impl UpstreamHandle {
    /// Queue a request; returns `false` only if the client task has exited.
    pub fn send(&self, request: UpstreamRequest) -> bool {
        self.tx.send(request).is_ok()
    }

    /// Raw sender, for components that take an `mpsc` sink directly.
    pub fn sender(&self) -> mpsc::UnboundedSender<UpstreamRequest> {
        self.tx.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// How a connected session ended.
enum SessionEnd {
    Shutdown,
    Lost(Option<UpstreamError>),
}

pub struct UpstreamClient {
    name: String,
    config: NodeConfig,
    rx: mpsc::UnboundedReceiver<UpstreamRequest>,
    /// All handles dropped; nothing more will be queued.
    rx_closed: bool,
    /// Request taken from the queue whose send failed; retried first.
    pending: Option<UpstreamRequest>,
    connected: Arc<AtomicBool>,
}

impl UpstreamClient {
    pub fn new(name: impl Into<String>, config: NodeConfig) -> (Self, UpstreamHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let client = Self {
            name: name.into(),
            config,
            rx,
            rx_closed: false,
            pending: None,
            connected: connected.clone(),
        };
        (client, UpstreamHandle { tx, connected })
    }

    /// Run the connection loop on a background task.
    pub fn spawn<H: UpstreamHandler>(
        self,
        handler: Arc<H>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run(handler, shutdown))
    }

    /// Connect, serve and reconnect until shutdown or `max_retries`
    /// consecutive failed attempts.
    pub async fn run<H: UpstreamHandler>(
        mut self,
        handler: Arc<H>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut backoff = Backoff::new(
            self.config.min_reconnect_delay_ms,
            self.config.max_reconnect_delay_ms,
        );
        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            let attempt = tokio::time::timeout(
                Duration::from_millis(self.config.connection_timeout_ms),
                tokio_tungstenite::connect_async(self.config.ws_address.as_str()),
            );
            let connected = tokio::select! {
                res = attempt => match res {
                    Ok(Ok((stream, _))) => Ok(stream),
                    Ok(Err(e)) => Err(UpstreamError::from(e)),
                    Err(_) => Err(UpstreamError::Timeout { ms: self.config.connection_timeout_ms }),
                },
                _ = shutdown.changed() => return Ok(()),
            };

            match connected {
                Ok(stream) => {
                    failures = 0;
                    backoff.reset();
                    info!(upstream = %self.name, address = %self.config.ws_address, "connected to node");
                    self.connected.store(true, Ordering::Relaxed);
                    let end = self.session(stream, handler.as_ref(), &mut shutdown).await;
                    self.connected.store(false, Ordering::Relaxed);
                    match end {
                        SessionEnd::Shutdown => {
                            info!(upstream = %self.name, "upstream client stopped");
                            return Ok(());
                        }
                        SessionEnd::Lost(err) => {
                            if let Some(e) = err {
                                handler.on_error(&e);
                            }
                            info!(upstream = %self.name, "connection to node lost, reconnecting");
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    if e.is_unavailable() {
                        debug!(upstream = %self.name, attempt = failures, error = %e, "node unavailable");
                    } else {
                        handler.on_error(&e);
                    }
                    if failures >= self.config.max_retries {
                        error!(upstream = %self.name, attempts = failures, "giving up on node connection");
                        return Err(UpstreamError::RetriesExhausted { attempts: failures });
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff.next_delay()) => {}
                _ = shutdown.changed() => return Ok(()),
            }
        }
    }

    async fn session<H: UpstreamHandler>(
        &mut self,
        stream: WsStream,
        handler: &H,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let (mut write, mut read) = stream.split();

        for request in handler.on_open() {
            if let Err(e) = send_request(&mut write, &request).await {
                return SessionEnd::Lost(Some(e));
            }
        }
        if let Some(request) = self.pending.take() {
            if let Err(e) = send_request(&mut write, &request).await {
                self.pending = Some(request);
                return SessionEnd::Lost(Some(e));
            }
        }

        loop {
            tokio::select! {
                outgoing = self.rx.recv(), if !self.rx_closed => match outgoing {
                    Some(request) => {
                        if let Err(e) = send_request(&mut write, &request).await {
                            self.pending = Some(request);
                            return SessionEnd::Lost(Some(e));
                        }
                    }
                    None => self.rx_closed = true,
                },

                incoming = read.next() => match incoming {
                    Some(Ok(Message::Text(text))) => handler.on_message(text.as_str()),
                    // tungstenite queues the pong for pings on its own
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Lost(None),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Lost(Some(e.into())),
                },

                _ = shutdown.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
            }
        }
    }
}

async fn send_request(write: &mut WsSink, request: &UpstreamRequest) -> Result<()> {
    let text = request.to_text()?;
    debug!(request = %text, "sending upstream request");
    write.send(Message::Text(text.into())).await?;
    Ok(())
}
