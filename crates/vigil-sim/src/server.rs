//! Simulated detection feed server
//!
//! Binds a local WebSocket listener and broadcasts frames to every connected
//! client. Frames come from two places:
//! - an optional generator task that emits events from the configured agents
//!   at a fixed cadence, injecting heartbeats and malformed frames on request
//! - explicit [`FeedServer::push_frame`] / [`FeedServer::push_event`] calls
//!
//! [`FeedServer::close_clients`] ends every client stream with a chosen close
//! code, so abnormal disconnects can be exercised.

use std::net::SocketAddr;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};
use vigil_protocol::DetectionEvent;

use crate::agent::{default_fleet, SimulatedAgent, SimulatedAgentConfig};
use crate::error::SimError;

/// Frame sent when malformed-frame injection triggers
pub const MALFORMED_FRAME: &str = "{\"sourceId\": \"broken\", \"riskScore\": ";

/// Frame sent when heartbeat injection triggers
pub const HEARTBEAT_FRAME: &str = "{\"type\":\"heartbeat\"}";

/// Depth of the per-client frame backlog
const BROADCAST_CAPACITY: usize = 1024;

/// Feed server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedServerConfig {
    /// Listen address; port 0 picks a free port
    pub bind_addr: String,
    /// Generator cadence (ms); no generator if absent
    pub interval_ms: Option<u64>,
    /// Every Nth generated frame is malformed
    pub malformed_every: Option<u64>,
    /// Every Nth generated frame is a heartbeat
    pub heartbeat_every: Option<u64>,
    /// Agents driven by the generator, round robin
    pub agents: Vec<SimulatedAgentConfig>,
}

impl Default for FeedServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            interval_ms: None,
            malformed_every: None,
            heartbeat_every: None,
            agents: default_fleet(),
        }
    }
}

/// What the server sends to every client
#[derive(Debug, Clone)]
enum Outbound {
    Frame(String),
    Close { code: u16, reason: String },
}

/// A running feed server
#[derive(Debug)]
pub struct FeedServer {
    local_addr: SocketAddr,
    outbound_tx: broadcast::Sender<Outbound>,
    clients_rx: watch::Receiver<usize>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl FeedServer {
    /// Bind the listener and start accepting clients
    pub async fn bind(config: FeedServerConfig) -> Result<Self, SimError> {
        let agents = config
            .agents
            .iter()
            .cloned()
            .map(SimulatedAgent::new)
            .collect::<Result<Vec<_>, _>>()?;
        if config.interval_ms.is_some() && agents.is_empty() {
            return Err(SimError::InvalidConfig(
                "generator enabled without agents".into(),
            ));
        }

        let listener = TcpListener::bind(&config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        let (outbound_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (clients_tx, clients_rx) = watch::channel(0usize);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!("Feed server listening on {}", local_addr);
        let mut tasks = vec![tokio::spawn(accept_loop(
            listener,
            outbound_tx.clone(),
            clients_tx,
            shutdown_rx.clone(),
        ))];

        if let Some(ms) = config.interval_ms {
            let generator = Generator {
                agents,
                malformed_every: config.malformed_every.filter(|n| *n > 0),
                heartbeat_every: config.heartbeat_every.filter(|n| *n > 0),
                sequence: 0,
            };
            tasks.push(tokio::spawn(generator.run(
                Duration::from_millis(ms.max(1)),
                outbound_tx.clone(),
                shutdown_rx,
            )));
        }

        Ok(Self {
            local_addr,
            outbound_tx,
            clients_rx,
            shutdown_tx,
            tasks,
        })
    }

    /// Listening address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// WebSocket URL clients should connect to
    pub fn url(&self) -> String {
        format!("ws://{}/feed", self.local_addr)
    }

    /// Number of clients that completed the handshake
    pub fn client_count(&self) -> usize {
        *self.clients_rx.borrow()
    }

    /// Wait until at least `count` clients are connected
    pub async fn wait_for_clients(&self, count: usize) -> Result<(), SimError> {
        let mut rx = self.clients_rx.clone();
        rx.wait_for(|clients| *clients >= count)
            .await
            .map(|_| ())
            .map_err(|_| SimError::Stopped)
    }

    /// Send a raw text frame to every client
    ///
    /// Returns the number of clients it was queued for.
    pub fn push_frame(&self, text: impl Into<String>) -> usize {
        self.outbound_tx
            .send(Outbound::Frame(text.into()))
            .unwrap_or(0)
    }

    /// Serialize an event and send it to every client
    pub fn push_event(&self, event: &DetectionEvent) -> Result<usize, SimError> {
        let text = serde_json::to_string(event)?;
        Ok(self.push_frame(text))
    }

    /// Close every client stream with `code`
    pub fn close_clients(&self, code: u16, reason: impl Into<String>) -> usize {
        self.outbound_tx
            .send(Outbound::Close {
                code,
                reason: reason.into(),
            })
            .unwrap_or(0)
    }

    /// Stop accepting, close all clients and wait for the server tasks
    pub async fn shutdown(self) {
        self.shutdown_tx.send_replace(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Feed server task failed: {}", e);
            }
        }
        info!("Feed server on {} stopped", self.local_addr);
    }
}

async fn accept_loop(
    listener: TcpListener,
    outbound_tx: broadcast::Sender<Outbound>,
    clients_tx: watch::Sender<usize>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Feed client connecting from {}", peer);
                    // Subscribe before the handshake so no frame pushed after
                    // wait_for_clients is missed
                    let outbound_rx = outbound_tx.subscribe();
                    tokio::spawn(serve_client(
                        stream,
                        peer,
                        outbound_rx,
                        clients_tx.clone(),
                        shutdown_rx.clone(),
                    ));
                }
                Err(e) => warn!("Accept failed: {}", e),
            },
            _ = shutdown_rx.changed() => break,
        }
    }
}

async fn serve_client(
    stream: TcpStream,
    peer: SocketAddr,
    mut outbound_rx: broadcast::Receiver<Outbound>,
    clients_tx: watch::Sender<usize>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("Handshake with {} failed: {}", peer, e);
            return;
        }
    };
    clients_tx.send_modify(|count| *count += 1);
    info!("Feed client {} connected", peer);

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => match outbound {
                Ok(Outbound::Frame(text)) => {
                    if let Err(e) = ws.send(Message::Text(text)).await {
                        debug!("Send to {} failed: {}", peer, e);
                        break;
                    }
                }
                Ok(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    let _ = ws.close(Some(frame)).await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Feed client {} lagged, skipped {} frames", peer, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = ws.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
            _ = shutdown_rx.changed() => {
                let _ = ws.close(Some(CloseFrame {
                    code: CloseCode::Away,
                    reason: "server shutting down".into(),
                })).await;
                break;
            }
        }
    }

    clients_tx.send_modify(|count| *count = count.saturating_sub(1));
    info!("Feed client {} disconnected", peer);
}

/// Cadenced event source
struct Generator {
    agents: Vec<SimulatedAgent>,
    malformed_every: Option<u64>,
    heartbeat_every: Option<u64>,
    sequence: u64,
}

impl Generator {
    fn next_frame(&mut self) -> Option<String> {
        self.sequence += 1;
        if self.malformed_every.is_some_and(|n| self.sequence % n == 0) {
            return Some(MALFORMED_FRAME.to_string());
        }
        if self.heartbeat_every.is_some_and(|n| self.sequence % n == 0) {
            return Some(HEARTBEAT_FRAME.to_string());
        }

        let index = (self.sequence as usize) % self.agents.len().max(1);
        let agent = self.agents.get_mut(index)?;
        let event = agent.next_event(Utc::now());
        match serde_json::to_string(&event) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Failed to encode simulated event: {}", e);
                None
            }
        }
    }

    async fn run(
        mut self,
        period: Duration,
        outbound_tx: broadcast::Sender<Outbound>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "Simulating {} agents every {:?}",
            self.agents.len(),
            period
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(frame) = self.next_frame() {
                        // No clients is fine
                        let _ = outbound_tx.send(Outbound::Frame(frame));
                    }
                }
                _ = shutdown_rx.changed() => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(malformed: Option<u64>, heartbeat: Option<u64>) -> Generator {
        let agents = vec![
            SimulatedAgent::new(SimulatedAgentConfig {
                seed: Some(1),
                ..SimulatedAgentConfig::named("a")
            })
            .unwrap(),
            SimulatedAgent::new(SimulatedAgentConfig {
                seed: Some(2),
                ..SimulatedAgentConfig::named("b")
            })
            .unwrap(),
        ];
        Generator {
            agents,
            malformed_every: malformed,
            heartbeat_every: heartbeat,
            sequence: 0,
        }
    }

    #[test]
    fn test_generator_injects_on_schedule() {
        let mut generator = generator(Some(3), Some(4));
        let frames: Vec<String> = (0..12).filter_map(|_| generator.next_frame()).collect();
        assert_eq!(frames.len(), 12);
        assert_eq!(frames[2], MALFORMED_FRAME);
        assert_eq!(frames[3], HEARTBEAT_FRAME);
        assert_eq!(frames[5], MALFORMED_FRAME);
        // Malformed wins when both trigger
        assert_eq!(frames[11], MALFORMED_FRAME);
        assert!(frames[0].contains("\"sourceId\":\"b\""));
        assert!(frames[1].contains("\"sourceId\":\"a\""));
    }

    #[test]
    fn test_generated_frames_decode() {
        let mut generator = generator(None, None);
        for _ in 0..20 {
            let frame = generator.next_frame().unwrap();
            let decoded = vigil_protocol::decode_frame(&frame).unwrap();
            assert!(decoded.into_event().is_some());
        }
    }

    #[tokio::test]
    async fn test_bind_rejects_generator_without_agents() {
        let config = FeedServerConfig {
            interval_ms: Some(10),
            agents: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(
            FeedServer::bind(config).await,
            Err(SimError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_push_without_clients_reaches_nobody() {
        let server = FeedServer::bind(FeedServerConfig::default()).await.unwrap();
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        assert_eq!(server.client_count(), 0);
        assert_eq!(server.push_frame(HEARTBEAT_FRAME), 0);
        server.shutdown().await;
    }
}
