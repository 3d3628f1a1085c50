//! Websocket front end: accepts connections, routes them by path and pumps
//! frames between the socket and a session.
//!
//! Every connection gets two halves. A writer task drains the session's
//! outbound queue into the socket; the connection task itself reads frames
//! and hands text to the session. When the client goes away the session is
//! closed, which removes it from its groups and lets the writer drain and exit.

use crate::auth::ControlPolicy;
use crate::config::ServerConfig;
use crate::directory::ScenarioDirectory;
use crate::error::Result;
use crate::hub::{encode, Hub};
use crate::registry::Registry;
use crate::session::{MonitorSession, ScenarioSession};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use sim_shared::{ScenarioId, ServerEvent};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, StatusCode};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use url::form_urlencoded;

type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Stream addressed by a connection's request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `/ws/simulation/<id>/`
    Scenario(ScenarioId),
    /// `/ws/simulations/monitor/`
    Monitor,
}

impl Route {
    pub fn parse(path: &str) -> Option<Route> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match segments.as_slice() {
            ["ws", "simulation", id] => id.parse().ok().map(Route::Scenario),
            ["ws", "simulations", "monitor"] => Some(Route::Monitor),
            _ => None,
        }
    }
}

/// Bearer token from the `Authorization` header, else from a `token` query parameter.
pub fn request_token(request: &Request) -> Option<String> {
    let from_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    from_header.or_else(|| request.uri().query().and_then(token_from_query))
}

fn token_from_query(query: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

fn reject(status: StatusCode, message: String) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(message));
    *response.status_mut() = status;
    response
}

pub struct SimServer {
    listener: TcpListener,
    registry: Arc<Registry>,
    policy: Arc<ControlPolicy>,
}

impl SimServer {
    pub async fn bind(config: &ServerConfig, directory: Arc<dyn ScenarioDirectory>) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        info!("Simulation server listening on {}", listener.local_addr()?);

        let registry = Arc::new(Registry::new(directory, Arc::new(Hub::new()), config.tick));
        Ok(Self {
            listener,
            registry,
            policy: Arc::new(config.control_policy()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Accepts connections until the task is dropped.
    pub async fn run(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let registry = Arc::clone(&self.registry);
                    let policy = Arc::clone(&self.policy);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, registry, policy).await {
                            warn!("Connection from {} ended with error: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<Registry>,
    policy: Arc<ControlPolicy>,
) -> Result<()> {
    let mut target = None;
    let ws = accept_hdr_async(stream, |request: &Request, response: Response| {
        let path = request.uri().path();
        match Route::parse(path) {
            Some(route) => {
                target = Some((route, request_token(request)));
                Ok(response)
            }
            None => Err(reject(StatusCode::NOT_FOUND, format!("No stream at {}", path))),
        }
    })
    .await?;

    let Some((route, token)) = target else {
        return Ok(());
    };
    info!("Client {} connected to {:?}", addr, route);

    let (mut sink, mut source) = ws.split();
    let (session_id, tx, mut rx) = registry.hub().open_session();

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if let Err(e) = sink.send(Message::text(text.to_string())).await {
                debug!("Send to {} failed: {}", addr, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    match route {
        Route::Scenario(scenario_id) => {
            let opened = ScenarioSession::open(
                Arc::clone(&registry),
                &policy,
                scenario_id,
                token.as_deref(),
                session_id,
                tx.clone(),
            )
            .await;

            match opened {
                Ok(session) => {
                    while let Some(text) = next_text(&mut source, addr).await {
                        session.handle_text(&text).await;
                    }
                    session.close().await;
                }
                Err(e) => {
                    error!("Could not open scenario {} for {}: {}", scenario_id, addr, e);
                    let _ = tx.send(encode(&ServerEvent::error(e.to_string()))?);
                }
            }
        }
        Route::Monitor => {
            let session = MonitorSession::open(&registry, session_id, tx.clone()).await?;
            // the monitor stream is receive-only
            while next_text(&mut source, addr).await.is_some() {}
            session.close().await;
        }
    }

    drop(tx);
    let _ = writer.await;
    info!("Client {} disconnected", addr);
    Ok(())
}

/// Next text frame, or `None` once the client closed or the socket failed.
async fn next_text(source: &mut WsSource, addr: SocketAddr) -> Option<String> {
    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => return Some(text.as_str().to_owned()),
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(e) => {
                debug!("Read from {} failed: {}", addr, e);
                return None;
            }
        }
    }
    None
}
