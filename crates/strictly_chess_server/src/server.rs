//! WebSocket endpoint.
//!
//! Each socket gets a [`ChannelTransport`]: a writer task drains its queue
//! into the socket while the reader loop hands text frames to the
//! [`SessionHandler`] one at a time, so a client's commands apply in the
//! order it sent them. Other sockets run on their own tasks.

use crate::config::ServerConfig;
use crate::handler::SessionHandler;
use crate::transport::{ChannelTransport, Transport};
use axum::{
    Router,
    body::Body,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::Request,
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::{debug, info, instrument, warn};

/// State shared by every request.
#[derive(Debug, Clone)]
pub struct AppState {
    handler: Arc<SessionHandler>,
    outbound_capacity: usize,
}

impl AppState {
    /// Bundles the handler with the per-client queue size.
    pub fn new(handler: Arc<SessionHandler>, outbound_capacity: usize) -> Self {
        Self {
            handler,
            outbound_capacity,
        }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .layer(ServiceBuilder::new().map_request(|req: Request<Body>| {
            info!(
                method = %req.method(),
                uri = %req.uri(),
                "Incoming HTTP request"
            );
            req
        }))
        .with_state(state)
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[instrument(skip_all)]
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (transport, mut outbound) = ChannelTransport::new(state.outbound_capacity);
    let transport: Arc<dyn Transport> = Arc::new(transport);
    let connection = transport.id();
    info!(%connection, "Client connected");

    let writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                debug!(%connection, error = %e, "Socket write failed");
                break;
            }
        }
    });

    read_frames(&mut stream, &state.handler, &transport).await;

    writer.abort();
    info!(%connection, "Client disconnected");
}

/// Feeds text frames to the handler in arrival order until the peer closes
/// or the stream fails.
async fn read_frames<S, E>(frames: &mut S, handler: &SessionHandler, transport: &Arc<dyn Transport>)
where
    S: futures::Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    let connection = transport.id();
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if let Err(e) = handler.handle_message(transport, text.as_str()).await {
                    debug!(%connection, error = %e, "Command failed");
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(%connection, error = %e, "Socket read failed");
                break;
            }
        }
    }
}

/// Serves `handler` until ctrl-c, then drops every registered connection.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
#[instrument(skip_all, fields(address = %config.bind_address()))]
pub async fn serve(config: &ServerConfig, handler: Arc<SessionHandler>) -> anyhow::Result<()> {
    let state = AppState::new(Arc::clone(&handler), *config.outbound_queue_capacity());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!("Server ready at ws://{}/ws", config.bind_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown requested"),
                Err(e) => {
                    warn!(error = %e, "Failed to listen for ctrl-c, running until killed");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await?;

    handler.registry().clear();
    info!("Server stopped");
    Ok(())
}
