//! WebSocket connection handler
//!
//! One task per connection: capture the upgrade request, run admission,
//! join the project room, then pump frames until the peer goes away.
//! Inbound frames are parsed at this boundary; a malformed event is
//! dropped and logged without closing the connection, while a rejected
//! admission closes the socket before any room state exists for it.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

use crate::session::Identity;
use crate::sync_server::context::ServerContext;
use crate::sync_server::gateway::{self, Admission, Handshake};
use crate::sync_server::protocol::{parse_client_message, ClientMessage, ServerMessage};
use crate::sync_server::room::{next_connection_id, ConnectionId, RoomContext};
use crate::sync_server::{assistant, file_sync};

/// Handle a single WebSocket connection
pub async fn handle_connection(stream: TcpStream, ctx: Arc<ServerContext>) {
    let addr = stream.peer_addr().ok();
    tracing::info!("New connection from {:?}", addr);

    // Capture the upgrade request for admission while accepting the
    // WebSocket handshake.
    let mut handshake = Handshake::default();
    let callback = |req: &Request, response: Response| {
        let headers = req
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_ascii_lowercase(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        handshake = Handshake::new(req.uri().query(), headers);
        Ok(response)
    };

    let mut ws_stream = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::error!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    // Admission is terminal on failure: close before any room join, so
    // no broadcast-capable state ever exists for a rejected connection.
    let admission = match gateway::admit(&handshake, ctx.store.as_ref(), &ctx.verifier).await {
        Ok(admission) => admission,
        Err(e) => {
            tracing::warn!("Connection from {:?} rejected: {}", addr, e);
            let _ = ws_stream
                .close(Some(CloseFrame {
                    code: CloseCode::Policy,
                    reason: e.to_string().into(),
                }))
                .await;
            return;
        }
    };

    let mut conn = ConnectionState::new(ws_stream, ctx, admission);
    conn.run().await;

    tracing::info!("Connection closed from {:?}", addr);
}

/// State for a single admitted connection
struct ConnectionState {
    ws: WebSocketStream<TcpStream>,
    ctx: Arc<ServerContext>,
    conn_id: ConnectionId,
    identity: Identity,
    room: Arc<RoomContext>,
    outbound_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl ConnectionState {
    fn new(ws: WebSocketStream<TcpStream>, ctx: Arc<ServerContext>, admission: Admission) -> Self {
        let Admission { identity, project } = admission;
        let conn_id = next_connection_id();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        // Lazily open the room, seeding its canonical tree from the
        // project record read at admission.
        let room = ctx
            .registry
            .get_or_create(&project.id, || project.file_tree.clone());
        room.join(conn_id.clone(), outbound_tx);
        tracing::info!(
            "Client {} ({}) joined room {}",
            conn_id,
            identity.email,
            project.id
        );

        Self {
            ws,
            ctx,
            conn_id,
            identity,
            room,
            outbound_rx,
        }
    }

    async fn run(&mut self) {
        loop {
            tokio::select! {
                // Inbound WebSocket frames
                msg = self.ws.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_message(&text).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Client {} requested close", self.conn_id);
                            break;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = self.ws.send(Message::Pong(data)).await;
                        }
                        Some(Err(e)) => {
                            tracing::error!("WebSocket error on {}: {}", self.conn_id, e);
                            break;
                        }
                        None => break,
                        _ => {}
                    }
                }

                // Events fanned out to this member by its room
                outbound = self.outbound_rx.recv() => {
                    match outbound {
                        Some(event) => {
                            if let Err(e) = self.send(&event).await {
                                tracing::error!("Send to {} failed: {}", self.conn_id, e);
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        self.cleanup();
    }

    async fn handle_message(&mut self, text: &str) {
        let msg = match parse_client_message(text) {
            Ok(msg) => msg,
            Err(e) => {
                // Drop the offending event; the connection stays open.
                tracing::warn!("Client {}: dropped event: {}", self.conn_id, e);
                return;
            }
        };

        match msg {
            ClientMessage::FileUpdate { path, contents } => {
                self.room
                    .apply_edit(&path, &contents, &self.identity, &self.conn_id);
            }

            ClientMessage::FileDelete { path } => {
                self.room.apply_delete(&path, &self.identity, &self.conn_id);
            }

            ClientMessage::ChatMessage { body } => {
                assistant::handle_chat(&self.ctx, &self.room, &body, &self.identity, &self.conn_id);
            }

            ClientMessage::Checkpoint { file_tree } => {
                if let Err(e) = file_sync::checkpoint(
                    self.ctx.store.as_ref(),
                    &self.room.room_id,
                    &file_tree,
                )
                .await
                {
                    // Live state is unaffected; the durable copy stays
                    // stale until the next checkpoint.
                    tracing::error!(
                        "Checkpoint from {} for room {} failed: {}",
                        self.conn_id,
                        self.room.room_id,
                        e
                    );
                }
            }
        }
    }

    async fn send(&mut self, event: &ServerMessage) -> anyhow::Result<()> {
        let json = serde_json::to_string(event)?;
        self.ws.send(Message::Text(json)).await?;
        Ok(())
    }

    fn cleanup(&mut self) {
        self.ctx.registry.leave(&self.room.room_id, &self.conn_id);
        tracing::info!(
            "Client {} left room {}",
            self.conn_id,
            self.room.room_id
        );
    }
}
