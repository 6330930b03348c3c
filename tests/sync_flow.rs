//! Integration tests for coedit-engine
//!
//! These tests verify end-to-end behavior across modules.
//!
//! ## Test Tiers
//!
//! - **Tier 1: Unit** - Individual functions, mocked collaborators (in src/*.rs)
//! - **Tier 2: Component** - Admission + rooms + sync + assistant wired
//!   through a fresh `ServerContext` per test (this file, `scenarios`)
//! - **Tier 3: End-to-end** - Real WebSocket connections against a
//!   listening daemon loop (this file, `e2e`)
//!
//! ```bash
//! cargo test --test sync_flow
//! cargo test --test sync_flow scenarios
//! cargo test --test sync_flow e2e
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use tokio::sync::mpsc;

use coedit_engine::error::GenerateError;
use coedit_engine::generate::{GenerationOutput, Generator};
use coedit_engine::session::{Claims, SessionVerifier};
use coedit_engine::store::{FileNode, FileTree, MemoryStore, Project, ProjectId, ProjectStore};
use coedit_engine::sync_server::protocol::ServerMessage;
use coedit_engine::sync_server::{ServerContext, SyncConfig};

const SECRET: &str = "integration-secret";
const PROJECT_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaa";
const PROJECT_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbb";
const USER_1: &str = "111111111111111111111111";
const USER_2: &str = "222222222222222222222222";

struct ScriptedGenerator(Result<GenerationOutput, GenerateError>);

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<GenerationOutput, GenerateError> {
        self.0.clone()
    }
}

fn token_for(user_id: &str, email: &str) -> String {
    let claims = Claims {
        user_id: user_id.to_string(),
        email: email.to_string(),
        iat: 0,
        exp: i64::MAX,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for id in [PROJECT_A, PROJECT_B] {
        store.insert(Project {
            id: ProjectId::parse(id).unwrap(),
            name: format!("project-{id}"),
            file_tree: FileTree::new(),
            member_ids: HashSet::from([USER_1.to_string(), USER_2.to_string()]),
        });
    }
    store
}

fn context(generator: Arc<dyn Generator>) -> Arc<ServerContext> {
    Arc::new(ServerContext::new(
        seeded_store(),
        SessionVerifier::new(SECRET),
        generator,
        SyncConfig {
            generation_timeout: Duration::from_millis(500),
            checkpoint_delay: Duration::from_millis(10),
        },
    ))
}

fn assistant_reply() -> GenerationOutput {
    let mut tree = FileTree::new();
    tree.insert("server.js".to_string(), FileNode::new("// generated"));
    GenerationOutput {
        text: "scaffolded an http server".to_string(),
        file_tree: Some(tree),
    }
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("member channel closed")
}

mod scenarios {
    use super::*;
    use coedit_engine::error::AdmissionError;
    use coedit_engine::sync_server::{admit, assistant, file_sync, Handshake};

    fn handshake(query: &str, headers: &[(&str, &str)]) -> Handshake {
        Handshake::new(
            Some(query),
            headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    /// Scenario A: C1 and C2 in the same project; C1 edits, C2 receives
    /// the echo, C1 receives nothing.
    #[tokio::test]
    async fn scenario_a_edit_echo() {
        let ctx = context(Arc::new(ScriptedGenerator(Ok(assistant_reply()))));
        let project = ProjectId::parse(PROJECT_A).unwrap();

        // Both connections admitted through the gateway first.
        let cookie1 = format!("token={}", token_for(USER_1, "c1@example.com"));
        let cookie2 = format!("token={}", token_for(USER_2, "c2@example.com"));
        let a1 = admit(
            &handshake(&format!("projectId={PROJECT_A}"), &[("cookie", &cookie1)]),
            ctx.store.as_ref(),
            &ctx.verifier,
        )
        .await
        .unwrap();
        let _a2 = admit(
            &handshake(&format!("projectId={PROJECT_A}"), &[("cookie", &cookie2)]),
            ctx.store.as_ref(),
            &ctx.verifier,
        )
        .await
        .unwrap();

        let room = ctx.registry.get_or_create(&project, FileTree::new);
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        room.join("c1".to_string(), tx1);
        room.join("c2".to_string(), tx2);

        room.apply_edit("a.js", "x=1", &a1.identity, "c1");

        match recv(&mut rx2).await {
            ServerMessage::FileUpdate {
                path,
                contents,
                sender_email,
            } => {
                assert_eq!(path, "a.js");
                assert_eq!(contents, "x=1");
                assert_eq!(sender_email, "c1@example.com");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(rx1.try_recv().is_err());
    }

    /// Scenario B: a triggered chat reaches peers verbatim, every member
    /// including the sender gets exactly one assistant reply, and the
    /// returned fragment lands in the room tree.
    #[tokio::test]
    async fn scenario_b_assistant_trigger() {
        let ctx = context(Arc::new(ScriptedGenerator(Ok(assistant_reply()))));
        let project = ProjectId::parse(PROJECT_A).unwrap();
        let room = ctx.registry.get_or_create(&project, FileTree::new);

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        room.join("c1".to_string(), tx1);
        room.join("c2".to_string(), tx2);

        let identity = coedit_engine::session::Identity {
            user_id: USER_1.to_string(),
            email: "c1@example.com".to_string(),
            issued_at: 0,
            expires_at: i64::MAX,
        };
        assistant::handle_chat(&ctx, &room, "@ai make an http server", &identity, "c1");

        match recv(&mut rx2).await {
            ServerMessage::ChatBroadcast { body, .. } => {
                assert_eq!(body, "@ai make an http server");
            }
            other => panic!("unexpected event {other:?}"),
        }

        for rx in [&mut rx1, &mut rx2] {
            match recv(rx).await {
                ServerMessage::AssistantReply { result, sender } => {
                    assert_eq!(result, "scaffolded an http server");
                    assert_eq!(sender, "assistant");
                }
                other => panic!("unexpected event {other:?}"),
            }
            assert!(rx.try_recv().is_err());
        }

        assert_eq!(room.snapshot_tree()["server.js"].contents, "// generated");
    }

    /// Scenario C: no credential -> rejected with Unauthenticated before
    /// any join; no broadcast-capable state is created.
    #[tokio::test]
    async fn scenario_c_unauthenticated_rejected() {
        let ctx = context(Arc::new(ScriptedGenerator(Ok(assistant_reply()))));
        let hs = handshake(&format!("projectId={PROJECT_A}"), &[]);

        let err = admit(&hs, ctx.store.as_ref(), &ctx.verifier)
            .await
            .unwrap_err();
        assert_eq!(err, AdmissionError::Unauthenticated);
        assert_eq!(ctx.registry.room_count(), 0);
    }

    /// Scenario D: generation fails; the human broadcast already landed
    /// and no assistant-reply is ever emitted.
    #[tokio::test]
    async fn scenario_d_generation_failure() {
        let ctx = context(Arc::new(ScriptedGenerator(Err(GenerateError::Request(
            "upstream 500".to_string(),
        )))));
        let project = ProjectId::parse(PROJECT_A).unwrap();
        let room = ctx.registry.get_or_create(&project, FileTree::new);

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        room.join("c1".to_string(), tx1);
        room.join("c2".to_string(), tx2);

        let identity = coedit_engine::session::Identity {
            user_id: USER_1.to_string(),
            email: "c1@example.com".to_string(),
            issued_at: 0,
            expires_at: i64::MAX,
        };
        assistant::handle_chat(&ctx, &room, "@ai do it", &identity, "c1");

        assert!(matches!(
            recv(&mut rx2).await,
            ServerMessage::ChatBroadcast { .. }
        ));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_err());
    }

    /// Events broadcast in room A are never observed in room B.
    #[tokio::test]
    async fn room_isolation() {
        let ctx = context(Arc::new(ScriptedGenerator(Ok(assistant_reply()))));
        let room_a = ctx
            .registry
            .get_or_create(&ProjectId::parse(PROJECT_A).unwrap(), FileTree::new);
        let room_b = ctx
            .registry
            .get_or_create(&ProjectId::parse(PROJECT_B).unwrap(), FileTree::new);

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        room_a.join("ca".to_string(), tx_a);
        room_b.join("cb".to_string(), tx_b);

        let identity = coedit_engine::session::Identity {
            user_id: USER_1.to_string(),
            email: "c1@example.com".to_string(),
            issued_at: 0,
            expires_at: i64::MAX,
        };
        room_a.apply_edit("a.js", "x=1", &identity, "other");

        assert!(rx_a.try_recv().is_ok());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx_b.try_recv().is_err());
    }

    /// Two edits to the same path: the one received second wins,
    /// regardless of origin, and a checkpoint captures it durably.
    #[tokio::test]
    async fn last_received_wins_then_checkpoint() {
        let ctx = context(Arc::new(ScriptedGenerator(Ok(assistant_reply()))));
        let project = ProjectId::parse(PROJECT_A).unwrap();
        let room = ctx.registry.get_or_create(&project, FileTree::new);

        let c1 = coedit_engine::session::Identity {
            user_id: USER_1.to_string(),
            email: "c1@example.com".to_string(),
            issued_at: 0,
            expires_at: i64::MAX,
        };
        let c2 = coedit_engine::session::Identity {
            user_id: USER_2.to_string(),
            email: "c2@example.com".to_string(),
            issued_at: 0,
            expires_at: i64::MAX,
        };

        room.apply_edit("a.js", "from c1", &c1, "c1");
        room.apply_edit("a.js", "from c2", &c2, "c2");
        assert_eq!(room.snapshot_tree()["a.js"].contents, "from c2");

        // Round-trip: checkpoint(T) then lookup yields T unchanged.
        let snapshot = room.snapshot_tree();
        file_sync::checkpoint(ctx.store.as_ref(), &project, &snapshot)
            .await
            .unwrap();
        let stored = ctx.store.lookup_project(&project).await.unwrap();
        assert_eq!(stored.file_tree, snapshot);
    }
}

mod e2e {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type ClientSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

    /// Bind a daemon accept loop on an ephemeral port.
    async fn spawn_daemon(ctx: Arc<ServerContext>) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let ctx = Arc::clone(&ctx);
                tokio::spawn(coedit_engine::sync_server::handle_connection(stream, ctx));
            }
        });
        addr
    }

    async fn connect(
        addr: std::net::SocketAddr,
        project: &str,
        cookie: Option<&str>,
    ) -> ClientSocket {
        let mut request = format!("ws://{addr}/socket?projectId={project}")
            .into_client_request()
            .unwrap();
        if let Some(cookie) = cookie {
            request
                .headers_mut()
                .insert("Cookie", cookie.parse().unwrap());
        }
        let (socket, _) = connect_async(request).await.unwrap();
        socket
    }

    async fn next_json(socket: &mut ClientSocket) -> serde_json::Value {
        let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("socket error");
        match frame {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn edit_fans_out_over_real_sockets() {
        let ctx = context(Arc::new(ScriptedGenerator(Ok(assistant_reply()))));
        let addr = spawn_daemon(Arc::clone(&ctx)).await;

        let cookie1 = format!("token={}", token_for(USER_1, "c1@example.com"));
        let cookie2 = format!("token={}", token_for(USER_2, "c2@example.com"));
        let mut c1 = connect(addr, PROJECT_A, Some(&cookie1)).await;
        let mut c2 = connect(addr, PROJECT_A, Some(&cookie2)).await;

        // Admission runs after the upgrade completes; give both
        // connections a beat to join the room before broadcasting.
        tokio::time::sleep(Duration::from_millis(200)).await;

        c1.send(Message::Text(
            r#"{"type":"file-update","path":"a.js","contents":"x=1"}"#.to_string(),
        ))
        .await
        .unwrap();

        let event = next_json(&mut c2).await;
        assert_eq!(event["type"], "file-update");
        assert_eq!(event["path"], "a.js");
        assert_eq!(event["contents"], "x=1");
        assert_eq!(event["senderEmail"], "c1@example.com");

        // The sender never receives its own echo.
        let echo = tokio::time::timeout(Duration::from_millis(300), c1.next()).await;
        assert!(echo.is_err(), "sender received its own echo: {echo:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unauthenticated_connection_is_closed() {
        let ctx = context(Arc::new(ScriptedGenerator(Ok(assistant_reply()))));
        let addr = spawn_daemon(Arc::clone(&ctx)).await;

        let mut socket = connect(addr, PROJECT_A, None).await;

        // The server closes before any join; the next frame is a close
        // (or the stream just ends).
        let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for close");
        match frame {
            Some(Ok(Message::Close(_))) | None => {}
            other => panic!("expected close, got {other:?}"),
        }
        assert_eq!(ctx.registry.room_count(), 0);
    }
}
