//! Assistant bridge
//!
//! Intercepts chat bodies carrying the trigger substring and turns them
//! into generation calls whose file-tree output mutates shared room
//! state. The human message always goes out first, exactly as typed
//! (trigger included — peers see the raw text); only the onward prompt
//! has the trigger stripped.
//!
//! The generation call runs on its own task: the room keeps processing
//! edits and chat while it is in flight, and the triggering client
//! disconnecting does not cancel it. If generation fails or times out,
//! nothing further is emitted — the human message already landed, and no
//! error is surfaced to any client.

use std::sync::Arc;

use crate::sync_server::context::ServerContext;
use crate::sync_server::protocol::ChatEvent;
use crate::sync_server::room::RoomContext;
use crate::session::Identity;

/// Literal substring that redirects a chat message to the assistant.
pub const ASSISTANT_TRIGGER: &str = "@ai";

/// Handle one inbound chat message for a room.
pub fn handle_chat(
    ctx: &Arc<ServerContext>,
    room: &Arc<RoomContext>,
    body: &str,
    sender: &Identity,
    from: &str,
) {
    let event = ChatEvent::human(body, sender);
    tracing::debug!(
        "room {}: chat from {} at {}",
        room.room_id,
        sender.email,
        event.timestamp
    );
    room.broadcast(&event.into_message(), Some(from));

    if !body.contains(ASSISTANT_TRIGGER) {
        return;
    }

    let prompt = body.replacen(ASSISTANT_TRIGGER, "", 1).trim().to_string();
    let ctx = Arc::clone(ctx);
    let room_id = room.room_id.clone();

    tokio::spawn(async move {
        let outcome = tokio::time::timeout(
            ctx.config.generation_timeout,
            ctx.generator.generate(&prompt),
        )
        .await;

        let output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::error!("room {}: generation failed: {}", room_id, e);
                return;
            }
            Err(_) => {
                tracing::error!(
                    "room {}: generation timed out after {:?}",
                    room_id,
                    ctx.config.generation_timeout
                );
                return;
            }
        };

        // The room may have emptied out and been evicted while the call
        // was in flight; the reply goes only to a room that still exists.
        let Some(room) = ctx.registry.get(&room_id) else {
            tracing::debug!("room {}: gone before generation resolved", room_id);
            return;
        };

        if let Some(fragment) = output.file_tree {
            let merged = room.merge_fragment(fragment);
            if merged > 0 {
                tracing::info!("room {}: assistant merged {} file(s)", room_id, merged);
                ctx.scheduler.schedule(&room);
            }
        }

        room.broadcast(&ChatEvent::assistant(output.text).into_message(), None);
    });
}
