use std::sync::Arc;

use serde::Serialize;
use socketioxide::extract::{Data, SocketRef};
use uuid::Uuid;

use crate::services;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

fn get_user_id(socket: &SocketRef) -> Option<Uuid> {
    socket.extensions.get::<Uuid>()
}

pub async fn on_connect_with_state(socket: SocketRef, state: Arc<AppState>) {
    let user_id = match authenticate_socket(&socket, &state) {
        Ok(id) => id,
        Err(msg) => {
            tracing::warn!(error = %msg, "messaging socket auth failed");
            let _ = socket.emit(
                "error",
                &ErrorPayload {
                    code: "AUTH_FAILED".into(),
                    message: msg,
                },
            );
            socket.disconnect().ok();
            return;
        }
    };

    // Store user_id in socket extensions
    socket.extensions.insert(user_id);

    // Join user-specific room so pushes reach this user
    let user_room = format!("user:{user_id}");
    socket.join(user_room).ok();

    tracing::info!(user_id = %user_id, sid = %socket.id, "messaging socket connected");

    // Presence keys with TTL; heartbeats refresh them
    let _ = state.redis.set(&format!("online:msg:{user_id}"), "1", 120).await;
    let _ = state.redis.set(&format!("online:{user_id}"), "1", 120).await;

    let _ = socket.emit("connected", &serde_json::json!({ "user_id": user_id }));

    // Typing indicator relay
    socket.on("typing-start", {
        let state = state.clone();
        move |socket: SocketRef, Data::<serde_json::Value>(payload)| {
            let state = state.clone();
            async move { relay_typing(socket, payload, &state, true).await; }
        }
    });

    socket.on("typing-stop", {
        let state = state.clone();
        move |socket: SocketRef, Data::<serde_json::Value>(payload)| {
            let state = state.clone();
            async move { relay_typing(socket, payload, &state, false).await; }
        }
    });

    // Heartbeat handler - refresh presence TTL
    socket.on("heartbeat", {
        let state = state.clone();
        move |socket: SocketRef| {
            let state = state.clone();
            async move {
                if let Some(user_id) = get_user_id(&socket) {
                    let _ = state.redis.set(&format!("online:msg:{user_id}"), "1", 120).await;
                    let _ = state.redis.set(&format!("online:{user_id}"), "1", 120).await;
                }
            }
        }
    });

    // Disconnect handler for presence cleanup
    socket.on_disconnect({
        let state = state.clone();
        move |socket: SocketRef| {
            let state = state.clone();
            async move {
                on_disconnect_with_state(socket, state).await;
            }
        }
    });
}

async fn on_disconnect_with_state(socket: SocketRef, state: Arc<AppState>) {
    let user_id = match get_user_id(&socket) {
        Some(id) => id,
        None => return,
    };

    tracing::info!(user_id = %user_id, sid = %socket.id, "messaging socket disconnected");

    let _ = state.redis.del(&format!("online:msg:{user_id}")).await;
    let _ = state.redis.del(&format!("online:{user_id}")).await;
}

/// Relay a typing indicator to the other members of a conversation the
/// sender belongs to. Drops silently on any failure.
async fn relay_typing(socket: SocketRef, payload: serde_json::Value, state: &Arc<AppState>, typing: bool) {
    let user_id = match get_user_id(&socket) {
        Some(id) => id,
        None => return,
    };

    let conversation_id = match payload
        .get("conversation_id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
    {
        Some(id) => id,
        None => {
            tracing::warn!("typing event missing conversation_id");
            return;
        }
    };

    let mut conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "failed to get db connection for typing relay");
            return;
        }
    };

    if services::conversations::require_member(&mut conn, conversation_id, user_id).is_err() {
        return;
    }

    let member_ids = match services::conversations::member_ids(&mut conn, conversation_id) {
        Ok(ids) => ids,
        Err(_) => return,
    };

    let event_payload = serde_json::json!({
        "conversation_id": conversation_id,
        "user_id": user_id,
        "typing": typing,
    });

    for member_id in member_ids {
        if member_id != user_id {
            state.notifier.notify(member_id, "typing", &event_payload);
        }
    }
}

fn authenticate_socket(socket: &SocketRef, state: &Arc<AppState>) -> Result<Uuid, String> {
    let connect_info = socket.req_parts();

    // Extract token from query string ?token=xxx
    let query = connect_info.uri.query().unwrap_or_default();
    let token = query
        .split('&')
        .find_map(|pair| {
            let mut split = pair.splitn(2, '=');
            let key = split.next()?;
            let value = split.next()?;
            if key == "token" {
                Some(value.to_string())
            } else {
                None
            }
        })
        .ok_or_else(|| "missing token query parameter".to_string())?;

    // Validate JWT
    let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.validate_exp = true;

    let token_data = jsonwebtoken::decode::<harbor_shared::types::auth::Claims>(
        &token,
        &jsonwebtoken::DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| format!("invalid token: {e}"))?;

    if token_data.claims.is_expired() {
        return Err("token has expired".into());
    }

    Ok(token_data.claims.sub)
}
