use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use harbor_shared::errors::{AppError, AppResult, ErrorCode};
use harbor_shared::types::api::ApiResponse;
use harbor_shared::types::auth::AuthUser;
use harbor_shared::types::pagination::CursorPage;

use crate::events::publisher;
use crate::models::{Conversation, Message};
use crate::services;
use crate::validation;
use crate::AppState;

// --- Request DTOs ---

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    pub content: Option<String>,
    #[validate(url(message = "media url must be a valid url"))]
    pub media_url: Option<String>,
    pub media_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct SeenResponse {
    pub conversation_id: Uuid,
    pub seen_messages: usize,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub total_unread: i64,
}

// --- Helpers ---

fn push_payload(conversation: &Conversation, message: &Message) -> serde_json::Value {
    serde_json::json!({
        "conversation_id": conversation.id,
        "is_group": conversation.is_group,
        "name": conversation.name,
        "message": {
            "id": message.id,
            "conversation_id": message.conversation_id,
            "sender_id": message.sender_id,
            "content": message.content,
            "media_url": message.media_url,
            "media_type": message.media_type,
            "status": message.status,
            "created_at": message.created_at,
        }
    })
}

/// Individual conversations re-check the block relation on every send;
/// group conversations deliberately do not.
async fn check_dm_block(
    state: &AppState,
    conn: &mut diesel::pg::PgConnection,
    conversation: &Conversation,
    sender_id: Uuid,
) -> AppResult<()> {
    if conversation.is_group {
        return Ok(());
    }

    let partner = services::conversations::member_ids(conn, conversation.id)?
        .into_iter()
        .find(|id| *id != sender_id);

    if let Some(partner) = partner {
        if state.users.blocked_between(sender_id, partner).await? {
            return Err(AppError::new(
                ErrorCode::UserBlocked,
                "you cannot message this user (blocked)",
            ));
        }
    }

    Ok(())
}

/// Shared tail of the two send paths: persist, publish, push.
async fn deliver(
    state: &AppState,
    conn: &mut diesel::pg::PgConnection,
    conversation: &Conversation,
    sender_id: Uuid,
    content: Option<String>,
    media_url: Option<String>,
    media_type: Option<String>,
) -> AppResult<Message> {
    let message = services::messages::send(
        conn,
        conversation,
        sender_id,
        content,
        media_url,
        media_type,
    )?;

    let preview =
        services::messages::content_preview(message.content.as_deref(), message.media_type.as_deref());
    publisher::publish_message_sent(&state.rabbitmq, message.id, conversation.id, sender_id, &preview)
        .await;

    let payload = push_payload(conversation, &message);
    for member_id in services::conversations::member_ids(conn, conversation.id)? {
        if member_id != sender_id {
            state.notifier.notify(member_id, "new_message", &payload);
        }
    }

    Ok(message)
}

// --- Handlers ---

/// POST /conversations/:id/messages - send a message
pub async fn send_message(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<Json<ApiResponse<Message>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let (content, media_url) = validation::validate_message_body(
        req.content.as_deref(),
        req.media_url.as_deref(),
        state.config.message_max_length,
    )?;

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    services::conversations::require_member(&mut conn, conversation_id, auth_user.id)?;
    let conversation = services::conversations::get(&mut conn, conversation_id)?;

    check_dm_block(&state, &mut conn, &conversation, auth_user.id).await?;

    let message = deliver(
        &state,
        &mut conn,
        &conversation,
        auth_user.id,
        content,
        media_url,
        req.media_type,
    )
    .await?;

    Ok(Json(ApiResponse::ok(message)))
}

/// POST /conversations/:id/media - upload a media file and send it as a message
pub async fn send_media(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<ApiResponse<Message>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    services::conversations::require_member(&mut conn, conversation_id, auth_user.id)?;
    let conversation = services::conversations::get(&mut conn, conversation_id)?;

    check_dm_block(&state, &mut conn, &conversation, auth_user.id).await?;

    let mut file_data: Option<(Vec<u8>, String)> = None;
    let mut content: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::new(ErrorCode::ValidationError, format!("multipart error: {e}")))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(|e| {
                    AppError::new(ErrorCode::ValidationError, format!("failed to read file: {e}"))
                })?;
                file_data = Some((data.to_vec(), content_type));
            }
            "content" => {
                let text = field.text().await.unwrap_or_default();
                if !text.trim().is_empty() {
                    content = Some(text);
                }
            }
            _ => {}
        }
    }

    let (data, content_type) =
        file_data.ok_or_else(|| AppError::new(ErrorCode::ValidationError, "no file provided"))?;

    let ext = match content_type.as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "video/webm" => "webm",
        _ => {
            return Err(AppError::new(
                ErrorCode::ValidationError,
                "unsupported format, accepted: jpeg, png, webp, gif, mp4, quicktime, webm",
            ));
        }
    };

    if let Some(text) = &content {
        if text.chars().count() > state.config.message_max_length {
            return Err(AppError::new(
                ErrorCode::ValidationError,
                format!(
                    "message content must be at most {} characters",
                    state.config.message_max_length
                ),
            ));
        }
    }

    let file_id = Uuid::now_v7();
    let key = format!("messages/{}/{}.{}", conversation_id, file_id, ext);
    let media_url = state
        .minio
        .upload(&key, data, &content_type)
        .await
        .map_err(|e| AppError::new(ErrorCode::MediaUploadFailed, e))?;

    let message = deliver(
        &state,
        &mut conn,
        &conversation,
        auth_user.id,
        content,
        Some(media_url),
        Some(content_type),
    )
    .await?;

    Ok(Json(ApiResponse::ok(message)))
}

/// GET /conversations/:id/messages - newest-first cursor pagination
pub async fn list_messages(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> AppResult<Json<ApiResponse<CursorPage<Message>>>> {
    let cursor = validation::parse_cursor(query.cursor.as_deref())?;
    let limit = validation::effective_limit(query.limit);

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    services::conversations::require_member(&mut conn, conversation_id, auth_user.id)?;

    let page = services::messages::page(&mut conn, conversation_id, cursor, limit)?;

    Ok(Json(ApiResponse::ok(page)))
}

/// PUT /conversations/:id/seen - reset the caller's unread counter and
/// receipt everything they had not yet seen. Idempotent.
pub async fn mark_seen(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<SeenResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let seen_messages = services::conversations::mark_seen(&mut conn, conversation_id, auth_user.id)?;

    publisher::publish_conversation_seen(&state.rabbitmq, conversation_id, auth_user.id).await;

    let payload = serde_json::json!({
        "conversation_id": conversation_id,
        "user_id": auth_user.id,
    });
    for member_id in services::conversations::member_ids(&mut conn, conversation_id)? {
        if member_id != auth_user.id {
            state.notifier.notify(member_id, "conversation_seen", &payload);
        }
    }

    Ok(Json(ApiResponse::ok(SeenResponse {
        conversation_id,
        seen_messages,
    })))
}

/// GET /unread-count - total unread across all conversations
pub async fn get_unread_count(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<UnreadCountResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let total_unread = services::conversations::total_unread(&mut conn, auth_user.id)?;

    Ok(Json(ApiResponse::ok(UnreadCountResponse { total_unread })))
}
