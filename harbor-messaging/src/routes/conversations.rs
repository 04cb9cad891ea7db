use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use harbor_shared::clients::users::UserProfile;
use harbor_shared::errors::{AppError, AppResult, ErrorCode};
use harbor_shared::types::api::ApiResponse;
use harbor_shared::types::auth::AuthUser;
use harbor_shared::types::pagination::{Paginated, PaginationParams};

use crate::events::publisher;
use crate::models::{Conversation, ConversationMember};
use crate::schema::{conversation_members, conversations};
use crate::services;
use crate::validation;
use crate::AppState;

// --- Request DTOs ---

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub participant_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupRequest {
    pub name: String,
    pub member_ids: Vec<Uuid>,
    #[validate(url(message = "image url must be a valid url"))]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateGroupRequest {
    pub name: Option<String>,
    #[validate(url(message = "image url must be a valid url"))]
    pub image_url: Option<String>,
}

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct ConversationPreview {
    pub id: Uuid,
    pub is_group: bool,
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub partner_id: Option<Uuid>,
    pub partner_name: Option<String>,
    pub partner_avatar: Option<String>,
    pub partner_online: bool,
    pub last_message_preview: Option<String>,
    pub last_message_sender: Option<Uuid>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub members: Vec<EnrichedMember>,
}

#[derive(Debug, Serialize, Clone)]
pub struct EnrichedMember {
    pub id: Uuid,
    pub user_id: Uuid,
    pub is_admin: bool,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_online: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LeaveResponse {
    pub conversation_id: Uuid,
    pub new_admin: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct GroupPhotoResponse {
    pub image_url: String,
}

// --- Helpers ---

/// Fetch profile data from the user service for the given members.
async fn enrich_members(
    state: &AppState,
    conversation: &Conversation,
    raw_members: &[ConversationMember],
) -> Vec<EnrichedMember> {
    let ids: Vec<Uuid> = raw_members.iter().map(|m| m.user_id).collect();
    let profiles = state.users.profiles_batch(&ids).await;
    let profile_map: HashMap<Uuid, &UserProfile> =
        profiles.iter().map(|p| (p.credential_id, p)).collect();

    raw_members
        .iter()
        .map(|m| {
            let profile = profile_map.get(&m.user_id);
            EnrichedMember {
                id: m.id,
                user_id: m.user_id,
                is_admin: conversation.admin_id == Some(m.user_id),
                display_name: profile.and_then(|p| p.display_name.clone()),
                avatar_url: profile.and_then(|p| p.avatar_url.clone()),
                is_online: profile.map(|p| p.is_online).unwrap_or(false),
                joined_at: m.joined_at,
            }
        })
        .collect()
}

async fn detail(
    state: &AppState,
    conn: &mut diesel::pg::PgConnection,
    conversation: Conversation,
) -> AppResult<ConversationDetail> {
    let raw_members = services::conversations::members(conn, conversation.id)?;
    let members = enrich_members(state, &conversation, &raw_members).await;
    Ok(ConversationDetail {
        conversation,
        members,
    })
}

// --- Handlers ---

/// POST /conversations - create (or fetch) the individual conversation with
/// another user. Idempotent: the same pair always resolves to the same row.
pub async fn create_conversation(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateConversationRequest>,
) -> AppResult<Json<ApiResponse<ConversationDetail>>> {
    validation::validate_distinct_participants(auth_user.id, req.participant_id)?;

    if !state.users.user_exists(req.participant_id).await? {
        return Err(AppError::new(ErrorCode::UserNotFound, "user not found"));
    }
    if state
        .users
        .blocked_between(auth_user.id, req.participant_id)
        .await?
    {
        return Err(AppError::new(
            ErrorCode::UserBlocked,
            "you cannot start a conversation with this user (blocked)",
        ));
    }

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let (conversation, created) =
        services::conversations::find_or_create_individual(&mut conn, auth_user.id, req.participant_id)?;

    if created {
        publisher::publish_conversation_created(
            &state.rabbitmq,
            conversation.id,
            false,
            vec![auth_user.id, req.participant_id],
            auth_user.id,
        )
        .await;
        state.notifier.notify(
            req.participant_id,
            "conversation_created",
            &serde_json::json!({ "conversation_id": conversation.id, "is_group": false }),
        );
    }

    let detail = detail(&state, &mut conn, conversation).await?;

    if created {
        Ok(Json(ApiResponse::ok(detail)))
    } else {
        Ok(Json(ApiResponse::ok_with_message(detail, "conversation already exists")))
    }
}

/// POST /conversations/group - create a group conversation
pub async fn create_group(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateGroupRequest>,
) -> AppResult<Json<ApiResponse<ConversationDetail>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let name = validation::validate_group_name(&req.name)?;
    let member_set = validation::validate_group_members(
        auth_user.id,
        &req.member_ids,
        state.config.group_min_members,
        state.config.group_max_members,
    )?;

    for id in &req.member_ids {
        if !state.users.user_exists(*id).await? {
            return Err(AppError::new(
                ErrorCode::UserNotFound,
                format!("user {id} not found"),
            ));
        }
    }

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let conversation = services::conversations::create_group(
        &mut conn,
        auth_user.id,
        name,
        req.image_url,
        &member_set,
    )?;

    publisher::publish_conversation_created(
        &state.rabbitmq,
        conversation.id,
        true,
        member_set.clone(),
        auth_user.id,
    )
    .await;

    for member_id in &member_set {
        if *member_id == auth_user.id {
            continue;
        }
        state.notifier.notify(
            *member_id,
            "conversation_created",
            &serde_json::json!({
                "conversation_id": conversation.id,
                "is_group": true,
                "name": conversation.name,
            }),
        );
    }

    let detail = detail(&state, &mut conn, conversation).await?;
    Ok(Json(ApiResponse::ok(detail)))
}

/// GET /conversations - the caller's conversations, most recent activity
/// first, with last-message snapshot and the caller's unread counter.
pub async fn list_conversations(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<ConversationPreview>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let memberships: Vec<ConversationMember> = conversation_members::table
        .filter(conversation_members::user_id.eq(auth_user.id))
        .load::<ConversationMember>(&mut conn)?;

    if memberships.is_empty() {
        return Ok(Json(ApiResponse::ok(Paginated::new(vec![], 0, &params))));
    }

    let unread_by_conv: HashMap<Uuid, i32> = memberships
        .iter()
        .map(|m| (m.conversation_id, m.unread_count))
        .collect();
    let conv_ids: Vec<Uuid> = memberships.iter().map(|m| m.conversation_id).collect();
    let total = conv_ids.len() as u64;

    // updated_at moves on every send, so it orders by last activity
    let convs: Vec<Conversation> = conversations::table
        .filter(conversations::id.eq_any(&conv_ids))
        .order(conversations::updated_at.desc())
        .offset(params.offset() as i64)
        .limit(params.limit() as i64)
        .load::<Conversation>(&mut conn)?;

    // DM partner lookup for this page
    let dm_ids: Vec<Uuid> = convs.iter().filter(|c| !c.is_group).map(|c| c.id).collect();
    let partner_rows: Vec<(Uuid, Uuid)> = if dm_ids.is_empty() {
        vec![]
    } else {
        conversation_members::table
            .filter(conversation_members::conversation_id.eq_any(&dm_ids))
            .filter(conversation_members::user_id.ne(auth_user.id))
            .select((
                conversation_members::conversation_id,
                conversation_members::user_id,
            ))
            .load::<(Uuid, Uuid)>(&mut conn)?
    };
    let partner_by_conv: HashMap<Uuid, Uuid> = partner_rows.into_iter().collect();

    let partner_ids: Vec<Uuid> = partner_by_conv.values().copied().collect();
    let profiles = state.users.profiles_batch(&partner_ids).await;
    let profile_map: HashMap<Uuid, &UserProfile> =
        profiles.iter().map(|p| (p.credential_id, p)).collect();

    let previews: Vec<ConversationPreview> = convs
        .into_iter()
        .map(|conv| {
            let partner_id = partner_by_conv.get(&conv.id).copied();
            let profile = partner_id.and_then(|pid| profile_map.get(&pid));
            ConversationPreview {
                id: conv.id,
                is_group: conv.is_group,
                name: conv.name,
                image_url: conv.image_url,
                partner_id,
                partner_name: profile.and_then(|p| p.display_name.clone()),
                partner_avatar: profile.and_then(|p| p.avatar_url.clone()),
                partner_online: profile.map(|p| p.is_online).unwrap_or(false),
                last_message_preview: conv.last_message_preview,
                last_message_sender: conv.last_message_sender,
                last_message_at: conv.last_message_at,
                unread_count: unread_by_conv.get(&conv.id).copied().unwrap_or(0),
                created_at: conv.created_at,
                updated_at: conv.updated_at,
            }
        })
        .collect();

    Ok(Json(ApiResponse::ok(Paginated::new(previews, total, &params))))
}

/// GET /conversations/:id - conversation details with enriched members
pub async fn get_conversation(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ConversationDetail>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    services::conversations::require_member(&mut conn, conversation_id, auth_user.id)?;
    let conversation = services::conversations::get(&mut conn, conversation_id)?;

    let detail = detail(&state, &mut conn, conversation).await?;
    Ok(Json(ApiResponse::ok(detail)))
}

/// POST /conversations/:id/members - add a member (admin only)
pub async fn add_member(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<AddMemberRequest>,
) -> AppResult<Json<ApiResponse<ConversationMember>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let conversation = services::conversations::get(&mut conn, conversation_id)?;
    services::conversations::require_group(&conversation)?;
    services::conversations::require_admin(&conversation, auth_user.id)?;

    if !state.users.user_exists(req.user_id).await? {
        return Err(AppError::new(ErrorCode::UserNotFound, "user not found"));
    }

    let member = services::conversations::add_member(
        &mut conn,
        &conversation,
        req.user_id,
        state.config.group_max_members,
    )?;

    publisher::publish_member_added(&state.rabbitmq, conversation_id, req.user_id, auth_user.id).await;

    let payload = serde_json::json!({
        "conversation_id": conversation_id,
        "user_id": req.user_id,
    });
    for member_id in services::conversations::member_ids(&mut conn, conversation_id)? {
        if member_id != auth_user.id {
            state.notifier.notify(member_id, "member_added", &payload);
        }
    }

    Ok(Json(ApiResponse::ok(member)))
}

/// DELETE /conversations/:id/members/:user_id - remove a member (admin only)
pub async fn remove_member(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path((conversation_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let conversation = services::conversations::get(&mut conn, conversation_id)?;
    services::conversations::require_group(&conversation)?;
    services::conversations::require_admin(&conversation, auth_user.id)?;

    if user_id == auth_user.id {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            "use leave to exit the group",
        ));
    }

    services::conversations::remove_member(
        &mut conn,
        &conversation,
        user_id,
        state.config.group_min_members,
    )?;

    publisher::publish_member_removed(&state.rabbitmq, conversation_id, user_id, auth_user.id).await;

    let payload = serde_json::json!({
        "conversation_id": conversation_id,
        "user_id": user_id,
    });
    state.notifier.notify(user_id, "member_removed", &payload);
    for member_id in services::conversations::member_ids(&mut conn, conversation_id)? {
        if member_id != auth_user.id {
            state.notifier.notify(member_id, "member_removed", &payload);
        }
    }

    Ok(Json(ApiResponse::ok(serde_json::json!({
        "conversation_id": conversation_id,
        "removed": user_id,
    }))))
}

/// POST /conversations/:id/leave - leave a group; the admin role transfers
/// to the earliest joined remaining member if needed.
pub async fn leave_group(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<LeaveResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let conversation = services::conversations::get(&mut conn, conversation_id)?;
    let new_admin = services::conversations::leave(
        &mut conn,
        &conversation,
        auth_user.id,
        state.config.group_min_members,
    )?;

    publisher::publish_member_removed(&state.rabbitmq, conversation_id, auth_user.id, auth_user.id)
        .await;

    let payload = serde_json::json!({
        "conversation_id": conversation_id,
        "user_id": auth_user.id,
        "new_admin": new_admin,
    });
    for member_id in services::conversations::member_ids(&mut conn, conversation_id)? {
        state.notifier.notify(member_id, "member_left", &payload);
    }

    Ok(Json(ApiResponse::ok(LeaveResponse {
        conversation_id,
        new_admin,
    })))
}

/// PATCH /conversations/:id - rename and/or re-image a group (admin only)
pub async fn update_group(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<UpdateGroupRequest>,
) -> AppResult<Json<ApiResponse<Conversation>>> {
    if req.name.is_none() && req.image_url.is_none() {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            "name or image url required",
        ));
    }
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let name = req
        .name
        .as_deref()
        .map(validation::validate_group_name)
        .transpose()?;

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let conversation = services::conversations::get(&mut conn, conversation_id)?;
    services::conversations::require_group(&conversation)?;
    services::conversations::require_admin(&conversation, auth_user.id)?;

    let updated =
        services::conversations::update_group(&mut conn, conversation_id, name, req.image_url)?;

    publisher::publish_group_updated(&state.rabbitmq, conversation_id, auth_user.id).await;

    let payload = serde_json::json!({
        "conversation_id": conversation_id,
        "name": updated.name,
        "image_url": updated.image_url,
    });
    for member_id in services::conversations::member_ids(&mut conn, conversation_id)? {
        if member_id != auth_user.id {
            state.notifier.notify(member_id, "group_updated", &payload);
        }
    }

    Ok(Json(ApiResponse::ok(updated)))
}

/// POST /conversations/:id/photo - upload a group photo (admin only)
pub async fn upload_group_photo(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<ApiResponse<GroupPhotoResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let conversation = services::conversations::get(&mut conn, conversation_id)?;
    services::conversations::require_group(&conversation)?;
    services::conversations::require_admin(&conversation, auth_user.id)?;

    let mut file_data: Option<(Vec<u8>, String)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::new(ErrorCode::ValidationError, format!("multipart error: {e}")))?
    {
        if field.name().unwrap_or("") == "file" {
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let data = field.bytes().await.map_err(|e| {
                AppError::new(ErrorCode::ValidationError, format!("failed to read file: {e}"))
            })?;
            file_data = Some((data.to_vec(), content_type));
        }
    }

    let (data, content_type) =
        file_data.ok_or_else(|| AppError::new(ErrorCode::ValidationError, "no file provided"))?;

    let ext = match content_type.as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        _ => {
            return Err(AppError::new(
                ErrorCode::ValidationError,
                "unsupported format, accepted: jpeg, png, webp",
            ));
        }
    };

    let file_id = Uuid::now_v7();
    let key = format!("groups/{}/{}.{}", conversation_id, file_id, ext);
    let image_url = state
        .minio
        .upload(&key, data, &content_type)
        .await
        .map_err(|e| AppError::new(ErrorCode::MediaUploadFailed, e))?;

    services::conversations::update_group(&mut conn, conversation_id, None, Some(image_url.clone()))?;

    publisher::publish_group_updated(&state.rabbitmq, conversation_id, auth_user.id).await;

    let payload = serde_json::json!({
        "conversation_id": conversation_id,
        "image_url": image_url,
    });
    for member_id in services::conversations::member_ids(&mut conn, conversation_id)? {
        if member_id != auth_user.id {
            state.notifier.notify(member_id, "group_updated", &payload);
        }
    }

    Ok(Json(ApiResponse::ok(GroupPhotoResponse { image_url })))
}
