use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use uuid::Uuid;

use harbor_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{
    Conversation, ConversationMember, MessageStatus, NewConversation, NewConversationMember,
    NewMessageReceipt,
};
use crate::schema::{conversation_members, conversations, message_receipts, messages};
use crate::validation;

pub fn get(conn: &mut PgConnection, conversation_id: Uuid) -> AppResult<Conversation> {
    conversations::table
        .find(conversation_id)
        .first::<Conversation>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::ConversationNotFound, "conversation not found"))
}

/// The caller's membership row, or a 403 if they are not a participant.
pub fn require_member(
    conn: &mut PgConnection,
    conversation_id: Uuid,
    user_id: Uuid,
) -> AppResult<ConversationMember> {
    conversation_members::table
        .filter(conversation_members::conversation_id.eq(conversation_id))
        .filter(conversation_members::user_id.eq(user_id))
        .first::<ConversationMember>(conn)
        .optional()?
        .ok_or_else(|| {
            AppError::new(
                ErrorCode::NotConversationMember,
                "you are not a member of this conversation",
            )
        })
}

/// Only the group admin may change membership, name, or image.
pub fn require_admin(conversation: &Conversation, user_id: Uuid) -> AppResult<()> {
    if conversation.admin_id != Some(user_id) {
        return Err(AppError::new(
            ErrorCode::NotConversationAdmin,
            "only the group admin can do this",
        ));
    }
    Ok(())
}

pub fn require_group(conversation: &Conversation) -> AppResult<()> {
    if !conversation.is_group {
        return Err(AppError::new(
            ErrorCode::NotGroupConversation,
            "not a group conversation",
        ));
    }
    Ok(())
}

pub fn members(conn: &mut PgConnection, conversation_id: Uuid) -> AppResult<Vec<ConversationMember>> {
    Ok(conversation_members::table
        .filter(conversation_members::conversation_id.eq(conversation_id))
        .order(conversation_members::joined_at.asc())
        .load::<ConversationMember>(conn)?)
}

pub fn member_ids(conn: &mut PgConnection, conversation_id: Uuid) -> AppResult<Vec<Uuid>> {
    Ok(conversation_members::table
        .filter(conversation_members::conversation_id.eq(conversation_id))
        .select(conversation_members::user_id)
        .load::<Uuid>(conn)?)
}

/// Find the 1:1 conversation between the two users, or create it. The
/// canonical dm_key plus its unique index make this idempotent: a second
/// call (in either participant order) returns the existing row, and a
/// concurrent duplicate insert is resolved by re-reading after the unique
/// violation. Returns the conversation and whether it was created.
pub fn find_or_create_individual(
    conn: &mut PgConnection,
    caller: Uuid,
    other: Uuid,
) -> AppResult<(Conversation, bool)> {
    let key = validation::canonical_dm_key(caller, other);

    if let Some(existing) = conversations::table
        .filter(conversations::dm_key.eq(&key))
        .first::<Conversation>(conn)
        .optional()?
    {
        return Ok((existing, false));
    }

    let result = conn.transaction::<Conversation, AppError, _>(|conn| {
        let conversation: Conversation = diesel::insert_into(conversations::table)
            .values(NewConversation::individual(key.clone()))
            .get_result(conn)?;

        let members = vec![
            NewConversationMember {
                conversation_id: conversation.id,
                user_id: caller,
            },
            NewConversationMember {
                conversation_id: conversation.id,
                user_id: other,
            },
        ];

        diesel::insert_into(conversation_members::table)
            .values(&members)
            .execute(conn)?;

        Ok(conversation)
    });

    match result {
        Ok(conversation) => Ok((conversation, true)),
        Err(AppError::Database(diesel::result::Error::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            _,
        ))) => {
            // Lost the race to a concurrent create; the winner's row is ours.
            let existing = conversations::table
                .filter(conversations::dm_key.eq(&key))
                .first::<Conversation>(conn)?;
            Ok((existing, false))
        }
        Err(e) => Err(e),
    }
}

/// Create a group conversation. `member_set` is the validated final member
/// list (creator included, deduplicated); counters start at zero via the
/// column default.
pub fn create_group(
    conn: &mut PgConnection,
    creator: Uuid,
    name: String,
    image_url: Option<String>,
    member_set: &[Uuid],
) -> AppResult<Conversation> {
    conn.transaction::<Conversation, AppError, _>(|conn| {
        let conversation: Conversation = diesel::insert_into(conversations::table)
            .values(NewConversation::group(name, image_url, creator))
            .get_result(conn)?;

        let members: Vec<NewConversationMember> = member_set
            .iter()
            .map(|uid| NewConversationMember {
                conversation_id: conversation.id,
                user_id: *uid,
            })
            .collect();

        diesel::insert_into(conversation_members::table)
            .values(&members)
            .execute(conn)?;

        Ok(conversation)
    })
}

/// Add a member to a group (admin check happens in the handler). Re-applies
/// the capacity ceiling and rejects existing members.
pub fn add_member(
    conn: &mut PgConnection,
    conversation: &Conversation,
    user_id: Uuid,
    max_members: usize,
) -> AppResult<ConversationMember> {
    let current = members(conn, conversation.id)?;

    if current.iter().any(|m| m.user_id == user_id) {
        return Err(AppError::new(
            ErrorCode::AlreadyMember,
            "user is already a member of this conversation",
        ));
    }
    if current.len() + 1 > max_members {
        return Err(AppError::new(
            ErrorCode::GroupCapacity,
            format!("a group can have at most {max_members} members"),
        ));
    }

    let member: ConversationMember = diesel::insert_into(conversation_members::table)
        .values(NewConversationMember {
            conversation_id: conversation.id,
            user_id,
        })
        .get_result(conn)?;

    Ok(member)
}

/// Remove a member from a group (admin check happens in the handler). The
/// membership row carries the unread counter, so both go together.
pub fn remove_member(
    conn: &mut PgConnection,
    conversation: &Conversation,
    user_id: Uuid,
    min_members: usize,
) -> AppResult<()> {
    let current = members(conn, conversation.id)?;

    if !current.iter().any(|m| m.user_id == user_id) {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            "user is not a member of this conversation",
        ));
    }
    if current.len() - 1 < min_members {
        return Err(AppError::new(
            ErrorCode::GroupCapacity,
            format!("a group needs at least {min_members} members"),
        ));
    }

    diesel::delete(
        conversation_members::table
            .filter(conversation_members::conversation_id.eq(conversation.id))
            .filter(conversation_members::user_id.eq(user_id)),
    )
    .execute(conn)?;

    Ok(())
}

/// Pick the successor admin when the current one leaves: the earliest
/// joined remaining member.
pub fn pick_next_admin(members: &[ConversationMember], leaving: Uuid) -> Option<Uuid> {
    members
        .iter()
        .filter(|m| m.user_id != leaving)
        .min_by_key(|m| (m.joined_at, m.id))
        .map(|m| m.user_id)
}

/// Leave a group. If the admin leaves, the role transfers to the earliest
/// joined remaining member in the same transaction. Returns the new admin
/// id when a transfer happened.
pub fn leave(
    conn: &mut PgConnection,
    conversation: &Conversation,
    user_id: Uuid,
    min_members: usize,
) -> AppResult<Option<Uuid>> {
    require_group(conversation)?;

    conn.transaction::<Option<Uuid>, AppError, _>(|conn| {
        let current = members(conn, conversation.id)?;

        if !current.iter().any(|m| m.user_id == user_id) {
            return Err(AppError::new(
                ErrorCode::NotConversationMember,
                "you are not a member of this conversation",
            ));
        }
        if current.len() - 1 < min_members {
            return Err(AppError::new(
                ErrorCode::GroupCapacity,
                format!("leaving would drop the group below {min_members} members"),
            ));
        }

        diesel::delete(
            conversation_members::table
                .filter(conversation_members::conversation_id.eq(conversation.id))
                .filter(conversation_members::user_id.eq(user_id)),
        )
        .execute(conn)?;

        let mut new_admin = None;
        if conversation.admin_id == Some(user_id) {
            new_admin = pick_next_admin(&current, user_id);
            diesel::update(conversations::table.find(conversation.id))
                .set(conversations::admin_id.eq(new_admin))
                .execute(conn)?;
        }

        Ok(new_admin)
    })
}

/// Rename and/or re-image a group (admin check happens in the handler).
pub fn update_group(
    conn: &mut PgConnection,
    conversation_id: Uuid,
    name: Option<String>,
    image_url: Option<String>,
) -> AppResult<Conversation> {
    let updated: Conversation = conn.transaction::<Conversation, AppError, _>(|conn| {
        if let Some(name) = &name {
            diesel::update(conversations::table.find(conversation_id))
                .set(conversations::name.eq(name))
                .execute(conn)?;
        }
        if let Some(url) = &image_url {
            diesel::update(conversations::table.find(conversation_id))
                .set(conversations::image_url.eq(url))
                .execute(conn)?;
        }
        Ok(diesel::update(conversations::table.find(conversation_id))
            .set(conversations::updated_at.eq(Utc::now()))
            .get_result(conn)?)
    })?;

    Ok(updated)
}

/// Mark a conversation seen for the caller: reset their unread counter,
/// receipt every message they have not yet seen (sender's own excluded),
/// and flip those messages to `seen`. Idempotent: receipts are unique per
/// (message, user), so a second call finds nothing left to do. Returns the
/// number of newly receipted messages.
pub fn mark_seen(conn: &mut PgConnection, conversation_id: Uuid, user_id: Uuid) -> AppResult<usize> {
    conn.transaction::<usize, AppError, _>(|conn| {
        let updated = diesel::update(
            conversation_members::table
                .filter(conversation_members::conversation_id.eq(conversation_id))
                .filter(conversation_members::user_id.eq(user_id)),
        )
        .set((
            conversation_members::unread_count.eq(0),
            conversation_members::last_read_at.eq(Utc::now()),
        ))
        .execute(conn)?;

        if updated == 0 {
            return Err(AppError::new(
                ErrorCode::NotConversationMember,
                "you are not a member of this conversation",
            ));
        }

        let candidates: Vec<Uuid> = messages::table
            .filter(messages::conversation_id.eq(conversation_id))
            .filter(messages::sender_id.ne(user_id))
            .select(messages::id)
            .load::<Uuid>(conn)?;

        if candidates.is_empty() {
            return Ok(0);
        }

        let already: Vec<Uuid> = message_receipts::table
            .filter(message_receipts::message_id.eq_any(&candidates))
            .filter(message_receipts::user_id.eq(user_id))
            .select(message_receipts::message_id)
            .load::<Uuid>(conn)?;

        let already: std::collections::HashSet<Uuid> = already.into_iter().collect();
        let fresh: Vec<Uuid> = candidates
            .into_iter()
            .filter(|id| !already.contains(id))
            .collect();

        if fresh.is_empty() {
            return Ok(0);
        }

        let receipts: Vec<NewMessageReceipt> = fresh
            .iter()
            .map(|mid| NewMessageReceipt {
                message_id: *mid,
                user_id,
            })
            .collect();

        diesel::insert_into(message_receipts::table)
            .values(&receipts)
            .on_conflict((message_receipts::message_id, message_receipts::user_id))
            .do_nothing()
            .execute(conn)?;

        diesel::update(messages::table.filter(messages::id.eq_any(&fresh)))
            .set(messages::status.eq(MessageStatus::Seen.to_string()))
            .execute(conn)?;

        Ok(fresh.len())
    })
}

/// Sum of the caller's unread counters across all conversations.
pub fn total_unread(conn: &mut PgConnection, user_id: Uuid) -> AppResult<i64> {
    use diesel::dsl::sum;

    let total: Option<i64> = conversation_members::table
        .filter(conversation_members::user_id.eq(user_id))
        .select(sum(conversation_members::unread_count))
        .first::<Option<i64>>(conn)?;

    Ok(total.unwrap_or(0))
}

/// Cascade for `user.deleted` events: drop the user's individual
/// conversations entirely (FKs cascade to messages and receipts) and remove
/// them from groups, transferring the admin role where needed. Deletion
/// cannot be refused, so the member floor is not enforced here; a group
/// left empty is deleted.
pub fn remove_user_everywhere(conn: &mut PgConnection, user_id: Uuid) -> AppResult<()> {
    let conversation_ids: Vec<Uuid> = conversation_members::table
        .filter(conversation_members::user_id.eq(user_id))
        .select(conversation_members::conversation_id)
        .load::<Uuid>(conn)?;

    for conversation_id in conversation_ids {
        let conversation = get(conn, conversation_id)?;

        if !conversation.is_group {
            diesel::delete(conversations::table.find(conversation_id)).execute(conn)?;
            tracing::info!(conversation_id = %conversation_id, user_id = %user_id,
                "deleted individual conversation of removed user");
            continue;
        }

        conn.transaction::<(), AppError, _>(|conn| {
            let current = members(conn, conversation_id)?;

            diesel::delete(
                conversation_members::table
                    .filter(conversation_members::conversation_id.eq(conversation_id))
                    .filter(conversation_members::user_id.eq(user_id)),
            )
            .execute(conn)?;

            if current.len() <= 1 {
                diesel::delete(conversations::table.find(conversation_id)).execute(conn)?;
                return Ok(());
            }

            if conversation.admin_id == Some(user_id) {
                let new_admin = pick_next_admin(&current, user_id);
                diesel::update(conversations::table.find(conversation_id))
                    .set(conversations::admin_id.eq(new_admin))
                    .execute(conn)?;
            }

            Ok(())
        })?;

        tracing::info!(conversation_id = %conversation_id, user_id = %user_id,
            "removed deleted user from group conversation");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn member(user_id: Uuid, joined_offset_secs: i64) -> ConversationMember {
        ConversationMember {
            id: Uuid::now_v7(),
            conversation_id: Uuid::now_v7(),
            user_id,
            unread_count: 0,
            joined_at: Utc::now() + Duration::seconds(joined_offset_secs),
            last_read_at: Utc::now(),
        }
    }

    #[test]
    fn next_admin_is_the_earliest_joined_remaining_member() {
        let leaving = Uuid::now_v7();
        let oldest = Uuid::now_v7();
        let newer = Uuid::now_v7();
        let members = vec![member(newer, 20), member(leaving, 0), member(oldest, 10)];
        assert_eq!(pick_next_admin(&members, leaving), Some(oldest));
    }

    #[test]
    fn next_admin_skips_the_leaver_even_if_earliest() {
        let leaving = Uuid::now_v7();
        let other = Uuid::now_v7();
        let members = vec![member(leaving, 0), member(other, 10)];
        assert_eq!(pick_next_admin(&members, leaving), Some(other));
    }

    #[test]
    fn no_admin_candidate_when_no_one_remains() {
        let leaving = Uuid::now_v7();
        let members = vec![member(leaving, 0)];
        assert_eq!(pick_next_admin(&members, leaving), None);
    }

    #[test]
    fn non_admin_cannot_pass_admin_check() {
        let admin = Uuid::now_v7();
        let conversation = Conversation {
            id: Uuid::now_v7(),
            is_group: true,
            dm_key: None,
            name: Some("Team Alpha".into()),
            image_url: None,
            admin_id: Some(admin),
            last_message_preview: None,
            last_message_sender: None,
            last_message_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(require_admin(&conversation, admin).is_ok());
        assert!(require_admin(&conversation, Uuid::now_v7()).is_err());
    }
}
