use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use harbor_shared::errors::{AppError, AppResult};
use harbor_shared::types::pagination::CursorPage;

use crate::models::{Conversation, Message, NewMessage};
use crate::schema::{conversation_members, conversations, messages};

/// Short text shown in conversation list views and notification events.
pub fn content_preview(content: Option<&str>, media_type: Option<&str>) -> String {
    match content {
        Some(text) if !text.trim().is_empty() => text.chars().take(100).collect(),
        _ => match media_type {
            Some(mt) if mt.starts_with("image/") => "[image]".to_string(),
            Some(_) => "[media]".to_string(),
            None => String::new(),
        },
    }
}

/// Persist a message and its side effects in one transaction: the message
/// row, the conversation's denormalized last-message snapshot, and an
/// atomic `unread_count + 1` for every member except the sender. The push
/// and event publish happen after commit, in the handler.
pub fn send(
    conn: &mut PgConnection,
    conversation: &Conversation,
    sender_id: Uuid,
    content: Option<String>,
    media_url: Option<String>,
    media_type: Option<String>,
) -> AppResult<Message> {
    let preview = content_preview(content.as_deref(), media_type.as_deref());

    conn.transaction::<Message, AppError, _>(|conn| {
        let message: Message = diesel::insert_into(messages::table)
            .values(NewMessage::new(
                conversation.id,
                sender_id,
                content.clone(),
                media_url.clone(),
                media_type.clone(),
            ))
            .get_result(conn)?;

        diesel::update(conversations::table.find(conversation.id))
            .set((
                conversations::last_message_preview.eq(Some(preview.clone())),
                conversations::last_message_sender.eq(Some(sender_id)),
                conversations::last_message_at.eq(Some(message.created_at)),
                conversations::updated_at.eq(message.created_at),
            ))
            .execute(conn)?;

        diesel::update(
            conversation_members::table
                .filter(conversation_members::conversation_id.eq(conversation.id))
                .filter(conversation_members::user_id.ne(sender_id)),
        )
        .set(conversation_members::unread_count.eq(conversation_members::unread_count + 1))
        .execute(conn)?;

        Ok(message)
    })
}

/// Newest-first page of messages. The cursor is the id of the last message
/// of the previous page; v7 ids order by creation time, so `id < cursor`
/// selects strictly older messages. Fetches `limit + 1` rows to learn
/// whether another page exists.
pub fn page(
    conn: &mut PgConnection,
    conversation_id: Uuid,
    cursor: Option<Uuid>,
    limit: usize,
) -> AppResult<CursorPage<Message>> {
    let mut query = messages::table
        .filter(messages::conversation_id.eq(conversation_id))
        .into_boxed();

    if let Some(cursor) = cursor {
        query = query.filter(messages::id.lt(cursor));
    }

    let rows: Vec<Message> = query
        .order(messages::id.desc())
        .limit(limit as i64 + 1)
        .load::<Message>(conn)?;

    Ok(CursorPage::from_rows(rows, limit, |m| m.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_long_content() {
        let long = "x".repeat(300);
        assert_eq!(content_preview(Some(&long), None).chars().count(), 100);
    }

    #[test]
    fn preview_falls_back_to_media_placeholder() {
        assert_eq!(content_preview(None, Some("image/png")), "[image]");
        assert_eq!(content_preview(None, Some("video/mp4")), "[media]");
        assert_eq!(content_preview(Some("  "), Some("image/jpeg")), "[image]");
    }
}
