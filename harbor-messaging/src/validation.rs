//! Request validation, kept separate from the persistence layer so every
//! rule is testable without a database. Each function returns the cleaned
//! value or the error the handler surfaces as-is.

use uuid::Uuid;

use harbor_shared::errors::{AppError, AppResult, ErrorCode};

pub const GROUP_NAME_MIN: usize = 3;
pub const GROUP_NAME_MAX: usize = 100;

pub const MESSAGES_DEFAULT_LIMIT: usize = 50;
pub const MESSAGES_MAX_LIMIT: usize = 100;

/// Trim and bounds-check a group name.
pub fn validate_group_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.chars().count() < GROUP_NAME_MIN {
        return Err(AppError::new(
            ErrorCode::GroupNameInvalid,
            format!("group name must be at least {GROUP_NAME_MIN} characters"),
        ));
    }
    if name.chars().count() > GROUP_NAME_MAX {
        return Err(AppError::new(
            ErrorCode::GroupNameInvalid,
            format!("group name must be at most {GROUP_NAME_MAX} characters"),
        ));
    }
    Ok(name.to_string())
}

/// The two sides of an individual conversation must be distinct users.
pub fn validate_distinct_participants(caller: Uuid, other: Uuid) -> AppResult<()> {
    if caller == other {
        return Err(AppError::new(
            ErrorCode::SelfConversation,
            "cannot start a conversation with yourself",
        ));
    }
    Ok(())
}

/// Canonical lookup key for a 1:1 conversation: both participant ids sorted
/// ascending, so (a,b) and (b,a) resolve to the same row.
pub fn canonical_dm_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

/// Check the explicit member list of a new group and return the final
/// member set: creator prepended, deduplicated, sorted.
pub fn validate_group_members(
    creator: Uuid,
    member_ids: &[Uuid],
    min_members: usize,
    max_members: usize,
) -> AppResult<Vec<Uuid>> {
    if member_ids.contains(&creator) {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            "member list must not include the creator",
        ));
    }

    let mut seen = std::collections::HashSet::new();
    for id in member_ids {
        if !seen.insert(*id) {
            return Err(AppError::new(
                ErrorCode::ValidationError,
                format!("duplicate member id: {id}"),
            ));
        }
    }

    let mut all: Vec<Uuid> = Vec::with_capacity(member_ids.len() + 1);
    all.push(creator);
    all.extend_from_slice(member_ids);
    all.sort();

    if all.len() < min_members {
        return Err(AppError::new(
            ErrorCode::GroupCapacity,
            format!("a group needs at least {min_members} members including the creator"),
        ));
    }
    if all.len() > max_members {
        return Err(AppError::new(
            ErrorCode::GroupCapacity,
            format!("a group can have at most {max_members} members"),
        ));
    }

    Ok(all)
}

/// A message needs text content and/or an image; content is trimmed and
/// length-bounded.
pub fn validate_message_body(
    content: Option<&str>,
    media_url: Option<&str>,
    max_length: usize,
) -> AppResult<(Option<String>, Option<String>)> {
    let content = content.map(str::trim).filter(|c| !c.is_empty());
    let media_url = media_url.map(str::trim).filter(|u| !u.is_empty());

    if content.is_none() && media_url.is_none() {
        return Err(AppError::new(
            ErrorCode::MessageEmpty,
            "message must have content or image",
        ));
    }

    if let Some(c) = content {
        if c.chars().count() > max_length {
            return Err(AppError::new(
                ErrorCode::ValidationError,
                format!("message content must be at most {max_length} characters"),
            ));
        }
    }

    Ok((content.map(str::to_string), media_url.map(str::to_string)))
}

/// Parse the `cursor` query parameter: the id of the last message of the
/// previous page.
pub fn parse_cursor(cursor: Option<&str>) -> AppResult<Option<Uuid>> {
    match cursor {
        None => Ok(None),
        Some(raw) => Uuid::parse_str(raw).map(Some).map_err(|_| {
            AppError::new(ErrorCode::ValidationError, format!("malformed cursor: {raw}"))
        }),
    }
}

/// Effective page size for the message list.
pub fn effective_limit(limit: Option<usize>) -> usize {
    limit
        .unwrap_or(MESSAGES_DEFAULT_LIMIT)
        .clamp(1, MESSAGES_MAX_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err_message(err: AppError) -> String {
        match err {
            AppError::Known { message, .. } => message,
            other => panic!("expected Known error, got {other:?}"),
        }
    }

    #[test]
    fn group_name_below_minimum_is_rejected() {
        let err = validate_group_name("AB").unwrap_err();
        assert!(err_message(err).contains("at least"));
    }

    #[test]
    fn group_name_is_trimmed() {
        assert_eq!(validate_group_name("  Team Alpha  ").unwrap(), "Team Alpha");
    }

    #[test]
    fn group_name_above_maximum_is_rejected() {
        let long = "x".repeat(GROUP_NAME_MAX + 1);
        let err = validate_group_name(&long).unwrap_err();
        assert!(err_message(err).contains("at most"));
    }

    #[test]
    fn self_conversation_is_rejected() {
        let id = Uuid::now_v7();
        assert!(validate_distinct_participants(id, id).is_err());
        assert!(validate_distinct_participants(id, Uuid::now_v7()).is_ok());
    }

    #[test]
    fn dm_key_is_symmetric() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        assert_eq!(canonical_dm_key(a, b), canonical_dm_key(b, a));
    }

    #[test]
    fn dm_key_orders_ids_ascending() {
        let a = Uuid::parse_str("00000000-0000-7000-8000-000000000001").unwrap();
        let b = Uuid::parse_str("00000000-0000-7000-8000-000000000002").unwrap();
        assert_eq!(canonical_dm_key(b, a), format!("{a}:{b}"));
    }

    #[test]
    fn group_members_include_creator_and_are_sorted() {
        let creator = Uuid::now_v7();
        let m1 = Uuid::now_v7();
        let m2 = Uuid::now_v7();
        let all = validate_group_members(creator, &[m2, m1], 3, 100).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.contains(&creator));
        let mut sorted = all.clone();
        sorted.sort();
        assert_eq!(all, sorted);
    }

    #[test]
    fn group_with_creator_and_two_others_meets_the_floor() {
        let creator = Uuid::now_v7();
        assert!(validate_group_members(creator, &[Uuid::now_v7(), Uuid::now_v7()], 3, 100).is_ok());
    }

    #[test]
    fn group_below_member_floor_is_rejected() {
        let creator = Uuid::now_v7();
        let err = validate_group_members(creator, &[Uuid::now_v7()], 3, 100).unwrap_err();
        assert!(err_message(err).contains("at least"));
    }

    #[test]
    fn duplicate_member_ids_are_rejected() {
        let creator = Uuid::now_v7();
        let dup = Uuid::now_v7();
        assert!(validate_group_members(creator, &[dup, dup, Uuid::now_v7()], 3, 100).is_err());
    }

    #[test]
    fn creator_in_member_list_is_rejected() {
        let creator = Uuid::now_v7();
        assert!(validate_group_members(creator, &[creator, Uuid::now_v7()], 3, 100).is_err());
    }

    #[test]
    fn group_above_member_cap_is_rejected() {
        let creator = Uuid::now_v7();
        let members: Vec<Uuid> = (0..100).map(|_| Uuid::now_v7()).collect();
        assert!(validate_group_members(creator, &members, 3, 100).is_err());
    }

    #[test]
    fn message_with_neither_content_nor_image_is_rejected() {
        let err = validate_message_body(None, None, 2000).unwrap_err();
        assert!(err_message(err).contains("content or image"));
    }

    #[test]
    fn whitespace_only_content_counts_as_empty() {
        assert!(validate_message_body(Some("   "), None, 2000).is_err());
        let (content, media) = validate_message_body(Some("   "), Some("https://cdn/x.png"), 2000).unwrap();
        assert!(content.is_none());
        assert_eq!(media.as_deref(), Some("https://cdn/x.png"));
    }

    #[test]
    fn oversized_content_is_rejected() {
        let long = "x".repeat(2001);
        assert!(validate_message_body(Some(&long), None, 2000).is_err());
    }

    #[test]
    fn malformed_cursor_is_a_validation_error() {
        assert!(parse_cursor(Some("not-a-uuid")).is_err());
        assert_eq!(parse_cursor(None).unwrap(), None);
        let id = Uuid::now_v7();
        assert_eq!(parse_cursor(Some(&id.to_string())).unwrap(), Some(id));
    }

    #[test]
    fn limit_defaults_and_caps() {
        assert_eq!(effective_limit(None), 50);
        assert_eq!(effective_limit(Some(10)), 10);
        assert_eq!(effective_limit(Some(500)), 100);
        assert_eq!(effective_limit(Some(0)), 1);
    }
}
