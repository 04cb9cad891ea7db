use uuid::Uuid;

use harbor_shared::clients::rabbitmq::RabbitMQClient;
use harbor_shared::types::event::{payloads, routing_keys, Event};

const SOURCE: &str = "harbor-messaging";

pub async fn publish_conversation_created(
    rabbitmq: &RabbitMQClient,
    conversation_id: Uuid,
    is_group: bool,
    member_ids: Vec<Uuid>,
    actor_id: Uuid,
) {
    let event = Event::new(
        SOURCE,
        routing_keys::MESSAGING_CONVERSATION_CREATED,
        payloads::ConversationCreated {
            conversation_id,
            is_group,
            member_ids,
        },
    )
    .with_user(actor_id);

    if let Err(e) = rabbitmq
        .publish(routing_keys::MESSAGING_CONVERSATION_CREATED, &event)
        .await
    {
        tracing::error!(error = %e, "failed to publish conversation.created event");
    }
}

pub async fn publish_message_sent(
    rabbitmq: &RabbitMQClient,
    message_id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    content_preview: &str,
) {
    let event = Event::new(
        SOURCE,
        routing_keys::MESSAGING_MESSAGE_SENT,
        payloads::MessageSent {
            message_id,
            conversation_id,
            sender_id,
            content_preview: content_preview.to_string(),
        },
    )
    .with_user(sender_id);

    if let Err(e) = rabbitmq
        .publish(routing_keys::MESSAGING_MESSAGE_SENT, &event)
        .await
    {
        tracing::error!(error = %e, "failed to publish message.sent event");
    }
}

pub async fn publish_conversation_seen(
    rabbitmq: &RabbitMQClient,
    conversation_id: Uuid,
    user_id: Uuid,
) {
    let event = Event::new(
        SOURCE,
        routing_keys::MESSAGING_CONVERSATION_SEEN,
        payloads::ConversationSeen {
            conversation_id,
            user_id,
        },
    )
    .with_user(user_id);

    if let Err(e) = rabbitmq
        .publish(routing_keys::MESSAGING_CONVERSATION_SEEN, &event)
        .await
    {
        tracing::error!(error = %e, "failed to publish conversation.seen event");
    }
}

pub async fn publish_member_added(
    rabbitmq: &RabbitMQClient,
    conversation_id: Uuid,
    user_id: Uuid,
    actor_id: Uuid,
) {
    let event = Event::new(
        SOURCE,
        routing_keys::MESSAGING_MEMBER_ADDED,
        payloads::MemberChanged {
            conversation_id,
            user_id,
            actor_id,
        },
    )
    .with_user(actor_id);

    if let Err(e) = rabbitmq
        .publish(routing_keys::MESSAGING_MEMBER_ADDED, &event)
        .await
    {
        tracing::error!(error = %e, "failed to publish member.added event");
    }
}

pub async fn publish_member_removed(
    rabbitmq: &RabbitMQClient,
    conversation_id: Uuid,
    user_id: Uuid,
    actor_id: Uuid,
) {
    let event = Event::new(
        SOURCE,
        routing_keys::MESSAGING_MEMBER_REMOVED,
        payloads::MemberChanged {
            conversation_id,
            user_id,
            actor_id,
        },
    )
    .with_user(actor_id);

    if let Err(e) = rabbitmq
        .publish(routing_keys::MESSAGING_MEMBER_REMOVED, &event)
        .await
    {
        tracing::error!(error = %e, "failed to publish member.removed event");
    }
}

pub async fn publish_group_updated(
    rabbitmq: &RabbitMQClient,
    conversation_id: Uuid,
    actor_id: Uuid,
) {
    let event = Event::new(
        SOURCE,
        routing_keys::MESSAGING_GROUP_UPDATED,
        payloads::GroupUpdated {
            conversation_id,
            actor_id,
        },
    )
    .with_user(actor_id);

    if let Err(e) = rabbitmq
        .publish(routing_keys::MESSAGING_GROUP_UPDATED, &event)
        .await
    {
        tracing::error!(error = %e, "failed to publish group.updated event");
    }
}
