use std::sync::Arc;

use futures_lite::StreamExt;
use lapin::options::BasicAckOptions;

use harbor_shared::types::event::{payloads, routing_keys, Event};

use crate::services;
use crate::AppState;

/// Listen for auth user.deleted events and cascade the removal through the
/// user's conversations.
pub async fn listen_user_deleted(state: Arc<AppState>) -> anyhow::Result<()> {
    let consumer = state
        .rabbitmq
        .subscribe(
            "harbor-messaging.auth.user.deleted",
            &[routing_keys::AUTH_USER_DELETED],
        )
        .await?;

    tracing::info!("listening for auth.user.deleted events");

    let mut consumer = consumer;
    while let Some(delivery) = consumer.next().await {
        match delivery {
            Ok(delivery) => {
                match serde_json::from_slice::<Event<payloads::UserDeleted>>(&delivery.data) {
                    Ok(event) => {
                        let user_id = event.data.credential_id;
                        tracing::info!(user_id = %user_id, "received user.deleted event");

                        let result = state.db.get().map_err(anyhow::Error::from).and_then(|mut conn| {
                            services::conversations::remove_user_everywhere(&mut conn, user_id)
                                .map_err(|e| anyhow::anyhow!(e))
                        });

                        if let Err(e) = result {
                            tracing::error!(error = %e, user_id = %user_id,
                                "failed to cascade user deletion through conversations");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to deserialize user.deleted event");
                    }
                }
                let _ = delivery.ack(BasicAckOptions::default()).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "consumer error");
            }
        }
    }

    Ok(())
}
