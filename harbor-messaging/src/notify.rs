//! Outbound notification port. The contract is attempt-delivery-never-fail:
//! a push that cannot be delivered is logged and dropped, and no request
//! ever fails because of it. Handlers depend on the trait, not on the
//! transport behind it.

use socketioxide::SocketIo;
use uuid::Uuid;

pub trait Notifier: Send + Sync {
    /// Push an event to all of the user's live connections, if any.
    fn notify(&self, user_id: Uuid, event: &str, payload: &serde_json::Value);
}

/// Socket.IO implementation: emits into the user's room (`user:{id}`),
/// which their authenticated sockets join on connect.
pub struct SocketNotifier {
    io: SocketIo,
}

impl SocketNotifier {
    pub fn new(io: SocketIo) -> Self {
        Self { io }
    }
}

impl Notifier for SocketNotifier {
    fn notify(&self, user_id: Uuid, event: &str, payload: &serde_json::Value) {
        let room = format!("user:{user_id}");
        if let Err(e) = self.io.to(room).emit(event.to_string(), payload) {
            tracing::debug!(user_id = %user_id, event = %event, error = %e,
                "notification dropped");
        }
    }
}
