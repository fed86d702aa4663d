//! Model world.
//!
//! The oracle against which the harness is verified: which clients are
//! connected, which rooms each has joined, which messages are live, and the
//! events each client should have received.

use std::collections::BTreeSet;

use studyroom_proto::ErrorCode;

use super::{
    message_content,
    operation::{ClientId, ModelRoomId, Operation, OperationResult},
};

/// A message as the model tracks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMessage {
    /// Global send order; also encoded in the content.
    pub seq: u64,
    /// Room it was posted to.
    pub room_id: ModelRoomId,
    /// Sending client.
    pub sender: ClientId,
}

/// An event as a client observes it, with real ids mapped to model ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    /// `authenticated`
    Authenticated,
    /// `chatHistory`
    History(Vec<ModelMessage>),
    /// `message`
    Message(ModelMessage),
    /// `messageDeleted`
    Deleted(u64),
    /// `error`
    Error(ErrorCode),
}

#[derive(Debug, Clone, Default)]
struct ModelClient {
    connected: bool,
    joined: BTreeSet<ModelRoomId>,
    inbox: Vec<Observed>,
}

/// Model world: clients, live messages, and expected deliveries.
#[derive(Debug, Clone)]
pub struct ModelWorld {
    clients: Vec<ModelClient>,
    /// Live messages in send order
    live: Vec<ModelMessage>,
    next_seq: u64,
}

impl ModelWorld {
    /// `num_clients` clients, all connected and authenticated, inboxes empty.
    pub fn new(num_clients: usize) -> Self {
        let client = ModelClient { connected: true, ..Default::default() };
        Self { clients: vec![client; num_clients], live: Vec::new(), next_seq: 0 }
    }

    /// Number of clients in the world.
    pub fn num_clients(&self) -> usize {
        self.clients.len()
    }

    /// Whether `client_id` currently has a connection.
    pub fn is_connected(&self, client_id: ClientId) -> bool {
        self.client(client_id).is_some_and(|c| c.connected)
    }

    /// Content the next `Send` will carry.
    pub fn next_content(&self) -> String {
        message_content(self.next_seq)
    }

    /// Message a `Delete` with `pick` would target.
    pub fn delete_target(&self, pick: u8) -> Option<&ModelMessage> {
        if self.live.is_empty() {
            return None;
        }
        self.live.get(usize::from(pick) % self.live.len())
    }

    /// Live messages of `room_id` in history order.
    pub fn history(&self, room_id: ModelRoomId) -> Vec<ModelMessage> {
        self.live.iter().filter(|m| m.room_id == room_id).cloned().collect()
    }

    /// Expected deliveries to `client_id` since the last take.
    pub fn take_inbox(&mut self, client_id: ClientId) -> Vec<Observed> {
        self.client_mut(client_id).map(|c| std::mem::take(&mut c.inbox)).unwrap_or_default()
    }

    /// Apply an operation and return the result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        let client_id = op.client_id();

        if usize::from(client_id) >= self.clients.len() {
            return OperationResult::Skipped;
        }

        let online = self.is_connected(client_id);
        match op {
            Operation::Reconnect { .. } if !online => {
                self.apply_reconnect(client_id);
                OperationResult::Applied
            },
            Operation::Reconnect { .. } => OperationResult::Skipped,
            _ if !online => OperationResult::Skipped,
            Operation::Join { room_id, .. } => {
                self.apply_join(client_id, *room_id);
                OperationResult::Applied
            },
            Operation::Leave { room_id, .. } => {
                self.apply_leave(client_id, *room_id);
                OperationResult::Applied
            },
            Operation::Send { room_id, .. } => {
                self.apply_send(client_id, *room_id);
                OperationResult::Applied
            },
            Operation::Delete { pick, .. } => self.apply_delete(client_id, *pick),
            Operation::Disconnect { .. } => {
                self.apply_disconnect(client_id);
                OperationResult::Applied
            },
        }
    }

    fn apply_join(&mut self, client_id: ClientId, room_id: ModelRoomId) {
        let history = self.history(room_id);
        if let Some(client) = self.client_mut(client_id) {
            client.joined.insert(room_id);
            client.inbox.push(Observed::History(history));
        }
    }

    fn apply_leave(&mut self, client_id: ClientId, room_id: ModelRoomId) {
        if let Some(client) = self.client_mut(client_id) {
            client.joined.remove(&room_id);
        }
    }

    fn apply_send(&mut self, client_id: ClientId, room_id: ModelRoomId) {
        let message = ModelMessage { seq: self.next_seq, room_id, sender: client_id };
        self.next_seq += 1;

        self.broadcast(room_id, &Observed::Message(message.clone()));
        self.live.push(message);
    }

    fn apply_delete(&mut self, client_id: ClientId, pick: u8) -> OperationResult {
        let Some(target) = self.delete_target(pick).cloned() else {
            return OperationResult::Skipped;
        };

        if target.sender != client_id {
            if let Some(client) = self.client_mut(client_id) {
                client.inbox.push(Observed::Error(ErrorCode::Unauthorized));
            }
            return OperationResult::Rejected(ErrorCode::Unauthorized);
        }

        self.live.retain(|m| m.seq != target.seq);
        self.broadcast(target.room_id, &Observed::Deleted(target.seq));
        OperationResult::Applied
    }

    fn apply_disconnect(&mut self, client_id: ClientId) {
        if let Some(client) = self.client_mut(client_id) {
            client.connected = false;
            client.joined.clear();
        }
    }

    fn apply_reconnect(&mut self, client_id: ClientId) {
        if let Some(client) = self.client_mut(client_id) {
            client.connected = true;
            client.inbox.push(Observed::Authenticated);
        }
    }

    fn broadcast(&mut self, room_id: ModelRoomId, event: &Observed) {
        for client in &mut self.clients {
            if client.connected && client.joined.contains(&room_id) {
                client.inbox.push(event.clone());
            }
        }
    }

    fn client(&self, client_id: ClientId) -> Option<&ModelClient> {
        self.clients.get(usize::from(client_id))
    }

    fn client_mut(&mut self, client_id: ClientId) -> Option<&mut ModelClient> {
        self.clients.get_mut(usize::from(client_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_reaches_joined_clients_only() {
        let mut world = ModelWorld::new(3);
        world.apply(&Operation::Join { client_id: 0, room_id: 1 });
        world.apply(&Operation::Join { client_id: 1, room_id: 1 });
        world.take_inbox(0);
        world.take_inbox(1);

        world.apply(&Operation::Send { client_id: 2, room_id: 1 });

        let expected = Observed::Message(ModelMessage { seq: 0, room_id: 1, sender: 2 });
        assert_eq!(world.take_inbox(0), vec![expected.clone()]);
        assert_eq!(world.take_inbox(1), vec![expected]);
        assert!(world.take_inbox(2).is_empty());
    }

    #[test]
    fn only_sender_may_delete() {
        let mut world = ModelWorld::new(2);
        world.apply(&Operation::Send { client_id: 0, room_id: 1 });

        let result = world.apply(&Operation::Delete { client_id: 1, pick: 0 });
        assert_eq!(result, OperationResult::Rejected(ErrorCode::Unauthorized));
        assert_eq!(world.history(1).len(), 1);

        let result = world.apply(&Operation::Delete { client_id: 0, pick: 0 });
        assert_eq!(result, OperationResult::Applied);
        assert!(world.history(1).is_empty());
    }

    #[test]
    fn disconnected_client_is_skipped_until_reconnect() {
        let mut world = ModelWorld::new(1);
        world.apply(&Operation::Join { client_id: 0, room_id: 1 });
        world.apply(&Operation::Disconnect { client_id: 0 });

        assert_eq!(
            world.apply(&Operation::Send { client_id: 0, room_id: 1 }),
            OperationResult::Skipped
        );
        assert_eq!(world.apply(&Operation::Reconnect { client_id: 0 }), OperationResult::Applied);
        assert!(world.is_connected(0));
    }
}
