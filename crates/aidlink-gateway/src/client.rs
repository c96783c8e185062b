//! Client-side building blocks for a gateway subscription: the channel
//! lifecycle state machine with send gating and resubscribe backoff, and
//! the deduplicating view a conversation screen keeps over at-least-once
//! message delivery.

use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use aidlink_types::models::Message;

/// Externally observable subscription states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Error)]
#[error("gateway channel is {status:?}; refusing to send")]
pub struct SendRejected {
    pub status: ChannelStatus,
}

const INITIAL_RETRY: Duration = Duration::from_secs(1);
const MAX_RETRY: Duration = Duration::from_secs(30);

/// Lifecycle of one channel subscription.
///
/// While not connected, outgoing sends are rejected rather than silently
/// queued: a caller may only believe a message was delivered when the send
/// path succeeded. Unsubscribing is explicit and terminal; it stops any
/// further resubscription so other users observe a timely offline
/// transition.
#[derive(Debug)]
pub struct ChannelSubscription {
    status: ChannelStatus,
    cancelled: bool,
    attempts: u32,
}

impl ChannelSubscription {
    pub fn new() -> Self {
        Self {
            status: ChannelStatus::Connecting,
            cancelled: false,
            attempts: 0,
        }
    }

    pub fn status(&self) -> ChannelStatus {
        self.status
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// The server acknowledged the subscription.
    pub fn on_connected(&mut self) {
        if !self.cancelled {
            self.status = ChannelStatus::Connected;
            self.attempts = 0;
        }
    }

    /// The transport errored or closed.
    pub fn on_disconnected(&mut self) {
        if !self.cancelled {
            self.status = ChannelStatus::Disconnected;
        }
    }

    /// Start a resubscribe attempt. Returns the backoff to wait before
    /// dialing, or None when the subscription is cancelled or not in the
    /// disconnected state. Backoff doubles from 1s and caps at 30s; a
    /// successful connect resets it.
    pub fn begin_resubscribe(&mut self) -> Option<Duration> {
        if self.cancelled || self.status != ChannelStatus::Disconnected {
            return None;
        }

        let delay = INITIAL_RETRY
            .checked_mul(2u32.saturating_pow(self.attempts))
            .unwrap_or(MAX_RETRY)
            .min(MAX_RETRY);
        self.attempts += 1;
        self.status = ChannelStatus::Connecting;
        Some(delay)
    }

    /// Gate an outgoing send on the channel being connected.
    pub fn guard_send(&self) -> Result<(), SendRejected> {
        if !self.cancelled && self.status == ChannelStatus::Connected {
            Ok(())
        } else {
            Err(SendRejected {
                status: self.status,
            })
        }
    }

    /// Explicit teardown. Idempotent.
    pub fn unsubscribe(&mut self) {
        self.cancelled = true;
        self.status = ChannelStatus::Disconnected;
    }
}

impl Default for ChannelSubscription {
    fn default() -> Self {
        Self::new()
    }
}

/// Local message list for one open conversation. The same insert can be
/// observed via both the direct append response and the live stream, so
/// arrivals are deduplicated by id and kept in (created_at, id) order
/// regardless of arrival order.
#[derive(Debug, Default)]
pub struct ConversationView {
    seen: HashSet<Uuid>,
    messages: Vec<Message>,
}

impl ConversationView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false for a duplicate, which must not change the view.
    pub fn ingest(&mut self, message: Message) -> bool {
        if !self.seen.insert(message.id) {
            return false;
        }

        let at = self
            .messages
            .partition_point(|m| (m.created_at, m.id) <= (message.created_at, message.id));
        self.messages.insert(at, message);
        true
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn starts_connecting_and_rejects_sends_until_connected() {
        let mut sub = ChannelSubscription::new();
        assert_eq!(sub.status(), ChannelStatus::Connecting);
        assert!(sub.guard_send().is_err());

        sub.on_connected();
        assert_eq!(sub.status(), ChannelStatus::Connected);
        assert!(sub.guard_send().is_ok());
    }

    #[test]
    fn disconnect_gates_sends_and_backoff_grows_to_the_cap() {
        let mut sub = ChannelSubscription::new();
        sub.on_connected();
        sub.on_disconnected();
        assert!(sub.guard_send().is_err());

        let mut delays = Vec::new();
        for _ in 0..7 {
            delays.push(sub.begin_resubscribe().unwrap());
            // Dial failed; back to disconnected.
            sub.on_disconnected();
        }

        assert_eq!(delays[0], Duration::from_secs(1));
        assert_eq!(delays[1], Duration::from_secs(2));
        assert_eq!(delays[2], Duration::from_secs(4));
        assert_eq!(*delays.last().unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn successful_reconnect_resets_the_backoff() {
        let mut sub = ChannelSubscription::new();
        sub.on_connected();
        sub.on_disconnected();
        sub.begin_resubscribe().unwrap();
        sub.on_connected();

        sub.on_disconnected();
        assert_eq!(sub.begin_resubscribe().unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn resubscribe_only_applies_when_disconnected() {
        let mut sub = ChannelSubscription::new();
        assert!(sub.begin_resubscribe().is_none());
        sub.on_connected();
        assert!(sub.begin_resubscribe().is_none());
    }

    #[test]
    fn unsubscribe_is_terminal() {
        let mut sub = ChannelSubscription::new();
        sub.on_connected();
        sub.unsubscribe();

        assert_eq!(sub.status(), ChannelStatus::Disconnected);
        assert!(sub.guard_send().is_err());
        assert!(sub.begin_resubscribe().is_none());

        // Late transport callbacks must not resurrect the channel.
        sub.on_connected();
        assert_eq!(sub.status(), ChannelStatus::Disconnected);

        sub.unsubscribe();
        assert!(sub.is_cancelled());
    }

    fn message(id: Uuid, conversation_id: Uuid, secs: i64) -> Message {
        Message {
            id,
            conversation_id,
            sender_id: Uuid::new_v4(),
            body: "hello".into(),
            is_read: false,
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[test]
    fn view_deduplicates_by_id() {
        let mut view = ConversationView::new();
        let conversation = Uuid::new_v4();
        let m = message(Uuid::new_v4(), conversation, 0);

        // Direct response first, then the live stream echo.
        assert!(view.ingest(m.clone()));
        assert!(!view.ingest(m));
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn view_orders_out_of_order_arrivals() {
        let mut view = ConversationView::new();
        let conversation = Uuid::new_v4();
        let early = message(Uuid::new_v4(), conversation, 1);
        let late = message(Uuid::new_v4(), conversation, 2);

        assert!(view.ingest(late.clone()));
        assert!(view.ingest(early.clone()));

        let ids: Vec<Uuid> = view.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![early.id, late.id]);
    }

    #[test]
    fn view_breaks_timestamp_ties_by_id() {
        let mut view = ConversationView::new();
        let conversation = Uuid::new_v4();
        let mut a = message(Uuid::new_v4(), conversation, 5);
        let mut b = message(Uuid::new_v4(), conversation, 5);
        if a.id > b.id {
            std::mem::swap(&mut a, &mut b);
        }

        view.ingest(b.clone());
        view.ingest(a.clone());

        let ids: Vec<Uuid> = view.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }
}
