use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use ssap_frame::{Inbound, PayloadShape};
use tokio::sync::mpsc;

use crate::error::{PeerError, Result};

/// A decoded `response` payload whose concrete type only the waiting caller
/// knows.
pub type DecodedPayload = Box<dyn Any + Send>;

type DecodeFn = dyn Fn(&str) -> serde_json::Result<DecodedPayload> + Send + Sync;

/// Type-erased decode target registered alongside a pending slot.
#[derive(Clone)]
pub struct ErasedShape {
    type_name: &'static str,
    decode: Arc<DecodeFn>,
}

impl ErasedShape {
    /// Shape that decodes into `T`; the caller downcasts the result back.
    pub fn of<T: DeserializeOwned + Send + 'static>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            decode: Arc::new(|json| {
                serde_json::from_str::<T>(json).map(|value| Box::new(value) as DecodedPayload)
            }),
        }
    }
}

impl PayloadShape for ErasedShape {
    type Output = DecodedPayload;

    fn decode(&self, json: &str) -> serde_json::Result<DecodedPayload> {
        (self.decode)(json)
    }
}

impl fmt::Debug for ErasedShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ErasedShape").field(&self.type_name).finish()
    }
}

/// A decoded inbound message routed to one pending slot.
#[derive(Debug)]
pub struct Reply {
    pub id: u64,
    /// Top-level `error` string, when present and non-empty.
    pub error: Option<String>,
    pub body: Inbound<DecodedPayload>,
}

/// How long a slot stays registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotMode {
    /// Removed by the first delivery; later replies with the same id are
    /// dropped.
    Single,
    /// Kept until released by the waiter, so several replies can arrive.
    /// Replies queue without bound until the waiter drains them; the slot's
    /// lifetime bounds the queue.
    Stream,
}

struct Slot {
    mode: SlotMode,
    tx: mpsc::UnboundedSender<Reply>,
    shape: Option<ErasedShape>,
}

/// Maps request ids to the callers waiting for them.
///
/// Shared between the receive loop and any number of requesting tasks. The
/// lock is never held across an await point.
#[derive(Default)]
pub struct PendingTable {
    slots: Mutex<HashMap<u64, Slot>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a slot for `id`, returning the guard the caller waits on.
    ///
    /// The slot is released when the guard is dropped.
    pub fn register(
        &self,
        id: u64,
        mode: SlotMode,
        shape: Option<ErasedShape>,
    ) -> Result<SlotGuard<'_>> {
        let mut slots = self.lock();
        if slots.contains_key(&id) {
            return Err(PeerError::DuplicateRequestId(id));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        slots.insert(id, Slot { mode, tx, shape });

        Ok(SlotGuard {
            table: self,
            id,
            rx,
        })
    }

    /// Decode target registered for `id`, if any.
    pub fn shape_for(&self, id: u64) -> Option<ErasedShape> {
        self.lock().get(&id).and_then(|slot| slot.shape.clone())
    }

    /// Hand a reply to the slot registered for its id.
    ///
    /// Returns false when no slot exists (stray, duplicate or late reply) or
    /// the waiter can no longer take it.
    pub fn deliver(&self, reply: Reply) -> bool {
        let mut slots = self.lock();
        let Some(slot) = slots.get(&reply.id) else {
            return false;
        };

        let id = reply.id;
        let delivered = slot.tx.send(reply).is_ok();
        if slot.mode == SlotMode::Single || slot.tx.is_closed() {
            slots.remove(&id);
        }
        delivered
    }

    /// Release the slot for `id`. Safe to call for ids already released.
    pub fn remove(&self, id: u64) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Release every slot; their waiters observe a closed channel.
    pub fn clear(&self) -> usize {
        let mut slots = self.lock();
        let count = slots.len();
        slots.clear();
        count
    }

    /// Number of outstanding slots.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Slot>> {
        // Slots hold no invariants a panicking holder could break.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for PendingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTable")
            .field("len", &self.len())
            .finish()
    }
}

/// Receiving end of a pending slot. Releases the slot on drop, so every
/// exit path of a waiting call (reply, error, timeout, cancellation) cleans
/// up.
pub struct SlotGuard<'a> {
    table: &'a PendingTable,
    id: u64,
    rx: mpsc::UnboundedReceiver<Reply>,
}

impl SlotGuard<'_> {
    /// Wait for the next reply. `None` once the slot has been released by
    /// the table (connection closed).
    pub async fn recv(&mut self) -> Option<Reply> {
        self.rx.recv().await
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.table.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use ssap_frame::{AckPayload, RegisteredPayload};

    use super::*;

    fn response(id: u64, value: DecodedPayload) -> Reply {
        Reply {
            id,
            error: None,
            body: Inbound::Response(value),
        }
    }

    #[tokio::test]
    async fn deliver_routes_by_id() {
        let table = PendingTable::new();
        let mut first = table.register(1, SlotMode::Single, None).unwrap();
        let mut second = table.register(2, SlotMode::Single, None).unwrap();

        assert!(table.deliver(response(2, Box::new("two"))));
        assert!(table.deliver(response(1, Box::new("one"))));

        let reply = first.recv().await.unwrap();
        assert_eq!(reply.id, 1);
        let reply = second.recv().await.unwrap();
        assert_eq!(reply.id, 2);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let table = PendingTable::new();
        let _slot = table.register(5, SlotMode::Single, None).unwrap();
        let err = table.register(5, SlotMode::Single, None).err().unwrap();
        assert!(matches!(err, PeerError::DuplicateRequestId(5)));
    }

    #[test]
    fn unknown_and_duplicate_replies_dropped() {
        let table = PendingTable::new();
        assert!(!table.deliver(response(42, Box::new(()))));

        let _slot = table.register(1, SlotMode::Single, None).unwrap();
        assert!(table.deliver(response(1, Box::new(()))));
        assert!(!table.deliver(response(1, Box::new(()))));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn stream_slot_accepts_several_replies() {
        let table = PendingTable::new();
        let mut slot = table.register(3, SlotMode::Stream, None).unwrap();

        assert!(table.deliver(response(3, Box::new(AckPayload { return_value: true }))));
        assert!(table.deliver(Reply {
            id: 3,
            error: None,
            body: Inbound::Registered(RegisteredPayload {
                client_key: "abc".to_string(),
            }),
        }));
        assert_eq!(table.len(), 1);

        assert!(matches!(
            slot.recv().await.unwrap().body,
            Inbound::Response(_)
        ));
        assert!(matches!(
            slot.recv().await.unwrap().body,
            Inbound::Registered(_)
        ));
    }

    #[tokio::test]
    async fn stream_slot_keeps_terminal_reply_behind_a_burst() {
        let table = PendingTable::new();
        let mut slot = table.register(6, SlotMode::Stream, None).unwrap();

        for _ in 0..32 {
            assert!(table.deliver(response(6, Box::new(AckPayload { return_value: true }))));
        }
        assert!(table.deliver(Reply {
            id: 6,
            error: None,
            body: Inbound::Registered(RegisteredPayload {
                client_key: "k".to_string(),
            }),
        }));

        for _ in 0..32 {
            assert!(matches!(
                slot.recv().await.unwrap().body,
                Inbound::Response(_)
            ));
        }
        match slot.recv().await.unwrap().body {
            Inbound::Registered(payload) => assert_eq!(payload.client_key, "k"),
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn guard_drop_releases_slot() {
        let table = PendingTable::new();
        let slot = table.register(9, SlotMode::Single, None).unwrap();
        assert_eq!(table.len(), 1);
        drop(slot);
        assert!(table.is_empty());
        assert!(!table.remove(9));
        assert!(!table.deliver(response(9, Box::new(()))));
    }

    #[tokio::test]
    async fn clear_wakes_waiters_with_none() {
        let table = PendingTable::new();
        let mut slot = table.register(1, SlotMode::Stream, None).unwrap();
        assert_eq!(table.clear(), 1);
        assert!(slot.recv().await.is_none());
    }

    #[test]
    fn shape_lookup_and_decode() {
        let table = PendingTable::new();
        let _slot = table
            .register(4, SlotMode::Single, Some(ErasedShape::of::<AckPayload>()))
            .unwrap();
        assert!(table.shape_for(5).is_none());

        let shape = table.shape_for(4).unwrap();
        let decoded = shape.decode(r#"{"returnValue":true}"#).unwrap();
        let ack = decoded.downcast::<AckPayload>().unwrap();
        assert!(ack.return_value);
    }
}
