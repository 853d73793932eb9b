//! Single-assignment slots keyed by draft identity.
//!
//! A slot is claimed exactly once; the claimant performs the work and
//! completes the slot, while later claimants of the same key wait on a
//! oneshot channel for the result. Unrelated keys never contend: the
//! map's mutex is held only to mutate the map, never across an await.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use tokio::sync::oneshot;

/// Outcome of claiming a key.
pub enum Claim<V> {
    /// The caller owns this key and must eventually call
    /// [`SlotMap::complete`] for it.
    Leader,
    /// Another caller owns the key; await its result.
    Wait(oneshot::Receiver<V>),
    /// The key already completed.
    Ready(V),
}

enum Slot<V> {
    Pending(Vec<oneshot::Sender<V>>),
    Done(V),
}

/// A map of single-assignment result cells.
pub struct SlotMap<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K: Eq + Hash, V: Clone> SlotMap<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Claims `key`: the first caller becomes the leader, later
    /// callers get a receiver (or the finished value).
    pub fn claim(&self, key: K) -> Claim<V> {
        let mut slots = self.slots.lock().expect("slot map mutex poisoned");
        match slots.entry(key) {
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(Slot::Pending(Vec::new()));
                Claim::Leader
            }
            std::collections::hash_map::Entry::Occupied(mut entry) => match entry.get_mut() {
                Slot::Pending(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Claim::Wait(rx)
                }
                Slot::Done(value) => Claim::Ready(value.clone()),
            },
        }
    }

    /// Completes `key`, waking every waiter with a clone of `value`.
    pub fn complete(&self, key: &K, value: V)
    where
        K: Clone,
    {
        let mut slots = self.slots.lock().expect("slot map mutex poisoned");
        let previous = slots.insert(key.clone(), Slot::Done(value.clone()));
        if let Some(Slot::Pending(waiters)) = previous {
            for waiter in waiters {
                // A dropped receiver just means the waiter gave up.
                let _ = waiter.send(value.clone());
            }
        }
    }

    /// The finished value for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let slots = self.slots.lock().expect("slot map mutex poisoned");
        match slots.get(key) {
            Some(Slot::Done(value)) => Some(value.clone()),
            _ => None,
        }
    }
}

impl<K: Eq + Hash, V: Clone> Default for SlotMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_claim_leads_later_claims_wait() {
        let slots: SlotMap<&str, u32> = SlotMap::new();
        assert!(matches!(slots.claim("a"), Claim::Leader));
        let Claim::Wait(rx) = slots.claim("a") else {
            panic!("second claim should wait");
        };
        slots.complete(&"a", 7);
        assert_eq!(rx.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn claim_after_completion_is_ready() {
        let slots: SlotMap<&str, u32> = SlotMap::new();
        assert!(matches!(slots.claim("a"), Claim::Leader));
        slots.complete(&"a", 7);
        assert!(matches!(slots.claim("a"), Claim::Ready(7)));
        assert_eq!(slots.get(&"a"), Some(7));
    }

    #[tokio::test]
    async fn unrelated_keys_do_not_contend() {
        let slots: SlotMap<&str, u32> = SlotMap::new();
        assert!(matches!(slots.claim("a"), Claim::Leader));
        assert!(matches!(slots.claim("b"), Claim::Leader));
        slots.complete(&"b", 2);
        assert_eq!(slots.get(&"a"), None);
        assert_eq!(slots.get(&"b"), Some(2));
    }

    #[tokio::test]
    async fn every_waiter_gets_the_value() {
        let slots: SlotMap<&str, u32> = SlotMap::new();
        assert!(matches!(slots.claim("a"), Claim::Leader));
        let receivers: Vec<_> = (0..3)
            .map(|_| match slots.claim("a") {
                Claim::Wait(rx) => rx,
                _ => panic!("expected wait"),
            })
            .collect();
        slots.complete(&"a", 9);
        for rx in receivers {
            assert_eq!(rx.await.unwrap(), 9);
        }
    }
}
