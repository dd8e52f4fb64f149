//! Request/reply correlation.
//!
//! Each outstanding request owns a one-shot channel registered under its
//! message ID *before* the request is written, so a reply that arrives
//! immediately still finds its slot. The reader task delivers into the
//! channel; closing the correlator drops every sender at once, which wakes
//! all waiters with "connection closed".

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, trace};

use linstor_protocol::Reply;

use crate::error::{ClientError, ClientResult};

#[derive(Debug, Default)]
struct Slots {
    pending: HashMap<u64, oneshot::Sender<Reply>>,
    /// Set once; no slot can be registered afterwards.
    closed: Option<String>,
}

#[derive(Debug)]
struct Inner {
    next_id: AtomicU64,
    slots: Mutex<Slots>,
}

/// Message ID generator plus the map of pending reply slots.
///
/// Cheap to clone; all clones share the same state.
#[derive(Debug, Clone)]
pub struct Correlator {
    inner: Arc<Inner>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    /// Creates a correlator whose first message ID is 1.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(1),
                slots: Mutex::new(Slots::default()),
            }),
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the next unused message ID.
    pub fn next_message_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Opens the reply slot for `msg_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConnectionClosed`] once [`close`](Self::close)
    /// has been called.
    pub fn register(&self, msg_id: u64) -> ClientResult<PendingReply> {
        let (tx, rx) = oneshot::channel();
        let mut slots = self.slots();
        if let Some(reason) = &slots.closed {
            return Err(ClientError::closed(reason.clone()));
        }
        slots.pending.insert(msg_id, tx);
        trace!(msg_id, "reply slot registered");
        Ok(PendingReply {
            msg_id,
            rx: Some(rx),
            correlator: self.clone(),
        })
    }

    /// Hands `reply` to the waiter of `msg_id`.
    ///
    /// Returns `false` if nobody waits for that ID (never registered, timed
    /// out, or cancelled); the reply is dropped.
    pub fn deliver(&self, msg_id: u64, reply: Reply) -> bool {
        let sender = self.slots().pending.remove(&msg_id);
        match sender {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    /// Marks the correlator closed and wakes every pending waiter.
    ///
    /// Idempotent; the first reason is kept.
    pub fn close(&self, reason: impl Into<String>) {
        let drained = {
            let mut slots = self.slots();
            if slots.closed.is_none() {
                slots.closed = Some(reason.into());
            }
            std::mem::take(&mut slots.pending)
        };
        if !drained.is_empty() {
            debug!(waiters = drained.len(), "waking pending requests on close");
        }
        drop(drained);
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.slots().closed.is_some()
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.slots().pending.len()
    }

    fn forget(&self, msg_id: u64) {
        self.slots().pending.remove(&msg_id);
    }

    /// Reason passed to the first [`close`](Self::close), if any.
    pub fn close_reason(&self) -> Option<String> {
        self.slots().closed.clone()
    }

    fn closed_error(&self) -> ClientError {
        ClientError::closed(
            self.close_reason()
                .unwrap_or_else(|| "connection closed".to_string()),
        )
    }
}

/// A registered reply slot, consumed by [`PendingReply::wait`].
///
/// Dropping it, for instance when the waiting future is cancelled, removes
/// the slot so a late reply is discarded instead of accumulating.
#[derive(Debug)]
pub struct PendingReply {
    msg_id: u64,
    rx: Option<oneshot::Receiver<Reply>>,
    correlator: Correlator,
}

impl PendingReply {
    /// Message ID this slot waits for.
    pub fn msg_id(&self) -> u64 {
        self.msg_id
    }

    /// Waits for the reply.
    ///
    /// # Errors
    ///
    /// - [`ClientError::ConnectionClosed`] if the connection closes first.
    /// - [`ClientError::Timeout`] if `deadline` elapses first; other pending
    ///   requests are unaffected.
    pub async fn wait(mut self, deadline: Option<Duration>) -> ClientResult<Reply> {
        let Some(rx) = self.rx.take() else {
            return Err(self.correlator.closed_error());
        };

        let outcome = match deadline {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    return Err(ClientError::timeout(format!(
                        "waiting for reply to message {}",
                        self.msg_id
                    )));
                }
            },
            None => rx.await,
        };

        outcome.map_err(|_| self.correlator.closed_error())
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.correlator.forget(self.msg_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    use linstor_protocol::{ApiCallResponses, MsgLstNode};

    #[test]
    fn ids_start_at_one_and_increase() {
        let correlator = Correlator::new();
        assert_eq!(correlator.next_message_id(), 1);
        assert_eq!(correlator.next_message_id(), 2);
        assert_eq!(correlator.next_message_id(), 3);
    }

    #[test]
    fn concurrent_ids_are_unique() {
        let correlator = Correlator::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let correlator = correlator.clone();
                thread::spawn(move || {
                    (0..1000)
                        .map(|_| correlator.next_message_id())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(id >= 1);
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 8000);
    }

    #[tokio::test]
    async fn replies_reach_their_own_waiter() {
        let correlator = Correlator::new();
        let a = correlator.register(1).unwrap();
        let b = correlator.register(2).unwrap();

        let waiter_a = tokio::spawn(a.wait(Some(Duration::from_secs(5))));

        // deliver B first; A must keep waiting
        assert!(correlator.deliver(2, Reply::Pong));
        assert_eq!(b.wait(None).await.unwrap(), Reply::Pong);
        tokio::task::yield_now().await;
        assert!(!waiter_a.is_finished());

        let nodes = Reply::Nodes(MsgLstNode::default());
        assert!(correlator.deliver(1, nodes.clone()));
        assert_eq!(waiter_a.await.unwrap().unwrap(), nodes);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn reply_before_wait_is_kept() {
        let correlator = Correlator::new();
        let pending = correlator.register(7).unwrap();
        assert!(correlator.deliver(7, Reply::Pong));
        assert_eq!(pending.wait(None).await.unwrap(), Reply::Pong);
    }

    #[tokio::test]
    async fn unknown_id_is_dropped() {
        let correlator = Correlator::new();
        assert!(!correlator.deliver(42, Reply::Pong));
    }

    #[tokio::test]
    async fn close_wakes_every_waiter() {
        let correlator = Correlator::new();
        let waiters: Vec<_> = (1..=5)
            .map(|id| tokio::spawn(correlator.register(id).unwrap().wait(None)))
            .collect();

        tokio::task::yield_now().await;
        correlator.close("remote closed connection");

        for waiter in waiters {
            let result = tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter must not hang")
                .unwrap();
            assert!(matches!(
                result,
                Err(ClientError::ConnectionClosed { reason }) if reason == "remote closed connection"
            ));
        }
        assert!(correlator.is_closed());
    }

    #[tokio::test]
    async fn register_after_close_fails() {
        let correlator = Correlator::new();
        correlator.close("closed by client");
        correlator.close("second reason is ignored");
        assert!(matches!(
            correlator.register(1),
            Err(ClientError::ConnectionClosed { reason }) if reason == "closed by client"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_only_removes_its_own_slot() {
        let correlator = Correlator::new();
        let slow = correlator.register(1).unwrap();
        let other = correlator.register(2).unwrap();

        let result = slow.wait(Some(Duration::from_millis(50))).await;
        assert!(matches!(result, Err(ClientError::Timeout { .. })));
        assert_eq!(correlator.pending_count(), 1);

        // a late reply for the timed out request is discarded
        assert!(!correlator.deliver(1, Reply::Pong));

        let responses = Reply::ApiCallResponses(ApiCallResponses::default());
        assert!(correlator.deliver(2, responses.clone()));
        assert_eq!(other.wait(None).await.unwrap(), responses);
    }

    #[tokio::test]
    async fn cancelled_wait_releases_slot() {
        let correlator = Correlator::new();
        let pending = correlator.register(3).unwrap();
        let task = tokio::spawn(pending.wait(None));
        tokio::task::yield_now().await;
        task.abort();
        let _ = task.await;
        assert_eq!(correlator.pending_count(), 0);
    }
}
