//! Pending-operation registry.
//!
//! Every asynchronous request issued by the host is tracked here: `issue`
//! allocates a handle plus a [`Completion`] future, and the runtime thread
//! later posts the outcome through `resolve`/`reject`. Handles are the only
//! thing that crosses the thread boundary; the registry is the indirection
//! table that matches a completion back to its waiter.

use crate::engine::error::Error;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Identifier of one in-flight asynchronous operation.
pub(crate) type OpHandle = u64;

/// Result type tag carried by each pending slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OpKind {
    /// The operation produces no value (`start`, `stop`).
    Void,
    /// The operation produces encoded result text (`call_script`).
    Text,
}

/// Value posted by the runtime thread when an operation succeeds.
#[derive(Debug)]
pub(crate) enum OpValue {
    Void,
    Text(String),
}

impl OpValue {
    fn kind(&self) -> OpKind {
        match self {
            OpValue::Void => OpKind::Void,
            OpValue::Text(_) => OpKind::Text,
        }
    }

    fn into_unit(self) {}

    fn into_text(self) -> String {
        match self {
            OpValue::Text(text) => text,
            OpValue::Void => String::new(),
        }
    }
}

struct Slot {
    kind: OpKind,
    tx: oneshot::Sender<Result<OpValue, Error>>,
}

/// Registry of in-flight asynchronous operations.
///
/// Each handle is resolved at most once: the slot is removed on the first
/// `resolve`/`reject`, so a duplicate (or unknown) completion finds nothing
/// and is logged and dropped rather than overwriting a delivered result.
pub(crate) struct PendingOps {
    slots: Mutex<HashMap<OpHandle, Slot>>,
    next_handle: AtomicU64,
}

impl PendingOps {
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    fn issue(&self, kind: OpKind) -> (OpHandle, oneshot::Receiver<Result<OpValue, Error>>) {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.slots
            .lock()
            .unwrap()
            .insert(handle, Slot { kind, tx });
        (handle, rx)
    }

    /// Allocate a pending operation that resolves to `()`.
    pub(crate) fn issue_void(&self) -> (OpHandle, Completion<()>) {
        let (handle, rx) = self.issue(OpKind::Void);
        (handle, Completion::new(rx, OpValue::into_unit))
    }

    /// Allocate a pending operation that resolves to encoded result text.
    pub(crate) fn issue_text(&self) -> (OpHandle, Completion<String>) {
        let (handle, rx) = self.issue(OpKind::Text);
        (handle, Completion::new(rx, OpValue::into_text))
    }

    /// Fulfil an operation. Called once from the runtime thread.
    pub(crate) fn resolve(&self, handle: OpHandle, value: OpValue) {
        if let Some(slot) = self.take(handle, "resolve") {
            if slot.kind != value.kind() {
                log::warn!(
                    "{}",
                    Error::Protocol(format!(
                        "operation #{} resolved with a {:?} value but was issued as {:?}",
                        handle,
                        value.kind(),
                        slot.kind
                    ))
                );
            }
            let _ = slot.tx.send(Ok(value));
        }
    }

    /// Fail an operation. Called once from the runtime thread.
    pub(crate) fn reject(&self, handle: OpHandle, error: Error) {
        if let Some(slot) = self.take(handle, "reject") {
            let _ = slot.tx.send(Err(error));
        }
    }

    /// Drop a slot without notifying the waiter. Used when an operation was
    /// issued but its command could not be submitted.
    pub(crate) fn discard(&self, handle: OpHandle) {
        self.slots.lock().unwrap().remove(&handle);
    }

    /// Force-resolve every outstanding operation with [`Error::Cancelled`].
    /// Invoked by the lifecycle transition to `Stopped`.
    pub(crate) fn cancel_all(&self) {
        let drained: Vec<(OpHandle, Slot)> =
            self.slots.lock().unwrap().drain().collect();
        for (handle, slot) in drained {
            log::debug!("cancelling pending operation #{}", handle);
            let _ = slot.tx.send(Err(Error::Cancelled));
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    fn take(&self, handle: OpHandle, verb: &str) -> Option<Slot> {
        let slot = self.slots.lock().unwrap().remove(&handle);
        if slot.is_none() {
            // Defect in the completion path; never corrupt a delivered result.
            log::warn!(
                "{}",
                Error::Protocol(format!(
                    "attempted to {} unknown or already-resolved operation #{}",
                    verb, handle
                ))
            );
        }
        slot
    }
}

/// Host-side future for one pending operation.
///
/// Resolves with the operation's value, or with the failure the runtime
/// posted. If the registry disappears without resolving the slot (engine
/// dropped mid-flight), the waiter observes [`Error::Cancelled`].
pub struct Completion<T> {
    rx: oneshot::Receiver<Result<OpValue, Error>>,
    map: fn(OpValue) -> T,
}

impl<T> Completion<T> {
    fn new(rx: oneshot::Receiver<Result<OpValue, Error>>, map: fn(OpValue) -> T) -> Self {
        Self { rx, map }
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(Ok(value))) => Poll::Ready(Ok((this.map)(value))),
            Poll::Ready(Ok(Err(error))) => Poll::Ready(Err(error)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_delivers_value_to_waiter() {
        let ops = PendingOps::new();
        let (handle, completion) = ops.issue_text();

        ops.resolve(handle, OpValue::Text("42".to_string()));

        assert_eq!(completion.await.unwrap(), "42");
        assert_eq!(ops.len(), 0);
    }

    #[tokio::test]
    async fn test_reject_delivers_error_to_waiter() {
        let ops = PendingOps::new();
        let (handle, completion) = ops.issue_void();

        ops.reject(handle, Error::Script("boom".to_string()));

        assert!(matches!(completion.await, Err(Error::Script(_))));
    }

    #[tokio::test]
    async fn test_out_of_order_resolution_has_no_cross_delivery() {
        let ops = PendingOps::new();
        let (handle_a, completion_a) = ops.issue_text();
        let (handle_b, completion_b) = ops.issue_text();

        // Resolve B before A; each waiter must observe only its own result.
        ops.resolve(handle_b, OpValue::Text("b".to_string()));
        ops.resolve(handle_a, OpValue::Text("a".to_string()));

        assert_eq!(completion_a.await.unwrap(), "a");
        assert_eq!(completion_b.await.unwrap(), "b");
    }

    #[tokio::test]
    async fn test_duplicate_resolution_is_dropped() {
        let ops = PendingOps::new();
        let (handle, completion) = ops.issue_text();

        ops.resolve(handle, OpValue::Text("first".to_string()));
        // The second resolution targets an already-resolved handle and must
        // not overwrite the delivered result.
        ops.resolve(handle, OpValue::Text("second".to_string()));

        assert_eq!(completion.await.unwrap(), "first");
    }

    #[tokio::test]
    async fn test_unknown_handle_resolution_is_dropped() {
        let ops = PendingOps::new();
        ops.resolve(9999, OpValue::Void);
        ops.reject(9999, Error::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_all_rejects_every_outstanding_waiter_once() {
        let ops = PendingOps::new();
        let (_, completion_a) = ops.issue_void();
        let (_, completion_b) = ops.issue_text();

        ops.cancel_all();

        assert!(matches!(completion_a.await, Err(Error::Cancelled)));
        assert!(matches!(completion_b.await, Err(Error::Cancelled)));
        assert_eq!(ops.len(), 0);
    }

    #[tokio::test]
    async fn test_dropped_registry_cancels_waiter() {
        let ops = PendingOps::new();
        let (_, completion) = ops.issue_text();

        drop(ops);

        assert!(matches!(completion.await, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_discard_removes_slot_without_notifying() {
        let ops = PendingOps::new();
        let (handle, completion) = ops.issue_void();

        ops.discard(handle);
        assert_eq!(ops.len(), 0);

        // The waiter sees the channel close as a cancellation.
        assert!(matches!(completion.await, Err(Error::Cancelled)));
    }
}
