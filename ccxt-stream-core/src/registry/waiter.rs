//! Suspendable handles returned by the registry.

use futures::Stream;
use tokio::sync::{oneshot, watch};

use crate::error::{Error, Result};

/// How long a waiter stays registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaiterKind {
    /// Resolved once, then removed. Used for request/response frames.
    OneShot,
    /// Resolved on every matching frame until unsubscribed or closed.
    Persistent,
}

pub(crate) type Slot<V> = Option<Result<V>>;

#[derive(Debug)]
enum Inner<V> {
    OneShot(Option<oneshot::Receiver<Result<V>>>),
    Persistent(watch::Receiver<Slot<V>>),
}

/// Handle a caller suspends on until its message hash is resolved or rejected.
///
/// A persistent waiter is re-awaited in a loop. When several values arrive
/// between two awaits only the latest one is observed.
#[derive(Debug)]
pub struct Waiter<V> {
    message_hash: String,
    inner: Inner<V>,
}

impl<V: Clone> Waiter<V> {
    pub(crate) fn one_shot(message_hash: String, rx: oneshot::Receiver<Result<V>>) -> Self {
        Self {
            message_hash,
            inner: Inner::OneShot(Some(rx)),
        }
    }

    pub(crate) fn persistent(message_hash: String, rx: watch::Receiver<Slot<V>>) -> Self {
        Self {
            message_hash,
            inner: Inner::Persistent(rx),
        }
    }

    /// The message hash this waiter is registered on.
    pub fn message_hash(&self) -> &str {
        &self.message_hash
    }

    /// Kind of this waiter.
    pub fn kind(&self) -> WaiterKind {
        match self.inner {
            Inner::OneShot(_) => WaiterKind::OneShot,
            Inner::Persistent(_) => WaiterKind::Persistent,
        }
    }

    /// Waits for the next resolution or rejection.
    ///
    /// Returns [`Error::ConnectionClosed`] once the registry dropped the entry
    /// without delivering anything further.
    pub async fn recv(&mut self) -> Result<V> {
        match self.next_delivery().await {
            Some(result) => result,
            None => Err(Error::connection_closed(format!(
                "message hash '{}' is no longer registered",
                self.message_hash
            ))),
        }
    }

    async fn next_delivery(&mut self) -> Option<Result<V>> {
        match &mut self.inner {
            Inner::OneShot(slot) => {
                let rx = slot.take()?;
                rx.await.ok()
            }
            Inner::Persistent(rx) => loop {
                rx.changed().await.ok()?;
                if let Some(result) = rx.borrow_and_update().clone() {
                    return Some(result);
                }
            },
        }
    }

    /// Turns the waiter into a stream of deliveries.
    ///
    /// The stream ends when the entry is dropped from the registry. A one-shot
    /// waiter yields at most one item.
    pub fn into_stream(self) -> impl Stream<Item = Result<V>> + Send
    where
        V: Send + Sync + 'static,
    {
        futures::stream::unfold(self, |mut waiter| async move {
            let item = waiter.next_delivery().await?;
            Some((item, waiter))
        })
    }
}
