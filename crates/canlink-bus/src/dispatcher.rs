//! Routes decoded frames to listeners keyed by (marker, identifier).

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use canlink_frame::{hex_identifier, Frame, Marker};
use canlink_transport::BoxFuture;
use futures_util::future::join_all;
use tracing::{debug, trace};

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a listener. Clones of a [`Listener`] share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type SyncCallback = Arc<dyn Fn(&Frame) + Send + Sync>;
type AsyncCallback = Arc<dyn Fn(Frame) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Clone)]
enum Callback {
    Sync(SyncCallback),
    Async(AsyncCallback),
}

/// A frame callback, either invoked inline or awaited.
#[derive(Clone)]
pub struct Listener {
    id: ListenerId,
    callback: Callback,
}

impl Listener {
    /// A listener invoked inline during dispatch.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        Self::with_callback(Callback::Sync(Arc::new(f)))
    }

    /// A listener whose future is awaited, concurrently with the other async
    /// listeners of the same frame.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Frame) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: AsyncCallback =
            Arc::new(move |frame: Frame| -> BoxFuture<'static, ()> { Box::pin(f(frame)) });
        Self::with_callback(Callback::Async(callback))
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn is_async(&self) -> bool {
        matches!(self.callback, Callback::Async(_))
    }

    fn with_callback(callback: Callback) -> Self {
        Self {
            id: ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed)),
            callback,
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("async", &self.is_async())
            .finish()
    }
}

/// Routing key of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    pub marker: Marker,
    pub identifier: u32,
}

impl SubscriptionKey {
    pub fn new(marker: Marker, identifier: u32) -> Self {
        Self { marker, identifier }
    }

    /// The key a frame is routed under.
    pub fn of(frame: &Frame) -> Self {
        Self::new(frame.marker, frame.identifier)
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.marker, hex_identifier(self.identifier))
    }
}

/// Concurrency-safe subscription registry.
///
/// Dispatch works on a snapshot of the listeners, so subscribing or
/// unsubscribing from inside a callback is allowed.
#[derive(Default)]
pub struct Dispatcher {
    registry: Mutex<HashMap<SubscriptionKey, Vec<Listener>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` under `(marker, identifier)`.
    ///
    /// Returns `false` if it was already registered there.
    pub fn subscribe(&self, identifier: u32, marker: Marker, listener: &Listener) -> bool {
        let key = SubscriptionKey::new(marker, identifier);
        let mut registry = self.registry();
        let listeners = registry.entry(key).or_default();
        if listeners.iter().any(|l| l.id == listener.id) {
            return false;
        }
        listeners.push(listener.clone());
        debug!(%key, listener = listener.id.0, "subscribed");
        true
    }

    /// Remove `listener` from `(marker, identifier)`.
    ///
    /// Returns `false` if it was not registered there.
    pub fn unsubscribe(&self, identifier: u32, marker: Marker, listener: &Listener) -> bool {
        let key = SubscriptionKey::new(marker, identifier);
        let mut registry = self.registry();
        let Some(listeners) = registry.get_mut(&key) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|l| l.id != listener.id);
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            registry.remove(&key);
        }
        if removed {
            debug!(%key, listener = listener.id.0, "unsubscribed");
        }
        removed
    }

    pub fn listener_count(&self, key: SubscriptionKey) -> usize {
        self.registry().get(&key).map_or(0, Vec::len)
    }

    /// Keys with at least one listener, sorted.
    pub fn keys(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<_> = self.registry().keys().copied().collect();
        keys.sort();
        keys
    }

    /// Deliver `frame` to the listeners of its own key.
    ///
    /// Sync listeners run inline; async listeners run concurrently and are
    /// all awaited before this returns. Returns the number of listeners.
    pub async fn dispatch(&self, frame: &Frame) -> usize {
        let key = SubscriptionKey::of(frame);
        let listeners = self.registry().get(&key).cloned().unwrap_or_default();
        if listeners.is_empty() {
            trace!(%key, "no listeners");
            return 0;
        }

        let mut pending = Vec::new();
        for listener in &listeners {
            match &listener.callback {
                Callback::Sync(f) => f(frame),
                Callback::Async(f) => pending.push(f(*frame)),
            }
        }
        if !pending.is_empty() {
            join_all(pending).await;
        }
        trace!(%key, listeners = listeners.len(), "dispatched");
        listeners.len()
    }

    /// Dispatch frames one at a time, in order.
    pub async fn dispatch_batch(&self, frames: &[Frame]) {
        for frame in frames {
            self.dispatch(frame).await;
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<SubscriptionKey, Vec<Listener>>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("keys", &self.keys())
            .finish()
    }
}
