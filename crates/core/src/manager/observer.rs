use std::sync::{Arc, Mutex, MutexGuard, Weak};

pub type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Ordered list of handlers. Fan-out follows registration order.
pub struct ObserverRegistry<T> {
    next_id: u64,
    handlers: Vec<(SubscriptionId, Handler<T>)>,
}

impl<T> Default for ObserverRegistry<T> {
    fn default() -> Self {
        Self { next_id: 0, handlers: Vec::new() }
    }
}

impl<T> ObserverRegistry<T> {
    pub fn register(&mut self, handler: Handler<T>) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.handlers.push((id, handler));
        id
    }

    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(existing, _)| *existing != id);
        self.handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn snapshot(&self) -> Vec<Handler<T>> {
        self.handlers.iter().map(|(_, handler)| Arc::clone(handler)).collect()
    }
}

/// Shared registry; handlers run outside the lock so they may subscribe or unsubscribe.
pub struct Observers<T> {
    registry: Arc<Mutex<ObserverRegistry<T>>>,
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self { registry: Arc::new(Mutex::new(ObserverRegistry::default())) }
    }
}

impl<T: 'static> Observers<T> {
    pub fn subscribe<F>(&self, handler: F) -> Subscription<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = lock(&self.registry).register(Arc::new(handler));
        Subscription { id, registry: Arc::downgrade(&self.registry) }
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.registry).remove(id)
    }

    pub fn notify(&self, value: &T) {
        let handlers = lock(&self.registry).snapshot();
        for handler in handlers {
            handler(value);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.registry).is_empty()
    }
}

/// Deregistration token returned by `subscribe`.
#[must_use = "the handler stays registered until `unsubscribe` is called"]
pub struct Subscription<T> {
    id: SubscriptionId,
    registry: Weak<Mutex<ObserverRegistry<T>>>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns false when the handler was already removed or the owner is gone.
    pub fn unsubscribe(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => lock(&registry).remove(self.id),
            None => false,
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
