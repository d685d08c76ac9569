//! Typed synchronous event emitter.
//!
//! An [`Emitter<E>`] carries one event type. Listeners run synchronously in
//! registration order; [`Emitter::on`] hands back a [`Subscription`] that
//! detaches the listener when disposed. The middleware layer uses this both
//! for its `change` notifications and for per-frame resolution events.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::disposal::{Disposable, DisposeFn};

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct EmitterInner<E> {
    listeners: Mutex<Vec<(u64, Listener<E>)>>,
    next_id: AtomicU64,
    disposed: AtomicBool,
}

/// A cheap-to-clone handle to one event channel.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use silsila_support::events::Emitter;
/// use silsila_support::disposal::Disposable;
///
/// let emitter: Emitter<u32> = Emitter::new();
/// let seen = Arc::new(AtomicU32::new(0));
/// let sub = emitter.on({
///     let seen = seen.clone();
///     move |value| { seen.fetch_add(*value, Ordering::SeqCst); }
/// });
///
/// emitter.emit(&2);
/// emitter.emit(&3);
/// assert_eq!(seen.load(Ordering::SeqCst), 5);
///
/// sub.dispose();
/// emitter.emit(&100);
/// assert_eq!(seen.load(Ordering::SeqCst), 5);
/// ```
pub struct Emitter<E> {
    inner: Arc<EmitterInner<E>>,
}

impl<E> Clone for Emitter<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: 'static> Default for Emitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> Emitter<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Attaches a listener; the returned [`Subscription`] removes it.
    ///
    /// Listening on a disposed emitter returns an already-dead subscription.
    pub fn on(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
        if self.inner.disposed.load(Ordering::Acquire) {
            return Subscription::dead();
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(listener)));

        let weak: Weak<EmitterInner<E>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.lock().retain(|(lid, _)| *lid != id);
            }
        })
    }

    /// Invokes all listeners synchronously, in registration order.
    ///
    /// The listener set is snapshotted first, so listeners may attach or
    /// detach others without deadlocking the emit.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in snapshot {
            (*listener)(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}

impl<E> Disposable for Emitter<E> {
    fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.listeners.lock().clear();
    }
}

/// Removes one listener from its emitter when disposed.
pub struct Subscription {
    hook: DisposeFn,
}

impl Subscription {
    fn new(remove: impl FnOnce() + Send + 'static) -> Self {
        Self {
            hook: DisposeFn::new(remove),
        }
    }

    fn dead() -> Self {
        let hook = DisposeFn::new(|| {});
        hook.dispose();
        Self { hook }
    }
}

impl Disposable for Subscription {
    fn is_disposed(&self) -> bool {
        self.hook.is_disposed()
    }

    fn dispose(&self) {
        self.hook.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn listeners_fire_in_registration_order() {
        let emitter: Emitter<()> = Emitter::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            // Subscriptions intentionally dropped; listeners stay attached.
            let _ = emitter.on(move |_| order.lock().push(tag));
        }

        emitter.emit(&());
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn disposed_subscription_stops_receiving() {
        let emitter: Emitter<u32> = Emitter::new();
        let seen = Arc::new(AtomicU32::new(0));
        let sub = emitter.on({
            let seen = seen.clone();
            move |v| {
                seen.fetch_add(*v, Ordering::SeqCst);
            }
        });

        emitter.emit(&1);
        sub.dispose();
        emitter.emit(&1);

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(sub.is_disposed());
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn listener_may_detach_another_during_emit() {
        let emitter: Emitter<()> = Emitter::new();
        let hits = Arc::new(AtomicU32::new(0));

        let victim = Arc::new(emitter.on({
            let hits = hits.clone();
            move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }
        }));
        let _killer = emitter.on({
            let victim = victim.clone();
            move |_| victim.dispose()
        });

        // Snapshot semantics: the victim still sees the emit that kills it.
        emitter.emit(&());
        emitter.emit(&());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispose_clears_all_listeners() {
        let emitter: Emitter<u32> = Emitter::new();
        let seen = Arc::new(AtomicU32::new(0));
        let _sub = emitter.on({
            let seen = seen.clone();
            move |v| {
                seen.fetch_add(*v, Ordering::SeqCst);
            }
        });

        emitter.dispose();
        emitter.emit(&7);

        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(emitter.listener_count(), 0);
        assert!(emitter.on(|_| {}).is_disposed());
    }
}
