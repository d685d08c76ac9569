//! Scoped cleanup primitives.
//!
//! Anything that holds releasable state (event subscriptions, middleware
//! managers, containers) implements [`Disposable`]. A [`DisposableRegistry`]
//! collects child disposables and releases them together, so the owner's
//! teardown is a single call.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::warn;

/// A resource with idempotent, explicit teardown.
///
/// `dispose` may be called any number of times; every call after the first
/// is a no-op. Implementations must not panic on repeated disposal.
pub trait Disposable: Send + Sync {
    /// Returns `true` once [`dispose`](Disposable::dispose) has run.
    fn is_disposed(&self) -> bool;

    /// Releases the resource.
    fn dispose(&self);
}

/// A one-shot cleanup callback wrapped as a [`Disposable`].
///
/// # Examples
/// ```
/// use silsila_support::disposal::{Disposable, DisposeFn};
///
/// let hook = DisposeFn::new(|| { /* release something */ });
/// assert!(!hook.is_disposed());
/// hook.dispose();
/// hook.dispose(); // second call is a no-op
/// assert!(hook.is_disposed());
/// ```
pub struct DisposeFn {
    hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl DisposeFn {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self {
            hook: Mutex::new(Some(Box::new(f))),
        }
    }
}

impl Disposable for DisposeFn {
    fn is_disposed(&self) -> bool {
        self.hook.lock().is_none()
    }

    fn dispose(&self) {
        if let Some(f) = self.hook.lock().take() {
            f();
        }
    }
}

/// Collects child disposables and disposes them all at once.
///
/// Children are disposed in registration order. A panicking child is caught
/// and logged so it cannot mask the remaining children's cleanup.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use silsila_support::disposal::{Disposable, DisposableRegistry, DisposeFn};
///
/// let released = Arc::new(AtomicU32::new(0));
/// let registry = DisposableRegistry::new();
/// for _ in 0..3 {
///     let released = released.clone();
///     registry.add(Box::new(DisposeFn::new(move || {
///         released.fetch_add(1, Ordering::SeqCst);
///     })));
/// }
/// registry.dispose();
/// assert_eq!(released.load(Ordering::SeqCst), 3);
/// ```
#[derive(Default)]
pub struct DisposableRegistry {
    children: Mutex<Vec<Box<dyn Disposable>>>,
    disposed: AtomicBool,
}

impl DisposableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a child to be disposed with this registry.
    ///
    /// Adding to an already-disposed registry disposes the child
    /// immediately instead of leaking it.
    pub fn add(&self, child: Box<dyn Disposable>) {
        if self.disposed.load(Ordering::Acquire) {
            child.dispose();
            return;
        }
        self.children.lock().push(child);
    }

    /// Number of children still held.
    pub fn len(&self) -> usize {
        self.children.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.lock().is_empty()
    }
}

impl Disposable for DisposableRegistry {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let children = std::mem::take(&mut *self.children.lock());
        for child in &children {
            // One failing child must not mask the rest.
            if catch_unwind(AssertUnwindSafe(|| child.dispose())).is_err() {
                warn!("disposable panicked during registry teardown");
            }
        }
    }
}
