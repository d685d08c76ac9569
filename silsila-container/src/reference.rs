//! Deferred resolution references.
//!
//! Besides eager resolution, a dependency can be requested as a
//! [`LazyRef`] (resolved on first read, then memoized) or a [`DynRef`]
//! (resolved afresh on every read). Both defer the actual resolution to a
//! captured thunk, and the resolver treats their record edges as
//! non-cyclic, which is how constructor-time cycles are broken.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::container::Container;
use crate::context::ResolveContext;
use crate::error::Result;
use crate::identifier::ServiceIdentifier;
use crate::middleware::ResolveParams;
use crate::provider::Instance;
use crate::record::{RecordEntry, ResolveRecord};
use crate::registration::Registration;
use crate::resolve::{FrameGuard, ResolveOptions, downcast_instance};

/// A captured resolution, re-playable through the middleware chain.
///
/// Holds everything the original resolve frame had: the resolving
/// container, the chosen registration, and the record node the request was
/// filed under, so a later invocation nests below that node and shares the
/// original resolution context.
pub(crate) struct ResolveThunk {
    pub(crate) container: Container,
    pub(crate) identifier: ServiceIdentifier,
    pub(crate) options: ResolveOptions,
    pub(crate) registration: Arc<Registration>,
    pub(crate) record: Arc<ResolveRecord>,
    pub(crate) context: Arc<ResolveContext>,
    pub(crate) node: Arc<RecordEntry>,
}

impl ResolveThunk {
    fn invoke(&self) -> Result<Instance> {
        let _frame = FrameGuard::adopt(self.record.clone(), self.context.clone());
        self.record.stash_current_at(self.node.clone());
        let result = self.container.chain().execute(ResolveParams {
            identifier: self.identifier.clone(),
            container: self.container.clone(),
            record: self.record.clone(),
            registration: self.registration.clone(),
            options: self.options.clone(),
            context: self.context.clone(),
        });
        let _ = self.record.restore_current();
        result
    }
}

enum LazyState {
    Pending(ResolveThunk),
    Ready(Instance),
}

/// Erased state behind a [`LazyRef`].
pub(crate) struct LazyCell {
    identifier: ServiceIdentifier,
    state: Mutex<LazyState>,
}

impl LazyCell {
    pub(crate) fn new(thunk: ResolveThunk) -> Self {
        Self {
            identifier: thunk.identifier.clone(),
            state: Mutex::new(LazyState::Pending(thunk)),
        }
    }

    /// Resolves on first call, memoizes, and drops the thunk.
    ///
    /// Dropping the thunk releases the captured record and context. A
    /// failed resolution keeps the thunk so a later read can retry.
    fn force(&self) -> Result<Instance> {
        let mut state = self.state.lock();
        match &*state {
            LazyState::Ready(instance) => Ok(instance.clone()),
            LazyState::Pending(thunk) => {
                let instance = thunk.invoke()?;
                *state = LazyState::Ready(instance.clone());
                Ok(instance)
            }
        }
    }

    fn is_resolved(&self) -> bool {
        matches!(&*self.state.lock(), LazyState::Ready(_))
    }
}

/// Erased state behind a [`DynRef`]. The thunk is never dropped.
pub(crate) struct DynCell {
    identifier: ServiceIdentifier,
    thunk: ResolveThunk,
    resolved: AtomicBool,
}

impl DynCell {
    pub(crate) fn new(thunk: ResolveThunk) -> Self {
        Self {
            identifier: thunk.identifier.clone(),
            thunk,
            resolved: AtomicBool::new(false),
        }
    }

    fn read(&self) -> Result<Instance> {
        let instance = self.thunk.invoke()?;
        self.resolved.store(true, Ordering::Release);
        Ok(instance)
    }

    fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }
}

/// A lazily resolved dependency.
///
/// The first [`current`](LazyRef::current) call performs the resolution
/// and caches the instance; further calls return the cached instance.
pub struct LazyRef<T> {
    cell: Arc<LazyCell>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for LazyRef<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Send + Sync + 'static> LazyRef<T> {
    pub(crate) fn from_cell(cell: Arc<LazyCell>) -> Self {
        Self {
            cell,
            _marker: PhantomData,
        }
    }

    /// The referenced instance, resolving it on first access.
    pub fn current(&self) -> Result<Arc<T>> {
        let instance = self.cell.force()?;
        downcast_instance(&self.cell.identifier, instance)
    }

    /// Whether the reference has been resolved yet.
    pub fn is_resolved(&self) -> bool {
        self.cell.is_resolved()
    }
}

impl<T> fmt::Debug for LazyRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyRef")
            .field("identifier", &self.cell.identifier)
            .field("resolved", &self.cell.is_resolved())
            .finish()
    }
}

/// A dependency resolved afresh on every read.
///
/// [`current`](DynRef::current) re-runs the resolution each time, so a
/// transient target yields a new instance per read.
/// [`is_resolved`](DynRef::is_resolved) latches after the first successful
/// read.
pub struct DynRef<T> {
    cell: Arc<DynCell>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for DynRef<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Send + Sync + 'static> DynRef<T> {
    pub(crate) fn from_cell(cell: Arc<DynCell>) -> Self {
        Self {
            cell,
            _marker: PhantomData,
        }
    }

    /// Resolves and returns the referenced instance.
    pub fn current(&self) -> Result<Arc<T>> {
        let instance = self.cell.read()?;
        downcast_instance(&self.cell.identifier, instance)
    }

    pub fn is_resolved(&self) -> bool {
        self.cell.is_resolved()
    }
}

impl<T> fmt::Debug for DynRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynRef")
            .field("identifier", &self.cell.identifier)
            .field("resolved", &self.cell.is_resolved())
            .finish()
    }
}
