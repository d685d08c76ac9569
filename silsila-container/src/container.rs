//! # The Container - heart of Silsila
//!
//! A container maps service identifiers to providers and resolves them
//! into instances. Containers form a tree through their parent link; a
//! lookup that misses locally walks up the chain, so child containers
//! override and inherit their ancestors' registrations.
//!
//! # Examples
//! ```rust
//! use std::sync::Arc;
//! use silsila_container::container::Container;
//! use silsila_container::provider::Provider;
//! use silsila_container::lifecycle::Lifecycle;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! let container = Container::new("app");
//! container.register("database", Provider::factory(|_, _| {
//!     Ok(Database { url: "postgres://localhost".into() })
//! }).with_lifecycle(Lifecycle::Singleton)).unwrap();
//! container.register("users", Provider::factory(|container, _| {
//!     Ok(UserService { db: container.resolve("database")? })
//! })).unwrap();
//!
//! let users: Arc<UserService> = container.resolve("users").unwrap();
//! assert_eq!(users.db.url, "postgres://localhost");
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use once_cell::sync::Lazy;
use tracing::debug;

use silsila_support::disposal::{Disposable, DisposableRegistry};
use silsila_support::events::Emitter;

use crate::error::{Result, SilsilaError};
use crate::identifier::ServiceIdentifier;
use crate::middleware::{
    Middleware, MiddlewareChain, MiddlewareManager, MiddlewareName, ResolveEvent,
};
use crate::provider::Provider;
use crate::reference::{DynRef, LazyRef};
use crate::registration::{Registration, RegistrationId, RegistrationTable};
use crate::resolve::{ResolveOptions, Resolved, downcast_instance};

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(0);

static ROOT: Lazy<Container> = Lazy::new(|| Container::build("Root", None));

struct ContainerInner {
    name: Arc<str>,
    id: u64,
    parent: Option<Container>,
    table: RegistrationTable,
    middleware: MiddlewareManager,
    chain: MiddlewareChain,
    disposables: DisposableRegistry,
    disposed: AtomicBool,
}

/// A hierarchical registry of providers and the resolver over it.
///
/// Cloning a `Container` clones a handle; all clones share the same
/// registrations, middleware, and caches.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    /// The process-wide root container.
    ///
    /// Containers created with [`Container::new`] parent here, so a
    /// registration on the root is visible to every container that does
    /// not shadow it.
    pub fn root() -> &'static Container {
        &ROOT
    }

    /// Creates a container parented to the root container.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self::build(name, Some(Self::root().clone()))
    }

    /// Creates a container with an explicit parent.
    pub fn with_parent(name: impl Into<Arc<str>>, parent: &Container) -> Self {
        Self::build(name, Some(parent.clone()))
    }

    fn build(name: impl Into<Arc<str>>, parent: Option<Container>) -> Self {
        let name = name.into();
        let middleware = MiddlewareManager::new();
        let chain = MiddlewareChain::new(&middleware);
        let disposables = DisposableRegistry::new();
        disposables.add(Box::new(middleware.clone()));
        disposables.add(Box::new(chain.clone()));

        let container = Self {
            inner: Arc::new(ContainerInner {
                id: NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed),
                parent,
                table: RegistrationTable::new(),
                middleware,
                chain,
                disposables,
                disposed: AtomicBool::new(false),
                name,
            }),
        };

        debug!(
            target: "silsila",
            container = %container.name(),
            id = container.id(),
            parent = container.parent().map(Container::name),
            "Created container"
        );
        container
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn parent(&self) -> Option<&Container> {
        self.inner.parent.as_ref()
    }

    // =========================================================================
    // Registration surface
    // =========================================================================

    /// Appends a registration for `id`.
    ///
    /// Registrations do not replace each other: the newest wins for single
    /// resolution, while multi-resolution returns all of them in
    /// registration order.
    pub fn register(
        &self,
        id: impl Into<ServiceIdentifier>,
        provider: Provider,
    ) -> Result<RegistrationId> {
        self.ensure_active()?;
        let identifier = id.into();
        let registration = Registration::new(identifier.clone(), provider);
        let registration_id = registration.id();

        debug!(
            target: "silsila",
            container = %self.name(),
            identifier = %identifier,
            lifecycle = %registration.provider().lifecycle(),
            "Registered provider"
        );
        self.inner.table.insert(registration);
        Ok(registration_id)
    }

    /// Removes one registration (by id) or all registrations for `id`.
    ///
    /// Returns how many registrations were removed; removing an absent
    /// identifier is a no-op.
    pub fn unregister(
        &self,
        id: impl Into<ServiceIdentifier>,
        which: Option<RegistrationId>,
    ) -> Result<usize> {
        self.ensure_active()?;
        let identifier = id.into();
        let removed = self.inner.table.remove(&identifier, which);
        if removed > 0 {
            debug!(
                target: "silsila",
                container = %self.name(),
                identifier = %identifier,
                removed,
                "Unregistered"
            );
        }
        Ok(removed)
    }

    /// Whether `id` has a registration in this container.
    pub fn is_registered(&self, id: impl Into<ServiceIdentifier>) -> bool {
        self.inner.table.contains(&id.into())
    }

    /// Whether `id` has a registration here or in any ancestor.
    pub fn is_registered_recursive(&self, id: impl Into<ServiceIdentifier>) -> bool {
        let identifier = id.into();
        let mut cursor = Some(self);
        while let Some(container) = cursor {
            if container.inner.table.contains(&identifier) {
                return true;
            }
            cursor = container.parent();
        }
        false
    }

    /// All identifiers registered in this container (not ancestors).
    pub fn service_identifiers(&self) -> Vec<ServiceIdentifier> {
        self.inner.table.identifiers()
    }

    /// Number of registrations in this container.
    pub fn len(&self) -> usize {
        self.inner.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.table.is_empty()
    }

    // =========================================================================
    // Typed resolution surface
    // =========================================================================

    /// Resolves `id` into an instance of `T`.
    pub fn resolve<T: Send + Sync + 'static>(
        &self,
        id: impl Into<ServiceIdentifier>,
    ) -> Result<Arc<T>> {
        let identifier = id.into();
        match self.resolve_erased(identifier.clone(), ResolveOptions::default())? {
            Resolved::One(instance) => downcast_instance(&identifier, instance),
            other => Err(unexpected(&identifier, &other)),
        }
    }

    /// Resolves `id` with explicit options; `None` on an optional miss
    /// without a default.
    ///
    /// Handles single eager resolution only: `multiple`, `lazy`, and
    /// `dynamic` have their own entry points.
    pub fn resolve_with<T: Send + Sync + 'static>(
        &self,
        id: impl Into<ServiceIdentifier>,
        options: ResolveOptions,
    ) -> Result<Option<Arc<T>>> {
        let identifier = id.into();
        if options.multiple || options.lazy || options.dynamic {
            return Err(SilsilaError::InvalidOptions(
                "resolve_with is single and eager; use resolve_all, resolve_lazy, or resolve_dynamic"
                    .to_string(),
            ));
        }
        match self.resolve_erased(identifier.clone(), options)? {
            Resolved::One(instance) => Ok(Some(downcast_instance(&identifier, instance)?)),
            Resolved::Absent(Some(default)) => {
                Ok(Some(downcast_instance(&identifier, default)?))
            }
            Resolved::Absent(None) => Ok(None),
            other => Err(unexpected(&identifier, &other)),
        }
    }

    /// Resolves `id` if registered, `None` otherwise.
    pub fn resolve_optional<T: Send + Sync + 'static>(
        &self,
        id: impl Into<ServiceIdentifier>,
    ) -> Result<Option<Arc<T>>> {
        self.resolve_with(id, ResolveOptions::new().optional())
    }

    /// Resolves every registration for `id`, in registration order.
    pub fn resolve_all<T: Send + Sync + 'static>(
        &self,
        id: impl Into<ServiceIdentifier>,
    ) -> Result<Vec<Arc<T>>> {
        self.resolve_all_with(id, ResolveOptions::new())
    }

    /// Multi-resolution with explicit options (e.g. `optional`, `local`).
    pub fn resolve_all_with<T: Send + Sync + 'static>(
        &self,
        id: impl Into<ServiceIdentifier>,
        options: ResolveOptions,
    ) -> Result<Vec<Arc<T>>> {
        let identifier = id.into();
        match self.resolve_erased(identifier.clone(), options.multiple())? {
            Resolved::Many(instances) => instances
                .into_iter()
                .map(|instance| downcast_instance(&identifier, instance))
                .collect(),
            other => Err(unexpected(&identifier, &other)),
        }
    }

    /// Defers resolution of `id` behind a memoizing [`LazyRef`].
    ///
    /// The registration is chosen now; the instance is produced on the
    /// first [`LazyRef::current`] read. The deferred edge does not count
    /// toward cycle detection, which is how constructor-time cycles are
    /// broken.
    pub fn resolve_lazy<T: Send + Sync + 'static>(
        &self,
        id: impl Into<ServiceIdentifier>,
    ) -> Result<LazyRef<T>> {
        let identifier = id.into();
        match self.resolve_erased(identifier.clone(), ResolveOptions::new().lazy())? {
            Resolved::Lazy(cell) => Ok(LazyRef::from_cell(cell)),
            other => Err(unexpected(&identifier, &other)),
        }
    }

    /// Defers resolution of `id` behind a re-resolving [`DynRef`].
    pub fn resolve_dynamic<T: Send + Sync + 'static>(
        &self,
        id: impl Into<ServiceIdentifier>,
    ) -> Result<DynRef<T>> {
        let identifier = id.into();
        match self.resolve_erased(identifier.clone(), ResolveOptions::new().dynamic())? {
            Resolved::Dynamic(cell) => Ok(DynRef::from_cell(cell)),
            other => Err(unexpected(&identifier, &other)),
        }
    }

    // =========================================================================
    // Middleware surface
    // =========================================================================

    /// Adds a middleware local to this container.
    pub fn use_middleware(&self, middleware: Middleware) -> Result<bool> {
        self.ensure_active()?;
        self.inner.middleware.use_middleware(middleware)
    }

    /// Removes a local middleware by name.
    pub fn remove_middleware(&self, name: impl Into<MiddlewareName>) -> Result<bool> {
        self.ensure_active()?;
        self.inner.middleware.remove_middleware(&name.into())
    }

    /// This container's local middleware manager.
    pub fn middleware(&self) -> &MiddlewareManager {
        &self.inner.middleware
    }

    /// Per-frame resolution events of this container's chain.
    pub fn resolve_events(&self) -> &Emitter<ResolveEvent> {
        self.inner.chain.events()
    }

    pub(crate) fn chain(&self) -> &MiddlewareChain {
        &self.inner.chain
    }

    // =========================================================================
    // Lookup and lifecycle
    // =========================================================================

    /// The first non-empty registration list for `identifier`, searching
    /// this container and, unless `local`, its ancestors.
    pub(crate) fn lookup(
        &self,
        identifier: &ServiceIdentifier,
        local: bool,
    ) -> Option<Vec<Arc<Registration>>> {
        let mut cursor = Some(self);
        while let Some(container) = cursor {
            let list = container.inner.table.get(identifier);
            if !list.is_empty() {
                return Some(list);
            }
            if local {
                return None;
            }
            cursor = container.parent();
        }
        None
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(SilsilaError::Disposed {
                subject: format!("container '{}'", self.name()),
            });
        }
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Disposes this container: its middleware manager, its event
    /// subscriptions, and every cached singleton instance.
    ///
    /// Registrations stay in place but all operations on a disposed
    /// container fail. Child containers are not disposed.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(
            target: "silsila",
            container = %self.name(),
            registrations = self.len(),
            "Disposing container"
        );
        self.inner.disposables.dispose();
        self.inner.table.clear_instances();
    }
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        // The chain's change subscriptions live in the global middleware
        // manager; detach them when the last handle goes away.
        self.disposables.dispose();
    }
}

fn unexpected(identifier: &ServiceIdentifier, resolved: &Resolved) -> SilsilaError {
    SilsilaError::InvalidOptions(format!(
        "resolution of {identifier} produced {}, which this entry point cannot return",
        resolved.kind()
    ))
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Container {}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.name())
            .field("id", &self.id())
            .field("registrations", &self.len())
            .field("parent", &self.parent().map(Container::name))
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::Token;
    use crate::provider::Provider;

    #[test]
    fn registration_queries() {
        let container = Container::new("app");
        assert!(container.is_empty());

        container.register("a", Provider::value(1u32)).unwrap();
        container.register("a", Provider::value(2u32)).unwrap();
        container.register("b", Provider::value(3u32)).unwrap();

        assert!(container.is_registered("a"));
        assert!(!container.is_registered("c"));
        assert_eq!(container.len(), 3);

        let mut identifiers = container.service_identifiers();
        identifiers.sort_by_key(|id| id.label());
        assert_eq!(
            identifiers,
            vec![
                ServiceIdentifier::named("a"),
                ServiceIdentifier::named("b")
            ]
        );
    }

    #[test]
    fn unregister_one_then_all() {
        let container = Container::new("app");
        let first = container.register("svc", Provider::value(1u32)).unwrap();
        container.register("svc", Provider::value(2u32)).unwrap();

        assert_eq!(container.unregister("svc", Some(first)).unwrap(), 1);
        assert_eq!(*container.resolve::<u32>("svc").unwrap(), 2);

        assert_eq!(container.unregister("svc", None).unwrap(), 1);
        assert!(matches!(
            container.resolve::<u32>("svc"),
            Err(SilsilaError::NotRegistered(_))
        ));
        assert_eq!(container.unregister("svc", None).unwrap(), 0);
    }

    #[test]
    fn recursive_registration_check_walks_parents() {
        let parent = Container::new("parent");
        let child = Container::with_parent("child", &parent);
        parent.register("svc", Provider::value(1u32)).unwrap();

        assert!(!child.is_registered("svc"));
        assert!(child.is_registered_recursive("svc"));
    }

    #[test]
    fn containers_parent_to_root_by_default() {
        let token = Token::new("root-visible");
        Container::root()
            .register(&token, Provider::value(99u32))
            .unwrap();

        let container = Container::new("leaf");
        assert!(container.is_registered_recursive(&token));
        assert_eq!(*container.resolve::<u32>(&token).unwrap(), 99);

        Container::root().unregister(&token, None).unwrap();
    }

    #[test]
    fn disposed_container_rejects_operations() {
        let container = Container::new("app");
        container.register("svc", Provider::value(1u32)).unwrap();
        container.dispose();
        container.dispose(); // idempotent

        assert!(container.is_disposed());
        assert!(matches!(
            container.register("other", Provider::value(2u32)),
            Err(SilsilaError::Disposed { .. })
        ));
        assert!(matches!(
            container.resolve::<u32>("svc"),
            Err(SilsilaError::Disposed { .. })
        ));
        assert!(matches!(
            container.use_middleware(Middleware::new("m", |p, next| next.call(p))),
            Err(SilsilaError::Disposed { .. })
        ));
    }

    #[test]
    fn disposing_a_parent_leaves_children_usable() {
        let parent = Container::new("parent");
        let child = Container::with_parent("child", &parent);
        child.register("svc", Provider::value(5u32)).unwrap();

        parent.dispose();
        assert!(!child.is_disposed());
        assert_eq!(*child.resolve::<u32>("svc").unwrap(), 5);
    }

    #[test]
    fn container_identity_is_by_handle() {
        let a = Container::new("same-name");
        let b = Container::new("same-name");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn debug_output_names_the_container() {
        let container = Container::new("debug-me");
        let debug = format!("{container:?}");
        assert!(debug.contains("debug-me"));
        assert!(debug.contains("Root"));
    }
}
