//! The middleware chain around the resolver.
//!
//! Every resolution runs through a composed chain: global middlewares in
//! insertion order, then the container's local middlewares, then the
//! default executor that actually consults caches and providers. A
//! middleware may inspect or rewrite the parameters, short-circuit without
//! calling on, or transform the result on the way back out.
//!
//! The composition is rebuilt eagerly whenever either middleware list
//! changes, so live containers observe later additions.

use std::fmt;
use std::sync::{Arc, Weak};

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use silsila_support::disposal::Disposable;
use silsila_support::events::{Emitter, Subscription};

use crate::container::Container;
use crate::context::ResolveContext;
use crate::error::{Result, SilsilaError};
use crate::identifier::{ServiceIdentifier, Token};
use crate::provider::Instance;
use crate::record::ResolveRecord;
use crate::registration::Registration;
use crate::resolve::{ResolveOptions, default_executor};

/// Name under which a middleware is registered.
///
/// Names identify middlewares for deduplication and removal; two
/// middlewares with the same name are considered the same middleware.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum MiddlewareName {
    Text(Arc<str>),
    Token(Token),
}

impl fmt::Display for MiddlewareName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MiddlewareName::Text(name) => write!(f, "{name}"),
            MiddlewareName::Token(token) => write!(f, "{token}"),
        }
    }
}

impl fmt::Debug for MiddlewareName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MiddlewareName({self})")
    }
}

impl From<&str> for MiddlewareName {
    fn from(name: &str) -> Self {
        MiddlewareName::Text(Arc::from(name))
    }
}

impl From<String> for MiddlewareName {
    fn from(name: String) -> Self {
        MiddlewareName::Text(Arc::from(name))
    }
}

impl From<Token> for MiddlewareName {
    fn from(token: Token) -> Self {
        MiddlewareName::Token(token)
    }
}

/// Everything a middleware (and the default executor) sees per invocation.
#[derive(Clone)]
pub struct ResolveParams {
    pub identifier: ServiceIdentifier,
    /// The container the resolve call was made on.
    pub container: Container,
    pub record: Arc<ResolveRecord>,
    pub registration: Arc<Registration>,
    pub options: ResolveOptions,
    pub context: Arc<ResolveContext>,
}

impl fmt::Debug for ResolveParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveParams")
            .field("identifier", &self.identifier)
            .field("container", &self.container.name())
            .field("registration", &self.registration.id())
            .field("options", &self.options)
            .finish()
    }
}

pub(crate) type ComposedFn = dyn Fn(ResolveParams) -> Result<Instance> + Send + Sync;

/// Handle to the rest of the chain.
///
/// Calling it runs every middleware after the current one and finally the
/// default executor. Not calling it short-circuits the resolution.
#[derive(Clone)]
pub struct NextResolve {
    inner: Arc<ComposedFn>,
}

impl NextResolve {
    pub fn call(&self, params: ResolveParams) -> Result<Instance> {
        (*self.inner)(params)
    }
}

type MiddlewareExecutor = Arc<dyn Fn(ResolveParams, NextResolve) -> Result<Instance> + Send + Sync>;

/// A named executor wrapped around the resolver.
#[derive(Clone)]
pub struct Middleware {
    name: MiddlewareName,
    executor: MiddlewareExecutor,
}

impl Middleware {
    pub fn new(
        name: impl Into<MiddlewareName>,
        executor: impl Fn(ResolveParams, NextResolve) -> Result<Instance> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            executor: Arc::new(executor),
        }
    }

    pub fn name(&self) -> &MiddlewareName {
        &self.name
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Middleware({})", self.name)
    }
}

/// Lifecycle events the chain emits around each middleware frame.
///
/// `Before` always pairs with exactly one `After` or `Failed` per frame.
#[derive(Debug, Clone)]
pub enum ResolveEvent {
    Before {
        middleware: MiddlewareName,
        identifier: ServiceIdentifier,
    },
    After {
        middleware: MiddlewareName,
        identifier: ServiceIdentifier,
    },
    Failed {
        middleware: MiddlewareName,
        identifier: ServiceIdentifier,
        message: String,
    },
}

struct ManagerInner {
    entries: RwLock<Vec<Middleware>>,
    changed: Emitter<()>,
    disposed: std::sync::atomic::AtomicBool,
}

/// An ordered, name-deduplicated middleware list.
///
/// Emits a change signal on every mutation so composed chains can rebuild.
#[derive(Clone)]
pub struct MiddlewareManager {
    inner: Arc<ManagerInner>,
}

impl Default for MiddlewareManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MiddlewareManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                entries: RwLock::new(Vec::new()),
                changed: Emitter::new(),
                disposed: std::sync::atomic::AtomicBool::new(false),
            }),
        }
    }

    /// Appends a middleware; a middleware with an already-used name is
    /// ignored and `Ok(false)` returned.
    pub fn use_middleware(&self, middleware: Middleware) -> Result<bool> {
        self.ensure_active()?;
        {
            let mut entries = self.inner.entries.write();
            if entries.iter().any(|m| m.name == middleware.name) {
                debug!(target: "silsila", name = %middleware.name, "Middleware name already in use, ignored");
                return Ok(false);
            }
            entries.push(middleware);
        }
        self.inner.changed.emit(&());
        Ok(true)
    }

    /// Removes the middleware with the given name, if present.
    pub fn remove_middleware(&self, name: &MiddlewareName) -> Result<bool> {
        self.ensure_active()?;
        let removed = {
            let mut entries = self.inner.entries.write();
            let before = entries.len();
            entries.retain(|m| m.name != *name);
            entries.len() != before
        };
        if removed {
            self.inner.changed.emit(&());
        }
        Ok(removed)
    }

    pub fn list(&self) -> Vec<Middleware> {
        self.inner.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// Subscribes to list mutations.
    pub fn on_change(&self, f: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.inner.changed.on(move |_| f())
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(SilsilaError::Disposed {
                subject: "middleware manager".to_string(),
            });
        }
        Ok(())
    }

    fn downgrade(&self) -> WeakManager {
        WeakManager(Arc::downgrade(&self.inner))
    }
}

impl Disposable for MiddlewareManager {
    fn is_disposed(&self) -> bool {
        self.inner.disposed.load(std::sync::atomic::Ordering::Acquire)
    }

    fn dispose(&self) {
        if self
            .inner
            .disposed
            .swap(true, std::sync::atomic::Ordering::AcqRel)
        {
            return;
        }
        self.inner.entries.write().clear();
        self.inner.changed.dispose();
    }
}

impl fmt::Debug for MiddlewareManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareManager")
            .field("middlewares", &self.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

struct WeakManager(Weak<ManagerInner>);

impl WeakManager {
    fn upgrade(&self) -> Option<MiddlewareManager> {
        self.0.upgrade().map(|inner| MiddlewareManager { inner })
    }
}

static GLOBAL_MIDDLEWARE: Lazy<MiddlewareManager> = Lazy::new(MiddlewareManager::new);

/// The process-wide middleware manager.
///
/// Middlewares registered here wrap every resolution of every container,
/// outside all local middlewares. Live chains observe changes.
pub fn global_middleware() -> &'static MiddlewareManager {
    &GLOBAL_MIDDLEWARE
}

/// A container's composed resolution pipeline.
///
/// Composes global middlewares, local middlewares, and the default
/// executor, in that order, and rebuilds eagerly when either list changes.
#[derive(Clone)]
pub struct MiddlewareChain {
    composed: Arc<RwLock<Arc<ComposedFn>>>,
    events: Emitter<ResolveEvent>,
    subscriptions: Arc<Vec<Subscription>>,
}

impl MiddlewareChain {
    pub(crate) fn new(local: &MiddlewareManager) -> Self {
        let events = Emitter::new();
        let composed = Arc::new(RwLock::new(compose(layered(local), &events)));

        let rebuild: Arc<dyn Fn() + Send + Sync> = {
            let composed = composed.clone();
            let events = events.clone();
            let local = local.downgrade();
            Arc::new(move || {
                let Some(local) = local.upgrade() else {
                    return;
                };
                *composed.write() = compose(layered(&local), &events);
            })
        };

        let subscriptions = vec![
            global_middleware().on_change({
                let rebuild = rebuild.clone();
                move || (*rebuild)()
            }),
            local.on_change(move || (*rebuild)()),
        ];

        Self {
            composed,
            events,
            subscriptions: Arc::new(subscriptions),
        }
    }

    /// Runs the full chain for one resolution.
    pub fn execute(&self, params: ResolveParams) -> Result<Instance> {
        // Clone the composed executor out so a middleware mutating the
        // chain mid-flight recomposes for the next resolve, not this one.
        let composed = self.composed.read().clone();
        (*composed)(params)
    }

    /// The per-frame event channel.
    pub fn events(&self) -> &Emitter<ResolveEvent> {
        &self.events
    }
}

impl Disposable for MiddlewareChain {
    fn is_disposed(&self) -> bool {
        self.events.is_disposed()
    }

    fn dispose(&self) {
        for subscription in self.subscriptions.iter() {
            subscription.dispose();
        }
        self.events.dispose();
    }
}

fn layered(local: &MiddlewareManager) -> Vec<Middleware> {
    let mut layers = global_middleware().list();
    layers.extend(local.list());
    layers
}

fn compose(layers: Vec<Middleware>, events: &Emitter<ResolveEvent>) -> Arc<ComposedFn> {
    let mut tail: Arc<ComposedFn> = Arc::new(default_executor);
    for middleware in layers.into_iter().rev() {
        let inner = tail;
        let name = middleware.name.clone();
        let executor = middleware.executor.clone();
        let events = events.clone();
        tail = Arc::new(move |params: ResolveParams| {
            let identifier = params.identifier.clone();
            events.emit(&ResolveEvent::Before {
                middleware: name.clone(),
                identifier: identifier.clone(),
            });
            let result = (*executor)(params, NextResolve { inner: inner.clone() });
            match &result {
                Ok(_) => events.emit(&ResolveEvent::After {
                    middleware: name.clone(),
                    identifier,
                }),
                Err(error) => events.emit(&ResolveEvent::Failed {
                    middleware: name.clone(),
                    identifier,
                    message: error.to_string(),
                }),
            }
            result
        });
    }
    tail
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Provider;
    use parking_lot::Mutex;

    fn value_params(container: &Container, name: &str, value: u32) -> ResolveParams {
        ResolveParams {
            identifier: ServiceIdentifier::named(name),
            container: container.clone(),
            record: ResolveRecord::new(container.clone()),
            registration: Registration::new(
                ServiceIdentifier::named(name),
                Provider::value(value),
            ),
            options: ResolveOptions::default(),
            context: Arc::new(ResolveContext::new()),
        }
    }

    fn as_u32(instance: Instance) -> u32 {
        *instance.downcast::<u32>().expect("u32 instance")
    }

    #[test]
    fn names_compare_by_form() {
        assert_eq!(MiddlewareName::from("log"), MiddlewareName::from("log"));
        assert_ne!(
            MiddlewareName::from("log"),
            MiddlewareName::from(Token::new("log"))
        );
    }

    #[test]
    fn manager_ignores_duplicate_names() {
        let manager = MiddlewareManager::new();
        assert!(
            manager
                .use_middleware(Middleware::new("m", |p, next| next.call(p)))
                .unwrap()
        );
        assert!(
            !manager
                .use_middleware(Middleware::new("m", |p, next| next.call(p)))
                .unwrap()
        );
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn manager_emits_change_on_mutation() {
        let manager = MiddlewareManager::new();
        let changes = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let _sub = manager.on_change({
            let changes = changes.clone();
            move || {
                changes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        });

        manager
            .use_middleware(Middleware::new("m", |p, next| next.call(p)))
            .unwrap();
        manager.remove_middleware(&MiddlewareName::from("m")).unwrap();
        // Removing an absent name is not a mutation.
        manager.remove_middleware(&MiddlewareName::from("m")).unwrap();

        assert_eq!(changes.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn disposed_manager_rejects_use() {
        let manager = MiddlewareManager::new();
        manager.dispose();
        assert!(matches!(
            manager.use_middleware(Middleware::new("m", |p, next| next.call(p))),
            Err(SilsilaError::Disposed { .. })
        ));
        assert!(manager.is_empty());
    }

    #[test]
    fn chain_runs_default_executor() {
        let container = Container::new("mw");
        let chain = MiddlewareChain::new(&MiddlewareManager::new());
        let instance = chain.execute(value_params(&container, "n", 42)).unwrap();
        assert_eq!(as_u32(instance), 42);
    }

    #[test]
    fn local_middlewares_wrap_in_insertion_order() {
        let container = Container::new("mw");
        let manager = MiddlewareManager::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["outer", "inner"] {
            let order = order.clone();
            manager
                .use_middleware(Middleware::new(tag, move |p, next| {
                    order.lock().push(format!("{tag}:enter"));
                    let result = next.call(p);
                    order.lock().push(format!("{tag}:exit"));
                    result
                }))
                .unwrap();
        }

        let chain = MiddlewareChain::new(&manager);
        chain.execute(value_params(&container, "n", 1)).unwrap();

        assert_eq!(
            *order.lock(),
            vec!["outer:enter", "inner:enter", "inner:exit", "outer:exit"]
        );
    }

    #[test]
    fn middleware_can_short_circuit() {
        let container = Container::new("mw");
        let manager = MiddlewareManager::new();
        manager
            .use_middleware(Middleware::new("fixed", |_params, _next| {
                Ok(Arc::new(99u32) as Instance)
            }))
            .unwrap();

        let chain = MiddlewareChain::new(&manager);
        let instance = chain.execute(value_params(&container, "n", 1)).unwrap();
        assert_eq!(as_u32(instance), 99);
    }

    #[test]
    fn middleware_can_transform_result() {
        let container = Container::new("mw");
        let manager = MiddlewareManager::new();
        manager
            .use_middleware(Middleware::new("double", |p, next| {
                let inner = next.call(p)?;
                let value = *inner.downcast::<u32>().expect("u32");
                Ok(Arc::new(value * 2) as Instance)
            }))
            .unwrap();

        let chain = MiddlewareChain::new(&manager);
        let instance = chain.execute(value_params(&container, "n", 21)).unwrap();
        assert_eq!(as_u32(instance), 42);
    }

    #[test]
    fn chain_recomposes_on_local_change() {
        let container = Container::new("mw");
        let manager = MiddlewareManager::new();
        let chain = MiddlewareChain::new(&manager);

        assert_eq!(
            as_u32(chain.execute(value_params(&container, "n", 1)).unwrap()),
            1
        );

        manager
            .use_middleware(Middleware::new("plus-one", |p, next| {
                let inner = next.call(p)?;
                let value = *inner.downcast::<u32>().expect("u32");
                Ok(Arc::new(value + 1) as Instance)
            }))
            .unwrap();

        assert_eq!(
            as_u32(chain.execute(value_params(&container, "n", 1)).unwrap()),
            2
        );
    }

    #[test]
    fn events_pair_before_with_after_or_failed() {
        let container = Container::new("mw");
        let manager = MiddlewareManager::new();
        manager
            .use_middleware(Middleware::new("probe", |p, next| next.call(p)))
            .unwrap();
        let chain = MiddlewareChain::new(&manager);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let _sub = chain.events().on({
            let seen = seen.clone();
            move |event| {
                let tag = match event {
                    ResolveEvent::Before { middleware, .. } => format!("before:{middleware}"),
                    ResolveEvent::After { middleware, .. } => format!("after:{middleware}"),
                    ResolveEvent::Failed { middleware, .. } => format!("failed:{middleware}"),
                };
                seen.lock().push(tag);
            }
        });

        chain.execute(value_params(&container, "n", 1)).unwrap();

        let seen: Vec<String> = seen
            .lock()
            .iter()
            .filter(|tag| tag.ends_with(":probe"))
            .cloned()
            .collect();
        assert_eq!(seen, vec!["before:probe", "after:probe"]);
    }

    #[test]
    fn disposed_chain_stops_reacting_to_changes() {
        let container = Container::new("mw");
        let manager = MiddlewareManager::new();
        let chain = MiddlewareChain::new(&manager);
        chain.dispose();

        manager
            .use_middleware(Middleware::new("late", |_p, _next| {
                Ok(Arc::new(0u32) as Instance)
            }))
            .unwrap();

        // Still the composition from before disposal.
        let instance = chain.execute(value_params(&container, "n", 5)).unwrap();
        assert_eq!(as_u32(instance), 5);
    }
}
