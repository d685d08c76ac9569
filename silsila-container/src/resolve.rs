//! The resolution engine.
//!
//! [`Container::resolve`] and friends funnel into one erased entry point
//! that keeps the resolution record, detects cycles, walks the parent
//! chain, and runs the middleware chain whose default executor arbitrates
//! lifecycle caches and dispatches on the provider.
//!
//! Resolution state (the record and the per-resolve context) lives on a
//! thread-local frame stack: the outermost call on a thread pushes a
//! frame, every nested call reuses it, and deferred references push their
//! captured frame back for the duration of a read. Teardown is a drop
//! guard, so both success and error paths clear the state.

use std::cell::RefCell;
use std::sync::Arc;

use tracing::{debug, instrument, trace};

use silsila_support::rendering::PathFlags;

use crate::container::Container;
use crate::context::ResolveContext;
use crate::error::{
    CircularDependencyError, NotRegisteredError, ResolveTrace, Result, SilsilaError,
};
use crate::identifier::ServiceIdentifier;
use crate::lifecycle::Lifecycle;
use crate::middleware::ResolveParams;
use crate::provider::{BoxError, Instance, ProviderKind};
use crate::record::{RecordNode, ResolveRecord};
use crate::reference::{DynCell, LazyCell, ResolveThunk};

// =============================================================================
// Resolve options
// =============================================================================

/// Options for one resolve call.
///
/// `lazy` and `dynamic` are mutually exclusive, and neither combines with
/// `multiple`; the engine rejects such combinations up front.
#[derive(Clone, Default)]
pub struct ResolveOptions {
    /// A missing registration yields a default instead of an error.
    pub optional: bool,
    /// The value to yield when `optional` and missing.
    pub default_value: Option<Instance>,
    /// Resolve the whole registration list, in insertion order.
    pub multiple: bool,
    /// Return a memoizing deferred reference instead of resolving now.
    pub lazy: bool,
    /// Return a re-resolving deferred reference instead of resolving now.
    pub dynamic: bool,
    /// Do not walk parent containers on a miss.
    pub local: bool,
}

impl ResolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Marks the request optional and sets the value yielded on a miss.
    pub fn with_default<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.optional = true;
        self.default_value = Some(Arc::new(value));
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.lazy && self.dynamic {
            return Err(SilsilaError::InvalidOptions(
                "`lazy` and `dynamic` are mutually exclusive".to_string(),
            ));
        }
        if self.multiple && (self.lazy || self.dynamic) {
            return Err(SilsilaError::InvalidOptions(
                "`multiple` cannot be combined with a deferred reference".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn flags(&self) -> PathFlags {
        PathFlags {
            lazy: self.lazy,
            dynamic: self.dynamic,
            optional: self.optional,
            multiple: self.multiple,
            has_default: self.default_value.is_some(),
        }
    }
}

impl std::fmt::Debug for ResolveOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolveOptions")
            .field("optional", &self.optional)
            .field("has_default", &self.default_value.is_some())
            .field("multiple", &self.multiple)
            .field("lazy", &self.lazy)
            .field("dynamic", &self.dynamic)
            .field("local", &self.local)
            .finish()
    }
}

// =============================================================================
// Thread-local frame stack
// =============================================================================

#[derive(Clone)]
pub(crate) struct Frame {
    pub(crate) record: Arc<ResolveRecord>,
    pub(crate) context: Arc<ResolveContext>,
}

thread_local! {
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Pops the frame it pushed when dropped, clearing the record and context
/// reference of the outermost resolve on both success and error paths.
pub(crate) struct FrameGuard {
    owns: bool,
}

impl FrameGuard {
    /// Joins the active frame, or pushes a fresh one rooted at `container`
    /// if this is the outermost call on the thread.
    fn enter(container: &Container) -> (Self, Frame) {
        FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            if let Some(top) = frames.last() {
                (Self { owns: false }, top.clone())
            } else {
                let frame = Frame {
                    record: ResolveRecord::new(container.clone()),
                    context: Arc::new(ResolveContext::new()),
                };
                frames.push(frame.clone());
                (Self { owns: true }, frame)
            }
        })
    }

    /// Pushes a previously captured frame, used by deferred references.
    pub(crate) fn adopt(record: Arc<ResolveRecord>, context: Arc<ResolveContext>) -> Self {
        FRAMES.with(|frames| frames.borrow_mut().push(Frame { record, context }));
        Self { owns: true }
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if self.owns {
            FRAMES.with(|frames| {
                frames.borrow_mut().pop();
            });
        }
    }
}

fn active_frame() -> Option<Frame> {
    FRAMES.with(|frames| frames.borrow().last().cloned())
}

// =============================================================================
// Erased resolution results
// =============================================================================

/// What an erased resolve call produced.
pub(crate) enum Resolved {
    One(Instance),
    Many(Vec<Instance>),
    Lazy(Arc<LazyCell>),
    Dynamic(Arc<DynCell>),
    /// Optional request that found nothing; carries the default, if any.
    Absent(Option<Instance>),
}

impl Resolved {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Resolved::One(_) => "an instance",
            Resolved::Many(_) => "an instance list",
            Resolved::Lazy(_) => "a lazy reference",
            Resolved::Dynamic(_) => "a dynamic reference",
            Resolved::Absent(_) => "no instance",
        }
    }
}

pub(crate) fn downcast_instance<T: Send + Sync + 'static>(
    identifier: &ServiceIdentifier,
    instance: Instance,
) -> Result<Arc<T>> {
    instance
        .downcast::<T>()
        .map_err(|_| SilsilaError::TypeMismatch {
            identifier: identifier.clone(),
            expected: std::any::type_name::<T>(),
        })
}

// =============================================================================
// The engine
// =============================================================================

impl Container {
    /// The erased core all typed resolve entry points delegate to.
    #[instrument(
        name = "resolve",
        target = "silsila",
        skip_all,
        fields(container = %self.name(), identifier = %identifier)
    )]
    pub(crate) fn resolve_erased(
        &self,
        identifier: ServiceIdentifier,
        options: ResolveOptions,
    ) -> Result<Resolved> {
        self.ensure_active()?;
        options.validate()?;

        let (_guard, frame) = FrameGuard::enter(self);
        frame.record.stash_current();
        let result = self.resolve_in_frame(identifier, options, &frame);
        let restored = frame.record.restore_current();
        match result {
            Ok(resolved) => restored.map(|()| resolved),
            Err(error) => Err(error),
        }
    }

    fn resolve_in_frame(
        &self,
        identifier: ServiceIdentifier,
        options: ResolveOptions,
        frame: &Frame,
    ) -> Result<Resolved> {
        let record = &frame.record;
        let node = record.add_node(RecordNode::Service {
            container: self.clone(),
            identifier: identifier.clone(),
            options: options.clone(),
        });

        if record.find_cycle().is_some() {
            debug!(target: "silsila", identifier = %identifier, "Circular dependency detected");
            return Err(SilsilaError::CircularDependency(CircularDependencyError {
                trace: ResolveTrace::capture(record, true),
            }));
        }

        let Some(registrations) = self.lookup(&identifier, options.local) else {
            if options.optional {
                trace!(target: "silsila", identifier = %identifier, "Optional miss");
                return Ok(if options.multiple {
                    Resolved::Many(Vec::new())
                } else {
                    Resolved::Absent(options.default_value.clone())
                });
            }
            return Err(SilsilaError::NotRegistered(NotRegisteredError {
                container: self.name().to_string(),
                identifier,
                trace: ResolveTrace::capture(record, false),
            }));
        };

        if options.multiple {
            let mut instances = Vec::with_capacity(registrations.len());
            for registration in registrations {
                record.stash_current();
                let result = self.chain().execute(ResolveParams {
                    identifier: identifier.clone(),
                    container: self.clone(),
                    record: record.clone(),
                    registration,
                    options: options.clone(),
                    context: frame.context.clone(),
                });
                let restored = record.restore_current();
                instances.push(result?);
                restored?;
            }
            return Ok(Resolved::Many(instances));
        }

        // Newest registration wins for single resolution.
        let Some(registration) = registrations.last().cloned() else {
            return Err(SilsilaError::NotRegistered(NotRegisteredError {
                container: self.name().to_string(),
                identifier,
                trace: ResolveTrace::capture(record, false),
            }));
        };

        if options.lazy || options.dynamic {
            let lazy = options.lazy;
            let thunk = ResolveThunk {
                container: self.clone(),
                identifier,
                options,
                registration,
                record: record.clone(),
                context: frame.context.clone(),
                node,
            };
            return Ok(if lazy {
                Resolved::Lazy(Arc::new(LazyCell::new(thunk)))
            } else {
                Resolved::Dynamic(Arc::new(DynCell::new(thunk)))
            });
        }

        let instance = self.chain().execute(ResolveParams {
            identifier,
            container: self.clone(),
            record: record.clone(),
            registration,
            options,
            context: frame.context.clone(),
        })?;
        Ok(Resolved::One(instance))
    }
}

// =============================================================================
// Default executor
// =============================================================================

/// The innermost layer of every middleware chain.
///
/// Arbitrates the lifecycle caches, dispatches on the provider variant,
/// and writes the produced instance back to whichever cache the lifecycle
/// selects.
pub(crate) fn default_executor(params: ResolveParams) -> Result<Instance> {
    let registration = params.registration.clone();

    // A stale deferred reference may outlive its registration.
    if !registration.is_registered() {
        return Err(SilsilaError::NotRegistered(NotRegisteredError {
            identifier: params.identifier.clone(),
            container: params.container.name().to_string(),
            trace: ResolveTrace::capture(&params.record, false),
        }));
    }

    let lifecycle = registration.provider().lifecycle();
    match lifecycle {
        Lifecycle::Singleton => {
            if let Some(cached) = registration.cached() {
                trace!(target: "silsila", identifier = %params.identifier, "Singleton cache hit");
                return Ok(cached);
            }
        }
        Lifecycle::Resolution => {
            if let Some(cached) = params.context.get(registration.id()) {
                trace!(target: "silsila", identifier = %params.identifier, "Resolution cache hit");
                return Ok(cached);
            }
        }
        Lifecycle::Transient => {}
    }

    let instance = produce(&params)?;
    let instance = match lifecycle {
        Lifecycle::Singleton => registration.store(instance),
        Lifecycle::Resolution => params.context.insert(registration.id(), instance),
        Lifecycle::Transient => instance,
    };
    Ok(instance)
}

fn produce(params: &ResolveParams) -> Result<Instance> {
    match params.registration.provider().kind() {
        ProviderKind::Value(value) => Ok(value.clone()),
        ProviderKind::Class(ctor) => Ok((**ctor)()),
        ProviderKind::Factory(factory) => (**factory)(&params.container, &params.context)
            .map_err(|error| factory_error(error, params)),
        ProviderKind::Alias { target, locator } => {
            let target_container = match locator {
                Some(locate) => (**locate)(),
                None => params.container.clone(),
            };
            trace!(
                target: "silsila",
                alias = %params.identifier,
                forwarded = %target,
                container = %target_container.name(),
                "Following alias"
            );
            match target_container.resolve_erased(target.clone(), ResolveOptions::default())? {
                Resolved::One(instance) => Ok(instance),
                other => Err(SilsilaError::InvalidOptions(format!(
                    "alias target {target} resolved to {}",
                    other.kind()
                ))),
            }
        }
    }
}

/// Engine errors thrown inside a factory pass through unchanged; anything
/// else the factory returns is wrapped with the path captured here.
fn factory_error(error: BoxError, params: &ResolveParams) -> SilsilaError {
    match error.downcast::<SilsilaError>() {
        Ok(inner) => *inner,
        Err(error) => SilsilaError::FactoryFailed {
            identifier: params.identifier.clone(),
            source: error,
            trace: ResolveTrace::capture(&params.record, false),
        },
    }
}

// =============================================================================
// Ambient resolution
// =============================================================================

fn ambient_container() -> Result<Container> {
    let frame = active_frame().ok_or(SilsilaError::NoActiveResolution)?;
    frame.record.current_container()
}

/// Resolves from the container of the innermost active resolution.
///
/// Valid only inside a resolve frame, i.e. from factory closures and
/// middleware; anywhere else it fails with
/// [`SilsilaError::NoActiveResolution`].
///
/// ```rust,ignore
/// container.register("service", Provider::factory(|_, _| {
///     let logger: Arc<Logger> = silsila_container::resolve("logger")?;
///     Ok(Service { logger })
/// }))?;
/// ```
pub fn resolve<T: Send + Sync + 'static>(id: impl Into<ServiceIdentifier>) -> Result<Arc<T>> {
    ambient_container()?.resolve(id)
}

/// Optional flavor of the ambient [`resolve`].
pub fn resolve_optional<T: Send + Sync + 'static>(
    id: impl Into<ServiceIdentifier>,
) -> Result<Option<Arc<T>>> {
    ambient_container()?.resolve_optional(id)
}

/// Multi-registration flavor of the ambient [`resolve`].
pub fn resolve_all<T: Send + Sync + 'static>(
    id: impl Into<ServiceIdentifier>,
) -> Result<Vec<Arc<T>>> {
    ambient_container()?.resolve_all(id)
}
