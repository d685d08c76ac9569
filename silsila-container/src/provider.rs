//! Providers - the recipes a container resolves identifiers into.
//!
//! A [`Provider`] pairs a recipe ([`ProviderKind`]) with a
//! [`Lifecycle`]. Four recipes exist:
//! - `class`: construct a `T: Default`
//! - `value`: hand out a pre-built value
//! - `factory`: run a closure against the container
//! - `alias`: forward to another identifier, possibly in another container
//!
//! Instances are type-erased as `Arc<dyn Any + Send + Sync>`; the typed
//! container API downcasts on the way out.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::container::Container;
use crate::context::ResolveContext;
use crate::identifier::ServiceIdentifier;
use crate::lifecycle::Lifecycle;

/// A type-erased resolved instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Error type user factories return.
///
/// Engine errors passed through with `?` are unwrapped again on the other
/// side, so nested resolution failures keep their original shape.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An erased factory closure.
///
/// Receives the container the resolve call was made on and the resolution
/// context of the current top-level resolve.
pub type FactoryFn =
    Arc<dyn Fn(&Container, &ResolveContext) -> Result<Instance, BoxError> + Send + Sync>;

/// An erased no-argument constructor.
pub type CtorFn = Arc<dyn Fn() -> Instance + Send + Sync>;

/// Locates the container an alias forwards into, at resolve time.
pub type ContainerLocator = Arc<dyn Fn() -> Container + Send + Sync>;

/// The recipe half of a provider.
#[derive(Clone)]
pub enum ProviderKind {
    /// Construct via the type's constructor.
    Class(CtorFn),
    /// A pre-built value, returned as-is.
    Value(Instance),
    /// A closure producing the instance, free to resolve sub-dependencies.
    Factory(FactoryFn),
    /// Forward resolution to another identifier.
    ///
    /// The locator, when present, is read at resolve time rather than at
    /// registration time, so late-bound container wiring works.
    Alias {
        target: ServiceIdentifier,
        locator: Option<ContainerLocator>,
    },
}

impl ProviderKind {
    fn tag(&self) -> &'static str {
        match self {
            ProviderKind::Class(_) => "class",
            ProviderKind::Value(_) => "value",
            ProviderKind::Factory(_) => "factory",
            ProviderKind::Alias { .. } => "alias",
        }
    }
}

impl fmt::Debug for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Alias { target, locator } => f
                .debug_struct("Alias")
                .field("target", target)
                .field("late_bound", &locator.is_some())
                .finish(),
            other => write!(f, "{}", other.tag()),
        }
    }
}

/// A recipe plus the lifecycle of the instances it produces.
///
/// # Examples
/// ```
/// use silsila_container::provider::Provider;
/// use silsila_container::lifecycle::Lifecycle;
///
/// #[derive(Default)]
/// struct Clock;
///
/// let transient = Provider::class::<Clock>();
/// assert_eq!(transient.lifecycle(), Lifecycle::Transient);
///
/// let shared = Provider::class::<Clock>().with_lifecycle(Lifecycle::Singleton);
/// assert_eq!(shared.lifecycle(), Lifecycle::Singleton);
/// ```
#[derive(Clone)]
pub struct Provider {
    kind: ProviderKind,
    lifecycle: Lifecycle,
}

impl Provider {
    /// A provider that constructs `T` via [`Default`].
    pub fn class<T: Default + Send + Sync + 'static>() -> Self {
        Self {
            kind: ProviderKind::Class(Arc::new(|| Arc::new(T::default()) as Instance)),
            lifecycle: Lifecycle::default(),
        }
    }

    /// A provider holding a pre-built value.
    ///
    /// The value is returned as-is on every resolve, so the lifecycle is
    /// singleton by construction.
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            kind: ProviderKind::Value(Arc::new(value)),
            lifecycle: Lifecycle::Singleton,
        }
    }

    /// A provider running a factory closure.
    ///
    /// The closure receives the resolving [`Container`] (so it can resolve
    /// its own dependencies) and the current [`ResolveContext`].
    pub fn factory<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Container, &ResolveContext) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            kind: ProviderKind::Factory(Arc::new(move |container, context| {
                factory(container, context).map(|value| Arc::new(value) as Instance)
            })),
            lifecycle: Lifecycle::default(),
        }
    }

    /// A provider forwarding to `target` in the resolving container.
    pub fn alias(target: impl Into<ServiceIdentifier>) -> Self {
        Self {
            kind: ProviderKind::Alias {
                target: target.into(),
                locator: None,
            },
            lifecycle: Lifecycle::default(),
        }
    }

    /// A provider forwarding to `target` in the container the locator
    /// returns at resolve time.
    pub fn alias_in(
        target: impl Into<ServiceIdentifier>,
        locator: impl Fn() -> Container + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind: ProviderKind::Alias {
                target: target.into(),
                locator: Some(Arc::new(locator)),
            },
            lifecycle: Lifecycle::default(),
        }
    }

    /// Overrides the lifecycle.
    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    #[inline]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    #[inline]
    pub fn kind(&self) -> &ProviderKind {
        &self.kind
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("kind", &self.kind)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Widget;

    #[test]
    fn class_defaults_to_transient() {
        let provider = Provider::class::<Widget>();
        assert_eq!(provider.lifecycle(), Lifecycle::Transient);
        assert!(matches!(provider.kind(), ProviderKind::Class(_)));
    }

    #[test]
    fn value_forces_singleton() {
        let provider = Provider::value(42u32);
        assert_eq!(provider.lifecycle(), Lifecycle::Singleton);
        assert!(matches!(provider.kind(), ProviderKind::Value(_)));
    }

    #[test]
    fn class_constructs_via_default() {
        let provider = Provider::class::<Widget>();
        let ProviderKind::Class(ctor) = provider.kind() else {
            panic!("expected class provider");
        };
        let instance = (**ctor)();
        assert!(instance.downcast::<Widget>().is_ok());
    }

    #[test]
    fn lifecycle_override() {
        let provider = Provider::factory(|_, _| Ok(1u8)).with_lifecycle(Lifecycle::Resolution);
        assert_eq!(provider.lifecycle(), Lifecycle::Resolution);
    }

    #[test]
    fn alias_records_target() {
        let provider = Provider::alias("db");
        let ProviderKind::Alias { target, locator } = provider.kind() else {
            panic!("expected alias provider");
        };
        assert_eq!(*target, ServiceIdentifier::named("db"));
        assert!(locator.is_none());
    }

    #[test]
    fn debug_shows_kind() {
        let provider = Provider::value("x");
        let debug = format!("{provider:?}");
        assert!(debug.contains("value"));
        assert!(debug.contains("Singleton"));
    }
}
