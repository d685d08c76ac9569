//! Core container implementation for Silsila DI.

pub mod container;
pub mod context;
pub mod error;
pub mod identifier;
pub mod lifecycle;
pub mod middleware;
pub mod provider;
pub mod record;
pub mod reference;
pub mod registration;
pub mod resolve;

pub use container::Container;
pub use context::ResolveContext;
pub use error::{Result, SilsilaError};
pub use identifier::{ServiceIdentifier, Token};
pub use lifecycle::Lifecycle;
pub use middleware::{
    Middleware, MiddlewareManager, MiddlewareName, NextResolve, ResolveEvent, ResolveParams,
    global_middleware,
};
pub use provider::{BoxError, Instance, Provider};
pub use record::{RecordNode, ResolveRecord};
pub use reference::{DynRef, LazyRef};
pub use registration::{Registration, RegistrationId};
pub use resolve::{ResolveOptions, resolve, resolve_all, resolve_optional};

pub mod prelude {
    pub use crate::container::Container;
    pub use crate::error::{Result, SilsilaError};
    pub use crate::identifier::{ServiceIdentifier, Token};
    pub use crate::lifecycle::Lifecycle;
    pub use crate::middleware::{Middleware, global_middleware};
    pub use crate::provider::Provider;
    pub use crate::reference::{DynRef, LazyRef};
    pub use crate::resolve::{ResolveOptions, resolve};
}
