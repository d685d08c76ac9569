//! # Silsila - Dependency Injection Container for Rust
//!
//! سلسلة - "The Chain"
//!
//! A hierarchical, middleware-extensible IoC container: containers chain
//! to parents, middlewares chain around the resolver, and every
//! resolution is recorded as a chain of steps for cycle detection and
//! readable failure paths.
//!
//! # Quick Start
//! ```rust
//! use silsila::prelude::*;
//! use std::sync::Arc;
//!
//! trait Logger: Send + Sync {
//!     fn log(&self, msg: &str);
//! }
//!
//! struct ConsoleLogger;
//! impl Logger for ConsoleLogger {
//!     fn log(&self, msg: &str) { println!("[LOG] {msg}"); }
//! }
//!
//! struct UserService {
//!     logger: Arc<Arc<dyn Logger>>,
//! }
//!
//! let container = Container::new("app");
//! container.register("logger", Provider::factory(|_, _| {
//!     Ok(Arc::new(ConsoleLogger) as Arc<dyn Logger>)
//! }).with_lifecycle(Lifecycle::Singleton)).unwrap();
//! container.register("users", Provider::factory(|container, _| {
//!     Ok(UserService { logger: container.resolve("logger")? })
//! })).unwrap();
//!
//! let service: Arc<UserService> = container.resolve("users").unwrap();
//! service.logger.log("It works!");
//! ```

pub use silsila_container::*;
pub use silsila_support::disposal;
pub use silsila_support::events;
pub use silsila_support::rendering;
