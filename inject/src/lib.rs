//! # Fibre Inject
//!
//! A thread-safe dependency-injection runtime with generic type tokens,
//! singleton, scoped and transient lifetimes, lazy dependencies and a
//! pluggable argument resolver pipeline.
//!
//! ## Core Concepts
//!
//! - **Injectable**: a type describes its constructor, generic parameters,
//!   bases and init methods through a [`ClassBuilder`].
//! - **TypeToken**: a class with its generic arguments, e.g.
//!   `Repository[User]`. Tokens are the keys of every registry and cache.
//! - **Registry**: the explicit list of injectables, argument resolvers and
//!   event callbacks an [`Injector`] is built from.
//! - **Injector**: registers types, resolves arguments and builds instances.
//!   Scoped sessions are opened with [`Injector::get_scoped_session`].
//! - **Lazy**: a dependency that is resolved on first use, which lets two
//!   services depend on each other.
//!
//! ## Quick Start
//!
//! ```
//! use fibre_inject::{
//!   ClassBuilder, Injectable, InjectableOptions, Injector, Parameter, Registry, Signature,
//! };
//! use std::sync::Arc;
//!
//! trait Greeter: Send + Sync {
//!   fn greet(&self) -> String;
//! }
//! impl Injectable for dyn Greeter {
//!   fn describe() -> ClassBuilder<Self> {
//!     ClassBuilder::new()
//!   }
//! }
//!
//! struct Config {
//!   name: String,
//! }
//! impl Injectable for Config {
//!   fn describe() -> ClassBuilder<Self> {
//!     ClassBuilder::new().constructor(Signature::new(), |_| {
//!       Ok(Config { name: "World".into() })
//!     })
//!   }
//! }
//!
//! struct EnglishGreeter {
//!   config: Arc<Config>,
//! }
//! impl Greeter for EnglishGreeter {
//!   fn greet(&self) -> String {
//!     format!("Hello, {}!", self.config.name)
//!   }
//! }
//! impl Injectable for EnglishGreeter {
//!   fn describe() -> ClassBuilder<Self> {
//!     ClassBuilder::new()
//!       .implements::<dyn Greeter>(|it| it as Arc<dyn Greeter>)
//!       .constructor(
//!         Signature::new().param(Parameter::of::<Config>("config")),
//!         |args| Ok(EnglishGreeter { config: args.take("config")? }),
//!       )
//!   }
//! }
//!
//! fn main() -> fibre_inject::Result<()> {
//!   let mut registry = Registry::new();
//!   registry
//!     .injectable::<Config>(InjectableOptions::singleton())
//!     .injectable_as::<dyn Greeter, EnglishGreeter>(InjectableOptions::transient());
//!
//!   let injector = Injector::new(registry)?;
//!   let greeter = injector.require::<dyn Greeter>()?;
//!   assert_eq!(greeter.greet(), "Hello, World!");
//!   Ok(())
//! }
//! ```

mod arguments;
mod config;
mod context;
mod core;
mod error;
mod hook;
mod injector;
mod macros;
mod registration;
mod registry;
mod report;
mod resolver;
mod scoped;
mod types;

pub use arguments::{Arg, Arguments};
pub use config::{InjectorConfig, RegistrationMode};
pub use context::InjectionContext;
pub use core::Instance;
pub use error::{Error, ErrorContext, InjectionError, InjectionErrorKind, Result, TypingError};
pub use hook::{Lazy, LazyHook};
pub use injector::{AddOptions, CallOptions, Injector, ResolveRequest};
pub use registration::{InjectableOptions, RegisteredType, RegisteredTypeBag, Strategy};
pub use registry::{InjectionCallback, InjectionEvent, Registry};
pub use report::{print_registry_report, registry_report};
pub use resolver::{ArgResolverOptions, ArgumentResolver, DefaultArgResolver};
pub use scoped::ScopedInjector;
pub use types::{
  BaseClass, Caller, Class, ClassBuilder, ClassInfo, ClassRef, Function, Injectable, Parameter,
  ParameterKind, Signature, TypeArg, TypeExpr, TypeToken, TypeVar, TypeVarLookup, RECEIVER,
};
