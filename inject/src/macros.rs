//! Public macros for ergonomic service resolution.

/// Requires a service from an injector, panicking when it cannot be served.
///
/// # Panics
///
/// Panics if the service is not registered, has a lifetime the injector
/// cannot serve here, or fails to build. For a non-panicking version use
/// [`Injector::require`](crate::Injector::require).
///
/// # Examples
///
/// ```
/// use fibre_inject::{require, ClassBuilder, Injectable, Injector, Registry, Signature};
///
/// struct Clock;
/// impl Injectable for Clock {
///   fn describe() -> ClassBuilder<Self> {
///     ClassBuilder::new().constructor(Signature::new(), |_| Ok(Clock))
///   }
/// }
///
/// let injector = Injector::new(Registry::new()).unwrap();
/// injector.add_singleton::<Clock>().unwrap();
/// let _clock = require!(injector, Clock);
/// ```
#[macro_export]
macro_rules! require {
  // require!(injector, trait MyTrait)
  ($injector:expr, trait $trait_ident:ident) => {
    $injector.require::<dyn $trait_ident>().unwrap_or_else(|err| {
      panic!(
        "Failed to require trait service {}: {}",
        std::any::type_name::<dyn $trait_ident>(),
        err
      )
    })
  };

  // require!(injector, MyService)
  ($injector:expr, $type:ty) => {
    $injector.require::<$type>().unwrap_or_else(|err| {
      panic!(
        "Failed to require service {}: {}",
        std::any::type_name::<$type>(),
        err
      )
    })
  };
}
