//! The argument resolver pipeline.
//!
//! For every parameter that is not bound from explicit arguments, the
//! injector asks each resolver in turn whether it supports the parameter.
//! The first one that does supplies the value. [`DefaultArgResolver`] always
//! comes last and serves container-managed types.

use crate::arguments::Arg;
use crate::error::{InjectionError, InjectionErrorKind, Result, TypingError};
use crate::hook::LazyHook;
use crate::injector::Injector;
use crate::registration::Strategy;
use crate::types::{Caller, TypeArg, TypeToken};
use tracing::trace;

/// Everything a resolver knows about the parameter being resolved.
pub struct ArgResolverOptions<'a> {
  pub injector: &'a Injector,
  pub caller: &'a Caller,
  /// Generic arguments of the calling class, empty for functions.
  pub caller_type_args: &'a [TypeArg],
  /// Lifetime of the calling class; `None` for ad hoc instantiation.
  pub caller_strategy: Option<Strategy>,
  pub name: &'a str,
  pub token: &'a TypeToken,
  pub nullable: bool,
  pub default: Option<&'a Arg>,
  /// Whether the value must be a real instance rather than a lazy hook.
  pub immediate: bool,
}

impl ArgResolverOptions<'_> {
  pub(crate) fn error(&self, kind: InjectionErrorKind, message: impl Into<String>) -> InjectionError {
    InjectionError::new(kind, message)
      .with_context(self.caller.error_context().with_parameter(self.name))
  }
}

/// A pluggable strategy supplying the value of one parameter.
pub trait ArgumentResolver: Send + Sync {
  fn supports(&self, options: &ArgResolverOptions<'_>) -> bool;

  /// Produces the `(name, value)` pair bound for the parameter.
  fn resolve(&self, options: &ArgResolverOptions<'_>) -> Result<(String, Arg)>;
}

/// Resolves parameters whose type is registered in the injector.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultArgResolver;

impl ArgumentResolver for DefaultArgResolver {
  fn supports(&self, _options: &ArgResolverOptions<'_>) -> bool {
    true
  }

  fn resolve(&self, options: &ArgResolverOptions<'_>) -> Result<(String, Arg)> {
    let name = options.name.to_owned();
    let token = options.token;

    // `TypeToken[X]` parameters receive the token of X itself.
    if token.is::<TypeToken>() {
      return match token.arg(0) {
        Some(TypeArg::Type(inner)) => Ok((name, Arg::value(inner.clone()))),
        _ => Err(TypingError::new("Any/TypeVar cannot be used as a concrete type").into()),
      };
    }

    let injector = options.injector;
    if !injector.is_registered(token) {
      if options.nullable {
        trace!(parameter = %name, token = %token, "unregistered nullable parameter, binding null");
        return Ok((name, Arg::Null));
      }
      if let Some(default) = options.default {
        trace!(parameter = %name, token = %token, "unregistered parameter, using default");
        return Ok((name, default.clone()));
      }
      return Err(
        options
          .error(
            InjectionErrorKind::NotRegistered,
            format!("Type {} is not registered in the injection system", token),
          )
          .into(),
      );
    }

    let registered = injector.registered_type(token)?;
    if registered.strategy() == Strategy::Scoped
      && matches!(
        options.caller_strategy,
        Some(Strategy::Singleton) | Some(Strategy::Transient)
      )
    {
      return Err(
        options
          .error(
            InjectionErrorKind::WrongLifetime,
            format!(
              "Cannot instantiate scoped service {} in a non-scoped ({}) context",
              token,
              options.caller_strategy.map(|s| s.as_str()).unwrap_or("unknown"),
            ),
          )
          .into(),
      );
    }

    if let Some(instance) = injector.cached_instance(&registered, token)? {
      trace!(parameter = %name, token = %token, "resolved from context");
      return Ok((name, Arg::Value(instance)));
    }

    if options.immediate {
      trace!(parameter = %name, token = %token, "instantiating immediately");
      let instance = injector.instantiate_registered(&registered, token)?;
      return Ok((name, Arg::Value(instance)));
    }

    trace!(parameter = %name, token = %token, "deferring with a lazy hook");
    Ok((name, Arg::Hook(LazyHook::new(token.clone()))))
  }
}
