//! Values bound to the parameters of a callable invoked through the injector.

use crate::core::Instance;
use crate::error::{Error, InjectionError, InjectionErrorKind, Result};
use crate::hook::{Lazy, LazyHook};
use crate::injector::Injector;
use crate::types::{Caller, TypeArg, TypeToken};
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A single argument value.
#[derive(Clone)]
pub enum Arg {
  Value(Instance),
  /// Bound for nullable parameters whose type is not registered.
  Null,
  /// Placeholder for a dependency that is built after its owner.
  Hook(LazyHook),
}

impl Arg {
  pub fn value<T: Any + Send + Sync>(value: T) -> Self {
    Arg::Value(Instance::new(value))
  }

  pub fn shared<T: ?Sized + Any + Send + Sync>(value: Arc<T>) -> Self {
    Arg::Value(Instance::from_arc(value))
  }

  pub fn instance(&self) -> Option<&Instance> {
    match self {
      Arg::Value(instance) => Some(instance),
      _ => None,
    }
  }

  pub fn is_null(&self) -> bool {
    matches!(self, Arg::Null)
  }

  pub fn is_hook(&self) -> bool {
    matches!(self, Arg::Hook(_))
  }
}

impl From<Instance> for Arg {
  fn from(instance: Instance) -> Self {
    Arg::Value(instance)
  }
}

impl fmt::Debug for Arg {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Arg::Value(instance) => fmt::Debug::fmt(instance, f),
      Arg::Null => f.write_str("Null"),
      Arg::Hook(hook) => fmt::Debug::fmt(hook, f),
    }
  }
}

/// The resolved arguments handed to a constructor, init method or function.
///
/// Arguments are taken out by parameter name. Constructors also see the
/// token they are being built for and the injector building them.
pub struct Arguments {
  caller: Caller,
  values: HashMap<String, Arg>,
  tokens: HashMap<String, TypeToken>,
  extra: HashMap<String, Arg>,
  hooks: Vec<LazyHook>,
  token: Option<TypeToken>,
  injector: Option<Injector>,
}

impl Arguments {
  pub(crate) fn new(caller: Caller) -> Self {
    Self {
      caller,
      values: HashMap::new(),
      tokens: HashMap::new(),
      extra: HashMap::new(),
      hooks: Vec::new(),
      token: None,
      injector: None,
    }
  }

  pub(crate) fn bind(&mut self, name: impl Into<String>, arg: Arg, token: Option<TypeToken>) {
    let name = name.into();
    if let Arg::Hook(hook) = &arg {
      self.hooks.push(hook.clone());
    }
    if let Some(token) = token {
      self.tokens.insert(name.clone(), token);
    }
    self.values.insert(name, arg);
  }

  pub(crate) fn bind_extra(&mut self, name: String, arg: Arg) {
    self.extra.insert(name, arg);
  }

  pub(crate) fn stamp(&mut self, token: TypeToken, injector: Injector) {
    self.token = Some(token);
    self.injector = Some(injector);
  }

  pub(crate) fn hooks(&self) -> &[LazyHook] {
    &self.hooks
  }

  pub fn caller(&self) -> &Caller {
    &self.caller
  }

  pub fn contains(&self, name: &str) -> bool {
    self.values.contains_key(name)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.values.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  /// Takes the raw argument bound to `name`.
  pub fn raw(&mut self, name: &str) -> Result<Arg> {
    self.values.remove(name).ok_or_else(|| {
      self.error(
        InjectionErrorKind::ArgumentType,
        name,
        format!("No argument named '{}' was bound", name),
      )
    })
  }

  /// Takes the instance bound to `name`. Fails on null values and on lazy
  /// placeholders.
  pub fn instance(&mut self, name: &str) -> Result<Instance> {
    match self.raw(name)? {
      Arg::Value(instance) => Ok(instance),
      Arg::Null => Err(self.error(
        InjectionErrorKind::ArgumentType,
        name,
        format!("Argument '{}' is null", name),
      )),
      Arg::Hook(hook) => Err(self.error(
        InjectionErrorKind::UnresolvedHook,
        name,
        format!(
          "Tried accessing injected instance {} during construction. \
           Declare the parameter with Parameter::lazy and keep the Lazy handle, \
           or use the dependency from an init method",
          hook.token()
        ),
      )),
    }
  }

  pub fn take<T: ?Sized + Any + Send + Sync>(&mut self, name: &str) -> Result<Arc<T>> {
    let instance = self.instance(name)?;
    self.downcast(name, &instance)
  }

  /// Like [`Arguments::take`], but a null argument yields `None`.
  pub fn optional<T: ?Sized + Any + Send + Sync>(&mut self, name: &str) -> Result<Option<Arc<T>>> {
    if matches!(self.values.get(name), Some(Arg::Null)) {
      self.values.remove(name);
      return Ok(None);
    }
    self.take::<T>(name).map(Some)
  }

  /// Takes a dependency that may still be a placeholder.
  pub fn lazy<T: ?Sized + Any + Send + Sync>(&mut self, name: &str) -> Result<Lazy<T>> {
    let token = self.tokens.get(name).cloned();
    match self.raw(name)? {
      Arg::Value(instance) => {
        let value = self.downcast(name, &instance)?;
        Ok(Lazy::resolved(token, value))
      }
      Arg::Hook(hook) => Ok(Lazy::hooked(&hook)),
      Arg::Null => Err(self.error(
        InjectionErrorKind::ArgumentType,
        name,
        format!("Argument '{}' is null", name),
      )),
    }
  }

  pub fn cloned<T: Clone + Any + Send + Sync>(&mut self, name: &str) -> Result<T> {
    Ok((*self.take::<T>(name)?).clone())
  }

  /// Drains the named arguments collected by a var-named parameter.
  pub fn extra(&mut self) -> HashMap<String, Arg> {
    std::mem::take(&mut self.extra)
  }

  /// The token of the class being constructed.
  pub fn type_token(&self) -> Option<&TypeToken> {
    self.token.as_ref()
  }

  /// The resolved generic arguments of the class being constructed.
  pub fn type_args(&self) -> &[TypeArg] {
    self.token.as_ref().map(TypeToken::args).unwrap_or(&[])
  }

  /// The injector constructing the current instance.
  pub fn injector(&self) -> Option<&Injector> {
    self.injector.as_ref()
  }

  fn downcast<T: ?Sized + Any + Send + Sync>(&self, name: &str, instance: &Instance) -> Result<Arc<T>> {
    instance.downcast::<T>().ok_or_else(|| {
      self.error(
        InjectionErrorKind::ArgumentType,
        name,
        format!(
          "Argument '{}' holds {}, not {}",
          name,
          instance.type_name(),
          type_name::<T>()
        ),
      )
    })
  }

  fn error(&self, kind: InjectionErrorKind, name: &str, message: String) -> Error {
    InjectionError::new(kind, message)
      .with_context(self.caller.error_context().with_parameter(name))
      .into()
  }
}

impl fmt::Debug for Arguments {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Arguments")
      .field("caller", &self.caller)
      .field("values", &self.values)
      .field("extra", &self.extra)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn args() -> Arguments {
    let mut args = Arguments::new(Caller::Function("handler".into()));
    args.bind("name", Arg::value(String::from("fibre")), None);
    args.bind("missing", Arg::Null, None);
    args
  }

  #[test]
  fn take_and_optional() {
    let mut args = args();
    assert_eq!(args.cloned::<String>("name").unwrap(), "fibre");
    assert!(args.optional::<String>("missing").unwrap().is_none());
    assert!(args.is_empty());
  }

  #[test]
  fn wrong_type_names_parameter() {
    let mut args = args();
    let err = args.take::<u32>("name").unwrap_err();
    let err = err.as_injection().unwrap();
    assert_eq!(err.kind(), InjectionErrorKind::ArgumentType);
    assert_eq!(err.context().function.as_deref(), Some("handler"));
    assert_eq!(err.context().parameter.as_deref(), Some("name"));
  }
}
