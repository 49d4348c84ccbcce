//! Registration records and the per-class bags that hold them.

use crate::arguments::Arg;
use crate::error::{InjectionError, InjectionErrorKind, TypingError};
use crate::types::{Class, Function, TypeToken};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// How long an instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
  /// One instance per injector, shared by every scope.
  Singleton,
  /// One instance per scoped session.
  Scoped,
  /// A new instance on every request.
  Transient,
}

impl Strategy {
  pub fn as_str(&self) -> &'static str {
    match self {
      Strategy::Singleton => "singleton",
      Strategy::Scoped => "scoped",
      Strategy::Transient => "transient",
    }
  }
}

impl fmt::Display for Strategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Everything a registration carries besides the types involved.
#[derive(Clone, Debug)]
pub struct InjectableOptions {
  pub(crate) strategy: Strategy,
  pub(crate) args: Vec<Arg>,
  pub(crate) named_args: HashMap<String, Arg>,
  pub(crate) before_init: Vec<Function<()>>,
  pub(crate) after_init: Vec<Function<()>>,
  pub(crate) match_all: bool,
}

impl InjectableOptions {
  pub fn new(strategy: Strategy) -> Self {
    Self {
      strategy,
      args: Vec::new(),
      named_args: HashMap::new(),
      before_init: Vec::new(),
      after_init: Vec::new(),
      match_all: false,
    }
  }

  pub fn singleton() -> Self {
    Self::new(Strategy::Singleton)
  }

  pub fn scoped() -> Self {
    Self::new(Strategy::Scoped)
  }

  pub fn transient() -> Self {
    Self::new(Strategy::Transient)
  }

  /// Appends a positional constructor argument.
  pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn named_arg(mut self, name: impl Into<String>, arg: impl Into<Arg>) -> Self {
    self.named_args.insert(name.into(), arg.into());
    self
  }

  /// Runs after construction, before the class's init methods.
  pub fn before_init(mut self, hook: Function<()>) -> Self {
    self.before_init.push(hook);
    self
  }

  /// Runs after the class's init methods.
  pub fn after_init(mut self, hook: Function<()>) -> Self {
    self.after_init.push(hook);
    self
  }

  /// Serves every generic instantiation that has no exact registration.
  pub fn match_all(mut self) -> Self {
    self.match_all = true;
    self
  }

  pub fn strategy(&self) -> Strategy {
    self.strategy
  }

  pub fn is_match_all(&self) -> bool {
    self.match_all
  }
}

impl Default for InjectableOptions {
  fn default() -> Self {
    Self::singleton()
  }
}

/// The record created when a class is registered.
#[derive(Clone)]
pub struct RegisteredType {
  token: TypeToken,
  options: InjectableOptions,
}

impl RegisteredType {
  pub(crate) fn new(token: TypeToken, options: InjectableOptions) -> Self {
    Self { token, options }
  }

  /// The token of the concrete class. Generic arguments are `Any` for
  /// match-all registrations.
  pub fn token(&self) -> &TypeToken {
    &self.token
  }

  pub fn strategy(&self) -> Strategy {
    self.options.strategy
  }

  pub fn is_match_all(&self) -> bool {
    self.options.match_all
  }

  pub fn args(&self) -> &[Arg] {
    &self.options.args
  }

  pub fn named_args(&self) -> &HashMap<String, Arg> {
    &self.options.named_args
  }

  pub fn before_init(&self) -> &[Function<()>] {
    &self.options.before_init
  }

  pub fn after_init(&self) -> &[Function<()>] {
    &self.options.after_init
  }

  /// The cache key of the instance served for `requested`. A match-all
  /// registration serves one instance per requested instantiation.
  pub(crate) fn instance_key(&self, requested: &TypeToken) -> TypeToken {
    if self.is_match_all() {
      requested.clone()
    } else {
      self.token.clone()
    }
  }

  /// The token the concrete class is built as when serving `requested`.
  pub(crate) fn construction_token(&self, requested: &TypeToken) -> Result<TypeToken, TypingError> {
    if !self.is_match_all() {
      return Ok(self.token.clone());
    }
    let class = self.token.class();
    if class == requested.class() {
      return Ok(requested.clone());
    }
    TypeToken::new(class.clone(), class.infer_args_from(requested))
  }
}

impl fmt::Debug for RegisteredType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "<RegisteredType {}: {}", self.token, self.strategy())?;
    if self.is_match_all() {
      f.write_str(", match all")?;
    }
    f.write_str(">")
  }
}

/// All registrations made under one base class.
#[derive(Clone, Debug)]
pub struct RegisteredTypeBag {
  class: Class,
  match_all: Option<Arc<RegisteredType>>,
  types: HashMap<TypeToken, Arc<RegisteredType>>,
}

impl RegisteredTypeBag {
  pub fn new(class: Class) -> Self {
    Self {
      class,
      match_all: None,
      types: HashMap::new(),
    }
  }

  pub fn class(&self) -> &Class {
    &self.class
  }

  /// Stores a registration under `token`, returning the one it replaced.
  pub fn add_type(
    &mut self,
    token: TypeToken,
    registered: RegisteredType,
  ) -> Option<Arc<RegisteredType>> {
    self.types.insert(token, Arc::new(registered))
  }

  /// Stores the fallback registration, returning the one it replaced.
  pub fn set_match_all(&mut self, registered: RegisteredType) -> Option<Arc<RegisteredType>> {
    self.match_all.replace(Arc::new(registered))
  }

  /// The exact registration for `token`, else the match-all one.
  pub fn get_type(&self, token: &TypeToken) -> Result<Arc<RegisteredType>, InjectionError> {
    self
      .types
      .get(token)
      .or(self.match_all.as_ref())
      .cloned()
      .ok_or_else(|| {
        InjectionError::new(
          InjectionErrorKind::NotRegistered,
          "Type is not registered in the injection system",
        )
        .in_class(token.to_string())
      })
  }

  pub fn has_type(&self, token: &TypeToken) -> bool {
    self.types.contains_key(token)
  }

  pub fn has_match_all(&self) -> bool {
    self.match_all.is_some()
  }

  pub fn is_registered(&self, token: &TypeToken) -> bool {
    self.has_type(token) || self.has_match_all()
  }

  pub fn match_all(&self) -> Option<&Arc<RegisteredType>> {
    self.match_all.as_ref()
  }

  /// Exact registrations, keyed by the token they were registered under.
  pub fn types(&self) -> impl Iterator<Item = (&TypeToken, &Arc<RegisteredType>)> {
    self.types.iter()
  }

  pub fn len(&self) -> usize {
    self.types.len() + usize::from(self.match_all.is_some())
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
