use super::{Injectable, TypeExpr, TypeToken};
use crate::arguments::{Arg, Arguments};
use crate::error::{ErrorContext, Result};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Name of the receiver parameter of init methods and registered hooks.
pub const RECEIVER: &str = "self";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
  /// Bound by name, or by position from the supplied positional arguments.
  Named,
  /// Can only be passed by position. Rejected by the container.
  PositionalOnly,
  /// Collects any number of positional arguments. Rejected by the container.
  VarPositional,
  /// Collects every named argument left over.
  VarNamed,
}

/// One declared parameter of a [`Function`].
#[derive(Clone)]
pub struct Parameter {
  name: String,
  kind: ParameterKind,
  annotation: Option<TypeExpr>,
  default: Option<Arg>,
  deferred: bool,
}

impl Parameter {
  /// An unannotated named parameter.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      kind: ParameterKind::Named,
      annotation: None,
      default: None,
      deferred: false,
    }
  }

  pub fn typed(name: impl Into<String>, annotation: TypeExpr) -> Self {
    Self {
      annotation: Some(annotation),
      ..Self::new(name)
    }
  }

  pub fn of<T: ?Sized + Injectable>(name: impl Into<String>) -> Self {
    Self::typed(name, TypeExpr::of::<T>())
  }

  /// A parameter that accepts a [`crate::Lazy`] placeholder when the
  /// dependency has not been built yet.
  pub fn lazy<T: ?Sized + Injectable>(name: impl Into<String>) -> Self {
    Self::of::<T>(name).deferred()
  }

  pub fn var_named(name: impl Into<String>) -> Self {
    Self {
      kind: ParameterKind::VarNamed,
      ..Self::new(name)
    }
  }

  pub fn positional_only(name: impl Into<String>) -> Self {
    Self {
      kind: ParameterKind::PositionalOnly,
      ..Self::new(name)
    }
  }

  pub fn var_positional(name: impl Into<String>) -> Self {
    Self {
      kind: ParameterKind::VarPositional,
      ..Self::new(name)
    }
  }

  pub fn deferred(mut self) -> Self {
    self.deferred = true;
    self
  }

  pub fn with_default(mut self, default: impl Into<Arg>) -> Self {
    self.default = Some(default.into());
    self
  }

  pub fn with_default_value<T: Any + Send + Sync>(self, value: T) -> Self {
    self.with_default(Arg::value(value))
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn kind(&self) -> ParameterKind {
    self.kind
  }

  pub fn annotation(&self) -> Option<&TypeExpr> {
    self.annotation.as_ref()
  }

  pub fn default(&self) -> Option<&Arg> {
    self.default.as_ref()
  }

  pub fn is_deferred(&self) -> bool {
    self.deferred
  }
}

impl fmt::Debug for Parameter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Parameter")
      .field("name", &self.name)
      .field("kind", &self.kind)
      .field("annotation", &self.annotation)
      .field("has_default", &self.default.is_some())
      .field("deferred", &self.deferred)
      .finish()
  }
}

/// The ordered parameter list of a callable.
#[derive(Clone, Debug, Default)]
pub struct Signature {
  params: Vec<Parameter>,
}

impl Signature {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn param(mut self, param: Parameter) -> Self {
    self.params.push(param);
    self
  }

  pub fn params(&self) -> &[Parameter] {
    &self.params
  }

  pub fn get(&self, name: &str) -> Option<&Parameter> {
    self.params.iter().find(|p| p.name == name)
  }

  pub fn len(&self) -> usize {
    self.params.len()
  }

  pub fn is_empty(&self) -> bool {
    self.params.is_empty()
  }
}

type Body<R> = Arc<dyn Fn(&mut Arguments) -> Result<R> + Send + Sync>;

/// A named callable whose parameters the container can resolve.
pub struct Function<R> {
  name: String,
  signature: Signature,
  body: Body<R>,
}

impl<R> Clone for Function<R> {
  fn clone(&self) -> Self {
    Self {
      name: self.name.clone(),
      signature: self.signature.clone(),
      body: Arc::clone(&self.body),
    }
  }
}

impl<R: 'static> Function<R> {
  pub fn new(
    name: impl Into<String>,
    signature: Signature,
    body: impl Fn(&mut Arguments) -> Result<R> + Send + Sync + 'static,
  ) -> Self {
    Self {
      name: name.into(),
      signature,
      body: Arc::new(body),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn signature(&self) -> &Signature {
    &self.signature
  }

  // Clones share one body, so the body's address identifies the callable.
  pub(crate) fn id(&self) -> usize {
    Arc::as_ptr(&self.body) as *const () as usize
  }

  pub(crate) fn renamed(mut self, name: String) -> Self {
    self.name = name;
    self
  }

  pub(crate) fn invoke(&self, args: &mut Arguments) -> Result<R> {
    (self.body)(args)
  }
}

impl Function<()> {
  /// A function that receives an already built `T` as its first argument.
  ///
  /// Used for init methods and for before/after init hooks of a
  /// registration. The receiver is bound positionally by the injector.
  pub fn method<T: ?Sized + Any + Send + Sync>(
    name: impl Into<String>,
    signature: Signature,
    body: impl Fn(&T, &mut Arguments) -> Result<()> + Send + Sync + 'static,
  ) -> Self {
    let mut full = Signature::new().param(Parameter::new(RECEIVER));
    full.params.extend(signature.params);
    Self::new(name, full, move |args| {
      let receiver = args.take::<T>(RECEIVER)?;
      body(&receiver, args)
    })
  }
}

impl<R> fmt::Debug for Function<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Function")
      .field("name", &self.name)
      .field("signature", &self.signature)
      .finish()
  }
}

/// Who is asking for arguments: a class constructor or a plain function.
#[derive(Clone, Debug)]
pub enum Caller {
  Class(TypeToken),
  Function(String),
}

impl Caller {
  pub(crate) fn error_context(&self) -> ErrorContext {
    match self {
      Caller::Class(token) => ErrorContext::class(token.to_string()),
      Caller::Function(name) => ErrorContext::function(name.clone()),
    }
  }
}

impl fmt::Display for Caller {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Caller::Class(token) => fmt::Display::fmt(token, f),
      Caller::Function(name) => f.write_str(name),
    }
  }
}
