//! Error types for the injection runtime.

use std::fmt;
use thiserror::Error;

/// Where an error happened: the class being built, the function being called
/// and the parameter being resolved. Every part is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
  pub class: Option<String>,
  pub function: Option<String>,
  pub parameter: Option<String>,
}

impl ErrorContext {
  pub fn class(name: impl Into<String>) -> Self {
    Self {
      class: Some(name.into()),
      ..Default::default()
    }
  }

  pub fn function(name: impl Into<String>) -> Self {
    Self {
      function: Some(name.into()),
      ..Default::default()
    }
  }

  pub fn with_parameter(mut self, name: impl Into<String>) -> Self {
    self.parameter = Some(name.into());
    self
  }

  pub fn is_empty(&self) -> bool {
    self.class.is_none() && self.function.is_none() && self.parameter.is_none()
  }
}

impl fmt::Display for ErrorContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut parts = Vec::with_capacity(3);
    if let Some(class) = &self.class {
      parts.push(format!("Type {}", class));
    }
    if let Some(function) = &self.function {
      parts.push(format!("Function {}", function));
    }
    if let Some(parameter) = &self.parameter {
      parts.push(format!("Parameter {}", parameter));
    }
    f.write_str(&parts.join(", "))
  }
}

/// Malformed or unresolvable generic type usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingError {
  pub class: Option<String>,
  pub message: String,
}

impl TypingError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      class: None,
      message: message.into(),
    }
  }

  pub fn in_class(mut self, class: impl Into<String>) -> Self {
    self.class = Some(class.into());
    self
  }
}

impl fmt::Display for TypingError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.class {
      Some(class) => write!(f, "Type {}, {}", class, self.message),
      None => f.write_str(&self.message),
    }
  }
}

impl std::error::Error for TypingError {}

/// The category of an [`InjectionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InjectionErrorKind {
  /// The requested type has no registration.
  NotRegistered,
  /// The registered lifetime cannot be served from the calling context.
  WrongLifetime,
  /// Leftover positional or named arguments after binding.
  ArityMismatch,
  /// The concrete class does not extend the declared super class.
  SuperClassMismatch,
  /// A lazy hook was read before its owner finished construction.
  UnresolvedHook,
  /// A resolution chain came back to one of its own frames.
  CircularDependency,
  /// The callable declares parameters the container cannot bind.
  InvalidSignature,
  /// A parameter has neither an annotation nor a default value.
  MissingAnnotation,
  /// A parameter is annotated with a union of several types.
  UnsupportedUnion,
  /// A bound argument is missing or does not hold the requested type.
  ArgumentType,
  /// A registration request is inconsistent.
  InvalidRegistration,
  /// A lazy proxy outlived the injector it was bound to.
  InjectorDropped,
}

/// A failure while registering, resolving or instantiating a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionError {
  kind: InjectionErrorKind,
  message: String,
  context: ErrorContext,
}

impl InjectionError {
  pub fn new(kind: InjectionErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
      context: ErrorContext::default(),
    }
  }

  pub fn with_context(mut self, context: ErrorContext) -> Self {
    self.context = context;
    self
  }

  pub fn in_class(mut self, class: impl Into<String>) -> Self {
    self.context.class = Some(class.into());
    self
  }

  pub fn kind(&self) -> InjectionErrorKind {
    self.kind
  }

  pub fn message(&self) -> &str {
    &self.message
  }

  pub fn context(&self) -> &ErrorContext {
    &self.context
  }
}

impl fmt::Display for InjectionError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.context.is_empty() {
      f.write_str(&self.message)
    } else {
      write!(f, "{}, {}", self.context, self.message)
    }
  }
}

impl std::error::Error for InjectionError {}

/// The main error type for the `fibre_inject` library.
#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Typing(#[from] TypingError),

  #[error(transparent)]
  Injection(#[from] InjectionError),

  #[error("Failed to read configuration file: {0}")]
  ConfigRead(#[from] std::io::Error),

  #[error("Failed to parse configuration: {0}")]
  ConfigParse(String),
}

impl Error {
  pub fn as_injection(&self) -> Option<&InjectionError> {
    match self {
      Error::Injection(err) => Some(err),
      _ => None,
    }
  }

  pub fn as_typing(&self) -> Option<&TypingError> {
    match self {
      Error::Typing(err) => Some(err),
      _ => None,
    }
  }

  /// The injection error category, if this is an injection error.
  pub fn injection_kind(&self) -> Option<InjectionErrorKind> {
    self.as_injection().map(InjectionError::kind)
  }
}

/// A specialized `Result` type for `fibre_inject` operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
