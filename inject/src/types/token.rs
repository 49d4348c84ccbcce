use super::{Class, ClassBuilder, Injectable, TypeExpr, TypeVar, TypeVarLookup};
use crate::error::TypingError;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// One generic argument of a [`TypeToken`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum TypeArg {
  Type(TypeToken),
  Var(TypeVar),
  Any,
}

impl TypeArg {
  pub fn as_token(&self) -> Option<&TypeToken> {
    match self {
      TypeArg::Type(token) => Some(token),
      _ => None,
    }
  }

  pub fn is_concrete(&self) -> bool {
    match self {
      TypeArg::Type(token) => token.is_concrete(),
      _ => false,
    }
  }
}

impl From<TypeToken> for TypeArg {
  fn from(token: TypeToken) -> Self {
    TypeArg::Type(token)
  }
}

impl fmt::Display for TypeArg {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TypeArg::Type(token) => fmt::Display::fmt(token, f),
      TypeArg::Var(var) => fmt::Display::fmt(var, f),
      TypeArg::Any => f.write_str("Any"),
    }
  }
}

impl fmt::Debug for TypeArg {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(self, f)
  }
}

struct TokenInner {
  class: Class,
  args: Vec<TypeArg>,
}

/// A class together with its generic arguments.
///
/// Tokens compare and hash structurally, so two tokens built separately for
/// `Repository[User]` are the same registry and cache key.
#[derive(Clone)]
pub struct TypeToken(Arc<TokenInner>);

impl TypeToken {
  /// The token of a non-generic injectable class.
  ///
  /// Fails when `T` declares generic parameters; use [`TypeToken::generic`]
  /// or [`TypeToken::unbound`] for those.
  pub fn of<T: ?Sized + Injectable>() -> Result<Self, TypingError> {
    Self::create(Class::of::<T>(), Vec::new(), false)
  }

  /// The token of a plain Rust type that carries no class description.
  pub fn plain<T: ?Sized + std::any::Any + Send + Sync>() -> Self {
    Self::from_parts(Class::plain::<T>(), Vec::new())
  }

  pub fn generic<T: ?Sized + Injectable>(
    args: impl IntoIterator<Item = TypeToken>,
  ) -> Result<Self, TypingError> {
    Self::create(
      Class::of::<T>(),
      args.into_iter().map(TypeArg::Type).collect(),
      false,
    )
  }

  /// The token of `T` with every generic parameter bound to `Any`, used to
  /// declare match-all registrations.
  pub fn unbound<T: ?Sized + Injectable>() -> Self {
    Self::unbound_class(Class::of::<T>())
  }

  pub fn unbound_class(class: Class) -> Self {
    let args = vec![TypeArg::Any; class.params().len()];
    Self::from_parts(class, args)
  }

  /// Builds a token from explicit arguments; their number must match the
  /// class's generic parameters.
  pub fn new(class: Class, args: Vec<TypeArg>) -> Result<Self, TypingError> {
    Self::create(class, args, false)
  }

  pub(crate) fn create(
    class: Class,
    args: Vec<TypeArg>,
    unbound: bool,
  ) -> Result<Self, TypingError> {
    let expected = class.params().len();
    if args.len() == expected {
      return Ok(Self::from_parts(class, args));
    }
    if args.is_empty() && unbound {
      return Ok(Self::unbound_class(class));
    }
    let message = if args.is_empty() {
      format!("Generic class requires {} generic arguments, none were given", expected)
    } else {
      format!(
        "Expected {} generic arguments, {} were given",
        expected,
        args.len()
      )
    };
    Err(TypingError::new(message).in_class(class.name()))
  }

  /// Resolves a class annotation and its nested arguments against a lookup.
  pub(crate) fn resolve(
    class: Class,
    args: &[TypeExpr],
    lookup: Option<&TypeVarLookup>,
    tolerate_vars: bool,
  ) -> Result<Self, TypingError> {
    let resolved = args
      .iter()
      .map(|arg| arg.resolve_within(lookup, tolerate_vars, Some(&class)))
      .collect::<Result<Vec<_>, _>>()?;
    Self::create(class, resolved, tolerate_vars)
  }

  fn from_parts(class: Class, args: Vec<TypeArg>) -> Self {
    Self(Arc::new(TokenInner { class, args }))
  }

  pub fn class(&self) -> &Class {
    &self.0.class
  }

  pub fn args(&self) -> &[TypeArg] {
    &self.0.args
  }

  pub fn arg(&self, index: usize) -> Option<&TypeArg> {
    self.0.args.get(index)
  }

  pub fn is_generic(&self) -> bool {
    !self.0.args.is_empty()
  }

  pub fn is<T: ?Sized + 'static>(&self) -> bool {
    self.0.class.is::<T>()
  }

  /// True when no argument, at any depth, is a type variable or `Any`.
  pub fn is_concrete(&self) -> bool {
    self.0.args.iter().all(TypeArg::is_concrete)
  }

  /// The token of `ancestor` as seen from this token, with generic
  /// arguments carried through the base declarations. `None` when
  /// `ancestor` is not a base of this class.
  pub fn ancestor(
    &self,
    ancestor: &Class,
    tolerate_vars: bool,
  ) -> Result<Option<TypeToken>, TypingError> {
    if self.class() == ancestor {
      return Ok(Some(self.clone()));
    }
    let lookup = TypeVarLookup::new(self);
    for base in self.class().bases() {
      let base_class = base.class();
      if !base_class.is_subclass_of(ancestor) {
        continue;
      }
      let base_token = Self::resolve(base_class, base.args(), Some(&lookup), tolerate_vars)?;
      return base_token.ancestor(ancestor, tolerate_vars);
    }
    Ok(None)
  }
}

impl PartialEq for TypeToken {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.0, &other.0)
      || (self.0.class == other.0.class && self.0.args == other.0.args)
  }
}

impl Eq for TypeToken {}

impl Hash for TypeToken {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.0.class.hash(state);
    self.0.args.hash(state);
  }
}

impl fmt::Display for TypeToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.0.class.name())?;
    if !self.0.args.is_empty() {
      let args: Vec<String> = self.0.args.iter().map(ToString::to_string).collect();
      write!(f, "[{}]", args.join(", "))?;
    }
    Ok(())
  }
}

impl fmt::Debug for TypeToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "<Type {}>", self)
  }
}

// Parameters annotated with `TypeExpr::type_of(..)` receive the resolved
// token of their argument instead of an instance.
impl Injectable for TypeToken {
  fn describe() -> ClassBuilder<Self> {
    ClassBuilder::new().named("TypeToken").type_params(["T"])
  }
}
