use super::{Class, ClassRef, Injectable, TypeArg, TypeToken, TypeVarLookup};
use crate::error::TypingError;
use std::any::Any;
use std::fmt;

/// A formal generic parameter, compared by name.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeVar(&'static str);

impl TypeVar {
  pub const fn new(name: &'static str) -> Self {
    Self(name)
  }

  pub fn name(&self) -> &'static str {
    self.0
  }
}

impl fmt::Display for TypeVar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "~{}", self.0)
  }
}

impl fmt::Debug for TypeVar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(self, f)
  }
}

/// A declared type as written in a signature or a base-class list.
///
/// Expressions may mention the generic parameters of the surrounding class;
/// they become [`TypeToken`]s once resolved against a [`TypeVarLookup`].
#[derive(Clone, PartialEq)]
pub enum TypeExpr {
  Class { class: ClassRef, args: Vec<TypeExpr> },
  Var(TypeVar),
  Union(Vec<TypeExpr>),
  None,
  Any,
}

impl TypeExpr {
  pub fn of<T: ?Sized + Injectable>() -> Self {
    Self::generic::<T>(Vec::new())
  }

  pub fn plain<T: ?Sized + Any + Send + Sync>() -> Self {
    TypeExpr::Class {
      class: ClassRef::plain::<T>(),
      args: Vec::new(),
    }
  }

  pub fn generic<T: ?Sized + Injectable>(args: impl IntoIterator<Item = TypeExpr>) -> Self {
    TypeExpr::Class {
      class: ClassRef::of::<T>(),
      args: args.into_iter().collect(),
    }
  }

  pub fn var(name: &'static str) -> Self {
    TypeExpr::Var(TypeVar::new(name))
  }

  /// `inner` or nothing.
  pub fn optional(inner: TypeExpr) -> Self {
    TypeExpr::Union(vec![inner, TypeExpr::None])
  }

  /// A parameter of this type receives the resolved token of `inner`
  /// rather than an instance.
  pub fn type_of(inner: TypeExpr) -> Self {
    Self::generic::<TypeToken>([inner])
  }

  /// The non-null members of a (possibly nested) union, and whether the
  /// union admits nothing.
  pub(crate) fn non_null_members(&self) -> (Vec<&TypeExpr>, bool) {
    let mut members = Vec::new();
    let mut nullable = false;
    self.collect_members(&mut members, &mut nullable);
    (members, nullable)
  }

  fn collect_members<'a>(&'a self, members: &mut Vec<&'a TypeExpr>, nullable: &mut bool) {
    match self {
      TypeExpr::Union(items) => {
        for item in items {
          item.collect_members(members, nullable);
        }
      }
      TypeExpr::None => *nullable = true,
      other => members.push(other),
    }
  }

  /// Resolves this expression to a concrete token.
  pub fn resolve(&self, lookup: Option<&TypeVarLookup>) -> Result<TypeToken, TypingError> {
    match self.resolve_within(lookup, false, None)? {
      TypeArg::Type(token) => Ok(token),
      TypeArg::Var(var) => Err(TypingError::new(format!(
        "Generic parameter {} cannot be a TypeVar",
        var
      ))),
      TypeArg::Any => Err(TypingError::new("Any cannot be used as a concrete type")),
    }
  }

  /// Substitutes type variables from `lookup`. Variables missing from the
  /// lookup are kept as-is only when `tolerate_vars` is set.
  pub fn substitute(
    &self,
    lookup: Option<&TypeVarLookup>,
    tolerate_vars: bool,
  ) -> Result<TypeArg, TypingError> {
    self.resolve_within(lookup, tolerate_vars, None)
  }

  pub(crate) fn resolve_within(
    &self,
    lookup: Option<&TypeVarLookup>,
    tolerate_vars: bool,
    owner: Option<&Class>,
  ) -> Result<TypeArg, TypingError> {
    let fail = |message: String| {
      let err = TypingError::new(message);
      match owner {
        Some(class) => err.in_class(class.name()),
        None => err,
      }
    };

    match self {
      TypeExpr::Class { class, args } => Ok(TypeArg::Type(TypeToken::resolve(
        class.load(),
        args,
        lookup,
        tolerate_vars,
      )?)),
      TypeExpr::Var(var) => match lookup {
        Some(lookup) if lookup.contains(var) => lookup.get(var).cloned(),
        _ if tolerate_vars => Ok(TypeArg::Var(*var)),
        Some(_) => Err(fail(format!("TypeVar {} could not be found in lookup", var))),
        None => Err(fail(format!("Generic parameter {} cannot be a TypeVar", var))),
      },
      TypeExpr::Any => Ok(TypeArg::Any),
      TypeExpr::None | TypeExpr::Union(_) => Err(fail(format!(
        "{} cannot be used as a generic argument",
        self
      ))),
    }
  }
}

impl fmt::Display for TypeExpr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TypeExpr::Class { class, args } => {
        f.write_str(class.load().name())?;
        if !args.is_empty() {
          let args: Vec<String> = args.iter().map(ToString::to_string).collect();
          write!(f, "[{}]", args.join(", "))?;
        }
        Ok(())
      }
      TypeExpr::Var(var) => fmt::Display::fmt(var, f),
      TypeExpr::Union(items) => {
        let items: Vec<String> = items.iter().map(ToString::to_string).collect();
        f.write_str(&items.join(" | "))
      }
      TypeExpr::None => f.write_str("None"),
      TypeExpr::Any => f.write_str("Any"),
    }
  }
}

impl fmt::Debug for TypeExpr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(self, f)
  }
}
