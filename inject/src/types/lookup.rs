use super::{Class, TypeArg, TypeExpr, TypeToken, TypeVar};
use crate::error::TypingError;
use std::collections::HashMap;

/// Maps the formal generic parameters of a class, and of its generic bases,
/// to the arguments carried by a concrete [`TypeToken`].
#[derive(Clone, Debug)]
pub struct TypeVarLookup {
  token: TypeToken,
  vars: HashMap<TypeVar, TypeArg>,
}

impl TypeVarLookup {
  pub fn new(token: &TypeToken) -> Self {
    let mut vars = HashMap::new();
    collect(token.class(), token.args(), &mut vars);
    Self {
      token: token.clone(),
      vars,
    }
  }

  /// The token this lookup was built from.
  pub fn token(&self) -> &TypeToken {
    &self.token
  }

  pub fn get(&self, var: &TypeVar) -> Result<&TypeArg, TypingError> {
    self.vars.get(var).ok_or_else(|| {
      TypingError::new(format!("TypeVar {} could not be found in lookup", var))
        .in_class(self.token.class().name())
    })
  }

  pub fn contains(&self, var: &TypeVar) -> bool {
    self.vars.contains_key(var)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&TypeVar, &TypeArg)> {
    self.vars.iter()
  }

  pub fn len(&self) -> usize {
    self.vars.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vars.is_empty()
  }
}

// Walks the base chain first so the class's own parameters take precedence
// over equally named parameters of its bases.
fn collect(class: &Class, args: &[TypeArg], vars: &mut HashMap<TypeVar, TypeArg>) {
  let own: HashMap<TypeVar, TypeArg> = class
    .params()
    .iter()
    .copied()
    .zip(args.iter().cloned())
    .collect();
  let scope = Scope(&own);

  for base in class.bases() {
    if base.args().is_empty() {
      continue;
    }
    let base_args: Vec<TypeArg> = base
      .args()
      .iter()
      .map(|expr| scope.substitute(expr))
      .collect();
    collect(&base.class(), &base_args, vars);
  }

  vars.extend(own);
}

struct Scope<'a>(&'a HashMap<TypeVar, TypeArg>);

impl Scope<'_> {
  fn substitute(&self, expr: &TypeExpr) -> TypeArg {
    match expr {
      TypeExpr::Var(var) => self.0.get(var).cloned().unwrap_or(TypeArg::Var(*var)),
      TypeExpr::Class { class, args } => {
        let class = class.load();
        let args: Vec<TypeArg> = args.iter().map(|arg| self.substitute(arg)).collect();
        match TypeToken::create(class.clone(), args, true) {
          Ok(token) => TypeArg::Type(token),
          Err(_) => TypeArg::Type(TypeToken::unbound_class(class)),
        }
      }
      _ => TypeArg::Any,
    }
  }
}
