//! Runtime type descriptors: classes, type tokens, generic lookups and
//! callable signatures.

mod class;
mod expr;
mod function;
mod lookup;
mod token;

pub use class::{BaseClass, Class, ClassBuilder, ClassInfo, ClassRef, Injectable};
pub use expr::{TypeExpr, TypeVar};
pub use function::{Caller, Function, Parameter, ParameterKind, Signature, RECEIVER};
pub use lookup::TypeVarLookup;
pub use token::{TypeArg, TypeToken};
