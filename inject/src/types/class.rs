use super::{Function, Signature, TypeArg, TypeExpr, TypeToken, TypeVar};
use crate::arguments::Arguments;
use crate::core::Instance;
use crate::error::Result;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

/// A type the container knows how to describe.
///
/// Implemented by concrete services and by the `dyn Trait` interfaces they
/// are registered under. The description is built once per type and cached.
///
/// ```
/// use fibre_inject::{ClassBuilder, Injectable, Signature};
///
/// struct Clock;
///
/// impl Injectable for Clock {
///   fn describe() -> ClassBuilder<Self> {
///     ClassBuilder::new().constructor(Signature::new(), |_| Ok(Clock))
///   }
/// }
/// ```
pub trait Injectable: Send + Sync + 'static {
  fn describe() -> ClassBuilder<Self>;
}

struct CachedClass {
  class: Class,
  described: bool,
}

static CLASSES: Lazy<DashMap<TypeId, CachedClass>> = Lazy::new(DashMap::new);

type Upcast = Arc<dyn Fn(&Instance) -> Option<Instance> + Send + Sync>;

/// A declared superclass or implemented interface.
#[derive(Clone)]
pub struct BaseClass {
  class: ClassRef,
  args: Vec<TypeExpr>,
  upcast: Upcast,
}

impl BaseClass {
  pub fn class(&self) -> Class {
    self.class.load()
  }

  pub fn class_ref(&self) -> ClassRef {
    self.class
  }

  /// The base's generic arguments, written over the subclass's parameters.
  pub fn args(&self) -> &[TypeExpr] {
    &self.args
  }

  /// Converts an instance of the subclass into an instance of this base.
  pub fn upcast(&self, instance: &Instance) -> Option<Instance> {
    (self.upcast)(instance)
  }
}

impl fmt::Debug for BaseClass {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BaseClass")
      .field("class", &self.class)
      .field("args", &self.args)
      .finish()
  }
}

/// The immutable description of one Rust type.
pub struct ClassInfo {
  id: TypeId,
  name: String,
  rust_name: &'static str,
  params: Vec<TypeVar>,
  bases: Vec<BaseClass>,
  constructor: Option<Function<Instance>>,
  init_methods: Vec<Function<()>>,
}

impl ClassInfo {
  pub fn id(&self) -> TypeId {
    self.id
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// The full Rust path of the described type.
  pub fn rust_name(&self) -> &'static str {
    self.rust_name
  }

  pub fn params(&self) -> &[TypeVar] {
    &self.params
  }

  pub fn is_generic(&self) -> bool {
    !self.params.is_empty()
  }

  pub fn bases(&self) -> &[BaseClass] {
    &self.bases
  }

  pub fn constructor(&self) -> Option<&Function<Instance>> {
    self.constructor.as_ref()
  }

  pub fn init_methods(&self) -> &[Function<()>] {
    &self.init_methods
  }

  /// True when `other` is this class or one of its transitive bases.
  pub fn is_subclass_of(&self, other: &ClassInfo) -> bool {
    self.id == other.id || self.bases.iter().any(|b| b.class().is_subclass_of(other))
  }

  /// Re-wraps an instance of this class as an instance of `target`,
  /// following the upcasts declared along the base chain.
  pub fn cast_to(&self, instance: &Instance, target: &ClassInfo) -> Option<Instance> {
    if self.id == target.id {
      return Some(instance.clone());
    }
    self.bases.iter().find_map(|base| {
      let base_class = base.class();
      if !base_class.is_subclass_of(target) {
        return None;
      }
      base
        .upcast(instance)
        .and_then(|upcast| base_class.cast_to(&upcast, target))
    })
  }

  /// Infers this class's generic arguments from a token requested for one of
  /// its bases, direct or transitive. Parameters that cannot be inferred are
  /// `Any`.
  pub fn infer_args_from(&self, requested: &TypeToken) -> Vec<TypeArg> {
    let mut found = HashMap::new();
    for base in &self.bases {
      if base.class.type_id() == requested.class().id() {
        for (expr, arg) in base.args.iter().zip(requested.args()) {
          unify(expr, arg, &mut found);
        }
        continue;
      }
      let base_class = base.class();
      if base_class.is_subclass_of(requested.class()) {
        let inferred = base_class.infer_args_from(requested);
        for (expr, arg) in base.args.iter().zip(&inferred) {
          unify(expr, arg, &mut found);
        }
      }
    }
    self
      .params
      .iter()
      .map(|param| found.remove(param).unwrap_or(TypeArg::Any))
      .collect()
  }
}

fn unify(expr: &TypeExpr, arg: &TypeArg, found: &mut HashMap<TypeVar, TypeArg>) {
  match (expr, arg) {
    (_, TypeArg::Any) => {}
    (TypeExpr::Var(var), arg) => {
      found.entry(*var).or_insert_with(|| arg.clone());
    }
    (TypeExpr::Class { class, args }, TypeArg::Type(token))
      if class.type_id() == token.class().id() =>
    {
      for (expr, arg) in args.iter().zip(token.args()) {
        unify(expr, arg, found);
      }
    }
    _ => {}
  }
}

/// A shared handle to a cached [`ClassInfo`]. Equality and hashing follow
/// the described Rust type.
#[derive(Clone)]
pub struct Class(Arc<ClassInfo>);

impl Class {
  pub fn of<T: ?Sized + Injectable>() -> Self {
    let id = TypeId::of::<T>();
    if let Some(cached) = CLASSES.get(&id) {
      if cached.described {
        return cached.class.clone();
      }
    }

    let class = Class(Arc::new(T::describe().build()));
    let mut cached = CLASSES.entry(id).or_insert_with(|| CachedClass {
      class: class.clone(),
      described: true,
    });
    if !cached.described {
      *cached = CachedClass {
        class,
        described: true,
      };
    }
    cached.class.clone()
  }

  /// The descriptor of a type without an [`Injectable`] implementation:
  /// no parameters, no bases, no constructor.
  pub fn plain<T: ?Sized + Any + Send + Sync>() -> Self {
    let id = TypeId::of::<T>();
    if let Some(cached) = CLASSES.get(&id) {
      return cached.class.clone();
    }
    CLASSES
      .entry(id)
      .or_insert_with(|| CachedClass {
        class: Class(Arc::new(ClassBuilder::<T>::new().build())),
        described: false,
      })
      .class
      .clone()
  }

  pub fn is<T: ?Sized + 'static>(&self) -> bool {
    self.0.id == TypeId::of::<T>()
  }
}

impl Deref for Class {
  type Target = ClassInfo;

  fn deref(&self) -> &ClassInfo {
    &self.0
  }
}

impl PartialEq for Class {
  fn eq(&self, other: &Self) -> bool {
    self.0.id == other.0.id
  }
}

impl Eq for Class {}

impl Hash for Class {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.0.id.hash(state);
  }
}

impl fmt::Display for Class {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0.name)
  }
}

impl fmt::Debug for Class {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "<Class {}>", self.0.name)
  }
}

/// A lazy reference to a class, used inside annotations so that classes
/// may mention each other without describing each other eagerly.
#[derive(Clone, Copy)]
pub struct ClassRef {
  type_id: fn() -> TypeId,
  load: fn() -> Class,
}

impl ClassRef {
  pub fn of<T: ?Sized + Injectable>() -> Self {
    Self {
      type_id: TypeId::of::<T>,
      load: Class::of::<T>,
    }
  }

  pub fn plain<T: ?Sized + Any + Send + Sync>() -> Self {
    Self {
      type_id: TypeId::of::<T>,
      load: Class::plain::<T>,
    }
  }

  pub fn type_id(&self) -> TypeId {
    (self.type_id)()
  }

  pub fn load(&self) -> Class {
    (self.load)()
  }
}

impl PartialEq for ClassRef {
  fn eq(&self, other: &Self) -> bool {
    self.type_id() == other.type_id()
  }
}

impl Eq for ClassRef {}

impl fmt::Debug for ClassRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(&self.load(), f)
  }
}

type ConstructorBody = Arc<dyn Fn(&mut Arguments) -> Result<Instance> + Send + Sync>;

/// Builds the [`ClassInfo`] of `T`.
pub struct ClassBuilder<T: ?Sized> {
  name: String,
  params: Vec<TypeVar>,
  bases: Vec<BaseClass>,
  constructor: Option<(Signature, ConstructorBody)>,
  init_methods: Vec<Function<()>>,
  _marker: PhantomData<fn(&T)>,
}

impl<T: ?Sized + Any + Send + Sync> ClassBuilder<T> {
  pub fn new() -> Self {
    Self {
      name: short_type_name(type_name::<T>()),
      params: Vec::new(),
      bases: Vec::new(),
      constructor: None,
      init_methods: Vec::new(),
      _marker: PhantomData,
    }
  }

  /// Overrides the display name derived from the Rust type name.
  pub fn named(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  /// Declares the formal generic parameters, in order.
  pub fn type_params(mut self, names: impl IntoIterator<Item = &'static str>) -> Self {
    self.params = names.into_iter().map(TypeVar::new).collect();
    self
  }

  /// Declares a generic base. `args` are written over this class's own
  /// parameters, e.g. `[TypeExpr::var("T")]`.
  pub fn extends<B: ?Sized + Injectable>(
    mut self,
    args: impl IntoIterator<Item = TypeExpr>,
    upcast: impl Fn(Arc<T>) -> Arc<B> + Send + Sync + 'static,
  ) -> Self {
    self.bases.push(BaseClass {
      class: ClassRef::of::<B>(),
      args: args.into_iter().collect(),
      upcast: Arc::new(move |instance: &Instance| {
        instance
          .downcast::<T>()
          .map(|it| Instance::from_arc(upcast(it)))
      }),
    });
    self
  }

  /// Declares a non-generic base or interface.
  pub fn implements<B: ?Sized + Injectable>(
    self,
    upcast: impl Fn(Arc<T>) -> Arc<B> + Send + Sync + 'static,
  ) -> Self {
    self.extends(Vec::new(), upcast)
  }

  /// Adds a post-construct initializer. Its parameters are resolved
  /// immediately, after the instance and its lazy fields exist.
  pub fn init_method(
    mut self,
    name: &str,
    signature: Signature,
    body: impl Fn(&T, &mut Arguments) -> Result<()> + Send + Sync + 'static,
  ) -> Self {
    self
      .init_methods
      .push(Function::method::<T>(name, signature, body));
    self
  }

  pub fn build(self) -> ClassInfo {
    let name = self.name;
    let constructor = self.constructor.map(|(signature, body)| {
      Function::new(format!("{}::new", name), signature, move |args| body(args))
    });
    let init_methods = self
      .init_methods
      .into_iter()
      .map(|method| {
        let qualified = format!("{}.{}", name, method.name());
        method.renamed(qualified)
      })
      .collect();

    ClassInfo {
      id: TypeId::of::<T>(),
      name,
      rust_name: type_name::<T>(),
      params: self.params,
      bases: self.bases,
      constructor,
      init_methods,
    }
  }
}

impl<T: Any + Send + Sync> ClassBuilder<T> {
  /// Sets the canonical constructor.
  pub fn constructor(
    mut self,
    signature: Signature,
    build: impl Fn(&mut Arguments) -> Result<T> + Send + Sync + 'static,
  ) -> Self {
    let body: ConstructorBody = Arc::new(move |args: &mut Arguments| build(args).map(Instance::new));
    self.constructor = Some((signature, body));
    self
  }
}

impl<T: ?Sized + Any + Send + Sync> Default for ClassBuilder<T> {
  fn default() -> Self {
    Self::new()
  }
}

/// `alloc::sync::Arc<dyn my_app::Repo>` -> `Arc<Repo>`
pub(crate) fn short_type_name(full: &str) -> String {
  let mut out = String::with_capacity(full.len());
  let mut segment = String::new();
  for ch in full.chars() {
    match ch {
      ':' => segment.clear(),
      c if c.is_alphanumeric() || c == '_' => segment.push(c),
      c => {
        if segment != "dyn" {
          out.push_str(&segment);
          out.push(c);
        }
        segment.clear();
      }
    }
  }
  out.push_str(&segment);
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  trait Animal: Send + Sync {
    fn noise(&self) -> &'static str;
  }
  impl Injectable for dyn Animal {
    fn describe() -> ClassBuilder<Self> {
      ClassBuilder::new()
    }
  }

  struct Dog;
  impl Animal for Dog {
    fn noise(&self) -> &'static str {
      "woof"
    }
  }
  impl Injectable for Dog {
    fn describe() -> ClassBuilder<Self> {
      ClassBuilder::new()
        .implements::<dyn Animal>(|dog| dog as Arc<dyn Animal>)
        .constructor(Signature::new(), |_| Ok(Dog))
    }
  }

  #[test]
  fn short_names_strip_paths() {
    assert_eq!(short_type_name("alloc::string::String"), "String");
    assert_eq!(short_type_name("dyn app::Repo"), "Repo");
    assert_eq!(
      short_type_name("alloc::vec::Vec<alloc::string::String>"),
      "Vec<String>"
    );
  }

  #[test]
  fn classes_are_cached_per_type() {
    let a = Class::of::<Dog>();
    let b = Class::of::<Dog>();
    assert!(Arc::ptr_eq(&a.0, &b.0));
    assert_eq!(a.name(), "Dog");
    assert_eq!(Class::of::<dyn Animal>().name(), "Animal");
    assert!(a.constructor().is_some());
  }

  #[test]
  fn instances_cast_along_bases() {
    let dog = Class::of::<Dog>();
    let animal = Class::of::<dyn Animal>();
    assert!(dog.is_subclass_of(&animal));
    assert!(!animal.is_subclass_of(&dog));

    let cast = dog.cast_to(&Instance::new(Dog), &animal).unwrap();
    assert_eq!(cast.downcast::<dyn Animal>().unwrap().noise(), "woof");
  }
}
