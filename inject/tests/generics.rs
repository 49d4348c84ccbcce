use fibre_inject::{
  AddOptions, CallOptions, Class, ClassBuilder, Function, Injectable, InjectableOptions,
  InjectionErrorKind, Injector, Parameter, Registry, Signature, TypeArg, TypeExpr, TypeToken,
  TypeVarLookup,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

// --- Test Fixtures ---

struct User;
impl Injectable for User {
  fn describe() -> ClassBuilder<Self> {
    ClassBuilder::new()
  }
}

struct Order;
impl Injectable for Order {
  fn describe() -> ClassBuilder<Self> {
    ClassBuilder::new()
  }
}

trait Repository: Send + Sync {
  fn entity(&self) -> &str;
}

impl std::fmt::Debug for dyn Repository {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("Repository")
  }
}

impl Injectable for dyn Repository {
  fn describe() -> ClassBuilder<Self> {
    ClassBuilder::new().type_params(["T"])
  }
}

// Knows which entity it serves from the generic argument it was built for.
#[derive(Debug)]
struct SqlRepository {
  entity: String,
}

impl Repository for SqlRepository {
  fn entity(&self) -> &str {
    &self.entity
  }
}

impl Injectable for SqlRepository {
  fn describe() -> ClassBuilder<Self> {
    ClassBuilder::new()
      .type_params(["T"])
      .extends::<dyn Repository>([TypeExpr::var("T")], |it| it as Arc<dyn Repository>)
      .constructor(Signature::new(), |args| {
        let entity = args
          .type_args()
          .first()
          .map(ToString::to_string)
          .unwrap_or_default();
        Ok(SqlRepository { entity })
      })
  }
}

struct Controller {
  repository: Arc<dyn Repository>,
  served: TypeToken,
}

impl Injectable for Controller {
  fn describe() -> ClassBuilder<Self> {
    ClassBuilder::new()
      .type_params(["E"])
      .constructor(
        Signature::new()
          .param(Parameter::typed(
            "repository",
            TypeExpr::generic::<dyn Repository>([TypeExpr::var("E")]),
          ))
          .param(Parameter::typed("served", TypeExpr::type_of(TypeExpr::var("E")))),
        |args| {
          Ok(Controller {
            repository: args.take("repository")?,
            served: args.cloned("served")?,
          })
        },
      )
  }
}

// A repository interface layered over `Repository`.
trait CachedRepository: Repository {
  fn into_repository(self: Arc<Self>) -> Arc<dyn Repository>;
}

impl Injectable for dyn CachedRepository {
  fn describe() -> ClassBuilder<Self> {
    ClassBuilder::new()
      .type_params(["T"])
      .extends::<dyn Repository>([TypeExpr::var("T")], |it: Arc<Self>| it.into_repository())
  }
}

// Reaches `Repository` only through `CachedRepository`.
struct CachingSqlRepository {
  served: TypeToken,
}

impl Repository for CachingSqlRepository {
  fn entity(&self) -> &str {
    self.served.class().name()
  }
}

impl CachedRepository for CachingSqlRepository {
  fn into_repository(self: Arc<Self>) -> Arc<dyn Repository> {
    self
  }
}

impl Injectable for CachingSqlRepository {
  fn describe() -> ClassBuilder<Self> {
    ClassBuilder::new()
      .type_params(["T"])
      .extends::<dyn CachedRepository>([TypeExpr::var("T")], |it| it as Arc<dyn CachedRepository>)
      .constructor(
        Signature::new().param(Parameter::typed("served", TypeExpr::type_of(TypeExpr::var("T")))),
        |args| {
          Ok(CachingSqlRepository {
            served: args.cloned("served")?,
          })
        },
      )
  }
}

fn token<T: Injectable>() -> TypeToken {
  TypeToken::of::<T>().unwrap()
}

// --- Generic Tests ---

#[test]
fn test_generic_registrations_are_argument_sensitive() {
  let injector = Injector::new(Registry::new()).unwrap();
  injector
    .add::<SqlRepository>(AddOptions::singleton().type_args([token::<User>()]))
    .unwrap();
  injector
    .add::<SqlRepository>(AddOptions::singleton().type_args([token::<Order>()]))
    .unwrap();

  let users = injector.require_generic::<SqlRepository>([token::<User>()]).unwrap();
  let orders = injector.require_generic::<SqlRepository>([token::<Order>()]).unwrap();

  assert_eq!(users.entity(), "User");
  assert_eq!(orders.entity(), "Order");
  assert!(!Arc::ptr_eq(&users, &orders));
  assert!(Arc::ptr_eq(
    &users,
    &injector.require_generic::<SqlRepository>([token::<User>()]).unwrap()
  ));
}

#[test]
fn test_unregistered_instantiation_is_not_served() {
  let injector = Injector::new(Registry::new()).unwrap();
  injector
    .add::<SqlRepository>(AddOptions::singleton().type_args([token::<User>()]))
    .unwrap();

  let err = injector
    .require_generic::<SqlRepository>([token::<Order>()])
    .unwrap_err();

  assert_eq!(err.injection_kind(), Some(InjectionErrorKind::NotRegistered));
}

#[test]
fn test_match_all_serves_any_instantiation() {
  let injector = Injector::new(Registry::new()).unwrap();
  injector
    .add::<SqlRepository>(AddOptions::singleton().match_all())
    .unwrap();

  let orders = injector.require_generic::<SqlRepository>([token::<Order>()]).unwrap();
  let users = injector.require_generic::<SqlRepository>([token::<User>()]).unwrap();

  assert_eq!(orders.entity(), "Order");
  assert_eq!(users.entity(), "User");
  // One singleton per requested instantiation.
  assert!(!Arc::ptr_eq(&orders, &users));
  assert!(Arc::ptr_eq(
    &orders,
    &injector.require_generic::<SqlRepository>([token::<Order>()]).unwrap()
  ));
}

#[test]
fn test_exact_registration_takes_precedence_over_match_all() {
  let injector = Injector::new(Registry::new()).unwrap();
  injector
    .add::<SqlRepository>(AddOptions::transient().match_all())
    .unwrap();
  injector
    .add::<SqlRepository>(AddOptions::singleton().type_args([token::<User>()]))
    .unwrap();

  let a = injector.require_generic::<SqlRepository>([token::<User>()]).unwrap();
  let b = injector.require_generic::<SqlRepository>([token::<User>()]).unwrap();
  let c = injector.require_generic::<SqlRepository>([token::<Order>()]).unwrap();
  let d = injector.require_generic::<SqlRepository>([token::<Order>()]).unwrap();

  assert!(Arc::ptr_eq(&a, &b));
  assert!(!Arc::ptr_eq(&c, &d));
}

#[test]
fn test_match_all_under_generic_interface() {
  let mut registry = Registry::new();
  registry.injectable_as::<dyn Repository, SqlRepository>(InjectableOptions::singleton().match_all());
  let injector = Injector::new(registry).unwrap();

  let users = injector.require_generic::<dyn Repository>([token::<User>()]).unwrap();

  assert_eq!(users.entity(), "User");
}

#[test]
fn test_generic_arguments_flow_into_dependencies() {
  let injector = Injector::new(Registry::new()).unwrap();
  injector
    .add::<SqlRepository>(
      AddOptions::singleton()
        .super_class::<dyn Repository>()
        .match_all(),
    )
    .unwrap();
  injector
    .add::<Controller>(AddOptions::transient().match_all())
    .unwrap();

  let controller = injector.require_generic::<Controller>([token::<Order>()]).unwrap();

  assert_eq!(controller.repository.entity(), "Order");
  assert_eq!(controller.served, token::<Order>());
}

#[test]
fn test_generic_arity_is_validated() {
  let injector = Injector::new(Registry::new()).unwrap();

  let err = injector
    .add::<SqlRepository>(AddOptions::singleton())
    .unwrap_err();
  assert_eq!(err.injection_kind(), Some(InjectionErrorKind::InvalidRegistration));
  assert_eq!(
    err.to_string(),
    "Type SqlRepository requires 1 generic parameters and 0 were given"
  );

  let err = injector
    .add::<User>(AddOptions::singleton().type_args([token::<Order>()]))
    .unwrap_err();
  assert_eq!(
    err.to_string(),
    "Type User requires 0 generic parameters and 1 were given"
  );
}

#[test]
fn test_requiring_a_generic_without_arguments_is_a_typing_error() {
  let injector = Injector::new(Registry::new()).unwrap();

  let err = injector.require::<dyn Repository>().unwrap_err();

  let typing = err.as_typing().unwrap();
  assert_eq!(typing.class.as_deref(), Some("Repository"));
  assert_eq!(
    typing.message,
    "Generic class requires 1 generic arguments, none were given"
  );
}

#[test]
fn test_registry_rejects_unbound_generic_without_match_all() {
  let mut registry = Registry::new();
  registry.injectable::<SqlRepository>(InjectableOptions::singleton());

  let err = Injector::new(registry).unwrap_err();

  assert_eq!(err.injection_kind(), Some(InjectionErrorKind::InvalidRegistration));
}

#[test]
fn test_registry_accepts_explicit_generic_tokens() {
  let users = TypeToken::generic::<SqlRepository>([token::<User>()]).unwrap();
  let mut registry = Registry::new();
  registry.injectable_token(None, users.clone(), InjectableOptions::singleton());
  let injector = Injector::new(registry).unwrap();

  let instance = injector.require_token(&users).unwrap();

  assert_eq!(instance.downcast::<SqlRepository>().unwrap().entity(), "User");
}

#[test]
fn test_match_all_infers_arguments_through_indirect_bases() {
  let mut registry = Registry::new();
  registry.injectable_as::<dyn Repository, CachingSqlRepository>(
    InjectableOptions::singleton().match_all(),
  );
  let injector = Injector::new(registry).unwrap();

  let users = injector.require_generic::<dyn Repository>([token::<User>()]).unwrap();
  let orders = injector.require_generic::<dyn Repository>([token::<Order>()]).unwrap();

  assert_eq!(users.entity(), "User");
  assert_eq!(orders.entity(), "Order");
}

#[test]
fn test_type_of_an_unbound_argument_is_a_typing_error() {
  let injector = Injector::new(Registry::new()).unwrap();
  let open = TypeToken::new(Class::of::<CachingSqlRepository>(), vec![TypeArg::Any]).unwrap();
  let served = Function::new(
    "served",
    Signature::new().param(Parameter::typed("served", TypeExpr::type_of(TypeExpr::var("T")))),
    |args| args.cloned::<TypeToken>("served"),
  );

  let err = injector
    .call_with(&served, CallOptions::new().lookup(TypeVarLookup::new(&open)))
    .unwrap_err();

  let typing = err.as_typing().unwrap();
  assert_eq!(typing.message, "Any/TypeVar cannot be used as a concrete type");
}
