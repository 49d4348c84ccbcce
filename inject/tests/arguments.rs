use fibre_inject::{
  Arg, CallOptions, Caller, ClassBuilder, Function, Injectable, InjectionErrorKind, Injector,
  Parameter, Registry, ResolveRequest, Signature, TypeExpr,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::Arc;

// --- Test Fixtures ---

struct Clock;

impl Injectable for Clock {
  fn describe() -> ClassBuilder<Self> {
    ClassBuilder::new().constructor(Signature::new(), |_| Ok(Clock))
  }
}

struct Mailer;

impl Injectable for Mailer {
  fn describe() -> ClassBuilder<Self> {
    ClassBuilder::new().constructor(Signature::new(), |_| Ok(Mailer))
  }
}

fn injector() -> Injector {
  let injector = Injector::new(Registry::new()).unwrap();
  injector.add_singleton::<Clock>().unwrap();
  injector
}

fn kind_of<T>(result: fibre_inject::Result<T>) -> InjectionErrorKind {
  match result {
    Ok(_) => panic!("expected an injection error"),
    Err(err) => err.injection_kind().expect("not an injection error"),
  }
}

// --- Argument Resolution Tests ---

#[test]
fn test_unannotated_parameter_requires_a_default() {
  let injector = injector();
  let without_default = Function::new(
    "without_default",
    Signature::new().param(Parameter::new("value")),
    |_| Ok(()),
  );

  let err = injector.call(&without_default).unwrap_err();

  assert_eq!(err.injection_kind(), Some(InjectionErrorKind::MissingAnnotation));
  assert_eq!(
    err.to_string(),
    "Function without_default, Parameter value, Annotation is required"
  );
}

#[test]
fn test_unannotated_parameter_uses_its_default() {
  let injector = injector();
  let with_default = Function::new(
    "with_default",
    Signature::new().param(Parameter::new("retries").with_default_value(3u32)),
    |args| args.cloned::<u32>("retries"),
  );

  assert_eq!(injector.call(&with_default).unwrap(), 3);
}

#[test]
fn test_registered_dependencies_are_injected_into_functions() {
  let injector = injector();
  let tick = Function::new(
    "tick",
    Signature::new().param(Parameter::of::<Clock>("clock")),
    |args| args.take::<Clock>("clock"),
  );

  let clock = injector.call(&tick).unwrap();

  assert!(Arc::ptr_eq(&clock, &injector.require::<Clock>().unwrap()));
}

#[test]
fn test_unions_are_rejected() {
  let injector = injector();
  let either = Function::new(
    "either",
    Signature::new().param(Parameter::typed(
      "service",
      TypeExpr::Union(vec![TypeExpr::of::<Clock>(), TypeExpr::of::<Mailer>()]),
    )),
    |_| Ok(()),
  );

  let err = injector.call(&either).unwrap_err();

  assert_eq!(err.injection_kind(), Some(InjectionErrorKind::UnsupportedUnion));
  assert!(err.to_string().ends_with("Type unions are not allowed"));
}

#[test]
fn test_optional_parameters_accept_missing_registrations() {
  let injector = injector();
  let notify = Function::new(
    "notify",
    Signature::new()
      .param(Parameter::typed("mailer", TypeExpr::optional(TypeExpr::of::<Mailer>())))
      .param(Parameter::typed("clock", TypeExpr::optional(TypeExpr::of::<Clock>()))),
    |args| {
      let mailer = args.optional::<Mailer>("mailer")?;
      let clock = args.optional::<Clock>("clock")?;
      Ok((mailer.is_some(), clock.is_some()))
    },
  );

  assert_eq!(injector.call(&notify).unwrap(), (false, true));
}

#[test]
fn test_typed_default_is_used_for_unregistered_types() {
  let injector = injector();
  let send = Function::new(
    "send",
    Signature::new().param(Parameter::of::<Mailer>("mailer").with_default_value(Mailer)),
    |args| args.take::<Mailer>("mailer").map(|_| "default mailer"),
  );

  assert_eq!(injector.call(&send).unwrap(), "default mailer");
}

#[test]
fn test_positional_only_and_variadic_parameters_are_rejected() {
  let injector = injector();
  let positional = Function::new(
    "positional",
    Signature::new().param(Parameter::positional_only("value")),
    |_| Ok(()),
  );
  let variadic = Function::new(
    "variadic",
    Signature::new().param(Parameter::var_positional("values")),
    |_| Ok(()),
  );

  assert_eq!(
    kind_of(injector.call(&positional)),
    InjectionErrorKind::InvalidSignature
  );
  let err = injector.call(&variadic).unwrap_err();
  assert!(err
    .to_string()
    .ends_with("Positional only parameters and positional wildcards are not allowed"));
}

#[test]
fn test_leftover_arguments_are_an_arity_mismatch() {
  let injector = injector();
  let single = Function::new(
    "single",
    Signature::new().param(Parameter::new("value")),
    |_| Ok(()),
  );

  let err = injector
    .call_with(
      &single,
      CallOptions::new()
        .arg(Arg::value(1u32))
        .named_arg("other", Arg::value(2u32)),
    )
    .unwrap_err();

  assert_eq!(err.injection_kind(), Some(InjectionErrorKind::ArityMismatch));
  assert_eq!(
    err.to_string(),
    "Function single, Expected 1 arguments, 2 given"
  );
}

#[test]
fn test_positional_then_named_binding() {
  let injector = injector();
  let pair = Function::new(
    "pair",
    Signature::new()
      .param(Parameter::new("first"))
      .param(Parameter::new("second"))
      .param(Parameter::of::<Clock>("clock")),
    |args| {
      let first = args.cloned::<u32>("first")?;
      let second = args.cloned::<u32>("second")?;
      args.take::<Clock>("clock")?;
      Ok((first, second))
    },
  );

  let result = injector
    .call_with(
      &pair,
      CallOptions::new()
        .arg(Arg::value(1u32))
        .named_arg("second", Arg::value(2u32)),
    )
    .unwrap();

  assert_eq!(result, (1, 2));
}

#[test]
fn test_var_named_collects_remaining_arguments() {
  let injector = injector();
  let collect = Function::new(
    "collect",
    Signature::new()
      .param(Parameter::new("first"))
      .param(Parameter::var_named("rest")),
    |args| {
      let first = args.cloned::<u32>("first")?;
      let rest: BTreeMap<String, u32> = args
        .extra()
        .into_iter()
        .map(|(name, arg)| {
          let value = arg.instance().and_then(|i| i.downcast::<u32>()).map(|v| *v);
          (name, value.unwrap_or_default())
        })
        .collect();
      Ok((first, rest))
    },
  );

  let (first, rest) = injector
    .call_with(
      &collect,
      CallOptions::new()
        .named_arg("first", Arg::value(1u32))
        .named_arg("b", Arg::value(2u32))
        .named_arg("c", Arg::value(3u32)),
    )
    .unwrap();

  assert_eq!(first, 1);
  assert_eq!(
    rest,
    BTreeMap::from([("b".to_string(), 2), ("c".to_string(), 3)])
  );
}

#[test]
fn test_resolve_arguments_directly() {
  let injector = injector();
  let signature = Signature::new()
    .param(Parameter::of::<Clock>("clock"))
    .param(Parameter::new("label").with_default_value(String::from("none")));

  let mut args = injector
    .resolve_arguments(ResolveRequest::new(
      Caller::Function("direct".to_string()),
      &signature,
    ))
    .unwrap();

  assert_eq!(args.len(), 2);
  assert!(args.take::<Clock>("clock").is_ok());
  assert_eq!(args.cloned::<String>("label").unwrap(), "none");
}

#[test]
fn test_deferred_parameters_get_hooks_when_not_immediate() {
  let injector = Injector::new(Registry::new()).unwrap();
  injector.add_singleton::<Mailer>().unwrap();
  let signature = Signature::new().param(Parameter::lazy::<Mailer>("mailer"));

  let mut args = injector
    .resolve_arguments(ResolveRequest {
      immediate: false,
      ..ResolveRequest::new(Caller::Function("deferred".to_string()), &signature)
    })
    .unwrap();

  let lazy = args.lazy::<Mailer>("mailer").unwrap();
  assert!(!lazy.is_resolved());
  assert_eq!(lazy.token().map(ToString::to_string).as_deref(), Some("Mailer"));
}
