use fibre_inject::{
  AddOptions, Arg, ClassBuilder, Function, Injectable, InjectableOptions, InjectionErrorKind,
  InjectionEvent, Injector, InjectorConfig, Parameter, Registry, Signature, Strategy,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// --- Test Fixtures ---

static LOGGERS_BUILT: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug)]
struct Logger {
  id: usize,
}

impl Injectable for Logger {
  fn describe() -> ClassBuilder<Self> {
    ClassBuilder::new().constructor(Signature::new(), |_| {
      Ok(Logger {
        id: LOGGERS_BUILT.fetch_add(1, Ordering::SeqCst),
      })
    })
  }
}

#[derive(Debug)]
struct Service {
  logger: Arc<Logger>,
}

impl Injectable for Service {
  fn describe() -> ClassBuilder<Self> {
    ClassBuilder::new().constructor(
      Signature::new().param(Parameter::of::<Logger>("logger")),
      |args| {
        Ok(Service {
          logger: args.take("logger")?,
        })
      },
    )
  }
}

trait Greeter: Send + Sync {
  fn greet(&self) -> String;
}

impl Injectable for dyn Greeter {
  fn describe() -> ClassBuilder<Self> {
    ClassBuilder::new()
  }
}

#[derive(Debug)]
struct EnglishGreeter;

impl Greeter for EnglishGreeter {
  fn greet(&self) -> String {
    "Hello!".to_string()
  }
}

impl Injectable for EnglishGreeter {
  fn describe() -> ClassBuilder<Self> {
    ClassBuilder::new()
      .implements::<dyn Greeter>(|it| it as Arc<dyn Greeter>)
      .constructor(Signature::new(), |_| Ok(EnglishGreeter))
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Settings {
  name: String,
}

impl Injectable for Settings {
  fn describe() -> ClassBuilder<Self> {
    ClassBuilder::new().constructor(
      Signature::new().param(Parameter::new("name").with_default_value(String::from("default"))),
      |args| {
        Ok(Settings {
          name: args.cloned("name")?,
        })
      },
    )
  }
}

fn registry() -> Registry {
  let mut registry = Registry::new();
  registry
    .injectable::<Logger>(InjectableOptions::singleton())
    .injectable::<Service>(InjectableOptions::singleton());
  registry
}

// --- Basic Tests ---

#[test]
fn test_service_receives_the_singleton_logger() {
  // Arrange
  let injector = Injector::new(registry()).unwrap();

  // Act
  let service = injector.require::<Service>().unwrap();
  let logger = injector.require::<Logger>().unwrap();

  // Assert
  assert!(Arc::ptr_eq(&service.logger, &logger));
  assert!(Arc::ptr_eq(&service, &injector.require::<Service>().unwrap()));
}

#[test]
fn test_singleton_is_shared_between_scopes() {
  let injector = Injector::new(registry()).unwrap();

  let first = injector.get_scoped_session().unwrap();
  let second = injector.get_scoped_session().unwrap();
  let a = first.require::<Logger>().unwrap();
  let b = second.require::<Logger>().unwrap();

  assert!(Arc::ptr_eq(&a, &b));
  assert!(Arc::ptr_eq(&a, &injector.require::<Logger>().unwrap()));
}

#[test]
fn test_independent_injectors_do_not_share_instances() {
  let one = Injector::new(registry()).unwrap();
  let two = Injector::new(registry()).unwrap();

  let a = one.require::<Logger>().unwrap();
  let b = two.require::<Logger>().unwrap();

  assert!(!Arc::ptr_eq(&a, &b));
  assert_ne!(a.id, b.id);
}

#[test]
fn test_transient_instances_are_distinct() {
  struct Request {
    settings: Arc<Settings>,
  }
  impl Injectable for Request {
    fn describe() -> ClassBuilder<Self> {
      ClassBuilder::new().constructor(
        Signature::new().param(Parameter::of::<Settings>("settings")),
        |args| {
          Ok(Request {
            settings: args.take("settings")?,
          })
        },
      )
    }
  }

  let injector = Injector::new(Registry::new()).unwrap();
  injector.add_transient::<Settings>().unwrap();
  injector.add_transient::<Request>().unwrap();

  let r1 = injector.require::<Request>().unwrap();
  let r2 = injector.require::<Request>().unwrap();

  assert!(!Arc::ptr_eq(&r1, &r2));
  assert!(!Arc::ptr_eq(&r1.settings, &r2.settings));
  assert_eq!(r1.settings.name, "default");
}

#[test]
fn test_trait_resolution_through_registry() {
  let mut registry = Registry::new();
  registry.injectable_as::<dyn Greeter, EnglishGreeter>(InjectableOptions::singleton());
  let injector = Injector::new(registry).unwrap();

  let greeter = injector.require::<dyn Greeter>().unwrap();

  assert_eq!(greeter.greet(), "Hello!");
  assert!(Arc::ptr_eq(&greeter, &injector.require::<dyn Greeter>().unwrap()));
}

#[test]
fn test_trait_resolution_through_add() {
  let injector = Injector::new(Registry::new()).unwrap();
  injector
    .add::<EnglishGreeter>(AddOptions::transient().super_class::<dyn Greeter>())
    .unwrap();

  let greeter = injector.require::<dyn Greeter>().unwrap();
  assert_eq!(greeter.greet(), "Hello!");
  // Registered under the interface only.
  let err = injector.require::<EnglishGreeter>().unwrap_err();
  assert_eq!(err.injection_kind(), Some(InjectionErrorKind::NotRegistered));
}

#[test]
fn test_super_class_must_be_implemented() {
  let injector = Injector::new(Registry::new()).unwrap();

  let err = injector
    .add::<Logger>(AddOptions::singleton().super_class::<dyn Greeter>())
    .unwrap_err();

  assert_eq!(err.injection_kind(), Some(InjectionErrorKind::SuperClassMismatch));
}

#[test]
fn test_missing_registration_is_reported() {
  let injector = Injector::new(Registry::new()).unwrap();

  let err = injector.require::<Service>().unwrap_err();

  assert_eq!(err.injection_kind(), Some(InjectionErrorKind::NotRegistered));
  assert_eq!(
    err.to_string(),
    "Type Service is not a registered type in the injection system"
  );
}

#[test]
fn test_missing_dependency_names_the_parameter() {
  let mut registry = Registry::new();
  registry.injectable::<Service>(InjectableOptions::singleton());
  let injector = Injector::new(registry).unwrap();

  let err = injector.require::<Service>().unwrap_err();
  let err = err.as_injection().unwrap();

  assert_eq!(err.kind(), InjectionErrorKind::NotRegistered);
  assert_eq!(err.context().class.as_deref(), Some("Service"));
  assert_eq!(err.context().parameter.as_deref(), Some("logger"));
}

#[test]
fn test_provided_instance_is_served() {
  let injector = Injector::new(Registry::new()).unwrap();
  let settings = Settings {
    name: "provided".into(),
  };

  injector.add_instance(settings.clone()).unwrap();

  assert_eq!(*injector.require::<Settings>().unwrap(), settings);
}

#[test]
fn test_last_registration_wins() {
  let injector = Injector::new(Registry::new()).unwrap();

  injector
    .add_instance(Settings {
      name: "first".into(),
    })
    .unwrap();
  injector
    .add_instance(Settings {
      name: "second".into(),
    })
    .unwrap();

  assert_eq!(injector.require::<Settings>().unwrap().name, "second");
}

#[test]
fn test_strict_mode_rejects_duplicates() {
  let injector = Injector::with_config(Registry::new(), InjectorConfig::strict()).unwrap();
  injector.add_singleton::<Settings>().unwrap();

  let err = injector.add_singleton::<Settings>().unwrap_err();

  assert_eq!(err.injection_kind(), Some(InjectionErrorKind::InvalidRegistration));
}

#[test]
fn test_instance_requires_singleton_strategy() {
  let injector = Injector::new(Registry::new()).unwrap();

  let err = injector
    .add::<Settings>(AddOptions::transient().instance(Settings { name: "x".into() }))
    .unwrap_err();

  assert_eq!(err.injection_kind(), Some(InjectionErrorKind::InvalidRegistration));
  assert_eq!(
    err.to_string(),
    "Injection strategy for Settings must be singleton if an instance is provided"
  );
}

#[test]
fn test_instance_and_instantiate_are_exclusive() {
  let injector = Injector::new(Registry::new()).unwrap();

  let err = injector
    .add::<Settings>(
      AddOptions::singleton()
        .instance(Settings { name: "x".into() })
        .instantiate(),
    )
    .unwrap_err();

  assert_eq!(
    err.to_string(),
    "Cannot instantiate Settings if an instance is provided"
  );
}

#[test]
fn test_add_instantiated_returns_the_cached_singleton() {
  let injector = Injector::new(Registry::new()).unwrap();

  let built = injector
    .add_instantiated::<Settings>(
      AddOptions::singleton().named_arg("name", Arg::value(String::from("eager"))),
    )
    .unwrap();

  assert_eq!(built.name, "eager");
  assert!(Arc::ptr_eq(&built, &injector.require::<Settings>().unwrap()));
}

#[test]
fn test_registered_positional_args_reach_the_constructor() {
  let injector = Injector::new(Registry::new()).unwrap();
  injector
    .add::<Settings>(AddOptions::singleton().arg(Arg::value(String::from("positional"))))
    .unwrap();

  assert_eq!(injector.require::<Settings>().unwrap().name, "positional");
}

#[test]
fn test_instantiate_does_not_cache() {
  let injector = Injector::new(registry()).unwrap();

  let a = injector.instantiate::<Service>().unwrap();
  let b = injector.instantiate::<Service>().unwrap();

  assert!(!Arc::ptr_eq(&a, &b));
  // Dependencies still follow their own lifetime.
  assert!(Arc::ptr_eq(&a.logger, &b.logger));
  assert!(Arc::ptr_eq(&a.logger, &injector.require::<Logger>().unwrap()));
}

#[test]
fn test_init_methods_and_hooks_run_in_order() {
  trait Tracked: Send + Sync {
    fn record(&self, step: &str);
  }
  impl Injectable for dyn Tracked {
    fn describe() -> ClassBuilder<Self> {
      ClassBuilder::new().init_method("setup", Signature::new(), |this: &Self, _| {
        this.record("base");
        Ok(())
      })
    }
  }

  struct Job {
    steps: Mutex<Vec<String>>,
    logger: Mutex<Option<Arc<Logger>>>,
  }
  impl Tracked for Job {
    fn record(&self, step: &str) {
      self.steps.lock().unwrap().push(step.to_string());
    }
  }
  impl Injectable for Job {
    fn describe() -> ClassBuilder<Self> {
      ClassBuilder::new()
        .implements::<dyn Tracked>(|it| it as Arc<dyn Tracked>)
        .init_method(
          "start",
          Signature::new().param(Parameter::of::<Logger>("logger")),
          |this: &Self, args| {
            *this.logger.lock().unwrap() = Some(args.take("logger")?);
            this.record("job");
            Ok(())
          },
        )
        .constructor(Signature::new(), |_| {
          Ok(Job {
            steps: Mutex::new(Vec::new()),
            logger: Mutex::new(None),
          })
        })
    }
  }

  let injector = Injector::new(registry()).unwrap();
  injector
    .add::<Job>(
      AddOptions::singleton()
        .before_init(Function::method::<Job>("before", Signature::new(), |job, _| {
          job.record("before");
          Ok(())
        }))
        .after_init(Function::method::<Job>("after", Signature::new(), |job, _| {
          job.record("after");
          Ok(())
        })),
    )
    .unwrap();

  let job = injector.require::<Job>().unwrap();

  assert_eq!(
    *job.steps.lock().unwrap(),
    vec!["before", "base", "job", "after"]
  );
  assert!(job.logger.lock().unwrap().is_some());
}

#[test]
fn test_events_are_emitted() {
  let events = Arc::new(Mutex::new(Vec::new()));
  let mut registry = registry();
  let sink = Arc::clone(&events);
  registry.on_event(move |event| {
    let line = match event {
      InjectionEvent::Instantiated {
        token, strategy, ..
      } => format!("instantiated {} ({})", token, strategy),
      InjectionEvent::SessionOpened => "opened".to_string(),
      InjectionEvent::SessionClosed => "closed".to_string(),
    };
    sink.lock().unwrap().push(line);
  });
  let injector = Injector::new(registry).unwrap();

  injector.require::<Service>().unwrap();
  injector.get_scoped_session().unwrap().close();

  assert_eq!(
    *events.lock().unwrap(),
    vec![
      "instantiated Logger (singleton)",
      "instantiated Service (singleton)",
      "opened",
      "closed",
    ]
  );
}

#[test]
fn test_injector_is_injectable() {
  struct Factory {
    injector: Arc<Injector>,
  }
  impl Injectable for Factory {
    fn describe() -> ClassBuilder<Self> {
      ClassBuilder::new().constructor(
        Signature::new().param(Parameter::of::<Injector>("injector")),
        |args| {
          Ok(Factory {
            injector: args.take("injector")?,
          })
        },
      )
    }
  }

  let injector = Injector::new(registry()).unwrap();
  let factory = injector.instantiate::<Factory>().unwrap();

  assert!(!factory.injector.is_scoped());
  let logger = factory.injector.require::<Logger>().unwrap();
  assert!(Arc::ptr_eq(&logger, &injector.require::<Logger>().unwrap()));
}

#[test]
fn test_registered_types_lists_every_bag() {
  let injector = Injector::new(registry()).unwrap();

  let names: Vec<String> = injector
    .registered_types()
    .iter()
    .map(|bag| bag.class().name().to_string())
    .collect();

  assert_eq!(names, vec!["Injector", "Logger", "Registry", "Service"]);
  let service = injector
    .registered_type(&fibre_inject::TypeToken::of::<Service>().unwrap())
    .unwrap();
  assert_eq!(service.strategy(), Strategy::Singleton);
}
