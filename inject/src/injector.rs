//! The `Injector` and its registration, resolution and instantiation logic.

use crate::arguments::{Arg, Arguments};
use crate::config::{InjectorConfig, RegistrationMode};
use crate::context::InjectionContext;
use crate::core::{Frame, Instance, ResolutionGuard};
use crate::error::{Error, InjectionError, InjectionErrorKind, Result};
use crate::registration::{InjectableOptions, RegisteredType, RegisteredTypeBag, Strategy};
use crate::registry::{InjectionEvent, Registry};
use crate::resolver::{ArgResolverOptions, ArgumentResolver, DefaultArgResolver};
use crate::scoped::ScopedInjector;
use crate::types::{
  Caller, Class, ClassBuilder, Function, Injectable, ParameterKind, Signature, TypeArg, TypeToken,
  TypeVarLookup,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::any::{type_name, Any, TypeId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, debug_span, trace, warn};

type Resolvers = Vec<Arc<dyn ArgumentResolver>>;

pub(crate) struct InjectorInner {
  config: InjectorConfig,
  global: InjectionContext,
  types: DashMap<TypeId, RegisteredTypeBag>,
  registry: Arc<Registry>,
  resolvers: RwLock<Resolvers>,
}

pub(crate) struct ScopeState {
  context: InjectionContext,
  resolvers: RwLock<Resolvers>,
  closed: AtomicBool,
}

/// The dependency-injection container.
///
/// `Injector` is a cheap handle: clones share the same registry and global
/// context. A handle obtained from [`Injector::get_scoped_session`] also
/// carries a scoped context.
#[derive(Clone)]
pub struct Injector {
  inner: Arc<InjectorInner>,
  scope: Option<Arc<ScopeState>>,
}

/// A non-owning handle, used by lazy hooks and by the context entry that
/// points back at the injector itself.
#[derive(Clone)]
pub(crate) struct WeakInjector {
  inner: Weak<InjectorInner>,
  scope: Option<Weak<ScopeState>>,
}

impl WeakInjector {
  pub(crate) fn upgrade(&self) -> Option<Injector> {
    let inner = self.inner.upgrade()?;
    let scope = match &self.scope {
      Some(scope) => Some(scope.upgrade()?),
      None => None,
    };
    Some(Injector { inner, scope })
  }
}

/// Options for [`Injector::add`].
#[derive(Clone, Debug)]
pub struct AddOptions {
  registration: InjectableOptions,
  type_args: Option<Vec<TypeToken>>,
  super_class: Option<Class>,
  super_token: Option<TypeToken>,
  instance: Option<Instance>,
  instantiate: bool,
}

impl AddOptions {
  pub fn new(strategy: Strategy) -> Self {
    InjectableOptions::new(strategy).into()
  }

  pub fn singleton() -> Self {
    Self::new(Strategy::Singleton)
  }

  pub fn scoped() -> Self {
    Self::new(Strategy::Scoped)
  }

  pub fn transient() -> Self {
    Self::new(Strategy::Transient)
  }

  /// Generic arguments of the registered class.
  pub fn type_args(mut self, args: impl IntoIterator<Item = TypeToken>) -> Self {
    self.type_args = Some(args.into_iter().collect());
    self
  }

  /// Registers under the interface or base `S`. Its generic arguments are
  /// derived from the registered class.
  pub fn super_class<S: ?Sized + Injectable>(mut self) -> Self {
    self.super_class = Some(Class::of::<S>());
    self
  }

  /// Registers under an explicit super token.
  pub fn super_token(mut self, token: TypeToken) -> Self {
    self.super_token = Some(token);
    self
  }

  pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
    self.registration = self.registration.arg(arg);
    self
  }

  pub fn named_arg(mut self, name: impl Into<String>, arg: impl Into<Arg>) -> Self {
    self.registration = self.registration.named_arg(name, arg);
    self
  }

  pub fn before_init(mut self, hook: Function<()>) -> Self {
    self.registration = self.registration.before_init(hook);
    self
  }

  pub fn after_init(mut self, hook: Function<()>) -> Self {
    self.registration = self.registration.after_init(hook);
    self
  }

  pub fn match_all(mut self) -> Self {
    self.registration = self.registration.match_all();
    self
  }

  /// A pre-built instance, served instead of constructing one.
  pub fn instance<T: Any + Send + Sync>(self, value: T) -> Self {
    self.shared_instance(Arc::new(value))
  }

  pub fn shared_instance<T: Any + Send + Sync>(mut self, value: Arc<T>) -> Self {
    self.instance = Some(Instance::from_arc(value));
    self
  }

  /// Builds the instance right away and returns it from `add`.
  pub fn instantiate(mut self) -> Self {
    self.instantiate = true;
    self
  }
}

impl From<InjectableOptions> for AddOptions {
  fn from(registration: InjectableOptions) -> Self {
    Self {
      registration,
      type_args: None,
      super_class: None,
      super_token: None,
      instance: None,
      instantiate: false,
    }
  }
}

/// Explicit arguments and extra resolvers for [`Injector::call_with`] and
/// [`Injector::instantiate_with`].
#[derive(Clone, Default)]
pub struct CallOptions {
  args: Vec<Arg>,
  named_args: HashMap<String, Arg>,
  lookup: Option<TypeVarLookup>,
  resolvers: Resolvers,
}

impl CallOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn named_arg(mut self, name: impl Into<String>, arg: impl Into<Arg>) -> Self {
    self.named_args.insert(name.into(), arg.into());
    self
  }

  /// Resolves type variables in the function's annotations.
  pub fn lookup(mut self, lookup: TypeVarLookup) -> Self {
    self.lookup = Some(lookup);
    self
  }

  /// A resolver consulted before the injector's own pipeline.
  pub fn resolver(mut self, resolver: Arc<dyn ArgumentResolver>) -> Self {
    self.resolvers.push(resolver);
    self
  }
}

impl fmt::Debug for CallOptions {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CallOptions")
      .field("args", &self.args)
      .field("named_args", &self.named_args)
      .field("lookup", &self.lookup)
      .field("resolvers", &self.resolvers.len())
      .finish()
  }
}

/// One call of [`Injector::resolve_arguments`].
pub struct ResolveRequest<'a> {
  pub caller: Caller,
  pub signature: &'a Signature,
  /// Generic arguments of the calling class.
  pub type_args: Vec<TypeArg>,
  /// Lifetime of the calling class; `None` for ad hoc instantiation.
  pub strategy: Option<Strategy>,
  pub lookup: Option<&'a TypeVarLookup>,
  /// Forces real instances even for deferred parameters.
  pub immediate: bool,
  pub args: Vec<Arg>,
  pub named_args: HashMap<String, Arg>,
  /// Consulted before the injector's own pipeline.
  pub resolvers: Resolvers,
}

impl<'a> ResolveRequest<'a> {
  pub fn new(caller: Caller, signature: &'a Signature) -> Self {
    Self {
      caller,
      signature,
      type_args: Vec::new(),
      strategy: None,
      lookup: None,
      immediate: true,
      args: Vec::new(),
      named_args: HashMap::new(),
      resolvers: Vec::new(),
    }
  }
}

impl Injector {
  /// Builds an injector from the markers collected in `registry`.
  pub fn new(registry: Registry) -> Result<Self> {
    Self::with_config(registry, InjectorConfig::default())
  }

  pub fn with_config(registry: Registry, config: InjectorConfig) -> Result<Self> {
    let injector = Injector {
      inner: Arc::new(InjectorInner {
        config,
        global: InjectionContext::new(),
        types: DashMap::new(),
        registry: Arc::new(registry),
        resolvers: RwLock::new(Vec::new()),
      }),
      scope: None,
    };

    injector.pickup_types()?;

    let registry_token = TypeToken::of::<Registry>()?;
    injector.register(&registry_token, registry_token.clone(), InjectableOptions::singleton(), true)?;
    let injector_token = TypeToken::of::<Injector>()?;
    injector.register(&injector_token, injector_token.clone(), InjectableOptions::singleton(), true)?;
    injector.seed_global()?;

    let resolvers = injector.build_resolvers(false)?;
    *injector.inner.resolvers.write() = resolvers;

    debug!(
      types = injector.inner.types.len(),
      resolvers = injector.inner.resolvers.read().len(),
      "injector ready"
    );
    Ok(injector)
  }

  // --- PUBLIC API ---

  /// Registers `T`, or the class described by `options`.
  ///
  /// When `options` asks for immediate instantiation, returns the instance
  /// as built by the concrete class.
  pub fn add<T: Injectable>(&self, options: AddOptions) -> Result<Option<Instance>> {
    if let Some(instance) = &options.instance {
      if !instance.is::<T>() {
        return Err(
          InjectionError::new(
            InjectionErrorKind::InvalidRegistration,
            format!(
              "Provided instance holds {}, not {}",
              instance.type_name(),
              type_name::<T>()
            ),
          )
          .into(),
        );
      }
    }
    self.add_class(Class::of::<T>(), options)
  }

  pub fn add_singleton<T: Injectable>(&self) -> Result<()> {
    self.add::<T>(AddOptions::singleton()).map(drop)
  }

  pub fn add_scoped<T: Injectable>(&self) -> Result<()> {
    self.add::<T>(AddOptions::scoped()).map(drop)
  }

  pub fn add_transient<T: Injectable>(&self) -> Result<()> {
    self.add::<T>(AddOptions::transient()).map(drop)
  }

  /// Registers a pre-built singleton.
  pub fn add_instance<T: Injectable>(&self, value: T) -> Result<()> {
    self.add::<T>(AddOptions::singleton().instance(value)).map(drop)
  }

  /// Registers `T` and returns the instance built for it.
  pub fn add_instantiated<T: Injectable>(&self, options: AddOptions) -> Result<Arc<T>> {
    let instance = self.add::<T>(options.instantiate())?.ok_or_else(|| {
      InjectionError::new(
        InjectionErrorKind::InvalidRegistration,
        "Registration did not produce an instance",
      )
      .in_class(type_name::<T>())
    })?;
    let token = TypeToken::unbound::<T>();
    downcast::<T>(instance, &token)
  }

  /// Returns the instance registered for `T`. Singleton and transient
  /// registrations can be required anywhere, scoped ones only inside a
  /// scoped session.
  pub fn require<T: ?Sized + Injectable>(&self) -> Result<Arc<T>> {
    let token = TypeToken::of::<T>()?;
    let instance = self.require_token(&token)?;
    downcast::<T>(instance, &token)
  }

  /// [`Injector::require`] for a generic `T` with explicit arguments.
  pub fn require_generic<T: ?Sized + Injectable>(
    &self,
    args: impl IntoIterator<Item = TypeToken>,
  ) -> Result<Arc<T>> {
    let token = TypeToken::generic::<T>(args)?;
    let instance = self.require_token(&token)?;
    downcast::<T>(instance, &token)
  }

  pub fn require_token(&self, token: &TypeToken) -> Result<Instance> {
    if !self.is_registered(token) {
      return Err(
        InjectionError::new(
          InjectionErrorKind::NotRegistered,
          format!("Type {} is not a registered type in the injection system", token),
        )
        .into(),
      );
    }
    let registered = self.registered_type(token)?;
    self.check_requireable(&registered, token)?;
    if let Some(instance) = self.cached_instance(&registered, token)? {
      return Ok(instance);
    }
    self.instantiate_registered(&registered, token)
  }

  /// Builds a `T` without registering or caching it.
  pub fn instantiate<T: Injectable>(&self) -> Result<Arc<T>> {
    self.instantiate_with::<T>(CallOptions::default())
  }

  pub fn instantiate_with<T: Injectable>(&self, options: CallOptions) -> Result<Arc<T>> {
    let token = TypeToken::of::<T>()?;
    let instance = self.instantiate_token(&token, options)?;
    downcast::<T>(instance, &token)
  }

  /// Builds the class of `token` without registering or caching it.
  /// Every dependency is resolved immediately.
  pub fn instantiate_token(&self, token: &TypeToken, options: CallOptions) -> Result<Instance> {
    let _guard = ResolutionGuard::enter(Frame::class(token), self.inner.config.max_resolution_depth)?;
    let class = token.class().clone();
    let constructor = constructor_of(&class, token)?;
    let own_lookup = TypeVarLookup::new(token);
    let lookup = options.lookup.as_ref().unwrap_or(&own_lookup);

    let mut args = self.resolve_arguments(ResolveRequest {
      type_args: token.args().to_vec(),
      strategy: None,
      lookup: Some(lookup),
      immediate: true,
      args: options.args,
      named_args: options.named_args,
      resolvers: options.resolvers,
      ..ResolveRequest::new(Caller::Class(token.clone()), constructor.signature())
    })?;
    args.stamp(token.clone(), self.clone());
    let instance = constructor.invoke(&mut args)?;
    let owner = self.downgrade();
    for hook in args.hooks() {
      hook.bind(&owner);
    }
    drop(args);

    self.run_init_recursive(&class, &instance, lookup, &mut HashSet::new())?;
    Ok(instance)
  }

  /// Calls `function` with every parameter resolved immediately.
  pub fn call<R: 'static>(&self, function: &Function<R>) -> Result<R> {
    self.call_with(function, CallOptions::default())
  }

  pub fn call_with<R: 'static>(&self, function: &Function<R>, options: CallOptions) -> Result<R> {
    let _guard = ResolutionGuard::enter(
      Frame::function(function.id(), function.name()),
      self.inner.config.max_resolution_depth,
    )?;
    let mut args = self.resolve_arguments(ResolveRequest {
      strategy: Some(self.call_strategy()),
      lookup: options.lookup.as_ref(),
      immediate: true,
      args: options.args,
      named_args: options.named_args,
      resolvers: options.resolvers,
      ..ResolveRequest::new(Caller::Function(function.name().to_owned()), function.signature())
    })?;
    function.invoke(&mut args)
  }

  /// Binds every parameter of a signature, from explicit arguments first
  /// and then through the resolver pipeline.
  pub fn resolve_arguments(&self, request: ResolveRequest<'_>) -> Result<Arguments> {
    let ResolveRequest {
      caller,
      signature,
      type_args,
      strategy,
      lookup,
      immediate,
      args,
      named_args,
      resolvers,
    } = request;

    if signature.params().iter().any(|p| {
      matches!(
        p.kind(),
        ParameterKind::PositionalOnly | ParameterKind::VarPositional
      )
    }) {
      return Err(
        InjectionError::new(
          InjectionErrorKind::InvalidSignature,
          "Positional only parameters and positional wildcards are not allowed",
        )
        .with_context(caller.error_context())
        .into(),
      );
    }

    let given = args.len() + named_args.len();
    let mut positional: VecDeque<Arg> = args.into();
    let mut named = named_args;
    let mut bound = Arguments::new(caller.clone());
    let pipeline = self.pipeline(resolvers);

    for param in signature.params() {
      let name = param.name();
      if param.kind() == ParameterKind::VarNamed {
        for (key, value) in named.drain() {
          bound.bind_extra(key, value);
        }
        break;
      }
      if let Some(arg) = positional.pop_front() {
        bound.bind(name, arg, None);
        continue;
      }
      if let Some(arg) = named.remove(name) {
        bound.bind(name, arg, None);
        continue;
      }

      let param_error = |kind: InjectionErrorKind, message: &str| -> Error {
        InjectionError::new(kind, message)
          .with_context(caller.error_context().with_parameter(name))
          .into()
      };

      let annotation = match (param.annotation(), param.default()) {
        (Some(annotation), _) => annotation,
        (None, Some(default)) => {
          bound.bind(name, default.clone(), None);
          continue;
        }
        (None, None) => {
          return Err(param_error(
            InjectionErrorKind::MissingAnnotation,
            "Annotation is required",
          ))
        }
      };

      let (members, nullable) = annotation.non_null_members();
      let hint = match members.as_slice() {
        [single] => *single,
        _ => {
          return Err(param_error(
            InjectionErrorKind::UnsupportedUnion,
            "Type unions are not allowed",
          ))
        }
      };
      let token = hint.resolve(lookup)?;

      let options = ArgResolverOptions {
        injector: self,
        caller: &caller,
        caller_type_args: &type_args,
        caller_strategy: strategy,
        name,
        token: &token,
        nullable,
        default: param.default(),
        immediate: immediate || !param.is_deferred(),
      };
      trace!(caller = %caller, parameter = name, token = %token, "resolving parameter");
      let (arg_name, value) = run_pipeline(&pipeline, &options)?;
      bound.bind(arg_name, value, Some(token));
    }

    if !positional.is_empty() || !named.is_empty() {
      return Err(
        InjectionError::new(
          InjectionErrorKind::ArityMismatch,
          format!(
            "Expected {} arguments, {} given",
            signature.len(),
            given
          ),
        )
        .with_context(caller.error_context())
        .into(),
      );
    }

    Ok(bound)
  }

  pub fn is_registered(&self, token: &TypeToken) -> bool {
    self
      .inner
      .types
      .get(&token.class().id())
      .map(|bag| bag.is_registered(token))
      .unwrap_or(false)
  }

  /// The registration serving `token`.
  pub fn registered_type(&self, token: &TypeToken) -> Result<Arc<RegisteredType>> {
    let bag = self.inner.types.get(&token.class().id()).ok_or_else(|| {
      InjectionError::new(
        InjectionErrorKind::NotRegistered,
        "Type is not registered in the injection system",
      )
      .in_class(token.to_string())
    })?;
    Ok(bag.get_type(token)?)
  }

  /// A snapshot of every registration bag, ordered by class name.
  pub fn registered_types(&self) -> Vec<RegisteredTypeBag> {
    let mut bags: Vec<RegisteredTypeBag> = self
      .inner
      .types
      .iter()
      .map(|entry| entry.value().clone())
      .collect();
    bags.sort_by(|a, b| a.class().name().cmp(b.class().name()));
    bags
  }

  /// Releases every instance held by the global context. Singletons are
  /// built again on their next request.
  ///
  /// A singleton holding an `Arc<Injector>` keeps the injector alive, and
  /// the injector keeps the singleton; shutting down breaks that cycle.
  pub fn shutdown(&self) -> Result<()> {
    let released = self.inner.global.len();
    self.inner.global.clear();
    self.seed_global()?;
    debug!(released, "injector shut down");
    Ok(())
  }

  /// Opens a scoped session sharing this injector's registry and global
  /// context.
  pub fn get_scoped_session(&self) -> Result<ScopedInjector> {
    let injector = Injector {
      inner: Arc::clone(&self.inner),
      scope: Some(Arc::new(ScopeState {
        context: InjectionContext::sharing_builds_with(&self.inner.global),
        resolvers: RwLock::new(Vec::new()),
        closed: AtomicBool::new(false),
      })),
    };
    let scope = injector.scope_state()?;
    scope
      .context
      .set_container(TypeToken::of::<Injector>()?, injector.downgrade());

    let resolvers = injector.build_resolvers(true)?;
    *scope.resolvers.write() = resolvers;

    debug!("scoped session opened");
    self.inner.registry.notify(&InjectionEvent::SessionOpened);
    Ok(ScopedInjector::new(injector))
  }

  /// Whether this handle belongs to a scoped session.
  pub fn is_scoped(&self) -> bool {
    self.scope.is_some()
  }

  /// A handle to the root injector, without any scope.
  pub fn root(&self) -> Injector {
    Injector {
      inner: Arc::clone(&self.inner),
      scope: None,
    }
  }

  pub fn config(&self) -> &InjectorConfig {
    &self.inner.config
  }

  pub fn registry(&self) -> &Registry {
    &self.inner.registry
  }

  /// The instances held by the global context.
  pub fn global_instances(&self) -> Vec<(TypeToken, Instance)> {
    self.inner.global.instances()
  }

  // --- CRATE API ---

  pub(crate) fn downgrade(&self) -> WeakInjector {
    WeakInjector {
      inner: Arc::downgrade(&self.inner),
      scope: self.scope.as_ref().map(Arc::downgrade),
    }
  }

  /// Resolves the dependency behind a lazy hook, along with the lifetime
  /// it is registered with.
  pub(crate) fn resolve_proxy(&self, token: &TypeToken) -> Result<(Instance, Strategy)> {
    let registered = self.registered_type(token)?;
    let strategy = registered.strategy();
    if let Some(instance) = self.cached_instance(&registered, token)? {
      return Ok((instance, strategy));
    }
    Ok((self.instantiate_registered(&registered, token)?, strategy))
  }

  /// The instance already stored for `requested`, presented as the
  /// requested class. The scoped context shadows the global one.
  pub(crate) fn cached_instance(
    &self,
    registered: &RegisteredType,
    requested: &TypeToken,
  ) -> Result<Option<Instance>> {
    self
      .stored_instance(registered, requested)
      .map(|instance| present(registered, requested, instance))
      .transpose()
  }

  /// Builds, initializes and stores an instance according to its lifetime.
  pub(crate) fn instantiate_registered(
    &self,
    registered: &RegisteredType,
    requested: &TypeToken,
  ) -> Result<Instance> {
    let instance = self.instantiate_concrete(registered, requested)?;
    present(registered, requested, instance)
  }

  pub(crate) fn close_scope(&self) {
    if let Some(scope) = &self.scope {
      if !scope.closed.swap(true, Ordering::SeqCst) {
        let released = scope.context.len();
        scope.context.clear();
        scope.resolvers.write().clear();
        debug!(released, "scoped session closed");
        self.inner.registry.notify(&InjectionEvent::SessionClosed);
      }
    }
  }

  pub(crate) fn scoped_instances(&self) -> Vec<(TypeToken, Instance)> {
    self
      .scope
      .as_ref()
      .map(|scope| scope.context.instances())
      .unwrap_or_default()
  }

  // --- PRIVATE HELPERS ---

  // The registry and the injector itself are always served from the global
  // context.
  fn seed_global(&self) -> Result<()> {
    let registry_token = TypeToken::of::<Registry>()?;
    if !self.inner.global.has_instance(&registry_token) {
      self
        .inner
        .global
        .set_instance(registry_token, Instance::from_arc(Arc::clone(&self.inner.registry)));
    }
    let injector_token = TypeToken::of::<Injector>()?;
    self.inner.global.set_container(injector_token, self.root().downgrade());
    Ok(())
  }

  fn check_requireable(&self, registered: &RegisteredType, token: &TypeToken) -> Result<()> {
    let allowed: &[Strategy] = if self.scope.is_some() {
      &[Strategy::Singleton, Strategy::Scoped, Strategy::Transient]
    } else {
      &[Strategy::Singleton, Strategy::Transient]
    };
    if allowed.contains(&registered.strategy()) {
      return Ok(());
    }
    Err(
      InjectionError::new(
        InjectionErrorKind::WrongLifetime,
        format!(
          "Injection strategy for {} must be {} to be required in this context",
          token,
          format_strategies(allowed)
        ),
      )
      .into(),
    )
  }

  // The scoped context shadows the global one on reads.
  fn stored_instance(&self, registered: &RegisteredType, requested: &TypeToken) -> Option<Instance> {
    let key = registered.instance_key(requested);
    let scoped = self.scope.as_ref().and_then(|scope| scope.context.get_instance(&key));
    match registered.strategy() {
      Strategy::Singleton => scoped.or_else(|| self.inner.global.get_instance(&key)),
      Strategy::Scoped => scoped,
      Strategy::Transient => None,
    }
  }

  // Returns the instance as built, before any cast to the requested class.
  fn instantiate_concrete(&self, registered: &RegisteredType, requested: &TypeToken) -> Result<Instance> {
    let key = registered.instance_key(requested);
    let _guard = ResolutionGuard::enter(Frame::class(&key), self.inner.config.max_resolution_depth)?;

    match registered.strategy() {
      Strategy::Singleton => {
        let root = self.root();
        self
          .inner
          .global
          .get_or_try_init(&key, || root.build_registered(registered, requested))
      }
      Strategy::Scoped => {
        let scope = self.active_scope(requested)?;
        scope
          .context
          .get_or_try_init(&key, || self.build_registered(registered, requested))
      }
      Strategy::Transient => self.build_registered(registered, requested),
    }
  }

  fn pickup_types(&self) -> Result<()> {
    let registry = Arc::clone(&self.inner.registry);
    for marker in registry.injectables() {
      let match_all = marker.options.is_match_all();
      if !match_all && !marker.token.is_concrete() {
        return Err(
          InjectionError::new(
            InjectionErrorKind::InvalidRegistration,
            format!(
              "Type {} requires {} generic parameters and none were given",
              marker.token,
              marker.token.class().params().len()
            ),
          )
          .into(),
        );
      }
      let super_token = match &marker.super_token {
        Some(super_token) if super_token.is_concrete() => super_token.clone(),
        Some(super_token) => marker
          .token
          .ancestor(super_token.class(), match_all)?
          .ok_or_else(|| {
            InjectionError::new(
              InjectionErrorKind::SuperClassMismatch,
              format!("Type {} does not extend or implement {}", marker.token, super_token),
            )
          })?,
        None => marker.token.clone(),
      };
      self.validate_super(&marker.token, &super_token)?;
      self.register(&super_token, marker.token.clone(), marker.options.clone(), false)?;
    }
    Ok(())
  }

  fn add_class(&self, class: Class, options: AddOptions) -> Result<Option<Instance>> {
    let AddOptions {
      registration,
      type_args,
      super_class,
      super_token,
      instance,
      instantiate,
    } = options;
    let strategy = registration.strategy();
    let match_all = registration.is_match_all();

    let token = if match_all {
      TypeToken::unbound_class(class.clone())
    } else {
      let args: Vec<TypeArg> = type_args
        .unwrap_or_default()
        .into_iter()
        .map(TypeArg::Type)
        .collect();
      let given = args.len();
      TypeToken::new(class.clone(), args).map_err(|_| {
        InjectionError::new(
          InjectionErrorKind::InvalidRegistration,
          format!(
            "Type {} requires {} generic parameters and {} were given",
            class,
            class.params().len(),
            given
          ),
        )
      })?
    };

    let super_token = match (super_token, super_class) {
      (Some(super_token), _) => super_token,
      (None, Some(super_class)) => token.ancestor(&super_class, match_all)?.ok_or_else(|| {
        InjectionError::new(
          InjectionErrorKind::SuperClassMismatch,
          format!("Type {} does not extend or implement {}", token, super_class),
        )
      })?,
      (None, None) => token.clone(),
    };
    self.validate_super(&token, &super_token)?;

    if let Some(instance) = &instance {
      if instantiate {
        return Err(
          InjectionError::new(
            InjectionErrorKind::InvalidRegistration,
            format!("Cannot instantiate {} if an instance is provided", token),
          )
          .into(),
        );
      }
      let allowed: &[Strategy] = if self.scope.is_some() {
        &[Strategy::Singleton, Strategy::Scoped]
      } else {
        &[Strategy::Singleton]
      };
      if !allowed.contains(&strategy) {
        return Err(
          InjectionError::new(
            InjectionErrorKind::InvalidRegistration,
            format!(
              "Injection strategy for {} must be {} if an instance is provided",
              token,
              format_strategies(allowed)
            ),
          )
          .into(),
        );
      }
    }

    self.register(&super_token, token.clone(), registration, false)?;

    if let Some(instance) = instance {
      match strategy {
        Strategy::Scoped => self.scope_state()?.context.set_instance(token, instance),
        _ => self.inner.global.set_instance(token, instance),
      }
    }

    if !instantiate {
      return Ok(None);
    }
    let registered = self.registered_type(&super_token)?;
    self.check_requireable(&registered, &super_token)?;
    let instance = match self.stored_instance(&registered, &super_token) {
      Some(instance) => instance,
      None => self.instantiate_concrete(&registered, &super_token)?,
    };
    Ok(Some(instance))
  }

  fn validate_super(&self, token: &TypeToken, super_token: &TypeToken) -> Result<()> {
    if token.class().is_subclass_of(super_token.class()) {
      return Ok(());
    }
    Err(
      InjectionError::new(
        InjectionErrorKind::SuperClassMismatch,
        format!("Type {} does not extend or implement {}", token, super_token),
      )
      .into(),
    )
  }

  /// Stores a registration. The safe path never replaces an existing one.
  fn register(
    &self,
    super_token: &TypeToken,
    token: TypeToken,
    options: InjectableOptions,
    safe: bool,
  ) -> Result<()> {
    let super_class = super_token.class();
    let mut bag = self
      .inner
      .types
      .entry(super_class.id())
      .or_insert_with(|| RegisteredTypeBag::new(super_class.clone()));

    let match_all = options.is_match_all();
    let exists = if match_all {
      bag.has_match_all()
    } else {
      bag.has_type(super_token)
    };
    if exists && safe {
      return Ok(());
    }
    if exists && self.inner.config.registration == RegistrationMode::Strict {
      return Err(
        InjectionError::new(
          InjectionErrorKind::InvalidRegistration,
          format!("Type {} is already registered", super_token),
        )
        .into(),
      );
    }

    let strategy = options.strategy();
    let registered = RegisteredType::new(token.clone(), options);
    let replaced = if match_all {
      bag.set_match_all(registered)
    } else {
      bag.add_type(super_token.clone(), registered)
    };
    if let Some(previous) = replaced {
      warn!(
        super_type = %super_token,
        previous = %previous.token(),
        token = %token,
        "registration replaced"
      );
    }
    debug!(super_type = %super_token, token = %token, %strategy, match_all, "type registered");
    Ok(())
  }

  fn build_resolvers(&self, include_scoped: bool) -> Result<Resolvers> {
    let registry = Arc::clone(&self.inner.registry);
    let mut markers: Vec<_> = registry
      .resolvers()
      .iter()
      .filter(|marker| include_scoped || !marker.scoped)
      .collect();
    markers.sort_by_key(|marker| marker.priority);

    let mut resolvers = Vec::with_capacity(markers.len());
    for marker in markers {
      let instance = self.require_token(&marker.token)?;
      let resolver = (marker.cast)(&instance).ok_or_else(|| {
        InjectionError::new(
          InjectionErrorKind::ArgumentType,
          format!("{} is not an argument resolver", marker.token),
        )
      })?;
      resolvers.push(resolver);
    }
    Ok(resolvers)
  }

  fn pipeline(&self, additional: Resolvers) -> Resolvers {
    let mut pipeline = additional;
    match &self.scope {
      Some(scope) => pipeline.extend(scope.resolvers.read().iter().cloned()),
      None => pipeline.extend(self.inner.resolvers.read().iter().cloned()),
    }
    pipeline.push(Arc::new(DefaultArgResolver));
    pipeline
  }

  fn build_registered(&self, registered: &RegisteredType, requested: &TypeToken) -> Result<Instance> {
    let token = registered.construction_token(requested)?;
    let strategy = registered.strategy();
    let span = debug_span!("instantiate", token = %token, %strategy);
    let _enter = span.enter();

    let class = token.class().clone();
    let constructor = constructor_of(&class, &token)?;
    let lookup = TypeVarLookup::new(&token);

    let mut args = self.resolve_arguments(ResolveRequest {
      type_args: token.args().to_vec(),
      strategy: Some(strategy),
      lookup: Some(&lookup),
      immediate: false,
      args: registered.args().to_vec(),
      named_args: registered.named_args().clone(),
      ..ResolveRequest::new(Caller::Class(token.clone()), constructor.signature())
    })?;
    args.stamp(token.clone(), self.clone());
    let instance = constructor.invoke(&mut args)?;

    let owner = self.downgrade();
    for hook in args.hooks() {
      hook.bind(&owner);
    }
    drop(args);

    for hook in registered.before_init() {
      self.call_method(hook, &instance, None)?;
    }
    self.run_init_recursive(&class, &instance, &lookup, &mut HashSet::new())?;
    for hook in registered.after_init() {
      self.call_method(hook, &instance, None)?;
    }

    debug!("instantiated");
    self.inner.registry.notify(&InjectionEvent::Instantiated {
      token,
      strategy,
      instance: instance.clone(),
    });
    Ok(instance)
  }

  // Base classes first, then the class itself. A method shared through
  // several paths runs once.
  fn run_init_recursive(
    &self,
    class: &Class,
    instance: &Instance,
    lookup: &TypeVarLookup,
    seen: &mut HashSet<usize>,
  ) -> Result<()> {
    for base in class.bases() {
      if let Some(upcast) = base.upcast(instance) {
        self.run_init_recursive(&base.class(), &upcast, lookup, seen)?;
      }
    }
    for method in class.init_methods() {
      if seen.insert(method.id()) {
        self.call_method(method, instance, Some(lookup))?;
      }
    }
    Ok(())
  }

  fn call_method(
    &self,
    method: &Function<()>,
    instance: &Instance,
    lookup: Option<&TypeVarLookup>,
  ) -> Result<()> {
    let mut options = CallOptions::new().arg(instance.clone());
    options.lookup = lookup.cloned();
    self.call_with(method, options)
  }

  fn call_strategy(&self) -> Strategy {
    if self.scope.is_some() {
      Strategy::Scoped
    } else {
      Strategy::Singleton
    }
  }

  fn scope_state(&self) -> Result<&Arc<ScopeState>> {
    self.scope.as_ref().ok_or_else(|| {
      InjectionError::new(
        InjectionErrorKind::WrongLifetime,
        "This operation requires a scoped session",
      )
      .into()
    })
  }

  fn active_scope(&self, token: &TypeToken) -> Result<&Arc<ScopeState>> {
    let scope = self.scope.as_ref().ok_or_else(|| {
      InjectionError::new(
        InjectionErrorKind::WrongLifetime,
        "Scoped services can only be instantiated inside a scoped session",
      )
      .in_class(token.to_string())
    })?;
    if scope.closed.load(Ordering::SeqCst) {
      return Err(
        InjectionError::new(
          InjectionErrorKind::WrongLifetime,
          "The scoped session has been closed",
        )
        .in_class(token.to_string())
        .into(),
      );
    }
    Ok(scope)
  }
}

impl fmt::Debug for Injector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Injector")
      .field("types", &self.inner.types.len())
      .field("global_instances", &self.inner.global.len())
      .field("scoped", &self.scope.is_some())
      .finish()
  }
}

// A parameter of type `Injector` receives the injector building the
// instance, or the scoped session when resolved inside one.
impl Injectable for Injector {
  fn describe() -> ClassBuilder<Self> {
    ClassBuilder::new()
  }
}

fn run_pipeline(pipeline: &[Arc<dyn ArgumentResolver>], options: &ArgResolverOptions<'_>) -> Result<(String, Arg)> {
  for resolver in pipeline {
    if resolver.supports(options) {
      return resolver.resolve(options);
    }
  }
  // DefaultArgResolver supports everything and always closes the pipeline.
  Err(
    options
      .error(InjectionErrorKind::NotRegistered, "No argument resolver supports this parameter")
      .into(),
  )
}

fn constructor_of<'a>(class: &'a Class, token: &TypeToken) -> Result<&'a Function<Instance>> {
  class.constructor().ok_or_else(|| {
    InjectionError::new(
      InjectionErrorKind::InvalidRegistration,
      "Type has no constructor and cannot be instantiated",
    )
    .in_class(token.to_string())
    .into()
  })
}

fn present(registered: &RegisteredType, requested: &TypeToken, instance: Instance) -> Result<Instance> {
  let concrete = registered.token().class();
  concrete
    .cast_to(&instance, requested.class())
    .ok_or_else(|| {
      InjectionError::new(
        InjectionErrorKind::ArgumentType,
        format!("Instance of {} cannot be used as {}", concrete, requested),
      )
      .into()
    })
}

fn downcast<T: ?Sized + Any + Send + Sync>(instance: Instance, token: &TypeToken) -> Result<Arc<T>> {
  instance.downcast::<T>().ok_or_else(|| {
    InjectionError::new(
      InjectionErrorKind::ArgumentType,
      format!(
        "Instance holds {}, not {}",
        instance.type_name(),
        type_name::<T>()
      ),
    )
    .in_class(token.to_string())
    .into()
  })
}

fn format_strategies(strategies: &[Strategy]) -> String {
  let names: Vec<&str> = strategies.iter().map(Strategy::as_str).collect();
  match names.split_last() {
    Some((last, rest)) if !rest.is_empty() => format!("{} or {}", rest.join(", "), last),
    Some((last, _)) => (*last).to_owned(),
    None => String::new(),
  }
}
