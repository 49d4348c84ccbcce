//! The explicit registry of injectables, argument resolvers and event
//! callbacks an [`Injector`](crate::Injector) is built from.

use crate::core::Instance;
use crate::registration::{InjectableOptions, Strategy};
use crate::resolver::ArgumentResolver;
use crate::types::{ClassBuilder, Injectable, TypeToken};
use std::fmt;
use std::sync::Arc;

/// Something observable that happened inside an injector.
#[derive(Debug, Clone)]
pub enum InjectionEvent {
  /// A registered class finished construction and initialization.
  Instantiated {
    token: TypeToken,
    strategy: Strategy,
    instance: Instance,
  },
  /// A scoped session was created.
  SessionOpened,
  /// A scoped session was closed and its instances released.
  SessionClosed,
}

pub type InjectionCallback = Arc<dyn Fn(&InjectionEvent) + Send + Sync>;

type ResolverCast = fn(&Instance) -> Option<Arc<dyn ArgumentResolver>>;

#[derive(Clone)]
pub(crate) struct InjectableMarker {
  pub(crate) super_token: Option<TypeToken>,
  pub(crate) token: TypeToken,
  pub(crate) options: InjectableOptions,
}

#[derive(Clone)]
pub(crate) struct ResolverMarker {
  pub(crate) token: TypeToken,
  pub(crate) priority: i32,
  pub(crate) scoped: bool,
  pub(crate) cast: ResolverCast,
}

fn cast_resolver<R: ArgumentResolver + Injectable>(
  instance: &Instance,
) -> Option<Arc<dyn ArgumentResolver>> {
  instance
    .downcast::<R>()
    .map(|resolver| resolver as Arc<dyn ArgumentResolver>)
}

/// Collects registration markers before an injector is built.
///
/// Several independent registries, and therefore injectors, may coexist.
#[derive(Clone, Default)]
pub struct Registry {
  injectables: Vec<InjectableMarker>,
  resolvers: Vec<ResolverMarker>,
  callbacks: Vec<InjectionCallback>,
}

impl Registry {
  pub fn new() -> Self {
    Self::default()
  }

  // --- PUBLIC API ---

  /// Marks `T` as injectable under its own class.
  ///
  /// For a generic `T` without a match-all flag use
  /// [`Registry::injectable_token`] with explicit arguments.
  pub fn injectable<T: Injectable>(&mut self, options: InjectableOptions) -> &mut Self {
    let token = TypeToken::unbound::<T>();
    self.injectables.push(InjectableMarker {
      super_token: None,
      token,
      options,
    });
    self
  }

  /// Marks a concrete token as injectable, optionally under a super token.
  pub fn injectable_token(
    &mut self,
    super_token: Option<TypeToken>,
    token: TypeToken,
    options: InjectableOptions,
  ) -> &mut Self {
    self.injectables.push(InjectableMarker {
      super_token,
      token,
      options,
    });
    self
  }

  /// Marks `T` as injectable under the interface or base `S`.
  pub fn injectable_as<S: ?Sized + Injectable, T: Injectable>(
    &mut self,
    options: InjectableOptions,
  ) -> &mut Self {
    self.injectables.push(InjectableMarker {
      super_token: Some(TypeToken::unbound::<S>()),
      token: TypeToken::unbound::<T>(),
      options,
    });
    self
  }

  /// Registers an argument resolver. Resolvers run in ascending priority
  /// order; scoped resolvers only take part in scoped sessions.
  pub fn arg_resolver<R: ArgumentResolver + Injectable>(
    &mut self,
    priority: i32,
    scoped: bool,
  ) -> &mut Self {
    let token = TypeToken::unbound::<R>();
    let strategy = if scoped {
      Strategy::Scoped
    } else {
      Strategy::Singleton
    };
    self.injectables.push(InjectableMarker {
      super_token: None,
      token: token.clone(),
      options: InjectableOptions::new(strategy),
    });
    self.resolvers.push(ResolverMarker {
      token,
      priority,
      scoped,
      cast: cast_resolver::<R>,
    });
    self
  }

  /// Subscribes to [`InjectionEvent`]s of every injector built from this
  /// registry.
  pub fn on_event(
    &mut self,
    callback: impl Fn(&InjectionEvent) + Send + Sync + 'static,
  ) -> &mut Self {
    self.callbacks.push(Arc::new(callback));
    self
  }

  pub fn len(&self) -> usize {
    self.injectables.len()
  }

  pub fn is_empty(&self) -> bool {
    self.injectables.is_empty()
  }

  // --- CRATE API ---

  pub(crate) fn injectables(&self) -> &[InjectableMarker] {
    &self.injectables
  }

  pub(crate) fn resolvers(&self) -> &[ResolverMarker] {
    &self.resolvers
  }

  pub(crate) fn notify(&self, event: &InjectionEvent) {
    for callback in &self.callbacks {
      callback(event);
    }
  }
}

impl fmt::Debug for Registry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Registry")
      .field("injectables", &self.injectables.len())
      .field("resolvers", &self.resolvers.len())
      .field("callbacks", &self.callbacks.len())
      .finish()
  }
}

// The registry is the injector's source of truth and is itself injectable.
impl Injectable for Registry {
  fn describe() -> ClassBuilder<Self> {
    ClassBuilder::new()
  }
}
