//! Deferred dependencies.
//!
//! A constructor that declares a parameter with [`Parameter::lazy`] may
//! receive a [`LazyHook`] instead of an instance when the dependency is not
//! built yet. The constructor keeps it as a [`Lazy<T>`]; once the owner is
//! fully constructed the injector binds the hook, and the first
//! [`Lazy::get`] resolves the dependency and caches it. Singleton and scoped
//! dependencies are cached weakly, since their context already owns them.
//!
//! [`Parameter::lazy`]: crate::Parameter::lazy

use crate::error::{InjectionError, InjectionErrorKind, Result};
use crate::injector::WeakInjector;
use crate::registration::Strategy;
use crate::types::TypeToken;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::any::{type_name, Any};
use std::fmt;
use std::sync::{Arc, Weak};

/// A placeholder for a dependency that is resolved on first access.
#[derive(Clone)]
pub struct LazyHook {
  token: TypeToken,
  binding: Arc<OnceCell<WeakInjector>>,
}

impl LazyHook {
  pub(crate) fn new(token: TypeToken) -> Self {
    Self {
      token,
      binding: Arc::new(OnceCell::new()),
    }
  }

  /// The token of the deferred dependency. Always readable.
  pub fn token(&self) -> &TypeToken {
    &self.token
  }

  /// True once the owning instance finished construction.
  pub fn is_bound(&self) -> bool {
    self.binding.get().is_some()
  }

  pub(crate) fn bind(&self, owner: &WeakInjector) {
    let _ = self.binding.set(owner.clone());
  }
}

impl fmt::Debug for LazyHook {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "LazyHook({}, bound: {})", self.token, self.is_bound())
  }
}

enum Held<T: ?Sized> {
  Strong(Arc<T>),
  Weak(Weak<T>),
}

impl<T: ?Sized> Held<T> {
  fn upgrade(&self) -> Option<Arc<T>> {
    match self {
      Held::Strong(value) => Some(Arc::clone(value)),
      Held::Weak(value) => value.upgrade(),
    }
  }
}

impl<T: ?Sized> Clone for Held<T> {
  fn clone(&self) -> Self {
    match self {
      Held::Strong(value) => Held::Strong(Arc::clone(value)),
      Held::Weak(value) => Held::Weak(Weak::clone(value)),
    }
  }
}

/// A dependency that is either available or resolved on first use.
pub struct Lazy<T: ?Sized> {
  token: Option<TypeToken>,
  binding: Option<Arc<OnceCell<WeakInjector>>>,
  value: Mutex<Option<Held<T>>>,
}

impl<T: ?Sized + Any + Send + Sync> Lazy<T> {
  pub(crate) fn resolved(token: Option<TypeToken>, value: Arc<T>) -> Self {
    Self {
      token,
      binding: None,
      value: Mutex::new(Some(Held::Strong(value))),
    }
  }

  pub(crate) fn hooked(hook: &LazyHook) -> Self {
    Self {
      token: Some(hook.token.clone()),
      binding: Some(Arc::clone(&hook.binding)),
      value: Mutex::new(None),
    }
  }

  /// The token the dependency was requested as, when known.
  pub fn token(&self) -> Option<&TypeToken> {
    self.token.as_ref()
  }

  /// True while a resolved value is cached and still alive.
  pub fn is_resolved(&self) -> bool {
    self
      .value
      .lock()
      .as_ref()
      .and_then(Held::upgrade)
      .is_some()
  }

  /// Returns the dependency, resolving it through the owning injector the
  /// first time, or again once a weakly cached value has been released.
  pub fn get(&self) -> Result<Arc<T>> {
    let mut held = self.value.lock();
    if let Some(value) = held.as_ref().and_then(Held::upgrade) {
      return Ok(value);
    }
    let (value, strategy) = self.resolve()?;
    *held = Some(match strategy {
      Strategy::Transient => Held::Strong(Arc::clone(&value)),
      Strategy::Singleton | Strategy::Scoped => Held::Weak(Arc::downgrade(&value)),
    });
    Ok(value)
  }

  fn resolve(&self) -> Result<(Arc<T>, Strategy)> {
    let label = self
      .token
      .as_ref()
      .map(ToString::to_string)
      .unwrap_or_else(|| type_name::<T>().to_owned());

    let owner = self
      .binding
      .as_ref()
      .and_then(|binding| binding.get())
      .ok_or_else(|| {
        InjectionError::new(
          InjectionErrorKind::UnresolvedHook,
          format!(
            "Tried accessing injected instance {} before its owner finished construction",
            label
          ),
        )
        .in_class(label.clone())
      })?;

    let injector = owner.upgrade().ok_or_else(|| {
      InjectionError::new(
        InjectionErrorKind::InjectorDropped,
        "The injector owning this lazy dependency has been dropped",
      )
      .in_class(label.clone())
    })?;

    let token = match &self.token {
      Some(token) => token,
      None => {
        return Err(
          InjectionError::new(InjectionErrorKind::UnresolvedHook, "Lazy dependency has no token")
            .in_class(label)
            .into(),
        )
      }
    };
    let (instance, strategy) = injector.resolve_proxy(token)?;
    let value = instance.downcast::<T>().ok_or_else(|| {
      InjectionError::new(
        InjectionErrorKind::ArgumentType,
        format!("Resolved {} is not a {}", instance.type_name(), type_name::<T>()),
      )
      .in_class(label)
    })?;
    Ok((value, strategy))
  }
}

impl<T: ?Sized> Clone for Lazy<T> {
  fn clone(&self) -> Self {
    Self {
      token: self.token.clone(),
      binding: self.binding.clone(),
      value: Mutex::new(self.value.lock().clone()),
    }
  }
}

impl<T: ?Sized> fmt::Debug for Lazy<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Lazy")
      .field("token", &self.token)
      .field("resolved", &self.value.lock().is_some())
      .finish()
  }
}
