//! Core data structures shared by the injector: type-erased instances and the
//! per-thread resolution chain used to detect circular dependencies.

use crate::error::{InjectionError, InjectionErrorKind};
use crate::types::TypeToken;
use std::any::{type_name, Any};
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

/// A type-erased, shared service instance.
///
/// The inner value is always an `Arc<T>` boxed as `Any`, so `T` may be an
/// unsized trait object such as `dyn Greeter`.
#[derive(Clone)]
pub struct Instance {
  value: Arc<dyn Any + Send + Sync>,
  type_name: &'static str,
}

impl Instance {
  pub fn new<T: Any + Send + Sync>(value: T) -> Self {
    Self::from_arc(Arc::new(value))
  }

  pub fn from_arc<T: ?Sized + Any + Send + Sync>(value: Arc<T>) -> Self {
    Self {
      value: Arc::new(value),
      type_name: type_name::<T>(),
    }
  }

  /// Returns the shared value if this instance holds a `T`.
  pub fn downcast<T: ?Sized + Any + Send + Sync>(&self) -> Option<Arc<T>> {
    self.value.downcast_ref::<Arc<T>>().cloned()
  }

  pub fn is<T: ?Sized + Any + Send + Sync>(&self) -> bool {
    self.value.is::<Arc<T>>()
  }

  /// The Rust type name of the held value.
  pub fn type_name(&self) -> &'static str {
    self.type_name
  }
}

impl fmt::Debug for Instance {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Instance({})", self.type_name)
  }
}

thread_local! {
  // The ordered chain of classes and functions currently being resolved on
  // this thread. Re-entering a frame already on the chain is a cycle.
  static RESOLUTION_CHAIN: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

#[derive(Clone, PartialEq, Eq)]
pub(crate) enum FrameKey {
  Type(TypeToken),
  Function(usize),
}

#[derive(Clone)]
pub(crate) struct Frame {
  key: FrameKey,
  label: String,
}

impl Frame {
  pub(crate) fn class(token: &TypeToken) -> Self {
    Self {
      key: FrameKey::Type(token.clone()),
      label: token.to_string(),
    }
  }

  pub(crate) fn function(id: usize, name: &str) -> Self {
    Self {
      key: FrameKey::Function(id),
      label: name.to_owned(),
    }
  }
}

/// An RAII guard that pushes a frame onto the thread's resolution chain.
///
/// Entering a frame that is already on the chain, or growing the chain past
/// the configured depth, fails with a circular dependency error. Dropping the
/// guard pops the chain back to where it was.
pub(crate) struct ResolutionGuard {
  depth: usize,
}

impl ResolutionGuard {
  pub(crate) fn enter(frame: Frame, max_depth: usize) -> Result<Self, InjectionError> {
    RESOLUTION_CHAIN.with(|chain| {
      let mut chain = chain.borrow_mut();
      let describe = |chain: &[Frame], last: &Frame| {
        let mut labels: Vec<&str> = chain.iter().map(|f| f.label.as_str()).collect();
        labels.push(&last.label);
        labels.join(" -> ")
      };

      if chain.iter().any(|f| f.key == frame.key) {
        let origin = chain.first().map(|f| f.label.clone()).unwrap_or_default();
        return Err(
          InjectionError::new(
            InjectionErrorKind::CircularDependency,
            format!(
              "A circular call has been detected: {}",
              describe(&chain, &frame)
            ),
          )
          .in_class(origin),
        );
      }
      if chain.len() >= max_depth {
        let origin = chain.first().map(|f| f.label.clone()).unwrap_or_default();
        return Err(
          InjectionError::new(
            InjectionErrorKind::CircularDependency,
            format!(
              "Maximum resolution depth of {} reached: {}",
              max_depth,
              describe(&chain, &frame)
            ),
          )
          .in_class(origin),
        );
      }

      let depth = chain.len();
      chain.push(frame);
      Ok(Self { depth })
    })
  }
}

/// Labels of the frames currently on this thread's resolution chain.
pub(crate) fn current_chain() -> Vec<String> {
  RESOLUTION_CHAIN.with(|chain| chain.borrow().iter().map(|f| f.label.clone()).collect())
}

impl Drop for ResolutionGuard {
  fn drop(&mut self) {
    RESOLUTION_CHAIN.with(|chain| {
      chain.borrow_mut().truncate(self.depth);
    });
  }
}
