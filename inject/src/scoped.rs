//! Scoped sessions.

use crate::core::Instance;
use crate::injector::Injector;
use crate::types::TypeToken;
use std::fmt;
use std::ops::Deref;

/// An injector handle with its own scoped context.
///
/// Scoped registrations resolved through this handle live as long as the
/// session. Singletons still come from the shared global context. The
/// session closes when the handle is dropped or [`ScopedInjector::close`]
/// is called; scoped instances are released then.
///
/// ```
/// use fibre_inject::{Injector, Registry};
///
/// let injector = Injector::new(Registry::new()).unwrap();
/// let session = injector.get_scoped_session().unwrap();
/// assert!(session.is_scoped());
/// session.close();
/// ```
pub struct ScopedInjector {
  injector: Injector,
}

impl ScopedInjector {
  pub(crate) fn new(injector: Injector) -> Self {
    Self { injector }
  }

  /// A cloneable handle to this session. Clones stay valid after the
  /// session closes but can no longer build scoped instances.
  pub fn injector(&self) -> &Injector {
    &self.injector
  }

  /// The instances held by this session's scoped context.
  pub fn instances(&self) -> Vec<(TypeToken, Instance)> {
    self.injector.scoped_instances()
  }

  pub fn close(self) {}
}

impl Deref for ScopedInjector {
  type Target = Injector;

  fn deref(&self) -> &Injector {
    &self.injector
  }
}

impl Drop for ScopedInjector {
  fn drop(&mut self) {
    self.injector.close_scope();
  }
}

impl fmt::Debug for ScopedInjector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ScopedInjector")
      .field("instances", &self.instances().len())
      .finish()
  }
}
