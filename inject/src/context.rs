//! Instance stores: one global context per injector, one per scoped session.

use crate::core::{self, Instance};
use crate::error::{InjectionError, InjectionErrorKind, Result};
use crate::injector::WeakInjector;
use crate::types::TypeToken;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread::{self, ThreadId};

enum Slot {
  /// A cell filled at most once, shared by every thread asking for it.
  Shared(Arc<OnceCell<Instance>>),
  /// The owning injector itself, held weakly.
  Container(WeakInjector),
}

/// A flat `TypeToken -> instance` store.
#[derive(Default)]
pub struct InjectionContext {
  slots: DashMap<TypeToken, Slot>,
  builds: Arc<BuildTracker>,
}

impl InjectionContext {
  pub fn new() -> Self {
    Self::default()
  }

  /// A fresh context whose builds are tracked together with `other`'s, so
  /// a cycle running through both is detected across threads.
  pub(crate) fn sharing_builds_with(other: &InjectionContext) -> Self {
    Self {
      slots: DashMap::new(),
      builds: Arc::clone(&other.builds),
    }
  }

  pub fn has_instance(&self, token: &TypeToken) -> bool {
    self.get_instance(token).is_some()
  }

  pub fn get_instance(&self, token: &TypeToken) -> Option<Instance> {
    let slot = self.slots.get(token)?;
    match &*slot {
      Slot::Shared(cell) => cell.get().cloned(),
      Slot::Container(container) => container.upgrade().map(Instance::new),
    }
  }

  /// Stores a finished instance, replacing anything held under `token`.
  pub fn set_instance(&self, token: TypeToken, instance: Instance) {
    self
      .slots
      .insert(token, Slot::Shared(Arc::new(OnceCell::with_value(instance))));
  }

  pub(crate) fn set_container(&self, token: TypeToken, container: WeakInjector) {
    self.slots.insert(token, Slot::Container(container));
  }

  /// Returns the instance stored under `token`, building it with `init`
  /// first if needed. Concurrent callers for the same token wait for a
  /// single build; a failed build leaves the slot empty.
  pub(crate) fn get_or_try_init(
    &self,
    token: &TypeToken,
    init: impl FnOnce() -> Result<Instance>,
  ) -> Result<Instance> {
    let cell = {
      let slot = self
        .slots
        .entry(token.clone())
        .or_insert_with(|| Slot::Shared(Arc::new(OnceCell::new())));
      match &*slot {
        Slot::Shared(cell) => Arc::clone(cell),
        Slot::Container(container) => {
          return container.upgrade().map(Instance::new).ok_or_else(|| {
            InjectionError::new(
              InjectionErrorKind::InjectorDropped,
              "The injector stored in this context has been dropped",
            )
            .in_class(token.to_string())
            .into()
          })
        }
      }
    };
    // The shard lock is released before `init` runs, so building may
    // freely touch other slots of this context.
    let _build = self.builds.claim(&cell, token)?;
    cell.get_or_try_init(init).cloned()
  }

  /// Every finished instance, in no particular order.
  pub fn instances(&self) -> Vec<(TypeToken, Instance)> {
    self
      .slots
      .iter()
      .filter_map(|entry| {
        let instance = match entry.value() {
          Slot::Shared(cell) => cell.get().cloned(),
          Slot::Container(container) => container.upgrade().map(Instance::new),
        };
        instance.map(|instance| (entry.key().clone(), instance))
      })
      .collect()
  }

  pub fn len(&self) -> usize {
    self.slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.slots.is_empty()
  }

  pub fn clear(&self) {
    self.slots.clear();
  }
}

struct Build {
  thread: ThreadId,
  label: String,
}

#[derive(Default)]
struct BuildState {
  /// Cell address -> the thread currently building it.
  building: HashMap<usize, Build>,
  /// Thread -> the cell address it is blocked on.
  waiting: HashMap<ThreadId, usize>,
}

impl BuildState {
  /// Follows the wait-for edges starting at `owner`. Returns the labels of
  /// the cells on the path when it leads back to `me`.
  fn wait_path(&self, mut owner: ThreadId, me: ThreadId) -> Option<Vec<String>> {
    let mut labels = Vec::new();
    let mut visited = HashSet::new();
    while visited.insert(owner) {
      let cell = self.waiting.get(&owner)?;
      let build = self.building.get(cell)?;
      labels.push(build.label.clone());
      if build.thread == me {
        return Some(labels);
      }
      owner = build.thread;
    }
    None
  }
}

/// Serializes the builds of empty cells and keeps a wait-for graph of the
/// threads blocked on them. A wait that would close a cycle fails instead.
#[derive(Default)]
pub(crate) struct BuildTracker {
  state: Mutex<BuildState>,
  finished: Condvar,
}

impl BuildTracker {
  /// Waits until no other thread is building `cell`, then marks it as built
  /// by this thread until the returned claim is dropped.
  fn claim<'a>(&'a self, cell: &Arc<OnceCell<Instance>>, token: &TypeToken) -> Result<BuildClaim<'a>> {
    let key = Arc::as_ptr(cell) as usize;
    let me = thread::current().id();
    let mut state = self.state.lock();
    loop {
      let owner = match state.building.get(&key) {
        None => break,
        Some(build) => build.thread,
      };
      if cell.get().is_some() {
        return Ok(BuildClaim { tracker: None, key });
      }
      let path = if owner == me {
        Some(Vec::new())
      } else {
        state.wait_path(owner, me)
      };
      if let Some(path) = path {
        let mut chain = core::current_chain();
        let origin = chain.first().cloned().unwrap_or_else(|| token.to_string());
        chain.extend(path);
        return Err(
          InjectionError::new(
            InjectionErrorKind::CircularDependency,
            format!(
              "A circular call has been detected: {}",
              chain.join(" -> ")
            ),
          )
          .in_class(origin)
          .into(),
        );
      }
      state.waiting.insert(me, key);
      self.finished.wait(&mut state);
      state.waiting.remove(&me);
    }
    if cell.get().is_none() {
      state.building.insert(
        key,
        Build {
          thread: me,
          label: token.to_string(),
        },
      );
      return Ok(BuildClaim {
        tracker: Some(self),
        key,
      });
    }
    Ok(BuildClaim { tracker: None, key })
  }
}

/// Releases a build claim, waking the threads waiting on it.
struct BuildClaim<'a> {
  tracker: Option<&'a BuildTracker>,
  key: usize,
}

impl Drop for BuildClaim<'_> {
  fn drop(&mut self) {
    if let Some(tracker) = self.tracker {
      tracker.state.lock().building.remove(&self.key);
      tracker.finished.notify_all();
    }
  }
}
