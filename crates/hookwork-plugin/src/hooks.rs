//! Hook registry: actions and filters registered by name with priority ordering.
//!
//! Actions are fired for their side effects; filters thread a value through
//! every registered callback and return the result. Within one name, callbacks
//! run in ascending priority, and callbacks with equal priority run in the
//! order they were registered.
//!
//! Dispatch copies the callback list out of the lock before invoking anything,
//! so callbacks are free to register, remove or dispatch on the same registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use crate::error::CallbackError;

/// Priority used when a plugin does not ask for one.
pub const DEFAULT_PRIORITY: i32 = 10;

/// Signature of an action callback.
pub type ActionFn = dyn Fn(&[Value]) -> Result<(), CallbackError> + Send + Sync;

/// Signature of a filter callback: current value plus extra arguments in,
/// next value out.
pub type FilterFn = dyn Fn(Value, &[Value]) -> Result<Value, CallbackError> + Send + Sync;

/// Shared handle to an action. Removal matches on this handle's identity.
pub type ActionCallback = Arc<ActionFn>;

/// Shared handle to a filter. Removal matches on this handle's identity.
pub type FilterCallback = Arc<FilterFn>;

/// Wrap a closure as an [`ActionCallback`].
pub fn action<F>(f: F) -> ActionCallback
where
    F: Fn(&[Value]) -> Result<(), CallbackError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a [`FilterCallback`].
pub fn filter<F>(f: F) -> FilterCallback
where
    F: Fn(Value, &[Value]) -> Result<Value, CallbackError> + Send + Sync + 'static,
{
    Arc::new(f)
}

struct HookEntry<T: ?Sized> {
    callback: Arc<T>,
    priority: i32,
}

/// Registry of actions and filters, keyed by name.
pub struct HookRegistry {
    /// Hook name → actions sorted by priority.
    actions: RwLock<HashMap<String, Vec<HookEntry<ActionFn>>>>,
    /// Filter name → filters sorted by priority.
    filters: RwLock<HashMap<String, Vec<HookEntry<FilterFn>>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            actions: RwLock::new(HashMap::new()),
            filters: RwLock::new(HashMap::new()),
        }
    }

    // ── Actions ──────────────────────────────────────────────────────

    /// Register an action for `hook`.
    pub fn add_action(&self, hook: &str, callback: ActionCallback, priority: i32) {
        insert(&mut write(&self.actions), hook, callback, priority);
        tracing::debug!(hook = %hook, priority, "action registered");
    }

    /// Run every action registered for `hook`.
    ///
    /// The first callback error stops dispatch and is returned as-is.
    pub fn do_action(&self, hook: &str, args: &[Value]) -> Result<(), CallbackError> {
        let callbacks = snapshot(&read(&self.actions), hook);
        for callback in callbacks {
            callback(args)?;
        }
        Ok(())
    }

    /// Remove the first registration of `callback` under `hook`.
    pub fn remove_action(&self, hook: &str, callback: &ActionCallback) -> bool {
        let removed = remove_first(&mut write(&self.actions), hook, callback);
        if removed {
            tracing::debug!(hook = %hook, "action removed");
        }
        removed
    }

    pub fn has_hook(&self, hook: &str) -> bool {
        read(&self.actions)
            .get(hook)
            .is_some_and(|entries| !entries.is_empty())
    }

    /// Names with at least one action, sorted.
    pub fn get_hooks(&self) -> Vec<String> {
        sorted_names(&read(&self.actions))
    }

    pub fn action_count(&self, hook: &str) -> usize {
        read(&self.actions).get(hook).map_or(0, Vec::len)
    }

    // ── Filters ──────────────────────────────────────────────────────

    /// Register a filter for `name`.
    pub fn add_filter(&self, name: &str, callback: FilterCallback, priority: i32) {
        insert(&mut write(&self.filters), name, callback, priority);
        tracing::debug!(filter = %name, priority, "filter registered");
    }

    /// Fold `value` through every filter registered for `name`.
    ///
    /// Returns `value` untouched when nothing is registered. The first
    /// callback error stops the fold and is returned as-is.
    pub fn apply_filters(
        &self,
        name: &str,
        value: Value,
        args: &[Value],
    ) -> Result<Value, CallbackError> {
        let callbacks = snapshot(&read(&self.filters), name);
        callbacks
            .into_iter()
            .try_fold(value, |acc, callback| callback(acc, args))
    }

    /// Remove the first registration of `callback` under `name`.
    pub fn remove_filter(&self, name: &str, callback: &FilterCallback) -> bool {
        let removed = remove_first(&mut write(&self.filters), name, callback);
        if removed {
            tracing::debug!(filter = %name, "filter removed");
        }
        removed
    }

    pub fn has_filter(&self, name: &str) -> bool {
        read(&self.filters)
            .get(name)
            .is_some_and(|entries| !entries.is_empty())
    }

    /// Names with at least one filter, sorted.
    pub fn get_filters(&self) -> Vec<String> {
        sorted_names(&read(&self.filters))
    }

    pub fn filter_count(&self, name: &str) -> usize {
        read(&self.filters).get(name).map_or(0, Vec::len)
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.get_hooks())
            .field("filters", &self.get_filters())
            .finish()
    }
}

// Callbacks never run under these locks (snapshots are taken in a `let` so
// the guard drops first), so a poisoned guard still holds a consistent table.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn insert<T: ?Sized>(
    table: &mut HashMap<String, Vec<HookEntry<T>>>,
    name: &str,
    callback: Arc<T>,
    priority: i32,
) {
    let entries = table.entry(name.to_string()).or_default();
    entries.push(HookEntry { callback, priority });
    // sort_by_key is stable: equal priorities keep registration order.
    entries.sort_by_key(|e| e.priority);
}

fn snapshot<T: ?Sized>(table: &HashMap<String, Vec<HookEntry<T>>>, name: &str) -> Vec<Arc<T>> {
    table
        .get(name)
        .map(|entries| entries.iter().map(|e| e.callback.clone()).collect())
        .unwrap_or_default()
}

fn remove_first<T: ?Sized>(
    table: &mut HashMap<String, Vec<HookEntry<T>>>,
    name: &str,
    callback: &Arc<T>,
) -> bool {
    let Some(entries) = table.get_mut(name) else {
        return false;
    };
    let Some(pos) = entries
        .iter()
        .position(|e| Arc::ptr_eq(&e.callback, callback))
    else {
        return false;
    };
    entries.remove(pos);
    if entries.is_empty() {
        table.remove(name);
    }
    true
}

fn sorted_names<T: ?Sized>(table: &HashMap<String, Vec<HookEntry<T>>>) -> Vec<String> {
    let mut names: Vec<String> = table.keys().cloned().collect();
    names.sort();
    names
}
