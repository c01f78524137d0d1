//! Model lifecycle hooks.
//!
//! Hooks are registered on an explicit [`HookRegistry`] instance rather
//! than in process-wide state; whoever performs model mutations decides
//! which registry applies.

use crate::Result;
use crate::model::ModelDescriptor;
use crate::row::Row;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Points in a model's mutation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelHook {
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
    BeforeRestore,
    AfterRestore,
}

impl ModelHook {
    /// Whether returning `Err` from this hook aborts the operation.
    pub const fn is_before(self) -> bool {
        matches!(
            self,
            ModelHook::BeforeCreate
                | ModelHook::BeforeUpdate
                | ModelHook::BeforeDelete
                | ModelHook::BeforeRestore
        )
    }
}

/// What a hook callback receives.
#[derive(Debug, Clone, Copy)]
pub struct HookEvent<'a> {
    pub hook: ModelHook,
    pub model: &'static str,
    /// The operation that fired the hook, e.g. `"create"` or `"delete_all"`.
    pub method: &'static str,
    /// Rows being written or changes being applied.
    pub rows: &'a [Row],
    /// Primary key values targeted by the operation.
    pub ids: &'a [Value],
}

/// A registered hook callback.
pub type HookFn = Arc<dyn Fn(&HookEvent<'_>) -> Result<()> + Send + Sync>;

/// Registry of lifecycle callbacks keyed by model and hook.
#[derive(Default, Clone)]
pub struct HookRegistry {
    hooks: HashMap<(&'static str, ModelHook), Vec<HookFn>>,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut counts: Vec<_> = self
            .hooks
            .iter()
            .map(|((model, hook), fns)| (*model, *hook, fns.len()))
            .collect();
        counts.sort_by_key(|(model, hook, _)| (*model, format!("{hook:?}")));
        f.debug_struct("HookRegistry").field("hooks", &counts).finish()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `hook` on `model`.
    ///
    /// Registering the same `Arc` twice is a no-op.
    pub fn hook(&mut self, model: &ModelDescriptor, hook: ModelHook, callback: HookFn) {
        let entry = self.hooks.entry((model.name, hook)).or_default();
        if !entry.iter().any(|f| Arc::ptr_eq(f, &callback)) {
            entry.push(callback);
        }
    }

    /// Remove a previously registered callback. Returns whether it was found.
    pub fn unhook(&mut self, model: &ModelDescriptor, hook: ModelHook, callback: &HookFn) -> bool {
        let Some(entry) = self.hooks.get_mut(&(model.name, hook)) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|f| !Arc::ptr_eq(f, callback));
        before != entry.len()
    }

    /// Number of callbacks registered for `hook` on `model`.
    pub fn count(&self, model: &ModelDescriptor, hook: ModelHook) -> usize {
        self.hooks.get(&(model.name, hook)).map_or(0, Vec::len)
    }

    /// Run every callback for the event, in registration order.
    ///
    /// The first error stops the remaining callbacks and is returned.
    #[allow(clippy::result_large_err)]
    pub fn fire(&self, event: &HookEvent<'_>) -> Result<()> {
        let Some(callbacks) = self.hooks.get(&(event.model, event.hook)) else {
            return Ok(());
        };
        tracing::trace!(
            model = event.model,
            hook = ?event.hook,
            method = event.method,
            callbacks = callbacks.len(),
            "Firing model hook"
        );
        for cb in callbacks {
            cb(event)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::Mutex;

    static USER: ModelDescriptor = ModelDescriptor::new("User");

    fn event(hook: ModelHook) -> HookEvent<'static> {
        HookEvent {
            hook,
            model: "User",
            method: "create",
            rows: &[],
            ids: &[],
        }
    }

    #[test]
    fn fires_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            registry.hook(
                &USER,
                ModelHook::BeforeCreate,
                Arc::new(move |e: &HookEvent<'_>| -> Result<()> {
                    seen.lock().unwrap().push((tag, e.method));
                    Ok(())
                }),
            );
        }
        registry.fire(&event(ModelHook::BeforeCreate)).unwrap();
        registry.fire(&event(ModelHook::AfterCreate)).unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("first", "create"), ("second", "create")]
        );
    }

    #[test]
    fn duplicate_registration_and_unhook() {
        let cb: HookFn = Arc::new(|_: &HookEvent<'_>| -> Result<()> { Ok(()) });
        let mut registry = HookRegistry::new();
        registry.hook(&USER, ModelHook::AfterDelete, Arc::clone(&cb));
        registry.hook(&USER, ModelHook::AfterDelete, Arc::clone(&cb));
        assert_eq!(registry.count(&USER, ModelHook::AfterDelete), 1);
        assert!(registry.unhook(&USER, ModelHook::AfterDelete, &cb));
        assert!(!registry.unhook(&USER, ModelHook::AfterDelete, &cb));
        assert_eq!(registry.count(&USER, ModelHook::AfterDelete), 0);
    }

    #[test]
    fn before_hooks_are_the_aborting_ones() {
        assert!(ModelHook::BeforeCreate.is_before());
        assert!(ModelHook::BeforeRestore.is_before());
        assert!(!ModelHook::AfterCreate.is_before());
        assert!(!ModelHook::AfterDelete.is_before());
    }

    #[test]
    fn error_stops_chain() {
        let mut registry = HookRegistry::new();
        registry.hook(
            &USER,
            ModelHook::BeforeUpdate,
            Arc::new(|_: &HookEvent<'_>| -> Result<()> {
                Err(Error::Hook("read only".to_string()))
            }),
        );
        let err = registry.fire(&event(ModelHook::BeforeUpdate)).unwrap_err();
        assert!(matches!(err, Error::Hook(msg) if msg == "read only"));
    }
}
