//! Plugin identity and per-plugin shared state.

use std::any::Any;
use std::fmt;
use std::sync::{PoisonError, RwLock};

/// Identity of one loaded plugin. Bundles are identified by name only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginInfo {
    /// Plugin name: the archive file stem, or the dev project name without
    /// its `-plugin` suffix.
    pub name: String,
}

/// One plugin's identity plus a mutable slot shared by all of its capabilities.
///
/// Each discovered bundle gets exactly one `PluginInstance`, shared as an
/// `Arc` by every capability instance defined in that bundle. The state slot
/// is untyped: capabilities of the same plugin agree on what they store in
/// it. Instances are never shared across plugins.
pub struct PluginInstance {
    info: PluginInfo,
    state: RwLock<Option<Box<dyn Any + Send + Sync>>>,
}

impl PluginInstance {
    /// Create a plugin with an empty state slot.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            info: PluginInfo { name: name.into() },
            state: RwLock::new(None),
        }
    }

    /// The plugin's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// The plugin's identity.
    #[must_use]
    pub fn info(&self) -> &PluginInfo {
        &self.info
    }

    /// Replace the state slot, returning the previous value.
    pub fn set_state<S: Any + Send + Sync>(&self, state: S) -> Option<Box<dyn Any + Send + Sync>> {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Box::new(state))
    }

    /// Empty the state slot, returning its value.
    pub fn take_state(&self) -> Option<Box<dyn Any + Send + Sync>> {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Whether the state slot holds a value.
    #[must_use]
    pub fn has_state(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Read the state as `S`. `f` receives `None` if the slot is empty or
    /// holds another type.
    pub fn with_state<S: Any, R>(&self, f: impl FnOnce(Option<&S>) -> R) -> R {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(guard.as_ref().and_then(|s| s.downcast_ref::<S>()))
    }

    /// Mutate the state as `S`, initializing an empty slot with `S::default()`.
    ///
    /// Returns `None` without calling `f` if the slot holds another type.
    pub fn update_state<S, R>(&self, f: impl FnOnce(&mut S) -> R) -> Option<R>
    where
        S: Any + Send + Sync + Default,
    {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let slot = guard.get_or_insert_with(|| Box::new(S::default()));
        slot.downcast_mut::<S>().map(f)
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("name", &self.info.name)
            .field("has_state", &self.has_state())
            .finish()
    }
}
