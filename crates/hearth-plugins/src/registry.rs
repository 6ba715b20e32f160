//! Capability registry.
//!
//! Answers "which loaded extensions implement capability `T`" and memoizes
//! each answer for the lifetime of the registry.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::capability::{CapabilityType, MARKER, TypeHierarchy};
use crate::error::{PluginError, PluginResult};
use crate::loader::CapabilityInstance;
use crate::plugin::PluginInstance;

/// One extension implementing capability `T`.
pub struct Implementation<T: ?Sized> {
    /// The extension viewed as `T`.
    pub capability: Arc<T>,
    /// The plugin that owns the extension.
    pub plugin: Arc<PluginInstance>,
    /// Dotted name of the extension's unit.
    pub unit: Arc<str>,
}

impl<T: ?Sized> Clone for Implementation<T> {
    fn clone(&self) -> Self {
        Self {
            capability: Arc::clone(&self.capability),
            plugin: Arc::clone(&self.plugin),
            unit: Arc::clone(&self.unit),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Implementation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementation")
            .field("unit", &self.unit)
            .field("plugin", &self.plugin.name())
            .finish_non_exhaustive()
    }
}

/// Cached, thread-safe capability lookup over loaded extensions.
pub struct CapabilityRegistry {
    instances: Arc<[Arc<CapabilityInstance>]>,
    hierarchy: Arc<TypeHierarchy>,
    cache: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl CapabilityRegistry {
    /// A registry over `instances`, matched through `hierarchy`.
    #[must_use]
    pub fn new(instances: Arc<[Arc<CapabilityInstance>]>, hierarchy: Arc<TypeHierarchy>) -> Self {
        Self {
            instances,
            hierarchy,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Every extension implementing `T`, ordered by unit name.
    ///
    /// The first call for each `T` filters all extensions and caches the
    /// result; later calls return the same `Arc`. Concurrent first calls
    /// are serialized, so the filter runs once per `T`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotACapability`] if `T` does not strictly extend
    /// the extension marker, and [`PluginError::InvalidExtension`] if a
    /// matching extension exports no view for `T`.
    pub fn get_implementations<T>(&self) -> PluginResult<Arc<[Implementation<T>]>>
    where
        T: ?Sized + CapabilityType,
    {
        if T::NAME == MARKER || !self.hierarchy.implements(T::EXTENDS, MARKER) {
            return Err(PluginError::NotACapability(T::NAME));
        }

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = cache
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.downcast_ref::<Arc<[Implementation<T>]>>())
        {
            return Ok(Arc::clone(hit));
        }

        let found: Arc<[Implementation<T>]> = self.collect::<T>()?.into();
        debug!(
            capability = T::NAME,
            implementations = found.len(),
            "Cached capability lookup"
        );
        cache.insert(TypeId::of::<T>(), Box::new(Arc::clone(&found)));
        Ok(found)
    }

    fn collect<T>(&self) -> PluginResult<Vec<Implementation<T>>>
    where
        T: ?Sized + CapabilityType,
    {
        let mut found = Vec::new();
        for instance in self.instances.iter() {
            if !self.hierarchy.implements(instance.unit().interfaces(), T::NAME) {
                continue;
            }
            let capability = instance
                .get::<T>()
                .ok_or_else(|| PluginError::InvalidExtension {
                    unit: instance.unit_name().to_owned(),
                    reason: format!("does not export {}", T::NAME),
                })?;
            found.push(Implementation {
                capability,
                plugin: Arc::clone(instance.plugin()),
                unit: instance.unit().shared_name(),
            });
        }
        Ok(found)
    }

    /// All extensions, regardless of capability.
    #[must_use]
    pub fn instances(&self) -> &[Arc<CapabilityInstance>] {
        &self.instances
    }

    /// Number of extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether there are no extensions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("CapabilityRegistry")
            .field("instances", &self.instances.len())
            .field("cached", &cached)
            .finish()
    }
}
