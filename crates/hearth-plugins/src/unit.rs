//! Code unit descriptors and defined units.
//!
//! A unit blob is a JSON descriptor naming the unit's kind, its modifiers,
//! the interfaces it implements (or extends), the other units it links
//! against, and the symbol of its zero-argument constructor.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PluginError, PluginResult};
use crate::plugin::PluginInstance;

/// Whether a unit is a class or an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// An instantiable (unless abstract) unit.
    Class,
    /// A capability interface; never instantiated.
    Interface,
}

/// Parsed form of a unit blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitDescriptor {
    /// Class or interface.
    pub kind: UnitKind,
    /// The unit cannot be subclassed.
    #[serde(default, rename = "final")]
    pub is_final: bool,
    /// The unit cannot be instantiated.
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    /// Interfaces this unit implements (classes) or extends (interfaces).
    #[serde(default)]
    pub interfaces: Vec<String>,
    /// Other units this unit links against.
    #[serde(default)]
    pub references: Vec<String>,
    /// Symbol of the registered zero-argument constructor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructor: Option<String>,
}

impl UnitDescriptor {
    /// An open, non-abstract class with no interfaces.
    #[must_use]
    pub fn class() -> Self {
        Self {
            kind: UnitKind::Class,
            is_final: false,
            is_abstract: false,
            interfaces: Vec::new(),
            references: Vec::new(),
            constructor: None,
        }
    }

    /// An interface with no super-interfaces.
    #[must_use]
    pub fn interface() -> Self {
        Self {
            kind: UnitKind::Interface,
            ..Self::class()
        }
    }

    /// Parse the blob of unit `name`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidUnit`] if the blob is not a valid descriptor.
    pub fn parse(name: &str, blob: &[u8]) -> PluginResult<Self> {
        serde_json::from_slice(blob).map_err(|e| PluginError::InvalidUnit {
            name: name.to_owned(),
            message: e.to_string(),
        })
    }

    /// Encode the descriptor as a unit blob.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidUnit`] if serialization fails.
    pub fn to_blob(&self, name: &str) -> PluginResult<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| PluginError::InvalidUnit {
            name: name.to_owned(),
            message: e.to_string(),
        })
    }

    /// A class that is neither abstract nor an interface.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        self.kind == UnitKind::Class && !self.is_abstract
    }
}

/// A unit defined into the loading context, tagged with its owning plugin.
#[derive(Debug)]
pub struct DefinedUnit {
    name: Arc<str>,
    descriptor: UnitDescriptor,
    plugin: Arc<PluginInstance>,
}

impl DefinedUnit {
    pub(crate) fn new(name: &str, descriptor: UnitDescriptor, plugin: Arc<PluginInstance>) -> Self {
        Self {
            name: Arc::from(name),
            descriptor,
            plugin,
        }
    }

    /// Dotted unit name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// The parsed descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &UnitDescriptor {
        &self.descriptor
    }

    /// The plugin whose bundle defined this unit.
    #[must_use]
    pub fn plugin(&self) -> &Arc<PluginInstance> {
        &self.plugin
    }

    /// Interfaces this unit directly implements or extends.
    #[must_use]
    pub fn interfaces(&self) -> &[String] {
        &self.descriptor.interfaces
    }

    /// Whether this unit is an interface.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.descriptor.kind == UnitKind::Interface
    }
}
