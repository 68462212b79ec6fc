//! Alias registry: human names for canonical device ids

use std::collections::BTreeMap;

use parking_lot::RwLock;

use bridge_store::DocumentStore;

use crate::error::{Error, Result};
use crate::model::DeviceId;

/// Bidirectional mapping between device ids and user-assigned names.
///
/// Names are globally unique across the registry: two devices can never
/// share a name, which keeps resolution unambiguous. Assignment is
/// append-only; there is no rename or removal.
pub struct AliasRegistry {
    aliases: RwLock<BTreeMap<DeviceId, Vec<String>>>,
    store: DocumentStore<BTreeMap<DeviceId, Vec<String>>>,
}

impl AliasRegistry {
    /// Hydrate the registry from its backing store.
    pub fn open(store: DocumentStore<BTreeMap<DeviceId, Vec<String>>>) -> Self {
        let aliases = store.load_or_default();
        Self {
            aliases: RwLock::new(aliases),
            store,
        }
    }

    /// Assign a name to a device, returning the device's full alias list.
    ///
    /// Fails with [`Error::Conflict`] when the name already belongs to a
    /// different device. Re-assigning a name its owner already has is a
    /// no-op. The write-through save is logged on failure, never
    /// propagated - the in-memory assignment stands.
    pub fn assign(&self, id: DeviceId, name: &str) -> Result<Vec<String>> {
        let mut aliases = self.aliases.write();

        if let Some(owner) = owner_of(&aliases, name) {
            if owner != id {
                return Err(Error::Conflict {
                    name: name.to_string(),
                    owner,
                });
            }
            return Ok(aliases[&id].clone());
        }

        let names = aliases.entry(id).or_default();
        names.push(name.to_string());
        let result = names.clone();

        if let Err(e) = self.store.save(&aliases) {
            tracing::error!("alias store write failed: {e}");
        }
        Ok(result)
    }

    /// Resolve an identifier to a canonical device id string.
    ///
    /// A string already matching the canonical pattern passes through
    /// unchanged; otherwise the registry is scanned for a matching alias.
    /// An unrecognized identifier is returned as-is so a well-formed raw
    /// id stays usable even when nothing is registered for it.
    pub fn resolve(&self, identifier: &str) -> String {
        if identifier.parse::<DeviceId>().is_ok() {
            return identifier.to_string();
        }

        let aliases = self.aliases.read();
        for (id, names) in aliases.iter() {
            if names.iter().any(|n| n == identifier) {
                return id.to_string();
            }
        }
        identifier.to_string()
    }

    /// All aliases for one device.
    pub fn names_for(&self, id: &DeviceId) -> Vec<String> {
        self.aliases.read().get(id).cloned().unwrap_or_default()
    }
}

fn owner_of(aliases: &BTreeMap<DeviceId, Vec<String>>, name: &str) -> Option<DeviceId> {
    aliases
        .iter()
        .find(|(_, names)| names.iter().any(|n| n == name))
        .map(|(id, _)| *id)
}
