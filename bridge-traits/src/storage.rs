//! Preference Storage Abstraction
//!
//! User preferences (volume, mute, chosen quality and caption labels) outlive
//! a single player instance. Hosts back this with whatever local storage they
//! have (browser `localStorage`, `UserDefaults`, a settings file).
//!
//! The store is synchronous: the player core runs on a single cooperative
//! thread and persists preferences inline with the state change that
//! produced them.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::{error::Result, platform::PlatformSendSync};

/// Key-value preference storage trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::PreferenceStore;
///
/// fn remember_volume(store: &dyn PreferenceStore, volume: u8) -> Result<()> {
///     store.set_f64("volume", f64::from(volume))
/// }
/// ```
pub trait PreferenceStore: PlatformSendSync {
    fn set_string(&self, key: &str, value: &str) -> Result<()>;

    fn get_string(&self, key: &str) -> Result<Option<String>>;

    fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set_string(key, if value { "true" } else { "false" })
    }

    fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        Ok(self.get_string(key)?.and_then(|v| v.parse().ok()))
    }

    fn set_f64(&self, key: &str, value: f64) -> Result<()> {
        self.set_string(key, &value.to_string())
    }

    fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        Ok(self.get_string(key)?.and_then(|v| v.parse().ok()))
    }

    fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory store for hosts without persistent storage.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.values.write().remove(key);
        Ok(())
    }
}
