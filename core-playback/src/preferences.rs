//! Persisted user preferences.
//!
//! Volume, mute, and the labels of the last chosen quality level and caption
//! track survive across player instances through an optional
//! [`PreferenceStore`]. Storage failures are logged and otherwise ignored.

use bridge_traits::storage::PreferenceStore;
use std::sync::Arc;
use tracing::warn;

pub const VOLUME_KEY: &str = "volume";
pub const MUTE_KEY: &str = "mute";
pub const QUALITY_LABEL_KEY: &str = "qualityLabel";
pub const CAPTION_LABEL_KEY: &str = "captionLabel";

/// Caption label stored when captions are switched off.
pub const CAPTIONS_OFF: &str = "Off";

/// Values read back from a store at startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredPreferences {
    pub volume: Option<u8>,
    pub mute: Option<bool>,
    pub quality_label: Option<String>,
    pub caption_label: Option<String>,
}

impl StoredPreferences {
    /// Unreadable keys load as unset.
    pub fn load(store: &dyn PreferenceStore) -> Self {
        Self {
            volume: read(store.get_f64(VOLUME_KEY), VOLUME_KEY)
                .filter(|v| v.is_finite())
                .map(|v| v.round().clamp(0.0, 100.0) as u8),
            mute: read(store.get_bool(MUTE_KEY), MUTE_KEY),
            quality_label: read(store.get_string(QUALITY_LABEL_KEY), QUALITY_LABEL_KEY),
            caption_label: read(store.get_string(CAPTION_LABEL_KEY), CAPTION_LABEL_KEY),
        }
    }
}

fn read<T>(result: bridge_traits::error::Result<Option<T>>, key: &str) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(key, error = %e, "Failed to read preference");
            None
        }
    }
}

/// Write-side handle a session persists through. A missing store turns
/// every write into a no-op.
#[derive(Clone, Default)]
pub struct PreferenceWriter {
    store: Option<Arc<dyn PreferenceStore>>,
}

impl PreferenceWriter {
    pub fn new(store: Option<Arc<dyn PreferenceStore>>) -> Self {
        Self { store }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn volume(&self, volume: u8) {
        if let Some(store) = &self.store {
            if let Err(e) = store.set_f64(VOLUME_KEY, f64::from(volume)) {
                warn!(error = %e, "Failed to persist volume");
            }
        }
    }

    pub fn mute(&self, mute: bool) {
        if let Some(store) = &self.store {
            if let Err(e) = store.set_bool(MUTE_KEY, mute) {
                warn!(error = %e, "Failed to persist mute");
            }
        }
    }

    pub fn label(&self, key: &str, label: &str) {
        if let Some(store) = &self.store {
            if let Err(e) = store.set_string(key, label) {
                warn!(key, error = %e, "Failed to persist preference");
            }
        }
    }
}

impl std::fmt::Debug for PreferenceWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceWriter")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::storage::MemoryPreferenceStore;

    #[test]
    fn written_values_load_back() {
        let store: Arc<dyn PreferenceStore> = Arc::new(MemoryPreferenceStore::new());
        let writer = PreferenceWriter::new(Some(store.clone()));
        writer.volume(35);
        writer.mute(true);
        writer.label(CAPTION_LABEL_KEY, CAPTIONS_OFF);

        let stored = StoredPreferences::load(store.as_ref());
        assert_eq!(stored.volume, Some(35));
        assert_eq!(stored.mute, Some(true));
        assert_eq!(stored.caption_label.as_deref(), Some("Off"));
        assert_eq!(stored.quality_label, None);
    }

    #[test]
    fn out_of_range_volume_is_clamped() {
        let store = MemoryPreferenceStore::new();
        store.set_string(VOLUME_KEY, "250").unwrap();
        assert_eq!(StoredPreferences::load(&store).volume, Some(100));
    }

    #[test]
    fn writer_without_store_is_noop() {
        let writer = PreferenceWriter::default();
        assert!(!writer.is_enabled());
        writer.volume(10);
    }
}
