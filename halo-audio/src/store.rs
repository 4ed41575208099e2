//! Single owner of preferences and the custom preset

use tracing::warn;

use crate::error::{PresetError, StorageError};
use crate::prefs::{CustomPreset, PrefKey, Preferences, PresetName, BAND_COUNT};
use crate::storage::PreferenceStorage;

/// Holds the live [`Preferences`] and writes changes through to storage
pub struct ParameterStore {
    prefs: Preferences,
    custom: CustomPreset,
    storage: Box<dyn PreferenceStorage>,
}

impl ParameterStore {
    /// Start from defaults; call [`reload`](Self::reload) to read storage
    pub fn new(storage: Box<dyn PreferenceStorage>) -> Self {
        Self {
            prefs: Preferences::default(),
            custom: CustomPreset::default(),
            storage,
        }
    }

    /// Re-read storage on top of defaults.
    ///
    /// Entries that fail validation are skipped with a warning. On a storage
    /// error the in-memory values stay as they were.
    pub fn reload(&mut self) -> Result<(), StorageError> {
        let patch = self.storage.load()?;
        let mut prefs = Preferences::default();
        for err in prefs.apply_patch(&patch) {
            warn!("Skipping stored preference: {}", err);
        }
        self.prefs = prefs;

        match self.storage.load_custom_preset()? {
            Some(bands) => match CustomPreset::from_slice(&bands) {
                Ok(custom) => self.custom = custom,
                Err(e) => warn!("Ignoring stored custom preset: {}", e),
            },
            None => self.custom = CustomPreset::default(),
        }
        Ok(())
    }

    pub fn prefs(&self) -> &Preferences {
        &self.prefs
    }

    /// Mutable access; follow with [`persist`](Self::persist) for the touched keys
    pub fn prefs_mut(&mut self) -> &mut Preferences {
        &mut self.prefs
    }

    pub fn custom_preset(&self) -> &CustomPreset {
        &self.custom
    }

    /// Gains of the active preset (the custom preset when selected)
    pub fn active_gains(&self) -> [f32; BAND_COUNT] {
        self.prefs
            .preset()
            .builtin_gains()
            .unwrap_or(*self.custom.bands())
    }

    pub fn set_custom_band(&mut self, index: usize, value: f32) -> Result<(), PresetError> {
        self.custom.set_band(index, value)
    }

    /// Replace the custom preset; wrong lengths leave it untouched
    pub fn set_custom_preset(&mut self, bands: &[f32]) -> Result<(), PresetError> {
        self.custom = CustomPreset::from_slice(bands)?;
        Ok(())
    }

    pub fn reset_custom_preset(&mut self) {
        self.custom = CustomPreset::default();
    }

    pub fn is_custom_active(&self) -> bool {
        self.prefs.preset() == PresetName::Custom
    }

    /// Save the current values of `keys`
    pub fn persist(&mut self, keys: &[PrefKey]) -> Result<(), StorageError> {
        let patch = self.prefs.patch(keys);
        self.storage.save(&patch)
    }

    pub fn persist_custom_preset(&mut self) -> Result<(), StorageError> {
        let bands = *self.custom.bands();
        self.storage.save_custom_preset(&bands)
    }
}
