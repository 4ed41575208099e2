//! Preference persistence boundary

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StorageError;
use crate::prefs::PreferencesPatch;

/// Backing store for preferences and the custom preset.
///
/// Every call is fallible; callers keep working from in-memory values when a
/// call fails. Loaded values are validated by the caller, never trusted.
pub trait PreferenceStorage: Send {
    /// Everything stored so far (empty when nothing was saved yet)
    fn load(&mut self) -> Result<PreferencesPatch, StorageError>;

    /// Merge `patch` into what is stored
    fn save(&mut self, patch: &PreferencesPatch) -> Result<(), StorageError>;

    /// Stored custom preset, unvalidated
    fn load_custom_preset(&mut self) -> Result<Option<Vec<f32>>, StorageError>;

    fn save_custom_preset(&mut self, bands: &[f32]) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    prefs: PreferencesPatch,
    custom_preset: Option<Vec<f32>>,
    fail: bool,
}

/// In-process storage; clones share the same contents
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again)
    pub fn set_failing(&self, fail: bool) {
        self.state.lock().fail = fail;
    }

    /// Snapshot of the stored preference entries
    pub fn stored(&self) -> PreferencesPatch {
        self.state.lock().prefs.clone()
    }

    /// Stored custom preset
    pub fn stored_custom_preset(&self) -> Option<Vec<f32>> {
        self.state.lock().custom_preset.clone()
    }

    fn check(state: &MemoryState) -> Result<(), StorageError> {
        if state.fail {
            Err(StorageError::Unavailable("memory storage set to fail".into()))
        } else {
            Ok(())
        }
    }
}

impl PreferenceStorage for MemoryStorage {
    fn load(&mut self) -> Result<PreferencesPatch, StorageError> {
        let state = self.state.lock();
        Self::check(&state)?;
        Ok(state.prefs.clone())
    }

    fn save(&mut self, patch: &PreferencesPatch) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        Self::check(&state)?;
        state.prefs.merge(patch);
        Ok(())
    }

    fn load_custom_preset(&mut self) -> Result<Option<Vec<f32>>, StorageError> {
        let state = self.state.lock();
        Self::check(&state)?;
        Ok(state.custom_preset.clone())
    }

    fn save_custom_preset(&mut self, bands: &[f32]) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        Self::check(&state)?;
        state.custom_preset = Some(bands.to_vec());
        Ok(())
    }
}
