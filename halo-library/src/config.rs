//! Preference persistence for Halo
//!
//! Preferences live in a commented `key=value` text file. Values are kept in
//! their serialised form; validation and clamping happen when the audio core
//! applies them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use halo_audio::{PrefKey, PreferenceStorage, PreferencesPatch, StorageError};
use tracing::{debug, warn};

/// Key of the comma-separated custom preset line
const CUSTOM_PRESET_KEY: &str = "custom_preset";

/// Parsed contents of a preferences file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreferencesFile {
    pub prefs: PreferencesPatch,
    pub custom_preset: Option<Vec<f32>>,
}

impl PreferencesFile {
    /// Parse the `key=value` format; unknown keys and blank or `#` lines are skipped
    pub fn parse(content: &str) -> Self {
        let mut file = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                debug!("Ignoring preference line without '=': {}", line);
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            if key == CUSTOM_PRESET_KEY {
                file.custom_preset = parse_bands(value);
                continue;
            }
            match PrefKey::parse(key) {
                Some(key) => file.prefs.insert(key, value),
                None => debug!("Ignoring unknown preference key: {}", key),
            }
        }

        file
    }

    pub fn serialize(&self) -> String {
        let mut lines = vec!["# Halo preferences".to_string()];
        lines.extend(
            self.prefs
                .iter()
                .map(|(key, value)| format!("{}={}", key.as_str(), value)),
        );
        if let Some(bands) = &self.custom_preset {
            let bands: Vec<String> = bands.iter().map(f32::to_string).collect();
            lines.push(format!("{}={}", CUSTOM_PRESET_KEY, bands.join(",")));
        }
        lines.join("\n") + "\n"
    }
}

fn parse_bands(value: &str) -> Option<Vec<f32>> {
    let parsed: Result<Vec<f32>, _> = value.split(',').map(|v| v.trim().parse::<f32>()).collect();
    match parsed {
        Ok(bands) => Some(bands),
        Err(e) => {
            warn!("Skipping malformed custom preset {:?}: {}", value, e);
            None
        }
    }
}

/// [`PreferenceStorage`] backed by a text file.
///
/// Every save re-reads the file and merges into it, so keys written by other
/// processes survive.
#[derive(Debug, Clone)]
pub struct FilePreferenceStorage {
    path: PathBuf,
}

impl FilePreferenceStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Storage at [`config_path`](Self::config_path)
    pub fn open_default() -> Self {
        Self::new(Self::config_path())
    }

    /// Get the default preferences file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("halo")
            .join("preferences.txt")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file; a missing file reads as empty
    fn read(&self) -> Result<PreferencesFile, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(PreferencesFile::parse(&content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(PreferencesFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, file: &PreferencesFile) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, file.serialize())?;
        Ok(())
    }
}

impl PreferenceStorage for FilePreferenceStorage {
    fn load(&mut self) -> Result<PreferencesPatch, StorageError> {
        Ok(self.read()?.prefs)
    }

    fn save(&mut self, patch: &PreferencesPatch) -> Result<(), StorageError> {
        let mut file = self.read()?;
        file.prefs.merge(patch);
        self.write(&file)
    }

    fn load_custom_preset(&mut self) -> Result<Option<Vec<f32>>, StorageError> {
        Ok(self.read()?.custom_preset)
    }

    fn save_custom_preset(&mut self, bands: &[f32]) -> Result<(), StorageError> {
        let mut file = self.read()?;
        file.custom_preset = Some(bands.to_vec());
        self.write(&file)
    }
}
