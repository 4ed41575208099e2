//! Tunable preferences, EQ presets and genre defaults
//!
//! Every numeric field is clamped on write. Non-finite writes leave the field
//! unchanged. Values cross the storage boundary as `key=value` strings so the
//! same validation applies whatever the backing store returns.

use std::fmt;
use std::str::FromStr;

use halo_analysis::Genre;

use crate::error::{PreferenceError, PresetError};

/// Number of EQ bands
pub const BAND_COUNT: usize = 9;

/// EQ band centre frequencies in Hz
pub const EQ_FREQUENCIES: [f32; BAND_COUNT] = [
    32.0, 60.0, 150.0, 400.0, 1000.0, 2400.0, 6000.0, 12000.0, 16000.0,
];

/// Range of a custom preset band in dB
pub const CUSTOM_BAND_RANGE: (f32, f32) = (-12.0, 12.0);

pub const CHANNEL_GAIN_RANGE: (f32, f32) = (0.0, 2.0);
pub const WIDTH_MS_RANGE: (f32, f32) = (0.0, 100.0);
pub const MASTER_RANGE: (f32, f32) = (0.5, 2.0);
pub const CROSSFEED_RANGE: (f32, f32) = (0.0, 1.0);
pub const BASS_BOOST_RANGE: (f32, f32) = (1.0, 2.0);
pub const NOISE_REDUCTION_RANGE: (f32, f32) = (0.0, 1.0);
pub const DYNAMIC_RANGE_RANGE: (f32, f32) = (0.5, 1.5);

/// Named EQ preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PresetName {
    Default,
    Music,
    #[default]
    Movie,
    Gaming,
    Podcast,
    Anime,
    Spotify,
    Custom,
}

impl PresetName {
    pub const ALL: [PresetName; 8] = [
        PresetName::Default,
        PresetName::Music,
        PresetName::Movie,
        PresetName::Gaming,
        PresetName::Podcast,
        PresetName::Anime,
        PresetName::Spotify,
        PresetName::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PresetName::Default => "default",
            PresetName::Music => "music",
            PresetName::Movie => "movie",
            PresetName::Gaming => "gaming",
            PresetName::Podcast => "podcast",
            PresetName::Anime => "anime",
            PresetName::Spotify => "spotify",
            PresetName::Custom => "custom",
        }
    }

    /// Fixed gains of a built-in preset; `None` for the custom preset
    pub fn builtin_gains(self) -> Option<[f32; BAND_COUNT]> {
        match self {
            PresetName::Default => Some([0.0; BAND_COUNT]),
            PresetName::Music => Some([2.0, 1.0, 0.0, -1.0, 0.0, 1.0, 2.0, 3.0, 1.0]),
            PresetName::Movie => Some([4.0, 3.0, 2.0, 0.0, 2.0, 3.0, 1.0, 0.0, -1.0]),
            PresetName::Gaming => Some([3.0, 2.0, 1.0, 0.0, 1.0, 2.0, 3.0, 2.0, 1.0]),
            PresetName::Podcast => Some([0.0, 2.0, 3.0, 2.0, 1.0, 0.0, -1.0, -2.0, -1.0]),
            PresetName::Anime => Some([1.0, 3.0, 4.0, 2.0, 1.0, 0.0, -1.0, -2.0, -1.0]),
            PresetName::Spotify => Some([2.0, 2.0, 1.0, 0.0, 1.0, 2.0, 3.0, 2.0, 1.0]),
            PresetName::Custom => None,
        }
    }
}

impl fmt::Display for PresetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresetName {
    type Err = PresetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PresetName::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| PresetError::UnknownPreset(s.to_string()))
    }
}

impl From<Genre> for PresetName {
    fn from(genre: Genre) -> Self {
        match genre {
            Genre::Movie => PresetName::Movie,
            Genre::Music => PresetName::Music,
            Genre::Podcast => PresetName::Podcast,
            Genre::Anime => PresetName::Anime,
            Genre::Spotify => PresetName::Spotify,
        }
    }
}

/// The user-editable preset; always exactly nine bands within ±12 dB
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CustomPreset([f32; BAND_COUNT]);

impl CustomPreset {
    /// Validate a submitted vector; wrong lengths are rejected whole
    pub fn from_slice(bands: &[f32]) -> Result<Self, PresetError> {
        if bands.len() != BAND_COUNT {
            return Err(PresetError::InvalidLength {
                expected: BAND_COUNT,
                actual: bands.len(),
            });
        }
        let mut preset = Self::default();
        for (dst, &value) in preset.0.iter_mut().zip(bands) {
            *dst = if value.is_finite() {
                value.clamp(CUSTOM_BAND_RANGE.0, CUSTOM_BAND_RANGE.1)
            } else {
                0.0
            };
        }
        Ok(preset)
    }

    pub fn set_band(&mut self, index: usize, value: f32) -> Result<(), PresetError> {
        let band = self
            .0
            .get_mut(index)
            .ok_or(PresetError::BandOutOfRange(index))?;
        if value.is_finite() {
            *band = value.clamp(CUSTOM_BAND_RANGE.0, CUSTOM_BAND_RANGE.1);
        }
        Ok(())
    }

    pub fn bands(&self) -> &[f32; BAND_COUNT] {
        &self.0
    }
}

/// Channel addressed by [`Preferences::set_gain`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainChannel {
    Center,
    Surround,
    Lfe,
    Master,
}

/// Persistable preference key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefKey {
    Enabled,
    Preset,
    CenterGain,
    SurroundGain,
    LfeGain,
    WidthMs,
    Master,
    Loudness,
    SpatialEnabled,
    AutoEq,
    CompressorEnabled,
    Crossfeed,
    BassBoost,
    DialogueEnhancement,
    NoiseReduction,
    DistortionControl,
    DynamicRange,
}

impl PrefKey {
    pub const ALL: [PrefKey; 17] = [
        PrefKey::Enabled,
        PrefKey::Preset,
        PrefKey::CenterGain,
        PrefKey::SurroundGain,
        PrefKey::LfeGain,
        PrefKey::WidthMs,
        PrefKey::Master,
        PrefKey::Loudness,
        PrefKey::SpatialEnabled,
        PrefKey::AutoEq,
        PrefKey::CompressorEnabled,
        PrefKey::Crossfeed,
        PrefKey::BassBoost,
        PrefKey::DialogueEnhancement,
        PrefKey::NoiseReduction,
        PrefKey::DistortionControl,
        PrefKey::DynamicRange,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PrefKey::Enabled => "enabled",
            PrefKey::Preset => "preset",
            PrefKey::CenterGain => "center_gain",
            PrefKey::SurroundGain => "surround_gain",
            PrefKey::LfeGain => "lfe_gain",
            PrefKey::WidthMs => "width_ms",
            PrefKey::Master => "master",
            PrefKey::Loudness => "loudness",
            PrefKey::SpatialEnabled => "spatial_enabled",
            PrefKey::AutoEq => "auto_eq",
            PrefKey::CompressorEnabled => "compressor_enabled",
            PrefKey::Crossfeed => "crossfeed",
            PrefKey::BassBoost => "bass_boost",
            PrefKey::DialogueEnhancement => "dialogue_enhancement",
            PrefKey::NoiseReduction => "noise_reduction",
            PrefKey::DistortionControl => "distortion_control",
            PrefKey::DynamicRange => "dynamic_range",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        PrefKey::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

/// A subset of preferences in their serialised form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreferencesPatch {
    entries: Vec<(PrefKey, String)>,
}

impl PreferencesPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing any earlier value
    pub fn insert(&mut self, key: PrefKey, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: PrefKey) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Overlay `other` on top of this patch
    pub fn merge(&mut self, other: &PreferencesPatch) {
        for (key, value) in other.iter() {
            self.insert(key, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (PrefKey, &str)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parameter bundle applied when the classifier commits a genre
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenreDefaults {
    pub preset: PresetName,
    pub dialogue_enhancement: bool,
    pub bass_boost: f32,
    pub noise_reduction: f32,
    pub dynamic_range: Option<f32>,
}

impl GenreDefaults {
    pub fn for_genre(genre: Genre) -> Self {
        let (dialogue_enhancement, bass_boost, noise_reduction, dynamic_range) = match genre {
            Genre::Movie => (true, 1.3, 0.7, None),
            Genre::Music => (false, 1.5, 0.5, None),
            Genre::Podcast => (true, 1.0, 0.8, None),
            Genre::Anime => (true, 1.2, 0.6, None),
            Genre::Spotify => (false, 1.4, 0.4, Some(1.2)),
        };
        Self {
            preset: genre.into(),
            dialogue_enhancement,
            bass_boost,
            noise_reduction,
            dynamic_range,
        }
    }

    /// Keys written by [`Preferences::apply_genre`]
    pub const KEYS: [PrefKey; 5] = [
        PrefKey::Preset,
        PrefKey::DialogueEnhancement,
        PrefKey::BassBoost,
        PrefKey::NoiseReduction,
        PrefKey::DynamicRange,
    ];
}

#[inline]
fn clamp_into(field: &mut f32, value: f32, range: (f32, f32)) {
    if value.is_finite() {
        *field = value.clamp(range.0, range.1);
    }
}

/// Process-wide enhancer settings
#[derive(Debug, Clone, PartialEq)]
pub struct Preferences {
    enabled: bool,
    preset: PresetName,
    center_gain: f32,
    surround_gain: f32,
    lfe_gain: f32,
    width_ms: f32,
    master: f32,
    loudness: bool,
    spatial_enabled: bool,
    auto_eq: bool,
    compressor_enabled: bool,
    crossfeed: f32,
    bass_boost: f32,
    dialogue_enhancement: bool,
    noise_reduction: f32,
    distortion_control: bool,
    dynamic_range: f32,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            enabled: true,
            preset: PresetName::Movie,
            center_gain: 0.85,
            surround_gain: 0.75,
            lfe_gain: 0.8,
            width_ms: 15.0,
            master: 1.0,
            loudness: true,
            spatial_enabled: true,
            auto_eq: true,
            compressor_enabled: true,
            crossfeed: 0.3,
            bass_boost: 1.0,
            dialogue_enhancement: true,
            noise_reduction: 0.7,
            distortion_control: true,
            dynamic_range: 0.8,
        }
    }
}

impl Preferences {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn preset(&self) -> PresetName {
        self.preset
    }

    pub fn center_gain(&self) -> f32 {
        self.center_gain
    }

    pub fn surround_gain(&self) -> f32 {
        self.surround_gain
    }

    pub fn lfe_gain(&self) -> f32 {
        self.lfe_gain
    }

    pub fn width_ms(&self) -> f32 {
        self.width_ms
    }

    pub fn master(&self) -> f32 {
        self.master
    }

    pub fn loudness(&self) -> bool {
        self.loudness
    }

    pub fn spatial_enabled(&self) -> bool {
        self.spatial_enabled
    }

    pub fn auto_eq(&self) -> bool {
        self.auto_eq
    }

    pub fn compressor_enabled(&self) -> bool {
        self.compressor_enabled
    }

    pub fn crossfeed(&self) -> f32 {
        self.crossfeed
    }

    pub fn bass_boost(&self) -> f32 {
        self.bass_boost
    }

    pub fn dialogue_enhancement(&self) -> bool {
        self.dialogue_enhancement
    }

    pub fn noise_reduction(&self) -> f32 {
        self.noise_reduction
    }

    pub fn distortion_control(&self) -> bool {
        self.distortion_control
    }

    pub fn dynamic_range(&self) -> f32 {
        self.dynamic_range
    }

    pub fn gain(&self, channel: GainChannel) -> f32 {
        match channel {
            GainChannel::Center => self.center_gain,
            GainChannel::Surround => self.surround_gain,
            GainChannel::Lfe => self.lfe_gain,
            GainChannel::Master => self.master,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_preset(&mut self, preset: PresetName) {
        self.preset = preset;
    }

    pub fn set_gain(&mut self, channel: GainChannel, value: f32) {
        match channel {
            GainChannel::Center => clamp_into(&mut self.center_gain, value, CHANNEL_GAIN_RANGE),
            GainChannel::Surround => {
                clamp_into(&mut self.surround_gain, value, CHANNEL_GAIN_RANGE)
            }
            GainChannel::Lfe => clamp_into(&mut self.lfe_gain, value, CHANNEL_GAIN_RANGE),
            GainChannel::Master => clamp_into(&mut self.master, value, MASTER_RANGE),
        }
    }

    pub fn set_width_ms(&mut self, value: f32) {
        clamp_into(&mut self.width_ms, value, WIDTH_MS_RANGE);
    }

    pub fn set_loudness(&mut self, enabled: bool) {
        self.loudness = enabled;
    }

    pub fn set_spatial_enabled(&mut self, enabled: bool) {
        self.spatial_enabled = enabled;
    }

    pub fn set_auto_eq(&mut self, enabled: bool) {
        self.auto_eq = enabled;
    }

    pub fn set_compressor_enabled(&mut self, enabled: bool) {
        self.compressor_enabled = enabled;
    }

    pub fn set_crossfeed(&mut self, value: f32) {
        clamp_into(&mut self.crossfeed, value, CROSSFEED_RANGE);
    }

    pub fn set_bass_boost(&mut self, value: f32) {
        clamp_into(&mut self.bass_boost, value, BASS_BOOST_RANGE);
    }

    pub fn set_dialogue_enhancement(&mut self, enabled: bool) {
        self.dialogue_enhancement = enabled;
    }

    pub fn set_noise_reduction(&mut self, value: f32) {
        clamp_into(&mut self.noise_reduction, value, NOISE_REDUCTION_RANGE);
    }

    pub fn set_distortion_control(&mut self, enabled: bool) {
        self.distortion_control = enabled;
    }

    pub fn set_dynamic_range(&mut self, value: f32) {
        clamp_into(&mut self.dynamic_range, value, DYNAMIC_RANGE_RANGE);
    }

    /// Write a genre's parameter bundle
    pub fn apply_genre(&mut self, genre: Genre) {
        let defaults = GenreDefaults::for_genre(genre);
        self.preset = defaults.preset;
        self.dialogue_enhancement = defaults.dialogue_enhancement;
        self.set_bass_boost(defaults.bass_boost);
        self.set_noise_reduction(defaults.noise_reduction);
        if let Some(dynamic_range) = defaults.dynamic_range {
            self.set_dynamic_range(dynamic_range);
        }
    }

    /// Serialised value of one field
    pub fn value_of(&self, key: PrefKey) -> String {
        match key {
            PrefKey::Enabled => self.enabled.to_string(),
            PrefKey::Preset => self.preset.as_str().to_string(),
            PrefKey::CenterGain => self.center_gain.to_string(),
            PrefKey::SurroundGain => self.surround_gain.to_string(),
            PrefKey::LfeGain => self.lfe_gain.to_string(),
            PrefKey::WidthMs => self.width_ms.to_string(),
            PrefKey::Master => self.master.to_string(),
            PrefKey::Loudness => self.loudness.to_string(),
            PrefKey::SpatialEnabled => self.spatial_enabled.to_string(),
            PrefKey::AutoEq => self.auto_eq.to_string(),
            PrefKey::CompressorEnabled => self.compressor_enabled.to_string(),
            PrefKey::Crossfeed => self.crossfeed.to_string(),
            PrefKey::BassBoost => self.bass_boost.to_string(),
            PrefKey::DialogueEnhancement => self.dialogue_enhancement.to_string(),
            PrefKey::NoiseReduction => self.noise_reduction.to_string(),
            PrefKey::DistortionControl => self.distortion_control.to_string(),
            PrefKey::DynamicRange => self.dynamic_range.to_string(),
        }
    }

    /// Patch holding the current values of `keys`
    pub fn patch(&self, keys: &[PrefKey]) -> PreferencesPatch {
        let mut patch = PreferencesPatch::new();
        for &key in keys {
            patch.insert(key, self.value_of(key));
        }
        patch
    }

    /// Patch holding every field
    pub fn to_patch(&self) -> PreferencesPatch {
        self.patch(&PrefKey::ALL)
    }

    /// Parse and write one serialised field through the clamping setters
    pub fn set_from_str(&mut self, key: PrefKey, value: &str) -> Result<(), PreferenceError> {
        let value = value.trim();
        let invalid = || PreferenceError::InvalidValue {
            key: key.as_str(),
            value: value.to_string(),
        };
        let parse_bool = || value.parse::<bool>().map_err(|_| invalid());
        let parse_f32 = || {
            value
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(invalid)
        };

        match key {
            PrefKey::Enabled => self.enabled = parse_bool()?,
            PrefKey::Preset => self.preset = value.parse().map_err(|_| invalid())?,
            PrefKey::CenterGain => self.set_gain(GainChannel::Center, parse_f32()?),
            PrefKey::SurroundGain => self.set_gain(GainChannel::Surround, parse_f32()?),
            PrefKey::LfeGain => self.set_gain(GainChannel::Lfe, parse_f32()?),
            PrefKey::WidthMs => self.set_width_ms(parse_f32()?),
            PrefKey::Master => self.set_gain(GainChannel::Master, parse_f32()?),
            PrefKey::Loudness => self.loudness = parse_bool()?,
            PrefKey::SpatialEnabled => self.spatial_enabled = parse_bool()?,
            PrefKey::AutoEq => self.auto_eq = parse_bool()?,
            PrefKey::CompressorEnabled => self.compressor_enabled = parse_bool()?,
            PrefKey::Crossfeed => self.set_crossfeed(parse_f32()?),
            PrefKey::BassBoost => self.set_bass_boost(parse_f32()?),
            PrefKey::DialogueEnhancement => self.dialogue_enhancement = parse_bool()?,
            PrefKey::NoiseReduction => self.set_noise_reduction(parse_f32()?),
            PrefKey::DistortionControl => self.distortion_control = parse_bool()?,
            PrefKey::DynamicRange => self.set_dynamic_range(parse_f32()?),
        }
        Ok(())
    }

    /// Apply every entry of `patch`, collecting the ones that failed to parse
    pub fn apply_patch(&mut self, patch: &PreferencesPatch) -> Vec<PreferenceError> {
        patch
            .iter()
            .filter_map(|(key, value)| self.set_from_str(key, value).err())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let prefs = Preferences::default();
        assert!(prefs.enabled());
        assert_eq!(prefs.preset(), PresetName::Movie);
        assert_eq!(prefs.center_gain(), 0.85);
        assert_eq!(prefs.surround_gain(), 0.75);
        assert_eq!(prefs.lfe_gain(), 0.8);
        assert_eq!(prefs.width_ms(), 15.0);
        assert_eq!(prefs.crossfeed(), 0.3);
        assert_eq!(prefs.noise_reduction(), 0.7);
        assert_eq!(prefs.dynamic_range(), 0.8);
    }

    #[test]
    fn test_writes_are_clamped() {
        let mut prefs = Preferences::default();
        for value in [-100.0, -0.1, 0.5, 1.9, 2.1, 1e9] {
            prefs.set_gain(GainChannel::Center, value);
            prefs.set_gain(GainChannel::Surround, value);
            prefs.set_gain(GainChannel::Lfe, value);
            prefs.set_gain(GainChannel::Master, value);
            prefs.set_width_ms(value * 100.0);
            prefs.set_crossfeed(value);
            prefs.set_bass_boost(value);
            prefs.set_noise_reduction(value);
            prefs.set_dynamic_range(value);

            assert!((0.0..=2.0).contains(&prefs.center_gain()));
            assert!((0.0..=2.0).contains(&prefs.surround_gain()));
            assert!((0.0..=2.0).contains(&prefs.lfe_gain()));
            assert!((0.5..=2.0).contains(&prefs.master()));
            assert!((0.0..=100.0).contains(&prefs.width_ms()));
            assert!((0.0..=1.0).contains(&prefs.crossfeed()));
            assert!((1.0..=2.0).contains(&prefs.bass_boost()));
            assert!((0.0..=1.0).contains(&prefs.noise_reduction()));
            assert!((0.5..=1.5).contains(&prefs.dynamic_range()));
        }
    }

    #[test]
    fn test_nan_write_keeps_previous() {
        let mut prefs = Preferences::default();
        prefs.set_gain(GainChannel::Center, f32::NAN);
        prefs.set_crossfeed(f32::INFINITY);
        assert_eq!(prefs.center_gain(), 0.85);
        assert_eq!(prefs.crossfeed(), 0.3);
    }

    #[test]
    fn test_preset_names() {
        assert_eq!("anime".parse::<PresetName>().unwrap(), PresetName::Anime);
        assert!(matches!(
            "loud".parse::<PresetName>(),
            Err(PresetError::UnknownPreset(name)) if name == "loud"
        ));
        assert!(PresetName::Custom.builtin_gains().is_none());
        assert_eq!(
            PresetName::Movie.builtin_gains().unwrap(),
            [4.0, 3.0, 2.0, 0.0, 2.0, 3.0, 1.0, 0.0, -1.0]
        );
    }

    #[test]
    fn test_custom_preset_length_is_enforced() {
        assert!(matches!(
            CustomPreset::from_slice(&[1.0; 8]),
            Err(PresetError::InvalidLength { expected: 9, actual: 8 })
        ));
        let preset = CustomPreset::from_slice(&[20.0, -20.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
            .unwrap();
        assert_eq!(preset.bands()[0], 12.0);
        assert_eq!(preset.bands()[1], -12.0);
    }

    #[test]
    fn test_custom_band_index_checked() {
        let mut preset = CustomPreset::default();
        preset.set_band(0, 6.0).unwrap();
        assert_eq!(preset.bands()[0], 6.0);
        assert!(matches!(
            preset.set_band(9, 1.0),
            Err(PresetError::BandOutOfRange(9))
        ));
    }

    #[test]
    fn test_genre_bundles() {
        let mut prefs = Preferences::default();
        prefs.apply_genre(Genre::Music);
        assert_eq!(prefs.preset(), PresetName::Music);
        assert!(!prefs.dialogue_enhancement());
        assert_eq!(prefs.bass_boost(), 1.5);
        assert_eq!(prefs.noise_reduction(), 0.5);
        assert_eq!(prefs.dynamic_range(), 0.8);

        prefs.apply_genre(Genre::Spotify);
        assert_eq!(prefs.dynamic_range(), 1.2);
        assert_eq!(prefs.bass_boost(), 1.4);
    }

    #[test]
    fn test_patch_roundtrip_through_strings() {
        let mut prefs = Preferences::default();
        prefs.set_preset(PresetName::Podcast);
        prefs.set_gain(GainChannel::Lfe, 1.25);
        prefs.set_enabled(false);

        let mut restored = Preferences::default();
        let errors = restored.apply_patch(&prefs.to_patch());
        assert!(errors.is_empty());
        assert_eq!(restored, prefs);
    }

    #[test]
    fn test_set_from_str_validates() {
        let mut prefs = Preferences::default();
        prefs.set_from_str(PrefKey::CenterGain, "7.5").unwrap();
        assert_eq!(prefs.center_gain(), 2.0);

        assert!(prefs.set_from_str(PrefKey::Enabled, "maybe").is_err());
        assert!(prefs.set_from_str(PrefKey::Master, "NaN").is_err());
        assert!(prefs.set_from_str(PrefKey::Preset, "jazz").is_err());
        assert_eq!(prefs.master(), 1.0);
    }

    #[test]
    fn test_patch_insert_replaces() {
        let mut patch = PreferencesPatch::new();
        patch.insert(PrefKey::Master, "1.0");
        patch.insert(PrefKey::Master, "1.5");
        assert_eq!(patch.len(), 1);
        assert_eq!(patch.get(PrefKey::Master), Some("1.5"));
    }
}
