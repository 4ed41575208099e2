//! Content classification with hysteresis
//!
//! Each tick scores five content categories from band energies. Two of them
//! (streaming-service music and anime) keep decaying "sticky" scores so they
//! only win on sustained evidence. The committed label only moves when the
//! tick's confidence is high enough and the label history agrees.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use tracing::{debug, info};

use crate::{AnalysisError, BandEnergies};

/// Length of the label history used for majority voting
pub const HISTORY_LEN: usize = 15;

/// Minimum tick confidence before a transition may commit
const COMMIT_CONFIDENCE: f32 = 0.6;

/// Sticky score that overrides the stateless categories
const STICKY_THRESHOLD: f32 = 0.7;

/// Share of the previous sticky score kept each tick
const STICKY_RETAIN: f32 = 0.8;

/// Sticky streaming score when the host is a known streaming service
const STREAMING_HOST_SCORE: f32 = 0.9;

/// Content category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Genre {
    #[default]
    Movie,
    Music,
    Podcast,
    Anime,
    Spotify,
}

impl Genre {
    /// All categories in tie-break order
    pub const ALL: [Genre; 5] = [
        Genre::Movie,
        Genre::Music,
        Genre::Podcast,
        Genre::Anime,
        Genre::Spotify,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Genre::Movie => "movie",
            Genre::Music => "music",
            Genre::Podcast => "podcast",
            Genre::Anime => "anime",
            Genre::Spotify => "spotify",
        }
    }

    fn index(self) -> usize {
        match self {
            Genre::Movie => 0,
            Genre::Music => 1,
            Genre::Podcast => 2,
            Genre::Anime => 3,
            Genre::Spotify => 4,
        }
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Genre {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Genre::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| AnalysisError::UnknownGenre(s.to_string()))
    }
}

/// Facts about the page hosting the media
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostContext {
    /// The host is a known music streaming service
    pub streaming_service: bool,
}

impl HostContext {
    pub fn from_hostname(hostname: &str) -> Self {
        Self {
            streaming_service: hostname.to_ascii_lowercase().contains("spotify.com"),
        }
    }
}

/// Per-tick category scores (additive rule totals, not probabilities)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenreScores {
    pub movie: f32,
    pub music: f32,
    pub podcast: f32,
    /// Sticky score after decay blending
    pub anime: f32,
    /// Sticky score after decay blending
    pub spotify: f32,
}

impl GenreScores {
    fn movie_rule(e: &BandEnergies) -> f32 {
        (if e.speech > 0.4 { 0.7 } else { 0.0 })
            + (if e.mid > 0.6 { 0.5 } else { 0.0 })
            + (if e.bass > 0.3 && e.bass < 0.7 { 0.4 } else { 0.0 })
    }

    fn music_rule(e: &BandEnergies) -> f32 {
        (if e.bass > 0.6 { 0.6 } else { 0.0 })
            + (if e.high > 0.4 { 0.5 } else { 0.0 })
            + (if e.mid > 0.5 { 0.4 } else { 0.0 })
    }

    fn podcast_rule(e: &BandEnergies) -> f32 {
        (if e.speech > 0.6 { 0.8 } else { 0.0 })
            + (if e.bass < 0.4 { 0.6 } else { 0.0 })
            + (if e.high < 0.3 { 0.5 } else { 0.0 })
    }

    fn anime_rule(e: &BandEnergies) -> f32 {
        (if e.speech > 0.5 { 0.7 } else { 0.0 })
            + (if e.vocal_high > 0.6 { 0.8 } else { 0.0 })
            + (if e.bass < 0.3 { 0.5 } else { 0.0 })
    }

    fn spotify_rule(e: &BandEnergies) -> f32 {
        (if e.bass > 0.3 && e.bass < 0.6 { 0.5 } else { 0.0 })
            + (if e.mid > 0.4 && e.mid < 0.7 { 0.5 } else { 0.0 })
            + (if e.high > 0.2 && e.high < 0.5 { 0.5 } else { 0.0 })
    }

    /// Winning label and its score
    fn select(&self) -> (Genre, f32) {
        if self.spotify > STICKY_THRESHOLD {
            return (Genre::Spotify, self.spotify);
        }
        if self.anime > STICKY_THRESHOLD {
            return (Genre::Anime, self.anime);
        }
        let mut best = (Genre::Movie, self.movie);
        if self.music > best.1 {
            best = (Genre::Music, self.music);
        }
        if self.podcast > best.1 {
            best = (Genre::Podcast, self.podcast);
        }
        best
    }
}

/// Mutable classifier state
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierState {
    pub label: Genre,
    pub confidence: f32,
    pub history: VecDeque<Genre>,
    pub spotify_score: f32,
    pub anime_score: f32,
}

impl ClassifierState {
    fn new(initial: Genre) -> Self {
        Self {
            label: initial,
            confidence: 0.5,
            history: std::iter::repeat(initial).take(HISTORY_LEN).collect(),
            spotify_score: 0.0,
            anime_score: 0.0,
        }
    }

    /// Most frequent label in the history; ties keep the current label
    fn majority(&self) -> Genre {
        let mut counts = [0usize; 5];
        for genre in &self.history {
            counts[genre.index()] += 1;
        }
        let mut best = self.label;
        for genre in Genre::ALL {
            if counts[genre.index()] > counts[best.index()] {
                best = genre;
            }
        }
        best
    }
}

/// Classifies bus content and decides when the committed label changes
pub struct ContentClassifier {
    state: ClassifierState,
    host: HostContext,
    last_scores: GenreScores,
}

impl Default for ContentClassifier {
    fn default() -> Self {
        Self::new(HostContext::default())
    }
}

impl ContentClassifier {
    /// Start in `movie` with a history full of that label
    pub fn new(host: HostContext) -> Self {
        Self {
            state: ClassifierState::new(Genre::Movie),
            host,
            last_scores: GenreScores::default(),
        }
    }

    pub fn state(&self) -> &ClassifierState {
        &self.state
    }

    pub fn label(&self) -> Genre {
        self.state.label
    }

    pub fn confidence(&self) -> f32 {
        self.state.confidence
    }

    pub fn last_scores(&self) -> GenreScores {
        self.last_scores
    }

    pub fn set_host_context(&mut self, host: HostContext) {
        self.host = host;
    }

    /// Score one tick's energies and return the new label if a transition committed
    pub fn observe(&mut self, energies: &BandEnergies) -> Option<Genre> {
        let scores = self.score(energies);
        let (winner, confidence) = scores.select();
        self.last_scores = scores;
        self.state.confidence = confidence;

        self.state.history.push_back(winner);
        while self.state.history.len() > HISTORY_LEN {
            self.state.history.pop_front();
        }

        let majority = self.state.majority();
        if confidence > COMMIT_CONFIDENCE && majority != self.state.label {
            info!(
                from = %self.state.label,
                to = %majority,
                confidence,
                "Content classification changed"
            );
            self.state.label = majority;
            return Some(majority);
        }

        debug!(winner = %winner, confidence, "Classifier tick");
        None
    }

    fn score(&mut self, e: &BandEnergies) -> GenreScores {
        self.state.spotify_score = if self.host.streaming_service {
            STREAMING_HOST_SCORE
        } else {
            STICKY_RETAIN * self.state.spotify_score
                + (1.0 - STICKY_RETAIN) * GenreScores::spotify_rule(e)
        };
        self.state.anime_score = STICKY_RETAIN * self.state.anime_score
            + (1.0 - STICKY_RETAIN) * GenreScores::anime_rule(e);

        GenreScores {
            movie: GenreScores::movie_rule(e),
            music: GenreScores::music_rule(e),
            podcast: GenreScores::podcast_rule(e),
            anime: self.state.anime_score,
            spotify: self.state.spotify_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn music_energies() -> BandEnergies {
        BandEnergies {
            bass: 0.8,
            mid: 0.8,
            high: 0.6,
            speech: 0.3,
            lfe: 0.8,
            vocal_high: 0.3,
        }
    }

    fn quiet_energies() -> BandEnergies {
        // movie 0.4, podcast 0.5, spotify rule 0.5
        BandEnergies {
            bass: 0.5,
            mid: 0.3,
            high: 0.15,
            speech: 0.1,
            lfe: 0.5,
            vocal_high: 0.1,
        }
    }

    #[test]
    fn test_music_scores() {
        let mut classifier = ContentClassifier::default();
        classifier.observe(&music_energies());
        let scores = classifier.last_scores();

        assert!((scores.music - 1.5).abs() < 1e-6);
        assert!((scores.movie - 0.5).abs() < 1e-6);
        assert_eq!(scores.podcast, 0.0);
        assert_eq!(scores.spotify, 0.0);
        assert!((classifier.confidence() - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_single_outlier_does_not_commit() {
        let mut classifier = ContentClassifier::default();
        assert_eq!(classifier.observe(&music_energies()), None);
        assert_eq!(classifier.label(), Genre::Movie);
    }

    #[test]
    fn test_majority_commits_after_eight_ticks() {
        let mut classifier = ContentClassifier::default();
        for tick in 1..=7 {
            assert_eq!(
                classifier.observe(&music_energies()),
                None,
                "committed early at tick {}",
                tick
            );
        }
        assert_eq!(classifier.observe(&music_energies()), Some(Genre::Music));
        assert_eq!(classifier.label(), Genre::Music);

        // Further agreement is not a new transition
        assert_eq!(classifier.observe(&music_energies()), None);
    }

    #[test]
    fn test_low_confidence_never_commits() {
        let mut classifier = ContentClassifier::default();
        let weak = quiet_energies();
        for _ in 0..(HISTORY_LEN * 2) {
            assert_eq!(classifier.observe(&weak), None);
        }
        assert!(classifier.confidence() <= COMMIT_CONFIDENCE);
        assert_eq!(classifier.label(), Genre::Movie);
    }

    #[test]
    fn test_streaming_host_forces_spotify() {
        let mut classifier = ContentClassifier::new(HostContext::from_hostname("open.spotify.com"));
        let mut committed = None;
        for _ in 0..HISTORY_LEN {
            if let Some(genre) = classifier.observe(&BandEnergies::default()) {
                committed = Some(genre);
            }
        }
        assert_eq!(committed, Some(Genre::Spotify));
        assert!((classifier.state().spotify_score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_sticky_score_blends() {
        let mut classifier = ContentClassifier::default();
        // Spotify rule fires fully: 1.5
        let e = BandEnergies {
            bass: 0.45,
            mid: 0.55,
            high: 0.35,
            ..Default::default()
        };
        classifier.observe(&e);
        assert!((classifier.state().spotify_score - 0.3).abs() < 1e-6);
        classifier.observe(&e);
        assert!((classifier.state().spotify_score - 0.54).abs() < 1e-6);
    }

    #[test]
    fn test_argmax_tie_prefers_movie() {
        let scores = GenreScores {
            movie: 0.9,
            music: 0.9,
            podcast: 0.9,
            anime: 0.0,
            spotify: 0.0,
        };
        assert_eq!(scores.select().0, Genre::Movie);
    }

    #[test]
    fn test_genre_from_str() {
        assert_eq!("anime".parse::<Genre>(), Ok(Genre::Anime));
        assert_eq!(
            "jazz".parse::<Genre>(),
            Err(AnalysisError::UnknownGenre("jazz".to_string()))
        );
    }
}
