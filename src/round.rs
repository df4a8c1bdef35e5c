use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Instant;

use crate::error::GameError;

/// Identity of a round. Every classification request carries the token of
/// the round it was issued in; a result is only applied while that round is
/// still current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoundToken(pub u64);

/// A word that left play, either drawn successfully or skipped with a joker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWord {
    pub word: String,
    pub via_joker: bool,
}

#[derive(Debug, Clone)]
pub struct RoundState {
    pub token: RoundToken,
    pub target: String,
    pub guessed: bool,
    pub last_guess: String,
    pub started_at: Instant,
}

impl RoundState {
    pub fn new(token: RoundToken, target: String, started_at: Instant) -> Self {
        Self {
            token,
            target,
            guessed: false,
            last_guess: String::new(),
            started_at,
        }
    }

    pub fn elapsed(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.started_at)
    }
}

/// Pick a word uniformly among the distinct vocabulary words that have not
/// been resolved yet.
pub fn select_next_word<R: Rng + ?Sized>(
    vocabulary: &[String],
    resolved: &[ResolvedWord],
    rng: &mut R,
) -> Result<String, GameError> {
    let candidates: Vec<&String> = vocabulary
        .iter()
        .filter(|w| !resolved.iter().any(|r| &r.word == *w))
        .unique()
        .collect();

    candidates
        .choose(rng)
        .map(|w| (*w).clone())
        .ok_or(GameError::VocabularyExhausted)
}

/// Loose match: the target only has to appear somewhere in the guess.
pub fn evaluate_guess(target: &str, guess: &str) -> bool {
    let target = target.to_lowercase();
    !target.is_empty() && guess.to_lowercase().contains(&target)
}

/// Shape raw service output the way it is stored and displayed.
pub fn normalize_guess(raw: &str) -> String {
    raw.trim().to_lowercase()
}
