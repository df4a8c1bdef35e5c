use rand::Rng;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::GameError;
use crate::round::{evaluate_guess, select_next_word, ResolvedWord, RoundState, RoundToken};
use crate::vocabulary::Vocabulary;

/// Why a session stopped. Quitting is not a reason: it leaves the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum EndReason {
    Timeout,
    VocabularyExhausted,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub duration: Duration,
    pub jokers: u32,
}

impl From<&crate::config::Config> for SessionConfig {
    fn from(cfg: &crate::config::Config) -> Self {
        Self {
            duration: cfg.session_duration(),
            jokers: cfg.jokers,
        }
    }
}

/// A classification result handed back by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessResult {
    pub token: RoundToken,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuessOutcome {
    /// The guess named the target. The round now waits for `next_round`.
    Matched(String),
    Missed,
    /// Result from a superseded round, a guessed round or an ended session.
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JokerOutcome {
    /// Word skipped, a new round is running.
    Skipped { skipped: String, next: String },
    /// Word skipped and nothing is left to draw; the session has ended.
    Exhausted { skipped: String },
    /// No joker left, round already guessed, or session over.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub reason: EndReason,
    pub score: u32,
    pub guessed_words: Vec<String>,
    pub skipped_words: Vec<String>,
    pub duration: Duration,
}

#[derive(Debug)]
pub struct SessionState {
    pub config: SessionConfig,
    pub score: u32,
    pub jokers_remaining: u32,
    pub resolved: Vec<ResolvedWord>,
    pub started_at: Instant,
    pub round: RoundState,
    pub ended: Option<EndReason>,
    ended_at: Option<Instant>,
    next_token: u64,
    words: Vec<String>,
}

impl SessionState {
    /// Begin a session with its first round. Fails when the vocabulary has
    /// nothing to offer, in which case no round can start.
    pub fn start<R: Rng + ?Sized>(
        config: SessionConfig,
        vocabulary: &Vocabulary,
        now: Instant,
        rng: &mut R,
    ) -> Result<Self, GameError> {
        let first = select_next_word(&vocabulary.words, &[], rng)?;
        info!(
            vocabulary = %vocabulary.name,
            words = vocabulary.len(),
            secs = config.duration.as_secs(),
            "session started"
        );
        debug!(round = 1, word = %first, "round started");

        Ok(Self {
            jokers_remaining: config.jokers,
            config,
            score: 0,
            resolved: Vec::new(),
            started_at: now,
            round: RoundState::new(RoundToken(1), first, now),
            ended: None,
            ended_at: None,
            next_token: 2,
            words: vocabulary.words.clone(),
        })
    }

    pub fn is_active(&self) -> bool {
        self.ended.is_none()
    }

    pub fn current_token(&self) -> RoundToken {
        self.round.token
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.started_at);
        self.config.duration.saturating_sub(elapsed)
    }

    /// Ends the session once the clock reaches the configured duration,
    /// whatever the round is doing.
    pub fn check_timeout(&mut self, now: Instant) -> Option<EndReason> {
        if self.ended.is_none()
            && now.saturating_duration_since(self.started_at) >= self.config.duration
        {
            self.end(EndReason::Timeout, now);
        }
        self.ended
    }

    /// Merge a classification result into the current round.
    pub fn apply_result(&mut self, result: GuessResult) -> GuessOutcome {
        if self.ended.is_some() || result.token != self.round.token || self.round.guessed {
            debug!(
                result_round = result.token.0,
                current_round = self.round.token.0,
                "stale guess discarded"
            );
            return GuessOutcome::Discarded;
        }

        self.round.last_guess = result.text;
        if !evaluate_guess(&self.round.target, &self.round.last_guess) {
            return GuessOutcome::Missed;
        }

        self.round.guessed = true;
        self.score += 1;
        self.resolved.push(ResolvedWord {
            word: self.round.target.clone(),
            via_joker: false,
        });
        info!(word = %self.round.target, score = self.score, "word guessed");
        GuessOutcome::Matched(self.round.target.clone())
    }

    /// Skip the current word. Has no effect without a joker in hand.
    pub fn use_joker<R: Rng + ?Sized>(&mut self, now: Instant, rng: &mut R) -> JokerOutcome {
        if self.ended.is_some() || self.round.guessed || self.jokers_remaining == 0 {
            return JokerOutcome::Unavailable;
        }

        self.jokers_remaining -= 1;
        let skipped = self.round.target.clone();
        self.resolved.push(ResolvedWord {
            word: skipped.clone(),
            via_joker: true,
        });
        info!(
            word = %skipped,
            jokers_left = self.jokers_remaining,
            round_secs = self.round.elapsed(now).as_secs(),
            "joker used"
        );

        match self.begin_round(now, rng) {
            Ok(()) => JokerOutcome::Skipped {
                skipped,
                next: self.round.target.clone(),
            },
            Err(_) => JokerOutcome::Exhausted { skipped },
        }
    }

    /// Move on after a guessed round (once the reward phase is over).
    pub fn next_round<R: Rng + ?Sized>(
        &mut self,
        now: Instant,
        rng: &mut R,
    ) -> Result<(), EndReason> {
        if let Some(reason) = self.ended {
            return Err(reason);
        }
        self.begin_round(now, rng)
    }

    fn begin_round<R: Rng + ?Sized>(&mut self, now: Instant, rng: &mut R) -> Result<(), EndReason> {
        match select_next_word(&self.words, &self.resolved, rng) {
            Ok(word) => {
                let token = RoundToken(self.next_token);
                self.next_token += 1;
                debug!(round = token.0, word = %word, "round started");
                self.round = RoundState::new(token, word, now);
                Ok(())
            }
            Err(_) => {
                self.end(EndReason::VocabularyExhausted, now);
                Err(EndReason::VocabularyExhausted)
            }
        }
    }

    fn end(&mut self, reason: EndReason, now: Instant) {
        self.ended = Some(reason);
        self.ended_at = Some(now);
        info!(%reason, score = self.score, "session ended");
    }

    pub fn guessed_words(&self) -> Vec<String> {
        self.resolved
            .iter()
            .filter(|r| !r.via_joker)
            .map(|r| r.word.clone())
            .collect()
    }

    /// Summary for the end screen; `None` while the session is still running.
    pub fn summary(&self) -> Option<SessionSummary> {
        let reason = self.ended?;
        let ended_at = self.ended_at.unwrap_or(self.started_at);
        Some(SessionSummary {
            reason,
            score: self.score,
            guessed_words: self.guessed_words(),
            skipped_words: self
                .resolved
                .iter()
                .filter(|r| r.via_joker)
                .map(|r| r.word.clone())
                .collect(),
            duration: ended_at
                .saturating_duration_since(self.started_at)
                .min(self.config.duration),
        })
    }
}
