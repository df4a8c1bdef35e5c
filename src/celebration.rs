use rand::seq::SliceRandom;
use rand::Rng;
use std::time::{Duration, Instant};

use crate::canvas::Rgb;

const CONFETTI_COUNT: usize = 40;
const PALETTE: [Rgb; 7] = [
    Rgb(255, 0, 0),
    Rgb(0, 255, 0),
    Rgb(0, 180, 255),
    Rgb(255, 255, 0),
    Rgb(255, 80, 80),
    Rgb(255, 140, 0),
    Rgb(0, 200, 0),
];
/// The guessed word blinks with this half-period.
const FLASH_PERIOD: Duration = Duration::from_millis(200);
/// Animation part of the reward; the rest of the reward time is a pause.
const ANIMATION: Duration = Duration::from_millis(1000);

/// One falling piece of confetti, in terminal cell coordinates relative to
/// the drawable area.
#[derive(Debug, Clone)]
pub struct Confetto {
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    pub color: Rgb,
    pub big: bool,
}

impl Confetto {
    fn random<R: Rng + ?Sized>(rng: &mut R, width: f64, top: f64, height: f64) -> Self {
        Self {
            x: rng.gen_range(0.0..width.max(1.0)),
            y: rng.gen_range(top..top + height.max(1.0)),
            speed: rng.gen_range(2.0..6.0),
            color: *PALETTE.choose(rng).unwrap_or(&PALETTE[0]),
            big: rng.gen_bool(0.5),
        }
    }
}

/// Reward phase shown after a correct guess. While it runs the round waits;
/// the next word is drawn once [`Celebration::is_finished`] turns true.
#[derive(Debug)]
pub struct Celebration {
    pub word: String,
    pub confetti: Vec<Confetto>,
    started_at: Instant,
    last_update: Instant,
    duration: Duration,
    width: f64,
    height: f64,
}

impl Celebration {
    /// `width`/`height`: drawable area in cells.
    pub fn start<R: Rng + ?Sized>(
        word: &str,
        duration: Duration,
        width: u16,
        height: u16,
        now: Instant,
        rng: &mut R,
    ) -> Self {
        let (w, h) = (width as f64, height as f64);
        let confetti = (0..CONFETTI_COUNT)
            .map(|_| Confetto::random(rng, w, 0.0, h))
            .collect();

        Self {
            word: word.to_uppercase(),
            confetti,
            started_at: now,
            last_update: now,
            duration,
            width: w,
            height: h,
        }
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started_at) >= self.duration
    }

    /// Whether the guessed word is visible in this frame.
    pub fn word_visible(&self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.started_at);
        elapsed < ANIMATION && (elapsed.as_millis() / FLASH_PERIOD.as_millis()) % 2 == 0
    }

    /// Confetti only falls during the animated part of the reward.
    pub fn is_animating(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started_at) < ANIMATION
    }

    pub fn update<R: Rng + ?Sized>(&mut self, now: Instant, rng: &mut R) {
        if !self.is_animating(now) {
            self.confetti.clear();
            return;
        }

        // Speeds are cells per tenth of a second.
        let dt = now.saturating_duration_since(self.last_update).as_secs_f64() * 10.0;
        self.last_update = now;

        let (width, height) = (self.width, self.height);
        for c in &mut self.confetti {
            c.y += c.speed * dt;
            if c.y > height {
                *c = Confetto::random(rng, width, 0.0, height / 2.0);
            }
        }
    }
}
