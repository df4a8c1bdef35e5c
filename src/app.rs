//! Interactive game loop: owns the screens, the drawing surface and the
//! per-session coordinator, and turns input events into state changes.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::canvas::{DrawingSurface, Point, Region, Rgb, StrokeTracker};
use crate::celebration::Celebration;
use crate::classifier::ClassificationClient;
use crate::config::Config;
use crate::coordinator::{GuessCoordinator, Trigger};
use crate::error::GameError;
use crate::runtime::GameEvent;
use crate::session::{EndReason, GuessOutcome, JokerOutcome, SessionConfig, SessionState, SessionSummary};
use crate::vocabulary::Vocabulary;

pub const TOP_BAR_ROWS: u16 = 3;
pub const HELP_BAR_ROWS: u16 = 3;

/// Brush colours with their keys: noir, rouge, vert, jaune, bleu.
pub const PALETTE: [(char, Rgb); 5] = [
    ('n', Rgb::BLACK),
    ('r', Rgb::RED),
    ('v', Rgb::GREEN),
    ('j', Rgb::YELLOW),
    ('b', Rgb::BLUE),
];

/// First row and height of the drawable area for a terminal `height` rows tall.
pub fn canvas_rows(height: u16) -> (u16, u16) {
    (TOP_BAR_ROWS, height.saturating_sub(TOP_BAR_ROWS + HELP_BAR_ROWS))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Brush {
    pub color: Rgb,
    pub size: u32,
    min: u32,
    max: u32,
    step: u32,
}

impl Brush {
    pub fn from_config(config: &Config) -> Self {
        let (min, max) = config.brush_bounds();
        Self {
            color: Rgb::BLACK,
            size: config.brush_size.clamp(min, max),
            min,
            max,
            step: config.brush_step.max(1),
        }
    }

    pub fn grow(&mut self) {
        self.size = (self.size + self.step).min(self.max);
    }

    pub fn shrink(&mut self) {
        self.size = self.size.saturating_sub(self.step).max(self.min);
    }
}

/// State of the playing screen. Dropping it tears the worker down.
#[derive(Debug)]
pub struct Game {
    pub session: SessionState,
    pub surface: DrawingSurface,
    pub stroke: StrokeTracker,
    pub brush: Brush,
    pub celebration: Option<Celebration>,
    /// Drawable part of the surface, in pixels.
    pub area: Region,
    coordinator: GuessCoordinator,
}

impl Game {
    fn new(
        session: SessionState,
        coordinator: GuessCoordinator,
        config: &Config,
        (cols, rows): (u16, u16),
    ) -> Result<Self, GameError> {
        let (first_row, height) = canvas_rows(rows);
        Ok(Self {
            session,
            surface: DrawingSurface::for_terminal(cols, rows)?,
            stroke: StrokeTracker::default(),
            brush: Brush::from_config(config),
            celebration: None,
            area: Region::from_rows(first_row, height, cols),
            coordinator,
        })
    }

    pub fn in_reward(&self) -> bool {
        self.celebration.is_some()
    }

    pub fn guess_pending(&self) -> bool {
        self.coordinator.is_busy()
    }

    fn reset_canvas(&mut self) {
        self.surface.clear();
        self.stroke.end();
    }

    fn resize(&mut self, cols: u16, rows: u16) -> Result<(), GameError> {
        let (first_row, height) = canvas_rows(rows);
        self.surface = DrawingSurface::for_terminal(cols, rows)?;
        self.area = Region::from_rows(first_row, height, cols);
        self.stroke.end();
        debug!(cols, rows, "canvas reallocated");
        Ok(())
    }

    /// Snapshot the drawable area and hand it to the worker for this round.
    fn request_guess(&mut self) -> Trigger {
        let token = self.session.current_token();
        self.coordinator
            .request_classification(token, self.surface.snapshot(self.area))
    }

    fn on_mouse(&mut self, mouse: MouseEvent) {
        let at = Point::from_cell(mouse.column, mouse.row);
        let inside = self.area.contains(at);
        let width = self.brush.size as f32;

        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) if inside => {
                self.stroke.begin(at);
                self.surface.draw_dot(at, self.brush.color, width);
            }
            MouseEventKind::Drag(MouseButton::Left) if self.stroke.is_active() => {
                if !inside {
                    self.stroke.interrupt();
                    return;
                }
                match self.stroke.extend(at) {
                    Some(from) => self.surface.draw_stroke(from, at, self.brush.color, width),
                    None => self.surface.draw_dot(at, self.brush.color, width),
                }
            }
            MouseEventKind::Up(MouseButton::Left) => {
                if self.stroke.end() {
                    self.request_guess();
                }
            }
            _ => {}
        }
    }
}

#[derive(Debug)]
pub enum Screen {
    Menu,
    Playing(Box<Game>),
    Ended(SessionSummary),
}

pub struct App {
    pub config: Config,
    pub vocabulary: Vocabulary,
    pub screen: Screen,
    /// Terminal size in cells.
    pub size: (u16, u16),
    /// Time of the last processed event; the renderer reads clocks from here.
    pub now: Instant,
    client: Arc<dyn ClassificationClient>,
    rng: StdRng,
}

impl App {
    pub fn new(
        config: Config,
        vocabulary: Vocabulary,
        client: Arc<dyn ClassificationClient>,
        size: (u16, u16),
    ) -> Self {
        Self::with_rng(config, vocabulary, client, size, StdRng::from_entropy())
    }

    pub fn with_rng(
        config: Config,
        vocabulary: Vocabulary,
        client: Arc<dyn ClassificationClient>,
        size: (u16, u16),
        rng: StdRng,
    ) -> Self {
        Self {
            config,
            vocabulary,
            screen: Screen::Menu,
            size,
            now: Instant::now(),
            client,
            rng,
        }
    }

    pub fn game(&self) -> Option<&Game> {
        match &self.screen {
            Screen::Playing(game) => Some(&**game),
            _ => None,
        }
    }

    /// Process one event, then advance the frame.
    pub fn handle_event(&mut self, event: GameEvent, now: Instant) -> Control {
        self.now = now;
        let control = match event {
            GameEvent::Key(key) => self.on_key(key, now),
            GameEvent::Mouse(mouse) => {
                if let Screen::Playing(game) = &mut self.screen {
                    if !game.in_reward() {
                        game.on_mouse(mouse);
                    }
                }
                Control::Continue
            }
            GameEvent::Resize(cols, rows) => {
                self.on_resize(cols, rows);
                Control::Continue
            }
            GameEvent::Tick => Control::Continue,
        };

        if control == Control::Continue {
            self.update(now);
        }
        control
    }

    fn on_key(&mut self, key: KeyEvent, now: Instant) -> Control {
        if key.kind != KeyEventKind::Press {
            return Control::Continue;
        }
        let ctrl_c = key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl_c || matches!(key.code, KeyCode::Char('q') | KeyCode::Char('Q')) {
            info!("quit requested");
            return Control::Quit;
        }

        match &mut self.screen {
            Screen::Menu => {
                if key.code == KeyCode::Char(' ') {
                    if let Err(e) = self.start_game(now) {
                        warn!(error = %e, "could not start a session");
                    }
                }
            }
            Screen::Ended(_) => {
                if key.code == KeyCode::Char(' ') {
                    self.screen = Screen::Menu;
                }
            }
            Screen::Playing(game) => {
                if game.in_reward() {
                    return Control::Continue;
                }
                match key.code {
                    KeyCode::Up => game.brush.grow(),
                    KeyCode::Down => game.brush.shrink(),
                    KeyCode::Char(c) => match c.to_ascii_lowercase() {
                        'c' => {
                            game.reset_canvas();
                            game.request_guess();
                        }
                        'p' => match game.session.use_joker(now, &mut self.rng) {
                            JokerOutcome::Skipped { .. } => game.reset_canvas(),
                            // The session is over; update() shows the summary.
                            JokerOutcome::Exhausted { .. } => {}
                            JokerOutcome::Unavailable => debug!("joker refused"),
                        },
                        other => {
                            if let Some((_, color)) = PALETTE.iter().find(|(k, _)| *k == other) {
                                game.brush.color = *color;
                            }
                        }
                    },
                    _ => {}
                }
            }
        }
        Control::Continue
    }

    fn on_resize(&mut self, cols: u16, rows: u16) {
        self.size = (cols, rows);
        if let Screen::Playing(game) = &mut self.screen {
            if let Err(e) = game.resize(cols, rows) {
                warn!(error = %e, "canvas resize failed");
            }
        }
    }

    /// Menu → Playing with a fresh session and worker. An empty vocabulary
    /// goes straight to the summary.
    pub fn start_game(&mut self, now: Instant) -> Result<(), GameError> {
        let session = match SessionState::start(
            SessionConfig::from(&self.config),
            &self.vocabulary,
            now,
            &mut self.rng,
        ) {
            Ok(session) => session,
            Err(GameError::VocabularyExhausted) => {
                warn!(vocabulary = %self.vocabulary.name, "nothing to draw");
                self.screen = Screen::Ended(SessionSummary {
                    reason: EndReason::VocabularyExhausted,
                    score: 0,
                    guessed_words: Vec::new(),
                    skipped_words: Vec::new(),
                    duration: Duration::ZERO,
                });
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let coordinator = GuessCoordinator::spawn(self.client.clone(), self.vocabulary.prompt.clone())?;
        let game = Game::new(session, coordinator, &self.config, self.size)?;
        self.screen = Screen::Playing(Box::new(game));
        Ok(())
    }

    /// Per-frame work: merge results, finish the reward phase, check the clock.
    fn update(&mut self, now: Instant) {
        let Screen::Playing(game) = &mut self.screen else {
            return;
        };

        if let Some(result) = game.coordinator.poll_result() {
            debug!(round = result.token.0, guess = %result.text, "guess received");
            if let GuessOutcome::Matched(_) = game.session.apply_result(result) {
                game.stroke.end();
                let (cols, rows) = (self.size.0, canvas_rows(self.size.1).1);
                game.celebration = Some(Celebration::start(
                    &game.session.round.last_guess,
                    self.config.reward_duration(),
                    cols,
                    rows,
                    now,
                    &mut self.rng,
                ));
            }
        }

        let reward_done = game.celebration.as_ref().map(|c| c.is_finished(now));
        match reward_done {
            Some(true) => {
                game.celebration = None;
                match game.session.next_round(now, &mut self.rng) {
                    Ok(()) => game.reset_canvas(),
                    Err(reason) => debug!(%reason, "no next round"),
                }
            }
            Some(false) => {
                if let Some(c) = game.celebration.as_mut() {
                    c.update(now, &mut self.rng);
                }
            }
            None => {}
        }

        game.session.check_timeout(now);
        if !game.session.is_active() {
            self.finish();
        }
    }

    /// Playing → Ended. Tears the worker down.
    fn finish(&mut self) {
        let screen = std::mem::replace(&mut self.screen, Screen::Menu);
        self.screen = match screen {
            Screen::Playing(game) => {
                let game = *game;
                let teardown = game.coordinator.shutdown();
                debug!(?teardown, "classification worker stopped");
                match game.session.summary() {
                    Some(summary) => Screen::Ended(summary),
                    None => Screen::Menu,
                }
            }
            other => other,
        };
    }
}
