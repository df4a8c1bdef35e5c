//! Event plumbing for the game loop: a background reader turns terminal
//! input into [`GameEvent`]s and the [`Runner`] hands them out one per
//! frame, synthesising a tick when the frame passes without input.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent, MouseEvent, MouseEventKind};

/// Frame length when nothing is pressed or drawn (about 60 fps).
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Clone, Debug)]
pub enum GameEvent {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize(u16, u16),
    Tick,
}

/// Keeps the terminal events the game reacts to. Bare pointer motion and
/// scrolling never reach the loop; only button presses, drags and releases
/// matter for drawing.
pub fn translate(event: CtEvent) -> Option<GameEvent> {
    match event {
        CtEvent::Key(key) => Some(GameEvent::Key(key)),
        CtEvent::Mouse(mouse) => match mouse.kind {
            MouseEventKind::Down(_) | MouseEventKind::Drag(_) | MouseEventKind::Up(_) => {
                Some(GameEvent::Mouse(mouse))
            }
            _ => None,
        },
        CtEvent::Resize(cols, rows) => Some(GameEvent::Resize(cols, rows)),
        _ => None,
    }
}

pub trait GameEventSource: Send + 'static {
    /// Next event, or `Err(Timeout)` once `timeout` elapses without one.
    fn recv_timeout(&self, timeout: Duration) -> Result<GameEvent, RecvTimeoutError>;
}

/// Reads the terminal on its own thread. The reader stops when the terminal
/// errors or the receiving side goes away.
pub struct CrosstermEventSource {
    rx: Receiver<GameEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            while let Ok(raw) = event::read() {
                let Some(ev) = translate(raw) else { continue };
                if tx.send(ev).is_err() {
                    break;
                }
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl GameEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<GameEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for FixedTicker {
    fn default() -> Self {
        Self::new(FRAME_INTERVAL)
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Events pushed by hand through a channel; drives headless games.
pub struct TestEventSource {
    rx: Receiver<GameEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<GameEvent>) -> Self {
        Self { rx }
    }
}

impl GameEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<GameEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

pub struct Runner<E: GameEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: GameEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// One frame's worth of input. A closed source degrades to ticks so the
    /// session clock keeps running.
    pub fn step(&self) -> GameEvent {
        self.event_source
            .recv_timeout(self.ticker.interval())
            .unwrap_or(GameEvent::Tick)
    }
}
