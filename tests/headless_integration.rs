use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use rand::rngs::StdRng;
use rand::SeedableRng;

use croquis::app::{App, Control, Screen};
use croquis::classifier::{ClassificationClient, ClassifyError};
use croquis::config::Config;
use croquis::runtime::{FixedTicker, GameEvent, Runner, TestEventSource};
use croquis::session::EndReason;
use croquis::vocabulary::Vocabulary;

const FRAME: Duration = Duration::from_millis(16);
// Long enough that the step budgets below never hit the clock.
const SESSION_SECS: u64 = 600;

// Answers with a fixed text; optionally waits on a gate before answering.
struct Scripted {
    answer: String,
    gate: Option<Mutex<Receiver<()>>>,
    calls: AtomicUsize,
}

impl Scripted {
    fn answering(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.to_string(),
            gate: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn gated(answer: &str) -> (Arc<Self>, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let client = Arc::new(Self {
            answer: answer.to_string(),
            gate: Some(Mutex::new(rx)),
            calls: AtomicUsize::new(0),
        });
        (client, tx)
    }
}

impl ClassificationClient for Scripted {
    fn classify(&self, png: &[u8], _prompt: &str) -> Result<String, ClassifyError> {
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _ = gate.lock().unwrap().recv();
        }
        Ok(self.answer.clone())
    }
}

struct Harness {
    app: App,
    runner: Runner<TestEventSource, FixedTicker>,
    tx: Sender<GameEvent>,
    clock: Instant,
}

impl Harness {
    fn new(words: &[&str], client: Arc<dyn ClassificationClient>) -> Self {
        let base = Vocabulary::builtin("french").unwrap();
        let vocabulary = Vocabulary::from_words(&base, words);
        let config = Config {
            session_secs: SESSION_SECS,
            ..Config::default()
        };
        let app = App::with_rng(
            config,
            vocabulary,
            client,
            (80, 24),
            StdRng::seed_from_u64(42),
        );
        let (tx, rx) = mpsc::channel();
        let runner = Runner::new(
            TestEventSource::new(rx),
            FixedTicker::new(Duration::from_millis(2)),
        );
        Self {
            app,
            runner,
            tx,
            clock: Instant::now(),
        }
    }

    fn send(&self, ev: GameEvent) {
        self.tx.send(ev).unwrap();
    }

    fn key(&self, c: char) {
        self.send(GameEvent::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)));
    }

    fn mouse(&self, kind: MouseEventKind, column: u16, row: u16) {
        self.send(GameEvent::Mouse(MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }));
    }

    /// One stroke across the canvas, released inside it.
    fn scribble(&self) {
        self.mouse(MouseEventKind::Down(MouseButton::Left), 10, 10);
        self.mouse(MouseEventKind::Drag(MouseButton::Left), 20, 12);
        self.mouse(MouseEventKind::Drag(MouseButton::Left), 30, 10);
        self.mouse(MouseEventKind::Up(MouseButton::Left), 30, 10);
    }

    fn step(&mut self) -> Control {
        self.clock += FRAME;
        let ev = self.runner.step();
        self.app.handle_event(ev, self.clock)
    }

    /// Step until `done` holds; false if it never did.
    fn run_until(&mut self, max_steps: usize, done: impl Fn(&App) -> bool) -> bool {
        for _ in 0..max_steps {
            self.step();
            if done(&self.app) {
                return true;
            }
        }
        false
    }
}

fn score(app: &App) -> Option<u32> {
    app.game().map(|g| g.session.score)
}

#[test]
fn two_word_session_ends_when_vocabulary_runs_out() {
    // The answer names both words, so whichever comes first matches.
    let client = Scripted::answering("  Un CHAT ou un chien ");
    let mut h = Harness::new(&["chat", "chien"], client.clone());

    h.key(' ');
    assert!(h.run_until(10, |a| a.game().is_some()));
    let first = h.app.game().unwrap().session.round.target.clone();

    h.scribble();
    assert!(h.run_until(2000, |a| score(a) == Some(1)));
    let game = h.app.game().unwrap();
    assert!(game.in_reward());
    assert_eq!(game.session.round.last_guess, "un chat ou un chien");

    // Reward runs 1300ms of game time, then the second word comes up.
    assert!(h.run_until(200, |a| a
        .game()
        .is_some_and(|g| !g.in_reward() && g.session.round.target != first)));
    let game = h.app.game().unwrap();
    assert_eq!(game.session.round.last_guess, "");
    assert!(!game.stroke.is_active());

    h.scribble();
    assert!(h.run_until(2000, |a| matches!(a.screen, Screen::Ended(_))));

    match &h.app.screen {
        Screen::Ended(summary) => {
            assert_eq!(summary.reason, EndReason::VocabularyExhausted);
            assert_eq!(summary.score, 2);
            let mut words = summary.guessed_words.clone();
            words.sort();
            assert_eq!(words, vec!["chat", "chien"]);
        }
        _ => unreachable!(),
    }
    assert_eq!(client.calls.load(Ordering::SeqCst), 2);

    h.key(' ');
    assert!(h.run_until(10, |a| matches!(a.screen, Screen::Menu)));
}

#[test]
fn match_then_joker_on_the_last_word_ends_the_session() {
    let client = Scripted::answering("chat et chien");
    let mut h = Harness::new(&["chat", "chien"], client.clone());

    h.key(' ');
    assert!(h.run_until(10, |a| a.game().is_some()));
    let first = h.app.game().unwrap().session.round.target.clone();

    h.scribble();
    assert!(h.run_until(2000, |a| score(a) == Some(1)));
    assert!(h.run_until(200, |a| a.game().is_some_and(|g| !g.in_reward())));
    let second = h.app.game().unwrap().session.round.target.clone();
    assert_ne!(first, second);

    h.key('p');
    assert!(h.run_until(10, |a| matches!(a.screen, Screen::Ended(_))));

    match &h.app.screen {
        Screen::Ended(summary) => {
            assert_eq!(summary.reason, EndReason::VocabularyExhausted);
            assert_eq!(summary.score, 1);
            assert_eq!(summary.guessed_words, vec![first]);
            assert_eq!(summary.skipped_words, vec![second]);
        }
        _ => unreachable!(),
    }
    assert_eq!(client.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn stroke_released_before_the_result_is_polled_is_classified() {
    let client = Scripted::answering("rien");
    let mut h = Harness::new(&["chat"], client.clone());

    h.key(' ');
    assert!(h.run_until(10, |a| a.game().is_some()));
    h.scribble();
    for _ in 0..4 {
        h.step();
    }
    h.mouse(MouseEventKind::Down(MouseButton::Left), 40, 12);
    h.step();

    // Let the worker answer without stepping, so its result sits unpolled
    // when the second stroke ends.
    let deadline = Instant::now() + Duration::from_secs(2);
    while client.calls.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    std::thread::sleep(Duration::from_millis(200));

    h.mouse(MouseEventKind::Up(MouseButton::Left), 40, 12);
    assert!(h.run_until(2000, |_| client.calls.load(Ordering::SeqCst) == 2));
    assert!(h.run_until(2000, |a| a.game().is_some_and(|g| !g.guess_pending())));
    assert_eq!(h.app.game().unwrap().session.round.last_guess, "rien");
}

#[test]
fn result_for_a_skipped_round_is_discarded() {
    let (client, gate) = Scripted::gated("chat chien maison");
    let mut h = Harness::new(&["chat", "chien", "maison"], client.clone());

    h.key(' ');
    assert!(h.run_until(10, |a| a.game().is_some()));
    h.scribble();
    assert!(h.run_until(2000, |_| client.calls.load(Ordering::SeqCst) == 1));

    // Skip while the first round's guess is still out.
    h.key('p');
    assert!(h.run_until(10, |a| a.game().is_some_and(|g| g.session.jokers_remaining == 2)));

    gate.send(()).unwrap();
    assert!(h.run_until(2000, |a| a.game().is_some_and(|g| !g.guess_pending())));

    let game = h.app.game().unwrap();
    assert_eq!(game.session.score, 0);
    assert_eq!(game.session.round.last_guess, "");
    assert!(!game.in_reward());
}

#[test]
fn strokes_during_a_call_do_not_start_another() {
    let (client, gate) = Scripted::gated("rien");
    let mut h = Harness::new(&["chat"], client.clone());

    h.key(' ');
    assert!(h.run_until(10, |a| a.game().is_some()));
    h.scribble();
    assert!(h.run_until(2000, |_| client.calls.load(Ordering::SeqCst) == 1));

    h.scribble();
    h.key('c');
    for _ in 0..20 {
        h.step();
    }

    gate.send(()).unwrap();
    assert!(h.run_until(2000, |a| a.game().is_some_and(|g| !g.guess_pending())));

    let game = h.app.game().unwrap();
    assert_eq!(game.session.round.last_guess, "rien");
    assert_eq!(game.session.score, 0);
    assert_eq!(client.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn timeout_ends_session_even_with_a_call_in_flight() {
    let (client, gate) = Scripted::gated("chat");
    let mut h = Harness::new(&["chat"], client.clone());

    h.key(' ');
    assert!(h.run_until(10, |a| a.game().is_some()));
    h.scribble();
    assert!(h.run_until(2000, |_| client.calls.load(Ordering::SeqCst) == 1));

    // Jump the game clock past the session length.
    h.clock += Duration::from_secs(SESSION_SECS);
    h.step();

    match &h.app.screen {
        Screen::Ended(summary) => {
            assert_eq!(summary.reason, EndReason::Timeout);
            assert_eq!(summary.score, 0);
        }
        _ => panic!("session should have timed out"),
    }

    // The detached worker finishes its call; nothing is applied.
    gate.send(()).unwrap();
    assert_eq!(h.step(), Control::Continue);
    assert!(matches!(h.app.screen, Screen::Ended(_)));
}

#[test]
fn quit_from_menu() {
    let mut h = Harness::new(&["chat"], Scripted::answering(""));

    h.key('q');
    assert_eq!(h.step(), Control::Quit);
}
