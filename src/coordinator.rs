//! Bridges the interactive loop and the single classification worker.
//!
//! The interactive thread snapshots the canvas and calls
//! [`GuessCoordinator::request_classification`]; it never waits on the
//! worker. At most one classification call is in flight. A trigger that
//! arrives before the worker picked up the pending request replaces it (last
//! write wins); a trigger that arrives while a call is in flight is dropped.
//! A result left unpolled does not block new requests: the next result
//! overwrites it.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::canvas::Snapshot;
use crate::classifier::{ClassificationClient, ClassifyError};
use crate::round::{normalize_guess, RoundToken};
use crate::session::GuessResult;

/// What happened to a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Queued,
    /// Took the place of a request the worker had not picked up yet.
    Replaced,
    /// Dropped: a call is in flight.
    Coalesced,
    /// The coordinator is shutting down.
    Closed,
}

/// How the worker was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    Joined,
    /// A call was still running; the worker exits once it returns.
    Detached,
    AlreadyStopped,
}

#[derive(Debug)]
struct Request {
    token: RoundToken,
    snapshot: Snapshot,
}

#[derive(Debug, Default)]
struct Slot {
    pending: Option<Request>,
    in_flight: bool,
    result: Option<GuessResult>,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct Shared {
    slot: Mutex<Slot>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        // A poisoned slot only means a panic elsewhere; its data is still a
        // consistent set of flags.
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct GuessCoordinator {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for GuessCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuessCoordinator")
            .field("busy", &self.is_busy())
            .finish()
    }
}

impl GuessCoordinator {
    /// Start the worker. `prompt` is sent with every drawing.
    pub fn spawn(client: Arc<dyn ClassificationClient>, prompt: String) -> std::io::Result<Self> {
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);

        let worker = thread::Builder::new()
            .name("classifier".into())
            .spawn(move || worker_loop(&worker_shared, client.as_ref(), &prompt))?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Ask for a classification of `snapshot` on behalf of round `token`.
    pub fn request_classification(&self, token: RoundToken, snapshot: Snapshot) -> Trigger {
        let mut slot = self.shared.lock();

        let trigger = if slot.shutdown {
            Trigger::Closed
        } else if slot.in_flight {
            Trigger::Coalesced
        } else if slot.pending.is_some() {
            slot.pending = Some(Request { token, snapshot });
            Trigger::Replaced
        } else {
            slot.pending = Some(Request { token, snapshot });
            Trigger::Queued
        };
        drop(slot);

        match trigger {
            Trigger::Queued | Trigger::Replaced => {
                debug!(round = token.0, ?trigger, "guess requested");
                self.shared.wake.notify_all();
            }
            Trigger::Coalesced => debug!(round = token.0, "guess request coalesced"),
            Trigger::Closed => {}
        }
        trigger
    }

    /// Latest result, if one arrived since the previous poll.
    pub fn poll_result(&self) -> Option<GuessResult> {
        self.shared.lock().result.take()
    }

    pub fn in_flight(&self) -> bool {
        self.shared.lock().in_flight
    }

    /// A request is pending, being classified, or its result is unpolled.
    pub fn is_busy(&self) -> bool {
        let slot = self.shared.lock();
        slot.in_flight || slot.pending.is_some() || slot.result.is_some()
    }

    /// Signal the worker to stop. Joins it when idle; a worker stuck in a
    /// call is detached and exits as soon as the call returns.
    pub fn shutdown(mut self) -> Teardown {
        self.stop()
    }

    fn stop(&mut self) -> Teardown {
        let Some(worker) = self.worker.take() else {
            return Teardown::AlreadyStopped;
        };

        let in_flight = {
            let mut slot = self.shared.lock();
            slot.shutdown = true;
            slot.pending = None;
            slot.in_flight
        };
        self.shared.wake.notify_all();

        if in_flight {
            debug!("classifier busy at shutdown, detaching");
            Teardown::Detached
        } else {
            if worker.join().is_err() {
                warn!("classifier worker panicked");
            }
            Teardown::Joined
        }
    }
}

impl Drop for GuessCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: &Shared, client: &dyn ClassificationClient, prompt: &str) {
    debug!("classifier worker started");
    loop {
        let request = {
            let mut slot = shared.lock();
            loop {
                if slot.shutdown {
                    debug!("classifier worker stopping");
                    return;
                }
                if let Some(request) = slot.pending.take() {
                    slot.in_flight = true;
                    break request;
                }
                slot = shared.wake.wait(slot).unwrap_or_else(|e| e.into_inner());
            }
        };

        let text = match classify(client, &request.snapshot, prompt) {
            Ok(raw) => {
                let text = normalize_guess(&raw);
                info!(round = request.token.0, guess = %text, "classifier answered");
                text
            }
            Err(e) => {
                warn!(round = request.token.0, error = %e, "classification failed");
                String::new()
            }
        };

        let mut slot = shared.lock();
        slot.in_flight = false;
        if !slot.shutdown {
            slot.result = Some(GuessResult {
                token: request.token,
                text,
            });
        }
    }
}

fn classify(
    client: &dyn ClassificationClient,
    snapshot: &Snapshot,
    prompt: &str,
) -> Result<String, ClassifyError> {
    let png = snapshot.to_png()?;
    client.classify(&png, prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    /// Answers with a fixed text after `delay`, tracking concurrency.
    struct SlowClient {
        answer: Result<String, ()>,
        delay: Duration,
        calls: AtomicUsize,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    impl SlowClient {
        fn new(answer: &str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                answer: Ok(answer.to_string()),
                delay,
                calls: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
            })
        }

        fn failing(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                answer: Err(()),
                delay,
                calls: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
            })
        }
    }

    impl ClassificationClient for SlowClient {
        fn classify(&self, png: &[u8], _prompt: &str) -> Result<String, ClassifyError> {
            assert!(!png.is_empty());
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            thread::sleep(self.delay);
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.answer
                .clone()
                .map_err(|_| ClassifyError::Transport("boom".into()))
        }
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            width: 2,
            height: 2,
            pixels: vec![255; 12],
        }
    }

    fn wait_for_result(c: &GuessCoordinator, timeout: Duration) -> Option<GuessResult> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(r) = c.poll_result() {
                return Some(r);
            }
            thread::sleep(Duration::from_millis(2));
        }
        None
    }

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn result_is_normalized_and_tagged() {
        let client = SlowClient::new("  Un CHAT Noir ", Duration::from_millis(5));
        let c = GuessCoordinator::spawn(client, "p".into()).unwrap();

        assert_eq!(c.request_classification(RoundToken(7), snapshot()), Trigger::Queued);
        let r = wait_for_result(&c, Duration::from_secs(2)).expect("result");
        assert_eq!(
            r,
            GuessResult {
                token: RoundToken(7),
                text: "un chat noir".into()
            }
        );
        assert!(c.poll_result().is_none());
    }

    #[test]
    fn triggers_during_a_call_are_coalesced() {
        let client = SlowClient::new("chat", Duration::from_millis(80));
        let c = GuessCoordinator::spawn(client.clone(), "p".into()).unwrap();

        c.request_classification(RoundToken(1), snapshot());
        assert!(wait_until(Duration::from_secs(2), || c.in_flight()));

        for _ in 0..20 {
            assert_eq!(
                c.request_classification(RoundToken(1), snapshot()),
                Trigger::Coalesced
            );
        }

        assert!(wait_for_result(&c, Duration::from_secs(2)).is_some());
        assert!(wait_until(Duration::from_secs(1), || !c.is_busy()));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn never_more_than_one_call_in_flight() {
        let client = SlowClient::new("chat", Duration::from_millis(10));
        let c = GuessCoordinator::spawn(client.clone(), "p".into()).unwrap();

        let deadline = Instant::now() + Duration::from_millis(300);
        while Instant::now() < deadline {
            c.request_classification(RoundToken(1), snapshot());
            c.poll_result();
            thread::sleep(Duration::from_millis(1));
        }

        assert!(client.calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(client.max_running.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unpolled_result_does_not_block_new_requests() {
        let client = SlowClient::new("chat", Duration::from_millis(1));
        let c = GuessCoordinator::spawn(client.clone(), "p".into()).unwrap();

        c.request_classification(RoundToken(1), snapshot());
        assert!(wait_until(Duration::from_secs(2), || {
            let slot = c.shared.lock();
            slot.result.is_some() && !slot.in_flight
        }));
        assert_eq!(
            c.request_classification(RoundToken(2), snapshot()),
            Trigger::Queued
        );

        assert!(wait_until(Duration::from_secs(2), || {
            client.calls.load(Ordering::SeqCst) == 2 && !c.in_flight()
        }));
        let r = wait_for_result(&c, Duration::from_secs(2)).expect("result");
        assert_eq!(r.token, RoundToken(2));
        assert!(c.poll_result().is_none());
    }

    #[test]
    fn pending_request_is_replaced_by_newer_one() {
        // No worker attached, so nothing picks the request up.
        let c = GuessCoordinator {
            shared: Arc::new(Shared::default()),
            worker: None,
        };

        assert_eq!(c.request_classification(RoundToken(1), snapshot()), Trigger::Queued);
        assert_eq!(
            c.request_classification(RoundToken(2), snapshot()),
            Trigger::Replaced
        );
        assert!(c.is_busy());
        assert!(!c.in_flight());

        let slot = c.shared.lock();
        assert_eq!(slot.pending.as_ref().map(|r| r.token), Some(RoundToken(2)));
    }

    #[test]
    fn failure_yields_empty_guess_and_worker_survives() {
        let client = SlowClient::failing(Duration::from_millis(1));
        let c = GuessCoordinator::spawn(client.clone(), "p".into()).unwrap();

        c.request_classification(RoundToken(3), snapshot());
        let r = wait_for_result(&c, Duration::from_secs(2)).expect("result");
        assert_eq!(r.text, "");
        assert!(!c.in_flight());

        assert_eq!(
            c.request_classification(RoundToken(3), snapshot()),
            Trigger::Queued
        );
        assert!(wait_for_result(&c, Duration::from_secs(2)).is_some());
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn idle_worker_is_joined_on_shutdown() {
        let client = SlowClient::new("chat", Duration::from_millis(1));
        let c = GuessCoordinator::spawn(client.clone(), "p".into()).unwrap();

        assert_eq!(c.shutdown(), Teardown::Joined);
        assert_eq!(Arc::strong_count(&client), 1);
    }

    #[test]
    fn busy_worker_is_detached_and_exits_later() {
        let client = SlowClient::new("chat", Duration::from_millis(100));
        let c = GuessCoordinator::spawn(client.clone(), "p".into()).unwrap();

        c.request_classification(RoundToken(1), snapshot());
        assert!(wait_until(Duration::from_secs(2), || c.in_flight()));

        assert_eq!(c.shutdown(), Teardown::Detached);
        assert!(wait_until(Duration::from_secs(2), || Arc::strong_count(&client) == 1));
    }

    #[test]
    fn requests_after_shutdown_are_refused() {
        let client = SlowClient::new("chat", Duration::from_millis(1));
        let mut c = GuessCoordinator::spawn(client, "p".into()).unwrap();

        assert_eq!(c.stop(), Teardown::Joined);
        assert_eq!(c.stop(), Teardown::AlreadyStopped);
        assert_eq!(
            c.request_classification(RoundToken(1), snapshot()),
            Trigger::Closed
        );
    }
}
