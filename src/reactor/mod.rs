//! Reactor: the server's time-event loop
//!
//! Client I/O is driven by the tokio runtime (one task per connection), so
//! the reactor only multiplexes *time events*: callbacks registered to fire
//! after a delay. It runs on its own task and processes due timers one at a
//! time, which is what lets the cron timer mutate the keyspace without ever
//! overlapping with itself.
//!
//! ## One pass of the loop
//!
//! ```text
//!   earliest fire time ──► sleep until then (or until woken by a
//!                          registration / stop)
//!                      ──► collect timers due at `now`
//!                      ──► run them in (fire time, id) order
//!                      ──► Reschedule(d): re-arm at now + d
//!                          Terminate / one-shot: drop
//! ```
//!
//! Timers that become due while a pass is running wait for the next pass,
//! so a zero-delay reschedule cannot starve the loop.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Identifier of a registered time event.
pub type EventId = u64;

/// What a timer wants after it fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Fire again after this delay
    Reschedule(Duration),
    /// Remove the timer
    Terminate,
}

/// Timer body. Errors are logged and do not stop the reactor.
pub type TimerCallback = Box<dyn FnMut(EventId) -> anyhow::Result<TimerAction> + Send>;

struct TimeEvent {
    when: Instant,
    /// Last delay used, reused when a repeating callback fails
    interval: Duration,
    repeat: bool,
    /// Taken out while the callback runs
    callback: Option<TimerCallback>,
}

#[derive(Default)]
struct TimerQueue {
    next_id: EventId,
    due: BTreeSet<(Instant, EventId)>,
    events: HashMap<EventId, TimeEvent>,
    stopped: bool,
}

/// The time-event loop. Share it behind an `Arc`.
#[derive(Default)]
pub struct Reactor {
    queue: Mutex<TimerQueue>,
    wake: Notify,
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let queue = self.queue.lock();
        f.debug_struct("Reactor")
            .field("timers", &queue.events.len())
            .field("stopped", &queue.stopped)
            .finish()
    }
}

impl Reactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a timer firing `delay` from now.
    ///
    /// A one-shot timer (`repeat == false`) is removed after its single run
    /// whatever the callback returns.
    pub fn register_timer<F>(&self, delay: Duration, repeat: bool, callback: F) -> EventId
    where
        F: FnMut(EventId) -> anyhow::Result<TimerAction> + Send + 'static,
    {
        let when = Instant::now() + delay;
        let id = {
            let mut queue = self.queue.lock();
            queue.next_id += 1;
            let id = queue.next_id;
            queue.due.insert((when, id));
            queue.events.insert(
                id,
                TimeEvent {
                    when,
                    interval: delay,
                    repeat,
                    callback: Some(Box::new(callback)),
                },
            );
            id
        };

        debug!(id, delay_ms = delay.as_millis() as u64, repeat, "Timer registered");
        self.wake.notify_one();
        id
    }

    /// Removes a timer. Returns false if it does not exist.
    ///
    /// Cancelling a timer from inside its own callback prevents it from
    /// being rescheduled.
    pub fn cancel_timer(&self, id: EventId) -> bool {
        let mut queue = self.queue.lock();
        match queue.events.remove(&id) {
            Some(event) => {
                queue.due.remove(&(event.when, id));
                debug!(id, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Number of registered timers.
    pub fn timer_count(&self) -> usize {
        self.queue.lock().events.len()
    }

    /// Makes [`run`](Self::run) return after the current pass.
    pub fn stop(&self) {
        self.queue.lock().stopped = true;
        self.wake.notify_one();
    }

    /// Runs the loop until [`stop`](Self::stop) is called.
    pub async fn run(&self) {
        info!("Reactor started");

        loop {
            let next = {
                let queue = self.queue.lock();
                if queue.stopped {
                    break;
                }
                queue.due.first().map(|(when, _)| *when)
            };

            match next {
                Some(when) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(when) => {}
                        // Something changed; recompute the earliest timer.
                        _ = self.wake.notified() => continue,
                    }
                }
                None => {
                    self.wake.notified().await;
                    continue;
                }
            }

            self.process_due(Instant::now());
        }

        info!("Reactor stopped");
    }

    /// Runs every timer due at `now`, in fire-time order.
    fn process_due(&self, now: Instant) {
        let ready: Vec<EventId> = {
            let queue = self.queue.lock();
            queue
                .due
                .iter()
                .take_while(|(when, _)| *when <= now)
                .map(|(_, id)| *id)
                .collect()
        };

        for id in ready {
            let (mut callback, interval, repeat) = {
                let mut queue = self.queue.lock();
                let Some(event) = queue.events.get_mut(&id) else {
                    // Cancelled by an earlier callback in this pass.
                    continue;
                };
                let Some(callback) = event.callback.take() else {
                    continue;
                };
                let when = event.when;
                let (interval, repeat) = (event.interval, event.repeat);
                queue.due.remove(&(when, id));
                (callback, interval, repeat)
            };

            // The lock is released so callbacks may register or cancel timers.
            let outcome = callback(id);

            let next_delay = match outcome {
                Ok(TimerAction::Reschedule(delay)) if repeat => Some(delay),
                Ok(_) => None,
                Err(e) => {
                    warn!(id, error = %e, "Timer callback failed");
                    repeat.then_some(interval)
                }
            };

            let mut queue = self.queue.lock();
            match next_delay {
                Some(delay) => {
                    let when = Instant::now() + delay;
                    let Some(event) = queue.events.get_mut(&id) else {
                        // Cancelled while running.
                        continue;
                    };
                    event.when = when;
                    event.interval = delay;
                    event.callback = Some(callback);
                    queue.due.insert((when, id));
                }
                None => {
                    if queue.events.remove(&id).is_some() {
                        debug!(id, "Timer finished");
                    }
                }
            }
        }
    }
}
