//! Keyed write debouncer.
//!
//! Each key owns at most one timer. Scheduling again for the same key aborts
//! the previous timer and starts a new quiet interval; keys never affect one
//! another. The action runs on a tokio task once the interval elapses, or
//! right away when the debouncer is flushed.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use log::{debug, trace};
use tokio::task::JoinHandle;

type Action = Box<dyn FnOnce() + Send + 'static>;

struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
    action: Action,
}

#[derive(Default)]
struct Timers {
    next_generation: u64,
    by_key: HashMap<String, Timer>,
}

#[derive(Clone)]
pub struct Debouncer {
    delay: Duration,
    timers: Arc<Mutex<Timers>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            timers: Arc::new(Mutex::new(Timers::default())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn lock(&self) -> MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `action` once `key` has been quiet for the delay, replacing any
    /// action already waiting for that key.
    pub fn schedule<F>(&self, key: &str, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut timers = self.lock();
        timers.next_generation += 1;
        let generation = timers.next_generation;

        if let Some(previous) = timers.by_key.remove(key) {
            trace!("Resetting debounce timer for {}", key);
            previous.handle.abort();
        }

        let shared = Arc::clone(&self.timers);
        let delay = self.delay;
        let owned_key = key.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let action = {
                let mut timers = shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                match timers.by_key.get(&owned_key) {
                    Some(timer) if timer.generation == generation => {
                        timers.by_key.remove(&owned_key).map(|timer| timer.action)
                    }
                    // Superseded or cancelled after we woke up.
                    _ => None,
                }
            };
            if let Some(action) = action {
                debug!("Debounce interval elapsed for {}", owned_key);
                action();
            }
        });

        timers.by_key.insert(
            key.to_string(),
            Timer {
                generation,
                handle,
                action: Box::new(action),
            },
        );
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.lock().by_key.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().by_key.len()
    }

    /// Drops the waiting action for `key` without running it.
    pub fn cancel(&self, key: &str) -> bool {
        match self.lock().by_key.remove(key) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Drops every waiting action without running any of them.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Timer> = self.lock().by_key.drain().map(|(_, timer)| timer).collect();
        for timer in &drained {
            timer.handle.abort();
        }
        if !drained.is_empty() {
            debug!("Cancelled {} pending debounced actions", drained.len());
        }
        drained.len()
    }

    /// Runs every waiting action now, in the caller's context.
    pub fn flush_all(&self) -> usize {
        let drained: Vec<Timer> = self.lock().by_key.drain().map(|(_, timer)| timer).collect();
        let count = drained.len();
        for timer in drained {
            timer.handle.abort();
            (timer.action)();
        }
        if count > 0 {
            debug!("Flushed {} pending debounced actions", count);
        }
        count
    }
}
