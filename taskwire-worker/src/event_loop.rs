// Copyright 2025 The Taskwire Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Cooperative event loop for submitter callbacks.
//!
//! All user-visible notifications (dependency-ready continuations,
//! deferred submit work, force-fail notifications) run serially through
//! one of these. Production drives it with [`EventLoop::run`] on a
//! dedicated task; tests pump it manually with [`EventLoop::poll_one`]
//! to get deterministic interleavings.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// A serialized callback queue.
pub struct EventLoop {
    queue: Mutex<VecDeque<Callback>>,
    notify: Notify,
}

impl EventLoop {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Enqueue a callback to run on the loop.
    pub fn post<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue.lock().push_back(Box::new(callback));
        self.notify.notify_one();
    }

    /// Run one queued callback. Returns whether one ran.
    ///
    /// The queue lock is not held while the callback runs, so callbacks
    /// may post further work.
    pub fn poll_one(&self) -> bool {
        let callback = self.queue.lock().pop_front();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Run queued callbacks until the queue is empty. Returns how many ran.
    pub fn poll(&self) -> usize {
        let mut count = 0;
        while self.poll_one() {
            count += 1;
        }
        count
    }

    /// Drive the loop forever. Intended to be spawned on its own task.
    pub async fn run(&self) {
        loop {
            let notified = self.notify.notified();
            if self.poll() == 0 {
                notified.await;
            }
        }
    }

    /// Number of callbacks currently queued.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_poll_one_runs_in_post_order() {
        let event_loop = EventLoop::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            event_loop.post(move || order.lock().push(i));
        }
        assert!(event_loop.poll_one());
        assert!(event_loop.poll_one());
        assert!(event_loop.poll_one());
        assert!(!event_loop.poll_one());
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_callbacks_may_repost() {
        let event_loop = Arc::new(EventLoop::new());
        let ran = Arc::new(AtomicUsize::new(0));
        let el = event_loop.clone();
        let ran2 = ran.clone();
        event_loop.post(move || {
            let ran2 = ran2.clone();
            el.post(move || {
                ran2.fetch_add(1, Ordering::Relaxed);
            });
        });
        assert_eq!(event_loop.poll(), 2);
        assert_eq!(ran.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_run_drains_posted_work() {
        let event_loop = Arc::new(EventLoop::new());
        let el = event_loop.clone();
        let driver = tokio::spawn(async move { el.run().await });

        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Mutex::new(Some(tx));
        event_loop.post(move || {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(());
            }
        });
        rx.await.unwrap();
        driver.abort();
    }
}
