// Copyright 2025 The Taskwire Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Dependency resolution for task arguments.
//!
//! For each submitted task, tracks the argument objects that are not yet
//! locally available and invokes a completion callback exactly once when
//! the last one arrives. Resolution is cancellable per task (used when
//! the target actor dies before the arguments show up).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use taskwire_common::id::{ObjectId, TaskId};

use crate::memory_store::MemoryStore;

/// Callback invoked once all of a task's dependencies are local.
pub type OnDependenciesResolved = Box<dyn FnOnce() + Send + 'static>;

struct ResolutionState {
    task_id: TaskId,
    remaining: Mutex<usize>,
    on_ready: Mutex<Option<OnDependenciesResolved>>,
    cancelled: AtomicBool,
}

/// Tracks in-flight dependency resolutions keyed by task id.
pub struct DependencyResolver {
    store: Arc<MemoryStore>,
    pending: Arc<Mutex<HashMap<TaskId, Arc<ResolutionState>>>>,
}

impl DependencyResolver {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Resolve `dependencies` for `task_id`, invoking `on_ready` exactly
    /// once when every object is locally available.
    ///
    /// With no dependencies (or all already local) `on_ready` runs inline
    /// in this call; otherwise it runs inline in the store's posted
    /// availability callback for the last missing object. Never blocks.
    pub fn resolve_dependencies(
        &self,
        task_id: TaskId,
        dependencies: Vec<ObjectId>,
        on_ready: OnDependenciesResolved,
    ) {
        let mut unique = dependencies;
        unique.sort_unstable();
        unique.dedup();

        if unique.is_empty() {
            on_ready();
            return;
        }

        let state = Arc::new(ResolutionState {
            task_id,
            remaining: Mutex::new(unique.len()),
            on_ready: Mutex::new(Some(on_ready)),
            cancelled: AtomicBool::new(false),
        });
        self.pending.lock().insert(task_id, state.clone());

        for object_id in unique {
            let state = state.clone();
            let pending = self.pending.clone();
            self.store.get_async(
                &object_id,
                Box::new(move |_object| {
                    if state.cancelled.load(Ordering::Acquire) {
                        return;
                    }
                    let ready = {
                        let mut remaining = state.remaining.lock();
                        *remaining -= 1;
                        *remaining == 0
                    };
                    if ready {
                        pending.lock().remove(&state.task_id);
                        if let Some(on_ready) = state.on_ready.lock().take() {
                            on_ready();
                        }
                    }
                }),
            );
        }
    }

    /// Cancel resolution for `task_id`; the ready callback will not fire.
    /// Returns whether a resolution was pending.
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        match self.pending.lock().remove(task_id) {
            Some(state) => {
                state.cancelled.store(true, Ordering::Release);
                state.on_ready.lock().take();
                tracing::debug!(task_id = %task_id, "cancelled dependency resolution");
                true
            }
            None => false,
        }
    }

    /// Number of tasks with unresolved dependencies.
    pub fn num_pending_tasks(&self) -> usize {
        self.pending.lock().len()
    }
}
