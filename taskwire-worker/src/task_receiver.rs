// Copyright 2025 The Taskwire Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Execution-side handling of inbound `PushTask` requests.
//!
//! Before a task runs, the receiver admits or rejects it per caller:
//! the caller-assigned actor counter must move strictly forward for a
//! given caller worker, and a replaced caller worker is recognized by a
//! strictly newer caller timestamp (its counters restart from scratch).
//! This filter is what makes the submitter's replay-after-restart
//! protocol safe: a reconstructed caller is admitted from counter zero,
//! while stale callers and duplicate counters are rejected with a
//! non-retryable error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use taskwire_common::id::{ActorId, ObjectId, WorkerId};
use taskwire_proto::{PushTaskReply, PushTaskRequest, ReturnObject, TaskSpec, TaskType};

use crate::error::{WorkerError, WorkerResult};
use crate::memory_store::{MemoryStore, StoredObject};

/// Result of executing a single task.
#[derive(Debug, Clone, Default)]
pub struct TaskResult {
    pub return_objects: Vec<ReturnObject>,
    pub is_retryable_error: bool,
    pub is_application_error: bool,
    pub error_message: String,
}

/// Callback that executes a task and returns the result.
pub type TaskExecutionCallback = Arc<dyn Fn(&TaskSpec) -> WorkerResult<TaskResult> + Send + Sync>;

/// Last-seen caller incarnation and its accepted-counter watermark.
struct CallerState {
    worker_id: Vec<u8>,
    timestamp: i64,
    max_accepted_counter: i64,
}

/// Admits, executes, and replies to pushed tasks on the executing worker.
pub struct TaskReceiver {
    worker_id: WorkerId,
    store: Arc<MemoryStore>,
    execute_callback: Mutex<Option<TaskExecutionCallback>>,
    /// Duplicate filter state per (actor, caller).
    caller_states: Mutex<HashMap<(ActorId, Vec<u8>), CallerState>>,
    is_exiting: AtomicBool,
    total_executed: AtomicUsize,
}

impl TaskReceiver {
    pub fn new(worker_id: WorkerId, store: Arc<MemoryStore>) -> Self {
        Self {
            worker_id,
            store,
            execute_callback: Mutex::new(None),
            caller_states: Mutex::new(HashMap::new()),
            is_exiting: AtomicBool::new(false),
            total_executed: AtomicUsize::new(0),
        }
    }

    /// Register the task execution callback.
    pub fn set_execute_callback(&self, callback: TaskExecutionCallback) {
        *self.execute_callback.lock() = Some(callback);
    }

    /// Handle an inbound push: validate, admit, execute, store returns,
    /// and build the reply. Rejections return an error, which the
    /// transport layer surfaces as a non-retryable status.
    pub fn handle_push_task(&self, request: PushTaskRequest) -> WorkerResult<PushTaskReply> {
        if self.is_exiting.load(Ordering::Relaxed) {
            return Ok(PushTaskReply {
                worker_exiting: true,
                ..Default::default()
            });
        }

        if !request.intended_worker_id.is_empty() {
            let intended = WorkerId::from_binary(&request.intended_worker_id);
            if !intended.is_nil() && intended != self.worker_id {
                return Err(WorkerError::InvalidArgument(format!(
                    "task intended for worker {} but received by {}",
                    intended.hex(),
                    self.worker_id.hex()
                )));
            }
        }

        let task_spec = request
            .task_spec
            .ok_or_else(|| WorkerError::InvalidArgument("push request missing task_spec".into()))?;

        if task_spec.r#type == TaskType::ActorTask as i32 {
            self.admit_actor_task(&task_spec)?;
        }

        tracing::debug!(
            task_id = %hex::encode(&task_spec.task_id),
            name = %task_spec.name,
            seq = request.sequence_number,
            "executing task"
        );

        let result = self.execute_task(&task_spec);
        self.total_executed.fetch_add(1, Ordering::Relaxed);

        let task_result = match result {
            Ok(task_result) => task_result,
            Err(e) => {
                tracing::warn!(
                    task_id = %hex::encode(&task_spec.task_id),
                    error = %e,
                    "task execution failed"
                );
                TaskResult {
                    is_retryable_error: true,
                    error_message: e.to_string(),
                    ..Default::default()
                }
            }
        };

        for return_object in &task_result.return_objects {
            let object_id = ObjectId::from_binary(&return_object.object_id);
            let stored = StoredObject::new(
                Bytes::copy_from_slice(&return_object.data),
                Bytes::copy_from_slice(&return_object.metadata),
            );
            // A retried task may store the same return twice.
            let _ = self.store.put(object_id, stored);
        }

        Ok(PushTaskReply {
            return_objects: task_result.return_objects,
            worker_exiting: self.is_exiting.load(Ordering::Relaxed),
            is_retryable_error: task_result.is_retryable_error,
            is_application_error: task_result.is_application_error,
            task_execution_error: task_result.error_message,
        })
    }

    /// The duplicate filter. Admission rules per (actor, caller):
    /// same caller worker — counter must exceed the watermark; different
    /// caller worker — its timestamp must exceed the last seen one
    /// (caller reconstruction, watermark restarts at the new counter).
    fn admit_actor_task(&self, task_spec: &TaskSpec) -> WorkerResult<()> {
        let actor_spec = task_spec
            .actor_task_spec
            .as_ref()
            .ok_or_else(|| WorkerError::InvalidArgument("actor task missing actor_task_spec".into()))?;
        let actor_id = ActorId::from_binary(&actor_spec.actor_id);
        let counter = actor_spec.actor_counter;
        let caller_worker = task_spec.caller_worker_id_bytes().to_vec();
        let timestamp = task_spec.caller_timestamp;

        let mut states = self.caller_states.lock();
        match states.entry((actor_id, task_spec.caller_id.clone())) {
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(CallerState {
                    worker_id: caller_worker,
                    timestamp,
                    max_accepted_counter: counter,
                });
                Ok(())
            }
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                let state = entry.get_mut();
                if state.worker_id == caller_worker {
                    if counter > state.max_accepted_counter {
                        state.max_accepted_counter = counter;
                        state.timestamp = timestamp;
                        Ok(())
                    } else {
                        Err(WorkerError::DuplicateTask(format!(
                            "counter {} not above watermark {}",
                            counter, state.max_accepted_counter
                        )))
                    }
                } else if timestamp > state.timestamp {
                    // The caller was reconstructed on a new worker; its
                    // counters restart.
                    tracing::info!(
                        actor_id = %actor_id,
                        timestamp,
                        "caller reconstructed, resetting counter watermark"
                    );
                    state.worker_id = caller_worker;
                    state.timestamp = timestamp;
                    state.max_accepted_counter = counter;
                    Ok(())
                } else {
                    Err(WorkerError::StaleCaller(format!(
                        "timestamp {} not newer than {}",
                        timestamp, state.timestamp
                    )))
                }
            }
        }
    }

    fn execute_task(&self, task_spec: &TaskSpec) -> WorkerResult<TaskResult> {
        let callback = self.execute_callback.lock();
        let callback = callback.as_ref().ok_or(WorkerError::NotInitialized)?;
        callback(task_spec)
    }

    /// Mark the worker as exiting. New pushes reply `worker_exiting`.
    pub fn set_exiting(&self) {
        self.is_exiting.store(true, Ordering::Relaxed);
    }

    pub fn is_exiting(&self) -> bool {
        self.is_exiting.load(Ordering::Relaxed)
    }

    /// Total tasks executed since startup.
    pub fn total_executed(&self) -> usize {
        self.total_executed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use taskwire_common::id::TaskId;
    use taskwire_proto::{ActorTaskSpec, Address};

    use crate::event_loop::EventLoop;

    fn make_receiver() -> (WorkerId, Arc<MemoryStore>, TaskReceiver) {
        let worker_id = WorkerId::from_random();
        let store = Arc::new(MemoryStore::new(Arc::new(EventLoop::new())));
        let receiver = TaskReceiver::new(worker_id, store.clone());
        (worker_id, store, receiver)
    }

    fn success_callback() -> TaskExecutionCallback {
        Arc::new(|_spec: &TaskSpec| {
            let object_id = ObjectId::from_random();
            Ok(TaskResult {
                return_objects: vec![ReturnObject {
                    object_id: object_id.binary(),
                    data: b"result".to_vec(),
                    metadata: Vec::new(),
                }],
                ..Default::default()
            })
        })
    }

    fn actor_push_request(
        receiver_worker: &WorkerId,
        actor_id: &ActorId,
        caller_id: &TaskId,
        caller_worker: &WorkerId,
        counter: i64,
        timestamp: i64,
    ) -> PushTaskRequest {
        PushTaskRequest {
            intended_worker_id: receiver_worker.binary(),
            task_spec: Some(TaskSpec {
                task_id: TaskId::from_random().binary(),
                caller_id: caller_id.binary(),
                r#type: TaskType::ActorTask as i32,
                caller_address: Some(Address {
                    worker_id: caller_worker.binary(),
                    ip_address: "10.0.0.1".into(),
                    port: 7000,
                }),
                actor_task_spec: Some(ActorTaskSpec {
                    actor_id: actor_id.binary(),
                    actor_counter: counter,
                }),
                caller_timestamp: timestamp,
                ..Default::default()
            }),
            sequence_number: counter,
            client_processed_up_to: -1,
        }
    }

    #[test]
    fn test_execute_and_store_returns() {
        let (worker_id, store, receiver) = make_receiver();
        receiver.set_execute_callback(success_callback());

        let request = actor_push_request(
            &worker_id,
            &ActorId::from_random(),
            &TaskId::nil(),
            &WorkerId::from_random(),
            0,
            1_000,
        );
        let reply = receiver.handle_push_task(request).unwrap();
        assert!(!reply.worker_exiting);
        assert_eq!(reply.return_objects.len(), 1);
        let object_id = ObjectId::from_binary(&reply.return_objects[0].object_id);
        assert!(store.contains(&object_id));
        assert_eq!(receiver.total_executed(), 1);
    }

    #[test]
    fn test_counter_moves_forward_for_same_worker() {
        let (worker_id, _store, receiver) = make_receiver();
        receiver.set_execute_callback(success_callback());
        let actor_id = ActorId::from_random();
        let caller_id = TaskId::from_random();
        let caller_worker = WorkerId::from_random();
        let ts = 1_000;

        for counter in [0, 1] {
            let request = actor_push_request(
                &worker_id, &actor_id, &caller_id, &caller_worker, counter, ts,
            );
            assert!(receiver.handle_push_task(request).is_ok());
        }

        // Replays at or below the watermark are rejected.
        let request =
            actor_push_request(&worker_id, &actor_id, &caller_id, &caller_worker, 1, ts);
        assert!(matches!(
            receiver.handle_push_task(request),
            Err(WorkerError::DuplicateTask(_))
        ));
    }

    #[test]
    fn test_reconstructed_caller_restarts_counters() {
        let (worker_id, _store, receiver) = make_receiver();
        receiver.set_execute_callback(success_callback());
        let actor_id = ActorId::from_random();
        let caller_id = TaskId::from_random();
        let ts = 1_000;

        let w1 = WorkerId::from_random();
        for counter in [0, 1] {
            let request = actor_push_request(&worker_id, &actor_id, &caller_id, &w1, counter, ts);
            assert!(receiver.handle_push_task(request).is_ok());
        }

        // New worker, newer timestamp, counter restarts at 0: admitted.
        let w2 = WorkerId::from_random();
        let request =
            actor_push_request(&worker_id, &actor_id, &caller_id, &w2, 0, ts + 1_000);
        assert!(receiver.handle_push_task(request).is_ok());

        // New worker, older timestamp: rejected even with a fresh counter.
        let w3 = WorkerId::from_random();
        let request =
            actor_push_request(&worker_id, &actor_id, &caller_id, &w3, 1, ts - 1_000);
        assert!(matches!(
            receiver.handle_push_task(request),
            Err(WorkerError::StaleCaller(_))
        ));
    }

    #[test]
    fn test_counter_watermark_survives_reconstruction() {
        let (worker_id, _store, receiver) = make_receiver();
        receiver.set_execute_callback(success_callback());
        let actor_id = ActorId::from_random();
        let caller_id = TaskId::from_random();

        let w1 = WorkerId::from_random();
        let request = actor_push_request(&worker_id, &actor_id, &caller_id, &w1, 5, 1_000);
        assert!(receiver.handle_push_task(request).is_ok());

        let w2 = WorkerId::from_random();
        let request = actor_push_request(&worker_id, &actor_id, &caller_id, &w2, 0, 2_000);
        assert!(receiver.handle_push_task(request).is_ok());

        // The new incarnation's watermark applies from its own counters.
        let request = actor_push_request(&worker_id, &actor_id, &caller_id, &w2, 0, 2_000);
        assert!(matches!(
            receiver.handle_push_task(request),
            Err(WorkerError::DuplicateTask(_))
        ));
    }

    #[test]
    fn test_wrong_intended_worker_rejected() {
        let (_worker_id, _store, receiver) = make_receiver();
        receiver.set_execute_callback(success_callback());
        let request = actor_push_request(
            &WorkerId::from_random(),
            &ActorId::from_random(),
            &TaskId::nil(),
            &WorkerId::from_random(),
            0,
            1_000,
        );
        assert!(matches!(
            receiver.handle_push_task(request),
            Err(WorkerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_nil_intended_worker_accepted() {
        let (_worker_id, _store, receiver) = make_receiver();
        receiver.set_execute_callback(success_callback());
        let mut request = actor_push_request(
            &WorkerId::from_random(),
            &ActorId::from_random(),
            &TaskId::nil(),
            &WorkerId::from_random(),
            0,
            1_000,
        );
        request.intended_worker_id = WorkerId::nil().binary();
        assert!(receiver.handle_push_task(request).is_ok());
    }

    #[test]
    fn test_exiting_worker_rejects_without_executing() {
        let (worker_id, _store, receiver) = make_receiver();
        receiver.set_execute_callback(success_callback());
        receiver.set_exiting();
        assert!(receiver.is_exiting());

        let request = actor_push_request(
            &worker_id,
            &ActorId::from_random(),
            &TaskId::nil(),
            &WorkerId::from_random(),
            0,
            1_000,
        );
        let reply = receiver.handle_push_task(request).unwrap();
        assert!(reply.worker_exiting);
        assert_eq!(receiver.total_executed(), 0);
    }

    #[test]
    fn test_missing_spec_rejected() {
        let (worker_id, _store, receiver) = make_receiver();
        let request = PushTaskRequest {
            intended_worker_id: worker_id.binary(),
            task_spec: None,
            ..Default::default()
        };
        assert!(matches!(
            receiver.handle_push_task(request),
            Err(WorkerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_no_callback_reports_retryable_error() {
        let (worker_id, _store, receiver) = make_receiver();
        let request = actor_push_request(
            &worker_id,
            &ActorId::from_random(),
            &TaskId::nil(),
            &WorkerId::from_random(),
            0,
            1_000,
        );
        let reply = receiver.handle_push_task(request).unwrap();
        assert!(reply.is_retryable_error);
        assert!(reply.task_execution_error.contains("not initialized"));
    }

    #[test]
    fn test_distinct_callers_have_independent_watermarks() {
        let (worker_id, _store, receiver) = make_receiver();
        receiver.set_execute_callback(success_callback());
        let actor_id = ActorId::from_random();
        let caller_worker = WorkerId::from_random();

        let caller_a = TaskId::from_random();
        let caller_b = TaskId::from_random();
        for caller in [&caller_a, &caller_b] {
            let request =
                actor_push_request(&worker_id, &actor_id, caller, &caller_worker, 0, 1_000);
            assert!(receiver.handle_push_task(request).is_ok());
        }
    }
}
