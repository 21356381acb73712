// Copyright 2025 The Taskwire Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Actor task submission with per-actor queuing.
//!
//! One queue per actor tracks connectivity (driven by epoch-tagged
//! connect/disconnect events that may arrive out of order), the tasks
//! admitted but not yet sent, and the pushes awaiting replies. Submitted
//! tasks wait for their argument objects, then flow to the actor's
//! current endpoint in sequence order (or resolution order for
//! out-of-order queues). Outcomes are reported to the injected
//! [`TaskFinisher`]; the submitter itself never blocks and never fails
//! fatally.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use taskwire_common::config::WorkerConfig;
use taskwire_common::id::{ActorId, ObjectId, TaskId};
use taskwire_common::runtime::PeriodicalRunner;
use taskwire_common::status::Status;
use taskwire_proto::{ActorDeathCause, Address, PushTaskReply, PushTaskRequest, TaskSpec};
use taskwire_rpc::client::SharedCoreWorkerClient;
use taskwire_rpc::client_pool::ClientPool;

use crate::dependency_resolver::DependencyResolver;
use crate::error::{WorkerError, WorkerResult};
use crate::event_loop::EventLoop;
use crate::memory_store::MemoryStore;
use crate::submit_queue::{
    ActorSubmitQueue, OutOfOrderSubmitQueue, PendingTaskRequest, SequentialSubmitQueue,
};
use crate::task_finisher::{ReferenceCounting, TaskErrorKind, TaskFinisher};

/// Connectivity of an actor queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorQueueState {
    /// Queue exists but the actor has never connected.
    PendingCreation,
    /// Connected; tasks flow to the current endpoint.
    Alive,
    /// Disconnected but expected to come back under a higher epoch.
    Restarting,
    /// Permanently gone. Terminal.
    Dead,
}

/// Hook fired when a queue's pending depth first reaches a warning
/// threshold (5000, then doubling).
pub type QueueingWarningCallback = Box<dyn Fn(&ActorId, i64) + Send + Sync>;

/// A push that has been issued and is awaiting its reply.
struct InflightEntry {
    sequence_number: i64,
    send_epoch: i64,
}

/// A failed inflight task remembered until the actor's death is
/// confirmed or the deadline passes. Already notified to the finisher;
/// kept only so late events for it are recognizable and bounded.
struct DeathWaitEntry {
    deadline: Instant,
    status: Status,
}

struct ClientQueue {
    state: ActorQueueState,
    addr: Option<Address>,
    client: Option<SharedCoreWorkerClient>,
    /// Epoch of the current incarnation; monotone. Events tagged with a
    /// lower epoch are late and dropped.
    num_restarts_at_addr: i64,
    death_cause: Option<ActorDeathCause>,
    submit_queue: Box<dyn ActorSubmitQueue>,
    inflight: HashMap<TaskId, InflightEntry>,
    wait_for_death_info: HashMap<TaskId, DeathWaitEntry>,
    /// Argument object ids held on behalf of each pending task.
    task_arg_refs: HashMap<TaskId, Vec<ObjectId>>,
    max_pending: i64,
    fail_if_unreachable: bool,
    owned: bool,
    next_queueing_warn_threshold: i64,
}

impl ClientQueue {
    fn new(
        max_pending: i64,
        execute_out_of_order: bool,
        fail_if_unreachable: bool,
        owned: bool,
        warn_threshold: i64,
    ) -> Self {
        let submit_queue: Box<dyn ActorSubmitQueue> = if execute_out_of_order {
            Box::new(OutOfOrderSubmitQueue::new())
        } else {
            Box::new(SequentialSubmitQueue::new())
        };
        Self {
            state: ActorQueueState::PendingCreation,
            addr: None,
            client: None,
            num_restarts_at_addr: 0,
            death_cause: None,
            submit_queue,
            inflight: HashMap::new(),
            wait_for_death_info: HashMap::new(),
            task_arg_refs: HashMap::new(),
            max_pending,
            fail_if_unreachable,
            owned,
            next_queueing_warn_threshold: warn_threshold,
        }
    }

    /// Queued plus inflight, the admission count.
    fn num_pending(&self) -> i64 {
        self.submit_queue.len() as i64 + self.inflight.len() as i64
    }

    /// Edge-triggered warning check; doubles the threshold on each trip.
    fn check_queueing_warning(&mut self) -> Option<i64> {
        let depth = self.num_pending();
        if depth >= self.next_queueing_warn_threshold {
            self.next_queueing_warn_threshold *= 2;
            Some(depth)
        } else {
            None
        }
    }
}

enum Admission {
    Queued { warn_depth: Option<i64> },
    ActorDead { cause: Option<ActorDeathCause> },
}

enum FailureDisposition {
    Dead { cause: Option<ActorDeathCause> },
    NotDead { kind: TaskErrorKind },
}

struct SubmitterInner {
    /// Handle to ourselves for posted callbacks and RPC replies. Weak, so
    /// a dropped submitter turns late events into no-ops instead of
    /// keeping the queues alive.
    self_weak: Weak<SubmitterInner>,
    client_pool: Arc<ClientPool>,
    resolver: DependencyResolver,
    task_finisher: Arc<dyn TaskFinisher>,
    reference_counter: Arc<dyn ReferenceCounting>,
    event_loop: Arc<EventLoop>,
    warn_excess_queueing: QueueingWarningCallback,
    config: WorkerConfig,
    queues: Mutex<HashMap<ActorId, ClientQueue>>,
}

/// Submits tasks to stateful remote actors, one queue per actor.
pub struct ActorTaskSubmitter {
    inner: Arc<SubmitterInner>,
}

impl ActorTaskSubmitter {
    pub fn new(
        client_pool: Arc<ClientPool>,
        store: Arc<MemoryStore>,
        task_finisher: Arc<dyn TaskFinisher>,
        reference_counter: Arc<dyn ReferenceCounting>,
        warn_excess_queueing: QueueingWarningCallback,
        event_loop: Arc<EventLoop>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            inner: Arc::new_cyclic(|self_weak| SubmitterInner {
                self_weak: self_weak.clone(),
                client_pool,
                resolver: DependencyResolver::new(store),
                task_finisher,
                reference_counter,
                event_loop,
                warn_excess_queueing,
                config,
                queues: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Install a queue for `actor_id` if none exists. Returns whether a
    /// new queue was installed. `max_pending < 0` means unbounded.
    pub fn add_actor_queue_if_not_exists(
        &self,
        actor_id: &ActorId,
        max_pending: i64,
        execute_out_of_order: bool,
        fail_if_unreachable: bool,
        owned: bool,
    ) -> bool {
        let mut queues = self.inner.queues.lock();
        if queues.contains_key(actor_id) {
            return false;
        }
        tracing::debug!(
            actor_id = %actor_id,
            max_pending,
            execute_out_of_order,
            fail_if_unreachable,
            owned,
            "installing actor queue"
        );
        queues.insert(
            *actor_id,
            ClientQueue::new(
                max_pending,
                execute_out_of_order,
                fail_if_unreachable,
                owned,
                self.inner.config.queueing_warn_threshold,
            ),
        );
        true
    }

    /// Submit an actor task. The caller assigns the actor counter; it is
    /// transmitted as-is. Fails fast with [`WorkerError::ActorDied`] when
    /// the queue is already DEAD (the finisher is notified inline).
    pub fn submit_task(&self, task_spec: TaskSpec) -> WorkerResult<()> {
        self.inner.submit_task(task_spec)
    }

    /// Observe the actor alive at `addr` under restart epoch
    /// `num_restarts`. Stale epochs are dropped; re-connects to the same
    /// (ip, port) are no-ops.
    pub fn connect_actor(&self, actor_id: &ActorId, addr: Address, num_restarts: i64) {
        self.inner.connect_actor(actor_id, addr, num_restarts);
    }

    /// Observe the actor disconnected under restart epoch `num_restarts`.
    /// With `dead = false` the queue enters RESTARTING (stale epochs are
    /// dropped); with `dead = true` the queue is terminally DEAD and every
    /// tracked task is failed with `death_cause`.
    pub fn disconnect_actor(
        &self,
        actor_id: &ActorId,
        num_restarts: i64,
        dead: bool,
        death_cause: Option<ActorDeathCause>,
        is_restartable: bool,
    ) {
        self.inner
            .disconnect_actor(actor_id, num_restarts, dead, death_cause, is_restartable);
    }

    /// Whether admission is at the queue's `max_pending` cap.
    pub fn pending_tasks_full(&self, actor_id: &ActorId) -> bool {
        let queues = self.inner.queues.lock();
        queues.get(actor_id).is_some_and(|queue| {
            queue.max_pending >= 0 && queue.num_pending() >= queue.max_pending
        })
    }

    /// Queued plus inflight task count for `actor_id`.
    pub fn num_pending_tasks(&self, actor_id: &ActorId) -> i64 {
        let queues = self.inner.queues.lock();
        queues.get(actor_id).map_or(0, ClientQueue::num_pending)
    }

    /// Whether a queue exists for `actor_id`.
    pub fn check_actor_exists(&self, actor_id: &ActorId) -> bool {
        self.inner.queues.lock().contains_key(actor_id)
    }

    /// Current connectivity state of the actor's queue.
    pub fn queue_state(&self, actor_id: &ActorId) -> Option<ActorQueueState> {
        self.inner.queues.lock().get(actor_id).map(|queue| queue.state)
    }

    /// Number of failed tasks still awaiting death confirmation.
    pub fn num_death_wait_records(&self, actor_id: &ActorId) -> usize {
        let queues = self.inner.queues.lock();
        queues
            .get(actor_id)
            .map_or(0, |queue| queue.wait_for_death_info.len())
    }

    /// Drop the queue for a DEAD actor once nothing is tracked anymore.
    /// Returns whether the queue was removed.
    pub fn remove_actor_queue(&self, actor_id: &ActorId) -> bool {
        let mut queues = self.inner.queues.lock();
        let removable = queues.get(actor_id).is_some_and(|queue| {
            queue.state == ActorQueueState::Dead
                && queue.inflight.is_empty()
                && queue.submit_queue.is_empty()
                && queue.wait_for_death_info.is_empty()
        });
        if removable {
            queues.remove(actor_id);
        }
        removable
    }

    /// Prune death-wait records whose deadline passed without a death
    /// confirmation. Driven periodically; see [`Self::start_timeout_sweep`].
    pub fn check_timeout_tasks(&self) {
        self.inner.check_timeout_tasks();
    }

    /// Spawn the periodic death-wait sweep. Must be called from within a
    /// tokio runtime.
    pub fn start_timeout_sweep(&self) -> PeriodicalRunner {
        let weak = Arc::downgrade(&self.inner);
        let interval = Duration::from_millis(self.inner.config.death_check_interval_ms);
        PeriodicalRunner::start(interval, move || {
            if let Some(inner) = weak.upgrade() {
                inner.check_timeout_tasks();
            }
        })
    }
}

impl SubmitterInner {
    fn submit_task(&self, task_spec: TaskSpec) -> WorkerResult<()> {
        let actor_spec = task_spec
            .actor_task_spec
            .as_ref()
            .ok_or_else(|| WorkerError::InvalidArgument("task is not an actor task".into()))?;
        let actor_id = ActorId::from_binary(&actor_spec.actor_id);
        let task_id = TaskId::from_binary(&task_spec.task_id);
        let sequence_number = actor_spec.actor_counter;
        let arg_ids: Vec<ObjectId> = task_spec
            .arg_object_id_bytes()
            .into_iter()
            .map(ObjectId::from_binary)
            .collect();

        tracing::debug!(
            actor_id = %actor_id,
            task_id = %task_id,
            seq = sequence_number,
            num_args = arg_ids.len(),
            "submitting actor task"
        );

        let admission = {
            let mut queues = self.queues.lock();
            let queue = queues
                .get_mut(&actor_id)
                .ok_or_else(|| WorkerError::ActorNotFound(actor_id.hex()))?;
            if queue.state == ActorQueueState::Dead {
                Admission::ActorDead {
                    cause: queue.death_cause.clone(),
                }
            } else {
                queue.task_arg_refs.insert(task_id, arg_ids.clone());
                queue.submit_queue.emplace(PendingTaskRequest::new(task_spec));
                Admission::Queued {
                    warn_depth: queue.check_queueing_warning(),
                }
            }
        };

        match admission {
            Admission::ActorDead { cause } => {
                self.task_finisher.fail_or_retry_pending_task(
                    task_id,
                    TaskErrorKind::ActorDied,
                    &Status::disconnected("actor is dead"),
                    cause.as_ref(),
                    true,
                    true,
                );
                Err(WorkerError::ActorDied(actor_id.hex()))
            }
            Admission::Queued { warn_depth } => {
                for object_id in &arg_ids {
                    self.reference_counter.add_borrowed_object(object_id);
                }
                if let Some(depth) = warn_depth {
                    (self.warn_excess_queueing)(&actor_id, depth);
                }
                // Kick off resolution from the loop so the resolver's
                // inline completion never runs in the caller's stack.
                let weak = self.self_weak.clone();
                self.event_loop.post(move || {
                    let Some(inner) = weak.upgrade() else { return };
                    let weak = inner.self_weak.clone();
                    inner.resolver.resolve_dependencies(
                        task_id,
                        arg_ids,
                        Box::new(move || {
                            if let Some(inner) = weak.upgrade() {
                                inner.on_dependencies_resolved(actor_id, sequence_number);
                            }
                        }),
                    );
                });
                Ok(())
            }
        }
    }

    fn on_dependencies_resolved(&self, actor_id: ActorId, sequence_no: i64) {
        {
            let mut queues = self.queues.lock();
            let Some(queue) = queues.get_mut(&actor_id) else {
                return;
            };
            if queue.state == ActorQueueState::Dead {
                return;
            }
            if !queue.submit_queue.mark_dependency_resolved(sequence_no) {
                return;
            }
        }
        self.send_pending_tasks(&actor_id);
    }

    fn connect_actor(&self, actor_id: &ActorId, addr: Address, num_restarts: i64) {
        {
            let mut queues = self.queues.lock();
            let Some(queue) = queues.get_mut(actor_id) else {
                tracing::warn!(actor_id = %actor_id, "connect for unknown actor queue");
                return;
            };
            if queue.state == ActorQueueState::Dead {
                tracing::debug!(actor_id = %actor_id, "ignoring connect: actor is dead");
                return;
            }
            if num_restarts < queue.num_restarts_at_addr {
                tracing::debug!(
                    actor_id = %actor_id,
                    epoch = num_restarts,
                    current_epoch = queue.num_restarts_at_addr,
                    "ignoring stale connect"
                );
                return;
            }
            if queue.state == ActorQueueState::Alive {
                if let Some(current) = &queue.addr {
                    if current.same_endpoint(&addr) {
                        // Idempotent re-connect; keep the client (and its
                        // sequence history) untouched.
                        queue.num_restarts_at_addr = num_restarts;
                        tracing::debug!(
                            actor_id = %actor_id,
                            ip = %addr.ip_address,
                            port = addr.port,
                            "already connected to endpoint"
                        );
                        return;
                    }
                }
            }
            let client = self.client_pool.get_or_connect(&addr);
            tracing::info!(
                actor_id = %actor_id,
                ip = %addr.ip_address,
                port = addr.port,
                epoch = num_restarts,
                "connecting to actor"
            );
            queue.state = ActorQueueState::Alive;
            queue.num_restarts_at_addr = num_restarts;
            queue.addr = Some(addr);
            queue.client = Some(client);
            queue.submit_queue.on_client_connected();
        }
        self.send_pending_tasks(actor_id);
    }

    fn disconnect_actor(
        &self,
        actor_id: &ActorId,
        num_restarts: i64,
        dead: bool,
        death_cause: Option<ActorDeathCause>,
        is_restartable: bool,
    ) {
        if dead {
            self.mark_actor_dead(actor_id, num_restarts, death_cause, is_restartable);
            return;
        }

        let drained = {
            let mut queues = self.queues.lock();
            let Some(queue) = queues.get_mut(actor_id) else {
                tracing::warn!(actor_id = %actor_id, "disconnect for unknown actor queue");
                return;
            };
            if queue.state == ActorQueueState::Dead {
                tracing::debug!(actor_id = %actor_id, "ignoring disconnect: actor already dead");
                return;
            }
            if num_restarts <= queue.num_restarts_at_addr {
                tracing::debug!(
                    actor_id = %actor_id,
                    epoch = num_restarts,
                    current_epoch = queue.num_restarts_at_addr,
                    "ignoring stale disconnect"
                );
                return;
            }
            tracing::info!(
                actor_id = %actor_id,
                epoch = num_restarts,
                is_restartable,
                "actor disconnected, now restarting"
            );
            queue.state = ActorQueueState::Restarting;
            queue.num_restarts_at_addr = num_restarts;
            queue.addr = None;
            queue.client = None;
            let mut drained: Vec<(TaskId, InflightEntry)> = queue.inflight.drain().collect();
            drained.sort_by_key(|(_, entry)| entry.sequence_number);
            drained
        };

        // Inflight pushes will never get genuine replies from the gone
        // incarnation; surface each failure now. Late replies are dropped
        // because the tasks are no longer inflight.
        for (task_id, entry) in drained {
            self.fail_inflight_task(
                *actor_id,
                task_id,
                entry,
                Status::io_error("actor disconnected before the push was replied to"),
            );
        }

        // With fail_if_unreachable, eligible queued tasks fail rather
        // than wait out the restart.
        self.send_pending_tasks(actor_id);
    }

    fn mark_actor_dead(
        &self,
        actor_id: &ActorId,
        num_restarts: i64,
        death_cause: Option<ActorDeathCause>,
        is_restartable: bool,
    ) {
        let (cleared, drained, parked, refs, cause) = {
            let mut queues = self.queues.lock();
            let Some(queue) = queues.get_mut(actor_id) else {
                tracing::warn!(actor_id = %actor_id, "death notice for unknown actor queue");
                return;
            };
            if queue.state == ActorQueueState::Dead {
                tracing::debug!(actor_id = %actor_id, "ignoring duplicate death notice");
                return;
            }
            queue.state = ActorQueueState::Dead;
            queue.num_restarts_at_addr = queue.num_restarts_at_addr.max(num_restarts);
            queue.addr = None;
            queue.client = None;
            queue.death_cause = death_cause;

            let cleared = queue.submit_queue.clear_all_tasks();
            let mut drained: Vec<(TaskId, InflightEntry)> = queue.inflight.drain().collect();
            drained.sort_by_key(|(_, entry)| entry.sequence_number);
            let parked: Vec<TaskId> = queue.wait_for_death_info.drain().map(|(id, _)| id).collect();
            let refs: Vec<ObjectId> = queue
                .task_arg_refs
                .drain()
                .flat_map(|(_, ids)| ids)
                .collect();

            tracing::info!(
                actor_id = %actor_id,
                epoch = num_restarts,
                is_restartable,
                owned = queue.owned,
                num_queued = cleared.len(),
                num_inflight = drained.len(),
                "actor died, failing all tracked tasks"
            );
            (cleared, drained, parked, refs, queue.death_cause.clone())
        };

        for object_id in &refs {
            self.reference_counter.remove_local_reference(object_id);
        }

        let status = Status::disconnected("actor is dead");
        for request in &cleared {
            let task_id = TaskId::from_binary(&request.task_spec.task_id);
            if !request.dependencies_resolved {
                self.resolver.cancel(&task_id);
            }
            self.task_finisher.fail_or_retry_pending_task(
                task_id,
                TaskErrorKind::ActorDied,
                &status,
                cause.as_ref(),
                true,
                true,
            );
        }
        for (task_id, _entry) in &drained {
            self.task_finisher.fail_or_retry_pending_task(
                *task_id,
                TaskErrorKind::ActorDied,
                &status,
                cause.as_ref(),
                true,
                true,
            );
        }
        if !parked.is_empty() {
            // Their failures were already surfaced when the pushes failed.
            tracing::debug!(
                actor_id = %actor_id,
                count = parked.len(),
                "death confirmed for tasks already failed"
            );
        }
    }

    fn send_pending_tasks(&self, actor_id: &ActorId) {
        let mut queues = self.queues.lock();
        let Some(queue) = queues.get_mut(actor_id) else {
            return;
        };
        let Some(client) = queue.client.clone() else {
            if queue.state == ActorQueueState::Restarting {
                self.force_fail_eligible_tasks(queue, *actor_id);
            }
            return;
        };
        while let Some(request) = queue.submit_queue.pop_next_task_to_send() {
            self.push_actor_task(queue, *actor_id, &client, request, false);
        }
    }

    /// While RESTARTING without a client: pop and fail the tasks that
    /// must not wait (all of them when the queue is fail-if-unreachable,
    /// otherwise the non-retryable ones). Failures are posted onto the
    /// loop, never delivered inline.
    fn force_fail_eligible_tasks(&self, queue: &mut ClientQueue, actor_id: ActorId) {
        loop {
            let eligible = match queue.submit_queue.peek_next_task_to_send() {
                Some(request) => queue.fail_if_unreachable || !request.retryable,
                None => false,
            };
            if !eligible {
                return;
            }
            let Some(request) = queue.submit_queue.pop_next_task_to_send() else {
                return;
            };
            let weak = self.self_weak.clone();
            self.event_loop.post(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.fail_unsent_task(actor_id, request);
                }
            });
        }
    }

    fn fail_unsent_task(&self, actor_id: ActorId, request: PendingTaskRequest) {
        let task_id = TaskId::from_binary(&request.task_spec.task_id);
        let refs = {
            let mut queues = self.queues.lock();
            queues
                .get_mut(&actor_id)
                .and_then(|queue| queue.task_arg_refs.remove(&task_id))
        };
        self.release_references(refs);
        tracing::debug!(
            actor_id = %actor_id,
            task_id = %task_id,
            seq = request.sequence_number,
            "failing unsent task: actor unreachable"
        );
        self.task_finisher.fail_or_retry_pending_task(
            task_id,
            TaskErrorKind::ActorUnavailable,
            &Status::disconnected("actor is unreachable while restarting"),
            None,
            true,
            false,
        );
    }

    fn push_actor_task(
        &self,
        queue: &mut ClientQueue,
        actor_id: ActorId,
        client: &SharedCoreWorkerClient,
        request: PendingTaskRequest,
        skip_queue: bool,
    ) {
        let task_id = TaskId::from_binary(&request.task_spec.task_id);
        let sequence_number = request.sequence_number;
        let envelope = PushTaskRequest {
            intended_worker_id: queue
                .addr
                .as_ref()
                .map(|addr| addr.worker_id.clone())
                .unwrap_or_default(),
            task_spec: Some(request.task_spec),
            sequence_number,
            client_processed_up_to: queue.submit_queue.client_processed_up_to(),
        };
        queue.inflight.insert(
            task_id,
            InflightEntry {
                sequence_number,
                send_epoch: queue.num_restarts_at_addr,
            },
        );
        tracing::debug!(
            actor_id = %actor_id,
            task_id = %task_id,
            seq = sequence_number,
            epoch = queue.num_restarts_at_addr,
            "pushing actor task"
        );
        let weak = self.self_weak.clone();
        client.push_actor_task(
            envelope,
            skip_queue,
            Box::new(move |status, reply| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_push_task_reply(actor_id, task_id, status, reply);
                }
            }),
        );
    }

    fn handle_push_task_reply(
        &self,
        actor_id: ActorId,
        task_id: TaskId,
        status: Status,
        reply: PushTaskReply,
    ) {
        enum Outcome {
            Complete {
                actor_addr: Address,
                refs: Option<Vec<ObjectId>>,
            },
            Failed {
                entry: InflightEntry,
            },
        }

        let outcome = {
            let mut queues = self.queues.lock();
            let Some(queue) = queues.get_mut(&actor_id) else {
                return;
            };
            let Some(entry) = queue.inflight.remove(&task_id) else {
                // Reply for a task already failed by a disconnect (or
                // forgotten for retry). Never notified twice.
                queue.wait_for_death_info.remove(&task_id);
                tracing::debug!(
                    actor_id = %actor_id,
                    task_id = %task_id,
                    "dropping reply for task no longer tracked"
                );
                return;
            };
            if status.is_ok() {
                queue.submit_queue.mark_seqno_completed(entry.sequence_number);
                Outcome::Complete {
                    actor_addr: queue.addr.clone().unwrap_or_default(),
                    refs: queue.task_arg_refs.remove(&task_id),
                }
            } else {
                Outcome::Failed { entry }
            }
        };

        match outcome {
            Outcome::Complete { actor_addr, refs } => {
                self.release_references(refs);
                self.task_finisher.complete_pending_task(
                    task_id,
                    &reply,
                    &actor_addr,
                    reply.is_application_error,
                );
            }
            Outcome::Failed { entry } => {
                self.fail_inflight_task(actor_id, task_id, entry, status);
            }
        }
    }

    /// Surface the failure of a push exactly once, then either forget the
    /// task (finisher will retry) or park it awaiting death confirmation.
    fn fail_inflight_task(
        &self,
        actor_id: ActorId,
        task_id: TaskId,
        entry: InflightEntry,
        status: Status,
    ) {
        let (disposition, refs) = {
            let mut queues = self.queues.lock();
            let Some(queue) = queues.get_mut(&actor_id) else {
                return;
            };
            let refs = queue.task_arg_refs.remove(&task_id);
            let disposition = match queue.state {
                ActorQueueState::Dead => FailureDisposition::Dead {
                    cause: queue.death_cause.clone(),
                },
                ActorQueueState::Restarting | ActorQueueState::PendingCreation => {
                    FailureDisposition::NotDead {
                        kind: TaskErrorKind::ActorUnavailable,
                    }
                }
                ActorQueueState::Alive => FailureDisposition::NotDead {
                    kind: TaskErrorKind::WorkerDied,
                },
            };
            (disposition, refs)
        };
        self.release_references(refs);

        tracing::debug!(
            actor_id = %actor_id,
            task_id = %task_id,
            seq = entry.sequence_number,
            epoch = entry.send_epoch,
            status = %status,
            "push failed"
        );

        match disposition {
            FailureDisposition::Dead { cause } => {
                self.task_finisher.fail_or_retry_pending_task(
                    task_id,
                    TaskErrorKind::ActorDied,
                    &status,
                    cause.as_ref(),
                    true,
                    true,
                );
            }
            FailureDisposition::NotDead { kind } => {
                let will_retry = self.task_finisher.fail_or_retry_pending_task(
                    task_id,
                    kind,
                    &status,
                    None,
                    true,
                    false,
                );
                if will_retry {
                    tracing::debug!(task_id = %task_id, "task will be retried upstream");
                    return;
                }
                let deadline =
                    Instant::now() + Duration::from_millis(self.config.death_info_grace_period_ms);
                let mut queues = self.queues.lock();
                if let Some(queue) = queues.get_mut(&actor_id) {
                    if queue.state != ActorQueueState::Dead {
                        queue
                            .wait_for_death_info
                            .insert(task_id, DeathWaitEntry { deadline, status });
                    }
                }
            }
        }
    }

    fn check_timeout_tasks(&self) {
        let now = Instant::now();
        let mut queues = self.queues.lock();
        for (actor_id, queue) in queues.iter_mut() {
            queue.wait_for_death_info.retain(|task_id, entry| {
                if entry.deadline <= now {
                    tracing::debug!(
                        actor_id = %actor_id,
                        task_id = %task_id,
                        status = %entry.status,
                        "death-wait record expired without confirmation"
                    );
                    false
                } else {
                    true
                }
            });
        }
    }

    fn release_references(&self, refs: Option<Vec<ObjectId>>) {
        for object_id in refs.into_iter().flatten() {
            self.reference_counter.remove_local_reference(&object_id);
        }
    }
}
