// Copyright 2025 The Taskwire Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Per-actor queues of tasks awaiting transmission.
//!
//! Tasks are admitted at submit time (possibly before their dependencies
//! resolve) under the caller-assigned actor counter and popped for
//! transmission once eligible. The sequential queue releases strictly in
//! sequence order, holding everything behind an unresolved head; the
//! out-of-order queue releases each task as soon as it resolves.

use std::collections::BTreeMap;

use taskwire_proto::TaskSpec;

/// A task admitted to an actor queue but not yet sent.
#[derive(Clone)]
pub struct PendingTaskRequest {
    pub task_spec: TaskSpec,
    pub sequence_number: i64,
    pub dependencies_resolved: bool,
    pub retryable: bool,
    pub num_returns: i64,
}

impl PendingTaskRequest {
    pub fn new(task_spec: TaskSpec) -> Self {
        let sequence_number = task_spec.actor_counter();
        let retryable = task_spec.retryable;
        let num_returns = task_spec.num_returns;
        Self {
            task_spec,
            sequence_number,
            dependencies_resolved: false,
            retryable,
            num_returns,
        }
    }
}

/// Queue of ready-and-pending tasks for one actor.
pub trait ActorSubmitQueue: Send {
    /// Admit a task under its sequence number.
    fn emplace(&mut self, request: PendingTaskRequest);

    /// Whether a task with this sequence number is queued.
    fn contains(&self, sequence_no: i64) -> bool;

    /// Mark a queued task's dependencies as resolved. Returns false when
    /// the sequence number is no longer queued.
    fn mark_dependency_resolved(&mut self, sequence_no: i64) -> bool;

    /// The next task eligible for transmission, without removing it.
    fn peek_next_task_to_send(&self) -> Option<&PendingTaskRequest>;

    /// Pop the next task eligible for transmission, if any.
    fn pop_next_task_to_send(&mut self) -> Option<PendingTaskRequest>;

    /// Record that the task with this sequence number completed.
    fn mark_seqno_completed(&mut self, sequence_no: i64);

    /// Remove and return every queued task (resolved or not), in sequence
    /// order.
    fn clear_all_tasks(&mut self) -> Vec<PendingTaskRequest>;

    /// Hook invoked when the actor (re)connects.
    fn on_client_connected(&mut self);

    /// Highest sequence acknowledged as completed in order, -1 when none.
    /// Sent on every request envelope.
    fn client_processed_up_to(&self) -> i64;

    /// One past the highest sequence number admitted so far.
    fn next_send_position(&self) -> i64;

    /// Lowest sequence still tracked after the most recent (re)connect.
    fn caller_starts_at(&self) -> i64;

    /// Number of queued tasks (resolved and unresolved).
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queued sequence numbers in ascending order.
    fn sequence_numbers(&self) -> Vec<i64>;
}

// ─── Sequential ──────────────────────────────────────────────────────────────

/// Strict FIFO release: the head of the queue blocks everything behind it
/// until its dependencies resolve, so transmitted sequence numbers are
/// non-decreasing in admission order.
pub struct SequentialSubmitQueue {
    requests: BTreeMap<i64, PendingTaskRequest>,
    next_send_position: i64,
    next_task_reply_position: i64,
    caller_starts_at: i64,
}

impl SequentialSubmitQueue {
    pub fn new() -> Self {
        Self {
            requests: BTreeMap::new(),
            next_send_position: 0,
            next_task_reply_position: 0,
            caller_starts_at: 0,
        }
    }
}

impl Default for SequentialSubmitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorSubmitQueue for SequentialSubmitQueue {
    fn emplace(&mut self, request: PendingTaskRequest) {
        let seq = request.sequence_number;
        self.next_send_position = self.next_send_position.max(seq + 1);
        if self.requests.insert(seq, request).is_some() {
            tracing::warn!(seq, "replacing queued task with duplicate sequence number");
        }
    }

    fn contains(&self, sequence_no: i64) -> bool {
        self.requests.contains_key(&sequence_no)
    }

    fn mark_dependency_resolved(&mut self, sequence_no: i64) -> bool {
        match self.requests.get_mut(&sequence_no) {
            Some(request) => {
                request.dependencies_resolved = true;
                true
            }
            None => false,
        }
    }

    fn peek_next_task_to_send(&self) -> Option<&PendingTaskRequest> {
        self.requests
            .first_key_value()
            .map(|(_, request)| request)
            .filter(|request| request.dependencies_resolved)
    }

    fn pop_next_task_to_send(&mut self) -> Option<PendingTaskRequest> {
        let head_ready = self
            .requests
            .first_key_value()
            .is_some_and(|(_, request)| request.dependencies_resolved);
        if head_ready {
            self.requests.pop_first().map(|(_, request)| request)
        } else {
            None
        }
    }

    fn mark_seqno_completed(&mut self, sequence_no: i64) {
        self.next_task_reply_position = self.next_task_reply_position.max(sequence_no + 1);
    }

    fn clear_all_tasks(&mut self) -> Vec<PendingTaskRequest> {
        std::mem::take(&mut self.requests).into_values().collect()
    }

    fn on_client_connected(&mut self) {
        self.caller_starts_at = self
            .requests
            .keys()
            .next()
            .copied()
            .unwrap_or(self.next_task_reply_position);
    }

    fn client_processed_up_to(&self) -> i64 {
        self.next_task_reply_position - 1
    }

    fn next_send_position(&self) -> i64 {
        self.next_send_position
    }

    fn caller_starts_at(&self) -> i64 {
        self.caller_starts_at
    }

    fn len(&self) -> usize {
        self.requests.len()
    }

    fn sequence_numbers(&self) -> Vec<i64> {
        self.requests.keys().copied().collect()
    }
}

// ─── Out-of-order ────────────────────────────────────────────────────────────

/// Release-on-resolution: a task becomes eligible the moment its
/// dependencies are local, regardless of earlier unresolved tasks.
/// Sequence numbers are used only for duplicate filtering downstream.
pub struct OutOfOrderSubmitQueue {
    pending: BTreeMap<i64, PendingTaskRequest>,
    ready: BTreeMap<i64, PendingTaskRequest>,
    next_send_position: i64,
    caller_starts_at: i64,
}

impl OutOfOrderSubmitQueue {
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            ready: BTreeMap::new(),
            next_send_position: 0,
            caller_starts_at: 0,
        }
    }
}

impl Default for OutOfOrderSubmitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorSubmitQueue for OutOfOrderSubmitQueue {
    fn emplace(&mut self, request: PendingTaskRequest) {
        let seq = request.sequence_number;
        self.next_send_position = self.next_send_position.max(seq + 1);
        if self.pending.insert(seq, request).is_some() {
            tracing::warn!(seq, "replacing queued task with duplicate sequence number");
        }
    }

    fn contains(&self, sequence_no: i64) -> bool {
        self.pending.contains_key(&sequence_no) || self.ready.contains_key(&sequence_no)
    }

    fn mark_dependency_resolved(&mut self, sequence_no: i64) -> bool {
        match self.pending.remove(&sequence_no) {
            Some(mut request) => {
                request.dependencies_resolved = true;
                self.ready.insert(sequence_no, request);
                true
            }
            None => self.ready.contains_key(&sequence_no),
        }
    }

    fn peek_next_task_to_send(&self) -> Option<&PendingTaskRequest> {
        self.ready.first_key_value().map(|(_, request)| request)
    }

    fn pop_next_task_to_send(&mut self) -> Option<PendingTaskRequest> {
        self.ready.pop_first().map(|(_, request)| request)
    }

    fn mark_seqno_completed(&mut self, sequence_no: i64) {
        tracing::trace!(seq = sequence_no, "task completed out of order");
    }

    fn clear_all_tasks(&mut self) -> Vec<PendingTaskRequest> {
        let mut all: Vec<PendingTaskRequest> = std::mem::take(&mut self.pending)
            .into_values()
            .chain(std::mem::take(&mut self.ready).into_values())
            .collect();
        all.sort_by_key(|request| request.sequence_number);
        all
    }

    fn on_client_connected(&mut self) {
        self.caller_starts_at = self
            .pending
            .keys()
            .chain(self.ready.keys())
            .min()
            .copied()
            .unwrap_or(self.next_send_position);
    }

    fn client_processed_up_to(&self) -> i64 {
        // The receiver must not prune by in-order progress for this mode.
        -1
    }

    fn next_send_position(&self) -> i64 {
        self.next_send_position
    }

    fn caller_starts_at(&self) -> i64 {
        self.caller_starts_at
    }

    fn len(&self) -> usize {
        self.pending.len() + self.ready.len()
    }

    fn sequence_numbers(&self) -> Vec<i64> {
        let mut seqs: Vec<i64> = self
            .pending
            .keys()
            .chain(self.ready.keys())
            .copied()
            .collect();
        seqs.sort_unstable();
        seqs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(seq: i64) -> PendingTaskRequest {
        use taskwire_proto::{ActorTaskSpec, TaskSpec, TaskType};
        PendingTaskRequest::new(TaskSpec {
            r#type: TaskType::ActorTask as i32,
            actor_task_spec: Some(ActorTaskSpec {
                actor_id: vec![1; 16],
                actor_counter: seq,
            }),
            ..Default::default()
        })
    }

    #[test]
    fn test_sequential_holds_behind_unresolved_head() {
        let mut queue = SequentialSubmitQueue::new();
        queue.emplace(request(0));
        queue.emplace(request(1));

        // Task 1 resolves first; the unresolved head blocks it.
        assert!(queue.mark_dependency_resolved(1));
        assert!(queue.pop_next_task_to_send().is_none());

        assert!(queue.mark_dependency_resolved(0));
        assert_eq!(queue.pop_next_task_to_send().unwrap().sequence_number, 0);
        assert_eq!(queue.pop_next_task_to_send().unwrap().sequence_number, 1);
        assert!(queue.pop_next_task_to_send().is_none());
    }

    #[test]
    fn test_sequential_resubmitted_lower_sequence_still_sends() {
        let mut queue = SequentialSubmitQueue::new();
        for seq in 0..4 {
            queue.emplace(request(seq));
            queue.mark_dependency_resolved(seq);
            queue.pop_next_task_to_send().unwrap();
        }
        assert_eq!(queue.next_send_position(), 4);

        // A retry resubmitted under its original counter.
        queue.emplace(request(1));
        queue.mark_dependency_resolved(1);
        assert_eq!(queue.pop_next_task_to_send().unwrap().sequence_number, 1);
        assert_eq!(queue.next_send_position(), 4);
    }

    #[test]
    fn test_sequential_client_processed_up_to_tracks_completions() {
        let mut queue = SequentialSubmitQueue::new();
        assert_eq!(queue.client_processed_up_to(), -1);
        queue.mark_seqno_completed(0);
        queue.mark_seqno_completed(1);
        assert_eq!(queue.client_processed_up_to(), 1);
        // Stale completion does not move it backwards.
        queue.mark_seqno_completed(0);
        assert_eq!(queue.client_processed_up_to(), 1);
    }

    #[test]
    fn test_sequential_caller_starts_at_after_connect() {
        let mut queue = SequentialSubmitQueue::new();
        queue.emplace(request(3));
        queue.emplace(request(4));
        queue.on_client_connected();
        assert_eq!(queue.caller_starts_at(), 3);
        assert_eq!(queue.sequence_numbers(), vec![3, 4]);
    }

    #[test]
    fn test_out_of_order_releases_on_resolution() {
        let mut queue = OutOfOrderSubmitQueue::new();
        queue.emplace(request(0));
        queue.emplace(request(1));

        assert!(queue.mark_dependency_resolved(1));
        assert_eq!(queue.pop_next_task_to_send().unwrap().sequence_number, 1);

        assert!(queue.mark_dependency_resolved(0));
        assert_eq!(queue.pop_next_task_to_send().unwrap().sequence_number, 0);
        assert!(queue.pop_next_task_to_send().is_none());
        assert_eq!(queue.client_processed_up_to(), -1);
    }

    #[test]
    fn test_clear_all_returns_everything_in_sequence_order() {
        let mut queue = OutOfOrderSubmitQueue::new();
        queue.emplace(request(2));
        queue.emplace(request(0));
        queue.emplace(request(1));
        queue.mark_dependency_resolved(1);

        let cleared = queue.clear_all_tasks();
        let seqs: Vec<i64> = cleared.iter().map(|r| r.sequence_number).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_mark_resolved_missing_sequence_reports_false() {
        let mut queue = SequentialSubmitQueue::new();
        assert!(!queue.mark_dependency_resolved(7));
        let mut ooo = OutOfOrderSubmitQueue::new();
        assert!(!ooo.mark_dependency_resolved(7));
    }
}
