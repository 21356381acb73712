// Copyright 2025 The Taskwire Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Capability interfaces consumed by the submitter.
//!
//! The submitter records task outcomes through a [`TaskFinisher`] and
//! argument reference ownership through [`ReferenceCounting`]. Both are
//! injected at construction; retry policy and object lineage live behind
//! them, upstream of this crate.

use std::fmt;

use taskwire_common::id::{ObjectId, TaskId};
use taskwire_common::status::Status;
use taskwire_proto::{ActorDeathCause, Address, PushTaskReply};

/// Classification of a task failure as surfaced to the finisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskErrorKind {
    /// The actor was confirmed dead; carries the death cause when known.
    ActorDied,
    /// The actor was unreachable (restarting or mid-migration).
    ActorUnavailable,
    /// The transport to the executing worker failed while the actor was
    /// believed alive.
    WorkerDied,
}

impl TaskErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActorDied => "ACTOR_DIED",
            Self::ActorUnavailable => "ACTOR_UNAVAILABLE",
            Self::WorkerDied => "WORKER_DIED",
        }
    }
}

impl fmt::Display for TaskErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Records per-task completion and failure outcomes; owns retry policy.
pub trait TaskFinisher: Send + Sync {
    /// A push completed. `is_application_error` marks replies whose
    /// execution raised inside the actor rather than in the system.
    fn complete_pending_task(
        &self,
        task_id: TaskId,
        reply: &PushTaskReply,
        actor_addr: &Address,
        is_application_error: bool,
    );

    /// A push failed. Returns true when the finisher will retry the task,
    /// in which case the submitter forgets it; the retry arrives as a
    /// fresh submission. `mark_task_failed` finalizes the task's return
    /// objects; `fail_immediately` skips any grace handling upstream.
    #[allow(clippy::too_many_arguments)]
    fn fail_or_retry_pending_task(
        &self,
        task_id: TaskId,
        error_kind: TaskErrorKind,
        status: &Status,
        death_cause: Option<&ActorDeathCause>,
        mark_task_failed: bool,
        fail_immediately: bool,
    ) -> bool;
}

/// Tracks ownership of argument object references for pending tasks.
pub trait ReferenceCounting: Send + Sync {
    /// The submitter now holds a reference to `object_id` on behalf of a
    /// pending task.
    fn add_borrowed_object(&self, object_id: &ObjectId);

    /// The pending task finished (completed, failed, or was handed back
    /// for retry); the reference is released.
    fn remove_local_reference(&self, object_id: &ObjectId);
}
