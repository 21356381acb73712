// Copyright 2025 The Taskwire Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Builder for `TaskSpec` messages.

use taskwire_common::id::{ActorId, ObjectId, TaskId};
use taskwire_proto::{
    ActorTaskSpec, Address, ObjectReference, TaskArg, TaskSpec, TaskType,
};

/// Fluent construction of actor task specs.
pub struct TaskSpecBuilder {
    spec: TaskSpec,
}

impl TaskSpecBuilder {
    pub fn new() -> Self {
        Self {
            spec: TaskSpec::default(),
        }
    }

    /// Set the fields shared by all task types.
    pub fn set_common_task_spec(
        &mut self,
        task_id: &TaskId,
        name: impl Into<String>,
        caller_id: &TaskId,
        caller_address: Address,
        num_returns: i64,
        caller_timestamp: i64,
    ) -> &mut Self {
        self.spec.task_id = task_id.binary();
        self.spec.name = name.into();
        self.spec.caller_id = caller_id.binary();
        self.spec.caller_address = Some(caller_address);
        self.spec.num_returns = num_returns;
        self.spec.caller_timestamp = caller_timestamp;
        self
    }

    /// Configure as an actor task targeting `actor_id` with the
    /// caller-assigned `actor_counter`.
    pub fn set_actor_task_spec(&mut self, actor_id: &ActorId, actor_counter: i64) -> &mut Self {
        self.spec.r#type = TaskType::ActorTask as i32;
        self.spec.actor_task_spec = Some(ActorTaskSpec {
            actor_id: actor_id.binary(),
            actor_counter,
        });
        self
    }

    /// Mark the task as retryable after failure.
    pub fn set_retryable(&mut self, retryable: bool) -> &mut Self {
        self.spec.retryable = retryable;
        self
    }

    /// Add a by-reference argument.
    pub fn add_object_ref_arg(&mut self, object_id: &ObjectId) -> &mut Self {
        self.spec.args.push(TaskArg {
            object_ref: Some(ObjectReference {
                object_id: object_id.binary(),
            }),
        });
        self
    }

    /// Build the final `TaskSpec`.
    pub fn build(self) -> TaskSpec {
        self.spec
    }
}

impl Default for TaskSpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}
