// Copyright 2025 The Taskwire Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Wire message types for the push-task protocol (package `taskwire.rpc`).
//!
//! These messages are hand-written prost types rather than protoc output:
//! the wire surface is small and fixed, and field tags below are the wire
//! contract. Do not renumber tags.

use prost::Message;

/// Network location of a worker: the worker's id plus its (ip, port)
/// endpoint.
///
/// Two addresses with equal (ip, port) refer to the same endpoint even if
/// the worker id differs; see [`Address::same_endpoint`].
#[derive(Clone, PartialEq, Message)]
pub struct Address {
    #[prost(bytes = "vec", tag = "1")]
    pub worker_id: Vec<u8>,
    #[prost(string, tag = "2")]
    pub ip_address: String,
    #[prost(int32, tag = "3")]
    pub port: i32,
}

impl Address {
    /// Endpoint equality: same (ip, port), ignoring the worker id.
    pub fn same_endpoint(&self, other: &Address) -> bool {
        self.ip_address == other.ip_address && self.port == other.port
    }
}

/// A reference to an object by id.
#[derive(Clone, PartialEq, Message)]
pub struct ObjectReference {
    #[prost(bytes = "vec", tag = "1")]
    pub object_id: Vec<u8>,
}

/// A single task argument. Only by-reference arguments participate in
/// dependency resolution.
#[derive(Clone, PartialEq, Message)]
pub struct TaskArg {
    #[prost(message, optional, tag = "1")]
    pub object_ref: Option<ObjectReference>,
}

/// Task kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum TaskType {
    NormalTask = 0,
    ActorCreationTask = 1,
    ActorTask = 2,
}

/// Actor-task-specific fields.
#[derive(Clone, PartialEq, Message)]
pub struct ActorTaskSpec {
    #[prost(bytes = "vec", tag = "1")]
    pub actor_id: Vec<u8>,
    /// Caller-assigned monotone counter per (caller, actor). Doubles as
    /// the send sequence number and the receiver-side duplicate key.
    #[prost(int64, tag = "2")]
    pub actor_counter: i64,
}

/// Immutable description of a task.
#[derive(Clone, PartialEq, Message)]
pub struct TaskSpec {
    #[prost(bytes = "vec", tag = "1")]
    pub task_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub caller_id: Vec<u8>,
    #[prost(enumeration = "TaskType", tag = "3")]
    pub r#type: i32,
    #[prost(message, optional, tag = "4")]
    pub caller_address: Option<Address>,
    #[prost(message, optional, tag = "5")]
    pub actor_task_spec: Option<ActorTaskSpec>,
    #[prost(message, repeated, tag = "6")]
    pub args: Vec<TaskArg>,
    #[prost(int64, tag = "7")]
    pub num_returns: i64,
    /// Wall-clock milliseconds at which the caller process assigned this
    /// spec; used by the receiver to order caller incarnations.
    #[prost(int64, tag = "8")]
    pub caller_timestamp: i64,
    #[prost(string, tag = "9")]
    pub name: String,
    #[prost(bool, tag = "10")]
    pub retryable: bool,
}

impl TaskSpec {
    /// The actor counter, or -1 when this is not an actor task.
    pub fn actor_counter(&self) -> i64 {
        self.actor_task_spec.as_ref().map_or(-1, |s| s.actor_counter)
    }

    /// Raw actor id bytes, empty when this is not an actor task.
    pub fn actor_id_bytes(&self) -> &[u8] {
        self.actor_task_spec
            .as_ref()
            .map_or(&[] as &[u8], |s| s.actor_id.as_slice())
    }

    /// Raw worker id bytes of the caller address.
    pub fn caller_worker_id_bytes(&self) -> &[u8] {
        self.caller_address
            .as_ref()
            .map_or(&[] as &[u8], |a| a.worker_id.as_slice())
    }

    /// Object ids referenced by the task's arguments, in argument order.
    pub fn arg_object_id_bytes(&self) -> Vec<&[u8]> {
        self.args
            .iter()
            .filter_map(|arg| arg.object_ref.as_ref().map(|r| r.object_id.as_slice()))
            .collect()
    }
}

/// Cause attached to an actor death notification.
#[derive(Clone, PartialEq, Message)]
pub struct ActorDeathCause {
    #[prost(string, tag = "1")]
    pub error_message: String,
}

/// A task return value.
#[derive(Clone, PartialEq, Message)]
pub struct ReturnObject {
    #[prost(bytes = "vec", tag = "1")]
    pub object_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub metadata: Vec<u8>,
}

/// The push-task request envelope produced by the submitter.
#[derive(Clone, PartialEq, Message)]
pub struct PushTaskRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub intended_worker_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub task_spec: Option<TaskSpec>,
    /// Equals the task's actor counter at send time.
    #[prost(int64, tag = "3")]
    pub sequence_number: i64,
    /// Highest sequence number the submitter has acknowledged as
    /// completed in order, -1 when none.
    #[prost(int64, tag = "4")]
    pub client_processed_up_to: i64,
}

/// The push-task reply.
#[derive(Clone, PartialEq, Message)]
pub struct PushTaskReply {
    #[prost(message, repeated, tag = "1")]
    pub return_objects: Vec<ReturnObject>,
    #[prost(bool, tag = "2")]
    pub worker_exiting: bool,
    #[prost(bool, tag = "3")]
    pub is_retryable_error: bool,
    #[prost(bool, tag = "4")]
    pub is_application_error: bool,
    #[prost(string, tag = "5")]
    pub task_execution_error: String,
}
