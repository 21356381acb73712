// Copyright 2025 The Taskwire Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Worker error types.

/// Errors surfaced by the submitter and receiver.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("actor not found: {0}")]
    ActorNotFound(String),

    #[error("actor died: {0}")]
    ActorDied(String),

    #[error("object already exists: {0}")]
    ObjectAlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("stale caller: {0}")]
    StaleCaller(String),

    #[error("duplicate task: {0}")]
    DuplicateTask(String),

    #[error("worker not initialized")]
    NotInitialized,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;
