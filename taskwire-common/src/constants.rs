// Copyright 2025 The Taskwire Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Workspace-wide constants.

/// Length of full-size unique IDs (worker, object) in bytes.
pub const UNIQUE_ID_SIZE: usize = 28;

/// Number of leading index bytes in an object ID.
pub const OBJECT_ID_INDEX_SIZE: usize = 4;

/// First per-actor queueing depth at which the excess-queueing warning
/// fires. Doubles on each trip.
pub const DEFAULT_QUEUEING_WARN_THRESHOLD: i64 = 5_000;

/// How long a failed inflight task is remembered while waiting for the
/// actor's death to be confirmed, in milliseconds.
pub const DEFAULT_DEATH_INFO_GRACE_PERIOD_MS: u64 = 1_000;
