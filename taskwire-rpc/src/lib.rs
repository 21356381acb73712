// Copyright 2025 The Taskwire Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! RPC plumbing for pushing actor tasks between workers: the
//! [`client::CoreWorkerClient`] trait, a tonic-backed implementation, and
//! the per-endpoint [`client_pool::ClientPool`].

pub mod client;
pub mod client_pool;
