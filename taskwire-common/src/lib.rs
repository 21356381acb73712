// Copyright 2025 The Taskwire Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Shared types for taskwire workers: fixed-size identifiers, RPC-style
//! status values, worker configuration, and logging setup.

pub mod config;
pub mod constants;
pub mod id;
pub mod logging;
pub mod runtime;
pub mod status;
