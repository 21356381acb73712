// Copyright 2025 The Taskwire Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Logging setup using the `tracing` ecosystem.

use std::path::Path;

use tracing_subscriber::EnvFilter;

/// Initialize logging for a worker process.
///
/// The filter is taken from `TASKWIRE_LOG_LEVEL` or `RUST_LOG`, falling
/// back to a level derived from `verbosity` (0 = info, 1 = debug,
/// 2+ = trace). When `log_dir` is given, output is appended to
/// `<component>.log` in that directory instead of stderr.
pub fn init_logging(component: &str, log_dir: Option<&Path>, verbosity: i32) {
    let filter = EnvFilter::try_from_env("TASKWIRE_LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| {
            let level = match verbosity {
                0 => "info",
                1 => "debug",
                _ => "trace",
            };
            EnvFilter::new(level)
        });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    if let Some(dir) = log_dir {
        let log_file = dir.join(format!("{component}.log"));
        match std::fs::OpenOptions::new().create(true).append(true).open(&log_file) {
            Ok(file) => subscriber.with_writer(file).init(),
            Err(e) => {
                subscriber.init();
                tracing::warn!(path = %log_file.display(), error = %e, "falling back to stderr logging");
            }
        }
    } else {
        subscriber.init();
    }

    tracing::info!(component, "logging initialized");
}
