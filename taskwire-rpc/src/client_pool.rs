// Copyright 2025 The Taskwire Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Per-endpoint cache of worker clients.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use taskwire_proto::Address;

#[cfg(test)]
use crate::client::CoreWorkerClient;
use crate::client::{GrpcCoreWorkerClient, SharedCoreWorkerClient};

/// Builds a client for an address the pool has not seen before.
///
/// The factory runs exactly once per (ip, port): callers that need to
/// observe first connects (telemetry, tests) do so here.
pub type ClientFactory = Box<dyn Fn(&Address) -> SharedCoreWorkerClient + Send + Sync>;

/// Caches one shared client per (ip, port) endpoint.
///
/// Reconnecting to a cached endpoint is idempotent and returns the same
/// handle regardless of the worker id in the address, so client-side
/// sequence history survives a same-endpoint re-connect.
pub struct ClientPool {
    factory: ClientFactory,
    clients: Mutex<HashMap<(String, i32), SharedCoreWorkerClient>>,
}

impl ClientPool {
    pub fn new(factory: ClientFactory) -> Self {
        Self {
            factory,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// A pool producing tonic-backed clients.
    pub fn with_grpc_clients() -> Self {
        Self::new(Box::new(|addr| {
            Arc::new(GrpcCoreWorkerClient::connect_lazy(addr.clone()))
        }))
    }

    /// The client for `addr`, building it on first sight of the endpoint.
    pub fn get_or_connect(&self, addr: &Address) -> SharedCoreWorkerClient {
        let key = (addr.ip_address.clone(), addr.port);
        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(&key) {
            return client.clone();
        }
        tracing::debug!(ip = %addr.ip_address, port = addr.port, "connecting new worker client");
        let client = (self.factory)(addr);
        clients.insert(key, client.clone());
        client
    }

    /// Drop the cached client for `addr`'s endpoint, if any.
    pub fn disconnect(&self, addr: &Address) -> bool {
        self.clients
            .lock()
            .remove(&(addr.ip_address.clone(), addr.port))
            .is_some()
    }

    /// Number of distinct endpoints seen and still cached.
    pub fn num_endpoints(&self) -> usize {
        self.clients.lock().len()
    }
}
