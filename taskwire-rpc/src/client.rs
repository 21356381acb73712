// Copyright 2025 The Taskwire Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Client interface for the worker push-task service.

use std::sync::Arc;

use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;

use taskwire_common::status::Status;
use taskwire_proto::{Address, PushTaskReply, PushTaskRequest};

/// gRPC method path for pushes.
const PUSH_TASK_PATH: &str = "/taskwire.rpc.CoreWorkerService/PushTask";

/// Callback invoked with the outcome of a push.
pub type PushTaskReplyCallback = Box<dyn FnOnce(Status, PushTaskReply) + Send + 'static>;

/// A client for one worker endpoint.
///
/// `push_actor_task` hands the reply (or transport error) to `callback`
/// asynchronously. Implementations must never invoke the callback from
/// within `push_actor_task` itself: the submitter issues pushes while
/// holding its own state lock and re-enters that lock from the callback.
pub trait CoreWorkerClient: Send + Sync {
    /// The address this client was connected for.
    fn addr(&self) -> &Address;

    /// Issue a push. `skip_queue` bypasses receiver-side ordering and is
    /// reserved for control messages.
    fn push_actor_task(
        &self,
        request: PushTaskRequest,
        skip_queue: bool,
        callback: PushTaskReplyCallback,
    );
}

/// Tonic-backed [`CoreWorkerClient`] over a lazily-connecting channel.
///
/// The unary call is hand-rolled (path + prost codec) since the service
/// has a single method.
pub struct GrpcCoreWorkerClient {
    addr: Address,
    channel: Channel,
}

impl GrpcCoreWorkerClient {
    /// Create a client for `addr`. The channel does not connect until the
    /// first push.
    pub fn connect_lazy(addr: Address) -> Self {
        let uri = format!("http://{}:{}", addr.ip_address, addr.port);
        let channel = Channel::from_shared(uri)
            .expect("invalid URI")
            .connect_lazy();
        Self { addr, channel }
    }
}

impl CoreWorkerClient for GrpcCoreWorkerClient {
    fn addr(&self) -> &Address {
        &self.addr
    }

    fn push_actor_task(
        &self,
        request: PushTaskRequest,
        _skip_queue: bool,
        callback: PushTaskReplyCallback,
    ) {
        let mut grpc = Grpc::new(self.channel.clone());
        let seq = request.sequence_number;
        let ip = self.addr.ip_address.clone();
        tokio::spawn(async move {
            let result = async {
                grpc.ready().await.map_err(|e| {
                    tonic::Status::unavailable(format!("service was not ready: {e}"))
                })?;
                let codec: ProstCodec<PushTaskRequest, PushTaskReply> = ProstCodec::default();
                let path = PathAndQuery::from_static(PUSH_TASK_PATH);
                grpc.unary(tonic::Request::new(request), path, codec).await
            }
            .await;
            match result {
                Ok(response) => callback(Status::ok(), response.into_inner()),
                Err(status) => {
                    tracing::debug!(seq, ip = %ip, code = ?status.code(), "push task RPC failed");
                    callback(
                        Status::rpc_error(status.message().to_string(), status.code() as i32),
                        PushTaskReply::default(),
                    );
                }
            }
        });
    }
}

/// Shared client handle.
pub type SharedCoreWorkerClient = Arc<dyn CoreWorkerClient>;
