// Copyright 2025 The Taskwire Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! RPC-style status values.
//!
//! A [`Status`] is the outcome of a push RPC as observed by the submitter:
//! either OK or an error code with a message. It is a plain value rather
//! than a Rust error type because reply handlers branch on it instead of
//! propagating it.

use std::fmt;

/// Status codes for RPC outcomes and receiver-side rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum StatusCode {
    Ok = 0,
    IoError = 1,
    Invalid = 2,
    InvalidArgument = 3,
    TimedOut = 4,
    NotFound = 5,
    Disconnected = 6,
    AlreadyExists = 7,
    SchedulingCancelled = 8,
    RpcError = 9,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::IoError => "IOError",
            Self::Invalid => "Invalid",
            Self::InvalidArgument => "InvalidArgument",
            Self::TimedOut => "TimedOut",
            Self::NotFound => "NotFound",
            Self::Disconnected => "Disconnected",
            Self::AlreadyExists => "AlreadyExists",
            Self::SchedulingCancelled => "SchedulingCancelled",
            Self::RpcError => "RpcError",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The outcome of an RPC-shaped operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Status {
    pub code: StatusCode,
    pub message: String,
    /// For RpcError, the transport-level status code.
    pub rpc_code: Option<i32>,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            rpc_code: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::Ok, "")
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::IoError, msg)
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::Invalid, msg)
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::InvalidArgument, msg)
    }

    pub fn timed_out(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::TimedOut, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, msg)
    }

    pub fn disconnected(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::Disconnected, msg)
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::AlreadyExists, msg)
    }

    pub fn scheduling_cancelled(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::SchedulingCancelled, msg)
    }

    pub fn rpc_error(msg: impl Into<String>, rpc_code: i32) -> Self {
        Self {
            code: StatusCode::RpcError,
            message: msg.into(),
            rpc_code: Some(rpc_code),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }

    pub fn is_io_error(&self) -> bool {
        self.code == StatusCode::IoError
    }

    pub fn is_disconnected(&self) -> bool {
        self.code == StatusCode::Disconnected
    }

    pub fn is_rpc_error(&self) -> bool {
        self.code == StatusCode::RpcError
    }
}
