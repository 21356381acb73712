// Copyright 2025 The Taskwire Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Fixed-size identifier types.
//!
//! ID hierarchy:
//! - `JobId` (16 bytes)
//! - `ActorId` (16 bytes = 12 unique + 4 JobId prefix)
//! - `TaskId` (24 bytes = 8 unique + 16 ActorId)
//! - `ObjectId` (28 bytes = 4 index + 24 TaskId)
//! - `WorkerId` (28 bytes)
//!
//! Equality and hashing are by raw bytes. The nil value is all 0xFF.

use std::fmt;

use crate::constants::UNIQUE_ID_SIZE;

// FNV-1a, used to derive child IDs deterministically from parent IDs.
fn fnv1a_64(bytes: &[u8], seed: u64) -> u64 {
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = 0xcbf2_9ce4_8422_2325 ^ seed;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

// ─── ID Macro ────────────────────────────────────────────────────────────────

/// Generates a fixed-size ID type.
///
/// Each ID is a `[u8; N]` newtype with:
/// - `from_binary` / `from_hex` / `from_random` constructors
/// - `binary()` / `hex()` / `data()` accessors
/// - `Hash`, `Eq`, `PartialEq`, `Ord`, `Clone`, `Copy`, `Debug`, `Display`
/// - `nil()` default (all 0xFF bytes)
macro_rules! define_wire_id {
    ($name:ident, $size:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(C)]
        pub struct $name {
            data: [u8; $size],
        }

        impl $name {
            /// The fixed byte size of this ID type.
            pub const SIZE: usize = $size;

            /// Create a nil ID (all 0xFF bytes).
            pub const fn nil() -> Self {
                Self {
                    data: [0xFF; $size],
                }
            }

            /// Create an ID from raw bytes. Panics if `bytes.len() != SIZE`.
            pub fn from_binary(bytes: &[u8]) -> Self {
                assert_eq!(
                    bytes.len(),
                    $size,
                    "expected {} bytes for {}, got {}",
                    $size,
                    stringify!($name),
                    bytes.len()
                );
                let mut data = [0u8; $size];
                data.copy_from_slice(bytes);
                Self { data }
            }

            /// Create an ID from a hex string. Returns `nil()` on invalid input.
            pub fn from_hex(hex_str: &str) -> Self {
                if hex_str.len() != $size * 2 {
                    tracing::error!(
                        "incorrect hex string length for {}: expected {}, got {}",
                        stringify!($name),
                        $size * 2,
                        hex_str.len()
                    );
                    return Self::nil();
                }
                match hex::decode(hex_str) {
                    Ok(bytes) => Self::from_binary(&bytes),
                    Err(_) => {
                        tracing::error!("invalid hex string for {}", stringify!($name));
                        Self::nil()
                    }
                }
            }

            /// Create a random ID.
            pub fn from_random() -> Self {
                use rand::RngCore;
                let mut data = [0u8; $size];
                rand::thread_rng().fill_bytes(&mut data);
                Self { data }
            }

            /// Returns true if this is the nil ID (all 0xFF).
            pub fn is_nil(&self) -> bool {
                self.data == [0xFF; $size]
            }

            /// Raw byte array reference.
            pub fn data(&self) -> &[u8; $size] {
                &self.data
            }

            /// Raw bytes as `&[u8]`.
            pub fn as_bytes(&self) -> &[u8] {
                &self.data
            }

            /// Binary string (owned copy of the bytes).
            pub fn binary(&self) -> Vec<u8> {
                self.data.to_vec()
            }

            /// Hex-encoded string (lowercase).
            pub fn hex(&self) -> String {
                hex::encode(self.data)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::nil()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.hex())
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.data
            }
        }
    };
}

// ─── ID Type Definitions ─────────────────────────────────────────────────────

define_wire_id!(JobId, 16);
define_wire_id!(ActorId, 16);
define_wire_id!(TaskId, 24);
define_wire_id!(ObjectId, 28);
define_wire_id!(WorkerId, UNIQUE_ID_SIZE);

// ─── ActorId extras ──────────────────────────────────────────────────────────

impl ActorId {
    const UNIQUE_BYTES_LENGTH: usize = 12;

    /// Derive an ActorId from the owning job and the creating task context.
    pub fn of(job_id: &JobId, parent_task_id: &TaskId, parent_task_counter: u64) -> Self {
        let mut data = [0u8; Self::SIZE];

        let mut hash_input = Vec::with_capacity(TaskId::SIZE + 8);
        hash_input.extend_from_slice(parent_task_id.as_bytes());
        hash_input.extend_from_slice(&parent_task_counter.to_le_bytes());

        let h1 = fnv1a_64(&hash_input, 0);
        let h2 = fnv1a_64(&hash_input, 1);
        data[..8].copy_from_slice(&h1.to_le_bytes());
        data[8..Self::UNIQUE_BYTES_LENGTH].copy_from_slice(&h2.to_le_bytes()[..4]);

        // Trailing bytes carry the job prefix so the owning job is
        // recoverable from the actor ID alone.
        data[Self::UNIQUE_BYTES_LENGTH..].copy_from_slice(&job_id.data()[..4]);

        Self { data }
    }

    /// The embedded job prefix (leading 4 bytes of the owning `JobId`).
    pub fn job_prefix(&self) -> [u8; 4] {
        let mut prefix = [0u8; 4];
        prefix.copy_from_slice(&self.data[Self::UNIQUE_BYTES_LENGTH..]);
        prefix
    }
}

// ─── TaskId extras ───────────────────────────────────────────────────────────

impl TaskId {
    const UNIQUE_BYTES_LENGTH: usize = 8;

    /// Derive a TaskId for a task targeting `actor_id`, unique per
    /// (parent task, counter).
    pub fn for_actor_task(
        parent_task_id: &TaskId,
        parent_task_counter: u64,
        actor_id: &ActorId,
    ) -> Self {
        let mut data = [0u8; Self::SIZE];

        let mut hash_input = Vec::with_capacity(TaskId::SIZE + 8);
        hash_input.extend_from_slice(parent_task_id.as_bytes());
        hash_input.extend_from_slice(&parent_task_counter.to_le_bytes());
        let hash = fnv1a_64(&hash_input, 0);

        data[..Self::UNIQUE_BYTES_LENGTH].copy_from_slice(&hash.to_le_bytes());
        data[Self::UNIQUE_BYTES_LENGTH..].copy_from_slice(actor_id.data());

        Self { data }
    }

    /// Extract the embedded ActorId (last 16 bytes).
    pub fn actor_id(&self) -> ActorId {
        ActorId::from_binary(&self.data[Self::UNIQUE_BYTES_LENGTH..])
    }
}

// ─── ObjectId extras ─────────────────────────────────────────────────────────

impl ObjectId {
    const INDEX_BYTES_LENGTH: usize = 4;

    /// Derive the ObjectId for the `index`-th return of `task_id`.
    /// Return indices start at 1.
    pub fn for_task_return(task_id: &TaskId, index: u32) -> Self {
        let mut data = [0u8; Self::SIZE];
        data[..Self::INDEX_BYTES_LENGTH].copy_from_slice(&index.to_le_bytes());
        data[Self::INDEX_BYTES_LENGTH..].copy_from_slice(task_id.as_bytes());
        Self { data }
    }

    /// Extract the embedded TaskId (last 24 bytes).
    pub fn task_id(&self) -> TaskId {
        TaskId::from_binary(&self.data[Self::INDEX_BYTES_LENGTH..])
    }

    /// The return index encoded in the leading bytes.
    pub fn return_index(&self) -> u32 {
        let mut idx = [0u8; 4];
        idx.copy_from_slice(&self.data[..Self::INDEX_BYTES_LENGTH]);
        u32::from_le_bytes(idx)
    }
}
