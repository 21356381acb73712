// Copyright 2025 The Taskwire Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! In-process object store.
//!
//! The store is the submitter's view of object availability: dependency
//! resolution registers async getters here, and each `put` wakes the
//! waiters for that object by posting one callback per waiter onto the
//! event loop.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use taskwire_common::id::ObjectId;

use crate::error::{WorkerError, WorkerResult};
use crate::event_loop::EventLoop;

/// An object held in memory.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub metadata: Bytes,
}

impl StoredObject {
    pub fn new(data: Bytes, metadata: Bytes) -> Self {
        Self { data, metadata }
    }

    /// A data-only object.
    pub fn from_data(data: Bytes) -> Self {
        Self::new(data, Bytes::new())
    }
}

/// Callback invoked when an awaited object becomes available.
pub type GetCallback = Box<dyn FnOnce(StoredObject) + Send + 'static>;

struct StoreInner {
    objects: HashMap<ObjectId, StoredObject>,
    waiters: HashMap<ObjectId, Vec<GetCallback>>,
}

/// Thread-safe in-process memory store.
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
    event_loop: Arc<EventLoop>,
}

impl MemoryStore {
    pub fn new(event_loop: Arc<EventLoop>) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                objects: HashMap::new(),
                waiters: HashMap::new(),
            }),
            event_loop,
        }
    }

    /// Put an object into the store, waking any waiters. Returns an error
    /// if the object already exists.
    pub fn put(&self, object_id: ObjectId, object: StoredObject) -> WorkerResult<()> {
        let waiters = {
            let mut inner = self.inner.lock();
            if inner.objects.contains_key(&object_id) {
                return Err(WorkerError::ObjectAlreadyExists(object_id.hex()));
            }
            inner.objects.insert(object_id, object.clone());
            inner.waiters.remove(&object_id).unwrap_or_default()
        };
        for callback in waiters {
            let object = object.clone();
            self.event_loop.post(move || callback(object));
        }
        Ok(())
    }

    /// Get an object, or `None` if not present.
    pub fn get(&self, object_id: &ObjectId) -> Option<StoredObject> {
        self.inner.lock().objects.get(object_id).cloned()
    }

    /// Invoke `callback` with the object once it is locally available.
    ///
    /// If the object is already present the callback runs inline;
    /// otherwise it is registered and will run as a posted event-loop
    /// callback when the object is put.
    pub fn get_async(&self, object_id: &ObjectId, callback: GetCallback) {
        let mut inner = self.inner.lock();
        if let Some(object) = inner.objects.get(object_id).cloned() {
            drop(inner);
            callback(object);
        } else {
            inner.waiters.entry(*object_id).or_default().push(callback);
        }
    }

    /// Delete an object. Returns whether it was present.
    pub fn delete(&self, object_id: &ObjectId) -> bool {
        self.inner.lock().objects.remove(object_id).is_some()
    }

    /// Check if an object exists.
    pub fn contains(&self, object_id: &ObjectId) -> bool {
        self.inner.lock().objects.contains_key(object_id)
    }

    /// Number of stored objects.
    pub fn size(&self) -> usize {
        self.inner.lock().objects.len()
    }

    /// Number of objects with registered waiters.
    pub fn num_awaited_objects(&self) -> usize {
        self.inner.lock().waiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_store() -> (Arc<EventLoop>, MemoryStore) {
        let event_loop = Arc::new(EventLoop::new());
        let store = MemoryStore::new(event_loop.clone());
        (event_loop, store)
    }

    fn make_object(data: &[u8]) -> StoredObject {
        StoredObject::from_data(Bytes::copy_from_slice(data))
    }

    #[test]
    fn test_put_and_get() {
        let (_loop, store) = make_store();
        let oid = ObjectId::from_random();
        store.put(oid, make_object(b"hello")).unwrap();
        assert_eq!(store.get(&oid).unwrap().data.as_ref(), b"hello");
        assert!(store.contains(&oid));
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn test_duplicate_put_errors() {
        let (_loop, store) = make_store();
        let oid = ObjectId::from_random();
        store.put(oid, make_object(b"a")).unwrap();
        let err = store.put(oid, make_object(b"b")).unwrap_err();
        assert!(matches!(err, WorkerError::ObjectAlreadyExists(_)));
    }

    #[test]
    fn test_delete() {
        let (_loop, store) = make_store();
        let oid = ObjectId::from_random();
        store.put(oid, make_object(b"x")).unwrap();
        assert!(store.delete(&oid));
        assert!(!store.delete(&oid));
        assert!(store.get(&oid).is_none());
    }

    #[test]
    fn test_get_async_fires_inline_when_present() {
        let (event_loop, store) = make_store();
        let oid = ObjectId::from_random();
        store.put(oid, make_object(b"ready")).unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        store.get_async(
            &oid,
            Box::new(move |object| {
                assert_eq!(object.data.as_ref(), b"ready");
                fired2.fetch_add(1, Ordering::Relaxed);
            }),
        );
        // Inline, not posted.
        assert_eq!(fired.load(Ordering::Relaxed), 1);
        assert!(event_loop.is_empty());
    }

    #[test]
    fn test_put_posts_one_callback_per_waiter() {
        let (event_loop, store) = make_store();
        let oid = ObjectId::from_random();

        let fired = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let fired = fired.clone();
            store.get_async(
                &oid,
                Box::new(move |_| {
                    fired.fetch_add(1, Ordering::Relaxed);
                }),
            );
        }
        assert_eq!(store.num_awaited_objects(), 1);
        assert_eq!(fired.load(Ordering::Relaxed), 0);

        store.put(oid, make_object(b"arrived")).unwrap();
        assert_eq!(event_loop.len(), 2);
        assert_eq!(event_loop.poll(), 2);
        assert_eq!(fired.load(Ordering::Relaxed), 2);
        assert_eq!(store.num_awaited_objects(), 0);
    }
}
