// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-thread diagnostic context.
//!
//! A key/value context map and a stack of nested context entries, both local to the
//! calling thread. The ingest gate snapshots them when a record arrives without its own
//! context, so the values in effect at the logging call site travel with the record even
//! if it is mapped later on another thread.

use std::cell::RefCell;
use std::collections::BTreeMap;

thread_local! {
    static CONTEXT_MAP: RefCell<BTreeMap<String, String>> = const { RefCell::new(BTreeMap::new()) };
    static NESTED_CONTEXT: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

pub fn put(key: impl Into<String>, value: impl Into<String>) {
    CONTEXT_MAP.with(|map| {
        map.borrow_mut().insert(key.into(), value.into());
    });
}

pub fn remove(key: &str) -> Option<String> {
    CONTEXT_MAP.with(|map| map.borrow_mut().remove(key))
}

pub fn clear() {
    CONTEXT_MAP.with(|map| map.borrow_mut().clear());
    NESTED_CONTEXT.with(|stack| stack.borrow_mut().clear());
}

/// Copy of the current context map, `None` when it is empty.
#[must_use]
pub fn snapshot() -> Option<BTreeMap<String, String>> {
    CONTEXT_MAP.with(|map| {
        let map = map.borrow();
        (!map.is_empty()).then(|| map.clone())
    })
}

pub fn push_nested(entry: impl Into<String>) {
    NESTED_CONTEXT.with(|stack| stack.borrow_mut().push(entry.into()));
}

pub fn pop_nested() -> Option<String> {
    NESTED_CONTEXT.with(|stack| stack.borrow_mut().pop())
}

/// The nested context entries joined by a space, `None` when the stack is empty.
#[must_use]
pub fn nested_snapshot() -> Option<String> {
    NESTED_CONTEXT.with(|stack| {
        let stack = stack.borrow();
        (!stack.is_empty()).then(|| stack.join(" "))
    })
}

/// Removes its key from the context map when dropped.
#[must_use = "the entry is removed as soon as the guard is dropped"]
pub struct ContextGuard {
    key: String,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        remove(&self.key);
    }
}

/// Puts `key` into the context map for the lifetime of the returned guard.
pub fn scoped(key: impl Into<String>, value: impl Into<String>) -> ContextGuard {
    let key = key.into();
    put(key.clone(), value);
    ContextGuard { key }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_context_has_no_snapshot() {
        clear();
        assert_eq!(snapshot(), None);
        assert_eq!(nested_snapshot(), None);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        clear();
        put("requestId", "42");
        let captured = snapshot().expect("context");

        put("requestId", "43");

        assert_eq!(captured.get("requestId").map(String::as_str), Some("42"));
        clear();
    }

    #[test]
    fn test_scoped_entry_removed_on_drop() {
        clear();
        {
            let _guard = scoped("user", "alice");
            assert_eq!(
                snapshot().and_then(|m| m.get("user").cloned()).as_deref(),
                Some("alice")
            );
        }
        assert_eq!(snapshot(), None);
    }

    #[test]
    fn test_nested_context_stack() {
        clear();
        push_nested("outer");
        push_nested("inner");
        assert_eq!(nested_snapshot().as_deref(), Some("outer inner"));

        assert_eq!(pop_nested().as_deref(), Some("inner"));
        assert_eq!(nested_snapshot().as_deref(), Some("outer"));
        clear();
    }

    #[test]
    fn test_context_is_thread_local() {
        clear();
        put("thread", "main");

        let other = std::thread::spawn(snapshot).join().expect("join");

        assert_eq!(other, None);
        clear();
    }
}
