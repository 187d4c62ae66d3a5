//! Thread-local resolution context.
//!
//! Tracks, per thread, which invocations are currently being computed, in
//! call order. The runner pushes a frame before resolving dependencies and
//! the frame is popped when its guard drops, so the stack always mirrors the
//! live `analyze` call stack on this thread.
//!
//! ## Thread Safety
//!
//! - Each thread has its own stack (via `thread_local!`)
//! - Frames carry a session id so independent sessions never see each other
//! - Guards use RAII for cleanup, including on early `?` returns

use crate::key::CacheKey;
use std::cell::RefCell;

thread_local! {
    static RESOLUTION_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Frame {
    session: u64,
    key: CacheKey,
}

/// RAII guard popping its frame on drop.
#[must_use = "the frame is popped as soon as the guard is dropped"]
pub struct ResolutionGuard {
    depth: usize,
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLUTION_STACK.with(|stack| {
            stack.borrow_mut().truncate(self.depth);
        });
    }
}

/// Push `key` as the innermost in-progress invocation of `session`.
pub fn enter(session: u64, key: &CacheKey) -> ResolutionGuard {
    RESOLUTION_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let depth = stack.len();
        stack.push(Frame {
            session,
            key: key.clone(),
        });
        ResolutionGuard { depth }
    })
}

/// If `key` is already in progress for `session` on this thread, return the
/// chain from its outermost frame back to `key` itself.
#[must_use]
pub fn cycle_chain(session: u64, key: &CacheKey) -> Option<Vec<String>> {
    RESOLUTION_STACK.with(|stack| {
        let stack = stack.borrow();
        let start = stack
            .iter()
            .position(|f| f.session == session && &f.key == key)?;
        let mut chain: Vec<String> = stack[start..]
            .iter()
            .filter(|f| f.session == session)
            .map(|f| f.key.to_string())
            .collect();
        chain.push(key.to_string());
        Some(chain)
    })
}

/// Keys in progress for `session` on this thread, outermost first.
#[must_use]
pub fn current_stack(session: u64) -> Vec<CacheKey> {
    RESOLUTION_STACK.with(|stack| {
        stack
            .borrow()
            .iter()
            .filter(|f| f.session == session)
            .map(|f| f.key.clone())
            .collect()
    })
}
