use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::models::CandidatePost;

/// What a bounded queue does with a push when it is already full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    #[default]
    DropOldest,
    DropNewest,
}

/// FIFO of posts waiting for the processor, shared by every fetch task.
///
/// Unbounded unless a `max_len` is given.
pub struct CandidateQueue {
    posts: Mutex<VecDeque<CandidatePost>>,
    max_len: Option<usize>,
    overflow: OverflowPolicy,
}

impl CandidateQueue {
    pub fn unbounded() -> Self {
        Self::new(None, OverflowPolicy::default())
    }

    pub fn new(max_len: Option<usize>, overflow: OverflowPolicy) -> Self {
        Self {
            posts: Mutex::new(VecDeque::new()),
            max_len,
            overflow,
        }
    }

    /// Push a post; returns how many posts were dropped to respect `max_len`.
    pub fn push(&self, post: CandidatePost) -> usize {
        self.extend(std::iter::once(post))
    }

    /// Push many posts under a single lock; returns how many were dropped.
    pub fn extend(&self, posts: impl IntoIterator<Item = CandidatePost>) -> usize {
        let mut queue = self.lock();
        let mut dropped = 0;
        for post in posts {
            match self.max_len {
                Some(max) if queue.len() >= max => {
                    dropped += 1;
                    match self.overflow {
                        OverflowPolicy::DropNewest => continue,
                        OverflowPolicy::DropOldest => {
                            queue.pop_front();
                        }
                    }
                    if max == 0 {
                        continue;
                    }
                }
                _ => {}
            }
            queue.push_back(post);
        }
        dropped
    }

    pub fn pop(&self) -> Option<CandidatePost> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<CandidatePost>> {
        // A panic while holding the lock can't leave a VecDeque half-updated.
        self.posts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for CandidateQueue {
    fn default() -> Self {
        Self::unbounded()
    }
}
