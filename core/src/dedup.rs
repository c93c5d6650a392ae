//! Collapse a ranked list to one row per question thread.
//!
//! A thread is named by its representative id: the parent id for answers,
//! the post's own id for questions. The first (best ranked) row of each
//! thread survives and thread order is preserved.

use std::collections::HashSet;

use crate::post::{Post, PostId};

pub fn representative_id(post: &Post) -> PostId {
    post.representative_id()
}

/// Keeps the best row per thread, then truncates to `top_n` when given.
pub fn dedupe<T, F>(ranked: Vec<T>, top_n: Option<usize>, mut post_of: F) -> Vec<T>
where
    F: FnMut(&T) -> &Post,
{
    let limit = top_n.unwrap_or(usize::MAX);
    let mut seen: HashSet<PostId> = HashSet::new();
    let mut kept = Vec::new();
    for row in ranked {
        if kept.len() >= limit {
            break;
        }
        if seen.insert(representative_id(post_of(&row))) {
            kept.push(row);
        }
    }
    kept
}
