use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{SearchError, SearchResult};

pub type PostId = i64;

/// A question (no parent) or an answer pointing at its question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    #[serde(default)]
    pub parent_id: Option<PostId>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// HTML-stripped, lowercased, punctuation-free body produced at ingestion.
    #[serde(default)]
    pub cleaned_body: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub creation_date: Option<String>,
}

impl Post {
    pub fn is_question(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Id of the question thread this post belongs to.
    pub fn representative_id(&self) -> PostId {
        self.parent_id.unwrap_or(self.id)
    }
}

/// Immutable, ordered post collection.
///
/// Ingestion order is significant: topic lists and tie-breaks follow it.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    posts: Vec<Post>,
    positions: HashMap<PostId, usize>,
}

impl Corpus {
    /// Builds the corpus, rejecting duplicate ids and any parent link that is
    /// not a question: missing, the post itself, or another answer.
    pub fn new(posts: Vec<Post>) -> SearchResult<Self> {
        let mut positions = HashMap::with_capacity(posts.len());
        for (pos, post) in posts.iter().enumerate() {
            if positions.insert(post.id, pos).is_some() {
                return Err(SearchError::InvalidCorpus(format!("duplicate post id {}", post.id)));
            }
        }
        for post in &posts {
            let Some(parent) = post.parent_id else { continue };
            if parent == post.id {
                return Err(SearchError::InvalidCorpus(format!("post {} is its own parent", post.id)));
            }
            match positions.get(&parent).map(|&pos| &posts[pos]) {
                None => {
                    return Err(SearchError::InvalidCorpus(format!(
                        "post {} references missing parent {}",
                        post.id, parent
                    )))
                }
                Some(p) if !p.is_question() => {
                    return Err(SearchError::InvalidCorpus(format!(
                        "post {} answers post {}, which is itself an answer",
                        post.id, parent
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(Self { posts, positions })
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn get(&self, id: PostId) -> Option<&Post> {
        self.positions.get(&id).map(|&pos| &self.posts[pos])
    }

    pub fn contains(&self, id: PostId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Ids in ingestion order.
    pub fn ids(&self) -> Vec<PostId> {
        self.posts.iter().map(|p| p.id).collect()
    }

    pub fn questions(&self) -> impl Iterator<Item = &Post> {
        self.posts.iter().filter(|p| p.is_question())
    }

    pub fn into_posts(self) -> Vec<Post> {
        self.posts
    }
}

#[cfg(test)]
pub(crate) fn post(id: PostId, parent_id: Option<PostId>, cleaned_body: &str) -> Post {
    Post {
        id,
        parent_id,
        title: if parent_id.is_none() { format!("question {id}") } else { String::new() },
        body: cleaned_body.to_string(),
        cleaned_body: cleaned_body.to_string(),
        score: 0.0,
        creation_date: None,
    }
}
