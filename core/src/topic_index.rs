use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use crate::error::{SearchError, SearchResult};
use crate::post::{Corpus, PostId};
use crate::topic_model::{first_argmax, TopicId, TopicModel};
use crate::vectorizer::TextVectorizer;

/// Number of topics each post is filed under.
pub const TOPICS_PER_POST: usize = 3;

/// Topic -> member posts, in corpus order. Serializable so the indexer can prebuild it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicTable {
    pub num_topics: usize,
    pub members: BTreeMap<TopicId, Vec<PostId>>,
    pub post_topics: HashMap<PostId, Vec<TopicId>>,
}

impl TopicTable {
    fn file(&mut self, post: PostId, topics: Vec<TopicId>) {
        for &topic in &topics {
            self.members.entry(topic).or_default().push(post);
        }
        self.post_topics.insert(post, topics);
    }
}

/// Top `TOPICS_PER_POST` topics by probability; equal probabilities keep ascending topic order.
pub fn top_topics(probabilities: &[f64]) -> Vec<TopicId> {
    let mut ranked: Vec<usize> = (0..probabilities.len()).collect();
    ranked.sort_by(|&a, &b| probabilities[b].total_cmp(&probabilities[a]));
    ranked.truncate(TOPICS_PER_POST);
    ranked.into_iter().map(|t| t as TopicId).collect()
}

pub struct TopicIndex {
    model: Box<dyn TopicModel>,
    vectorizer: Box<dyn TextVectorizer>,
    table: TopicTable,
}

impl TopicIndex {
    /// Runs the topic model over every post's cleaned body.
    pub fn build(
        model: Box<dyn TopicModel>,
        vectorizer: Box<dyn TextVectorizer>,
        corpus: &Corpus,
    ) -> Self {
        let mut table = TopicTable { num_topics: model.num_topics(), ..TopicTable::default() };
        for post in corpus.posts() {
            let probabilities = model.transform(&vectorizer.transform(&post.cleaned_body));
            table.file(post.id, top_topics(&probabilities));
        }
        tracing::info!(
            posts = corpus.len(),
            topics = table.num_topics,
            populated = table.members.len(),
            "built topic index"
        );
        Self { model, vectorizer, table }
    }

    /// Reattaches a prebuilt table, checking it against the model and corpus.
    pub fn from_parts(
        model: Box<dyn TopicModel>,
        vectorizer: Box<dyn TextVectorizer>,
        table: TopicTable,
        corpus: &Corpus,
        origin: &Path,
    ) -> SearchResult<Self> {
        if table.num_topics != model.num_topics() {
            return Err(SearchError::corrupt(
                origin,
                format!("table has {} topics, model has {}", table.num_topics, model.num_topics()),
            ));
        }
        for (&topic, members) in &table.members {
            if topic as usize >= table.num_topics {
                return Err(SearchError::corrupt(origin, format!("topic id {topic} out of range")));
            }
            if let Some(unknown) = members.iter().find(|id| !corpus.contains(**id)) {
                return Err(SearchError::corrupt(origin, format!("topic {topic} lists unknown post {unknown}")));
            }
            let mut seen = HashSet::with_capacity(members.len());
            if let Some(twice) = members.iter().find(|&&id| !seen.insert(id)) {
                return Err(SearchError::corrupt(origin, format!("topic {topic} lists post {twice} twice")));
            }
            let filed = |id: &PostId| table.post_topics.get(id).is_some_and(|t| t.contains(&topic));
            if let Some(stray) = members.iter().find(|&id| !filed(id)) {
                return Err(SearchError::corrupt(
                    origin,
                    format!("topic {topic} lists post {stray}, which is not filed under it"),
                ));
            }
        }
        for (&post, topics) in &table.post_topics {
            let listed = |t: &TopicId| table.members.get(t).is_some_and(|m| m.contains(&post));
            if let Some(&topic) = topics.iter().find(|&t| !listed(t)) {
                return Err(SearchError::corrupt(
                    origin,
                    format!("post {post} is filed under topic {topic}, which does not list it"),
                ));
            }
        }
        Ok(Self { model, vectorizer, table })
    }

    /// Most probable topic for free text.
    pub fn topic_for_query(&self, text: &str) -> TopicId {
        let probabilities = self.model.transform(&self.vectorizer.transform(text));
        first_argmax(&probabilities).unwrap_or(0) as TopicId
    }

    /// Members of `topic` in corpus order; empty when the topic has none.
    pub fn candidates_for_topic(&self, topic: TopicId) -> &[PostId] {
        self.table.members.get(&topic).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Topics a stored post was filed under; empty for unknown posts.
    pub fn topics_for_post(&self, post: PostId) -> Vec<TopicId> {
        self.table.post_topics.get(&post).cloned().unwrap_or_default()
    }

    pub fn num_topics(&self) -> usize {
        self.table.num_topics
    }

    pub fn topic_sizes(&self) -> BTreeMap<TopicId, usize> {
        self.table.members.iter().map(|(&t, m)| (t, m.len())).collect()
    }

    pub fn table(&self) -> &TopicTable {
        &self.table
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vectorizer.vocabulary_size()
    }
}
