use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::embedding::{EmbeddingTable, Space};
use crate::error::{SearchError, SearchResult};
use crate::post::Post;
use crate::topic_index::TopicTable;
use crate::topic_model::TopicModelArtifact;

pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_posts: usize,
    pub num_topics: usize,
    pub title_dimension: usize,
    pub answer_dimension: usize,
    pub created_at: String,
    pub version: u32,
}

/// Layout of an engine artifact directory.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub root: PathBuf,
}

impl ArtifactPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn posts(&self) -> PathBuf { self.root.join("posts.bin") }
    pub fn embeddings(&self, space: Space) -> PathBuf { self.root.join(format!("embeddings_{space}.bin")) }
    pub fn topic_model(&self) -> PathBuf { self.root.join("topic_model.bin") }
    pub fn topic_index(&self) -> PathBuf { self.root.join("topic_index.bin") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

fn read_artifact(path: &Path) -> SearchResult<Vec<u8>> {
    let mut f = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => SearchError::MissingArtifact(path.to_path_buf()),
        _ => SearchError::Io(e),
    })?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    Ok(buf)
}

fn load_bin<T: DeserializeOwned>(path: &Path) -> SearchResult<T> {
    let buf = read_artifact(path)?;
    bincode::deserialize(&buf).map_err(|e| SearchError::corrupt(path, e.to_string()))
}

fn save_bin<T: Serialize>(root: &Path, path: &Path, value: &T) -> SearchResult<()> {
    create_dir_all(root)?;
    let mut f = File::create(path)?;
    let bytes = bincode::serialize(value)?;
    f.write_all(&bytes)?;
    Ok(())
}

pub fn save_posts(paths: &ArtifactPaths, posts: &[Post]) -> SearchResult<()> {
    save_bin(&paths.root, &paths.posts(), &posts)
}

pub fn load_posts(paths: &ArtifactPaths) -> SearchResult<Vec<Post>> {
    load_bin(&paths.posts())
}

pub fn save_embeddings(paths: &ArtifactPaths, space: Space, table: &EmbeddingTable) -> SearchResult<()> {
    save_bin(&paths.root, &paths.embeddings(space), table)
}

pub fn load_embeddings(paths: &ArtifactPaths, space: Space) -> SearchResult<EmbeddingTable> {
    load_bin(&paths.embeddings(space))
}

pub fn save_topic_model(paths: &ArtifactPaths, model: &TopicModelArtifact) -> SearchResult<()> {
    save_bin(&paths.root, &paths.topic_model(), model)
}

pub fn load_topic_model(paths: &ArtifactPaths) -> SearchResult<TopicModelArtifact> {
    load_bin(&paths.topic_model())
}

pub fn save_topic_table(paths: &ArtifactPaths, table: &TopicTable) -> SearchResult<()> {
    save_bin(&paths.root, &paths.topic_index(), table)
}

pub fn load_topic_table(paths: &ArtifactPaths) -> SearchResult<TopicTable> {
    load_bin(&paths.topic_index())
}

pub fn save_meta(paths: &ArtifactPaths, meta: &MetaFile) -> SearchResult<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &ArtifactPaths) -> SearchResult<MetaFile> {
    let path = paths.meta();
    let buf = read_artifact(&path)?;
    let meta: MetaFile = serde_json::from_slice(&buf).map_err(|e| SearchError::corrupt(&path, e.to_string()))?;
    if meta.version != ARTIFACT_VERSION {
        return Err(SearchError::corrupt(
            &path,
            format!("artifact version {} is not supported (expected {ARTIFACT_VERSION})", meta.version),
        ));
    }
    Ok(meta)
}
