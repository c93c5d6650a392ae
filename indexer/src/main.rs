use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use qasearch_core::embedding::{normalize, EmbeddingTable};
use qasearch_core::encoder::build_encoder;
use qasearch_core::persist::{
    save_embeddings, save_meta, save_posts, save_topic_model, save_topic_table, ArtifactPaths, MetaFile,
    ARTIFACT_VERSION,
};
use qasearch_core::tokenizer::clean_body;
use qasearch_core::topic_index::TopicIndex;
use qasearch_core::topic_model::TopicModelArtifact;
use qasearch_core::{Corpus, Post, PostId, SearchConfig, Space};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One line of an embeddings export.
#[derive(Debug, Deserialize)]
struct EmbeddingRecord {
    id: PostId,
    vector: Vec<f32>,
}

#[derive(Parser)]
#[command(name = "qasearch-indexer")]
#[command(about = "Build the artifact directory the search server loads", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build artifacts from a post corpus, a fitted topic model and embeddings
    Build {
        /// Posts as JSON, JSONL, or a directory of those
        #[arg(long)]
        corpus: PathBuf,
        /// Topic model and vectorizer exported as JSON
        #[arg(long)]
        topic_model: PathBuf,
        /// Question title embeddings as JSONL `{"id", "vector"}`; encoded with the default title encoder when absent
        #[arg(long)]
        title_embeddings: Option<PathBuf>,
        /// Post body embeddings as JSONL `{"id", "vector"}`; encoded with the default answer encoder when absent
        #[arg(long)]
        answer_embeddings: Option<PathBuf>,
        /// Output artifact directory
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { corpus, topic_model, title_embeddings, answer_embeddings, output } => build(
            &corpus,
            &topic_model,
            title_embeddings.as_deref(),
            answer_embeddings.as_deref(),
            &output,
        ),
    }
}

fn build(
    corpus_path: &Path,
    topic_model_path: &Path,
    title_embeddings: Option<&Path>,
    answer_embeddings: Option<&Path>,
    output: &Path,
) -> Result<()> {
    let posts = read_posts(corpus_path)?;
    let corpus = Corpus::new(posts).context("corpus failed validation")?;
    let questions = corpus.questions().count();
    tracing::info!(posts = corpus.len(), questions, "ingested posts");

    let artifact: TopicModelArtifact = serde_json::from_reader(BufReader::new(
        File::open(topic_model_path).with_context(|| format!("opening {}", topic_model_path.display()))?,
    ))
    .with_context(|| format!("parsing {}", topic_model_path.display()))?;
    let (vectorizer, model) = artifact.clone().into_parts()?;
    let index = TopicIndex::build(Box::new(model), Box::new(vectorizer), &corpus);

    let defaults = SearchConfig::default();
    let title = match title_embeddings {
        Some(path) => read_embeddings(path, &corpus, Space::Title)?,
        None => encode_space(&corpus, Space::Title, &defaults)?,
    };
    let answer = match answer_embeddings {
        Some(path) => read_embeddings(path, &corpus, Space::Answer)?,
        None => encode_space(&corpus, Space::Answer, &defaults)?,
    };
    report_missing(&corpus, &title, Space::Title);
    report_missing(&corpus, &answer, Space::Answer);

    let paths = ArtifactPaths::new(output);
    let meta = MetaFile {
        num_posts: corpus.len(),
        num_topics: index.num_topics(),
        title_dimension: title.dimension,
        answer_dimension: answer.dimension,
        created_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "".into()),
        version: ARTIFACT_VERSION,
    };
    save_embeddings(&paths, Space::Title, &title)?;
    save_embeddings(&paths, Space::Answer, &answer)?;
    save_topic_model(&paths, &artifact)?;
    save_topic_table(&paths, index.table())?;
    save_posts(&paths, corpus.posts())?;
    save_meta(&paths, &meta)?;

    tracing::info!(output = %output.display(), topics = meta.num_topics, "artifact build complete");
    Ok(())
}

fn corpus_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        bail!("corpus path {} does not exist", path.display());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
        let p = entry.path();
        if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
            files.push(p.to_path_buf());
        }
    }
    Ok(files)
}

/// Posts in file order, then record order within each file.
fn read_posts(path: &Path) -> Result<Vec<Post>> {
    let mut posts = Vec::new();
    for file in corpus_files(path)? {
        let before = posts.len();
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            for (n, line) in BufReader::new(File::open(&file)?).lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let post: Post = serde_json::from_str(&line)
                    .with_context(|| format!("{}:{}", file.display(), n + 1))?;
                posts.push(post);
            }
        } else {
            let json: serde_json::Value = serde_json::from_reader(BufReader::new(File::open(&file)?))
                .with_context(|| format!("parsing {}", file.display()))?;
            match json {
                serde_json::Value::Array(arr) => {
                    for v in arr {
                        posts.push(serde_json::from_value(v)?);
                    }
                }
                serde_json::Value::Object(_) => posts.push(serde_json::from_value(json)?),
                _ => tracing::warn!(file = %file.display(), "skipping file without post records"),
            }
        }
        tracing::debug!(file = %file.display(), posts = posts.len() - before, "read corpus file");
    }
    for post in &mut posts {
        if post.cleaned_body.is_empty() {
            post.cleaned_body = clean_body(&post.body);
        }
    }
    Ok(posts)
}

/// Which posts a space holds vectors for: questions only for titles, every post for answers.
fn belongs(post: &Post, space: Space) -> bool {
    match space {
        Space::Title => post.is_question(),
        Space::Answer => true,
    }
}

fn read_embeddings(path: &Path, corpus: &Corpus, space: Space) -> Result<EmbeddingTable> {
    let reader = BufReader::new(File::open(path).with_context(|| format!("opening {}", path.display()))?);
    let mut table: Option<EmbeddingTable> = None;
    let mut skipped = 0usize;
    let mut degenerate = 0usize;
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut record: EmbeddingRecord =
            serde_json::from_str(&line).with_context(|| format!("{}:{}", path.display(), n + 1))?;
        if !corpus.get(record.id).is_some_and(|p| belongs(p, space)) {
            skipped += 1;
            continue;
        }
        if !normalize(&mut record.vector) {
            degenerate += 1;
        }
        table
            .get_or_insert_with(|| EmbeddingTable::new(record.vector.len()))
            .push(record.id, &record.vector)
            .with_context(|| format!("{}:{}", path.display(), n + 1))?;
    }
    let Some(table) = table else {
        bail!("{} holds no {space} embeddings for corpus posts", path.display());
    };
    if skipped > 0 {
        tracing::warn!(%space, skipped, "ignored embeddings for posts outside this space");
    }
    if degenerate > 0 {
        tracing::warn!(%space, degenerate, "zero-norm embeddings stored unnormalized");
    }
    tracing::info!(%space, vectors = table.len(), dimension = table.dimension, "loaded embeddings");
    Ok(table)
}

/// Encodes titles (questions) or cleaned bodies (all posts) with the configured encoder.
fn encode_space(corpus: &Corpus, space: Space, config: &SearchConfig) -> Result<EmbeddingTable> {
    let encoder_config = match space {
        Space::Title => &config.title_encoder,
        Space::Answer => &config.answer_encoder,
    };
    let encoder = build_encoder(encoder_config, space)?;
    let mut table = EmbeddingTable::new(encoder.dimension());
    for post in corpus.posts().iter().filter(|p| belongs(p, space)) {
        let text = match space {
            Space::Title => &post.title,
            Space::Answer => &post.cleaned_body,
        };
        let mut vector = encoder.encode(text)?;
        normalize(&mut vector);
        table.push(post.id, &vector)?;
    }
    tracing::info!(%space, encoder = encoder.name(), vectors = table.len(), "encoded embeddings");
    Ok(table)
}

fn report_missing(corpus: &Corpus, table: &EmbeddingTable, space: Space) {
    let have: HashSet<PostId> = table.ids.iter().copied().collect();
    let missing = corpus.posts().iter().filter(|p| belongs(p, space) && !have.contains(&p.id)).count();
    if missing > 0 {
        tracing::warn!(%space, missing, "posts without embeddings; queries reaching them will fail");
    }
}
