//! Chunk corpus store: JSONL loading, lexical index, id→text map.
//!
//! The tantivy index and the chunk map are rebuilt together from the
//! corpus file and published as one immutable snapshot behind an
//! `RwLock<Arc<_>>`. Reload builds the replacement off-lock and swaps the
//! pointer, so in-flight queries keep whichever snapshot they already
//! cloned; readers never observe a partially-built index.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Schema, Value as SchemaValue, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, TantivyDocument};
use tracing::{debug, info, warn};

use docqa_core::traits::KeywordSearch;
use docqa_core::types::{Chunk, ChunkId, ScoreKind, SourceTag};

/// Status report for the loaded corpus.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexStatus {
    pub exists: bool,
    pub chunks: usize,
    pub documents: usize,
    pub path: String,
}

struct Snapshot {
    index: Index,
    reader: IndexReader,
    id_field: tantivy::schema::Field,
    text_field: tantivy::schema::Field,
    text_by_id: HashMap<ChunkId, String>,
    documents: usize,
    path: PathBuf,
}

impl Snapshot {
    fn empty(path: PathBuf) -> Result<Self> {
        Self::from_records(Vec::new(), path)
    }

    fn from_records(records: Vec<(ChunkId, String, String)>, path: PathBuf) -> Result<Self> {
        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let text_field = schema_builder.add_text_field("text", TEXT);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);
        let mut writer = index.writer(50_000_000).context("create index writer")?;

        let mut text_by_id = HashMap::with_capacity(records.len());
        let mut filenames: HashSet<String> = HashSet::new();
        for (id, text, filename) in records {
            writer.add_document(doc!(
                id_field => id.clone(),
                text_field => text.clone(),
            ))?;
            filenames.insert(filename);
            text_by_id.insert(id, text);
        }
        writer.commit()?;
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            id_field,
            text_field,
            documents: filenames.len(),
            text_by_id,
            path,
        })
    }
}

/// Parse one JSONL line into `(id, text, filename)`.
///
/// Id falls back from `id` to `chunk_id` to `filename::chunk_id`; text
/// falls back across `text`, `chunk`, `content`. Malformed lines are
/// skipped by the caller.
fn parse_record(line: &str) -> Option<(ChunkId, String, String)> {
    let obj: Value = serde_json::from_str(line).ok()?;

    let filename = obj
        .get("filename")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let id = match (obj.get("id"), obj.get("chunk_id")) {
        (Some(Value::String(s)), _) if !s.is_empty() => s.clone(),
        (_, Some(v)) if !filename.is_empty() => format!("{filename}::{}", json_scalar(v)),
        (_, Some(v)) => json_scalar(v),
        _ => return None,
    };

    let text = ["text", "chunk", "content"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();

    Some((id, text, filename))
}

fn json_scalar(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn load_records(path: &Path) -> Result<Vec<(ChunkId, String, String)>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read corpus {}", path.display()))?;

    let mut records = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_record(line) {
            Some(record) => records.push(record),
            None => debug!("skipping malformed corpus line"),
        }
    }
    Ok(records)
}

/// Process-wide chunk corpus cache: lexical index plus id→text map.
///
/// Built lazily on first use, explicitly rebuildable via [`reload`].
///
/// [`reload`]: ChunkStore::reload
pub struct ChunkStore {
    current: RwLock<Option<Arc<Snapshot>>>,
    default_path: PathBuf,
}

impl ChunkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            current: RwLock::new(None),
            default_path: path.into(),
        }
    }

    /// Current snapshot, building from the default path on first use.
    /// A missing or unreadable corpus yields an empty snapshot.
    fn snapshot(&self) -> Result<Arc<Snapshot>> {
        if let Some(snap) = self.read_current() {
            return Ok(snap);
        }

        let path = self.default_path.clone();
        let snap = match load_records(&path) {
            Ok(records) => Arc::new(Snapshot::from_records(records, path)?),
            Err(e) => {
                warn!(error = %e, "corpus not loadable, starting empty");
                Arc::new(Snapshot::empty(path)?)
            }
        };
        self.install(Arc::clone(&snap));
        Ok(snap)
    }

    fn read_current(&self) -> Option<Arc<Snapshot>> {
        match self.current.read() {
            Ok(guard) => guard.as_ref().map(Arc::clone),
            Err(poisoned) => poisoned.into_inner().as_ref().map(Arc::clone),
        }
    }

    fn install(&self, snap: Arc<Snapshot>) {
        match self.current.write() {
            Ok(mut guard) => *guard = Some(snap),
            Err(poisoned) => *poisoned.into_inner() = Some(snap),
        }
    }

    /// Rebuild the snapshot from `path` and swap it in atomically.
    /// Returns the number of chunks indexed.
    pub fn reload(&self, path: impl Into<PathBuf>) -> Result<usize> {
        let path = path.into();
        let records = load_records(&path).unwrap_or_default();
        let count = records.len();
        let snap = Arc::new(Snapshot::from_records(records, path.clone())?);
        self.install(snap);
        info!(chunks = count, path = %path.display(), "corpus reloaded");
        Ok(count)
    }

    pub fn status(&self) -> IndexStatus {
        match self.snapshot() {
            Ok(snap) => IndexStatus {
                exists: !snap.text_by_id.is_empty(),
                chunks: snap.text_by_id.len(),
                documents: snap.documents,
                path: snap.path.display().to_string(),
            },
            Err(_) => IndexStatus {
                exists: false,
                chunks: 0,
                documents: 0,
                path: self.default_path.display().to_string(),
            },
        }
    }

    /// Text for a chunk id, for snippet enrichment.
    pub fn text_for(&self, id: &str) -> Option<String> {
        self.snapshot().ok()?.text_by_id.get(id).cloned()
    }

    /// All `(id, text)` pairs in the current snapshot.
    pub fn entries(&self) -> Vec<(ChunkId, String)> {
        match self.snapshot() {
            Ok(snap) => snap
                .text_by_id
                .iter()
                .map(|(id, text)| (id.clone(), text.clone()))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn search_sync(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        let snap = self.snapshot()?;
        if snap.text_by_id.is_empty() || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let parser = QueryParser::for_index(&snap.index, vec![snap.text_field]);
        let (parsed, errors) = parser.parse_query_lenient(query);
        if !errors.is_empty() {
            debug!(count = errors.len(), "lenient query parse dropped terms");
        }

        let searcher = snap.reader.searcher();
        let top_docs = searcher.search(&parsed, &TopDocs::with_limit(k))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            if score <= 0.0 {
                continue;
            }
            let doc: TantivyDocument = searcher.doc(addr)?;
            let id = doc
                .get_first(snap.id_field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let text = snap.text_by_id.get(&id).cloned().unwrap_or_default();
            let mut chunk = Chunk::new(id, text, score, ScoreKind::Bm25);
            chunk.tag_source(SourceTag::Keyword);
            hits.push(chunk);
        }
        Ok(hits)
    }
}

#[async_trait]
impl KeywordSearch for ChunkStore {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        // In-RAM index; search is CPU-bound and fast enough to run inline.
        self.search_sync(query, k)
    }
}
