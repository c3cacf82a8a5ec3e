use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docrag_core::chunker::{ChunkingConfig, TokenChunker};
use docrag_core::error::{Error, Result};
use docrag_core::source::MemorySource;
use docrag_core::traits::{Embedder, IndexStore};
use docrag_core::types::{
    ChunkFailurePolicy, IndexRow, IndexedFile, IngestStatus, InsertOutcome, SkipReason, StoreUnavailablePolicy,
    StoredHit,
};
use docrag_embed::FakeEmbedder;
use docrag_pipeline::answer::{CONTEXT_UNAVAILABLE_NOTE, NO_CONTEXT_NOTE, NO_CONTEXT_REPLY};
use docrag_pipeline::{AnswerMode, Answerer, Completer, IngestOptions, IngestionPipeline, RetrievalPipeline};
use docrag_vector::MemoryIndexStore;

const DIM: usize = 384;

/// Counts calls, records batch sizes and delegates to the hashing embedder.
struct CountingEmbedder {
    inner: FakeEmbedder,
    calls: AtomicUsize,
    batches: Mutex<Vec<usize>>,
}

impl CountingEmbedder {
    fn new() -> Self {
        Self { inner: FakeEmbedder::new(DIM), calls: AtomicUsize::new(0), batches: Mutex::new(Vec::new()) }
    }
}

impl Embedder for CountingEmbedder {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
    fn dim(&self) -> usize {
        DIM
    }
    fn max_len(&self) -> usize {
        self.inner.max_len()
    }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches.lock().unwrap().push(texts.len());
        self.inner.embed_batch(texts)
    }
}

/// Returns a NaN vector for any text containing "poison".
struct PoisonEmbedder(FakeEmbedder);

impl Embedder for PoisonEmbedder {
    fn model_id(&self) -> &str {
        "poison"
    }
    fn dim(&self) -> usize {
        DIM
    }
    fn max_len(&self) -> usize {
        usize::MAX
    }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut out = self.0.embed_batch(texts)?;
        for (t, v) in texts.iter().zip(out.iter_mut()) {
            if t.contains("poison") {
                v[0] = f32::NAN;
            }
        }
        Ok(out)
    }
}

/// Memory store whose read or write paths can be switched off; counts writes.
struct FlakyStore {
    inner: MemoryIndexStore,
    reads_down: bool,
    writes_down: bool,
    search_down: bool,
    writes: AtomicUsize,
    searches: AtomicUsize,
}

impl FlakyStore {
    fn healthy() -> Self {
        Self {
            inner: MemoryIndexStore::new(DIM),
            reads_down: false,
            writes_down: false,
            search_down: false,
            writes: AtomicUsize::new(0),
            searches: AtomicUsize::new(0),
        }
    }
}

fn down() -> Error {
    Error::Store("connection refused".into())
}

#[async_trait]
impl IndexStore for FlakyStore {
    fn dim(&self) -> usize {
        DIM
    }
    async fn insert_rows(&self, rows: &[IndexRow]) -> Result<usize> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.writes_down {
            return Err(down());
        }
        self.inner.insert_rows(rows).await
    }
    async fn insert_if_absent(&self, filepath: &str, rows: &[IndexRow]) -> Result<InsertOutcome> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.writes_down {
            return Err(down());
        }
        self.inner.insert_if_absent(filepath, rows).await
    }
    async fn count_by_filepath(&self, filepath: &str) -> Result<usize> {
        if self.reads_down {
            return Err(down());
        }
        self.inner.count_by_filepath(filepath).await
    }
    async fn distinct_files(&self) -> Result<Vec<IndexedFile>> {
        if self.reads_down {
            return Err(down());
        }
        self.inner.distinct_files().await
    }
    async fn nearest_neighbors(&self, query: &[f32], k: usize) -> Result<Vec<StoredHit>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.search_down {
            return Err(down());
        }
        self.inner.nearest_neighbors(query, k).await
    }
}

/// Records prompts and replies with a canned answer.
#[derive(Default)]
struct RecordingCompleter {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl Completer for RecordingCompleter {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("canned answer".to_string())
    }
}

fn words(n: usize) -> String {
    (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
}

fn ingestion(embedder: Arc<dyn Embedder>, store: Arc<dyn IndexStore>, options: IngestOptions) -> IngestionPipeline {
    let chunker = TokenChunker::whitespace(ChunkingConfig::default()).unwrap();
    IngestionPipeline::new(embedder, store, chunker, options).unwrap()
}

#[tokio::test]
async fn ingesting_same_filepath_twice_indexes_once() {
    let store = Arc::new(MemoryIndexStore::new(DIM));
    let pipeline = ingestion(Arc::new(FakeEmbedder::new(DIM)), store.clone(), IngestOptions::default());
    let src = MemorySource::new("notes.txt", "solar panels on the barn roof");

    let first = pipeline.ingest(&src, "notes.txt", "minio://documents/notes.txt").await.unwrap();
    assert_eq!(first, IngestStatus::Processed { chunks: 1 });
    let before = store.len().await;

    let second = pipeline.ingest(&src, "notes.txt", "minio://documents/notes.txt").await.unwrap();
    assert_eq!(second, IngestStatus::Skipped(SkipReason::AlreadyProcessed));
    assert_eq!(store.len().await, before);
}

#[tokio::test]
async fn dedup_key_is_exact() {
    let store = Arc::new(MemoryIndexStore::new(DIM));
    let pipeline = ingestion(Arc::new(FakeEmbedder::new(DIM)), store.clone(), IngestOptions::default());
    let dedup = pipeline.dedup().clone();

    assert!(!dedup.exists("minio://bucket/a.pdf").await.unwrap());
    let src = MemorySource::new("a.txt", "plain body");
    pipeline.ingest(&src, "a.txt", "minio://bucket/a.pdf").await.unwrap();
    assert!(dedup.exists("minio://bucket/a.pdf").await.unwrap());
    assert!(!dedup.exists("minio://bucket/A.pdf").await.unwrap());
}

#[tokio::test]
async fn unsupported_type_skips_without_writes() {
    let store = Arc::new(FlakyStore::healthy());
    let embedder = Arc::new(CountingEmbedder::new());
    let pipeline = ingestion(embedder.clone(), store.clone(), IngestOptions::default());
    let src = MemorySource::new("image.png", vec![0x89, 0x50, 0x4e, 0x47]);

    let status = pipeline.ingest(&src, "image.png", "/data/image.png").await.unwrap();
    assert_eq!(status, IngestStatus::Skipped(SkipReason::UnsupportedFileType));
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn long_document_gets_sequential_chunk_ids() {
    let store = Arc::new(MemoryIndexStore::new(DIM));
    let pipeline = ingestion(Arc::new(FakeEmbedder::new(DIM)), store.clone(), IngestOptions::default());
    let src = MemorySource::new("manual.txt", words(2000));

    let status = pipeline.ingest(&src, "manual.txt", "/data/manual.txt").await.unwrap();
    assert_eq!(status, IngestStatus::Processed { chunks: 3 });

    let rows = store.rows().await;
    let ids: Vec<usize> = rows.iter().map(|r| r.metadata.chunk_id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert!(rows.iter().all(|r| r.metadata.filename == "manual.txt" && r.metadata.filepath == "/data/manual.txt"));
    let mut doc_ids: Vec<&str> = rows.iter().map(|r| r.metadata.doc_id.as_str()).collect();
    doc_ids.dedup();
    assert_eq!(doc_ids.len(), 3, "doc_id is unique per chunk");
}

#[tokio::test]
async fn embedding_runs_in_bounded_batches_with_one_write() {
    let store = Arc::new(FlakyStore::healthy());
    let embedder = Arc::new(CountingEmbedder::new());
    let options = IngestOptions { embed_batch_size: 3, ..IngestOptions::default() };
    let pipeline = ingestion(embedder.clone(), store.clone(), options);
    // 7 * (800 - 50) + 50 tokens chunk into exactly 7 pieces.
    let src = MemorySource::new("field-guide.txt", words(7 * 750 + 50));

    let status = pipeline.ingest(&src, "field-guide.txt", "/data/field-guide.txt").await.unwrap();
    assert_eq!(status, IngestStatus::Processed { chunks: 7 });
    assert_eq!(*embedder.batches.lock().unwrap(), vec![3, 3, 1]);
    assert_eq!(store.writes.load(Ordering::SeqCst), 1);

    let ids: Vec<usize> = store.inner.rows().await.iter().map(|r| r.metadata.chunk_id).collect();
    assert_eq!(ids, (0..7).collect::<Vec<_>>());
}

#[test]
fn zero_embed_batch_size_is_rejected() {
    let chunker = TokenChunker::whitespace(ChunkingConfig::default()).unwrap();
    let options = IngestOptions { embed_batch_size: 0, ..IngestOptions::default() };
    let built = IngestionPipeline::new(
        Arc::new(FakeEmbedder::new(DIM)),
        Arc::new(MemoryIndexStore::new(DIM)),
        chunker,
        options,
    );
    assert!(matches!(built, Err(Error::InvalidConfig(_))));
}

#[tokio::test]
async fn uploaded_notes_are_searchable_by_filepath() {
    let store = Arc::new(MemoryIndexStore::new(DIM));
    let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new(DIM));
    let pipeline = ingestion(embedder.clone(), store.clone(), IngestOptions::default());
    let src = MemorySource::new("notes.txt", format!("notes topic {}", words(1998)));

    let status = pipeline.ingest(&src, "notes.txt", "minio://documents/notes.txt").await.unwrap();
    assert_eq!(status, IngestStatus::Processed { chunks: 3 });
    let rows = store.rows().await;
    assert_eq!(rows.iter().map(|r| r.metadata.chunk_id).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert!(rows.iter().all(|r| r.metadata.filepath == "minio://documents/notes.txt"));

    let retrieval = RetrievalPipeline::new(embedder, store, StoreUnavailablePolicy::FailOpen).unwrap();
    let results = retrieval.search("notes topic", 3).await.unwrap();
    assert!(!results.is_empty() && results.len() <= 3);
    assert!(results.iter().all(|r| r.filepath == "minio://documents/notes.txt" && r.filename == "notes.txt"));
    assert!(results.windows(2).all(|w| w[0].similarity_score >= w[1].similarity_score));
}

#[tokio::test]
async fn empty_document_is_processed_with_zero_rows() {
    let store = Arc::new(FlakyStore::healthy());
    let pipeline = ingestion(Arc::new(FakeEmbedder::new(DIM)), store.clone(), IngestOptions::default());
    let src = MemorySource::new("blank.txt", "   \n  ");

    let status = pipeline.ingest(&src, "blank.txt", "/data/blank.txt").await.unwrap();
    assert_eq!(status, IngestStatus::Processed { chunks: 0 });
    assert!(store.inner.is_empty().await);
}

#[tokio::test]
async fn extraction_failure_is_an_error() {
    let store = Arc::new(MemoryIndexStore::new(DIM));
    let pipeline = ingestion(Arc::new(FakeEmbedder::new(DIM)), store.clone(), IngestOptions::default());
    let src = MemorySource::new("broken.pdf", b"%PDF-garbage".to_vec());

    let err = pipeline.ingest(&src, "broken.pdf", "/data/broken.pdf").await.unwrap_err();
    assert!(matches!(err, Error::Extraction(_)));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn dedup_fails_open_when_store_unreachable() {
    let store = Arc::new(FlakyStore { reads_down: true, ..FlakyStore::healthy() });
    let pipeline = ingestion(Arc::new(FakeEmbedder::new(DIM)), store.clone(), IngestOptions::default());
    assert!(!pipeline.dedup().exists("/data/a.txt").await.unwrap());

    let src = MemorySource::new("a.txt", "body text");
    let status = pipeline.ingest(&src, "a.txt", "/data/a.txt").await.unwrap();
    assert_eq!(status, IngestStatus::Processed { chunks: 1 });
}

#[tokio::test]
async fn dedup_fail_closed_propagates() {
    let store = Arc::new(FlakyStore { reads_down: true, ..FlakyStore::healthy() });
    let options =
        IngestOptions { on_store_unavailable: StoreUnavailablePolicy::FailClosed, ..IngestOptions::default() };
    let pipeline = ingestion(Arc::new(FakeEmbedder::new(DIM)), store.clone(), options);
    let src = MemorySource::new("a.txt", "body text");
    assert!(matches!(pipeline.ingest(&src, "a.txt", "/data/a.txt").await, Err(Error::Store(_))));
}

#[tokio::test]
async fn write_failure_fails_ingestion() {
    let store = Arc::new(FlakyStore { writes_down: true, ..FlakyStore::healthy() });
    let pipeline = ingestion(Arc::new(FakeEmbedder::new(DIM)), store.clone(), IngestOptions::default());
    let src = MemorySource::new("a.txt", "body text");
    assert!(matches!(pipeline.ingest(&src, "a.txt", "/data/a.txt").await, Err(Error::Store(_))));
}

#[tokio::test]
async fn chunk_failure_policy() {
    let text = format!("{} poison {}", words(790), words(790));

    let strict = Arc::new(MemoryIndexStore::new(DIM));
    let poison = Arc::new(PoisonEmbedder(FakeEmbedder::new(DIM)));
    let pipeline = ingestion(poison, strict.clone(), IngestOptions::default());
    let err = pipeline.ingest(&MemorySource::new("p.txt", text.clone()), "p.txt", "/p.txt").await.unwrap_err();
    assert!(matches!(err, Error::ChunkConstruction { .. }));
    assert!(strict.is_empty().await, "nothing written under fail_document");

    let lenient = Arc::new(MemoryIndexStore::new(DIM));
    let options = IngestOptions { on_chunk_failure: ChunkFailurePolicy::SkipChunk, ..IngestOptions::default() };
    let pipeline = ingestion(Arc::new(PoisonEmbedder(FakeEmbedder::new(DIM))), lenient.clone(), options);
    let status = pipeline.ingest(&MemorySource::new("p.txt", text), "p.txt", "/p.txt").await.unwrap();
    let IngestStatus::Processed { chunks } = status else { panic!("expected processed, got {status:?}") };
    let rows = lenient.rows().await;
    assert_eq!(rows.len(), chunks);
    assert!(rows.iter().all(|r| !r.text.contains("poison")));
}

#[tokio::test]
async fn concurrent_ingestion_writes_one_set() {
    let store = Arc::new(MemoryIndexStore::new(DIM));
    let pipeline = Arc::new(ingestion(Arc::new(FakeEmbedder::new(DIM)), store.clone(), IngestOptions::default()));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let p = pipeline.clone();
        handles.push(tokio::spawn(async move {
            let src = MemorySource::new("race.txt", words(1000));
            p.ingest(&src, "race.txt", "/data/race.txt").await.unwrap()
        }));
    }
    let mut processed = 0;
    for h in handles {
        if matches!(h.await.unwrap(), IngestStatus::Processed { .. }) {
            processed += 1;
        }
    }
    assert_eq!(processed, 1);
    assert_eq!(store.count_by_filepath("/data/race.txt").await.unwrap(), 2);
}

#[test]
fn width_mismatch_is_rejected_at_construction() {
    let chunker = TokenChunker::whitespace(ChunkingConfig::default()).unwrap();
    let narrow = Arc::new(FakeEmbedder::new(8));
    let store = Arc::new(MemoryIndexStore::new(DIM));
    let err = IngestionPipeline::new(narrow.clone(), store.clone(), chunker, IngestOptions::default())
        .err()
        .expect("mismatch");
    assert!(matches!(err, Error::DimensionMismatch { expected: 384, got: 8 }));
    let retrieval = RetrievalPipeline::new(narrow, store, StoreUnavailablePolicy::FailOpen);
    assert!(retrieval.is_err());
}

#[tokio::test]
async fn missing_query_rejected_before_embedding_or_store() {
    let store = Arc::new(FlakyStore::healthy());
    let embedder = Arc::new(CountingEmbedder::new());
    let retrieval = RetrievalPipeline::new(embedder.clone(), store.clone(), StoreUnavailablePolicy::FailOpen).unwrap();

    assert!(matches!(retrieval.search("", 5).await, Err(Error::MissingQuery)));
    assert!(matches!(retrieval.search("   ", 5).await, Err(Error::MissingQuery)));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn search_ranks_and_limits() {
    let store = Arc::new(MemoryIndexStore::new(DIM));
    let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new(DIM));
    let ingest = ingestion(embedder.clone(), store.clone(), IngestOptions::default());
    let docs = [
        ("water.txt", "rain water collection barrel"),
        ("bike.txt", "bicycle gear ratio chain"),
        ("soil.txt", "compost soil garden beds"),
    ];
    for (name, body) in docs {
        ingest.ingest(&MemorySource::new(name, body), name, &format!("/data/{name}")).await.unwrap();
    }
    let retrieval = RetrievalPipeline::new(embedder, store, StoreUnavailablePolicy::FailOpen).unwrap();

    let results = retrieval.search("water barrel", 2).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].filename, "water.txt");
    assert!(results[0].similarity_score >= results[1].similarity_score);
    assert!(retrieval.search("water", 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn listing_is_sorted_and_fails_open() {
    let store = Arc::new(MemoryIndexStore::new(DIM));
    let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new(DIM));
    let ingest = ingestion(embedder.clone(), store.clone(), IngestOptions::default());
    for name in ["b.txt", "a.txt"] {
        ingest.ingest(&MemorySource::new(name, "some body"), name, &format!("/data/{name}")).await.unwrap();
    }
    let retrieval = RetrievalPipeline::new(embedder.clone(), store, StoreUnavailablePolicy::FailOpen).unwrap();
    let names: Vec<String> = retrieval.list_indexed_files().await.unwrap().into_iter().map(|f| f.filename).collect();
    assert_eq!(names, vec!["a.txt", "b.txt"]);

    let broken = Arc::new(FlakyStore { reads_down: true, ..FlakyStore::healthy() });
    let retrieval = RetrievalPipeline::new(embedder.clone(), broken.clone(), StoreUnavailablePolicy::FailOpen).unwrap();
    assert!(retrieval.list_indexed_files().await.unwrap().is_empty());
    let retrieval = RetrievalPipeline::new(embedder, broken, StoreUnavailablePolicy::FailClosed).unwrap();
    assert!(retrieval.list_indexed_files().await.is_err());
}

async fn answerer_over(store: Arc<dyn IndexStore>, threshold: f32) -> (Answerer, Arc<RecordingCompleter>) {
    let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new(DIM));
    let retrieval = Arc::new(RetrievalPipeline::new(embedder, store, StoreUnavailablePolicy::FailOpen).unwrap());
    let completer = Arc::new(RecordingCompleter::default());
    (Answerer::new(retrieval, completer.clone(), 5, threshold), completer)
}

#[tokio::test]
async fn grounded_answer_cites_sources() {
    let store = Arc::new(MemoryIndexStore::new(DIM));
    let ingest = ingestion(Arc::new(FakeEmbedder::new(DIM)), store.clone(), IngestOptions::default());
    let water = MemorySource::new("water.txt", "rain water collection barrel");
    ingest.ingest(&water, "water.txt", "/data/water.txt").await.unwrap();

    let (answerer, completer) = answerer_over(store, 0.25).await;
    let answer = answerer.answer("rain water collection barrel").await.unwrap();
    assert_eq!(answer.mode, AnswerMode::Grounded);
    assert_eq!(answer.sources, vec!["water.txt".to_string()]);
    assert_eq!(answer.answer, "canned answer\n\nSources:\n- water.txt");
    let prompts = completer.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Context: rain water collection barrel"));
    assert!(prompts[0].contains("Question: rain water collection barrel"));
}

#[tokio::test]
async fn no_relevant_context_skips_the_model() {
    let store = Arc::new(MemoryIndexStore::new(DIM));
    let ingest = ingestion(Arc::new(FakeEmbedder::new(DIM)), store.clone(), IngestOptions::default());
    let bike = MemorySource::new("bike.txt", "bicycle gear ratio chain");
    ingest.ingest(&bike, "bike.txt", "/data/bike.txt").await.unwrap();

    let (answerer, completer) = answerer_over(store, 0.99).await;
    let answer = answerer.answer("compost").await.unwrap();
    assert_eq!(answer.mode, AnswerMode::NoRelevantContext);
    assert_eq!(answer.answer, format!("{NO_CONTEXT_REPLY}\n\n{NO_CONTEXT_NOTE}"));
    assert!(completer.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn retrieval_outage_answers_without_context() {
    let store = Arc::new(FlakyStore { search_down: true, ..FlakyStore::healthy() });
    let (answerer, completer) = answerer_over(store, 0.25).await;
    let answer = answerer.answer("how deep is the well?").await.unwrap();
    assert_eq!(answer.mode, AnswerMode::ContextUnavailable);
    assert!(answer.answer.ends_with(CONTEXT_UNAVAILABLE_NOTE));
    assert_eq!(completer.prompts.lock().unwrap()[0], "Question: how deep is the well?\n\nAnswer:");
}

#[tokio::test]
async fn answer_rejects_missing_question() {
    let (answerer, completer) = answerer_over(Arc::new(MemoryIndexStore::new(DIM)), 0.25).await;
    assert!(matches!(answerer.answer("  ").await, Err(Error::MissingQuery)));
    assert!(completer.prompts.lock().unwrap().is_empty());
}
