//! Extraction orchestration
//!
//! One run moves through `Pending → Chunked → ModelInvoked → Validated →
//! Merged → Filtered → Verified → Done`. A cache hit jumps straight to
//! `Done`. Chunks are sent to the backend concurrently; each chunk either
//! yields validated fields or a recorded failure, except for fatal backend
//! errors, which abort the whole run.
//!
//! Cost sinks and caches may block on file locks, so their calls run on the
//! blocking pool and never hold up the runtime's timers.

use crate::chunking::Chunker;
use crate::config::ExtractorConfig;
use crate::error::ExtractorError;
use crate::merge::merge_fields;
use crate::parser::ResponseValidator;
use crate::profile::FieldProfile;
use crate::prompt::PromptBuilder;
use crate::types::{ChunkFailure, ExtractionOutcome, ExtractionRequest, ExtractionStage};
use async_trait::async_trait;
use attest_domain::{ApiCall, CacheKey, Chunk, CostSink, ExtractedField, ExtractorKind, FieldCache};
use attest_llm::{with_retry, BackendError, Generation, GenerationRequest, LlmProvider};
use attest_store::{document_fingerprint, SessionStore};
use attest_verifier::CitationVerifier;
use futures::stream::{self, StreamExt};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Something that extracts one kind of field from documents
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    /// Kind of field produced
    fn kind(&self) -> ExtractorKind;

    /// Extract fields from a document, recording every backend call in `costs`
    ///
    /// The sink is cloned into blocking tasks, so clones must share state.
    async fn extract<S>(&self, request: &ExtractionRequest, costs: &S) -> Result<ExtractionOutcome, ExtractorError>
    where
        S: CostSink + Clone + Send + Sync + 'static,
        S::Error: fmt::Display;
}

/// What a single chunk produced
enum ChunkOutput {
    Fields(Vec<ExtractedField>),
    Failed(ChunkFailure),
}

/// Verified field extractor
///
/// Generic over the backend and the extraction cache so tests can run it
/// against `MockProvider` and `MemoryCache`.
pub struct Extractor<L, K> {
    llm: L,
    cache: Arc<K>,
    profile: FieldProfile,
    chunker: Chunker,
    validator: ResponseValidator,
    verifier: CitationVerifier,
    config: ExtractorConfig,
}

impl<L, K> Extractor<L, K>
where
    L: LlmProvider,
    K: FieldCache + Send + Sync + 'static,
    K::Error: fmt::Display,
{
    /// Create an extractor for a profile
    pub fn new(llm: L, cache: K, profile: FieldProfile, config: ExtractorConfig) -> Result<Self, ExtractorError> {
        config.validate().map_err(ExtractorError::Config)?;
        let chunker = Chunker::new(config.chunk_size, config.chunk_overlap, config.max_input_chars)?;
        let verifier = CitationVerifier::new(config.verifier.clone())?;
        Ok(Self {
            llm,
            cache: Arc::new(cache),
            profile,
            chunker,
            validator: ResponseValidator::new(config.validator.clone()),
            verifier,
            config,
        })
    }

    /// Project timeline dates
    pub fn dates(llm: L, cache: K, config: ExtractorConfig) -> Result<Self, ExtractorError> {
        Self::new(llm, cache, FieldProfile::dates()?, config)
    }

    /// Land tenure facts
    pub fn land_tenure(llm: L, cache: K, config: ExtractorConfig) -> Result<Self, ExtractorError> {
        Self::new(llm, cache, FieldProfile::land_tenure()?, config)
    }

    /// Registry identifiers
    pub fn project_ids(llm: L, cache: K, config: ExtractorConfig) -> Result<Self, ExtractorError> {
        Self::new(llm, cache, FieldProfile::project_ids()?, config)
    }

    /// Get the configuration
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Get the profile
    pub fn profile(&self) -> &FieldProfile {
        &self.profile
    }

    /// Get the extraction cache
    pub fn cache(&self) -> &K {
        self.cache.as_ref()
    }

    /// Send one chunk to the backend and validate the response
    ///
    /// Returns `Err` only for failures that must abort the whole run.
    async fn process_chunk<S>(
        &self,
        index: usize,
        total: usize,
        chunk: &Chunk,
        request: &ExtractionRequest,
        costs: &S,
    ) -> Result<ChunkOutput, ExtractorError>
    where
        S: CostSink + Clone + Send + Sync + 'static,
        S::Error: fmt::Display,
    {
        let prompt = PromptBuilder::new(&self.profile, &chunk.text)
            .with_document(&request.document_name)
            .with_position(index, total)
            .with_hints(&request.hints)
            .build();
        let generation_request = GenerationRequest::new(prompt)
            .with_schema(self.profile.schema())
            .with_max_tokens(self.config.max_tokens);
        let timeout = self.config.call_timeout();

        let started = Instant::now();
        let result = with_retry(&self.config.retry, || {
            generate_with_timeout(&self.llm, &generation_request, timeout)
        })
        .await;

        let failure = |backend_kind, reason: String| ChunkFailure {
            chunk_index: index,
            start_offset: chunk.start_offset,
            end_offset: chunk.end_offset,
            backend_kind,
            reason,
        };

        let generation = match result {
            Ok(generation) => generation,
            Err(e) if e.is_fatal() => {
                warn!(chunk = index, kind = %e.kind, error = %e, "Fatal backend error, aborting extraction");
                return Err(ExtractorError::Backend(e));
            }
            Err(e) => {
                warn!(chunk = index, kind = %e.kind, error = %e, "Chunk failed");
                return Ok(ChunkOutput::Failed(failure(Some(e.kind), e.to_string())));
            }
        };

        let call = ApiCall::backend(
            &generation.model,
            self.profile.kind(),
            &request.document_name,
            generation.usage.input_tokens,
            generation.usage.output_tokens,
            started.elapsed().as_secs_f64(),
        )
        .with_cache_tokens(generation.usage.cache_write_tokens, generation.usage.cache_read_tokens);
        record_cost(costs, call).await?;

        match self.validator.validate(&generation.text, &request.document_name) {
            Ok(report) => {
                debug!(
                    chunk = index,
                    fields = report.fields.len(),
                    rejected = report.rejected.len(),
                    "Chunk validated"
                );
                Ok(ChunkOutput::Fields(report.fields))
            }
            Err(e) => {
                warn!(chunk = index, error = %e, "Chunk response rejected");
                Ok(ChunkOutput::Failed(failure(None, format!("invalid response: {}", e))))
            }
        }
    }
}

async fn generate_with_timeout<L: LlmProvider>(
    llm: &L,
    request: &GenerationRequest,
    timeout: Duration,
) -> Result<Generation, BackendError> {
    match tokio::time::timeout(timeout, llm.generate(request)).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::timeout(timeout)),
    }
}

/// Run blocking store work on the blocking pool
async fn off_runtime<T, F>(work: F) -> Result<T, ExtractorError>
where
    F: FnOnce() -> Result<T, ExtractorError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ExtractorError::Task(format!("Task join error: {}", e)))?
}

async fn record_cost<S>(costs: &S, call: ApiCall) -> Result<f64, ExtractorError>
where
    S: CostSink + Clone + Send + 'static,
    S::Error: fmt::Display,
{
    let sink = costs.clone();
    off_runtime(move || sink.record(call).map_err(|e| ExtractorError::Cost(e.to_string()))).await
}

fn advance(stage: &mut ExtractionStage, next: ExtractionStage) {
    debug!(from = %stage, to = %next, "Extraction stage");
    *stage = next;
}

#[async_trait]
impl<L, K> FieldExtractor for Extractor<L, K>
where
    L: LlmProvider,
    K: FieldCache + Send + Sync + 'static,
    K::Error: fmt::Display,
{
    fn kind(&self) -> ExtractorKind {
        self.profile.kind()
    }

    async fn extract<S>(&self, request: &ExtractionRequest, costs: &S) -> Result<ExtractionOutcome, ExtractorError>
    where
        S: CostSink + Clone + Send + Sync + 'static,
        S::Error: fmt::Display,
    {
        let started = Instant::now();
        let kind = self.profile.kind();
        let mut stage = ExtractionStage::Pending;

        let length = request.content.chars().count();
        if length > self.config.max_document_chars {
            return Err(ExtractorError::TextTooLong(length, self.config.max_document_chars));
        }

        let key = CacheKey::new(document_fingerprint(&request.content), kind);
        let cache = Arc::clone(&self.cache);
        let lookup = key.clone();
        let cached =
            off_runtime(move || cache.get(&lookup).map_err(|e| ExtractorError::Cache(e.to_string()))).await?;
        if let Some(fields) = cached {
            let call = ApiCall::cache_hit(
                self.llm.model_name(),
                kind,
                &request.document_name,
                started.elapsed().as_secs_f64(),
            );
            record_cost(costs, call).await?;
            info!(%kind, document = %request.document_name, fields = fields.len(), "Cache hit");
            advance(&mut stage, ExtractionStage::Done);
            return Ok(ExtractionOutcome {
                kind,
                document_name: request.document_name.clone(),
                fields,
                chunk_failures: Vec::new(),
                cached: true,
                stage,
                chunks_processed: 0,
                model: self.llm.model_name().to_string(),
                duration: started.elapsed(),
            });
        }

        let chunks = self.chunker.chunk(&request.content);
        let total = chunks.len();
        advance(&mut stage, ExtractionStage::Chunked);
        info!(%kind, document = %request.document_name, chunks = total, "Starting extraction");

        let pending: Vec<_> = chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| self.process_chunk(index, total, chunk, request, costs))
            .collect();
        let mut results = stream::iter(pending).buffer_unordered(self.config.max_concurrent_chunks);

        let mut per_chunk = Vec::with_capacity(total);
        let mut failures = Vec::new();
        while let Some(result) = results.next().await {
            match result? {
                ChunkOutput::Fields(fields) => per_chunk.push(fields),
                ChunkOutput::Failed(failure) => failures.push(failure),
            }
        }
        drop(results);
        advance(&mut stage, ExtractionStage::ModelInvoked);

        failures.sort_by_key(|f| f.chunk_index);
        if failures.len() == total {
            warn!(%kind, document = %request.document_name, chunks = total, "All chunks failed");
            return Err(ExtractorError::AllChunksFailed { failures });
        }
        advance(&mut stage, ExtractionStage::Validated);

        let merged = merge_fields(per_chunk);
        advance(&mut stage, ExtractionStage::Merged);

        let filtered = self.profile.filter().filter(merged);
        advance(&mut stage, ExtractionStage::Filtered);

        let fields = self.verifier.verify_all(filtered, &request.content);
        advance(&mut stage, ExtractionStage::Verified);

        if failures.is_empty() {
            let cache = Arc::clone(&self.cache);
            let stored = fields.clone();
            off_runtime(move || cache.set(&key, &stored).map_err(|e| ExtractorError::Cache(e.to_string()))).await?;
        } else {
            warn!(
                %kind,
                document = %request.document_name,
                failed = failures.len(),
                "Partial extraction, not caching"
            );
        }
        advance(&mut stage, ExtractionStage::Done);

        let outcome = ExtractionOutcome {
            kind,
            document_name: request.document_name.clone(),
            fields,
            chunk_failures: failures,
            cached: false,
            stage,
            chunks_processed: total,
            model: self.llm.model_name().to_string(),
            duration: started.elapsed(),
        };
        info!(
            %kind,
            document = %outcome.document_name,
            fields = outcome.fields.len(),
            verified = outcome.verified_count(),
            failed_chunks = outcome.chunk_failures.len(),
            duration_ms = outcome.duration.as_millis() as u64,
            "Extraction complete"
        );
        Ok(outcome)
    }
}

/// Save an outcome's fields into a session under `extractions.<kind>`
///
/// Run metadata goes under `extraction_runs.<kind>`. Returns the updated
/// session state.
pub fn persist_outcome(
    store: &SessionStore,
    session_id: &str,
    outcome: &ExtractionOutcome,
) -> Result<Value, ExtractorError> {
    let fields = serde_json::to_value(&outcome.fields).map_err(|e| ExtractorError::Store(e.to_string()))?;
    let failures =
        serde_json::to_value(&outcome.chunk_failures).map_err(|e| ExtractorError::Store(e.to_string()))?;

    let mut patch = Map::new();
    patch.insert(format!("extractions.{}", outcome.kind), fields);
    patch.insert(
        format!("extraction_runs.{}", outcome.kind),
        json!({
            "document_name": outcome.document_name,
            "cached": outcome.cached,
            "chunks_processed": outcome.chunks_processed,
            "chunk_failures": failures,
            "model": outcome.model,
            "duration_seconds": outcome.duration.as_secs_f64(),
        }),
    );

    let state = store.update(session_id, &patch)?;
    info!(session = session_id, kind = %outcome.kind, fields = outcome.fields.len(), "Persisted extraction");
    Ok(state)
}
