//! Integration tests for the Extractor

#[cfg(test)]
mod tests {
    use crate::{
        persist_outcome, ExtractionHints, ExtractionRequest, ExtractionStage, Extractor, ExtractorConfig,
        ExtractorError, FieldExtractor,
    };
    use attest_domain::{CostSink, FieldValue, VerificationStatus};
    use attest_llm::{BackendError, BackendErrorKind, MockProvider, RetryPolicy};
    use attest_store::{CostLedger, MemoryCache, SessionStore};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Splits into exactly two chunks under `two_chunk_config`, one marker each
    const DOC: &str = "ALPHA: Project Start Date: 01/01/2022.\n\nBRAVO: Crediting period end: 31/12/2031.\n\n";

    const ALPHA_RESPONSE: &str = r#"[{
        "value": "01/01/2022",
        "field_type": "project_start_date",
        "confidence": 0.9,
        "source": "overview",
        "raw_text": "Project Start Date: 01/01/2022",
        "reasoning": "Stated explicitly"
    }]"#;

    const BRAVO_RESPONSE: &str = r#"```json
    [{
        "value": "31/12/2031",
        "field_type": "crediting_period_end",
        "confidence": 0.85,
        "source": "crediting period",
        "raw_text": "Crediting period end: 31/12/2031"
    }]
    ```"#;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            backoff_multiplier: 2.0,
            max_backoff_ms: 5,
            ..RetryPolicy::default()
        }
    }

    fn two_chunk_config() -> ExtractorConfig {
        ExtractorConfig {
            chunk_size: 50,
            chunk_overlap: 5,
            max_input_chars: 50,
            retry: fast_retry(),
            ..ExtractorConfig::default()
        }
    }

    fn scripted_provider() -> MockProvider {
        let llm = MockProvider::new("[]");
        llm.add_response("ALPHA", ALPHA_RESPONSE);
        llm.add_response("BRAVO", BRAVO_RESPONSE);
        llm
    }

    fn prompts_containing(llm: &MockProvider, marker: &str) -> usize {
        llm.prompts().iter().filter(|p| p.contains(marker)).count()
    }

    fn request() -> ExtractionRequest {
        ExtractionRequest::new(DOC, "plan.pdf")
    }

    #[tokio::test]
    async fn test_full_extraction_flow() {
        let llm = scripted_provider();
        let extractor = Extractor::dates(llm.clone(), MemoryCache::new(), two_chunk_config()).unwrap();
        let costs = CostLedger::in_memory("session-1");

        let outcome = extractor.extract(&request(), &costs).await.unwrap();

        assert_eq!(outcome.stage, ExtractionStage::Done);
        assert_eq!(outcome.chunks_processed, 2);
        assert!(!outcome.cached);
        assert!(outcome.is_complete());
        assert_eq!(outcome.fields.len(), 2);
        assert_eq!(outcome.verified_count(), 2);

        // Sorted by (field_type, value)
        assert_eq!(outcome.fields[0].field_type, "crediting_period_end");
        assert_eq!(outcome.fields[1].value, FieldValue::Text("01/01/2022".to_string()));
        assert_eq!(outcome.fields[1].source.document, "plan.pdf");

        assert_eq!(llm.call_count(), 2);
        assert_eq!(costs.summary().unwrap().total_api_calls, 2);
        assert_eq!(extractor.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_backend() {
        let llm = scripted_provider().with_model("claude-sonnet-4");
        let extractor = Extractor::dates(llm.clone(), MemoryCache::new(), two_chunk_config()).unwrap();
        let costs = CostLedger::in_memory("session-1");

        let first = extractor.extract(&request(), &costs).await.unwrap();
        let spent = costs.summary().unwrap().total_cost_usd;
        assert!(spent > 0.0);

        let second = extractor.extract(&request(), &costs).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.chunks_processed, 0);
        assert_eq!(second.fields, first.fields);
        assert_eq!(llm.call_count(), 2);

        let summary = costs.summary().unwrap();
        assert_eq!(summary.total_api_calls, 3);
        assert_eq!(summary.cached_calls(), 1);
        assert_eq!(summary.total_cost_usd, spent);
        assert!((summary.cache_hit_rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_without_retry() {
        let llm = scripted_provider();
        llm.add_error("BRAVO", BackendError::auth("invalid api key"));
        let extractor = Extractor::dates(llm.clone(), MemoryCache::new(), two_chunk_config()).unwrap();
        let costs = CostLedger::in_memory("session-1");

        let err = extractor.extract(&request(), &costs).await.unwrap_err();
        match &err {
            ExtractorError::Backend(e) => assert_eq!(e.kind, BackendErrorKind::Auth),
            other => panic!("expected backend error, got {:?}", other),
        }
        assert!(err.is_fatal_backend());
        assert_eq!(prompts_containing(&llm, "BRAVO"), 1);
        assert!(extractor.cache().is_empty());
    }

    #[tokio::test]
    async fn test_transient_error_retried_then_succeeds() {
        let llm = MockProvider::new(ALPHA_RESPONSE);
        llm.fail_next(BackendError::rate_limit("slow down", None));
        let config = ExtractorConfig {
            retry: fast_retry(),
            ..ExtractorConfig::default()
        };
        let extractor = Extractor::dates(llm.clone(), MemoryCache::new(), config).unwrap();
        let costs = CostLedger::in_memory("session-1");

        let outcome = extractor
            .extract(&ExtractionRequest::new("Project Start Date: 01/01/2022", "plan.pdf"), &costs)
            .await
            .unwrap();

        assert_eq!(llm.call_count(), 2);
        assert_eq!(outcome.fields.len(), 1);
        assert!(outcome.is_complete());
        // Only the successful call carries usage
        assert_eq!(costs.summary().unwrap().total_api_calls, 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_chunk_failure() {
        let llm = scripted_provider();
        llm.add_error("BRAVO", BackendError::network("connection reset"));
        let extractor = Extractor::dates(llm.clone(), MemoryCache::new(), two_chunk_config()).unwrap();
        let costs = CostLedger::in_memory("session-1");

        let outcome = extractor.extract(&request(), &costs).await.unwrap();

        assert_eq!(prompts_containing(&llm, "BRAVO"), 3);
        assert_eq!(outcome.chunk_failures.len(), 1);
        assert_eq!(outcome.chunk_failures[0].chunk_index, 1);
        assert_eq!(outcome.chunk_failures[0].backend_kind, Some(BackendErrorKind::Network));
        assert_eq!(outcome.fields.len(), 1);
        assert_eq!(outcome.fields[0].field_type, "project_start_date");
        // Partial results are never cached
        assert!(extractor.cache().is_empty());
    }

    #[tokio::test]
    async fn test_all_chunks_failed() {
        let llm = MockProvider::new("I'm sorry, I can't help with that.");
        let extractor = Extractor::dates(llm, MemoryCache::new(), two_chunk_config()).unwrap();
        let costs = CostLedger::in_memory("session-1");

        match extractor.extract(&request(), &costs).await {
            Err(ExtractorError::AllChunksFailed { failures }) => {
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].chunk_index, 0);
                assert!(failures.iter().all(|f| f.backend_kind.is_none()));
                assert!(failures[0].reason.starts_with("invalid response"));
            }
            other => panic!("expected AllChunksFailed, got {:?}", other),
        }
        // Tokens were still spent on both calls
        assert_eq!(costs.summary().unwrap().total_api_calls, 2);
    }

    #[tokio::test]
    async fn test_call_timeout_is_network_failure() {
        let llm = scripted_provider();
        llm.add_delay("ALPHA", Duration::from_millis(500));
        let config = ExtractorConfig {
            call_timeout_ms: 20,
            retry: RetryPolicy::none(),
            ..two_chunk_config()
        };
        let extractor = Extractor::dates(llm, MemoryCache::new(), config).unwrap();
        let costs = CostLedger::in_memory("session-1");

        let outcome = extractor.extract(&request(), &costs).await.unwrap();
        assert_eq!(outcome.chunk_failures.len(), 1);
        assert_eq!(outcome.chunk_failures[0].chunk_index, 0);
        assert_eq!(outcome.chunk_failures[0].backend_kind, Some(BackendErrorKind::Network));
        assert_eq!(outcome.fields.len(), 1);
    }

    #[tokio::test]
    async fn test_completion_order_does_not_change_output() {
        let mut runs = Vec::new();
        for slow in ["ALPHA", "BRAVO"] {
            // Both chunks report the start date at equal confidence
            let llm = MockProvider::new("[]");
            llm.add_response("ALPHA", ALPHA_RESPONSE);
            llm.add_response(
                "BRAVO",
                r#"[{"value": "01/01/2022", "field_type": "project_start_date", "confidence": 0.9,
                     "source": "crediting period", "raw_text": "Project Start Date: 01/01/2022"},
                    {"value": "31/12/2031", "field_type": "crediting_period_end", "confidence": 0.85,
                     "source": "crediting period", "raw_text": "Crediting period end: 31/12/2031"}]"#,
            );
            llm.add_delay(slow, Duration::from_millis(30));
            let extractor = Extractor::dates(llm, MemoryCache::new(), two_chunk_config()).unwrap();
            let costs = CostLedger::in_memory("session-1");
            runs.push(extractor.extract(&request(), &costs).await.unwrap().fields);
        }
        assert_eq!(runs[0], runs[1]);
        assert_eq!(runs[0].len(), 2);
        assert_eq!(runs[0][1].source.location, "crediting period");
    }

    #[tokio::test]
    async fn test_unverifiable_citation_is_penalized() {
        let llm = MockProvider::new(
            r#"[{"value": "15/06/2022", "field_type": "validation_date", "confidence": 0.9,
                "source": "p2", "raw_text": "Satellite imagery was acquired on 15 June 2022"}]"#,
        );
        let extractor = Extractor::dates(llm, MemoryCache::new(), ExtractorConfig::default()).unwrap();
        let costs = CostLedger::in_memory("session-1");

        let outcome = extractor
            .extract(&ExtractionRequest::new("Project Start Date: 01/01/2022", "plan.pdf"), &costs)
            .await
            .unwrap();

        let field = &outcome.fields[0];
        assert_eq!(field.verification_status, VerificationStatus::Failed);
        assert!((field.confidence.value() - 0.6).abs() < 1e-9);
        assert!(field.verification_warning.is_some());
    }

    #[tokio::test]
    async fn test_project_id_false_positives_filtered() {
        let llm = MockProvider::new(
            r#"[
                {"value": "4997", "field_type": "project_id", "confidence": 0.8, "source": "header",
                 "raw_text": "4997Botany22_Project_Plan.pdf"},
                {"value": "C06-006", "field_type": "project_id", "confidence": 0.95, "source": "cover",
                 "raw_text": "Project ID: C06-006"}
            ]"#,
        );
        let extractor = Extractor::project_ids(llm, MemoryCache::new(), ExtractorConfig::default()).unwrap();
        let costs = CostLedger::in_memory("session-1");
        let doc = "4997Botany22_Project_Plan.pdf\nProject ID: C06-006\n";

        let outcome = extractor.extract(&ExtractionRequest::new(doc, "plan.pdf"), &costs).await.unwrap();
        let values: Vec<String> = outcome.fields.iter().map(|f| f.value.to_string()).collect();
        assert_eq!(values, vec!["C06-006"]);
        assert!(outcome.fields[0].is_verified());
    }

    #[tokio::test]
    async fn test_hints_reach_prompt() {
        let llm = MockProvider::new("[]");
        let extractor = Extractor::land_tenure(llm.clone(), MemoryCache::new(), ExtractorConfig::default()).unwrap();
        let costs = CostLedger::in_memory("session-1");
        let request = ExtractionRequest::new("The land is held under a 30-year lease.", "tenure.pdf").with_hints(
            ExtractionHints {
                expected_fields: vec!["lease_term".to_string()],
                notes: Some("Lease annex".to_string()),
            },
        );

        let outcome = extractor.extract(&request, &costs).await.unwrap();
        assert!(outcome.fields.is_empty());

        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("The caller expects these fields: lease_term"));
        assert!(prompt.contains("Lease annex"));
        assert!(prompt.contains("30-year lease"));
    }

    #[tokio::test]
    async fn test_text_too_long() {
        let config = ExtractorConfig {
            chunk_size: 5,
            chunk_overlap: 1,
            max_input_chars: 10,
            max_document_chars: 10,
            ..ExtractorConfig::default()
        };
        let llm = MockProvider::default();
        let extractor = Extractor::dates(llm.clone(), MemoryCache::new(), config).unwrap();
        let costs = CostLedger::in_memory("session-1");

        let err = extractor
            .extract(&ExtractionRequest::new("x".repeat(11), "big.pdf"), &costs)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractorError::TextTooLong(11, 10)));
        assert_eq!(llm.call_count(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ExtractorConfig {
            chunk_size: 10,
            chunk_overlap: 10,
            ..ExtractorConfig::default()
        };
        let result = Extractor::dates(MockProvider::default(), MemoryCache::new(), config);
        assert!(matches!(result, Err(ExtractorError::Config(_))));
    }

    #[tokio::test]
    async fn test_persist_outcome() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let extractor = Extractor::dates(scripted_provider(), MemoryCache::new(), two_chunk_config()).unwrap();
        let costs = CostLedger::in_memory("session-1");

        let outcome = extractor.extract(&request(), &costs).await.unwrap();
        persist_outcome(&store, "session-1", &outcome).unwrap();

        let state = store.read("session-1").unwrap();
        let saved = state["extractions"]["dates"].as_array().unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0]["verification_status"], "verified");
        assert_eq!(state["extraction_runs"]["dates"]["chunks_processed"], 2);
        assert_eq!(state["extraction_runs"]["dates"]["cached"], false);
    }
}
