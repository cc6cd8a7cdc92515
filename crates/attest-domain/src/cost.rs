//! Cost accounting records
//!
//! An `ApiCall` is recorded for every backend invocation and for every cache
//! hit. The `CostSummary` is always derived from the list of calls; it is
//! never mutated on its own.

use crate::ExtractorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One backend invocation (or cache hit standing in for one)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCall {
    /// When the call completed
    pub timestamp: DateTime<Utc>,

    /// Model name
    pub model: String,

    /// Extractor that issued the call
    pub extractor_kind: ExtractorKind,

    /// Document being processed
    pub document_name: String,

    /// Prompt tokens
    pub input_tokens: u64,

    /// Completion tokens
    pub output_tokens: u64,

    /// Tokens written to the provider's prompt cache
    pub cache_write_tokens: u64,

    /// Tokens read from the provider's prompt cache
    pub cache_read_tokens: u64,

    /// Cost in USD
    pub cost: f64,

    /// Wall-clock duration in seconds
    pub duration: f64,

    /// Served from the extraction cache, no backend spend
    pub cached: bool,
}

impl ApiCall {
    /// Record for a real backend call; cost is filled in by the ledger
    pub fn backend(
        model: impl Into<String>,
        extractor_kind: ExtractorKind,
        document_name: impl Into<String>,
        input_tokens: u64,
        output_tokens: u64,
        duration: f64,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            model: model.into(),
            extractor_kind,
            document_name: document_name.into(),
            input_tokens,
            output_tokens,
            cache_write_tokens: 0,
            cache_read_tokens: 0,
            cost: 0.0,
            duration,
            cached: false,
        }
    }

    /// Record for a cache hit: zero tokens, zero cost
    pub fn cache_hit(
        model: impl Into<String>,
        extractor_kind: ExtractorKind,
        document_name: impl Into<String>,
        duration: f64,
    ) -> Self {
        Self {
            cached: true,
            ..Self::backend(model, extractor_kind, document_name, 0, 0, duration)
        }
    }

    /// Attach provider prompt-cache token counts
    pub fn with_cache_tokens(mut self, write: u64, read: u64) -> Self {
        self.cache_write_tokens = write;
        self.cache_read_tokens = read;
        self
    }

    /// Enforce the cache-hit invariant: cached calls carry no tokens and no cost
    pub fn normalized(mut self) -> Self {
        if self.cached {
            self.input_tokens = 0;
            self.output_tokens = 0;
            self.cache_write_tokens = 0;
            self.cache_read_tokens = 0;
            self.cost = 0.0;
        }
        self
    }
}

/// Aggregate of a session's API calls
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CostSummary {
    /// Session the calls belong to
    pub session_id: String,

    /// Number of calls, cached ones included
    pub total_api_calls: usize,

    /// Sum of prompt tokens
    pub total_input_tokens: u64,

    /// Sum of completion tokens
    pub total_output_tokens: u64,

    /// Sum of prompt-cache write tokens
    pub total_cache_creation_tokens: u64,

    /// Sum of prompt-cache read tokens
    pub total_cache_read_tokens: u64,

    /// Sum of costs in USD
    pub total_cost_usd: f64,

    /// Sum of call durations in seconds
    pub total_duration_seconds: f64,

    /// Fraction of calls served from the extraction cache
    pub cache_hit_rate: f64,

    /// Every recorded call
    #[serde(default)]
    pub api_calls: Vec<ApiCall>,
}

impl CostSummary {
    /// Recompute the aggregate from a list of calls
    pub fn from_calls(session_id: impl Into<String>, api_calls: Vec<ApiCall>) -> Self {
        let total_api_calls = api_calls.len();
        let cached = api_calls.iter().filter(|c| c.cached).count();
        let cache_hit_rate = if total_api_calls == 0 {
            0.0
        } else {
            cached as f64 / total_api_calls as f64
        };

        Self {
            session_id: session_id.into(),
            total_api_calls,
            total_input_tokens: api_calls.iter().map(|c| c.input_tokens).sum(),
            total_output_tokens: api_calls.iter().map(|c| c.output_tokens).sum(),
            total_cache_creation_tokens: api_calls.iter().map(|c| c.cache_write_tokens).sum(),
            total_cache_read_tokens: api_calls.iter().map(|c| c.cache_read_tokens).sum(),
            total_cost_usd: api_calls.iter().map(|c| c.cost).sum(),
            total_duration_seconds: api_calls.iter().map(|c| c.duration).sum(),
            cache_hit_rate,
            api_calls,
        }
    }

    /// Number of calls served from the extraction cache
    pub fn cached_calls(&self) -> usize {
        self.api_calls.iter().filter(|c| c.cached).count()
    }
}

/// Per-model pricing in USD per million tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Prompt tokens
    pub input_per_mtok: f64,
    /// Completion tokens
    pub output_per_mtok: f64,
    /// Prompt-cache writes
    pub cache_write_per_mtok: f64,
    /// Prompt-cache reads
    pub cache_read_per_mtok: f64,
}

impl ModelPricing {
    /// Price a call; cached calls are free
    pub fn cost(&self, call: &ApiCall) -> f64 {
        if call.cached {
            return 0.0;
        }
        let per_token = |count: u64, rate: f64| count as f64 * rate / 1_000_000.0;
        per_token(call.input_tokens, self.input_per_mtok)
            + per_token(call.output_tokens, self.output_per_mtok)
            + per_token(call.cache_write_tokens, self.cache_write_per_mtok)
            + per_token(call.cache_read_tokens, self.cache_read_per_mtok)
    }

    /// Free pricing, used for local models
    pub fn free() -> Self {
        Self {
            input_per_mtok: 0.0,
            output_per_mtok: 0.0,
            cache_write_per_mtok: 0.0,
            cache_read_per_mtok: 0.0,
        }
    }
}

/// Maps model-name prefixes to pricing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingTable {
    /// (model prefix, pricing) pairs, longest prefix wins
    pub models: Vec<(String, ModelPricing)>,

    /// Pricing for models with no matching prefix
    pub fallback: ModelPricing,
}

impl PricingTable {
    /// Look up the pricing for a model name
    pub fn for_model(&self, model: &str) -> ModelPricing {
        self.models
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, pricing)| *pricing)
            .unwrap_or(self.fallback)
    }

    /// Price a call using the model it names
    pub fn cost(&self, call: &ApiCall) -> f64 {
        self.for_model(&call.model).cost(call)
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        let sonnet = ModelPricing {
            input_per_mtok: 3.0,
            output_per_mtok: 15.0,
            cache_write_per_mtok: 3.75,
            cache_read_per_mtok: 0.30,
        };
        let haiku = ModelPricing {
            input_per_mtok: 0.80,
            output_per_mtok: 4.0,
            cache_write_per_mtok: 1.0,
            cache_read_per_mtok: 0.08,
        };
        let opus = ModelPricing {
            input_per_mtok: 15.0,
            output_per_mtok: 75.0,
            cache_write_per_mtok: 18.75,
            cache_read_per_mtok: 1.50,
        };
        Self {
            models: vec![
                ("claude-sonnet".to_string(), sonnet),
                ("claude-3-5-sonnet".to_string(), sonnet),
                ("claude-haiku".to_string(), haiku),
                ("claude-3-5-haiku".to_string(), haiku),
                ("claude-opus".to_string(), opus),
                ("mock".to_string(), ModelPricing::free()),
            ],
            fallback: sonnet,
        }
    }
}
