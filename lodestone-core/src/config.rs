//! Configuration for the Lodestone engine.

use crate::error::{Error, Result};
use crate::value::{Metadata, Value};
use serde::{Deserialize, Serialize};

/// Default RNG seed for index construction; tests rely on it.
pub const DEFAULT_SEED: u64 = 42;

/// Main configuration for the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub search: SearchConfig,
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name (openai, mock)
    pub provider: String,

    /// API key (picked up from OPENAI_API_KEY when unset)
    pub api_key: Option<String>,

    /// Model name
    pub model: String,

    /// API endpoint
    pub endpoint: String,

    /// Dimension override; inferred from the model when unset
    pub dimension: Option<usize>,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Embedding cache capacity (entries); 0 disables the cache
    pub cache_capacity: u64,

    /// Embedding cache TTL in seconds
    pub cache_ttl_seconds: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            model: "text-embedding-3-small".to_string(),
            endpoint: "https://api.openai.com/v1/embeddings".to_string(),
            dimension: None,
            timeout_seconds: 30,
            cache_capacity: 10_000,
            cache_ttl_seconds: 3600,
        }
    }
}

/// Default parameters for the per-library indexes. A library's
/// `index_params` overrides individual fields at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// IVF: number of clusters; when unset, `ivf_cluster_ratio` applies
    pub ivf_n_clusters: Option<usize>,

    /// IVF: clusters as a fraction of library size at build time
    pub ivf_cluster_ratio: f32,

    /// IVF: clusters scanned per query
    pub ivf_n_probes: usize,

    /// IVF: k-means iteration cap
    pub ivf_max_iter: usize,

    /// IVF: k-means convergence threshold on summed centroid shift
    pub ivf_tolerance: f32,

    /// NSW: neighbors kept per node
    pub nsw_m: usize,

    /// NSW: candidate breadth at insert
    pub nsw_ef_construction: usize,

    /// NSW: candidate breadth at query
    pub nsw_ef_search: usize,

    /// RNG seed for k-means seeding and graph tie-breaking
    pub seed: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            ivf_n_clusters: None,
            ivf_cluster_ratio: 0.1,
            ivf_n_probes: 1,
            ivf_max_iter: 25,
            ivf_tolerance: 1e-4,
            nsw_m: 16,
            nsw_ef_construction: 100,
            nsw_ef_search: 50,
            seed: DEFAULT_SEED,
        }
    }
}

impl IndexConfig {
    /// Apply per-library overrides on top of the engine defaults.
    pub fn with_params(&self, params: &IndexParams) -> IndexConfig {
        IndexConfig {
            ivf_n_clusters: params.n_clusters.or(self.ivf_n_clusters),
            ivf_cluster_ratio: params.cluster_ratio.unwrap_or(self.ivf_cluster_ratio),
            ivf_n_probes: params.n_probes.unwrap_or(self.ivf_n_probes),
            ivf_max_iter: params.max_iter.unwrap_or(self.ivf_max_iter),
            ivf_tolerance: params.tolerance.unwrap_or(self.ivf_tolerance),
            nsw_m: params.m.unwrap_or(self.nsw_m),
            nsw_ef_construction: params.ef_construction.unwrap_or(self.nsw_ef_construction),
            nsw_ef_search: params.ef_search.unwrap_or(self.nsw_ef_search),
            seed: params.seed.unwrap_or(self.seed),
        }
    }
}

/// Per-library index parameter overrides, as supplied at library
/// creation. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexParams {
    pub n_clusters: Option<usize>,
    pub cluster_ratio: Option<f32>,
    pub n_probes: Option<usize>,
    pub max_iter: Option<usize>,
    pub tolerance: Option<f32>,
    pub m: Option<usize>,
    pub ef_construction: Option<usize>,
    pub ef_search: Option<usize>,
    pub seed: Option<u64>,
}

impl IndexParams {
    /// Parse overrides from the free-form map the command surface hands
    /// over. Unknown keys or mistyped values are an invalid request.
    pub fn from_metadata(map: &Metadata) -> Result<Self> {
        let mut params = IndexParams::default();
        for (key, value) in map {
            match key.as_str() {
                "n_clusters" => params.n_clusters = Some(count_param(key, value)?),
                "cluster_ratio" => params.cluster_ratio = Some(float_param(key, value)?),
                "n_probes" => params.n_probes = Some(count_param(key, value)?),
                "max_iter" => params.max_iter = Some(count_param(key, value)?),
                "tolerance" => params.tolerance = Some(float_param(key, value)?),
                "m" => params.m = Some(count_param(key, value)?),
                "ef_construction" => params.ef_construction = Some(count_param(key, value)?),
                "ef_search" => params.ef_search = Some(count_param(key, value)?),
                "seed" => params.seed = Some(count_param(key, value)? as u64),
                other => {
                    return Err(Error::invalid_request(format!(
                        "unknown index param: {other}"
                    )));
                }
            }
        }
        Ok(params)
    }
}

fn count_param(key: &str, value: &Value) -> Result<usize> {
    match value.as_f64() {
        Some(n) if n >= 0.0 && n.fract() == 0.0 => Ok(n as usize),
        _ => Err(Error::invalid_request(format!(
            "index param {key} must be a non-negative integer"
        ))),
    }
}

fn float_param(key: &str, value: &Value) -> Result<f32> {
    match value.as_f64() {
        Some(n) if n.is_finite() => Ok(n as f32),
        _ => Err(Error::invalid_request(format!(
            "index param {key} must be a number"
        ))),
    }
}

/// Search pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Over-fetch multiplier applied when filters are present
    pub filtered_overfetch: usize,

    /// Bounded doubling retries when post-filtering starves the result set
    pub max_expansions: usize,

    /// Maximum k accepted per query
    pub max_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            filtered_overfetch: 10,
            max_expansions: 3,
            max_limit: 1000,
        }
    }
}
