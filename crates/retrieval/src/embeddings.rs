use crate::error::{Result, RetrievalError};
use async_trait::async_trait;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const STUB_DIMENSION: usize = 384;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum EmbeddingMode {
    Http,
    Stub,
}

impl EmbeddingMode {
    fn from_env() -> Result<Self> {
        let raw = env::var("CIVIC_EMBEDDING_MODE")
            .unwrap_or_else(|_| "http".to_string())
            .to_ascii_lowercase();
        match raw.as_str() {
            "http" => Ok(Self::Http),
            "stub" => Ok(Self::Stub),
            other => Err(RetrievalError::EmbeddingService(format!(
                "Unsupported CIVIC_EMBEDDING_MODE '{other}' (expected 'http' or 'stub')"
            ))),
        }
    }
}

/// Connection settings for the external embedding service.
#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout: Duration,
}

impl EmbeddingConfig {
    pub fn from_env() -> Self {
        let base_url = env::var("CIVIC_EMBEDDING_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let model = env::var("CIVIC_EMBEDDING_MODEL")
            .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL.to_string());
        let timeout = env::var("CIVIC_EMBEDDING_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .map_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS), Duration::from_secs);
        Self {
            base_url,
            model,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Seam to the external embedding service.
///
/// One call per batch; implementations must preserve input order and
/// return one fixed-dimension vector per input text.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI-compatible `/embeddings` client.
///
/// Failures (auth, quota, network, timeout) surface as
/// [`RetrievalError::EmbeddingService`] and are not retried here; retry
/// policy belongs to the caller.
pub struct HttpEmbeddingBackend {
    client: reqwest::Client,
    config: EmbeddingConfig,
}

impl HttpEmbeddingBackend {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                RetrievalError::EmbeddingService(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!("{}/embeddings", self.config.base_url)
    }

    fn auth_header(&self) -> Option<String> {
        env::var(&self.config.api_key_env)
            .ok()
            .map(|key| format!("Bearer {key}"))
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingBackend {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let payload = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        };

        let mut builder = self.client.post(self.url()).json(&payload);
        if let Some(auth) = self.auth_header() {
            builder = builder.header("Authorization", auth);
        }

        let response = builder.send().await.map_err(|e| {
            RetrievalError::EmbeddingService(format!("HTTP request failed: {e}"))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            RetrievalError::EmbeddingService(format!("Failed to read response: {e}"))
        })?;

        if !status.is_success() {
            return Err(RetrievalError::EmbeddingService(service_error(&status, &body)));
        }

        let parsed: EmbeddingResponse = serde_json::from_str(&body).map_err(|e| {
            RetrievalError::EmbeddingService(format!("Failed to parse response JSON: {e}"))
        })?;

        if parsed.data.len() != texts.len() {
            return Err(RetrievalError::EmbeddingService(format!(
                "Embedding service returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        // The service tags rows with their input index; re-order defensively.
        let mut rows = parsed.data;
        rows.sort_by_key(|row| row.index);
        Ok(rows.into_iter().map(|row| row.embedding).collect())
    }
}

fn service_error(status: &reqwest::StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v["error"]["message"]
                .as_str()
                .map(std::string::ToString::to_string)
        })
        .unwrap_or_else(|| format!("HTTP {status}: {body}"));
    format!("Embedding request failed: {detail}")
}

/// Deterministic offline backend: hash-seeded unit vectors.
///
/// Used for tests and for `CIVIC_EMBEDDING_MODE=stub` demo runs without a
/// service key. Tracks batch calls so cache behavior is observable.
pub struct StubEmbeddingBackend {
    dimension: usize,
    batch_calls: AtomicUsize,
}

impl StubEmbeddingBackend {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            batch_calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::Relaxed)
    }
}

impl Default for StubEmbeddingBackend {
    fn default() -> Self {
        Self::new(STUB_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingBackend for StubEmbeddingBackend {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::Relaxed);
        Ok(texts
            .iter()
            .map(|text| stub_embed(text, self.dimension))
            .collect())
    }
}

fn stub_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut state =
        fnv1a_64(text.as_bytes()) ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut vec = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        let bits = splitmix64(&mut state);
        let high = (bits >> 32) as u32;
        let mantissa = high >> 9;
        let unit = f32::from_bits(0x3f80_0000 | mantissa) - 1.0;
        vec.push(unit.mul_add(2.0, -1.0));
    }
    normalize(&mut vec);
    vec
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

/// Batch-first wrapper turning backend rows into ndarray matrices.
pub struct Embedder {
    backend: Arc<dyn EmbeddingBackend>,
}

impl Embedder {
    #[must_use]
    pub fn new(backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self { backend }
    }

    /// Backend selection via `CIVIC_EMBEDDING_MODE` ('http' or 'stub').
    pub fn from_env() -> Result<Self> {
        let backend: Arc<dyn EmbeddingBackend> = match EmbeddingMode::from_env()? {
            EmbeddingMode::Http => {
                Arc::new(HttpEmbeddingBackend::new(EmbeddingConfig::from_env())?)
            }
            EmbeddingMode::Stub => Arc::new(StubEmbeddingBackend::default()),
        };
        Ok(Self::new(backend))
    }

    /// Embed a batch of texts into one matrix, one row per text in input
    /// order. Empty input yields a 0x0 matrix without a service call.
    pub async fn embed_matrix(&self, texts: &[String]) -> Result<Array2<f32>> {
        if texts.is_empty() {
            return Ok(Array2::zeros((0, 0)));
        }

        let rows = self.backend.embed(texts).await?;
        let dimension = rows.first().map_or(0, Vec::len);
        let mut flat = Vec::with_capacity(rows.len() * dimension);
        for row in &rows {
            if row.len() != dimension {
                return Err(RetrievalError::InvalidDimension {
                    expected: dimension,
                    actual: row.len(),
                });
            }
            flat.extend_from_slice(row);
        }

        Array2::from_shape_vec((rows.len(), dimension), flat).map_err(|e| {
            RetrievalError::EmbeddingService(format!("Malformed embedding matrix: {e}"))
        })
    }

    /// Embed a single query text. Blank input is still sent to the
    /// service so degenerate queries behave exactly like the service
    /// says they do.
    pub async fn embed_query(&self, text: &str) -> Result<Array1<f32>> {
        let rows = self.backend.embed(&[text.to_string()]).await?;
        let row = rows.into_iter().next().ok_or_else(|| {
            RetrievalError::EmbeddingService(
                "Embedding service returned no vector for query".to_string(),
            )
        })?;
        Ok(Array1::from_vec(row))
    }
}
