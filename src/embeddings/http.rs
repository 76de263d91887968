use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, error, warn};
use url::Url;

use super::Embedding;
use crate::RagError;
use crate::cancel::{CancellationToken, cancellable, ensure_active};

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: u64 = 2;
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Blocking JSON-over-HTTP client shared by the remote embedding providers.
///
/// Server errors and transport failures are retried with exponential backoff;
/// client errors fail on the first attempt. A cancelled token stops the retry
/// loop before the next attempt and cuts the backoff short.
#[derive(Debug, Clone)]
pub struct HttpClient {
    base_url: Url,
    agent: ureq::Agent,
    retry_attempts: u32,
    bearer_token: Option<String>,
}

impl HttpClient {
    #[inline]
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid base URL: {}", base_url))?;

        Ok(Self {
            base_url,
            agent: build_agent(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            bearer_token: None,
        })
    }

    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_bearer_token(mut self, token: String) -> Self {
        self.bearer_token = Some(token);
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[inline]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// GET `path` relative to the base URL and return the response body
    #[inline]
    pub fn get(&self, token: &CancellationToken, path: &str) -> Result<String> {
        let url = self.endpoint(path)?;
        debug!("GET {}", url);

        self.request_with_retry(token, || {
            let mut request = self.agent.get(url.as_str());
            if let Some(token) = &self.bearer_token {
                request = request.header("Authorization", format!("Bearer {}", token));
            }
            request
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .with_context(|| format!("GET {} failed", url))
    }

    /// POST a JSON body to `path` relative to the base URL and return the response body
    #[inline]
    pub fn post_json(&self, token: &CancellationToken, path: &str, body: &str) -> Result<String> {
        let url = self.endpoint(path)?;
        debug!("POST {} ({} bytes)", url, body.len());

        self.request_with_retry(token, || {
            let mut request = self.agent.post(url.as_str());
            if let Some(token) = &self.bearer_token {
                request = request.header("Authorization", format!("Bearer {}", token));
            }
            request
                .header("Content-Type", "application/json")
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .with_context(|| format!("POST {} failed", url))
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        // Join relative to the base path so proxies mounted under a prefix keep it
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path.trim_start_matches('/'))
            .with_context(|| format!("Failed to build URL for {}", path))
    }

    fn request_with_retry<F>(&self, token: &CancellationToken, mut send: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut attempt = 1;
        loop {
            if token.is_cancelled() {
                debug!("Request to {} cancelled before attempt {}", self.base_url, attempt);
                return Err(RagError::Cancelled.into());
            }

            let error = match send() {
                Ok(body) => {
                    if attempt > 1 {
                        debug!("{} answered on attempt {}", self.base_url, attempt);
                    }
                    return Ok(body);
                }
                Err(error) => error,
            };

            let failure = describe(&error);
            if !is_transient(&error) {
                warn!("{}, giving up", failure);
                anyhow::bail!(failure);
            }
            if attempt >= self.retry_attempts {
                error!(
                    "{} after {} attempts against {}",
                    failure, attempt, self.base_url
                );
                anyhow::bail!("{} after {} attempts", failure, attempt);
            }

            let delay = Duration::from_secs(BACKOFF_BASE.pow(attempt - 1));
            warn!(
                "{} (attempt {}/{}), retrying in {}s",
                failure,
                attempt,
                self.retry_attempts,
                delay.as_secs()
            );
            if !sleep_unless_cancelled(token, delay) {
                debug!("Backoff for {} cancelled", self.base_url);
                return Err(RagError::Cancelled.into());
            }
            attempt += 1;
        }
    }
}

/// Block the current thread for `delay`; returns false as soon as `token` fires
fn sleep_unless_cancelled(token: &CancellationToken, delay: Duration) -> bool {
    let deadline = Instant::now() + delay;
    while !token.is_cancelled() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        std::thread::sleep(remaining.min(CANCEL_POLL_INTERVAL));
    }
    false
}

/// Server errors and transport failures may succeed on a later attempt
fn is_transient(error: &ureq::Error) -> bool {
    match error {
        ureq::Error::StatusCode(status) => *status >= 500,
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => true,
        _ => false,
    }
}

fn describe(error: &ureq::Error) -> String {
    match error {
        ureq::Error::StatusCode(status) => format!("Server responded with status {}", status),
        other => format!("Request error: {}", other),
    }
}

/// A provider whose requests block the calling thread
pub(crate) trait BlockingBatchEmbedder: Clone + Send + Sync + 'static {
    fn batch_size(&self) -> usize;

    /// `token` is checked between retries so a cancelled batch stops sending
    fn embed_batch(&self, token: &CancellationToken, texts: &[String]) -> Result<Vec<Embedding>>;
}

/// Embed `texts` in provider-sized batches on the blocking pool.
///
/// Each batch races the cancellation token. When it fires the caller returns
/// at once and the blocking worker stops before its next retry.
pub(crate) async fn embed_blocking<E>(
    embedder: &E,
    token: &CancellationToken,
    texts: &[String],
) -> crate::Result<Vec<Embedding>>
where
    E: BlockingBatchEmbedder,
{
    if texts.is_empty() {
        return Err(RagError::Embedding(
            "No texts provided for embedding generation".to_string(),
        ));
    }

    debug!("Generating embeddings for {} texts", texts.len());
    let mut embeddings = Vec::with_capacity(texts.len());

    for batch in texts.chunks(embedder.batch_size().max(1)) {
        ensure_active(token)?;

        let worker = embedder.clone();
        let worker_token = token.clone();
        let owned = batch.to_vec();
        let task =
            tokio::task::spawn_blocking(move || worker.embed_batch(&worker_token, &owned));

        let batch_embeddings = cancellable(token, async {
            task.await
                .map_err(|e| RagError::Embedding(format!("Embedding task failed: {}", e)))?
                .map_err(|e| RagError::Embedding(format!("{:#}", e)))
        })
        .await?;

        if batch_embeddings.len() != batch.len() {
            return Err(RagError::Embedding(format!(
                "Mismatch between batch size and embeddings returned: {} vs {}",
                batch.len(),
                batch_embeddings.len()
            )));
        }

        embeddings.extend(batch_embeddings);
    }

    debug!("Generated {} embeddings total", embeddings.len());
    Ok(embeddings)
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}
