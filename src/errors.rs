/// Structured error types for the aggregation engine
///
/// The fetch boundary produces tagged errors so retry policy dispatches on
/// the variant, never by sniffing transport internals.
use thiserror::Error;

/// Error produced by one upstream HTTP call.
///
/// `Timeout`/`Connection` are transient network failures eligible for retry
/// with backoff. `Status`/`Schema` mean the upstream answered but the
/// response is unusable; retrying would only repeat the same answer.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("request to {endpoint} timed out after {timeout_ms}ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    #[error("connection to {endpoint} failed: {detail}")]
    Connection { endpoint: String, detail: String },

    #[error("unexpected status {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("unexpected response shape from {endpoint}: {detail}")]
    Schema { endpoint: String, detail: String },
}

impl ApiError {
    /// Transient network failures are retried; validation failures are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Timeout { .. } | ApiError::Connection { .. })
    }
}

/// Terminal outcome of one refresh attempt.
#[derive(Error, Debug, Clone)]
pub enum RefreshError {
    /// The highest-priority listing feed failed after retries. Fatal to the
    /// refresh; supplementary feed failures are absorbed before this point.
    #[error("primary listing source '{source}' failed: {cause}")]
    PrimarySource {
        source: String,
        #[source]
        cause: ApiError,
    },

    /// No cached data exists anywhere and the required refresh failed.
    /// The serving layer maps this to a 502-equivalent response.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}
