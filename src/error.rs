use crate::scheduler::JobKind;

/// Failure taxonomy of the pipeline. Everything except `Store` is contained
/// at the boundary of the item that failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("source '{source_name}' unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    #[error("analysis batch failed for {articles} article(s): {reason}")]
    AnalysisBatchFailed { articles: usize, reason: String },

    #[error("enrichment failed for {url}: {reason}")]
    EnrichmentFailed { url: String, reason: String },

    #[error("delivery to {recipient} failed: {reason}")]
    DeliveryFailed { recipient: String, reason: String },

    #[error("subscriber capacity of {max} reached")]
    CapacityExceeded { max: usize },

    #[error("{0} job is already running")]
    JobAlreadyRunning(JobKind),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn source_unavailable(source: &str, reason: impl std::fmt::Display) -> Self {
        Error::SourceUnavailable {
            source_name: source.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn batch_failed(articles: usize, reason: impl std::fmt::Display) -> Self {
        Error::AnalysisBatchFailed {
            articles,
            reason: reason.to_string(),
        }
    }

    pub fn enrichment(url: &str, reason: impl std::fmt::Display) -> Self {
        Error::EnrichmentFailed {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn delivery(recipient: &str, reason: impl std::fmt::Display) -> Self {
        Error::DeliveryFailed {
            recipient: recipient.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Only store failures abort a running job.
    pub fn is_job_fatal(&self) -> bool {
        matches!(self, Error::Store(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Store(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Store(e.to_string())
    }
}
