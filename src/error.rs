//! Error types for the NsNet operator

use thiserror::Error;

/// Main error type for provisioning passes
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    KubeError(#[from] kube::Error),

    /// Transport failure talking to the network provider
    #[error("Provider HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The network provider rejected a request
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// A provider resource cannot be removed yet (e.g. still in use)
    #[error("Resource not ready: {0}")]
    NotReady(String),

    /// Invalid or missing operator configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON (de)serialization failure
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// One or more dependent services could not be updated
    #[error("Failed to update security groups of {} service(s): {}", .failed.len(), .failed.join("; "))]
    PropagationError { failed: Vec<String> },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Kind of failure, as seen by whoever redelivers the notification
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Failure {
    /// Transient condition; the same pass is expected to succeed later
    Retryable(String),
    /// Anything else; retried only through redelivery with a longer delay
    Fatal(String),
}

impl Error {
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::ProviderError(msg.into())
    }

    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Classify this error as retryable or fatal
    pub fn failure(&self) -> Failure {
        if self.is_retriable() {
            Failure::Retryable(self.to_string())
        } else {
            Failure::Fatal(self.to_string())
        }
    }

    /// Only the not-ready condition is transient from the engines' point of view
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::NotReady(_))
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::HttpError(_) => "http",
            Error::ProviderError(_) => "provider",
            Error::NotReady(_) => "not_ready",
            Error::ConfigError(_) => "config",
            Error::SerializationError(_) => "serialization",
            Error::PropagationError { .. } => "propagation",
        }
    }
}

/// Outcome of one reconcile or finalize pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    Done,
    Retryable(String),
    Fatal(String),
}

impl PassOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, PassOutcome::Done)
    }
}

impl<T> From<&Result<T>> for PassOutcome {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => PassOutcome::Done,
            Err(e) => e.failure().into(),
        }
    }
}

impl From<Failure> for PassOutcome {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Retryable(reason) => PassOutcome::Retryable(reason),
            Failure::Fatal(reason) => PassOutcome::Fatal(reason),
        }
    }
}
