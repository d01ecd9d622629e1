/// Shared error type used across all CareFlow crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("invalid input: {0}")]
    Input(String),

    #[error("queue: {0}")]
    Queue(String),

    #[error("store: {0}")]
    Store(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("retrieval: {0}")]
    Retrieval(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a bounded retry is worth attempting.
    ///
    /// Transient backend failures (HTTP transport, provider 5xx/timeouts)
    /// are retryable; everything else fails fast.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Timeout(_) | Error::Provider { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::Http("503".into()).is_transient());
        assert!(Error::Timeout("llm".into()).is_transient());
        assert!(Error::Provider {
            provider: "openai".into(),
            message: "overloaded".into()
        }
        .is_transient());

        assert!(!Error::Input("empty".into()).is_transient());
        assert!(!Error::Store("down".into()).is_transient());
        assert!(!Error::StateConflict("v mismatch".into()).is_transient());
    }
}
