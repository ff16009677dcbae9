use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrailerError {
    #[error("network timeout during {0}")]
    NetworkTimeout(&'static str),

    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("no matching trailer found")]
    NoMatchFound,

    #[error("stream unavailable for resolved video id")]
    StreamUnavailable,

    #[error("decode failed: {0}")]
    DecodeFatal(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for TrailerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TrailerError::NetworkTimeout("http request")
        } else {
            TrailerError::NetworkFailure(err.to_string())
        }
    }
}

impl TrailerError {
    /// Per-step network errors are swallowed and advance the fallback chain;
    /// everything else surfaces to the caller.
    pub fn is_retryable_step(&self) -> bool {
        matches!(
            self,
            TrailerError::NetworkTimeout(_) | TrailerError::NetworkFailure(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TrailerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_errors_map_into_the_taxonomy() {
        let err = serde_json::from_str::<serde_json::Value>("").unwrap_err();
        assert!(matches!(
            TrailerError::from(err),
            TrailerError::Serialization(_)
        ));
    }

    #[test]
    fn only_network_errors_advance_a_chain_step() {
        assert!(TrailerError::NetworkTimeout("step").is_retryable_step());
        assert!(TrailerError::NetworkFailure("connection reset".into()).is_retryable_step());
        assert!(!TrailerError::StreamUnavailable.is_retryable_step());
        assert!(!TrailerError::Cancelled.is_retryable_step());
    }
}
