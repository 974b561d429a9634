use std::{path::PathBuf, time::Duration};

/// The company dataset could not be turned into a table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatasetUnavailable {
    #[error("Data file '{}' not found.", .0.display())]
    NotFound(PathBuf),
    #[error("Data file '{}' could not be read: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },
}

/// Failures talking to the language model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("the model service rejected the credentials")]
    Unauthorized,
    #[error("rate limited by the model service, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("model service returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("invalid response from the model service: {0}")]
    InvalidResponse(String),
    #[error("the model service did not answer within {0:?}")]
    Timeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_unavailable_display() {
        let err = DatasetUnavailable::NotFound(PathBuf::from("sample_rows.csv"));
        assert_eq!(err.to_string(), "Data file 'sample_rows.csv' not found.");

        let err = DatasetUnavailable::Unreadable {
            path: PathBuf::from("data/rows.csv"),
            reason: "bad quoting".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Data file 'data/rows.csv' could not be read: bad quoting"
        );
    }

    #[test]
    fn test_oracle_error_display() {
        assert_eq!(
            OracleError::RateLimited { retry_after_secs: 30 }.to_string(),
            "rate limited by the model service, retry after 30s"
        );
        assert_eq!(
            OracleError::Api {
                status: 500,
                body: "boom".to_string()
            }
            .to_string(),
            "model service returned 500: boom"
        );
        assert!(
            OracleError::Timeout(Duration::from_secs(60))
                .to_string()
                .contains("60s")
        );
    }
}
