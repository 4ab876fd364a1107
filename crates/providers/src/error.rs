/// Errors from a provider adapter.
///
/// During a status check every variant is a transport-level failure: the
/// scheduler treats it as "no information this tick". During finalize any
/// variant fails the job.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Backend API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The response parsed as JSON but did not match any known shape.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The backend answered but refused the request.
    #[error("{0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display() {
        let err = ProviderError::Api {
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(err.to_string(), "Backend API error (502): bad gateway");
    }

    #[test]
    fn rejected_displays_reason_only() {
        let err = ProviderError::Rejected("quota exceeded".into());
        assert_eq!(err.to_string(), "quota exceeded");
    }
}
