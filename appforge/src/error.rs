//! Error taxonomy shared by every stage and provider.

/// Failures surfaced by external calls and local parsing.
///
/// Research, planning and code generation never let these escape; they
/// degrade to a fallback value instead. Deployment operations return them
/// to the caller as-is.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network failure, timeout, or a non-success HTTP status.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        status: Option<u16>,
    },
    /// The response did not contain the expected structured payload.
    #[error("parse error: {0}")]
    Parse(String),
    /// A provider answered with a domain-level failure.
    #[error("provider error: {0}")]
    Provider(String),
    /// A required setting or credential is missing or malformed.
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            message: message.into(),
            status: None,
        }
    }

    pub fn http_status(status: u16, body: &str) -> Self {
        let body = if body.len() > 300 {
            let mut end = 300;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            &body[..end]
        } else {
            body
        };
        Error::Transport {
            message: format!("HTTP {status}: {body}"),
            status: Some(status),
        }
    }

    /// Whether a caller could reasonably try the same call again.
    ///
    /// Rate limits and server-side failures qualify. The pipeline itself
    /// never retries; this is exposed for callers that wrap it.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport { status: None, .. } => true,
            Error::Transport {
                status: Some(code), ..
            } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport {
            message: e.to_string(),
            status: e.status().map(|s| s.as_u16()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_retryable() {
        assert!(Error::http_status(429, "slow down").is_retryable());
        assert!(Error::http_status(503, "").is_retryable());
        assert!(!Error::http_status(401, "bad token").is_retryable());
        assert!(!Error::Parse("no json".into()).is_retryable());
    }

    #[test]
    fn long_bodies_are_truncated_on_char_boundary() {
        let body = "é".repeat(400);
        let err = Error::http_status(500, &body);
        assert!(err.to_string().len() < 400);
    }
}
